//! Settle-all fan-out helpers.
//!
//! Two policies are used across the crate and they are not interchangeable:
//! [`all_settled`] waits for every future and fails with one aggregate error
//! if any of them failed, while [`each_or_default`] swallows a failure and
//! yields the type's default value.

use futures::future::join_all;
use log::warn;
use std::future::Future;

use crate::error::{IntegrationError, Result};

/// Fail-fast aggregate over already settled results, preserving input order.
pub fn all_or_error<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => errors.push(err),
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(IntegrationError::Aggregate(format_errors(&errors)))
    }
}

/// Run every future to completion, then apply [`all_or_error`].
pub async fn all_settled<I, F, T>(futures: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    all_or_error(join_all(futures).await)
}

/// Best-effort: a failure is logged and replaced with `T::default()`.
pub async fn each_or_default<F, T>(future: F, label: &str) -> T
where
    F: Future<Output = Result<T>>,
    T: Default,
{
    match future.await {
        Ok(value) => value,
        Err(err) => {
            warn!("{label} failed, continuing with an empty result: {err}");
            T::default()
        }
    }
}

/// `1.) first, 2.) second`
pub fn format_errors(errors: &[IntegrationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("{}.) {err}", i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_or_error_keeps_order() {
        let results: Vec<Result<u32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(all_or_error(results).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn all_or_error_enumerates_every_failure() {
        let results: Vec<Result<u32>> = vec![
            Ok(1),
            Err(IntegrationError::Storage("disk full".to_string())),
            Err(IntegrationError::Queue("closed".to_string())),
        ];
        let err = all_or_error(results).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1.) Storage error: disk full, 2.) Queue error: closed"
        );
    }

    #[tokio::test]
    async fn each_or_default_degrades_to_default() {
        let value: Vec<u32> = each_or_default(
            async { Err(IntegrationError::NotFound("x".to_string())) },
            "test lookup",
        )
        .await;
        assert!(value.is_empty());

        let value = each_or_default(async { Ok(5u32) }, "test lookup").await;
        assert_eq!(value, 5);
    }
}
