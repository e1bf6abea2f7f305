use log::debug;
use std::future::Future;

use super::client::GitlabResponse;
use crate::error::{IntegrationError, Result};
use crate::fan_out;

pub const DEFAULT_PER_PAGE: u32 = 100;

/// One page of a list endpoint.
pub type Page<T> = GitlabResponse<Vec<T>>;

/// Fetch every page of a list endpoint.
///
/// The first page is fetched on its own to learn the `x-total` count. When
/// everything fits in that page (or GitLab did not send a total) it is
/// returned as is. Otherwise the remaining pages are requested concurrently
/// and appended in page order, not completion order. A single failing page
/// fails the whole fetch with every page error listed.
pub async fn fetch_paginated_data<T, P, F, Fut>(
    fetch: F,
    params: P,
    page: u32,
    per_page: u32,
) -> Result<Vec<T>>
where
    F: Fn(u32, u32, P) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    P: Clone,
{
    if per_page == 0 {
        return Err(IntegrationError::Config(
            "per_page must be greater than zero".to_string(),
        ));
    }

    let first = fetch(page, per_page, params.clone()).await?;

    let Some(total) = first.total() else {
        debug!("No total count header on page {page}, returning it alone");
        return Ok(first.data);
    };

    if total <= u64::from(per_page) {
        return Ok(first.data);
    }

    let page_count = u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX);
    debug!("Fetching {} more pages ({total} items)", page_count.saturating_sub(page));

    let remaining = ((page + 1)..=page_count).map(|p| fetch(p, per_page, params.clone()));
    let pages = fan_out::all_settled(remaining).await?;

    let mut data = first.data;
    for next in pages {
        data.extend(next.data);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn page_of(items: Vec<u32>, total: Option<u64>) -> Page<u32> {
        let mut headers = HeaderMap::new();
        if let Some(total) = total {
            headers.insert("x-total", HeaderValue::from_str(&total.to_string()).unwrap());
        }
        GitlabResponse {
            data: items,
            headers,
        }
    }

    /// Serves `total` sequential integers, `per_page` at a time.
    fn numbered_pages(
        total: u64,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(u32, u32, ()) -> std::pin::Pin<Box<dyn Future<Output = Result<Page<u32>>> + Send>>
    {
        move |page, per_page, ()| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                // Earlier pages answer later so completion order is reversed.
                tokio::time::sleep(Duration::from_millis(u64::from(20 / page))).await;
                let start = (page - 1) * per_page;
                let end = u32::try_from(total).unwrap().min(start + per_page);
                Ok(page_of((start..end).collect(), Some(total)))
            })
        }
    }

    #[tokio::test]
    async fn single_page_makes_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let data = fetch_paginated_data(numbered_pages(100, calls.clone()), (), 1, 100)
            .await
            .unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetches_every_page_in_page_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let data = fetch_paginated_data(numbered_pages(250, calls.clone()), (), 1, 100)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(data.len(), 250);
        assert_eq!(data, (0..250u32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn missing_total_returns_first_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = move |_page: u32, _per_page: u32, (): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(page_of(vec![1, 2, 3], None)) }
        };
        let data = fetch_paginated_data(fetch, (), 1, 2).await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn any_failed_page_fails_the_fetch() {
        let fetch = |page: u32, _per_page: u32, (): ()| async move {
            match page {
                1 => Ok(page_of(vec![1], Some(4))),
                2 => Err(IntegrationError::GitlabHttpMethod {
                    status: 502,
                    status_text: "Bad Gateway".to_string(),
                }),
                3 => Ok(page_of(vec![3], Some(4))),
                _ => Err(IntegrationError::GitlabHttpMethod {
                    status: 500,
                    status_text: "Internal Server Error".to_string(),
                }),
            }
        };

        let err = fetch_paginated_data(fetch, (), 1, 1).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("1.) GitLab request failed with status 502"));
        assert!(message.contains("2.) GitLab request failed with status 500"));
    }

    #[tokio::test]
    async fn params_reach_every_page() {
        let fetch = |page: u32, _per_page: u32, search: String| async move {
            assert_eq!(search, "api");
            Ok(page_of(vec![page], Some(2)))
        };
        let data = fetch_paginated_data(fetch, "api".to_string(), 1, 1).await.unwrap();
        assert_eq!(data, vec![1, 2]);
    }
}
