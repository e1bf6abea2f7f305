use chrono::{DateTime, SecondsFormat, Utc};

use super::core::{GitlabClient, QueryParams};
use crate::error::Result;
use crate::gitlab::pagination::Page;
use crate::gitlab::types::MergeRequest;

/// Filters accepted by the project merge request list.
#[derive(Debug, Clone, Default)]
pub struct MergeRequestFilter {
    /// `opened`, `merged`, `closed` or `all`
    pub state: Option<String>,
    pub target_branch: Option<String>,
    pub source_branch: Option<String>,
    pub updated_after: Option<DateTime<Utc>>,
}

impl MergeRequestFilter {
    pub fn merged_into(branch: &str, since: DateTime<Utc>) -> Self {
        Self {
            state: Some("merged".to_string()),
            target_branch: Some(branch.to_string()),
            updated_after: Some(since),
            ..Self::default()
        }
    }

    pub fn open_into(branch: &str) -> Self {
        Self {
            state: Some("opened".to_string()),
            target_branch: Some(branch.to_string()),
            ..Self::default()
        }
    }

    fn apply(&self, query: QueryParams) -> QueryParams {
        query
            .push_opt("state", self.state.as_deref())
            .push_opt("target_branch", self.target_branch.as_deref())
            .push_opt("source_branch", self.source_branch.as_deref())
            .push_opt(
                "updated_after",
                self.updated_after
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )
    }
}

impl GitlabClient {
    pub async fn get_merge_requests(
        &self,
        token: &str,
        project_id: u64,
        page: u32,
        per_page: u32,
        filter: MergeRequestFilter,
    ) -> Result<Page<MergeRequest>> {
        let query = filter
            .apply(QueryParams::new().push("scope", "all"))
            .push("page", page)
            .push("per_page", per_page);
        let path = query.apply(&format!("projects/{project_id}/merge_requests"));
        self.get_json(&path, token).await
    }

    /// Count of open merge requests targeting `branch`, read from `x-total`.
    pub async fn get_open_merge_request_count(
        &self,
        token: &str,
        project_id: u64,
        branch: &str,
    ) -> Result<u64> {
        let page = self
            .get_merge_requests(token, project_id, 1, 1, MergeRequestFilter::open_into(branch))
            .await?;
        Ok(page.total().unwrap_or(page.data.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn open_count_uses_total_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects/42/merge_requests")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "opened".into()),
                Matcher::UrlEncoded("target_branch".into(), "main".into()),
                Matcher::UrlEncoded("per_page".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("x-total", "12")
            .with_body(
                r#"[{"iid":1,"created_at":"2024-01-01T00:00:00Z","merged_at":null,
                    "state":"opened","target_branch":"main","source_branch":"a"}]"#,
            )
            .create_async()
            .await;

        let client = GitlabClient::new(&server.url()).unwrap();
        let count = client
            .get_open_merge_request_count("token", 42, "main")
            .await
            .unwrap();
        assert_eq!(count, 12);
        mock.assert_async().await;
    }

    #[test]
    fn merged_filter_formats_timestamp() {
        let since = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let query = MergeRequestFilter::merged_into("main", since).apply(QueryParams::new());
        assert_eq!(
            query.encode(),
            "state=merged&target_branch=main&updated_after=2024-03-01T12%3A00%3A00Z"
        );
    }
}
