use log::debug;
use reqwest::Method;
use std::collections::HashMap;

use super::core::{GitlabClient, QueryParams, RequestConfig};
use crate::error::Result;
use crate::gitlab::pagination::Page;
use crate::gitlab::types::{Branch, GitlabProject, ProjectVariable};

impl GitlabClient {
    /// One page of a group's projects, subgroups included.
    pub async fn get_group_projects(
        &self,
        token: &str,
        group_id: u64,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<Page<GitlabProject>> {
        let path = QueryParams::new()
            .push("include_subgroups", true)
            .push("archived", false)
            .push("order_by", "name")
            .push("sort", "asc")
            .push_opt("search", search)
            .push("page", page)
            .push("per_page", per_page)
            .apply(&format!("groups/{group_id}/projects"));
        self.get_json(&path, token).await
    }

    /// Accepts a numeric id or a `group/project` path.
    pub async fn get_project(&self, token: &str, project: &str) -> Result<GitlabProject> {
        let path = format!("projects/{}", urlencoding::encode(project));
        Ok(self.get_json(&path, token).await?.data)
    }

    /// Language name to percentage of the repository.
    pub async fn get_project_languages(
        &self,
        token: &str,
        project_id: u64,
    ) -> Result<HashMap<String, f64>> {
        let path = format!("projects/{project_id}/languages");
        Ok(self.get_json(&path, token).await?.data)
    }

    /// Look up a CI/CD variable. A 404 is the normal answer when the
    /// variable was never set, so it becomes `None`.
    pub async fn get_project_variable(
        &self,
        token: &str,
        project_id: u64,
        key: &str,
    ) -> Result<Option<ProjectVariable>> {
        let path = format!("projects/{project_id}/variables/{}", urlencoding::encode(key));
        match self.get_json(&path, token).await {
            Ok(response) => Ok(Some(response.data)),
            Err(err) if err.is_not_found() => {
                debug!("Variable {key} is not set on project {project_id}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_branch(&self, token: &str, project_id: u64, branch: &str) -> Result<Branch> {
        let path = format!(
            "projects/{project_id}/repository/branches/{}",
            urlencoding::encode(branch)
        );
        Ok(self.get_json(&path, token).await?.data)
    }

    /// Raw file contents at `ref_`.
    pub async fn get_file_content(
        &self,
        token: &str,
        project_id: u64,
        file_path: &str,
        ref_: &str,
    ) -> Result<String> {
        let path = QueryParams::new().push("ref", ref_).apply(&format!(
            "projects/{project_id}/repository/files/{}/raw",
            urlencoding::encode(file_path)
        ));
        let response = self
            .call::<String>(Method::GET, &path, token, RequestConfig::raw_text(), None)
            .await?;
        Ok(response.map(|r| r.data).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const PROJECT: &str = r#"{"id":42,"name":"billing","description":"Billing service",
        "topics":["payments"],"default_branch":"main",
        "namespace":{"id":7,"name":"Platform","full_path":"platform"},
        "web_url":"https://gitlab.com/platform/billing",
        "path_with_namespace":"platform/billing",
        "created_at":"2023-05-01T10:00:00Z"}"#;

    #[tokio::test]
    async fn get_group_projects_sends_page_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/groups/7/projects")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("per_page".into(), "50".into()),
                Matcher::UrlEncoded("search".into(), "bill".into()),
                Matcher::UrlEncoded("include_subgroups".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header("x-total", "51")
            .with_body(format!("[{PROJECT}]"))
            .create_async()
            .await;

        let client = GitlabClient::new(&server.url()).unwrap();
        let page = client
            .get_group_projects("token", 7, 2, 50, Some("bill"))
            .await
            .unwrap();

        assert_eq!(page.data[0].name, "billing");
        assert_eq!(page.total(), Some(51));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_variable_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/variables/COMPASS_DEPLOYMENT_TIERS")
            .with_status(404)
            .with_body(r#"{"message":"404 Variable Not Found"}"#)
            .create_async()
            .await;

        let client = GitlabClient::new(&server.url()).unwrap();
        let variable = client
            .get_project_variable("token", 42, "COMPASS_DEPLOYMENT_TIERS")
            .await
            .unwrap();
        assert!(variable.is_none());
    }

    #[tokio::test]
    async fn variable_lookup_propagates_other_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/variables/X")
            .with_status(403)
            .create_async()
            .await;

        let client = GitlabClient::new(&server.url()).unwrap();
        let err = client.get_project_variable("token", 42, "X").await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn file_path_is_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/projects/42/repository/files/svc%2Fcompass.yml/raw")
            .match_query(Matcher::UrlEncoded("ref".into(), "abc123".into()))
            .with_status(200)
            .with_body("name: svc")
            .create_async()
            .await;

        let client = GitlabClient::new(&server.url()).unwrap();
        let content = client
            .get_file_content("token", 42, "svc/compass.yml", "abc123")
            .await
            .unwrap();
        assert_eq!(content, "name: svc");
        mock.assert_async().await;
    }
}
