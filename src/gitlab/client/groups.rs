use super::core::{GitlabClient, QueryParams};
use crate::error::Result;
use crate::gitlab::types::{AccessLevel, GitlabGroup, GroupAccessToken};

impl GitlabClient {
    /// Groups visible to `token`, optionally restricted to a minimum role.
    pub async fn get_groups(
        &self,
        token: &str,
        min_access_level: Option<AccessLevel>,
    ) -> Result<Vec<GitlabGroup>> {
        let path = QueryParams::new()
            .push_opt("min_access_level", min_access_level.map(AccessLevel::level))
            .apply("groups");
        Ok(self.get_json(&path, token).await?.data)
    }

    pub async fn get_group(&self, token: &str, group_id: u64) -> Result<GitlabGroup> {
        Ok(self.get_json(&format!("groups/{group_id}"), token).await?.data)
    }

    pub async fn get_group_access_tokens(
        &self,
        token: &str,
        group_id: u64,
    ) -> Result<Vec<GroupAccessToken>> {
        let path = format!("groups/{group_id}/access_tokens");
        Ok(self.get_json(&path, token).await?.data)
    }
}
