/// Web URL of a deployment's environment page.
///
/// GitLab does not expose a per-deployment page, so events link to the
/// environment view where the deployment is listed.
pub fn environment_url(project_web_url: &str, environment_id: u64) -> String {
    format!(
        "{}/-/environments/{environment_id}",
        project_web_url.trim_end_matches('/')
    )
}

/// Web URL of a pipeline.
pub fn pipeline_url(project_web_url: &str, pipeline_id: u64) -> String {
    format!(
        "{}/-/pipelines/{pipeline_id}",
        project_web_url.trim_end_matches('/')
    )
}

/// Web URL of a file on a branch.
pub fn file_url(project_web_url: &str, branch: &str, file_path: &str) -> String {
    format!(
        "{}/-/blob/{branch}/{file_path}",
        project_web_url.trim_end_matches('/')
    )
}

/// Extracts `group/subgroup/project` from a project web URL on `base_url`.
///
/// Anything after GitLab's `/-/` separator (blobs, pipelines, ...) is
/// dropped, as is a trailing `.git`. Returns `None` for URLs on another host
/// or without at least a group and a project segment.
pub fn project_path_from_url(base_url: &str, url: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let rest = url.strip_prefix(base)?.strip_prefix('/')?;

    let path = rest.split("/-/").next().unwrap_or(rest);
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let path = path.trim_end_matches('/').trim_end_matches(".git");

    if path.split('/').filter(|s| !s.is_empty()).count() < 2 {
        return None;
    }

    Some(path.to_string())
}
