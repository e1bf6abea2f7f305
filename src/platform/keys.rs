//! Storage key layout. Keys are flat strings so that prefix scans can list
//! every record of one kind.

pub const GROUP_PREFIX: &str = "group-";
pub const FAILED_IMPORT_PREFIX: &str = "failed-import-";
pub const IMPORT_JOB_IDS_PREFIX: &str = "import-job-ids-";
pub const BACKFILL_SCHEMA_VERSION: &str = "backfill-schema-version";

pub fn group(group_id: u64) -> String {
    format!("{GROUP_PREFIX}{group_id}")
}

/// Secret namespace
pub fn token(group_id: u64) -> String {
    format!("token-{group_id}")
}

pub fn token_role(group_id: u64) -> String {
    format!("token-role-{group_id}")
}

pub fn webhook_id(group_id: u64) -> String {
    format!("webhook-id-{group_id}")
}

/// Secret namespace
pub fn webhook_signature(group_id: u64) -> String {
    format!("webhook-sign-{group_id}")
}

pub fn connect_in_progress(group_id: u64) -> String {
    format!("connect-in-progress-{group_id}")
}

/// Ids of the import jobs last queued for a group.
pub fn import_job_ids(group_id: u64) -> String {
    format!("{IMPORT_JOB_IDS_PREFIX}{group_id}")
}

/// Prefix of every failure record of one group.
pub fn group_failed_imports(group_id: u64) -> String {
    format!("{FAILED_IMPORT_PREFIX}{group_id}-")
}

pub fn failed_import(group_id: u64, project_id: u64) -> String {
    format!("{}{project_id}", group_failed_imports(group_id))
}

/// Plain keys owned by a group. Failure records are found with
/// [`group_failed_imports`].
pub fn group_keys(group_id: u64) -> [String; 5] {
    [
        group(group_id),
        token_role(group_id),
        webhook_id(group_id),
        connect_in_progress(group_id),
        import_job_ids(group_id),
    ]
}

/// Secret keys owned by a group.
pub fn group_secret_keys(group_id: u64) -> [String; 2] {
    [token(group_id), webhook_signature(group_id)]
}

/// Group id from a `group-{id}` key.
pub fn group_id_from_key(key: &str) -> Option<u64> {
    key.strip_prefix(GROUP_PREFIX)?.parse().ok()
}
