//! Config-as-code: `compass.yml` files kept in GitLab repositories.

pub mod ari;
pub mod document;
pub mod schema;
pub mod validator;

use serde::{Deserialize, Serialize};

pub use document::CompassYaml;
pub use validator::validate_config;

pub const CAC_FILENAMES: [&str; 2] = ["compass.yml", "compass.yaml"];

/// True when the final path segment is exactly `compass.yml` or `compass.yaml`.
pub fn check_cac_filename(path: &str) -> bool {
    let filename = path.rsplit('/').next().unwrap_or(path);
    CAC_FILENAMES.contains(&filename)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    Service,
    Library,
    Application,
    Capability,
    CloudResource,
    DataPipeline,
    MachineLearningModel,
    UiElement,
    Website,
    Other,
}

impl ComponentType {
    const ALL: [ComponentType; 10] = [
        Self::Service,
        Self::Library,
        Self::Application,
        Self::Capability,
        Self::CloudResource,
        Self::DataPipeline,
        Self::MachineLearningModel,
        Self::UiElement,
        Self::Website,
        Self::Other,
    ];

    pub fn as_type_id(self) -> &'static str {
        match self {
            Self::Service => "SERVICE",
            Self::Library => "LIBRARY",
            Self::Application => "APPLICATION",
            Self::Capability => "CAPABILITY",
            Self::CloudResource => "CLOUD_RESOURCE",
            Self::DataPipeline => "DATA_PIPELINE",
            Self::MachineLearningModel => "MACHINE_LEARNING_MODEL",
            Self::UiElement => "UI_ELEMENT",
            Self::Website => "WEBSITE",
            Self::Other => "OTHER",
        }
    }

    /// Type ids are matched case-insensitively.
    pub fn from_type_id(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_type_id().eq_ignore_ascii_case(value.trim()))
    }

    pub fn type_ids() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_type_id()).collect()
    }
}

/// Parse and validate file content. `Err` carries every violation found,
/// including a YAML syntax error as a single entry.
pub fn load_config(
    content: &str,
    default_type: ComponentType,
) -> std::result::Result<CompassYaml, Vec<String>> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| vec![format!("Invalid YAML: {e}")])?;

    let errors = validate_config(&value, default_type);
    if !errors.is_empty() {
        return Err(errors);
    }

    serde_yaml::from_value(value).map_err(|e| vec![format!("Invalid config file: {e}")])
}
