//! Shape of a `compass.yml` document, as data rather than string tags.

use serde_yaml::Value;

use super::ComponentType;

pub const NAME_MAX_LENGTH: usize = 100;
pub const DESCRIPTION_MAX_LENGTH: usize = 1000;
pub const DISPLAY_VALUE_MAX_LENGTH: usize = 25;

pub const VALID_TIERS: [&str; 4] = ["1", "2", "3", "4"];
pub const VALID_LIFECYCLES: [&str; 3] = ["Active", "Pre-release", "Deprecated"];
pub const VALID_LINK_TYPES: [&str; 7] = [
    "DOCUMENT",
    "CHAT_CHANNEL",
    "REPOSITORY",
    "PROJECT",
    "DASHBOARD",
    "ON_CALL",
    "OTHER_LINK",
];
pub const VALID_RELATIONSHIP_TYPES: [&str; 1] = ["DEPENDS_ON"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Object,
    Array,
    StringOrNumber,
    /// A string that must parse as an ARI
    Ari,
}

impl ValueType {
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::StringOrNumber => "string|number",
            Self::Ari => "ARI",
        }
    }

    /// Type check only; ARI format is validated separately.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String | Self::Ari => value.is_string(),
            Self::Object => value.is_mapping(),
            Self::Array => value.is_sequence(),
            Self::StringOrNumber => value.is_string() || value.is_number(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub presence: Presence,
    pub value_type: ValueType,
}

const fn field(key: &'static str, presence: Presence, value_type: ValueType) -> FieldSpec {
    FieldSpec {
        key,
        presence,
        value_type,
    }
}

fn required_for_service(component_type: ComponentType) -> Presence {
    if component_type == ComponentType::Service {
        Presence::Required
    } else {
        Presence::Optional
    }
}

/// Top-level keys in reporting order.
pub fn top_level_schema(component_type: ComponentType) -> Vec<FieldSpec> {
    vec![
        field("id", Presence::Required, ValueType::Ari),
        field("name", Presence::Required, ValueType::String),
        field("description", Presence::Optional, ValueType::String),
        field("ownerId", Presence::Optional, ValueType::Ari),
        field("configVersion", Presence::Optional, ValueType::StringOrNumber),
        field("typeId", Presence::Optional, ValueType::String),
        field("fields", required_for_service(component_type), ValueType::Object),
        field("links", Presence::Optional, ValueType::Array),
        field("relationships", Presence::Optional, ValueType::Object),
    ]
}

pub fn fields_schema(component_type: ComponentType) -> Vec<FieldSpec> {
    vec![
        field("tier", required_for_service(component_type), ValueType::StringOrNumber),
        field("lifecycle", Presence::Optional, ValueType::String),
    ]
}

pub fn link_schema() -> Vec<FieldSpec> {
    vec![
        field("type", Presence::Required, ValueType::String),
        field("url", Presence::Required, ValueType::String),
        field("name", Presence::Optional, ValueType::String),
    ]
}
