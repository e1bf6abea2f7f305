use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::ComponentType;

/// A validated `compass.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompassYaml {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub config_version: Option<Value>,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub fields: Option<ComponentFields>,
    #[serde(default)]
    pub links: Vec<ComponentLink>,
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentFields {
    /// String or number in the file
    #[serde(default)]
    pub tier: Option<Value>,
    #[serde(default)]
    pub lifecycle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLink {
    #[serde(rename = "type")]
    pub link_type: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationships {
    #[serde(rename = "DEPENDS_ON", default)]
    pub depends_on: Vec<String>,
}

impl CompassYaml {
    pub fn component_type(&self) -> Option<ComponentType> {
        self.type_id.as_deref().and_then(ComponentType::from_type_id)
    }

    pub fn tier(&self) -> Option<u8> {
        match self.fields.as_ref()?.tier.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|t| u8::try_from(t).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn dependencies(&self) -> &[String] {
        self.relationships
            .as_ref()
            .map(|r| r.depends_on.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_links_and_relationships() {
        let doc: CompassYaml = serde_yaml::from_str(
            r#"
id: ari:cloud:compass:c:component/a/b
name: svc
typeId: library
links:
  - type: REPOSITORY
    url: https://gitlab.com/platform/svc
relationships:
  DEPENDS_ON:
    - ari:cloud:compass:c:component/c/d
"#,
        )
        .unwrap();
        assert_eq!(doc.component_type(), Some(ComponentType::Library));
        assert_eq!(doc.links[0].link_type, "REPOSITORY");
        assert_eq!(doc.dependencies(), ["ari:cloud:compass:c:component/c/d"]);
        assert_eq!(doc.tier(), None);
    }
}
