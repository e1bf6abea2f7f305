//! Validation of a parsed `compass.yml` document.
//!
//! `validate_config` is pure: it walks the document against the schema tables
//! in [`super::schema`] and returns every violation it finds, in a stable
//! order. Top-level problems come first (missing keys, wrong types, value
//! checks, then unknown keys), followed by nested sections in the order
//! `fields`, `links`, `relationships`. A nested section is only visited when
//! its top-level value passed the type check.

use serde_yaml::{Mapping, Value};

use super::ari::Ari;
use super::schema::{
    fields_schema, link_schema, top_level_schema, FieldSpec, Presence, ValueType,
    DESCRIPTION_MAX_LENGTH, DISPLAY_VALUE_MAX_LENGTH, NAME_MAX_LENGTH, VALID_LIFECYCLES,
    VALID_LINK_TYPES, VALID_RELATIONSHIP_TYPES, VALID_TIERS,
};
use super::ComponentType;

pub const NOT_AN_OBJECT: &str = "Config file must be a YAML object";

pub fn validate_config(config: &Value, default_type: ComponentType) -> Vec<String> {
    let Some(document) = config.as_mapping() else {
        return vec![NOT_AN_OBJECT.to_string()];
    };

    let component_type = document
        .get("typeId")
        .and_then(Value::as_str)
        .and_then(ComponentType::from_type_id)
        .unwrap_or(default_type);

    let mut errors = Vec::new();
    let passed = check_object(
        document,
        &top_level_schema(component_type),
        None,
        &mut errors,
        check_top_level_value,
    );

    if component_type == ComponentType::Service && !is_present(document, "fields") {
        errors.push(missing_field("fields.tier"));
    }

    if passed.contains(&"fields") {
        if let Some(fields) = document.get("fields").and_then(Value::as_mapping) {
            check_object(
                fields,
                &fields_schema(component_type),
                Some("fields"),
                &mut errors,
                check_fields_value,
            );
        }
    }

    if passed.contains(&"links") {
        if let Some(links) = document.get("links").and_then(Value::as_sequence) {
            check_links(links, &mut errors);
        }
    }

    if passed.contains(&"relationships") {
        if let Some(relationships) = document.get("relationships").and_then(Value::as_mapping) {
            check_relationships(relationships, &mut errors);
        }
    }

    errors
}

/// Presence, type and value checks for one mapping, then unknown keys.
/// Returns the keys whose values passed the type check.
fn check_object<F>(
    map: &Mapping,
    schema: &[FieldSpec],
    parent: Option<&str>,
    errors: &mut Vec<String>,
    check_value: F,
) -> Vec<&'static str>
where
    F: Fn(&str, &str, &Value) -> Option<String>,
{
    let mut passed = Vec::new();

    for spec in schema {
        let path = join_path(parent, spec.key);
        let value = match map.get(spec.key) {
            Some(value) if !value.is_null() => value,
            _ => {
                if spec.presence == Presence::Required {
                    errors.push(missing_field(&path));
                }
                continue;
            }
        };

        if !spec.value_type.accepts(value) {
            errors.push(wrong_type(&path, spec.value_type));
            continue;
        }

        if spec.value_type == ValueType::Ari {
            if let Some(error) = value.as_str().and_then(|ari| check_ari(&path, ari)) {
                errors.push(error);
                continue;
            }
        }

        if let Some(error) = check_value(&path, spec.key, value) {
            errors.push(error);
        }
        passed.push(spec.key);
    }

    for (key, _) in map {
        let name = key_text(key);
        if !schema.iter().any(|spec| spec.key == name) {
            errors.push(unknown_field(&join_path(parent, &name)));
        }
    }

    passed
}

fn check_top_level_value(path: &str, key: &str, value: &Value) -> Option<String> {
    match key {
        "name" => {
            let name = value.as_str()?;
            if name.trim().is_empty() {
                Some(format!("\"{path}\" cannot be blank"))
            } else {
                check_length(path, name, NAME_MAX_LENGTH)
            }
        }
        "description" => check_length(path, value.as_str()?, DESCRIPTION_MAX_LENGTH),
        "typeId" => {
            let type_id = value.as_str()?;
            if ComponentType::from_type_id(type_id).is_some() {
                None
            } else {
                Some(invalid_enum(path, type_id, &ComponentType::type_ids()))
            }
        }
        _ => None,
    }
}

fn check_fields_value(path: &str, key: &str, value: &Value) -> Option<String> {
    match key {
        "tier" => check_enum(path, value, &VALID_TIERS, false),
        "lifecycle" => check_enum(path, value, &VALID_LIFECYCLES, false),
        _ => None,
    }
}

fn check_link_value(path: &str, key: &str, value: &Value) -> Option<String> {
    match key {
        "type" => check_enum(path, value, &VALID_LINK_TYPES, true),
        _ => None,
    }
}

fn check_links(links: &[Value], errors: &mut Vec<String>) {
    let schema = link_schema();
    for (index, link) in links.iter().enumerate() {
        let path = format!("links[{index}]");
        match link.as_mapping() {
            Some(map) => {
                check_object(map, &schema, Some(&path), errors, check_link_value);
            }
            None => errors.push(wrong_type(&path, ValueType::Object)),
        }
    }
}

fn check_relationships(relationships: &Mapping, errors: &mut Vec<String>) {
    for (key, value) in relationships {
        let name = key_text(key);
        let path = format!("relationships.{name}");

        if !VALID_RELATIONSHIP_TYPES.contains(&name.as_str()) {
            errors.push(unknown_field(&path));
            continue;
        }

        let Some(targets) = value.as_sequence() else {
            errors.push(wrong_type(&path, ValueType::Array));
            continue;
        };

        for (index, target) in targets.iter().enumerate() {
            let target_path = format!("{path}[{index}]");
            match target.as_str() {
                Some(ari) => errors.extend(check_ari(&target_path, ari)),
                None => errors.push(wrong_type(&target_path, ValueType::Ari)),
            }
        }
    }
}

fn check_ari(path: &str, value: &str) -> Option<String> {
    Ari::parse(value)
        .err()
        .map(|_| format!("\"{path}\" must be a valid ARI"))
}

fn check_length(path: &str, value: &str, max: usize) -> Option<String> {
    (value.chars().count() > max)
        .then(|| format!("\"{path}\" must be at most {max} characters"))
}

fn check_enum(path: &str, value: &Value, allowed: &[&str], ignore_case: bool) -> Option<String> {
    let text = scalar_text(value).unwrap_or_default();
    let matches = allowed.iter().any(|candidate| {
        if ignore_case {
            candidate.eq_ignore_ascii_case(&text)
        } else {
            *candidate == text
        }
    });
    (!matches).then(|| invalid_enum(path, &text, allowed))
}

fn is_present(map: &Mapping, key: &str) -> bool {
    map.get(key).is_some_and(|value| !value.is_null())
}

fn join_path(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{key}"),
        None => key.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn key_text(key: &Value) -> String {
    scalar_text(key).unwrap_or_else(|| format!("{key:?}"))
}

pub fn truncate_for_display(value: &str) -> String {
    if value.chars().count() > DISPLAY_VALUE_MAX_LENGTH {
        let head: String = value.chars().take(DISPLAY_VALUE_MAX_LENGTH).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

fn missing_field(path: &str) -> String {
    format!("\"{path}\" is a required field")
}

fn wrong_type(path: &str, value_type: ValueType) -> String {
    format!("\"{path}\" must be of type \"{}\"", value_type.label())
}

fn unknown_field(path: &str) -> String {
    format!("\"{path}\" is not a valid property")
}

fn invalid_enum(path: &str, value: &str, allowed: &[&str]) -> String {
    format!(
        "\"{path}\" has an invalid value \"{}\", expected one of: {}",
        truncate_for_display(value),
        allowed.join(", ")
    )
}
