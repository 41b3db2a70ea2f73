//! Versions and the resource config scopes that own them.

use crate::id::{ScopeId, VersionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Opaque key-value version content as reported by a check.
pub type VersionContent = BTreeMap<String, String>;

/// A single discovered version of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique identifier
    pub id: VersionId,

    /// Owning scope
    pub scope_id: ScopeId,

    /// Version content
    pub content: VersionContent,

    /// Metadata reported alongside the version
    #[serde(default)]
    pub metadata: Vec<MetadataField>,

    /// Discovery order within the scope. Sole ordering for "latest".
    pub check_order: u64,

    /// Disabled versions are never offered as build inputs
    pub enabled: bool,

    /// Comment attached when the version was pinned
    #[serde(default)]
    pub pin_comment: Option<String>,
}

/// A version as reported by a check, before the store assigns it an id and
/// a check order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredVersion {
    /// Version content
    pub content: VersionContent,
    /// Metadata reported alongside the version
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}

impl From<VersionContent> for DiscoveredVersion {
    fn from(content: VersionContent) -> Self {
        Self { content, metadata: Vec::new() }
    }
}

/// A name/value metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    /// Field name
    pub name: String,
    /// Field value
    pub value: String,
}

/// Deduplication unit for version history: checkables with identical type
/// and source share one scope and therefore one version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfigScope {
    /// Hash of type + source
    pub id: ScopeId,

    /// Declared type name
    pub type_name: String,

    /// Source configuration
    pub source: serde_json::Value,
}

impl ResourceConfigScope {
    /// Build the scope for a type/source pair.
    pub fn new(type_name: impl Into<String>, source: serde_json::Value) -> Self {
        let type_name = type_name.into();
        let id = Self::id_for(&type_name, &source);
        Self { id, type_name, source }
    }

    /// Compute the scope id without building the scope.
    pub fn id_for(type_name: &str, source: &serde_json::Value) -> ScopeId {
        let mut canonical = String::new();
        write_canonical(source, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(type_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        ScopeId(format!("{:x}", hasher.finalize()))
    }
}

/// Serialize JSON with object keys sorted, independent of map ordering features.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_id_ignores_key_order() {
        let a = ResourceConfigScope::id_for("git", &json!({"uri": "x", "branch": "main"}));
        let b = ResourceConfigScope::id_for("git", &json!({"branch": "main", "uri": "x"}));
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 64);
    }

    #[test]
    fn test_scope_id_depends_on_type_and_source() {
        let source = json!({"uri": "x"});
        let git = ResourceConfigScope::id_for("git", &source);
        let hg = ResourceConfigScope::id_for("hg", &source);
        let other = ResourceConfigScope::id_for("git", &json!({"uri": "y"}));
        assert_ne!(git, hg);
        assert_ne!(git, other);
    }

    #[test]
    fn test_nested_source_is_canonical() {
        let a = ResourceConfigScope::id_for("s3", &json!({"a": {"z": 1, "y": [1, {"b": 2, "a": 1}]}}));
        let b = ResourceConfigScope::id_for("s3", &json!({"a": {"y": [1, {"a": 1, "b": 2}], "z": 1}}));
        assert_eq!(a, b);
    }
}
