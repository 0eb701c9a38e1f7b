//! crdsync manifest: render records to YAML and parse YAML manifests back,
//! entirely locally. Nothing in this crate can reach a cluster.

#![forbid(unsafe_code)]

use crdsync_core::{AdapterError, AdapterResult, Json, ResourceIdentity, ResourceRecord, ResourceType};
use serde::Serialize;
use tracing::debug;

fn max_yaml_bytes() -> usize {
    std::env::var("CRDSYNC_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn max_yaml_nodes() -> usize {
    std::env::var("CRDSYNC_MAX_YAML_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

fn json_node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max {
            return;
        }
        *cur += 1;
        match v {
            Json::Object(map) => map.values().for_each(|vv| walk(vv, cur, max)),
            Json::Array(arr) => arr.iter().for_each(|vv| walk(vv, cur, max)),
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

/// Render `record` as a YAML manifest for `ty` at `identity`.
///
/// `apiVersion`, `kind`, `metadata.name` and `metadata.namespace` are injected;
/// output is byte-for-byte stable for a given input.
pub fn render<S: Serialize>(ty: &ResourceType, identity: &ResourceIdentity, mut record: ResourceRecord<S>) -> AdapterResult<String> {
    identity.validate_for(ty)?;
    record.stamp(ty, identity);
    let yaml = serde_yaml::to_string(&record).map_err(AdapterError::serialization)?;
    debug!(gvk = %ty.gvk_key(), id = %identity, bytes = yaml.len(), "rendered manifest");
    Ok(yaml)
}

/// A parsed manifest, still untyped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedManifest {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub record: ResourceRecord,
}

/// Parse a single YAML document with `apiVersion`, `kind` and `metadata.name`.
pub fn parse(yaml: &str) -> AdapterResult<ParsedManifest> {
    if yaml.len() > max_yaml_bytes() {
        return Err(AdapterError::Serialization(format!("YAML payload too large (>{} bytes)", max_yaml_bytes())));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| AdapterError::Serialization(format!("parsing YAML: {}", e)))?;
    let json = serde_json::to_value(val).map_err(|e| AdapterError::Serialization(format!("converting YAML to JSON: {}", e)))?;
    if json_node_budget_exceeded(&json, max_yaml_nodes()) {
        return Err(AdapterError::Serialization(format!("YAML document too complex (>{} nodes)", max_yaml_nodes())));
    }
    let field = |ptr: &str| json.pointer(ptr).and_then(Json::as_str).map(str::to_string);
    let api_version = field("/apiVersion").ok_or_else(|| AdapterError::Serialization("YAML missing apiVersion".into()))?;
    let kind = field("/kind").ok_or_else(|| AdapterError::Serialization("YAML missing kind".into()))?;
    let name = field("/metadata/name").ok_or_else(|| AdapterError::Serialization("YAML missing metadata.name".into()))?;
    let namespace = field("/metadata/namespace");
    let record: ResourceRecord = serde_json::from_value(json).map_err(AdapterError::serialization)?;
    Ok(ParsedManifest { api_version, kind, namespace, name, record })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_are_friendly() {
        let e1 = parse("kind: Foo\nmetadata:\n  name: x\n").unwrap_err().to_string();
        assert!(e1.contains("missing apiVersion"), "e1={}", e1);
        let e2 = parse("apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err().to_string();
        assert!(e2.contains("missing kind"), "e2={}", e2);
        let e3 = parse("apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n").unwrap_err().to_string();
        assert!(e3.contains("missing metadata.name"), "e3={}", e3);
        assert!(matches!(parse("a: [unclosed"), Err(AdapterError::Serialization(_))));
    }

    #[test]
    fn node_budget_counts_every_value() {
        let v = serde_json::json!({"a": [1, 2, {"b": 3}]});
        assert!(!json_node_budget_exceeded(&v, 10));
        assert!(json_node_budget_exceeded(&v, 6));
    }
}
