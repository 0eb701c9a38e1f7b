//! crdsync core types: resource descriptors, records, options and errors.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod identity;

pub use error::{AdapterError, AdapterResult};
pub use identity::{is_dns1123_label, is_dns1123_subdomain, parse_external_id, ResourceIdentity};

pub type Json = serde_json::Value;

/// Static description of one served custom resource kind.
///
/// This is the only thing that varies between the generated resource types:
/// the adapter is parameterized by it and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceType {
    /// API group, empty for the core group.
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    /// Lowercase plural used in REST paths, e.g. `appprojects`.
    pub plural: &'static str,
    pub namespaced: bool,
    pub description: &'static str,
}

impl ResourceType {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// `group/version/Kind` (or `version/Kind` for the core group).
    pub fn gvk_key(&self) -> String {
        format!("{}/{}", self.api_version(), self.kind)
    }
}

/// The subset of object metadata a record owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Desired or observed state of one custom resource instance.
///
/// `S` is the CRD-specific spec tree. Untyped callers use the default
/// `serde_json::Value`; typed callers plug in their own serde struct. Server
/// owned fields (`status`, `managedFields`, `uid`, ...) are dropped on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord<S = Json> {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: RecordMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<S>,
}

impl<S> ResourceRecord<S> {
    pub fn new(spec: Option<S>) -> Self {
        Self { api_version: String::new(), kind: String::new(), metadata: RecordMeta::default(), spec }
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_annotations<I, K, V>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.annotations.extend(annotations.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Inject the constant `apiVersion`/`kind` of `ty` and the addressing
    /// metadata from `identity`. Whatever the caller put there is overwritten.
    pub fn stamp(&mut self, ty: &ResourceType, identity: &ResourceIdentity) {
        self.api_version = ty.api_version();
        self.kind = ty.kind.to_string();
        self.metadata.name = identity.name.clone();
        self.metadata.namespace = if ty.namespaced { identity.namespace.clone() } else { None };
    }
}

/// Server-side field validation directive sent with apply patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldValidation {
    Ignore,
    Warn,
    #[default]
    Strict,
}

/// Fully resolved options for one server-side apply request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOptions {
    pub field_manager: String,
    pub force: bool,
    pub field_validation: FieldValidation,
}

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Post-apply readiness condition: the value at `json_path` must render as `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitCondition {
    pub json_path: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl WaitCondition {
    pub fn timeout(&self) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_WAIT_TIMEOUT)
    }
}

/// Per-instance apply options. `None` means unset (null or unknown in the
/// plan) and falls back to the provider default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_conflicts: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<WaitCondition>,
}

pub mod prelude {
    pub use super::{
        AdapterError, AdapterResult, FieldValidation, Json, OperationOptions, PatchOptions, RecordMeta,
        ResourceIdentity, ResourceRecord, ResourceType, WaitCondition,
    };
}
