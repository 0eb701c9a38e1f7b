//! crdsync schema: resource catalog, Terraform type naming, attribute schemas
//! and the small json-path grammar used by `wait_for`.

#![forbid(unsafe_code)]

use crdsync_core::{is_dns1123_label, is_dns1123_subdomain, ResourceType};
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use serde::Serialize;

mod catalog;

pub use catalog::CATALOG;

pub const DEFAULT_PROVIDER: &str = "k8s";
pub const MANIFEST_SUFFIX: &str = "_manifest";

/// `AppProject` -> `app_project`, `VPCOrigin` -> `vpc_origin`.
pub fn snake_case(kind: &str) -> String {
    let chars: Vec<char> = kind.chars().collect();
    let mut out = String::with_capacity(kind.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_ascii_lowercase()).unwrap_or(false);
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// `{provider}_{group}_{kind}_{version}` with `.`/`-` in the group folded to `_`.
pub fn terraform_type_name(provider: &str, ty: &ResourceType) -> String {
    let kind = snake_case(ty.kind);
    if ty.group.is_empty() {
        format!("{}_{}_{}", provider, kind, ty.version)
    } else {
        let group: String = ty.group.chars().map(|c| if c == '.' || c == '-' { '_' } else { c }).collect();
        format!("{}_{}_{}_{}", provider, group, kind, ty.version)
    }
}

pub fn manifest_type_name(provider: &str, ty: &ResourceType) -> String {
    format!("{}{}", terraform_type_name(provider, ty), MANIFEST_SUFFIX)
}

/// Lookup over a set of descriptors under one provider prefix.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    provider: &'static str,
    types: &'static [ResourceType],
}

impl Default for Catalog {
    fn default() -> Self {
        Self { provider: DEFAULT_PROVIDER, types: CATALOG }
    }
}

impl Catalog {
    pub fn new(provider: &'static str, types: &'static [ResourceType]) -> Self {
        Self { provider, types }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn types(&self) -> &'static [ResourceType] {
        self.types
    }

    /// Resolve a resource or data-source type name; a `_manifest` suffix is accepted.
    pub fn by_type_name(&self, name: &str) -> Option<&'static ResourceType> {
        let base = name.strip_suffix(MANIFEST_SUFFIX).unwrap_or(name);
        self.types.iter().find(|t| terraform_type_name(self.provider, t) == base)
    }

    pub fn by_api_version_kind(&self, api_version: &str, kind: &str) -> Option<&'static ResourceType> {
        self.types.iter().find(|t| t.kind == kind && t.api_version() == api_version)
    }

    /// Closest type names for an unknown `name`, best first.
    pub fn suggest(&self, name: &str, limit: usize) -> Vec<String> {
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, String)> = self
            .types
            .iter()
            .map(|t| terraform_type_name(self.provider, t))
            .filter_map(|n| matcher.fuzzy_match(&n, name).map(|s| (s, n)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.into_iter().take(limit).map(|(_, n)| n).collect()
    }
}

// ---- attribute schemas ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Bool,
    Int,
    Map(Box<AttrType>),
    List(Box<AttrType>),
    Object(Vec<Attribute>),
    /// Arbitrary JSON tree, used for the CRD-specific `spec`.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    Dns1123Subdomain,
    Dns1123Label,
    JsonPath,
}

impl Validator {
    pub fn check(&self, value: &str) -> bool {
        match self {
            Self::Dns1123Subdomain => is_dns1123_subdomain(value),
            Self::Dns1123Label => is_dns1123_label(value),
            Self::JsonPath => normalize_json_path(value).is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: AttrType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
}

impl Attribute {
    fn new(name: &'static str, ty: AttrType, description: impl Into<String>) -> Self {
        Self { name, ty, required: false, optional: false, computed: false, description: description.into(), validators: Vec::new() }
    }
    fn required(mut self) -> Self {
        self.required = true;
        self
    }
    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
    fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
    fn validate(mut self, v: Validator) -> Self {
        self.validators.push(v);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub description: String,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    /// Find an attribute by dotted path, e.g. `metadata.name`.
    pub fn attribute(&self, path: &str) -> Option<&Attribute> {
        let mut attrs = self.attributes.as_slice();
        let mut segs = path.split('.').peekable();
        while let Some(seg) = segs.next() {
            let a = attrs.iter().find(|a| a.name == seg)?;
            if segs.peek().is_none() {
                return Some(a);
            }
            attrs = match &a.ty {
                AttrType::Object(children) => children,
                AttrType::List(inner) => match inner.as_ref() {
                    AttrType::Object(children) => children,
                    _ => return None,
                },
                _ => return None,
            };
        }
        None
    }
}

fn metadata_attribute(ty: &ResourceType) -> Attribute {
    let mut children = vec![Attribute::new("name", AttrType::String, "Unique name of the object within its namespace.")
        .required()
        .validate(Validator::Dns1123Subdomain)];
    if ty.namespaced {
        children.push(
            Attribute::new("namespace", AttrType::String, "Namespace the object lives in.")
                .required()
                .validate(Validator::Dns1123Label),
        );
    }
    children.push(Attribute::new("labels", AttrType::Map(Box::new(AttrType::String)), "Key/value labels.").optional());
    children.push(Attribute::new("annotations", AttrType::Map(Box::new(AttrType::String)), "Key/value annotations.").optional());
    Attribute::new("metadata", AttrType::Object(children), "Standard object metadata.").required()
}

fn spec_attribute(ty: &ResourceType) -> Attribute {
    Attribute::new("spec", AttrType::Dynamic, format!("Desired state of the {}.", ty.kind)).optional()
}

fn wait_for_attribute() -> Attribute {
    let children = vec![
        Attribute::new("json_path", AttrType::String, "Path into the applied object, e.g. status.phase.")
            .required()
            .validate(Validator::JsonPath),
        Attribute::new("value", AttrType::String, "Expected rendered value at json_path.").required(),
        Attribute::new("timeout_secs", AttrType::Int, "Give up after this many seconds (default 30).").optional(),
    ];
    Attribute::new("wait_for", AttrType::List(Box::new(AttrType::Object(children))), "Conditions polled after every apply.").optional()
}

/// Schema of a managed `resource` type.
pub fn resource_schema(ty: &ResourceType) -> Schema {
    Schema {
        description: ty.description.to_string(),
        attributes: vec![
            Attribute::new("id", AttrType::String, "Contains the value `metadata.namespace/metadata.name`.").computed(),
            Attribute::new("field_manager", AttrType::String, "Field manager name for server-side apply; defaults to the provider setting.").optional(),
            Attribute::new("force_conflicts", AttrType::Bool, "Take ownership of conflicting fields; defaults to the provider setting.").optional(),
            wait_for_attribute(),
            metadata_attribute(ty),
            spec_attribute(ty),
        ],
    }
}

/// Schema of a cluster-reading `data-source` type.
pub fn data_source_schema(ty: &ResourceType) -> Schema {
    Schema {
        description: ty.description.to_string(),
        attributes: vec![
            Attribute::new("id", AttrType::String, "Contains the value `metadata.namespace/metadata.name`.").computed(),
            metadata_attribute(ty),
            Attribute::new("spec", AttrType::Dynamic, format!("Observed state of the {}.", ty.kind)).computed(),
        ],
    }
}

/// Schema of a local `*_manifest` data-source type.
pub fn manifest_schema(ty: &ResourceType) -> Schema {
    Schema {
        description: ty.description.to_string(),
        attributes: vec![
            Attribute::new("id", AttrType::String, "Contains the value `metadata.namespace/metadata.name`.").computed(),
            Attribute::new("yaml", AttrType::String, "The generated manifest in YAML format.").computed(),
            metadata_attribute(ty),
            spec_attribute(ty),
        ],
    }
}

// ---- json-path helpers ----

/// Normalize a simple path like `.status.conditions[0].type` to `status.conditions[0].type`.
/// Only dot fields with an optional trailing `[index]` per segment are accepted.
pub fn normalize_json_path(jp: &str) -> Option<String> {
    if jp.contains('?') || jp.contains('*') {
        return None;
    }
    let s = jp.strip_prefix("$.").or_else(|| jp.strip_prefix('.')).unwrap_or(jp);
    if s.is_empty() {
        return None;
    }
    for seg in s.split('.') {
        let (key, idx) = match seg.find('[') {
            Some(open) => {
                let idx = seg[open + 1..].strip_suffix(']')?;
                (&seg[..open], Some(idx))
            }
            None => (seg, None),
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return None;
        }
        if let Some(idx) = idx {
            if idx.is_empty() || !idx.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
        }
    }
    Some(s.to_string())
}

/// Follow a normalized path through a JSON tree.
pub fn extract_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut cur = root;
    for seg in path.split('.') {
        let (key, idx) = match seg.find('[') {
            Some(open) => (&seg[..open], Some(seg[open + 1..].strip_suffix(']')?.parse::<usize>().ok()?)),
            None => (seg, None),
        };
        cur = cur.as_object()?.get(key)?;
        if let Some(i) = idx {
            cur = cur.as_array()?.get(i)?;
        }
    }
    Some(cur)
}

/// Scalars render as their plain text; objects, arrays and null do not render.
pub fn render_scalar(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
