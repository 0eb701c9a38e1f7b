use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AdapterError, AdapterResult, ResourceType};

static DNS1123_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex"));
static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("static regex")
});

/// Namespace-style name: at most 63 chars of `[a-z0-9-]`, alphanumeric at both ends.
pub fn is_dns1123_label(s: &str) -> bool {
    s.len() <= 63 && DNS1123_LABEL.is_match(s)
}

/// Object-style name: dot separated labels, at most 253 chars.
pub fn is_dns1123_subdomain(s: &str) -> bool {
    s.len() <= 253 && DNS1123_SUBDOMAIN.is_match(s)
}

/// Address of one object instance. Cluster-scoped kinds carry no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceIdentity {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> AdapterResult<Self> {
        let id = Self { name: name.into(), namespace: Some(namespace.into()) };
        id.check(true)?;
        Ok(id)
    }

    pub fn cluster(name: impl Into<String>) -> AdapterResult<Self> {
        let id = Self { name: name.into(), namespace: None };
        id.check(false)?;
        Ok(id)
    }

    /// Build an identity for `ty`, requiring a namespace exactly when the kind is namespaced.
    pub fn for_type(ty: &ResourceType, namespace: Option<&str>, name: &str) -> AdapterResult<Self> {
        if ty.namespaced {
            match namespace {
                Some(ns) => Self::namespaced(ns, name),
                None => Err(AdapterError::InvalidIdentity(format!("{} is namespaced; namespace is required", ty.kind))),
            }
        } else {
            Self::cluster(name)
        }
    }

    pub fn validate_for(&self, ty: &ResourceType) -> AdapterResult<()> {
        self.check(ty.namespaced)
    }

    fn check(&self, namespaced: bool) -> AdapterResult<()> {
        if self.name.is_empty() {
            return Err(AdapterError::InvalidIdentity("name must not be empty".into()));
        }
        if !is_dns1123_subdomain(&self.name) {
            return Err(AdapterError::InvalidIdentity(format!("name {:?} is not a valid DNS-1123 subdomain", self.name)));
        }
        match (namespaced, self.namespace.as_deref()) {
            (true, None) | (true, Some("")) => Err(AdapterError::InvalidIdentity("namespace must not be empty".into())),
            (true, Some(ns)) if !is_dns1123_label(ns) => {
                Err(AdapterError::InvalidIdentity(format!("namespace {:?} is not a valid DNS-1123 label", ns)))
            }
            (false, Some(_)) => Err(AdapterError::InvalidIdentity("cluster-scoped kinds take no namespace".into())),
            _ => Ok(()),
        }
    }

    /// Opaque external id: `namespace/name`, or `name` for cluster-scoped kinds.
    pub fn external_id(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external_id())
    }
}

/// Parse an import id. Runs before any network access; every malformed id is `ImportFailed`.
pub fn parse_external_id(id: &str, namespaced: bool) -> AdapterResult<ResourceIdentity> {
    let parts: Vec<&str> = id.split('/').collect();
    let parsed = match (namespaced, parts.as_slice()) {
        (true, [ns, name]) if !ns.is_empty() && !name.is_empty() => {
            ResourceIdentity { name: (*name).to_string(), namespace: Some((*ns).to_string()) }
        }
        (true, _) => return Err(AdapterError::ImportFailed(format!("expected <namespace>/<name>, got {:?}", id))),
        (false, [name]) if !name.is_empty() => ResourceIdentity { name: (*name).to_string(), namespace: None },
        (false, _) => return Err(AdapterError::ImportFailed(format!("expected <name>, got {:?}", id))),
    };
    parsed.check(namespaced).map_err(|e| AdapterError::ImportFailed(e.to_string()))?;
    Ok(parsed)
}
