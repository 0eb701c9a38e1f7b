//! crdsync kubehub: the dynamic client contract and its kube-rs implementation.
//!
//! Objects travel as opaque JSON; the client is addressed per call by a
//! [`ResourceType`] descriptor instead of compiled-in API types.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use crdsync_core::{FieldValidation, Json, PatchOptions, ResourceType};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{params::ValidationDirective, ApiResource, DynamicObject, GroupVersionKind},
    Client, Config,
};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod fake;

pub use fake::FakeDynamicClient;

/// Errors surfaced by a [`DynamicClient`]. Server text is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("not found")]
    NotFound,
    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Generic get/patch/delete against any `{group, version, resource}`.
///
/// `namespace` is ignored for cluster-scoped types.
#[async_trait]
pub trait DynamicClient: Send + Sync {
    async fn get(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<Json, ClientError>;

    /// Server-side apply of a JSON `body`; returns the object as persisted by the server.
    async fn patch(
        &self,
        ty: &ResourceType,
        namespace: Option<&str>,
        name: &str,
        body: &[u8],
        opts: &PatchOptions,
    ) -> Result<Json, ClientError>;

    async fn delete(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<(), ClientError>;
}

/// Where to find cluster credentials. Empty settings use the ambient kubeconfig / in-cluster config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubeSettings {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// Build a kube client from explicit settings, falling back to `Client::try_default`.
pub async fn connect(settings: &KubeSettings) -> Result<Client> {
    if settings.kubeconfig.is_none() && settings.context.is_none() {
        return Client::try_default().await.context("inferring kube client config");
    }
    let opts = KubeConfigOptions { context: settings.context.clone(), ..Default::default() };
    let config = match &settings.kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kc, &opts).await.context("loading kubeconfig")?
        }
        None => Config::from_kubeconfig(&opts).await.context("loading kubeconfig")?,
    };
    info!(context = ?settings.context, kubeconfig = ?settings.kubeconfig, "kube client configured");
    Client::try_from(config).context("building kube client")
}

/// [`DynamicClient`] over `kube::Api<DynamicObject>`.
#[derive(Clone)]
pub struct KubeDynamicClient {
    client: Client,
}

impl KubeDynamicClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ty: &ResourceType, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(ty);
        match namespace {
            Some(ns) if ty.namespaced => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

/// Descriptor to `ApiResource` without a discovery round trip.
pub fn api_resource(ty: &ResourceType) -> ApiResource {
    let gvk = GroupVersionKind::gvk(ty.group, ty.version, ty.kind);
    ApiResource::from_gvk_with_plural(&gvk, ty.plural)
}

pub fn patch_params(opts: &PatchOptions) -> PatchParams {
    let mut pp = PatchParams::apply(&opts.field_manager);
    if opts.force {
        pp = pp.force();
    }
    pp.field_validation = Some(match opts.field_validation {
        FieldValidation::Ignore => ValidationDirective::Ignore,
        FieldValidation::Warn => ValidationDirective::Warn,
        FieldValidation::Strict => ValidationDirective::Strict,
    });
    pp
}

fn map_kube_err(e: kube::Error) -> ClientError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound,
        kube::Error::Api(ae) => ClientError::Api { code: ae.code, message: ae.message },
        other => ClientError::Transport(other.to_string()),
    }
}

fn to_json(obj: &DynamicObject) -> Result<Json, ClientError> {
    serde_json::to_value(obj).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl DynamicClient for KubeDynamicClient {
    async fn get(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<Json, ClientError> {
        let t0 = Instant::now();
        let obj = self.api(ty, namespace).get(name).await.map_err(map_kube_err)?;
        histogram!("crdsync_kube_get_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(gvk = %ty.gvk_key(), ns = ?namespace, name, "kube get ok");
        to_json(&obj)
    }

    async fn patch(
        &self,
        ty: &ResourceType,
        namespace: Option<&str>,
        name: &str,
        body: &[u8],
        opts: &PatchOptions,
    ) -> Result<Json, ClientError> {
        let t0 = Instant::now();
        let doc: Json = serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        let pp = patch_params(opts);
        let obj = self.api(ty, namespace).patch(name, &pp, &Patch::Apply(&doc)).await.map_err(map_kube_err)?;
        histogram!("crdsync_kube_patch_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(gvk = %ty.gvk_key(), ns = ?namespace, name, rv = ?obj.metadata.resource_version, "kube apply ok");
        to_json(&obj)
    }

    async fn delete(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<(), ClientError> {
        self.api(ty, namespace).delete(name, &DeleteParams::default()).await.map_err(map_kube_err)?;
        counter!("crdsync_kube_delete", 1u64);
        debug!(gvk = %ty.gvk_key(), ns = ?namespace, name, "kube delete accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIST: ResourceType = ResourceType {
        group: "cloudfront.services.k8s.aws",
        version: "v1alpha1",
        kind: "Distribution",
        plural: "distributions",
        namespaced: true,
        description: "",
    };

    #[test]
    fn api_resource_uses_descriptor_plural() {
        let ar = api_resource(&DIST);
        assert_eq!(ar.plural, "distributions");
        assert_eq!(ar.api_version, "cloudfront.services.k8s.aws/v1alpha1");
        assert_eq!(ar.kind, "Distribution");
    }

    #[test]
    fn patch_params_carry_manager_force_and_strict_validation() {
        let opts = PatchOptions { field_manager: "tf".into(), force: true, field_validation: FieldValidation::Strict };
        let pp = patch_params(&opts);
        assert_eq!(pp.field_manager.as_deref(), Some("tf"));
        assert!(pp.force);
        assert!(matches!(pp.field_validation, Some(ValidationDirective::Strict)));

        let soft = PatchOptions { field_manager: "tf".into(), force: false, field_validation: FieldValidation::Warn };
        let pp = patch_params(&soft);
        assert!(!pp.force);
        assert!(matches!(pp.field_validation, Some(ValidationDirective::Warn)));
    }
}
