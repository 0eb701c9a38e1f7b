//! crdsync provider surface.
//!
//! Mirrors the lifecycle a Terraform plugin framework drives (`Metadata`,
//! `Schema`, `Configure`, `Create`, `Read`, `Update`, `Delete`,
//! `ImportState`) as in-process traits. Every generated type is the same
//! generic handler parameterized by a catalog [`ResourceType`]; the wire
//! protocol itself is out of scope.

#![forbid(unsafe_code)]

use std::any::Any;
use std::sync::Arc;

use crdsync_apply::{Adapter, ProviderConfig, DEFAULT_FIELD_MANAGER};
use crdsync_core::{
    AdapterError, AdapterResult, Json, OperationOptions, RecordMeta, ResourceIdentity, ResourceRecord, ResourceType,
    WaitCondition,
};
use crdsync_kubehub::{DynamicClient, KubeDynamicClient};
use crdsync_schema::{Catalog, Schema};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod resource;

pub use crdsync_kubehub::KubeSettings;
pub use resource::{CrdDataSource, CrdResource, ManifestDataSource};

// ----------------- Diagnostics -----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A user-visible message attached to an operation's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut d = Self::default();
        d.add_error(summary, detail);
        d
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic { severity: Severity::Error, summary: summary.into(), detail: detail.into() });
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic { severity: Severity::Warning, summary: summary.into(), detail: detail.into() });
    }

    pub fn has_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl From<&AdapterError> for Diagnostics {
    fn from(e: &AdapterError) -> Self {
        let summary = match e {
            AdapterError::Configuration(_) => "Provider Configuration Error",
            AdapterError::Serialization(_) => "Serialization Failed",
            AdapterError::ApplyFailed(_) => "Apply Failed",
            AdapterError::ReadFailed(_) => "Read Failed",
            AdapterError::DeleteFailed(_) => "Delete Failed",
            AdapterError::ImportFailed(_) => "Import Failed",
            AdapterError::InvalidIdentity(_) => "Invalid Identity",
            AdapterError::WaitTimedOut { .. } => "Wait Timed Out",
        };
        Diagnostics::error(summary, e.to_string())
    }
}

/// Outcome of one lifecycle call. `state: None` with no error diagnostics
/// means the instance must be removed from state.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub state: Option<T>,
    pub diagnostics: Diagnostics,
}

impl<T> Response<T> {
    pub fn ok(state: T) -> Self {
        Self { state: Some(state), diagnostics: Diagnostics::default() }
    }

    pub fn removed() -> Self {
        Self { state: None, diagnostics: Diagnostics::default() }
    }

    pub fn failed(state: Option<T>, e: &AdapterError) -> Self {
        Self { state, diagnostics: e.into() }
    }
}

// ----------------- Models -----------------

/// Plan/state of a managed resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: RecordMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_conflicts: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<WaitCondition>,
}

impl ResourceModel {
    pub fn identity(&self, ty: &ResourceType) -> AdapterResult<ResourceIdentity> {
        ResourceIdentity::for_type(ty, self.metadata.namespace.as_deref(), &self.metadata.name)
    }

    pub fn options(&self) -> OperationOptions {
        OperationOptions {
            field_manager: self.field_manager.clone(),
            force_conflicts: self.force_conflicts,
            wait_for: self.wait_for.clone(),
        }
    }

    pub fn record(&self) -> ResourceRecord {
        ResourceRecord { api_version: String::new(), kind: String::new(), metadata: self.metadata.clone(), spec: self.spec.clone() }
    }

    /// Take metadata and spec from the server's record; plan-only options stay as planned.
    pub fn with_record(mut self, record: ResourceRecord) -> Self {
        self.metadata = record.metadata;
        self.spec = record.spec;
        self
    }
}

/// Config/state of a cluster-reading data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: RecordMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Json>,
}

/// Config/state of a `*_manifest` data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: RecordMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaml: Option<String>,
}

// ----------------- Framework-shaped traits -----------------

/// Provider data handed to every resource at configure time.
pub type ProviderDataRef<'a> = Option<&'a (dyn Any + Send + Sync)>;

#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    fn metadata(&self, provider_type_name: &str) -> String;
    fn schema(&self) -> Schema;
    /// `None` means the provider is not configured yet and is not an error.
    fn configure(&mut self, data: ProviderDataRef<'_>) -> Diagnostics;
    async fn create(&self, plan: ResourceModel) -> Response<ResourceModel>;
    async fn read(&self, state: ResourceModel) -> Response<ResourceModel>;
    async fn update(&self, plan: ResourceModel) -> Response<ResourceModel>;
    async fn delete(&self, state: ResourceModel) -> Diagnostics;
    fn import_state(&self, id: &str) -> Response<ResourceModel>;
}

#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    type Model: Send;
    fn metadata(&self, provider_type_name: &str) -> String;
    fn schema(&self) -> Schema;
    fn configure(&mut self, data: ProviderDataRef<'_>) -> Diagnostics;
    async fn read(&self, config: Self::Model) -> Response<Self::Model>;
}

// ----------------- Provider -----------------

/// Provider block settings. Unset values fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub field_manager: Option<String>,
    #[serde(default)]
    pub force_conflicts: Option<bool>,
    #[serde(flatten)]
    pub kube: KubeSettings,
}

impl ProviderSettings {
    pub fn config(&self) -> ProviderConfig {
        ProviderConfig {
            offline: self.offline,
            field_manager: self.field_manager.clone().unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string()),
            force_conflicts: self.force_conflicts.unwrap_or(false),
        }
    }
}

/// Immutable result of provider configuration, shared by every resource.
#[derive(Clone)]
pub struct ProviderData {
    config: Arc<ProviderConfig>,
    client: Option<Arc<dyn DynamicClient>>,
}

impl ProviderData {
    pub fn new(config: ProviderConfig, client: Option<Arc<dyn DynamicClient>>) -> Self {
        Self { config: Arc::new(config), client }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn adapter(&self) -> Adapter {
        Adapter::new(self.config.clone(), self.client.clone())
    }
}

pub struct Provider {
    catalog: Catalog,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}

impl Provider {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn type_name(&self) -> &'static str {
        self.catalog.provider()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Build the shared provider data. Offline mode never constructs a client.
    pub async fn configure(&self, settings: &ProviderSettings) -> Result<ProviderData, Diagnostics> {
        let config = settings.config();
        if config.offline {
            info!("provider configured offline; cluster operations disabled");
            return Ok(ProviderData::new(config, None));
        }
        match crdsync_kubehub::connect(&settings.kube).await {
            Ok(client) => {
                info!(field_manager = %config.field_manager, force_conflicts = config.force_conflicts, "provider configured");
                let client: Arc<dyn DynamicClient> = Arc::new(KubeDynamicClient::new(client));
                Ok(ProviderData::new(config, Some(client)))
            }
            Err(e) => {
                warn!(error = ?e, "kube client setup failed");
                Err(Diagnostics::error("Unable to create Kubernetes client", format!("{:#}", e)))
            }
        }
    }

    pub fn resources(&self) -> Vec<CrdResource> {
        self.catalog.types().iter().map(CrdResource::new).collect()
    }

    pub fn data_sources(&self) -> Vec<CrdDataSource> {
        self.catalog.types().iter().map(CrdDataSource::new).collect()
    }

    pub fn manifest_data_sources(&self) -> Vec<ManifestDataSource> {
        self.catalog.types().iter().map(ManifestDataSource::new).collect()
    }
}
