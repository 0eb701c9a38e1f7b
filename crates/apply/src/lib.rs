//! crdsync apply: one generic server-side apply / read / delete adapter for
//! every custom resource type.
//!
//! Each lifecycle call maps to exactly one adapter operation. Nothing is
//! cached and nothing is retried: the API server is the source of truth and
//! failures are returned to the caller as-is.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use crdsync_core::{
    parse_external_id, AdapterError, AdapterResult, FieldValidation, Json, OperationOptions, PatchOptions, ResourceIdentity,
    ResourceRecord, ResourceType, WaitCondition,
};
use crdsync_kubehub::{ClientError, DynamicClient};
use crdsync_schema::{extract_path, normalize_json_path, render_scalar};
use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

mod diff;

pub use diff::{diff_summary, strip_noisy, DiffSummary};

pub const DEFAULT_FIELD_MANAGER: &str = "crdsync";

fn wait_poll_interval() -> Duration {
    std::env::var("CRDSYNC_WAIT_POLL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Provider-wide settings. Built once at configure time and only ever shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Refuse every cluster operation.
    pub offline: bool,
    pub field_manager: String,
    pub force_conflicts: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { offline: false, field_manager: DEFAULT_FIELD_MANAGER.to_string(), force_conflicts: false }
    }
}

impl ProviderConfig {
    /// Per-instance values win when set; provider defaults fill the rest.
    pub fn resolve(&self, opts: &OperationOptions) -> PatchOptions {
        PatchOptions {
            field_manager: opts.field_manager.clone().unwrap_or_else(|| self.field_manager.clone()),
            force: opts.force_conflicts.unwrap_or(self.force_conflicts),
            field_validation: FieldValidation::Strict,
        }
    }
}

/// Result of a read: the object, or proof that it no longer exists.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<S = Json> {
    Found(ResourceRecord<S>),
    /// The server answered 404; the caller should drop the instance from state.
    Gone,
}

/// A freshly created object and its external id.
#[derive(Debug, Clone, PartialEq)]
pub struct Created<S = Json> {
    pub id: String,
    pub record: ResourceRecord<S>,
}

#[derive(Clone)]
pub struct Adapter {
    config: Arc<ProviderConfig>,
    client: Option<Arc<dyn DynamicClient>>,
    poll_interval: Duration,
}

impl Adapter {
    pub fn new(config: Arc<ProviderConfig>, client: Option<Arc<dyn DynamicClient>>) -> Self {
        Self { config, client, poll_interval: wait_poll_interval() }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Fails with `Configuration` when the provider is offline.
    pub fn ensure_online(&self) -> AdapterResult<()> {
        if self.config.offline {
            return Err(AdapterError::Configuration(
                "provider is configured offline; cluster operations are disabled".into(),
            ));
        }
        Ok(())
    }

    fn client(&self) -> AdapterResult<&dyn DynamicClient> {
        self.ensure_online()?;
        self.client
            .as_deref()
            .ok_or_else(|| AdapterError::Configuration("no Kubernetes client configured for this provider".into()))
    }

    /// Server-side apply `record` at `identity`, returning the authoritative post-apply state.
    pub async fn apply<S>(
        &self,
        ty: &ResourceType,
        identity: &ResourceIdentity,
        mut record: ResourceRecord<S>,
        opts: &OperationOptions,
    ) -> AdapterResult<ResourceRecord<S>>
    where
        S: Serialize + DeserializeOwned + Send + Sync,
    {
        let client = self.client()?;
        identity.validate_for(ty)?;
        for cond in &opts.wait_for {
            wait_plan(cond)?;
        }
        record.stamp(ty, identity);
        let po = self.config.resolve(opts);

        let body = serde_json::to_vec(&record).map_err(AdapterError::serialization)?;
        let t0 = Instant::now();
        counter!("crdsync_apply_total", 1u64);
        info!(gvk = %ty.gvk_key(), id = %identity, field_manager = %po.field_manager, force = po.force, "apply");

        let obj = match client.patch(ty, identity.namespace.as_deref(), &identity.name, &body, &po).await {
            Ok(o) => o,
            Err(e) => {
                counter!("crdsync_apply_err", 1u64);
                warn!(gvk = %ty.gvk_key(), id = %identity, error = %e, "server-side apply failed");
                return Err(map_client_err(e, AdapterError::ApplyFailed));
            }
        };
        histogram!("crdsync_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);

        if let Ok(sent) = serde_json::from_slice::<Json>(&body) {
            let adjusted = diff_summary(&strip_noisy(obj.clone()), &sent);
            if !adjusted.is_empty() {
                debug!(id = %identity, adds = adjusted.adds, updates = adjusted.updates, removes = adjusted.removes, "server adjusted applied object");
            }
        }

        let obj = match self.wait_for(client, ty, identity, &opts.wait_for).await? {
            Some(latest) => latest,
            None => obj,
        };
        decode(obj)
    }

    /// `apply` plus the external id (`namespace/name`, or `name` when cluster-scoped).
    pub async fn create<S>(
        &self,
        ty: &ResourceType,
        identity: &ResourceIdentity,
        record: ResourceRecord<S>,
        opts: &OperationOptions,
    ) -> AdapterResult<Created<S>>
    where
        S: Serialize + DeserializeOwned + Send + Sync,
    {
        let record = self.apply(ty, identity, record, opts).await?;
        Ok(Created { id: identity.external_id(), record })
    }

    pub async fn update<S>(
        &self,
        ty: &ResourceType,
        identity: &ResourceIdentity,
        record: ResourceRecord<S>,
        opts: &OperationOptions,
    ) -> AdapterResult<ResourceRecord<S>>
    where
        S: Serialize + DeserializeOwned + Send + Sync,
    {
        self.apply(ty, identity, record, opts).await
    }

    pub async fn read<S>(&self, ty: &ResourceType, identity: &ResourceIdentity) -> AdapterResult<ReadOutcome<S>>
    where
        S: DeserializeOwned,
    {
        let client = self.client()?;
        identity.validate_for(ty)?;
        counter!("crdsync_read_total", 1u64);
        match client.get(ty, identity.namespace.as_deref(), &identity.name).await {
            Ok(obj) => {
                debug!(gvk = %ty.gvk_key(), id = %identity, "read ok");
                Ok(ReadOutcome::Found(decode(obj)?))
            }
            Err(ClientError::NotFound) => {
                counter!("crdsync_read_gone", 1u64);
                info!(gvk = %ty.gvk_key(), id = %identity, "object no longer exists");
                Ok(ReadOutcome::Gone)
            }
            Err(e) => {
                warn!(gvk = %ty.gvk_key(), id = %identity, error = %e, "read failed");
                Err(map_client_err(e, AdapterError::ReadFailed))
            }
        }
    }

    /// Delete with server defaults; an already absent object counts as deleted.
    pub async fn delete(&self, ty: &ResourceType, identity: &ResourceIdentity) -> AdapterResult<()> {
        let client = self.client()?;
        identity.validate_for(ty)?;
        counter!("crdsync_delete_total", 1u64);
        match client.delete(ty, identity.namespace.as_deref(), &identity.name).await {
            Ok(()) => {
                info!(gvk = %ty.gvk_key(), id = %identity, "deleted");
                Ok(())
            }
            Err(ClientError::NotFound) => {
                debug!(gvk = %ty.gvk_key(), id = %identity, "delete: already absent");
                Ok(())
            }
            Err(e) => {
                warn!(gvk = %ty.gvk_key(), id = %identity, error = %e, "delete failed");
                Err(map_client_err(e, AdapterError::DeleteFailed))
            }
        }
    }

    /// Parse an import id. Purely local: the client is never touched.
    pub fn import(&self, ty: &ResourceType, id: &str) -> AdapterResult<ResourceIdentity> {
        parse_external_id(id, ty.namespaced)
    }

    /// Poll until every condition holds. Returns the last fetched object, if any poll happened.
    async fn wait_for(
        &self,
        client: &dyn DynamicClient,
        ty: &ResourceType,
        identity: &ResourceIdentity,
        conditions: &[WaitCondition],
    ) -> AdapterResult<Option<Json>> {
        let mut latest = None;
        for cond in conditions {
            let (path, timeout) = wait_plan(cond)?;
            let deadline = wait_deadline(cond, timeout)?;
            loop {
                let obj = client
                    .get(ty, identity.namespace.as_deref(), &identity.name)
                    .await
                    .map_err(|e| map_client_err(e, AdapterError::ReadFailed))?;
                let observed = extract_path(&obj, &path).and_then(render_scalar);
                latest = Some(obj);
                if observed.as_deref() == Some(cond.value.as_str()) {
                    debug!(id = %identity, path = %path, value = %cond.value, "wait condition met");
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    counter!("crdsync_wait_timeout", 1u64);
                    warn!(id = %identity, path = %path, expected = %cond.value, observed = ?observed, "wait condition timed out");
                    return Err(AdapterError::WaitTimedOut {
                        json_path: cond.json_path.clone(),
                        expected: cond.value.clone(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            }
        }
        Ok(latest)
    }
}

/// Normalized path and timeout of one condition, checked before anything is applied.
fn wait_plan(cond: &WaitCondition) -> AdapterResult<(String, Duration)> {
    let path = normalize_json_path(&cond.json_path)
        .ok_or_else(|| AdapterError::Configuration(format!("unsupported wait_for json_path {:?}", cond.json_path)))?;
    let timeout = cond.timeout();
    wait_deadline(cond, timeout)?;
    Ok((path, timeout))
}

fn wait_deadline(cond: &WaitCondition, timeout: Duration) -> AdapterResult<Instant> {
    Instant::now().checked_add(timeout).ok_or_else(|| {
        AdapterError::Configuration(format!("wait_for timeout of {}s on {:?} is out of range", timeout.as_secs(), cond.json_path))
    })
}

fn decode<S: DeserializeOwned>(obj: Json) -> AdapterResult<ResourceRecord<S>> {
    serde_json::from_value(obj).map_err(AdapterError::serialization)
}

fn map_client_err(e: ClientError, transport: fn(String) -> AdapterError) -> AdapterError {
    match e {
        ClientError::Decode(m) => AdapterError::Serialization(m),
        other => transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_instance_values() {
        let cfg = ProviderConfig { offline: false, field_manager: "provider".into(), force_conflicts: true };
        let unset = cfg.resolve(&OperationOptions::default());
        assert_eq!(unset.field_manager, "provider");
        assert!(unset.force);
        assert_eq!(unset.field_validation, FieldValidation::Strict);

        let set = cfg.resolve(&OperationOptions {
            field_manager: Some("instance".into()),
            force_conflicts: Some(false),
            wait_for: vec![],
        });
        assert_eq!(set.field_manager, "instance");
        assert!(!set.force);
    }

    #[test]
    fn decode_errors_become_serialization() {
        let e = map_client_err(ClientError::Decode("bad".into()), AdapterError::ApplyFailed);
        assert_eq!(e, AdapterError::Serialization("bad".into()));
        let e = map_client_err(ClientError::Api { code: 422, message: "spec.foo: unknown field".into() }, AdapterError::ApplyFailed);
        assert!(e.is_transport());
        assert!(e.to_string().contains("spec.foo: unknown field"));
    }
}
