//! In-memory [`DynamicClient`] for tests.
//!
//! Apply is modeled as a naive JSON merge-patch (RFC 7386) of the request body
//! onto the stored object. The server owned `uid`, `creationTimestamp` and
//! `resourceVersion` fields are stamped, and `resourceVersion` only moves when
//! the stored content actually changes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use crdsync_core::{Json, PatchOptions, ResourceType};
use serde_json::Map;
use uuid::Uuid;

use crate::{ClientError, DynamicClient};

type Key = (String, Option<String>, String);

/// One recorded client invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get { plural: String, namespace: Option<String>, name: String },
    Patch { plural: String, namespace: Option<String>, name: String, body: Json, opts: PatchOptions },
    Delete { plural: String, namespace: Option<String>, name: String },
}

#[derive(Default)]
struct Inner {
    objects: HashMap<Key, Json>,
    defaults: HashMap<String, Json>,
    calls: Vec<Call>,
    fail_next: Option<ClientError>,
}

#[derive(Default)]
pub struct FakeDynamicClient {
    inner: Mutex<Inner>,
}

fn key(ty: &ResourceType, namespace: Option<&str>, name: &str) -> Key {
    let ns = if ty.namespaced { namespace.map(str::to_string) } else { None };
    (ty.plural.to_string(), ns, name.to_string())
}

impl FakeDynamicClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake client lock poisoned")
    }

    /// Store an object as if it had been created out of band.
    pub fn seed(&self, ty: &ResourceType, obj: Json) {
        let ns = obj.pointer("/metadata/namespace").and_then(Json::as_str).map(str::to_string);
        let name = obj.pointer("/metadata/name").and_then(Json::as_str).unwrap_or_default().to_string();
        self.lock().objects.insert(key(ty, ns.as_deref(), &name), obj);
    }

    /// Fields the "server" fills in on every apply when the object lacks them.
    pub fn with_defaults(self, ty: &ResourceType, defaults: Json) -> Self {
        self.lock().defaults.insert(ty.plural.to_string(), defaults);
        self
    }

    /// Make the next call (of any verb) fail with `err`.
    pub fn fail_next(&self, err: ClientError) {
        self.lock().fail_next = Some(err);
    }

    pub fn object(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Option<Json> {
        self.lock().objects.get(&key(ty, namespace, name)).cloned()
    }

    /// Mutate a stored object in place (e.g. to flip a status field); returns false if absent.
    pub fn update<F: FnOnce(&mut Json)>(&self, ty: &ResourceType, namespace: Option<&str>, name: &str, f: F) -> bool {
        match self.lock().objects.get_mut(&key(ty, namespace, name)) {
            Some(obj) => {
                f(obj);
                true
            }
            None => false,
        }
    }

    /// Drop an object behind the adapter's back.
    pub fn remove(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Option<Json> {
        self.lock().objects.remove(&key(ty, namespace, name))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Options captured from every patch, in order.
    pub fn patch_options(&self) -> Vec<PatchOptions> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Patch { opts, .. } => Some(opts.clone()),
                _ => None,
            })
            .collect()
    }
}

/// RFC 7386: objects merge recursively, `null` removes, everything else replaces.
pub fn merge_patch(target: &mut Json, patch: &Json) {
    let Json::Object(p) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Json::Object(Map::new());
    }
    if let Json::Object(t) = target {
        for (k, v) in p {
            if v.is_null() {
                t.remove(k);
            } else {
                merge_patch(t.entry(k.clone()).or_insert(Json::Null), v);
            }
        }
    }
}

/// Insert keys of `defaults` that `target` lacks, recursing through objects.
fn fill_missing(target: &mut Json, defaults: &Json) {
    if let (Json::Object(t), Json::Object(d)) = (target, defaults) {
        for (k, dv) in d {
            match t.get_mut(k) {
                Some(tv) => fill_missing(tv, dv),
                None => {
                    t.insert(k.clone(), dv.clone());
                }
            }
        }
    }
}

fn set_meta(obj: &mut Json, field: &str, value: Json) {
    if let Some(meta) = obj.get_mut("metadata").and_then(Json::as_object_mut) {
        meta.insert(field.to_string(), value);
    }
}

#[async_trait]
impl DynamicClient for FakeDynamicClient {
    async fn get(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<Json, ClientError> {
        let mut inner = self.lock();
        let k = key(ty, namespace, name);
        inner.calls.push(Call::Get { plural: k.0.clone(), namespace: k.1.clone(), name: k.2.clone() });
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        inner.objects.get(&k).cloned().ok_or(ClientError::NotFound)
    }

    async fn patch(
        &self,
        ty: &ResourceType,
        namespace: Option<&str>,
        name: &str,
        body: &[u8],
        opts: &PatchOptions,
    ) -> Result<Json, ClientError> {
        let doc: Json = serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        let mut inner = self.lock();
        let k = key(ty, namespace, name);
        inner.calls.push(Call::Patch {
            plural: k.0.clone(),
            namespace: k.1.clone(),
            name: k.2.clone(),
            body: doc.clone(),
            opts: opts.clone(),
        });
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }

        let previous = inner.objects.get(&k).cloned();
        let mut next = previous.clone().unwrap_or_else(|| Json::Object(Map::new()));
        merge_patch(&mut next, &doc);
        if let Some(defaults) = inner.defaults.get(ty.plural) {
            fill_missing(&mut next, defaults);
        }
        set_meta(
            &mut next,
            "managedFields",
            serde_json::json!([{ "manager": opts.field_manager, "operation": "Apply" }]),
        );

        match &previous {
            None => {
                set_meta(&mut next, "uid", Json::String(Uuid::new_v4().to_string()));
                set_meta(
                    &mut next,
                    "creationTimestamp",
                    Json::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                );
                set_meta(&mut next, "resourceVersion", Json::String("1".into()));
            }
            Some(prev) if *prev != next => {
                let rv = prev
                    .pointer("/metadata/resourceVersion")
                    .and_then(Json::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                set_meta(&mut next, "resourceVersion", Json::String((rv + 1).to_string()));
            }
            Some(_) => {}
        }
        inner.objects.insert(k, next.clone());
        Ok(next)
    }

    async fn delete(&self, ty: &ResourceType, namespace: Option<&str>, name: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let k = key(ty, namespace, name);
        inner.calls.push(Call::Delete { plural: k.0.clone(), namespace: k.1.clone(), name: k.2.clone() });
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        inner.objects.remove(&k).map(|_| ()).ok_or(ClientError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crdsync_core::FieldValidation;
    use serde_json::json;

    const CLUSTER: ResourceType = ResourceType {
        group: "cluster.x-k8s.io",
        version: "v1beta1",
        kind: "Cluster",
        plural: "clusters",
        namespaced: true,
        description: "",
    };

    fn opts() -> PatchOptions {
        PatchOptions { field_manager: "test".into(), force: false, field_validation: FieldValidation::Strict }
    }

    #[test]
    fn merge_patch_follows_rfc7386() {
        let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut target, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(target, json!({"a": "z", "c": {"d": "e"}}));

        let mut scalar = json!([1, 2]);
        merge_patch(&mut scalar, &json!({"x": 1}));
        assert_eq!(scalar, json!({"x": 1}));
    }

    #[tokio::test]
    async fn resource_version_moves_only_on_change() {
        let fake = FakeDynamicClient::new();
        let body = json!({"apiVersion": "cluster.x-k8s.io/v1beta1", "kind": "Cluster", "metadata": {"name": "c1", "namespace": "ns"}, "spec": {"paused": false}});
        let bytes = serde_json::to_vec(&body).unwrap();

        let first = fake.patch(&CLUSTER, Some("ns"), "c1", &bytes, &opts()).await.unwrap();
        let second = fake.patch(&CLUSTER, Some("ns"), "c1", &bytes, &opts()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second["metadata"]["resourceVersion"], "1");

        let changed = serde_json::to_vec(&json!({"spec": {"paused": true}})).unwrap();
        let third = fake.patch(&CLUSTER, Some("ns"), "c1", &changed, &opts()).await.unwrap();
        assert_eq!(third["metadata"]["resourceVersion"], "2");
        assert_eq!(third["metadata"]["uid"], first["metadata"]["uid"]);
    }

    #[tokio::test]
    async fn fail_next_is_consumed_once() {
        let fake = FakeDynamicClient::new();
        fake.fail_next(ClientError::Transport("boom".into()));
        assert!(matches!(fake.get(&CLUSTER, Some("ns"), "x").await, Err(ClientError::Transport(_))));
        assert!(matches!(fake.get(&CLUSTER, Some("ns"), "x").await, Err(ClientError::NotFound)));
        assert_eq!(fake.call_count(), 2);
    }
}
