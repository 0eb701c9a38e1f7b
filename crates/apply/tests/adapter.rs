use std::sync::Arc;
use std::time::Duration;

use crdsync_apply::{Adapter, ProviderConfig, ReadOutcome};
use crdsync_core::{AdapterError, OperationOptions, ResourceIdentity, ResourceRecord, ResourceType, WaitCondition};
use crdsync_kubehub::{fake::Call, ClientError, DynamicClient, FakeDynamicClient};
use serde::{Deserialize, Serialize};
use serde_json::json;

const PROJECT: ResourceType = ResourceType {
    group: "argoproj.io",
    version: "v1alpha1",
    kind: "AppProject",
    plural: "appprojects",
    namespaced: true,
    description: "",
};

const CLUSTER_ISSUER: ResourceType = ResourceType {
    group: "cert-manager.io",
    version: "v1",
    kind: "ClusterIssuer",
    plural: "clusterissuers",
    namespaced: false,
    description: "",
};

fn adapter(fake: &Arc<FakeDynamicClient>, cfg: ProviderConfig) -> Adapter {
    let client: Arc<dyn DynamicClient> = fake.clone();
    Adapter::new(Arc::new(cfg), Some(client)).with_poll_interval(Duration::from_millis(10))
}

fn identity() -> ResourceIdentity {
    ResourceIdentity::namespaced("argocd", "team-a").unwrap()
}

fn record() -> ResourceRecord {
    ResourceRecord::new(Some(json!({"description": "team a", "sourceRepos": ["*"]}))).with_labels([("team", "a")])
}

#[tokio::test]
async fn apply_twice_is_a_no_op() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let first = a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();
    let second = a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();
    assert_eq!(first, second);
    let stored = fake.object(&PROJECT, Some("argocd"), "team-a").unwrap();
    assert_eq!(stored["metadata"]["resourceVersion"], "1");
}

#[tokio::test]
async fn create_stamps_type_and_returns_external_id() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let mut rec = record();
    rec.api_version = "wrong/v0".into();
    rec.kind = "Wrong".into();
    let created = a.create(&PROJECT, &identity(), rec, &OperationOptions::default()).await.unwrap();
    assert_eq!(created.id, "argocd/team-a");
    assert_eq!(created.record.api_version, "argoproj.io/v1alpha1");
    assert_eq!(created.record.kind, "AppProject");
    assert_eq!(created.record.metadata.labels.get("team").map(String::as_str), Some("a"));

    match &fake.calls()[0] {
        Call::Patch { body, namespace, name, .. } => {
            assert_eq!(body["apiVersion"], "argoproj.io/v1alpha1");
            assert_eq!(body["metadata"]["namespace"], "argocd");
            assert_eq!(namespace.as_deref(), Some("argocd"));
            assert_eq!(name, "team-a");
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn cluster_scoped_kinds_have_bare_ids() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let id = ResourceIdentity::cluster("letsencrypt").unwrap();
    let created = a
        .create(&CLUSTER_ISSUER, &id, ResourceRecord::new(Some(json!({"acme": {}}))), &OperationOptions::default())
        .await
        .unwrap();
    assert_eq!(created.id, "letsencrypt");
    assert!(created.record.metadata.namespace.is_none());
    assert_eq!(a.import(&CLUSTER_ISSUER, "letsencrypt").unwrap(), id);
}

#[tokio::test]
async fn server_defaults_are_reflected() {
    let fake = Arc::new(
        FakeDynamicClient::new().with_defaults(&PROJECT, json!({"spec": {"namespaceResourceBlacklist": []}, "status": {"phase": "Ready"}})),
    );
    let a = adapter(&fake, ProviderConfig::default());
    let rec = a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();
    let spec = rec.spec.unwrap();
    assert_eq!(spec["namespaceResourceBlacklist"], json!([]));
    assert_eq!(spec["description"], "team a");
}

#[tokio::test]
async fn offline_never_touches_the_client() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig { offline: true, ..Default::default() });
    let opts = OperationOptions::default();
    let id = identity();

    assert!(matches!(a.apply(&PROJECT, &id, record(), &opts).await, Err(AdapterError::Configuration(_))));
    assert!(matches!(a.create(&PROJECT, &id, record(), &opts).await, Err(AdapterError::Configuration(_))));
    assert!(matches!(a.update(&PROJECT, &id, record(), &opts).await, Err(AdapterError::Configuration(_))));
    assert!(matches!(a.read::<serde_json::Value>(&PROJECT, &id).await, Err(AdapterError::Configuration(_))));
    assert!(matches!(a.delete(&PROJECT, &id).await, Err(AdapterError::Configuration(_))));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn missing_client_is_a_configuration_error() {
    let a = Adapter::new(Arc::new(ProviderConfig::default()), None);
    let err = a.read::<serde_json::Value>(&PROJECT, &identity()).await.unwrap_err();
    assert!(matches!(err, AdapterError::Configuration(_)));
}

#[tokio::test]
async fn instance_options_override_provider_defaults() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig { offline: false, field_manager: "provider".into(), force_conflicts: false });

    a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();
    let explicit = OperationOptions { field_manager: Some("team-a-pipeline".into()), force_conflicts: Some(true), wait_for: vec![] };
    a.apply(&PROJECT, &identity(), record(), &explicit).await.unwrap();
    let only_force = OperationOptions { force_conflicts: Some(true), ..Default::default() };
    a.apply(&PROJECT, &identity(), record(), &only_force).await.unwrap();

    let captured = fake.patch_options();
    assert_eq!(captured.len(), 3);
    assert_eq!((captured[0].field_manager.as_str(), captured[0].force), ("provider", false));
    assert_eq!((captured[1].field_manager.as_str(), captured[1].force), ("team-a-pipeline", true));
    assert_eq!((captured[2].field_manager.as_str(), captured[2].force), ("provider", true));
}

#[tokio::test]
async fn import_rejects_malformed_ids_without_calls() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    for bad in ["", "onlyname", "a/b/c", "/name", "ns/"] {
        assert!(matches!(a.import(&PROJECT, bad), Err(AdapterError::ImportFailed(_))), "{:?}", bad);
    }
    assert_eq!(a.import(&PROJECT, "argocd/team-a").unwrap(), identity());
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn invalid_identity_is_rejected_before_the_client() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let bad = ResourceIdentity { name: "Team_A".into(), namespace: Some("argocd".into()) };
    let err = a.apply(&PROJECT, &bad, record(), &OperationOptions::default()).await.unwrap_err();
    assert!(matches!(err, AdapterError::InvalidIdentity(_)));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn read_distinguishes_gone_from_failures() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();

    match a.read::<serde_json::Value>(&PROJECT, &identity()).await.unwrap() {
        ReadOutcome::Found(rec) => assert_eq!(rec.metadata.name, "team-a"),
        ReadOutcome::Gone => panic!("expected object"),
    }

    fake.fail_next(ClientError::Transport("connection refused".into()));
    let err = a.read::<serde_json::Value>(&PROJECT, &identity()).await.unwrap_err();
    assert!(matches!(err, AdapterError::ReadFailed(ref m) if m.contains("connection refused")));

    fake.remove(&PROJECT, Some("argocd"), "team-a");
    assert_eq!(a.read::<serde_json::Value>(&PROJECT, &identity()).await.unwrap(), ReadOutcome::Gone);
}

#[tokio::test]
async fn apply_failure_carries_server_text() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    fake.fail_next(ClientError::Api { code: 422, message: "spec.bogus: field not declared in schema".into() });
    let err = a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap_err();
    assert!(matches!(err, AdapterError::ApplyFailed(ref m) if m.contains("field not declared in schema")));
    assert!(err.is_transport());
}

#[tokio::test]
async fn delete_is_idempotent_and_reports_failures() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    a.apply(&PROJECT, &identity(), record(), &OperationOptions::default()).await.unwrap();
    a.delete(&PROJECT, &identity()).await.unwrap();
    assert!(fake.object(&PROJECT, Some("argocd"), "team-a").is_none());
    a.delete(&PROJECT, &identity()).await.unwrap();

    fake.fail_next(ClientError::Api { code: 403, message: "forbidden".into() });
    let err = a.delete(&PROJECT, &identity()).await.unwrap_err();
    assert!(matches!(err, AdapterError::DeleteFailed(ref m) if m.contains("forbidden")));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppProjectSpec {
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    source_repos: Vec<String>,
}

#[tokio::test]
async fn typed_specs_round_trip_through_the_adapter() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let spec = AppProjectSpec { description: "typed".into(), source_repos: vec!["https://example.com/repo.git".into()] };
    let rec = a
        .apply(&PROJECT, &identity(), ResourceRecord::new(Some(spec.clone())), &OperationOptions::default())
        .await
        .unwrap();
    assert_eq!(rec.spec, Some(spec));
    let stored = fake.object(&PROJECT, Some("argocd"), "team-a").unwrap();
    assert_eq!(stored["spec"]["sourceRepos"][0], "https://example.com/repo.git");
}

#[tokio::test]
async fn wait_for_returns_once_condition_holds() {
    let fake = Arc::new(FakeDynamicClient::new().with_defaults(&PROJECT, json!({"status": {"phase": "Ready"}})));
    let a = adapter(&fake, ProviderConfig::default());
    let opts = OperationOptions {
        wait_for: vec![WaitCondition { json_path: ".status.phase".into(), value: "Ready".into(), timeout_secs: Some(5) }],
        ..Default::default()
    };
    a.apply(&PROJECT, &identity(), record(), &opts).await.unwrap();
    assert!(fake.calls().iter().any(|c| matches!(c, Call::Get { .. })));
}

#[tokio::test(start_paused = true)]
async fn wait_for_sees_later_updates() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let opts = OperationOptions {
        wait_for: vec![WaitCondition { json_path: "status.conditions[0].status".into(), value: "True".into(), timeout_secs: Some(10) }],
        ..Default::default()
    };
    let flipper = {
        let fake = fake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            fake.update(&PROJECT, Some("argocd"), "team-a", |obj| {
                obj["status"] = json!({"conditions": [{"type": "Ready", "status": "True"}]});
            })
        })
    };
    a.apply(&PROJECT, &identity(), record(), &opts).await.unwrap();
    assert!(flipper.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let opts = OperationOptions {
        wait_for: vec![WaitCondition { json_path: "status.phase".into(), value: "Ready".into(), timeout_secs: Some(1) }],
        ..Default::default()
    };
    let err = a.apply(&PROJECT, &identity(), record(), &opts).await.unwrap_err();
    assert_eq!(
        err,
        AdapterError::WaitTimedOut { json_path: "status.phase".into(), expected: "Ready".into(), timeout_secs: 1 }
    );
}

#[tokio::test]
async fn out_of_range_wait_timeout_is_rejected_before_apply() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let opts = OperationOptions {
        wait_for: vec![WaitCondition { json_path: "status.phase".into(), value: "Pending".into(), timeout_secs: Some(u64::MAX) }],
        ..Default::default()
    };
    let err = a.apply(&PROJECT, &identity(), record(), &opts).await.unwrap_err();
    assert!(matches!(&err, AdapterError::Configuration(m) if m.contains("out of range")), "{:?}", err);
    assert_eq!(fake.call_count(), 0);
    assert!(fake.object(&PROJECT, Some("argocd"), "team-a").is_none());
}

#[tokio::test]
async fn unsupported_wait_path_is_a_configuration_error() {
    let fake = Arc::new(FakeDynamicClient::new());
    let a = adapter(&fake, ProviderConfig::default());
    let opts = OperationOptions {
        wait_for: vec![WaitCondition { json_path: "status.conditions[?(@.type=='Ready')]".into(), value: "True".into(), timeout_secs: None }],
        ..Default::default()
    };
    let err = a.apply(&PROJECT, &identity(), record(), &opts).await.unwrap_err();
    assert!(matches!(err, AdapterError::Configuration(_)));
    assert_eq!(fake.call_count(), 0);
}
