use crdsync_core::{AdapterError, ResourceIdentity, ResourceRecord, ResourceType};
use serde_json::json;

const DISTRIBUTION: ResourceType = ResourceType {
    group: "cloudfront.services.k8s.aws",
    version: "v1alpha1",
    kind: "Distribution",
    plural: "distributions",
    namespaced: true,
    description: "",
};

fn record() -> ResourceRecord {
    ResourceRecord::new(Some(json!({
        "distributionConfig": {
            "enabled": true,
            "comment": "static site",
            "origins": {"items": [{"id": "s3", "domainName": "bucket.s3.amazonaws.com"}], "quantity": 1}
        }
    })))
    .with_labels([("tier", "edge"), ("app", "site")])
    .with_annotations([("owner", "platform")])
}

#[test]
fn render_injects_type_and_metadata() {
    let id = ResourceIdentity::namespaced("web", "site").unwrap();
    let yaml = crdsync_manifest::render(&DISTRIBUTION, &id, record()).unwrap();
    assert!(yaml.starts_with("apiVersion: cloudfront.services.k8s.aws/v1alpha1\nkind: Distribution\nmetadata:\n"));
    assert!(yaml.contains("  name: site\n"));
    assert!(yaml.contains("  namespace: web\n"));

    let parsed = crdsync_manifest::parse(&yaml).unwrap();
    assert_eq!(parsed.kind, "Distribution");
    assert_eq!(parsed.namespace.as_deref(), Some("web"));
    assert_eq!(parsed.record.spec.unwrap()["distributionConfig"]["origins"]["quantity"], 1);
}

#[test]
fn render_is_byte_for_byte_stable() {
    let id = ResourceIdentity::namespaced("web", "site").unwrap();
    let first = crdsync_manifest::render(&DISTRIBUTION, &id, record()).unwrap();
    for _ in 0..5 {
        assert_eq!(crdsync_manifest::render(&DISTRIBUTION, &id, record()).unwrap(), first);
    }
    // labels come out sorted regardless of insertion order
    let app = first.find("app: site").unwrap();
    let tier = first.find("tier: edge").unwrap();
    assert!(app < tier);
}

#[test]
fn render_requires_a_namespace_for_namespaced_kinds() {
    let id = ResourceIdentity { name: "site".into(), namespace: None };
    let err = crdsync_manifest::render(&DISTRIBUTION, &id, record()).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidIdentity(_)));
}
