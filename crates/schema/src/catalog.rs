//! Served custom resource kinds. Pure data: adding a kind means adding a row.

use crdsync_core::ResourceType;

const fn ns(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str, description: &'static str) -> ResourceType {
    ResourceType { group, version, kind, plural, namespaced: true, description }
}

const fn cluster(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str, description: &'static str) -> ResourceType {
    ResourceType { group, version, kind, plural, namespaced: false, description }
}

pub static CATALOG: &[ResourceType] = &[
    // Argo CD
    ns("argoproj.io", "v1alpha1", "Application", "applications", "Application is a definition of an Argo CD application."),
    ns("argoproj.io", "v1alpha1", "ApplicationSet", "applicationsets", "ApplicationSet is a set of Application resources."),
    ns("argoproj.io", "v1alpha1", "AppProject", "appprojects", "AppProject provides a logical grouping of applications."),
    // AWS Controllers for Kubernetes: CloudFront
    ns("cloudfront.services.k8s.aws", "v1alpha1", "CachePolicy", "cachepolicies", "CachePolicy is the Schema for the CachePolicies API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "Distribution", "distributions", "Distribution is the Schema for the Distributions API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "Function", "functions", "Function is the Schema for the Functions API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "OriginAccessControl", "originaccesscontrols", "OriginAccessControl is the Schema for the OriginAccessControls API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "OriginRequestPolicy", "originrequestpolicies", "OriginRequestPolicy is the Schema for the OriginRequestPolicies API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "ResponseHeadersPolicy", "responseheaderspolicies", "ResponseHeadersPolicy is the Schema for the ResponseHeadersPolicies API."),
    ns("cloudfront.services.k8s.aws", "v1alpha1", "VPCOrigin", "vpcorigins", "VPCOrigin is the Schema for the VPCOrigins API."),
    // Cluster API
    ns("cluster.x-k8s.io", "v1beta1", "Cluster", "clusters", "Cluster is the Schema for the clusters API."),
    ns("cluster.x-k8s.io", "v1beta1", "ClusterClass", "clusterclasses", "ClusterClass is a template which can be used to create managed topologies."),
    ns("cluster.x-k8s.io", "v1beta1", "Machine", "machines", "Machine is the Schema for the machines API."),
    ns("cluster.x-k8s.io", "v1beta1", "MachineDeployment", "machinedeployments", "MachineDeployment is the Schema for the machinedeployments API."),
    ns("cluster.x-k8s.io", "v1beta1", "MachineHealthCheck", "machinehealthchecks", "MachineHealthCheck is the Schema for the machinehealthchecks API."),
    ns("cluster.x-k8s.io", "v1beta1", "MachinePool", "machinepools", "MachinePool is the Schema for the machinepools API."),
    ns("cluster.x-k8s.io", "v1beta1", "MachineSet", "machinesets", "MachineSet is the Schema for the machinesets API."),
    // cert-manager
    ns("cert-manager.io", "v1", "Certificate", "certificates", "A Certificate resource should be created to ensure an up to date and signed X.509 certificate is stored in the Kubernetes Secret resource named in spec.secretName."),
    ns("cert-manager.io", "v1", "Issuer", "issuers", "An Issuer represents a certificate issuing authority which can be referenced as part of issuerRef fields."),
    cluster("cert-manager.io", "v1", "ClusterIssuer", "clusterissuers", "A ClusterIssuer represents a certificate issuing authority which can be referenced as part of issuerRef fields. It is similar to an Issuer, however it is cluster-scoped."),
];
