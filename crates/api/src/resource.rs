use crdsync_apply::{Adapter, ReadOutcome};
use crdsync_core::{parse_external_id, AdapterError, AdapterResult, RecordMeta, ResourceIdentity, ResourceRecord, ResourceType};
use crdsync_schema::{data_source_schema, manifest_schema, manifest_type_name, resource_schema, terraform_type_name, Schema};

use crate::{DataSource, DataSourceModel, Diagnostics, ManifestModel, ProviderData, ProviderDataRef, Resource, ResourceModel, Response};

fn configure_adapter(data: ProviderDataRef<'_>, slot: &mut Option<Adapter>) -> Diagnostics {
    let Some(data) = data else {
        return Diagnostics::default();
    };
    match data.downcast_ref::<ProviderData>() {
        Some(pd) => {
            *slot = Some(pd.adapter());
            Diagnostics::default()
        }
        None => (&AdapterError::Configuration("unexpected provider data type; expected crdsync_api::ProviderData".into())).into(),
    }
}

fn configured(slot: &Option<Adapter>) -> AdapterResult<&Adapter> {
    let adapter = slot
        .as_ref()
        .ok_or_else(|| AdapterError::Configuration("provider has not been configured".into()))?;
    adapter.ensure_online()?;
    Ok(adapter)
}

/// Managed resource for one custom resource kind.
pub struct CrdResource {
    ty: &'static ResourceType,
    adapter: Option<Adapter>,
}

impl CrdResource {
    pub fn new(ty: &'static ResourceType) -> Self {
        Self { ty, adapter: None }
    }

    async fn apply(&self, plan: &ResourceModel) -> AdapterResult<ResourceModel> {
        let adapter = configured(&self.adapter)?;
        let identity = plan.identity(self.ty)?;
        let created = adapter.create(self.ty, &identity, plan.record(), &plan.options()).await?;
        let mut state = plan.clone().with_record(created.record);
        state.id = Some(created.id);
        Ok(state)
    }
}

#[async_trait::async_trait]
impl Resource for CrdResource {
    fn metadata(&self, provider_type_name: &str) -> String {
        terraform_type_name(provider_type_name, self.ty)
    }

    fn schema(&self) -> Schema {
        resource_schema(self.ty)
    }

    fn configure(&mut self, data: ProviderDataRef<'_>) -> Diagnostics {
        configure_adapter(data, &mut self.adapter)
    }

    async fn create(&self, plan: ResourceModel) -> Response<ResourceModel> {
        match self.apply(&plan).await {
            Ok(state) => Response::ok(state),
            Err(e) => Response::failed(None, &e),
        }
    }

    async fn read(&self, state: ResourceModel) -> Response<ResourceModel> {
        let outcome = match configured(&self.adapter).and_then(|a| Ok((a, state.identity(self.ty)?))) {
            Ok((adapter, identity)) => adapter.read(self.ty, &identity).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(ReadOutcome::Found(record)) => Response::ok(state.with_record(record)),
            Ok(ReadOutcome::Gone) => Response::removed(),
            Err(e) => Response::failed(Some(state), &e),
        }
    }

    async fn update(&self, plan: ResourceModel) -> Response<ResourceModel> {
        // apply is a full replacement of the fields this manager owns
        match self.apply(&plan).await {
            Ok(state) => Response::ok(state),
            Err(e) => Response::failed(None, &e),
        }
    }

    async fn delete(&self, state: ResourceModel) -> Diagnostics {
        let result = match configured(&self.adapter).and_then(|a| Ok((a, state.identity(self.ty)?))) {
            Ok((adapter, identity)) => adapter.delete(self.ty, &identity).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Diagnostics::default(),
            Err(e) => (&e).into(),
        }
    }

    fn import_state(&self, id: &str) -> Response<ResourceModel> {
        match parse_external_id(id, self.ty.namespaced) {
            Ok(identity) => Response::ok(ResourceModel {
                id: Some(identity.external_id()),
                metadata: RecordMeta { name: identity.name, namespace: identity.namespace, ..Default::default() },
                ..Default::default()
            }),
            Err(e) => Response::failed(None, &e),
        }
    }
}

/// Data source reading one live object.
pub struct CrdDataSource {
    ty: &'static ResourceType,
    adapter: Option<Adapter>,
}

impl CrdDataSource {
    pub fn new(ty: &'static ResourceType) -> Self {
        Self { ty, adapter: None }
    }

    async fn fetch(&self, config: &DataSourceModel) -> AdapterResult<DataSourceModel> {
        let adapter = configured(&self.adapter)?;
        let identity = ResourceIdentity::for_type(self.ty, config.metadata.namespace.as_deref(), &config.metadata.name)?;
        match adapter.read(self.ty, &identity).await? {
            ReadOutcome::Found(record) => Ok(DataSourceModel {
                id: Some(identity.external_id()),
                metadata: record.metadata,
                spec: record.spec,
            }),
            ReadOutcome::Gone => Err(AdapterError::ReadFailed(format!("{} {} not found", self.ty.kind, identity))),
        }
    }
}

#[async_trait::async_trait]
impl DataSource for CrdDataSource {
    type Model = DataSourceModel;

    fn metadata(&self, provider_type_name: &str) -> String {
        terraform_type_name(provider_type_name, self.ty)
    }

    fn schema(&self) -> Schema {
        data_source_schema(self.ty)
    }

    fn configure(&mut self, data: ProviderDataRef<'_>) -> Diagnostics {
        configure_adapter(data, &mut self.adapter)
    }

    async fn read(&self, config: DataSourceModel) -> Response<DataSourceModel> {
        match self.fetch(&config).await {
            Ok(state) => Response::ok(state),
            Err(e) => Response::failed(None, &e),
        }
    }
}

/// `*_manifest` data source: renders YAML locally and never talks to a cluster.
pub struct ManifestDataSource {
    ty: &'static ResourceType,
}

impl ManifestDataSource {
    pub fn new(ty: &'static ResourceType) -> Self {
        Self { ty }
    }

    fn render(&self, config: &ManifestModel) -> AdapterResult<ManifestModel> {
        let identity = ResourceIdentity::for_type(self.ty, config.metadata.namespace.as_deref(), &config.metadata.name)?;
        let record = ResourceRecord {
            api_version: String::new(),
            kind: String::new(),
            metadata: config.metadata.clone(),
            spec: config.spec.clone(),
        };
        let yaml = crdsync_manifest::render(self.ty, &identity, record)?;
        Ok(ManifestModel { id: Some(identity.external_id()), yaml: Some(yaml), ..config.clone() })
    }
}

#[async_trait::async_trait]
impl DataSource for ManifestDataSource {
    type Model = ManifestModel;

    fn metadata(&self, provider_type_name: &str) -> String {
        manifest_type_name(provider_type_name, self.ty)
    }

    fn schema(&self) -> Schema {
        manifest_schema(self.ty)
    }

    fn configure(&mut self, _data: ProviderDataRef<'_>) -> Diagnostics {
        Diagnostics::default()
    }

    async fn read(&self, config: ManifestModel) -> Response<ManifestModel> {
        match self.render(&config) {
            Ok(state) => Response::ok(state),
            Err(e) => Response::failed(None, &e),
        }
    }
}
