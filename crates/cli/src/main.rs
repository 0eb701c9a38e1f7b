#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use crdsync_api::{
    CrdResource, DataSource, Diagnostics, KubeSettings, ManifestDataSource, ManifestModel, Provider, ProviderSettings, Resource,
    ResourceModel, Severity,
};
use crdsync_core::ResourceType;
use crdsync_schema::{data_source_schema, manifest_schema, resource_schema, AttrType, Attribute, Catalog, MANIFEST_SUFFIX};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "crdsyncctl", version, about = "Server-side apply for custom resources")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Refuse every cluster operation
    #[arg(long = "offline", global = true, env = "CRDSYNC_OFFLINE", action = ArgAction::SetTrue)]
    offline: bool,

    /// Field manager for server-side apply (default: crdsync)
    #[arg(long = "field-manager", global = true, env = "CRDSYNC_FIELD_MANAGER")]
    field_manager: Option<String>,

    /// Take ownership of fields managed by someone else
    #[arg(long = "force-conflicts", global = true, env = "CRDSYNC_FORCE_CONFLICTS", action = ArgAction::SetTrue)]
    force_conflicts: bool,

    /// Path to a kubeconfig file (default: ambient config)
    #[arg(long = "kubeconfig", global = true, env = "CRDSYNC_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long = "context", global = true, env = "CRDSYNC_CONTEXT")]
    context: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List generated resource types
    Types {
        /// Substring filter on the type name
        filter: Option<String>,
    },
    /// Show the schema of a resource or `*_manifest` type
    Schema {
        /// Type name, e.g. "k8s_cert_manager_io_certificate_v1"
        type_name: String,
    },
    /// Render a YAML manifest locally (no cluster access)
    Render {
        /// YAML file with apiVersion, kind, metadata and spec
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Server-side apply a YAML manifest
    Apply {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Read one object by id ("namespace/name", or "name" when cluster-scoped)
    Get { type_name: String, id: String },
    /// Delete one object by id
    Delete { type_name: String, id: String },
    /// Import an existing object by id and print its state
    Import { type_name: String, id: String },
}

fn init_tracing() {
    let env = std::env::var("CRDSYNC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CRDSYNC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CRDSYNC_METRICS_ADDR; expected host:port");
        }
    }
}

impl Cli {
    fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            offline: self.offline,
            field_manager: self.field_manager.clone(),
            force_conflicts: self.force_conflicts.then_some(true),
            kube: KubeSettings { kubeconfig: self.kubeconfig.clone(), context: self.context.clone() },
        }
    }

    /// Configure the provider and hand its data to a resource handler for `ty`.
    async fn resource(&self, provider: &Provider, ty: &'static ResourceType) -> Result<CrdResource> {
        let data = provider.configure(&self.settings()).await.map_err(into_error)?;
        let mut resource = CrdResource::new(ty);
        check(resource.configure(Some(&data)))?;
        Ok(resource)
    }
}

/// Log warnings; turn error diagnostics into one `anyhow` error.
fn check(diags: Diagnostics) -> Result<()> {
    for d in diags.iter().filter(|d| d.severity == Severity::Warning) {
        warn!(summary = %d.summary, detail = %d.detail, "diagnostic");
    }
    if diags.has_error() {
        return Err(into_error(diags));
    }
    Ok(())
}

fn into_error(diags: Diagnostics) -> anyhow::Error {
    let msgs: Vec<String> = diags
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| format!("{}: {}", d.summary, d.detail))
        .collect();
    anyhow!(msgs.join("; "))
}

fn resolve_type(catalog: &Catalog, name: &str) -> Result<&'static ResourceType> {
    catalog.by_type_name(name).ok_or_else(|| {
        let hints = catalog.suggest(name, 3);
        if hints.is_empty() {
            anyhow!("unknown type {:?}", name)
        } else {
            anyhow!("unknown type {:?}; did you mean: {}", name, hints.join(", "))
        }
    })
}

fn read_manifest(catalog: &Catalog, file: &Path) -> Result<(&'static ResourceType, crdsync_manifest::ParsedManifest)> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let parsed = crdsync_manifest::parse(&raw).with_context(|| format!("parsing {}", file.display()))?;
    let ty = catalog
        .by_api_version_kind(&parsed.api_version, &parsed.kind)
        .ok_or_else(|| anyhow!("no generated type serves {} {}", parsed.api_version, parsed.kind))?;
    Ok((ty, parsed))
}

fn print_state<T: Serialize>(output: Output, state: &T) -> Result<()> {
    match output {
        Output::Human => print!("{}", serde_yaml::to_string(state)?),
        Output::Json => println!("{}", serde_json::to_string_pretty(state)?),
    }
    Ok(())
}

fn print_attributes(attrs: &[Attribute], indent: usize) {
    for a in attrs {
        let flag = if a.required { "required" } else if a.optional && a.computed { "optional, computed" } else if a.optional { "optional" } else { "computed" };
        println!("{:indent$}{} ({}) - {}", "", a.name, flag, a.description, indent = indent);
        if let AttrType::Object(nested) = &a.ty {
            print_attributes(nested, indent + 2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let provider = Provider::default();
    let catalog = *provider.catalog();

    match &cli.command {
        Commands::Types { filter } => {
            let rows: Vec<(String, &ResourceType)> = catalog
                .types()
                .iter()
                .map(|ty| (crdsync_schema::terraform_type_name(provider.type_name(), ty), ty))
                .filter(|(name, _)| filter.as_deref().map(|f| name.contains(f)).unwrap_or(true))
                .collect();
            match cli.output {
                Output::Human => {
                    for (name, ty) in &rows {
                        let scope = if ty.namespaced { "namespaced" } else { "cluster" };
                        println!("{} • {} • {}", name, ty.gvk_key(), scope);
                    }
                }
                Output::Json => {
                    #[derive(Serialize)]
                    struct Row<'a> { name: &'a str, #[serde(flatten)] ty: &'a ResourceType }
                    let out: Vec<_> = rows.iter().map(|(name, ty)| Row { name, ty }).collect();
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
        Commands::Schema { type_name } => {
            let ty = resolve_type(&catalog, type_name)?;
            let schemas = if type_name.ends_with(MANIFEST_SUFFIX) {
                vec![("data-source", manifest_schema(ty))]
            } else {
                vec![("resource", resource_schema(ty)), ("data-source", data_source_schema(ty))]
            };
            match cli.output {
                Output::Human => {
                    for (kind, schema) in &schemas {
                        println!("{} {}: {}", kind, type_name, schema.description);
                        print_attributes(&schema.attributes, 2);
                    }
                }
                Output::Json => {
                    let out: std::collections::BTreeMap<_, _> = schemas.into_iter().collect();
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
        Commands::Render { file } => {
            let (ty, parsed) = read_manifest(&catalog, file)?;
            let mut ds = ManifestDataSource::new(ty);
            check(ds.configure(None))?;
            let config = ManifestModel { metadata: parsed.record.metadata, spec: parsed.record.spec, ..Default::default() };
            let resp = ds.read(config).await;
            check(resp.diagnostics)?;
            let state = resp.state.ok_or_else(|| anyhow!("render produced no output"))?;
            match cli.output {
                Output::Human => print!("{}", state.yaml.unwrap_or_default()),
                Output::Json => println!("{}", serde_json::to_string_pretty(&state)?),
            }
        }
        Commands::Apply { file } => {
            let (ty, parsed) = read_manifest(&catalog, file)?;
            info!(gvk = %ty.gvk_key(), name = %parsed.name, "apply invoked");
            let resource = cli.resource(&provider, ty).await?;
            let plan = ResourceModel { metadata: parsed.record.metadata, spec: parsed.record.spec, ..Default::default() };
            let resp = resource.create(plan).await;
            check(resp.diagnostics)?;
            let state = resp.state.ok_or_else(|| anyhow!("apply returned no state"))?;
            print_state(cli.output, &state)?;
        }
        Commands::Get { type_name, id } | Commands::Import { type_name, id } => {
            let ty = resolve_type(&catalog, type_name)?;
            let resource = cli.resource(&provider, ty).await?;
            let imported = resource.import_state(id);
            check(imported.diagnostics)?;
            let seed = imported.state.ok_or_else(|| anyhow!("import of {:?} returned no state", id))?;
            let resp = resource.read(seed).await;
            check(resp.diagnostics)?;
            match resp.state {
                Some(state) => print_state(cli.output, &state)?,
                None => bail!("{} {} not found", ty.kind, id),
            }
        }
        Commands::Delete { type_name, id } => {
            let ty = resolve_type(&catalog, type_name)?;
            let resource = cli.resource(&provider, ty).await?;
            let imported = resource.import_state(id);
            check(imported.diagnostics)?;
            let state = imported.state.ok_or_else(|| anyhow!("import of {:?} returned no state", id))?;
            check(resource.delete(state).await)?;
            info!(gvk = %ty.gvk_key(), id = %id, "deleted");
            if cli.output == Output::Json {
                println!("{}", serde_json::json!({ "deleted": id }));
            }
        }
    }

    Ok(())
}
