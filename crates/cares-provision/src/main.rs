//! Cares Provision CLI

use anyhow::Context;
use cares_appwrite::{AppwriteClient, AppwriteClientConfig};
use cares_core::prelude::*;
use cares_provision::{catalog, Provisioner};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cares-provision")]
#[command(about = "Schema provisioner for the Christy Cares backend")]
#[command(version)]
struct Args {
    /// Optional configuration file
    #[arg(long, env = "CARES_CONFIG", global = true)]
    config: Option<String>,

    #[arg(long, env = "APPWRITE_ENDPOINT", global = true)]
    endpoint: Option<String>,

    #[arg(long, env = "APPWRITE_PROJECT_ID", global = true)]
    project_id: Option<String>,

    #[arg(long, env = "APPWRITE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "DATABASE_ID", global = true)]
    database_id: Option<String>,

    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format: json or pretty
    #[arg(long, env = "LOG_FORMAT", global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing collections, attributes and indexes
    Setup(Selection),
    /// Create missing collections only
    CreateCollections(Selection),
    /// Reset collection permissions to the catalog's
    FixPermissions(Selection),
    /// Print the collection catalog as JSON
    Catalog,
}

#[derive(ClapArgs, Debug)]
struct Selection {
    /// Restrict to these collections (repeatable or comma separated)
    #[arg(long = "collection", value_delimiter = ',')]
    collections: Vec<String>,

    /// Exit with an error when any resource failed
    #[arg(long)]
    strict: bool,
}

impl Args {
    /// Layered configuration with CLI and flat environment overrides applied
    fn resolve_config(&self) -> anyhow::Result<CaresConfig> {
        let mut config = CaresConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(endpoint) = &self.endpoint {
            config.appwrite.endpoint = endpoint.clone();
        }
        if let Some(project_id) = &self.project_id {
            config.appwrite.project_id = project_id.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.appwrite.api_key = Some(api_key.clone());
        }
        if let Some(database_id) = &self.database_id {
            config.appwrite.database_id = database_id.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format = format.clone();
        }
        Ok(config)
    }
}

fn init_tracing(config: &CaresConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the report, logs go to stderr
    if config.observability.log_format == "pretty" {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    init_tracing(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cares-provision");

    let (selection, collections_only) = match &args.command {
        Command::Catalog => {
            println!("{}", serde_json::to_string_pretty(&catalog::catalog())?);
            return Ok(());
        }
        Command::Setup(selection) | Command::FixPermissions(selection) => (selection, false),
        Command::CreateCollections(selection) => (selection, true),
    };

    let mut specs = catalog::select(catalog::catalog(), &selection.collections)?;
    if collections_only {
        specs = specs.iter().map(ResourceSpec::collection_only).collect();
    }

    config.appwrite.require_credentials()?;
    let client = AppwriteClient::new(AppwriteClientConfig::from(&config.appwrite))?;
    let provisioner = Provisioner::new(Arc::new(client), config.appwrite.database_id.clone());

    let has_failures = match &args.command {
        Command::FixPermissions(_) => {
            let report = provisioner.fix_permissions(&specs).await.map_err(|e| {
                error!(error = %e, "Permission update aborted");
                e
            })?;
            println!("{report}");
            report.has_failures()
        }
        _ => {
            let report = provisioner.provision(&specs).await.map_err(|e| {
                error!(error = %e, "Provisioning aborted");
                e
            })?;
            println!("{report}");
            report.has_failures()
        }
    };

    if has_failures && selection.strict {
        anyhow::bail!("some resources failed to provision");
    }

    info!("Done");
    Ok(())
}
