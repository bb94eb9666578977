//! Catalog Composer - builds declarative catalogs from composite templates

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use composer_core::composite::{fetch_catalog_config, fetch_composite_config, ReqwestGetter, Template};
use composer_core::context::Context;
use composer_core::declcfg::OutputFormat;
use composer_core::image::{BundleIndexRegistry, Registry, UnconfiguredRegistry};

mod delta_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Format of rendered declarative config
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Yaml,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Yaml => OutputFormat::Yaml,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "catalog-composer",
    about = "Build declarative operator catalogs from composite templates",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Render every contribution into its catalog
    Render {
        /// Catalog configuration file (path or http(s) URL)
        #[clap(long, short = 'f', default_value = "catalogs.yaml")]
        catalog_config: String,

        /// Contribution configuration file (path or http(s) URL)
        #[clap(long, short = 'c', default_value = "contributions.yaml")]
        composite_config: String,

        /// Output format for rendered catalogs
        #[clap(long, short = 'o', value_enum, default_value = "yaml")]
        output: OutputArg,

        /// Skip validating each component after it is built
        #[clap(long)]
        skip_validate: bool,

        /// Bundle index file used to resolve bundle images
        #[clap(long)]
        bundle_index: Option<PathBuf>,

        /// Abort the render after this many seconds
        #[clap(long)]
        timeout: Option<u64>,
    },

    /// Print the bundles unique to each of two declarative configs
    Delta(delta_cli::DeltaArgs),
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Render {
            catalog_config,
            composite_config,
            output,
            skip_validate,
            bundle_index,
            timeout,
        } => {
            render_command(
                catalog_config,
                composite_config,
                output.into(),
                !skip_validate,
                bundle_index,
                timeout,
            )
            .await
        }
        Command::Delta(args) => args.execute(),
    }
}

async fn render_command(
    catalog_config: String,
    composite_config: String,
    output: OutputFormat,
    validate: bool,
    bundle_index: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<()> {
    let token = CancellationToken::new();
    let mut ctx = Context::with_token(token.clone());
    if let Some(secs) = timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling render");
            token.cancel();
        }
    });

    let registry: Arc<dyn Registry> = match bundle_index {
        Some(path) => {
            let index = BundleIndexRegistry::from_file(&path)?;
            debug!("Loaded {} bundles from {}", index.len(), path.display());
            Arc::new(index)
        }
        None => Arc::new(UnconfiguredRegistry),
    };

    let getter = ReqwestGetter::new()?;
    let catalogs = fetch_catalog_config(&ctx, &catalog_config, &getter).await?;
    let contributions = fetch_composite_config(&ctx, &composite_config, &getter).await?;

    Template::new()
        .with_catalog_file(catalogs)
        .with_contribution_file(contributions)
        .with_registry(registry)
        .with_output_type(output)
        .render(&ctx, validate)
        .await
        .context("Composite render failed")?;

    info!("Render complete");
    Ok(())
}
