//! dist-deployer CLI
//!
//! Archives a package, uploads it to the distribution bucket and updates the
//! package index.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dist_deployer::deploy::manifest::ManifestBuilder;
use dist_deployer::deploy::storage::{archive_key, public_url};
use dist_deployer::security::mask_token;
use dist_deployer::{
    Bucket, ConfigLoadOptions, ConfigLoader, ConfigOverrides, CredentialManager, DeployConfig,
    DeployError, DeployOptions, Descriptor, ObjectStoreBucket, Publisher,
    StorageBackend,
};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Package archive and index deployer
#[derive(Parser)]
#[command(name = "dist-deployer")]
#[command(version = "0.1.0")]
#[command(about = "Publish package archives to a distribution bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive, upload and register a package version
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Build the archive and index locally without uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration and show the manifest that would be published
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the remote package index
    Index {
        /// Package name
        #[arg(value_name = "NAME")]
        name: String,

        /// Print only the entry for this version
        #[arg(short = 'p', long)]
        package_version: Option<String>,

        /// Config file (defaults to ./.deploy-config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Package name
    #[arg(value_name = "NAME")]
    name: Option<String>,

    /// Version to publish
    #[arg(short = 'p', long)]
    package_version: Option<String>,

    /// Config file (defaults to ./.deploy-config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to archive (defaults to ..)
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Descriptor path (defaults to ../pubspec.yaml)
    #[arg(long)]
    descriptor: Option<PathBuf>,

    /// Staging directory for the archive and index copy
    #[arg(long)]
    staging_dir: Option<PathBuf>,
}

impl TargetArgs {
    fn into_load_options(self, env: HashMap<String, String>) -> ConfigLoadOptions {
        ConfigLoadOptions {
            project_path: PathBuf::from("."),
            config_file: self.config,
            overrides: ConfigOverrides {
                name: self.name,
                version: self.package_version,
                source_dir: self.source_dir,
                descriptor: self.descriptor,
                staging_dir: self.staging_dir,
            },
            env,
        }
    }
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dist_deployer=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env: HashMap<String, String> = std::env::vars().collect();

    match cli.command {
        Commands::Deploy { target, dry_run } => {
            deploy_command(target.into_load_options(env.clone()), &env, dry_run).await
        }
        Commands::Check { target } => check_command(target.into_load_options(env.clone()), &env).await,
        Commands::Index {
            name,
            package_version,
            config,
        } => {
            let options = ConfigLoadOptions {
                project_path: PathBuf::from("."),
                config_file: config,
                overrides: ConfigOverrides {
                    name: Some(name),
                    ..Default::default()
                },
                env: env.clone(),
            };
            index_command(options, &env, package_version.as_deref()).await
        }
    }
}

fn open_bucket(config: &DeployConfig, env: &HashMap<String, String>) -> Result<Arc<dyn Bucket>, DeployError> {
    let credentials = match config.storage.backend {
        StorageBackend::Cos => {
            let credentials = CredentialManager::new(config.credentials.clone()).require(env)?;
            info!(
                secret_id = %mask_token(credentials.secret_id.expose_secret()),
                "using storage credentials"
            );
            Some(credentials)
        }
        StorageBackend::Local | StorageBackend::Memory => None,
    };

    Ok(Arc::new(ObjectStoreBucket::open(&config.storage, credentials)?))
}

fn print_error(error: &DeployError) {
    eprintln!("\n❌ [{}] {}", error.code(), error);
    for action in error.suggested_actions() {
        eprintln!("  → {}", action);
    }
}

async fn deploy_command(
    options: ConfigLoadOptions,
    env: &HashMap<String, String>,
    dry_run: bool,
) -> Result<i32> {
    println!("\n📦 dist-deployer\n");

    let config = ConfigLoader::load(options).await?;
    let validation = match ConfigLoader::ensure_valid(&config) {
        Ok(validation) => validation,
        Err(e) => {
            print_error(&e);
            return Ok(1);
        }
    };
    for warning in &validation.warnings {
        println!("⚠️  [{}] {}", warning.field, warning.message);
    }

    let bucket = match open_bucket(&config, env) {
        Ok(bucket) => bucket,
        Err(e) => {
            print_error(&e);
            return Ok(1);
        }
    };

    let publisher = Publisher::new(config, bucket);
    let config = publisher.config();
    println!(
        "Deploying {} {} to {} ({})",
        config.package.name,
        config.package.version,
        config.storage.bucket,
        config.storage.backend.as_str()
    );

    match publisher.deploy(DeployOptions { dry_run }).await {
        Ok(report) => {
            for warning in &report.warnings {
                println!("⚠️  {}", warning);
            }
            println!("  Archive: {} ({} bytes)", report.archive.path.display(), report.archive.bytes);
            println!("  URL: {}", report.archive_url);
            println!(
                "  Index: {} version(s){}{}",
                report.index.version_count,
                if report.index.replaced { ", replaced existing entry" } else { "" },
                if report.index.latest_updated { ", latest updated" } else { "" }
            );

            if report.dry_run {
                println!("\n[Dry run] Nothing was uploaded. Index copy: {}", report.index_path.display());
            } else {
                println!(
                    "\n✅ Published {} {} in {}ms",
                    report.package_name, report.version, report.duration
                );
            }
            Ok(0)
        }
        Err(e) => {
            print_error(&e);
            Ok(1)
        }
    }
}

async fn check_command(options: ConfigLoadOptions, env: &HashMap<String, String>) -> Result<i32> {
    println!("\n🔍 Deploy Check\n");

    let config = ConfigLoader::load(options).await?;
    let validation = ConfigLoader::validate(&config);
    println!("{}\n", ConfigLoader::format_validation_result(&validation));
    if !validation.valid {
        return Ok(1);
    }

    if config.storage.backend == StorageBackend::Cos {
        let manager = CredentialManager::new(config.credentials.clone());
        for variable in manager.variable_names() {
            let state = match env.get(variable) {
                Some(value) if !value.is_empty() => "set",
                _ => "missing",
            };
            println!("  {}: {}", variable, state);
        }
        println!();
    }

    let descriptor = match Descriptor::from_path(&config.package.descriptor).await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            print_error(&e);
            return Ok(1);
        }
    };

    let url = public_url(
        &config.storage.public_base_url,
        &archive_key(&config.package.name, &config.package.version),
    );
    let entry = ManifestBuilder::new(
        config.package.name.as_str(),
        config.package.version.as_str(),
        config.defaults.clone(),
    )
    .build(&descriptor, &url, Utc::now());

    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(0)
}

async fn index_command(
    options: ConfigLoadOptions,
    env: &HashMap<String, String>,
    version: Option<&str>,
) -> Result<i32> {
    let config = ConfigLoader::load(options).await?;
    let bucket = match open_bucket(&config, env) {
        Ok(bucket) => bucket,
        Err(e) => {
            print_error(&e);
            return Ok(1);
        }
    };

    let publisher = Publisher::new(config, bucket);
    let (index, fallback) = publisher.fetch_index().await;
    if let Some(note) = fallback.as_ref().and_then(|f| f.describe()) {
        eprintln!("⚠️  {}", note);
    }

    let json = match version {
        Some(version) => match index.find(version) {
            Some(entry) => serde_json::to_string_pretty(entry),
            None => {
                eprintln!("❌ {} {} is not in the index", index.name, version);
                return Ok(1);
            }
        },
        None => serde_json::to_string_pretty(&index),
    }
    .context("failed to render index")?;
    println!("{}", json);
    Ok(0)
}
