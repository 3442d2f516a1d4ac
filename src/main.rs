use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use version_lens::config::{load_config, log_dir};
use version_lens::orchestrator::{DependencyOutcome, PassReport, Pipeline, ResolveRequest};
use version_lens::parser::{ManifestParser, PackageJsonParser};
use version_lens::version::registries::NpmRegistry;

#[derive(Parser)]
#[command(name = "version-lens")]
#[command(version, about = "Check package.json dependencies for available upgrades")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every dependency of a package.json against the registry
    Check {
        /// Path to the package.json to check
        manifest: PathBuf,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also log to stderr
        #[arg(long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            manifest,
            config,
            json,
            verbose,
        } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(check(manifest, config, json, verbose)),
    }
}

async fn check(
    manifest: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path.as_deref())?;

    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let _guard = version_lens::logging::init(&log_dir, verbose);

    let content = std::fs::read_to_string(&manifest)
        .with_context(|| format!("Failed to read {}", manifest.display()))?;

    let parser = PackageJsonParser::new();
    if !parser.can_parse(&manifest.to_string_lossy()) {
        anyhow::bail!("{} is not a package.json", manifest.display());
    }

    let dependencies = parser.parse(&content).unwrap_or_else(|e| {
        warn!("Ignoring malformed manifest {}: {}", manifest.display(), e);
        eprintln!("{}: {}", manifest.display(), e);
        Vec::new()
    });

    let scope = std::fs::canonicalize(&manifest)
        .unwrap_or_else(|_| manifest.clone())
        .display()
        .to_string();
    info!("Checking {} dependencies in {}", dependencies.len(), scope);

    let registry = NpmRegistry::new(&config.registry.url);
    let handle = Pipeline::start(config, Arc::new(registry));
    let report = handle
        .orchestrator()
        .resolve_scope(ResolveRequest::new(scope, dependencies).with_fingerprint(0, content.len()))
        .await;
    handle.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    Ok(())
}

fn render_report(report: &PassReport) -> String {
    let mut out = String::new();

    if report.is_empty() {
        let _ = writeln!(out, "No dependencies found");
        return out;
    }

    for entry in report.entries() {
        let dependency = &entry.dependency;
        match &entry.outcome {
            DependencyOutcome::Upgrades(announcements) => {
                let _ = writeln!(out, "{} {}", dependency.name, dependency.declared_range);
                for announcement in announcements {
                    let _ = writeln!(
                        out,
                        "  {}  ({})",
                        announcement.title(),
                        announcement.install_command(&dependency.name)
                    );
                }
            }
            outcome => {
                let _ = writeln!(
                    out,
                    "{} {}  {}",
                    dependency.name,
                    dependency.declared_range,
                    outcome.summary()
                );
            }
        }
    }

    out
}
