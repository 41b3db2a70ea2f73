//! Ratchet CLI - check scheduling and build input resolution over a state file.

mod pipeline_file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ratchet_check::{parse_duration, CheckOutcome, CheckReporter, CheckRequest, CheckScheduler};
use ratchet_core::{
    BuildId, BuildRecord, BuildStatus, CheckId, DiscoveredVersion, Pipeline, Resource, ResourceId, VersionContent,
    VersionId,
};
use ratchet_execution::{reachable, BuildTrigger, CheckTicker, EngineConfig, LoggingTrigger, SchedulingEngine};
use ratchet_storage::{JsonStateFile, MemoryStorage, PipelineStore, VersionStore};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline_file::PipelineFile;

#[derive(Parser)]
#[command(name = "ratchet")]
#[command(about = "Check scheduling and build input resolution", long_about = None)]
struct Cli {
    /// State file
    #[arg(long, global = true, default_value = ".ratchet/state.json")]
    state: PathBuf,

    /// Engine configuration (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Check interval for checkables without `check_every`
    #[arg(long, global = true, value_parser = parse_duration)]
    check_interval: Option<Duration>,

    /// Period of `schedule --watch`
    #[arg(long, global = true, value_parser = parse_duration)]
    scheduling_interval: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a pipeline definition
    Import {
        /// Pipeline YAML file
        file: PathBuf,
    },
    /// Request a check of a resource
    Check {
        /// Pipeline name
        pipeline: String,
        /// Resource name
        resource: String,
        /// Check from this version (k=v[,k=v])
        #[arg(long, value_parser = parse_version)]
        version: Option<VersionContent>,
        /// Behave like a webhook: do not force dependent types
        #[arg(long)]
        webhook: bool,
        /// Do not check the resource's type first
        #[arg(long)]
        shallow: bool,
        /// Run the check without saving what it finds
        #[arg(long)]
        dry_run: bool,
    },
    /// Report the result of a running check
    CompleteCheck {
        /// Check ID
        id: CheckId,
        /// Discovered versions, oldest first (k=v[,k=v], repeatable)
        #[arg(long = "version", value_parser = parse_version)]
        versions: Vec<VersionContent>,
        /// Fail the check with this error
        #[arg(long)]
        error: Option<String>,
    },
    /// Record a finished build
    RecordBuild {
        /// Pipeline name
        pipeline: String,
        /// Job name
        job: String,
        /// Build status
        #[arg(long)]
        status: BuildStatus,
        /// Input version (name=version-id, repeatable)
        #[arg(long = "input", value_parser = parse_pair)]
        inputs: Vec<(String, String)>,
        /// Output version (resource=version-id, repeatable)
        #[arg(long = "output", value_parser = parse_pair)]
        outputs: Vec<(String, String)>,
        /// Build this one re-ran
        #[arg(long)]
        rerun_of: Option<u64>,
    },
    /// Pin a resource to a version, or unpin it
    Pin {
        /// Pipeline name
        pipeline: String,
        /// Resource name
        resource: String,
        /// Version to pin (k=v[,k=v]); omit to unpin
        #[arg(long, value_parser = parse_version)]
        version: Option<VersionContent>,
    },
    /// Run scheduling passes
    Schedule {
        /// Pipeline name
        pipeline: String,
        /// Number of passes
        #[arg(long, default_value = "1")]
        ticks: usize,
        /// Keep scheduling until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Print the VersionsDB snapshot of a pipeline
    VersionsDb {
        /// Pipeline name
        pipeline: String,
    },
    /// Print scopes and versions still in use
    Gc,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(interval) = cli.check_interval {
        config = config.with_default_check_interval(interval);
    }
    if let Some(interval) = cli.scheduling_interval {
        config = config.with_scheduling_interval(interval);
    }

    // Open storage
    let state_file = JsonStateFile::new(&cli.state);
    let store = Arc::new(state_file.load().await?);
    let read_only = matches!(cli.command, Commands::VersionsDb { .. } | Commands::Gc);

    match cli.command {
        Commands::Import { file } => {
            let summary = PipelineFile::load(&file)?.import(&store).await?;
            println!(
                "Imported pipeline {}: {} resource types, {} resources, {} jobs",
                summary.pipeline.name, summary.resource_types, summary.resources, summary.jobs
            );
        }
        Commands::Check {
            pipeline,
            resource,
            version,
            webhook,
            shallow,
            dry_run,
        } => {
            let pipeline = find_pipeline(&store, &pipeline).await?;
            let resource = find_resource(&store, &pipeline, &resource).await?;
            let types = store.list_resource_types(pipeline.id).await?;

            let mut request = if webhook { CheckRequest::webhook() } else { CheckRequest::manual() };
            if let Some(version) = version {
                request = request.from_version(version);
            }
            if shallow {
                request = request.shallow();
            }
            if dry_run {
                request = request.dry_run();
            }

            let scheduler =
                CheckScheduler::new(store.clone()).with_default_check_interval(config.default_check_interval);
            match scheduler.request_check(&resource, &types, &request).await? {
                CheckOutcome::Created(check) => println!("Created check {} of {}", check.id, check.checkable),
                CheckOutcome::InFlight(check) => println!("Check {} of {} already running", check.id, check.checkable),
                CheckOutcome::Skipped(reason) => println!("Skipped: {:?}", reason),
            }
        }
        Commands::CompleteCheck { id, versions, error } => {
            let reporter = CheckReporter::new(store.clone());
            let report = match error {
                Some(message) => reporter.fail(id, &message).await?,
                None => {
                    let found = versions.into_iter().map(DiscoveredVersion::from).collect();
                    reporter.succeed(id, found).await?
                }
            };
            println!(
                "Check {} {:?}: {} versions recorded{}",
                report.check.id,
                report.check.status,
                report.recorded.len(),
                if report.superseded { " (superseded)" } else { "" }
            );
        }
        Commands::RecordBuild {
            pipeline,
            job,
            status,
            inputs,
            outputs,
            rerun_of,
        } => {
            let pipeline = find_pipeline(&store, &pipeline).await?;
            let resources = store.list_resources(pipeline.id).await?;
            let job = store
                .list_jobs(pipeline.id)
                .await?
                .into_iter()
                .find(|j| j.name == job)
                .with_context(|| format!("unknown job '{}'", job))?;

            let mut build_inputs = Vec::with_capacity(inputs.len());
            for (name, version) in inputs {
                let input = job
                    .inputs
                    .iter()
                    .find(|i| i.name == name)
                    .with_context(|| format!("job {} has no input '{}'", job.name, name))?;
                let resource = resource_id(&resources, &input.resource)?;
                build_inputs.push((name, resource, parse_version_id(&version)?));
            }
            let mut build_outputs = Vec::with_capacity(outputs.len());
            for (resource, version) in outputs {
                build_outputs.push((resource_id(&resources, &resource)?, parse_version_id(&version)?));
            }

            let build = store
                .record_build(BuildRecord {
                    id: BuildId(0),
                    job_id: job.id,
                    status,
                    rerun_of: rerun_of.map(BuildId),
                    inputs: build_inputs,
                    outputs: build_outputs,
                })
                .await?;
            println!("Recorded build {} of job {} ({:?})", build.id, job.name, build.status);
        }
        Commands::Pin {
            pipeline,
            resource,
            version,
        } => {
            let pipeline = find_pipeline(&store, &pipeline).await?;
            let resource = find_resource(&store, &pipeline, &resource).await?;
            let pinned = version.is_some();
            store.pin_version(resource.id, version).await?;
            println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, resource.name);
        }
        Commands::Schedule {
            pipeline,
            ticks,
            watch: until_interrupted,
        } => {
            let pipeline = find_pipeline(&store, &pipeline).await?;
            let trigger: Arc<dyn BuildTrigger> = Arc::new(LoggingTrigger);
            let scheduler =
                CheckScheduler::new(store.clone()).with_default_check_interval(config.default_check_interval);
            let ticker = CheckTicker::new(store.clone(), scheduler, trigger.clone());
            let engine = SchedulingEngine::new(store.clone(), trigger).with_config(config.clone());

            if until_interrupted {
                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = tx.send(true);
                    }
                });
                info!("Scheduling pipeline {} every {:?}", pipeline.name, config.scheduling_interval);
                engine.run(pipeline.id, rx).await?;
            } else {
                for tick in 1..=ticks {
                    let checks = ticker.tick(pipeline.id).await?;
                    let report = engine.run_tick(pipeline.id).await?;
                    println!(
                        "Tick {}: {} checks created, {} builds triggered, {} failed",
                        tick,
                        checks.created(),
                        report.triggered(),
                        report.failed()
                    );
                    for (job, outcome) in &report.jobs {
                        println!("  {} | {:?}", job, outcome);
                    }
                }
            }
        }
        Commands::VersionsDb { pipeline } => {
            let pipeline = find_pipeline(&store, &pipeline).await?;
            let db = store.snapshot_versions_db(pipeline.id).await?;
            println!("{}", serde_json::to_string_pretty(&db)?);
        }
        Commands::Gc => {
            let found = reachable(&*store).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
    }

    if !read_only {
        state_file.save(&store).await?;
    }

    Ok(())
}

async fn find_pipeline(store: &MemoryStorage, name: &str) -> Result<Pipeline> {
    store
        .find_pipeline(name)
        .await?
        .with_context(|| format!("unknown pipeline '{}'", name))
}

async fn find_resource(store: &MemoryStorage, pipeline: &Pipeline, name: &str) -> Result<Resource> {
    store
        .list_resources(pipeline.id)
        .await?
        .into_iter()
        .find(|r| r.name == name)
        .with_context(|| format!("unknown resource '{}' in pipeline {}", name, pipeline.name))
}

fn resource_id(resources: &[Resource], name: &str) -> Result<ResourceId> {
    resources
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.id)
        .with_context(|| format!("unknown resource '{}'", name))
}

fn parse_version_id(raw: &str) -> Result<VersionId> {
    Ok(VersionId(raw.parse().with_context(|| format!("invalid version id '{}'", raw))?))
}

/// Parse `key=value`.
fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse `k=v[,k=v]` into version content.
fn parse_version(raw: &str) -> std::result::Result<VersionContent, String> {
    raw.split(',').map(parse_pair).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let version = parse_version("ref=abc,branch=main").unwrap();
        assert_eq!(version.len(), 2);
        assert_eq!(version["ref"], "abc");

        assert!(parse_version("ref").is_err());
        assert!(parse_version("=x").is_err());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "ratchet",
            "--state",
            "/tmp/s.json",
            "record-build",
            "main",
            "unit",
            "--status",
            "succeeded",
            "--input",
            "repo=3",
        ])
        .unwrap();
        assert_eq!(cli.state, PathBuf::from("/tmp/s.json"));
        match cli.command {
            Commands::RecordBuild { status, inputs, .. } => {
                assert_eq!(status, BuildStatus::Succeeded);
                assert_eq!(inputs, vec![("repo".to_string(), "3".to_string())]);
            }
            _ => panic!("expected record-build"),
        }

        let cli = Cli::try_parse_from(["ratchet", "gc", "--check-interval", "5m"]).unwrap();
        assert_eq!(cli.check_interval, Some(Duration::from_secs(300)));
    }
}
