//! CLI argument parsing and command dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use obsim_config::SimulationConfig;
use obsim_core::{LogLevel, LogQuery, MockApi, TraceFilter};
use serde::Serialize;
use serde_json::json;

/// Generate synthetic metrics, traces, logs and alerts for mock services.
#[derive(Parser, Debug)]
#[command(name = "obsim")]
#[command(version)]
#[command(about = "Synthetic observability data generator")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Simulation config file; defaults to ./obsim.toml, then the user config dir.
    #[arg(long, env = "OBSIM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Seed for reproducible output; overrides `[simulation] seed`.
    #[arg(long, env = "OBSIM_SEED", global = true)]
    pub seed: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a full snapshot as JSON.
    Generate {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the mock services.
    Services,

    /// Print the metric series of one service.
    Metrics {
        /// Service id or name.
        #[arg(short, long)]
        service: String,

        /// Downsample each series to at most this many points.
        #[arg(long)]
        max_points: Option<usize>,
    },

    /// Trace statistics, dependency graph and the slowest trace's critical path.
    Traces {
        /// Number of recent traces to include.
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },

    /// Recent log entries, newest first.
    Logs {
        /// Only entries at this level (DEBUG, INFO, WARN, ERROR, FATAL).
        #[arg(short, long)]
        level: Option<String>,

        /// Only entries from this service.
        #[arg(long)]
        service: Option<String>,

        /// Case-insensitive message substring.
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print aggregate statistics instead of entries.
        #[arg(long)]
        stats: bool,
    },

    /// Alert statistics, storms and currently active alerts.
    Alerts,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = load_config(&self.global)?;
        let api = MockApi::generate(&config, self.global.seed)
            .await
            .context("failed to generate simulation snapshot")?;

        match self.command {
            Commands::Generate { output } => {
                let snapshot = api.snapshot().await;
                let rendered = serde_json::to_string_pretty(&snapshot)?;
                match output {
                    Some(path) => {
                        std::fs::write(&path, rendered)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        tracing::info!("Wrote snapshot to {}", path.display());
                    }
                    None => println!("{}", rendered),
                }
            }
            Commands::Services => print_json(&api.list_services().await)?,
            Commands::Metrics {
                service,
                max_points,
            } => {
                let mut series = api.metrics(&service).await?;
                if let Some(max_points) = max_points {
                    let mut reduced = Vec::with_capacity(series.len());
                    for s in &series {
                        reduced.push(api.aggregated_metric(&s.metric_id, max_points).await?);
                    }
                    series = reduced;
                }
                print_json(&series)?;
            }
            Commands::Traces { count } => {
                let statistics = api.trace_statistics().await;
                let critical_path = match &statistics.slowest_trace_id {
                    Some(id) => api.critical_path(id).await?,
                    None => Vec::new(),
                };
                let recent = api
                    .traces(&TraceFilter {
                        limit: Some(count),
                        ..TraceFilter::default()
                    })
                    .await;
                let recent: Vec<_> = recent
                    .iter()
                    .map(|t| {
                        json!({
                            "trace_id": t.trace_id,
                            "root_service": t.root_service,
                            "start_time": t.start_time,
                            "duration_ms": t.total_duration_ms,
                            "span_count": t.span_count,
                            "status": t.status,
                        })
                    })
                    .collect();

                print_json(&json!({
                    "statistics": statistics,
                    "dependency_graph": api.dependency_graph().await,
                    "critical_path": critical_path,
                    "recent": recent,
                }))?;
            }
            Commands::Logs {
                level,
                service,
                search,
                limit,
                stats,
            } => {
                if stats {
                    return print_json(&api.log_statistics().await);
                }
                let levels = match level {
                    Some(level) => vec![level
                        .parse::<LogLevel>()
                        .with_context(|| format!("invalid --level {}", level))?],
                    None => Vec::new(),
                };
                let query = LogQuery {
                    levels,
                    services: service.into_iter().collect(),
                    search,
                    limit: Some(limit),
                    ..LogQuery::default()
                };
                print_json(&api.logs(&query).await)?;
            }
            Commands::Alerts => {
                let active: Vec<_> = api
                    .alert_events()
                    .await
                    .into_iter()
                    .filter(|e| e.is_active())
                    .collect();
                print_json(&json!({
                    "statistics": api.alert_statistics().await,
                    "storms": api.alert_storms().await,
                    "active": active,
                }))?;
            }
        }
        Ok(())
    }
}

fn load_config(global: &GlobalOptions) -> Result<SimulationConfig> {
    match &global.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => SimulationConfig::load_or_default().context("failed to load config"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
