//! Route script simulation.
//!
//! Replays a sequence of routes against a simulated backend: every route
//! change is recorded as a navigation, the destination's data types are read
//! through the orchestrator, and learned transitions prefetch ahead. The
//! summary shows how many reads were served without a backend round trip.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cachepilot::transport::{BoxFuture, FetchResult};
use cachepilot::warming::WarmOptions;
use cachepilot::{CacheOrchestrator, FetchRequest, Fetcher, MemoryStore, Priority, TransportError};
use clap::Args;
use console::style;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::common::load_config;
use crate::error::CliError;

/// Routes replayed when no script is given.
const DEFAULT_SCRIPT: &[&str] = &[
    "/dashboard",
    "/progress",
    "/dashboard",
    "/profile",
    "/settings",
    "/dashboard",
    "/activity",
];

/// Arguments of `cachepilot simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Route script, one route per line ('#' starts a comment)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Subject whose data is read
    #[arg(long, default_value = "u1")]
    subject: String,

    /// Simulated backend latency in milliseconds
    #[arg(long, default_value_t = 40)]
    latency_ms: u64,

    /// Data types whose backend calls fail (repeatable)
    #[arg(long = "fail", value_name = "DATA_TYPE")]
    failing: Vec<String>,

    /// Times the script is replayed
    #[arg(long, default_value_t = 3)]
    rounds: usize,

    /// Learn from and update the persisted navigation patterns
    #[arg(long)]
    persist: bool,
}

/// Backend that answers every request after a fixed latency.
#[derive(Clone)]
struct SimulatedBackend {
    latency: Duration,
    failing: Arc<HashSet<String>>,
    calls: Arc<AtomicU64>,
}

impl SimulatedBackend {
    fn new(latency: Duration, failing: impl IntoIterator<Item = String>) -> Self {
        Self {
            latency,
            failing: Arc::new(failing.into_iter().collect()),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Fetcher for SimulatedBackend {
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> BoxFuture<'static, FetchResult> {
        let version = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let latency = self.latency;
        let fails = self.failing.contains(&request.data_type);
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                _ = tokio::time::sleep(latency) => {
                    if fails {
                        Err(TransportError::failed(format!("{} backend unavailable", request.data_type)))
                    } else {
                        Ok(json!({
                            "data_type": request.data_type,
                            "subject": request.subject_id,
                            "version": version,
                        }))
                    }
                }
            }
        })
    }
}

/// Run the simulation.
pub fn run(config_path: Option<&Path>, args: SimulateArgs) -> Result<(), CliError> {
    let routes = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CliError::Simulate(format!("cannot read {}: {}", path.display(), e)))?;
            parse_script(&text)
        }
        None => DEFAULT_SCRIPT.iter().map(|r| r.to_string()).collect(),
    };
    if routes.len() < 2 {
        return Err(CliError::Simulate("the script needs at least two routes".to_string()));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Simulate(format!("cannot start runtime: {}", e)))?;
    runtime.block_on(simulate(config_path, args, routes))
}

async fn simulate(config_path: Option<&Path>, args: SimulateArgs, routes: Vec<String>) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    if !args.persist {
        config.persistence.enabled = false;
    }

    let store = Arc::new(MemoryStore::new());
    let orchestrator = config
        .apply(CacheOrchestrator::builder().store(store.clone()))?
        .build()?;

    let backend = SimulatedBackend::new(Duration::from_millis(args.latency_ms), args.failing.clone());
    for data_type in orchestrator.reader().strategies().data_types() {
        orchestrator.register_fetcher(data_type, backend.clone());
    }

    let shutdown = CancellationToken::new();
    let gc = store.spawn_gc_daemon(config.executor.gc_interval, shutdown.clone());

    orchestrator.set_active_subject(Some(args.subject.clone()));
    let warm = orchestrator
        .warm_critical_data(&args.subject, WarmOptions::default().with_priority(Priority::High))
        .await;
    println!(
        "{} {} data types ({} fetched, {} failed)",
        style("warm").cyan().bold(),
        warm.data_types.len(),
        warm.fetched,
        warm.failed.len()
    );

    let mut reads = 0usize;
    let mut served_from_cache = 0usize;
    let mut previous: Option<String> = None;

    for round in 1..=args.rounds {
        println!("{}", style(format!("round {}", round)).bold());
        for route in &routes {
            let mut prefetched = 0;
            if let Some(from) = &previous {
                let summary = orchestrator.record_navigation(from, route).join().await;
                prefetched = summary.fetched;
            }

            let started = Instant::now();
            let mut route_hits = 0;
            let data_types = orchestrator.learner().routes().data_types_for(route);
            for data_type in &data_types {
                let before = backend.calls();
                match orchestrator.read(data_type, &args.subject, vec![]).await {
                    Ok(_) if backend.calls() == before => route_hits += 1,
                    Ok(_) => {}
                    Err(e) => debug!(data_type = %data_type, error = %e, "Simulated read failed"),
                }
            }
            reads += data_types.len();
            served_from_cache += route_hits;

            println!(
                "  {:<14} reads {}/{} cached  prefetched {}  {:>5}ms",
                route,
                route_hits,
                data_types.len(),
                prefetched,
                started.elapsed().as_millis()
            );
            previous = Some(route.clone());
        }
    }

    shutdown.cancel();
    let _ = gc.await;

    let ratio = if reads == 0 {
        0.0
    } else {
        served_from_cache as f64 / reads as f64 * 100.0
    };
    println!();
    println!(
        "{} {}/{} route reads served from cache ({:.1}%), {} backend calls",
        style("result").green().bold(),
        served_from_cache,
        reads,
        ratio,
        backend.calls()
    );
    println!("{}", orchestrator.stats());
    Ok(())
}

/// Parse a route script: one route per line, blank lines and `#` comments
/// ignored.
fn parse_script(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let script = "# morning session\n/dashboard\n\n/progress   # check streak\n  /profile\n";
        assert_eq!(parse_script(script), vec!["/dashboard", "/progress", "/profile"]);
    }

    #[tokio::test]
    async fn test_backend_failure_and_cancellation() {
        let backend = SimulatedBackend::new(Duration::from_millis(1), ["activity".to_string()]);

        let ok = backend
            .fetch(FetchRequest::new("user-profile", "u1"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ok["version"], 1);

        let err = backend
            .fetch(FetchRequest::new("activity", "u1"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Failed { .. }));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend
            .fetch(FetchRequest::new("user-profile", "u1"), cancel)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
        assert_eq!(backend.calls(), 3);
    }
}
