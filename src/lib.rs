// src/lib.rs

//! Startup orchestration: run inter-dependent asynchronous tasks under
//! bounded concurrency, then open a readiness gate that replays the calls
//! buffered while the graph was draining.
//!
//! The pieces, leaves first:
//! - [`registry`]: typed factories with `New`/`Unique` storage.
//! - [`task`]: the cancelable [`TaskNode`](task::TaskNode) state machine.
//! - [`queue`]: the bounded-concurrency [`TaskQueue`](queue::TaskQueue).
//! - [`dag`]: graph validation and the pure scheduler.
//! - [`fanout`]: sequential and parallel fan-out helpers.
//! - [`gate`]: the [`ReadinessGate`](gate::ReadinessGate).
//! - [`engine`]: composition of all of the above.

pub mod cli;
pub mod config;
pub mod dag;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod fanout;
pub mod gate;
pub mod logging;
pub mod plugin;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod sim;
pub mod task;
pub mod types;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::{Engine, EngineHandle};
use crate::plugin::LifecycleEvent;
use crate::provider::ServiceProvider;
use crate::sim::{CompletionLog, SimulatedServices};
use crate::task::NodeOutcome;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the simulated providers
/// - the engine (registry / graph / queue / gate)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    let max_concurrency = match args.max_concurrency {
        Some(0) => anyhow::bail!("--max-concurrency must be >= 1 (got 0)"),
        Some(n) => n,
        None => cfg.engine.max_concurrency,
    };

    let services = SimulatedServices::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &services, max_concurrency)?;
        return Ok(());
    }

    let log = services.log();
    let started = Instant::now();

    let engine = Engine::builder()
        .max_concurrency(max_concurrency)
        .provider(services)
        .on_ready(|| info!("all startup tasks finished"))
        .start()?;

    // Sent while tasks are still running: buffered by the gate and delivered
    // once startup completes.
    engine.broadcast(LifecycleEvent::DidFinishLaunching);

    // Ctrl-C → cancel whatever has not finished; the graph still drains.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            engine.cancel_all();
        });
    }

    engine.join().await?;
    print_summary(&engine, &log, started.elapsed());

    engine.broadcast(LifecycleEvent::WillTerminate);
    Ok(())
}

/// Print tasks in execution order with their settings, without running.
fn print_dry_run(cfg: &ConfigFile, services: &SimulatedServices, max: usize) -> Result<()> {
    let graph = DependencyGraph::new(services.operations())?;

    println!("bootdag dry-run");
    println!("  engine.max_concurrency = {max}");
    println!();

    println!("tasks ({}), in execution order:", graph.len());
    for node in graph.topological_order() {
        println!("  - {}", node.name());
        let Some(task) = cfg.task.get(node.name()) else {
            continue;
        };
        if let Some(ref duration) = task.duration {
            println!("      duration: {duration}");
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if task.priority != 0 {
            println!("      priority: {}", task.priority);
        }
        if task.affinity != Default::default() {
            println!("      affinity: {:?}", task.affinity);
        }
        if task.fail {
            println!("      fail: true");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(engine: &EngineHandle, log: &CompletionLog, elapsed: Duration) {
    println!("bootdag: startup finished in {elapsed:.2?}");
    for task in engine.tasks() {
        let outcome = match task.outcome() {
            Some(NodeOutcome::Succeeded) => "succeeded".to_string(),
            Some(NodeOutcome::Failed(err)) => format!("failed: {err}"),
            Some(NodeOutcome::Canceled) => "canceled".to_string(),
            None => "not finished".to_string(),
        };
        println!("  - {}: {outcome}", task.name());
    }
    println!("completion order: {}", log.entries().join(" -> "));
}
