// src/lib.rs

pub mod cli;
pub mod config;
pub mod console;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod refresh;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{apply_cli_overrides, load_or_default, Settings};
use crate::engine::{
    restart_queue, spawn_health_monitor, spawn_restart_worker, teardown, RestartRequest,
    Runtime, RuntimeEvent,
};
use crate::exec::{
    CommandLauncher, CommandPreflight, HttpReadiness, ReadinessProbe, StdoutReadiness,
    Supervisor, TcpReadiness,
};
use crate::refresh::{HttpNotifier, Notifier};
use crate::types::ReadinessMode;
use crate::watch::{spawn_watcher, ExcludePatterns, WatchOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the supervisor with its launcher, preflight check and readiness probe
/// - the initial start
/// - restart worker, health monitor, (optional) file watcher and console
/// - Ctrl-C handling
///
/// and tears everything down, server included, on every exit path.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(&args.config)?;
    apply_cli_overrides(&mut cfg, &args);
    let settings = Settings::try_from(cfg).context("invalid configuration")?;

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(settings.timings.refresh_timeout)?);
    let supervisor = Arc::new(build_supervisor(&settings, Arc::clone(&notifier)));

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let (queue, requests) = restart_queue(settings.queue_capacity);

    // Ctrl-C → graceful shutdown. Installed before anything can launch a
    // server so an early interrupt still reaches the teardown.
    let mut tasks = vec![{
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        })
    }];

    // The initial start runs on the worker like any other restart and seeds
    // its minimum-interval clock.
    queue.enqueue(RestartRequest::new("initial-start", settings.port));
    tasks.push(spawn_restart_worker(Arc::clone(&supervisor), requests));
    tasks.push(spawn_health_monitor(
        Arc::clone(&supervisor),
        queue.clone(),
        settings.timings.health_interval,
        settings.port,
    ));

    // A watcher that cannot attach disables itself; manual and health
    // triggered restarts keep working.
    let watcher = if settings.watch_enabled {
        match start_watcher(&settings, rt_tx.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "file watching disabled");
                None
            }
        }
    } else {
        info!("file watching disabled by configuration");
        None
    };

    if settings.interactive {
        tasks.push(console::spawn_console(rt_tx.clone()));
    }
    drop(rt_tx);

    let runtime = Runtime::new(
        Arc::clone(&supervisor),
        queue,
        notifier,
        settings.port,
        rt_rx,
    );

    // Run on its own task so a panic in the loop still reaches the teardown.
    let result = match tokio::spawn(runtime.run()).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(error = %join_err, "runtime task failed");
            Err(anyhow::anyhow!("runtime task failed: {join_err}"))
        }
    };

    drop(watcher);
    teardown(&supervisor, tasks).await;
    info!("rekindle stopped");

    result
}

fn build_supervisor(settings: &Settings, notifier: Arc<dyn Notifier>) -> Supervisor {
    let launcher = Arc::new(CommandLauncher::from_settings(settings));

    let readiness: Arc<dyn ReadinessProbe> = match settings.readiness {
        ReadinessMode::Http => Arc::new(HttpReadiness::new(notifier)),
        ReadinessMode::Tcp => Arc::new(TcpReadiness::default()),
        ReadinessMode::Stdout => Arc::new(StdoutReadiness),
    };

    let supervisor = Supervisor::new(
        launcher,
        readiness,
        settings.max_attempts,
        settings.timings.clone(),
    );

    match settings.preflight {
        Some(ref command) => {
            supervisor.with_preflight(Arc::new(CommandPreflight::new(command, &settings.root)))
        }
        None => supervisor,
    }
}

fn start_watcher(
    settings: &Settings,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<watch::WatcherHandle> {
    let exclude = ExcludePatterns::compile(&settings.exclude)?;
    let options = WatchOptions {
        root: settings.root.clone(),
        extra_dirs: settings.watch_dirs.clone(),
        debounce: settings.debounce,
        exclude,
    };
    Ok(spawn_watcher(options, runtime_tx)?)
}

/// Simple dry-run output: print the resolved settings.
fn print_dry_run(settings: &Settings) {
    println!("rekindle dry-run");
    println!("  command: {}", settings.command);
    println!("  root: {}", settings.root.display());
    println!("  port: {}", settings.port);
    println!("  framework prefix: {}", settings.framework);
    if !settings.extra_env.is_empty() {
        println!("  extra env:");
        for (key, value) in &settings.extra_env {
            println!("    {key}={value}");
        }
    }
    match settings.preflight {
        Some(ref cmd) => println!("  preflight: {cmd}"),
        None => println!("  preflight: (none)"),
    }
    println!();

    println!("watch:");
    println!("  enabled: {}", settings.watch_enabled);
    println!("  debounce: {:?}", settings.debounce);
    println!("  extra dirs: {:?}", settings.watch_dirs);
    if !settings.exclude.is_empty() {
        println!("  exclude: {:?}", settings.exclude);
    }
    println!();

    println!("restart:");
    println!("  max attempts: {}", settings.max_attempts);
    println!("  queue capacity: {}", settings.queue_capacity);
    println!("  min interval: {:?}", settings.timings.min_restart_interval);
    println!("  readiness: {:?}", settings.readiness);
    if let Some(ref re) = settings.ready_pattern {
        println!("  ready pattern: {re}");
    }
    println!("  startup timeout: {:?}", settings.timings.startup_timeout);
    println!("  health interval: {:?}", settings.timings.health_interval);
    println!("  interactive: {}", settings.interactive);

    debug!("dry-run complete (no execution)");
}
