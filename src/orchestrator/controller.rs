//! Update run controller.
//!
//! Owns the run lock and the run log, drives the engine task, and turns engine
//! events into timestamped log lines. SIGINT or SIGTERM aborts the engine;
//! child processes are killed and temp files removed by their drop guards,
//! and the lock is released on return.

use crate::config::RefreshConfig;
use crate::engine::RefreshEngine;
use crate::model::{
    LogLevel, PipelineEvent, PlayerSummary, RunOutcome, RunReport, StepPolicy, StepReport,
    StepStatus,
};
use crate::storage::{timestamp_now, RunLock, RunLog};
use anyhow::{Context, Result};
use rand::RngCore;
use std::future::Future;
use tokio::sync::mpsc;

/// Generate a random id for one run.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    b.iter().map(|x| format!("{x:02x}")).collect()
}

/// Resolves on SIGINT or SIGTERM. The handlers are installed when this is
/// called, not when the future is first polled.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    async move {
        let (mut interrupt, mut terminate) = match (interrupt, terminate) {
            (Ok(i), Ok(t)) => (i, t),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "cannot install signal handlers");
                return std::future::pending().await;
            }
        };
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("received SIGINT"),
            _ = terminate.recv() => tracing::info!("received SIGTERM"),
        }
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Log level and text for an engine event.
pub(crate) fn render_event(ev: &PipelineEvent) -> (LogLevel, String) {
    match ev {
        PipelineEvent::StepStarted { step } => (LogLevel::Info, format!("{}...", step.label())),
        PipelineEvent::StepFinished { report } => render_step(report),
        PipelineEvent::Info(info) => (LogLevel::Info, info.to_message()),
        PipelineEvent::Warning(msg) => (LogLevel::Warn, msg.clone()),
        PipelineEvent::Players(summary) => (LogLevel::Info, render_players(summary)),
    }
}

fn render_players(p: &PlayerSummary) -> String {
    match p.top.first() {
        Some(top) => format!(
            "{} players summarized; leader {} ({}) at {:.1} FP/game",
            p.count, top.name, top.team, top.fantasy_points
        ),
        None => format!("{} players summarized", p.count),
    }
}

fn render_step(r: &StepReport) -> (LogLevel, String) {
    match (r.status, r.policy) {
        (StepStatus::Succeeded, _) => (LogLevel::Info, format!("{} succeeded: {}", r.step, r.message)),
        (StepStatus::Skipped, _) => (LogLevel::Warn, format!("{} skipped: {}", r.step, r.message)),
        (StepStatus::Failed, StepPolicy::Optional) => (
            LogLevel::Warn,
            format!("{} failed (optional, continuing): {}", r.step, r.message),
        ),
        (StepStatus::Failed, StepPolicy::Critical) => {
            (LogLevel::Error, format!("{} failed: {}", r.step, r.message))
        }
    }
}

/// Writes rendered lines to the run log and, unless silent, to stderr.
struct EventSink {
    log: RunLog,
    echo: bool,
}

impl EventSink {
    fn line(&mut self, level: LogLevel, msg: &str) -> Result<()> {
        let text = match level {
            LogLevel::Info => msg.to_string(),
            LogLevel::Warn => format!("WARNING: {msg}"),
            LogLevel::Error => format!("ERROR: {msg}"),
        };
        tracing::debug!(target: "nba_refresh::run_log", "{text}");
        if self.echo {
            eprintln!("{text}");
        }
        self.log.append(&text)
    }
}

/// What the controller has seen of a run so far.
#[derive(Default)]
struct Progress {
    steps: Vec<StepReport>,
    players: Option<PlayerSummary>,
}

impl Progress {
    fn record(&mut self, sink: &mut EventSink, ev: PipelineEvent) -> Result<()> {
        let (level, msg) = render_event(&ev);
        sink.line(level, &msg)?;
        match ev {
            PipelineEvent::StepFinished { report } => self.steps.push(report),
            PipelineEvent::Players(summary) => self.players = Some(summary),
            _ => {}
        }
        Ok(())
    }
}

/// Run one update: lock, log, engine, and SIGINT/SIGTERM handling.
pub async fn run_update(cfg: RefreshConfig, echo: bool) -> Result<RunReport> {
    run_update_until(cfg, echo, shutdown_signal()).await
}

/// [`run_update`] with a caller-supplied shutdown trigger. When `shutdown`
/// resolves first the run is aborted and reported as interrupted.
pub async fn run_update_until<S>(cfg: RefreshConfig, echo: bool, shutdown: S) -> Result<RunReport>
where
    S: Future<Output = ()>,
{
    let _lock = RunLock::acquire(&cfg.lock_path)?;
    let mut sink = EventSink {
        log: RunLog::open(&cfg.log_path)?,
        echo,
    };

    let run_id = gen_run_id();
    let started_at = timestamp_now();
    tracing::info!(run_id = %run_id, log = %cfg.log_path.display(), "starting update");
    sink.line(LogLevel::Info, &format!("Starting NBA data update (run {run_id})"))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let engine = RefreshEngine::new(cfg.clone(), run_id.clone());
    let handle = tokio::spawn(async move { engine.run(event_tx).await });

    tokio::pin!(shutdown);
    let mut progress = Progress::default();

    // Events stop when the engine drops its sender, i.e. when it finishes.
    let interrupted = loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(ev) => progress.record(&mut sink, ev)?,
                None => break false,
            },
            () = &mut shutdown => break true,
        }
    };

    if interrupted {
        handle.abort();
        let _ = handle.await;
        // Events sent before the abort are still queued.
        while let Ok(ev) = event_rx.try_recv() {
            progress.record(&mut sink, ev)?;
        }
        sink.line(LogLevel::Error, "Update interrupted")?;
        return Ok(RunReport {
            run_id,
            started_at,
            finished_at: timestamp_now(),
            outcome: RunOutcome::Interrupted,
            steps: progress.steps,
            players: progress.players,
            static_path: cfg.static_path.clone(),
            log_path: cfg.log_path.clone(),
        });
    }

    let report = match handle.await.context("update task failed")? {
        Ok(r) => r,
        Err(e) => {
            sink.line(LogLevel::Error, &format!("Update failed: {e:#}"))?;
            return Err(e);
        }
    };

    match report.outcome {
        RunOutcome::Failed => {
            let failed = report
                .steps
                .iter()
                .find(|s| s.is_fatal())
                .map(|s| s.step.as_str())
                .unwrap_or("unknown");
            sink.line(
                LogLevel::Error,
                &format!("Update aborted: {failed} step failed"),
            )?;
        }
        outcome => sink.line(LogLevel::Info, &format!("Update complete ({outcome})"))?,
    }
    Ok(report)
}
