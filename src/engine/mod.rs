pub mod command;
mod download;
mod regenerate;
mod reload;
pub mod verify;

use crate::config::RefreshConfig;
use crate::error::StepError;
use crate::model::{
    InfoEvent, PipelineEvent, PlayerSummary, RunOutcome, RunReport, StepKind, StepReport,
    StepStatus,
};
use crate::storage::timestamp_now;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;

/// Successful step result.
enum StepOutput {
    Done(String),
    Skipped(String),
}

pub struct RefreshEngine {
    cfg: RefreshConfig,
    run_id: String,
}

impl RefreshEngine {
    pub fn new(cfg: RefreshConfig, run_id: String) -> Self {
        Self { cfg, run_id }
    }

    async fn run_step<F>(
        &self,
        step: StepKind,
        event_tx: &mpsc::UnboundedSender<PipelineEvent>,
        fut: F,
    ) -> StepReport
    where
        F: Future<Output = Result<StepOutput, StepError>>,
    {
        let _ = event_tx.send(PipelineEvent::StepStarted { step });
        let start = Instant::now();
        let (status, message) = match fut.await {
            Ok(StepOutput::Done(msg)) => (StepStatus::Succeeded, msg),
            Ok(StepOutput::Skipped(msg)) => (StepStatus::Skipped, msg),
            Err(e) => (StepStatus::Failed, e.to_string()),
        };
        let report = StepReport {
            step,
            status,
            policy: self.cfg.policy(step),
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        let _ = event_tx.send(PipelineEvent::StepFinished {
            report: report.clone(),
        });
        report
    }

    fn skip(
        &self,
        step: StepKind,
        reason: &str,
        event_tx: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> StepReport {
        let report = StepReport {
            step,
            status: StepStatus::Skipped,
            policy: self.cfg.policy(step),
            message: reason.to_string(),
            duration_ms: 0,
        };
        let _ = event_tx.send(PipelineEvent::StepFinished {
            report: report.clone(),
        });
        report
    }

    /// Run download, regenerate, reload and verify once.
    ///
    /// A failed critical step stops the run; later steps are not attempted
    /// and do not appear in the report.
    pub async fn run(self, event_tx: mpsc::UnboundedSender<PipelineEvent>) -> Result<RunReport> {
        let cfg = &self.cfg;
        let started_at = timestamp_now();
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("failed to build http client")?;

        let mut steps = Vec::new();
        let mut players: Option<PlayerSummary> = None;

        let finish = |steps: Vec<StepReport>, players: Option<PlayerSummary>| RunReport {
            run_id: self.run_id.clone(),
            started_at: started_at.clone(),
            finished_at: timestamp_now(),
            outcome: RunOutcome::from_steps(&steps),
            steps,
            players,
            static_path: cfg.static_path.clone(),
            log_path: cfg.log_path.clone(),
        };

        let download = self
            .run_step(StepKind::Download, &event_tx, async {
                let Some(url) = cfg.data_url.as_deref() else {
                    return Ok(StepOutput::Skipped("no data URL configured".into()));
                };
                let bytes =
                    download::fetch_csv(&client, url, &cfg.csv_path, cfg.download_timeout).await?;
                let _ = event_tx.send(PipelineEvent::Info(InfoEvent::Downloaded {
                    bytes,
                    path: cfg.csv_path.clone(),
                }));
                Ok(StepOutput::Done(format!("downloaded {bytes} bytes")))
            })
            .await;
        let fatal = download.is_fatal();
        steps.push(download);
        if fatal {
            return Ok(finish(steps, players));
        }

        let mut reloaded = false;
        if !cfg.csv_path.is_file() {
            let _ = event_tx.send(PipelineEvent::Warning(format!(
                "Source CSV not found at {}; keeping existing static data",
                cfg.csv_path.display()
            )));
            steps.push(self.skip(StepKind::Regenerate, "source CSV not found", &event_tx));
            steps.push(self.skip(StepKind::Reload, "static data unchanged", &event_tx));
        } else {
            let regen = self
                .run_step(StepKind::Regenerate, &event_tx, async {
                    match cfg.updater_command.as_deref() {
                        Some(argv) => {
                            regenerate::regenerate_external(cfg, argv, &event_tx).await?;
                            Ok(StepOutput::Done(format!(
                                "external updater wrote {}",
                                cfg.static_path.display()
                            )))
                        }
                        None => {
                            let summary = regenerate::regenerate_builtin(cfg, &event_tx).await?;
                            let _ = event_tx.send(PipelineEvent::Players(summary.clone()));
                            let msg = format!(
                                "wrote {} players to {}",
                                summary.count,
                                cfg.static_path.display()
                            );
                            players = Some(summary);
                            Ok(StepOutput::Done(msg))
                        }
                    }
                })
                .await;
            let regen_ok = regen.status == StepStatus::Succeeded;
            let fatal = regen.is_fatal();
            steps.push(regen);
            if fatal {
                return Ok(finish(steps, players));
            }

            if regen_ok {
                let reload = self
                    .run_step(StepKind::Reload, &event_tx, async {
                        reload::touch(&cfg.app_entry)?;
                        Ok(StepOutput::Done(format!("touched {}", cfg.app_entry.display())))
                    })
                    .await;
                reloaded = reload.status == StepStatus::Succeeded;
                let fatal = reload.is_fatal();
                steps.push(reload);
                if fatal {
                    return Ok(finish(steps, players));
                }
            } else {
                steps.push(self.skip(StepKind::Reload, "static data unchanged", &event_tx));
            }
        }

        if !cfg.verify {
            steps.push(self.skip(StepKind::Verify, "verification disabled", &event_tx));
            return Ok(finish(steps, players));
        }

        if reloaded && !cfg.reload_grace.is_zero() {
            let _ = event_tx.send(PipelineEvent::Info(InfoEvent::WaitingForReload {
                secs: cfg.reload_grace.as_secs_f64(),
            }));
            tokio::time::sleep(cfg.reload_grace).await;
        }

        let verify = self
            .run_step(StepKind::Verify, &event_tx, async {
                let n = verify::check_endpoints(
                    &client,
                    &cfg.base_url,
                    &cfg.endpoints,
                    cfg.smoke_timeout,
                    &event_tx,
                )
                .await?;
                Ok(StepOutput::Done(format!("{n} endpoint(s) OK")))
            })
            .await;
        steps.push(verify);

        Ok(finish(steps, players))
    }
}
