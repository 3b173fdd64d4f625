use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Download,
    Regenerate,
    Reload,
    Verify,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::Download,
        StepKind::Regenerate,
        StepKind::Reload,
        StepKind::Verify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Download => "download",
            StepKind::Regenerate => "regenerate",
            StepKind::Reload => "reload",
            StepKind::Verify => "verify",
        }
    }

    /// Human label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            StepKind::Download => "Downloading CSV snapshot",
            StepKind::Regenerate => "Regenerating static data",
            StepKind::Reload => "Triggering app reload",
            StepKind::Verify => "Testing endpoints",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failing step aborts the run or only degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPolicy {
    Critical,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicies {
    pub download: StepPolicy,
    pub regenerate: StepPolicy,
    pub reload: StepPolicy,
    pub verify: StepPolicy,
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            download: StepPolicy::Optional,
            regenerate: StepPolicy::Critical,
            reload: StepPolicy::Critical,
            verify: StepPolicy::Critical,
        }
    }
}

impl StepPolicies {
    pub fn get(&self, step: StepKind) -> StepPolicy {
        match step {
            StepKind::Download => self.download,
            StepKind::Regenerate => self.regenerate,
            StepKind::Reload => self.reload,
            StepKind::Verify => self.verify,
        }
    }

    pub fn set(&mut self, step: StepKind, policy: StepPolicy) {
        match step {
            StepKind::Download => self.download = policy,
            StepKind::Regenerate => self.regenerate = policy,
            StepKind::Reload => self.reload = policy,
            StepKind::Verify => self.verify = policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: StepKind,
    pub status: StepStatus,
    pub policy: StepPolicy,
    pub message: String,
    pub duration_ms: u64,
}

impl StepReport {
    /// A failed critical step ends the run.
    pub fn is_fatal(&self) -> bool {
        self.status == StepStatus::Failed && self.policy == StepPolicy::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    /// An optional step failed; the run continued.
    Degraded,
    Failed,
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Succeeded | RunOutcome::Degraded => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Interrupted => 130,
        }
    }

    /// Outcome implied by a finished set of step reports.
    pub fn from_steps(steps: &[StepReport]) -> Self {
        if steps.iter().any(StepReport::is_fatal) {
            RunOutcome::Failed
        } else if steps.iter().any(|s| s.status == StepStatus::Failed) {
            RunOutcome::Degraded
        } else {
            RunOutcome::Succeeded
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Degraded => "degraded",
            RunOutcome::Failed => "failed",
            RunOutcome::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Top player entry kept in run reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlayer {
    pub name: String,
    pub team: String,
    pub fantasy_points: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub count: usize,
    pub fantasy_mean: Option<f64>,
    pub fantasy_median: Option<f64>,
    pub fantasy_p25: Option<f64>,
    pub fantasy_p75: Option<f64>,
    pub top: Vec<RankedPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: String,
    pub outcome: RunOutcome,
    pub steps: Vec<StepReport>,
    #[serde(default)]
    pub players: Option<PlayerSummary>,
    pub static_path: PathBuf,
    pub log_path: PathBuf,
}

impl RunReport {
    pub fn step(&self, kind: StepKind) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Events emitted by the engine and consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StepStarted { step: StepKind },
    StepFinished { report: StepReport },
    Info(InfoEvent),
    Warning(String),
    /// Player summary from a built-in regeneration.
    Players(PlayerSummary),
}

/// Structured info events; rendered to text for the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Downloaded { bytes: u64, path: PathBuf },
    PlayersParsed { count: usize },
    StaticWritten { path: PathBuf, players: usize },
    EndpointChecked {
        url: String,
        status: u16,
        players: Option<usize>,
        sample: Option<String>,
    },
    WaitingForReload { secs: f64 },
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Downloaded { bytes, path } => {
                format!("Downloaded {} bytes to {}", bytes, path.display())
            }
            InfoEvent::PlayersParsed { count } => format!("Read {} players from CSV", count),
            InfoEvent::StaticWritten { path, players } => {
                format!("Updated {} with {} players", path.display(), players)
            }
            InfoEvent::EndpointChecked {
                url,
                status,
                players,
                sample,
            } => {
                let mut msg = format!("{} -> HTTP {}", url, status);
                if let Some(n) = players {
                    msg.push_str(&format!(", {} players", n));
                }
                if let Some(s) = sample {
                    msg.push_str(&format!(", sample: {}", s));
                }
                msg
            }
            InfoEvent::WaitingForReload { secs } => {
                format!("Waiting {:.1}s for the app to reload", secs)
            }
        }
    }
}
