#![cfg(unix)]
//! Signal listeners are process-wide, so this lives in its own test binary.

mod common;

use common::{config, log_lines, project, slow_updater, wait_for_log};
use nba_refresh::config::ConfigLayer;
use nba_refresh::model::RunOutcome;
use nba_refresh::orchestrator::run_update;

#[tokio::test(flavor = "multi_thread")]
async fn sigterm_interrupts_and_releases_lock() {
    let dir = project(Some("nba_stats.csv"));
    let cfg = config(
        dir.path(),
        ConfigLayer {
            updater_command: Some(slow_updater(dir.path())),
            ..Default::default()
        },
    );

    let run = tokio::spawn(run_update(cfg.clone(), false));
    wait_for_log(&cfg.log_path, "Running ").await;
    assert!(cfg.lock_path.exists());

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.outcome.exit_code(), 130);
    assert!(!cfg.lock_path.exists());
    assert!(log_lines(&cfg.log_path)
        .last()
        .unwrap()
        .ends_with("ERROR: Update interrupted"));
}
