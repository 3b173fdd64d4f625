use crate::config::{RefreshConfig, StaticFormat};
use crate::engine::command;
use crate::error::StepError;
use crate::metrics::summarize_players;
use crate::model::{InfoEvent, PipelineEvent, PlayerSummary};
use crate::players::{self, PlayerTable};
use crate::storage::{timestamp_now, TempFile};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const TOP_PLAYERS: usize = 5;

/// Regenerate the static artifact in-process.
pub(crate) async fn regenerate_builtin(
    cfg: &RefreshConfig,
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> Result<PlayerSummary, StepError> {
    let raw = tokio::fs::read_to_string(&cfg.csv_path)
        .await
        .map_err(|e| StepError::io(format!("read {}", cfg.csv_path.display()), e))?;
    let table = PlayerTable::from_csv(&raw).ok_or_else(|| StepError::Csv {
        path: cfg.csv_path.clone(),
        reason: "empty or no header row".into(),
    })?;
    table.validate_columns()?;
    if table.len() < cfg.min_players {
        return Err(StepError::TooFewPlayers {
            found: table.len(),
            min: cfg.min_players,
        });
    }
    let _ = event_tx.send(PipelineEvent::Info(InfoEvent::PlayersParsed {
        count: table.len(),
    }));

    let generated_at = timestamp_now();
    let parsed = table.players();
    let contents = match cfg.static_format {
        StaticFormat::Table => players::render_table(&table, &generated_at),
        StaticFormat::Json => players::render_json(&parsed, &generated_at)
            .map_err(|e| StepError::io("serialize static data", e.into()))?,
    };

    write_replacing(&cfg.static_path, contents.as_bytes()).await?;
    let _ = event_tx.send(PipelineEvent::Info(InfoEvent::StaticWritten {
        path: cfg.static_path.clone(),
        players: table.len(),
    }));

    Ok(summarize_players(&parsed, TOP_PLAYERS))
}

/// Hand regeneration to an external updater: `<argv...> <csv> --output <static>`.
pub(crate) async fn regenerate_external(
    cfg: &RefreshConfig,
    argv: &[String],
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> Result<(), StepError> {
    let mut full = argv.to_vec();
    full.push(cfg.csv_path.display().to_string());
    full.push("--output".into());
    full.push(cfg.static_path.display().to_string());

    let _ = event_tx.send(PipelineEvent::Info(InfoEvent::Message(format!(
        "Running {}",
        command::describe(&full)
    ))));
    let out = command::checked_output(&full, &cfg.project_root).await?;
    let last = command::tail(&out.stdout);
    if !last.is_empty() {
        let _ = event_tx.send(PipelineEvent::Info(InfoEvent::Message(last)));
    }
    Ok(())
}

/// Temp file + rename; an aborted write leaves the old artifact in place.
async fn write_replacing(path: &std::path::Path, contents: &[u8]) -> Result<(), StepError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StepError::io(format!("create {}", dir.display()), e))?;
    }
    let tmp = TempFile::for_target(path);
    let mut file = tokio::fs::File::create(tmp.path())
        .await
        .map_err(|e| StepError::io(format!("create {}", tmp.path().display()), e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StepError::io(format!("write {}", tmp.path().display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| StepError::io(format!("sync {}", tmp.path().display()), e))?;
    drop(file);
    tmp.persist()
        .map_err(|e| StepError::io(format!("replace {}", path.display()), e))
}
