//! On-disk state: the append-only run log, the run lock, atomic artifact writes,
//! and saved run history.

use crate::model::RunReport;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const HISTORY_DIR: &str = "nba-refresh";
const HISTORY_ENV: &str = "NBA_REFRESH_HISTORY_DIR";

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Capture the local UTC offset. Must run before any other thread is spawned;
/// `time` refuses to read it from a multi-threaded process.
pub fn init_local_offset() {
    let _ = LOCAL_OFFSET.set(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`, falling back to UTC when the
/// local offset is unknown.
pub fn timestamp_now() -> String {
    let offset = LOCAL_OFFSET
        .get()
        .copied()
        .or_else(|| UtcOffset::current_local_offset().ok())
        .unwrap_or(UtcOffset::UTC);
    format_timestamp(OffsetDateTime::now_utc().to_offset(offset))
}

pub fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| "0000-00-00 00:00:00".into())
}

/// Append-only, timestamped run log.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line. Embedded newlines are flattened so every line keeps its timestamp.
    pub fn append(&mut self, message: &str) -> Result<()> {
        let flat = message.replace(['\r', '\n'], " ");
        writeln!(self.file, "{} - {}", timestamp_now(), flat)
            .with_context(|| format!("append to {}", self.path.display()))?;
        self.file.flush().ok();
        Ok(())
    }
}

/// Exclusive lock for one update run. The lock file holds the owner's pid and
/// is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock. A lock left behind by a process that no longer exists
    /// is taken over; a live holder is an error.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).ok();
        }
        match Self::create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                let holder = holder.trim();
                if let Some(pid) = holder.parse::<u32>().ok().filter(|pid| !pid_alive(*pid)) {
                    tracing::warn!(
                        pid,
                        lock = %path.display(),
                        "removing stale lock left by a dead process"
                    );
                    fs::remove_file(path)
                        .with_context(|| format!("remove stale lock {}", path.display()))?;
                    return Self::create(path)
                        .with_context(|| format!("take over lock {}", path.display()));
                }
                Err(anyhow::anyhow!(
                    "another update is running (lock {} held by pid {})",
                    path.display(),
                    holder
                ))
            }
            Err(e) => Err(e).with_context(|| format!("create lock file {}", path.display())),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
        let lock = Self {
            path: path.to_path_buf(),
        };
        writeln!(f, "{}", std::process::id())?;
        Ok(lock)
    }
}

/// Whether a process with this pid exists.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Without procfs every holder counts as alive, so locks are never taken over.
#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    true
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Temp file that is removed on drop unless persisted.
pub struct TempFile {
    tmp: PathBuf,
    target: PathBuf,
    persisted: bool,
}

impl TempFile {
    pub fn for_target(target: &Path) -> Self {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "artifact".into());
        name.push(".tmp");
        Self {
            tmp: target.with_file_name(name),
            target: target.to_path_buf(),
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.tmp
    }

    /// Rename the temp file over the target.
    pub fn persist(mut self) -> std::io::Result<()> {
        fs::rename(&self.tmp, &self.target)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Write via temp file + rename so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = TempFile::for_target(path);
    fs::write(tmp.path(), contents)?;
    tmp.persist()
}

fn history_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HISTORY_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let base = dirs::data_local_dir().context("no local data directory available")?;
    Ok(base.join(HISTORY_DIR).join("runs"))
}

fn history_file_name(report: &RunReport) -> String {
    format!(
        "run-{}-{}.json",
        report.started_at.replace([' ', ':'], "-"),
        &report.run_id[..8.min(report.run_id.len())]
    )
}

/// Save a run report into the history directory.
pub fn save_run(report: &RunReport) -> Result<PathBuf> {
    save_run_in(&history_dir()?, report)
}

pub fn save_run_in(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(history_file_name(report));
    let json = serde_json::to_vec_pretty(report)?;
    write_atomic(&path, &json).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Newest saved runs first.
pub fn load_recent(limit: usize) -> Result<Vec<RunReport>> {
    load_recent_in(&history_dir()?, limit)
}

pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<RunReport>> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(Vec::new());
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "json"))
        .collect();
    // File names embed the start timestamp, so name order is time order.
    files.sort();
    files.reverse();

    let mut out = Vec::new();
    for p in files.into_iter().take(limit) {
        let raw = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        match serde_json::from_str::<RunReport>(&raw) {
            Ok(r) => out.push(r),
            Err(e) => tracing::warn!(path = %p.display(), error = %e, "skipping unreadable run report"),
        }
    }
    Ok(out)
}

pub fn export_json(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    write_atomic(path, &json).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunOutcome;

    fn report(started_at: &str, id: &str) -> RunReport {
        RunReport {
            run_id: id.into(),
            started_at: started_at.into(),
            finished_at: started_at.into(),
            outcome: RunOutcome::Succeeded,
            steps: Vec::new(),
            players: None,
            static_path: "nba_static_data.tsv".into(),
            log_path: "logs/nba_update.log".into(),
        }
    }

    fn is_timestamped(line: &str) -> bool {
        let b = line.as_bytes();
        line.len() >= 19
            && b[4] == b'-'
            && b[7] == b'-'
            && b[10] == b' '
            && b[13] == b':'
            && b[16] == b':'
            && line[..19]
                .chars()
                .enumerate()
                .all(|(i, c)| matches!(i, 4 | 7 | 10 | 13 | 16) || c.is_ascii_digit())
    }

    #[test]
    fn log_lines_carry_timestamps_and_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("update.log");
        {
            let mut log = RunLog::open(&path).unwrap();
            log.append("first").unwrap();
            log.append("second\nline").unwrap();
        }
        let mut log = RunLog::open(&path).unwrap();
        log.append("third").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| is_timestamped(l)));
        assert!(lines[1].ends_with(" - second line"));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.lock");
        let lock = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("another update is running"));
        drop(lock);
        assert!(!path.exists());
        RunLock::acquire(&path).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lock_of_dead_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.lock");
        // Above the kernel's pid limit, so never a live process.
        fs::write(&path, "4194304\n").unwrap();

        let lock = RunLock::acquire(&path).unwrap();
        let owner = fs::read_to_string(&path).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn lock_of_live_or_unknown_holder_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.lock");

        fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("another update is running"), "{err}");

        fs::write(&path, "").unwrap();
        assert!(RunLock::acquire(&path).is_err());
        assert!(path.exists());
    }

    #[test]
    fn dropped_temp_file_leaves_target_intact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("static.tsv");
        fs::write(&target, "old").unwrap();
        {
            let tmp = TempFile::for_target(&target);
            fs::write(tmp.path(), "half").unwrap();
        }
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert!(!dir.path().join("static.tsv.tmp").exists());

        write_atomic(&target, b"new").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn history_round_trips_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        save_run_in(dir.path(), &report("2026-01-01 10:00:00", "aaaaaaaaaa")).unwrap();
        save_run_in(dir.path(), &report("2026-01-02 10:00:00", "bbbbbbbbbb")).unwrap();
        fs::write(dir.path().join("garbage.json"), "{").unwrap();

        let runs = load_recent_in(dir.path(), 1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "bbbbbbbbbb");

        // The unreadable file is skipped, not fatal.
        let runs = load_recent_in(dir.path(), 10).unwrap();
        let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["bbbbbbbbbb", "aaaaaaaaaa"]);
    }

    #[test]
    fn missing_history_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runs = load_recent_in(&dir.path().join("nope"), 5).unwrap();
        assert!(runs.is_empty());
    }
}
