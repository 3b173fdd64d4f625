#![allow(dead_code)]

use nba_refresh::config::{ConfigLayer, RefreshConfig};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

pub fn old_mtime() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
}

/// Scratch project with `app.py` (old mtime) and optionally a source CSV.
pub fn project(csv_fixture: Option<&str>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("app.py");
    std::fs::write(&app, "print('app')\n").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&app)
        .unwrap()
        .set_modified(old_mtime())
        .unwrap();
    if let Some(name) = csv_fixture {
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::copy(
            Path::new(FIXTURES).join(name),
            dir.path().join("data/nba_stats.csv"),
        )
        .unwrap();
    }
    dir
}

pub fn config(root: &Path, layer: ConfigLayer) -> RefreshConfig {
    let base = ConfigLayer {
        reload_grace: Some(Duration::ZERO),
        verify: Some(false),
        ..Default::default()
    };
    let cfg = RefreshConfig::resolve(root, base.merge(layer));
    cfg.validate().unwrap();
    cfg
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

pub fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

pub fn is_timestamped(line: &str) -> bool {
    let b = line.as_bytes();
    b.len() > 22
        && b[..19].iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            10 => *c == b' ',
            13 | 16 => *c == b':',
            _ => c.is_ascii_digit(),
        })
        && &line[19..22] == " - "
}

/// Serves `body` with `status` to every request until the test ends.
pub async fn serve(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// Wait until the run log has a line containing `needle`.
pub async fn wait_for_log(path: &Path, needle: &str) {
    for _ in 0..500 {
        if std::fs::read_to_string(path).is_ok_and(|t| t.contains(needle)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{needle:?} never appeared in {}", path.display());
}

/// A shell updater that sleeps, then would write `finished` next to itself.
pub fn slow_updater(dir: &Path) -> Vec<String> {
    let script = dir.join("slow_updater.sh");
    std::fs::write(
        &script,
        "sleep 2\ntouch \"$(dirname \"$0\")/finished\"\n",
    )
    .unwrap();
    vec!["sh".to_string(), script.display().to_string()]
}

