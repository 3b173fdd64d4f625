use crate::error::StepError;
use crate::storage::TempFile;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Stream `url` into `dest`. The previous file is replaced only after the
/// whole body has been written.
pub(crate) async fn fetch_csv(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, StepError> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| StepError::Download(format!("{url}: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(StepError::Download(format!("{url}: HTTP {status}")));
    }

    if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StepError::io(format!("create {}", dir.display()), e))?;
    }

    let tmp = TempFile::for_target(dest);
    let mut file = tokio::fs::File::create(tmp.path())
        .await
        .map_err(|e| StepError::io(format!("create {}", tmp.path().display()), e))?;

    let mut written = 0u64;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StepError::Download(format!("{url}: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| StepError::io(format!("write {}", tmp.path().display()), e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| StepError::io(format!("flush {}", tmp.path().display()), e))?;
    drop(file);

    if written == 0 {
        return Err(StepError::Download(format!("{url}: empty response body")));
    }
    tmp.persist()
        .map_err(|e| StepError::io(format!("replace {}", dest.display()), e))?;
    Ok(written)
}
