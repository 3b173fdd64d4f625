use crate::error::StepError;
use crate::model::{InfoEvent, PipelineEvent};
use futures::{stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

const MAX_PARALLEL_CHECKS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCheck {
    pub url: String,
    pub status: u16,
    pub players: Option<usize>,
    pub sample: Option<String>,
}

/// Judge one endpoint response. Requires HTTP 200 and a JSON body; a
/// `players` array, when present, must not be empty.
pub fn evaluate_response(url: &str, status: u16, body: &str) -> Result<EndpointCheck, StepError> {
    let fail = |reason: String| StepError::Smoke {
        url: url.to_string(),
        reason,
    };
    if status != 200 {
        return Err(fail(format!("HTTP {status}")));
    }
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| fail(format!("invalid JSON: {e}")))?;

    let players = json.get("players").and_then(|p| p.as_array());
    if players.is_some_and(|p| p.is_empty()) {
        return Err(fail("endpoint served no players".into()));
    }
    let sample = players.and_then(|p| p.first()).map(|p| {
        let field = |k: &str| p.get(k).and_then(|v| v.as_str()).unwrap_or("?").to_string();
        format!("{} ({})", field("name"), field("team"))
    });

    Ok(EndpointCheck {
        url: url.to_string(),
        status,
        players: players.map(Vec::len),
        sample,
    })
}

async fn check_one(
    client: &reqwest::Client,
    url: String,
    timeout: Duration,
) -> Result<EndpointCheck, StepError> {
    let resp = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| StepError::Smoke {
            url: url.clone(),
            reason: format!("request failed: {e}"),
        })?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| StepError::Smoke {
        url: url.clone(),
        reason: format!("failed reading body: {e}"),
    })?;
    evaluate_response(&url, status, &body)
}

/// Check every endpoint; all are attempted even if one fails.
pub(crate) async fn check_endpoints(
    client: &reqwest::Client,
    base_url: &str,
    endpoints: &[String],
    timeout: Duration,
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> Result<usize, StepError> {
    let urls: Vec<String> = endpoints.iter().map(|e| format!("{base_url}{e}")).collect();
    let results: Vec<_> = stream::iter(urls)
        .map(|url| check_one(client, url, timeout))
        .buffer_unordered(MAX_PARALLEL_CHECKS)
        .collect()
        .await;

    let mut first_err = None;
    let mut ok = 0;
    for res in results {
        match res {
            Ok(check) => {
                ok += 1;
                let _ = event_tx.send(PipelineEvent::Info(InfoEvent::EndpointChecked {
                    url: check.url,
                    status: check.status,
                    players: check.players,
                    sample: check.sample,
                }));
            }
            Err(e) => {
                let _ = event_tx.send(PipelineEvent::Warning(e.to_string()));
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(ok),
    }
}
