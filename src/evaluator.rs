use crate::config::ClassifierConfig;
use crate::entropy::EntropyState;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// The classifier only sees this many leading characters of each
/// fingerprint, never the full hash.
const HASH_PREVIEW_CHARS: usize = 16;

const SYSTEM_PROMPT: &str = "You are an entropy sync evaluator. Your job is to determine \
whether two devices are in sync based on their entropy profiles.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Green,
    Yellow,
    Grey,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub sync_status: SyncStatus,
    pub recommendation: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// The inner payload is deserialized with sync_status as a plain string so
// an out-of-vocabulary value degrades to ERROR instead of passing through.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    sync_status: String,
    recommendation: String,
}

#[derive(Debug, Error)]
enum EvaluateError {
    #[error("classifier transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier response has no choices")]
    EmptyChoices,
    #[error("classifier content is not valid JSON: {0}")]
    InnerJson(serde_json::Error),
    #[error("classifier returned unrecognized sync_status '{0}'")]
    UnknownStatus(String),
}

/// Asks the classifier endpoint to judge the two fingerprints. Never
/// fails: every transport or schema problem degrades to an ERROR result.
pub async fn evaluate(
    client: &Client,
    cfg: &ClassifierConfig,
    credential: &str,
    local: &EntropyState,
    remote: &EntropyState,
) -> SyncResult {
    match query_classifier(client, cfg, credential, local, remote).await {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, endpoint = %cfg.endpoint_url, "classifier call failed");
            SyncResult {
                sync_status: SyncStatus::Error,
                recommendation: err.to_string(),
            }
        }
    }
}

async fn query_classifier(
    client: &Client,
    cfg: &ClassifierConfig,
    credential: &str,
    local: &EntropyState,
    remote: &EntropyState,
) -> Result<SyncResult, EvaluateError> {
    let request = ChatRequest {
        model: &cfg.model,
        temperature: 0.0,
        messages: build_messages(local, remote),
    };

    let response = client
        .post(&cfg.endpoint_url)
        .bearer_auth(credential)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .json(&request)
        .send()
        .await?
        .error_for_status()?;

    let body: ChatResponse = response.json().await?;
    let content = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(EvaluateError::EmptyChoices)?;

    parse_verdict(&content)
}

fn parse_verdict(content: &str) -> Result<SyncResult, EvaluateError> {
    let verdict: RawVerdict =
        serde_json::from_str(strip_code_fence(content)).map_err(EvaluateError::InnerJson)?;
    let sync_status = match verdict.sync_status.as_str() {
        "GREEN" => SyncStatus::Green,
        "YELLOW" => SyncStatus::Yellow,
        "GREY" => SyncStatus::Grey,
        other => return Err(EvaluateError::UnknownStatus(other.to_string())),
    };
    Ok(SyncResult {
        sync_status,
        recommendation: verdict.recommendation,
    })
}

// Models sometimes wrap the JSON verdict in a markdown fence despite being
// told not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn build_messages(local: &EntropyState, remote: &EntropyState) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: format!(
                "Two devices have provided the following entropy states.\n\n\
                 Device A:\n{}\n\
                 Device B:\n{}\n\
                 Based on the closeness of these values, determine the sync level:\n\n\
                 - GREEN: Perfect sync\n\
                 - YELLOW: Acceptable drift, no key rotation needed yet\n\
                 - GREY: Desync detected, rotate provisioning keys now\n\n\
                 Reply in JSON format:\n\
                 {{\n  \"sync_status\": \"GREEN\" | \"YELLOW\" | \"GREY\",\n  \"recommendation\": \"text...\"\n}}",
                describe_device(local),
                describe_device(remote),
            ),
        },
    ]
}

fn describe_device(state: &EntropyState) -> String {
    format!(
        "- CPU: {}%\n- RAM: {}%\n- Disk: {}%\n- Net I/O: {}\n- Color Index: {}\n- Entropy Hash: {}...\n",
        state.cpu_percent,
        state.mem_percent,
        state.disk_percent,
        state.net_bytes,
        state.color_index,
        hash_preview(&state.entropy_hash),
    )
}

fn hash_preview(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(HASH_PREVIEW_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(hash.len());
    &hash[..end]
}
