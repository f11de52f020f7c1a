//! OpenAI-compatible HTTP client
//!
//! Works against OpenAI, Ollama, LM Studio and other compatible endpoints.
//! Transport errors are retried with jittered backoff; whatever still fails
//! is logged and surfaced to callers as `None` per the boundary contract.

use anyhow::{bail, Context, Result};
use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::warn;

use super::types::{
    ContainerPlan, ContainerRequest, MainActionDecision, MainActionRequest, PlanDraft,
    PlanRequest, TaskAssessmentRequest,
};
use super::LlmClient;
use crate::config::LlmConfig;

const MAIN_ACTION_PROMPT: &str = "You control an agent in a voxel world. \
Given the world summary, choose exactly one action that advances the current \
task. Known actions: collect, mine, craft, move_to, attack, open_container, \
deposit, withdraw, smelt, explore, idle. Respond with JSON only: \
{\"thinking\": \"...\", \"action\": {\"name\": \"...\", \"params\": {...}}}";

const PLAN_PROMPT: &str = "You plan for an agent in a voxel world. Break the \
goal into small verifiable tasks. Each task needs a tracker that detects \
completion from the world state. Tracker types: \
{\"type\": \"inventory\", \"item\": \"...\", \"count\": N}, \
{\"type\": \"location\", \"x\": X, \"y\": Y, \"z\": Z, \"radius\": R}, \
{\"type\": \"craft\", \"item\": \"...\", \"count\": N}, \
{\"type\": \"composite\", \"op\": \"all\"|\"any\", \"trackers\": [...]}. \
A task may list dependencies by task index. Respond with JSON only: \
{\"title\": \"...\", \"description\": \"...\", \"tasks\": [{\"title\": \"...\", \
\"description\": \"...\", \"tracker\": {...}, \"dependencies\": [...]}]}";

const CHEST_PROMPT: &str = "You operate an open chest for an agent in a voxel \
world. Decide which items to deposit or withdraw for the stated purpose. \
Respond with JSON only: {\"operations\": [{\"action\": \"deposit\"|\"withdraw\", \
\"params\": {\"item\": \"...\", \"count\": N}}]}";

const FURNACE_PROMPT: &str = "You operate an open furnace for an agent in a \
voxel world. Decide what to smelt for the stated purpose. Respond with JSON \
only: {\"operations\": [{\"action\": \"smelt\", \"params\": {\"input\": \"...\", \
\"output\": \"...\", \"count\": N}}]}";

const ASSESS_PROMPT: &str = "You review an agent's progress on a task in a \
voxel world. In two sentences or fewer, judge whether the approach is working \
and suggest a correction if it is not. Respond with plain text.";

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Pull the outermost JSON object out of a completion, tolerating code fences
/// and prose around it
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// [`LlmClient`] over an OpenAI-compatible chat-completions endpoint
pub struct HttpLlmClient {
    config: LlmConfig,
    http_client: HttpClient,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .user_agent("voxbot/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        let api_key = config.resolve_api_key();

        Ok(Self {
            config,
            http_client,
            api_key,
        })
    }

    /// Helper with jittered backoff retry, respecting Retry-After headers
    async fn retry_with_backoff<F, Fut>(&self, operation: F) -> Result<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        let max_retries = self.config.max_retries;
        let mut delay = Duration::from_secs(2);

        loop {
            match operation().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        bail!("authentication failed, check the api key");
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt >= max_retries {
                        bail!("llm endpoint returned {}", status);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        // Prefer the server's Retry-After over our own schedule
                        if let Some(after) = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                        {
                            delay = Duration::from_secs(after);
                        }
                    }
                    warn!(status = %status, attempt, "llm endpoint error, retrying");
                }
                Err(e) => {
                    if attempt >= max_retries {
                        return Err(e.into());
                    }
                    warn!(error = %e, attempt, "llm request failed, retrying");
                }
            }

            sleep(delay).await;
            attempt += 1;

            // Jitter: +/- 500ms
            let jitter_ms = rand::thread_rng().gen_range(-500..=500);
            let delay_ms = (delay.as_millis() as i64 * 2 + jitter_ms).max(100) as u64;
            delay = Duration::from_millis(delay_ms);
        }
    }

    /// One chat completion; returns the raw assistant text
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatBody {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .retry_with_backoff(|| async {
                let mut request = self.http_client.post(&url).json(&body);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request.send().await
            })
            .await
            .context("llm request failed")?;

        let text = response
            .text()
            .await
            .context("failed to read llm response body")?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).context("failed to parse llm response body")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("llm response had no content"))
    }

    /// Run one structured request; all failure paths collapse to `None`
    async fn complete_json<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        system: &str,
        payload: &impl Serialize,
    ) -> Option<T> {
        let user = match serde_json::to_string_pretty(payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(request = what, error = %e, "failed to serialize llm payload");
                return None;
            }
        };
        let text = match self.chat(system, &user).await {
            Ok(t) => t,
            Err(e) => {
                warn!(request = what, error = %e, "llm request gave no answer");
                return None;
            }
        };
        let json = match extract_json(&text) {
            Some(j) => j,
            None => {
                warn!(request = what, "llm response contained no json");
                return None;
            }
        };
        match serde_json::from_str(json) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(request = what, error = %e, "llm response failed to parse");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn request_main_action(&self, req: &MainActionRequest) -> Option<MainActionDecision> {
        self.complete_json("main_action", MAIN_ACTION_PROMPT, req)
            .await
    }

    async fn request_plan(&self, req: &PlanRequest) -> Option<PlanDraft> {
        self.complete_json("plan", PLAN_PROMPT, req).await
    }

    async fn request_chest_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan> {
        self.complete_json("chest_operations", CHEST_PROMPT, req)
            .await
    }

    async fn request_furnace_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan> {
        self.complete_json("furnace_operations", FURNACE_PROMPT, req)
            .await
    }

    async fn assess_task_progress(&self, req: &TaskAssessmentRequest) -> Option<String> {
        let user = serde_json::to_string_pretty(req).ok()?;
        match self.chat(ASSESS_PROMPT, &user).await {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                warn!(request = "assess_task_progress", error = %e, "llm request gave no answer");
                None
            }
        }
    }
}
