use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{parse_reply, Classifier, SYSTEM_PROMPT};
use crate::clock::with_timeout;
use crate::types::ClassificationOutcome;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client. One request per `classify` call, no retries.
pub struct OpenAiClassifier {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiClassifier {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from Cloudflare Worker environment
    #[cfg(target_arch = "wasm32")]
    pub fn from_worker_env(env: &worker::Env) -> Self {
        let api_key = env.secret("OPENAI_API_KEY").ok().map(|v| v.to_string());
        let mut classifier = Self::new(api_key);
        if let Ok(v) = env.var("OPENAI_BASE_URL") {
            classifier = classifier.with_base_url(v.to_string());
        }
        if let Ok(v) = env.var("OPENAI_MODEL") {
            classifier = classifier.with_model(v.to_string());
        }
        if let Some(secs) = env
            .var("CLASSIFY_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.to_string().parse::<u64>().ok())
        {
            classifier = classifier.with_timeout(Duration::from_secs(secs));
        }
        classifier
    }

    async fn request(&self, api_key: &str, text: &str) -> Result<String, String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let resp_body = response
                .text()
                .await
                .unwrap_or_else(|_| "(failed to read body)".to_string());
            warn!(status, response_body = %resp_body, "classifier returned error status");
            return Err(format!("HTTP {} from classifier", status));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "response contained no message content".to_string())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, text: &str) -> ClassificationOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ClassificationOutcome::transport("classifier API key not configured");
        };

        match with_timeout(self.timeout, self.request(api_key, text)).await {
            Some(Ok(reply)) => {
                debug!(reply_len = reply.len(), "classifier replied");
                parse_reply(&reply)
            }
            Some(Err(e)) => {
                warn!(error = %e, "classification request failed");
                ClassificationOutcome::transport(e)
            }
            None => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "classification timed out");
                ClassificationOutcome::transport("classification timed out")
            }
        }
    }
}
