//! Plain HTTP transport for OpenAI-compatible gateways that the official client
//! does not talk to cleanly.

use std::time::Duration;

use eyre::{Result, WrapErr};
use futures::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{self, get_openai_proxy};

use super::{GenerationRequest, Handler};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct HttpHandler {
    client: reqwest::Client,
    api_base: String,
}

impl HttpHandler {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: get_openai_proxy().unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    async fn query(&self, request: &GenerationRequest) -> Result<String> {
        let image_url = request.image.to_data_url().await?;
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.prompt.system },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt.user },
                        { "type": "image_url", "image_url": { "url": image_url } }
                    ]
                }
            ]
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(request.credential.expose())
            .json(&body)
            .send()
            .await
            .wrap_err("chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            eyre::bail!("chat completion API error {status}: {}", api_error_message(&error_text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .wrap_err("malformed chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| eyre::eyre!("the model returned an empty response"))
    }
}

/// Pull `error.message` out of an OpenAI style error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.to_string())
}

impl Handler for HttpHandler {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>> {
        self.query(request).boxed()
    }
}
