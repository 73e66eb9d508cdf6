use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
    Client,
};
use backoff::ExponentialBackoff;
use eyre::Result;
use futures::{future::BoxFuture, FutureExt};

use crate::{
    config::{self, get_openai_proxy},
    session::Credential,
};

use super::{GenerationRequest, Handler};

pub struct OpenAIHandler {
    http_client: reqwest::Client,
    api_base: Option<String>,
}

impl OpenAIHandler {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            api_base: get_openai_proxy(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Get the OpenAI interface client for one credential. The client's own
    /// backoff is disabled so a trigger sends exactly one request.
    fn get_client(&self, credential: &Credential) -> Client<OpenAIConfig> {
        let mut openai_config = OpenAIConfig::new().with_api_key(credential.expose());
        if let Some(base) = &self.api_base {
            openai_config = openai_config.with_api_base(base);
        }
        Client::with_config(openai_config)
            .with_http_client(self.http_client.clone())
            .with_backoff(no_retry())
    }
}

impl Handler for OpenAIHandler {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>> {
        async move {
            let image_url = request.image.to_data_url().await?;
            let chat_msgs = request.prompt.to_chatgpt_message(&image_url)?;
            let chat_request = create_chat_request(&request.model, chat_msgs)?;
            let client = self.get_client(&request.credential);
            let response = get_chat_response(&client, chat_request).await?;
            first_choice_content(response)
        }
        .boxed()
    }
}

fn no_retry() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::ZERO),
        ..Default::default()
    }
}

/// Create a request for a chat prompt
fn create_chat_request(
    model: &str,
    msgs: Vec<ChatCompletionRequestMessage>,
) -> Result<CreateChatCompletionRequest> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(msgs)
        .build()?;
    Ok(request)
}

/// Get a response for a chat request. Sent once; failures are returned as they are.
async fn get_chat_response(
    client: &Client<OpenAIConfig>,
    request: CreateChatCompletionRequest,
) -> Result<CreateChatCompletionResponse> {
    log::debug!("Sending chat request to model {}", request.model);
    let response = client
        .chat()
        .create(request)
        .await
        .map_err(eyre::Report::new)?;
    Ok(response)
}

fn first_choice_content(response: CreateChatCompletionResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| eyre::eyre!("the model returned no choices"))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => eyre::bail!("the model returned an empty response"),
    }
}
