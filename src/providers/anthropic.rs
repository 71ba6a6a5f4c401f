use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{CompletionClient, CompletionError, CompletionFuture, CompletionRequest};
use crate::config::Config;
use crate::credential::Credential;
use crate::model::{Completion, Turn};
use crate::providers::http_errors::{parse_retry_after, status_error, transport_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<UsageCounts>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct UsageCounts {
    input_tokens: u64,
    output_tokens: u64,
}

fn messages_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

fn to_message_params(messages: &[Turn]) -> Vec<MessageParam<'_>> {
    messages
        .iter()
        .map(|turn| MessageParam {
            role: turn.role.as_str(),
            content: &turn.content,
        })
        .collect()
}

fn into_completion(parsed: MessagesResponse) -> Result<Completion, CompletionError> {
    let text = parsed
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Unsupported => None,
        })
        .ok_or_else(|| CompletionError::other("Model response contained no text"))?;

    let completion = Completion::new(text);
    Ok(match parsed.usage {
        Some(usage) => completion.with_usage(usage.input_tokens, usage.output_tokens),
        None => completion,
    })
}

/// Messages API client for Anthropic-hosted models.
pub struct AnthropicClient<'a> {
    client: &'a Client,
    cfg: &'a Config,
    credential: &'a Credential,
}

impl<'a> AnthropicClient<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config, credential: &'a Credential) -> Self {
        Self {
            client,
            cfg,
            credential,
        }
    }

    async fn send(&self, request: CompletionRequest<'_>) -> Result<Completion, CompletionError> {
        request.validate()?;

        let api_url = messages_url(&self.cfg.base_url);
        let body = MessagesRequest {
            model: request.model,
            max_tokens: request.max_output_tokens,
            messages: to_message_params(request.messages),
        };
        debug!(
            api_url = %api_url,
            model = %request.model,
            message_count = request.messages.len(),
            max_tokens = request.max_output_tokens,
            "sending anthropic messages request"
        );

        let response = self
            .client
            .post(&api_url)
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    api_url = %api_url,
                    model = %request.model,
                    error = %err,
                    "anthropic request failed"
                );
                transport_error(err, &api_url, self.cfg.model_timeout_secs)
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok()),
            );
            let response_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            warn!(
                api_url = %api_url,
                model = %request.model,
                status = %status,
                response_body_len = response_body.len(),
                "anthropic returned non-success status"
            );
            return Err(status_error(status, retry_after, &response_body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|err| {
            CompletionError::other(format!("Failed to parse model response: {err}"))
        })?;
        let completion = into_completion(parsed)?;
        debug!(
            model = %request.model,
            response_len = completion.text.len(),
            input_tokens = completion.usage.map(|usage| usage.input_tokens),
            output_tokens = completion.usage.map(|usage| usage.output_tokens),
            "received anthropic response"
        );
        Ok(completion)
    }
}

impl CompletionClient for AnthropicClient<'_> {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFuture<'a> {
        Box::pin(self.send(request))
    }
}
