//! Generation client (C8): Groq-compatible chat-completions HTTP client with
//! bounded retry and exponential backoff, plus a token-streaming variant.

use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::prompt::Message;

const RETRY_DELAYS: &[Duration] = &[Duration::from_secs(1), Duration::from_secs(3)];
const MAX_ATTEMPTS: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// One event in a streamed generation's event stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Usage { tokens_input: u32, tokens_output: u32 },
    Done,
    Error(String),
}

/// Thin Groq-compatible chat-completions client. The model is chosen by the
/// caller per request (the router selects simple vs. complex), not fixed at
/// construction.
pub struct GenerationClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GenerationClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn to_openai_messages<'a>(messages: &'a [Message]) -> Vec<OpenAIMessage<'a>> {
        messages
            .iter()
            .map(|m| OpenAIMessage {
                role: match m.role {
                    crate::prompt::Role::System => "system",
                    crate::prompt::Role::User => "user",
                },
                content: &m.content,
            })
            .collect()
    }

    /// Non-streaming chat completion. Returns `(answer, tokens_input,
    /// tokens_output)`. Retries transient failures with backoff, never
    /// retries 4xx responses.
    pub async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<(String, u32, u32)> {
        let request = ChatCompletionRequest {
            model,
            messages: Self::to_openai_messages(messages),
            max_tokens,
            temperature: 0.1,
            stream: false,
        };

        let response = self.send_with_retry(&request).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("malformed response body: {e}")))?;

        let answer = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok((answer, body.usage.prompt_tokens, body.usage.completion_tokens))
    }

    async fn send_with_retry(&self, request: &ChatCompletionRequest<'_>) -> Result<reqwest::Response> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            let send = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(request)
                .send();

            match tokio::time::timeout(REQUEST_TIMEOUT, send).await {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if !classify_status_for_retry(status) {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(CoreError::Validation(format!(
                            "generation request rejected ({status}): {body}"
                        )));
                    }
                    last_error = format!("upstream returned {status}");
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error = "request timed out after 30s".to_string();
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                warn!(attempt = attempt + 1, error = %last_error, "generation attempt failed, retrying");
                tokio::time::sleep(RETRY_DELAYS[attempt]).await;
            }
        }

        Err(CoreError::UpstreamUnavailable(last_error))
    }

    /// Streaming chat completion. Each yielded event is either a token
    /// fragment, the final usage totals, `Done`, or a terminal `Error`. The
    /// stream is not retried mid-flight: retry applies only to establishing
    /// the initial connection.
    pub async fn generate_stream(
        &self,
        model: &str,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<impl Stream<Item = StreamEvent> + Send> {
        let request = ChatCompletionRequest {
            model,
            messages: Self::to_openai_messages(messages),
            max_tokens,
            temperature: 0.1,
            stream: true,
        };

        let response = self.send_with_retry(&request).await?;
        let byte_stream = response.bytes_stream();

        Ok(async_stream::stream! {
            let mut byte_stream = Box::pin(byte_stream);
            let mut tokens_input = 0u32;
            let mut tokens_output = 0u32;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield StreamEvent::Error(e.to_string());
                        return;
                    }
                };

                for line in String::from_utf8_lossy(&bytes).lines() {
                    let Some(payload) = line.strip_prefix("data: ") else { continue };
                    if payload == "[DONE]" {
                        yield StreamEvent::Usage { tokens_input, tokens_output };
                        yield StreamEvent::Done;
                        return;
                    }

                    match serde_json::from_str::<StreamChunk>(payload) {
                        Ok(parsed) => {
                            if let Some(usage) = parsed.usage {
                                tokens_input = usage.prompt_tokens;
                                tokens_output = usage.completion_tokens;
                            }
                            for choice in parsed.choices {
                                if let Some(content) = choice.delta.content {
                                    tokens_output += 1;
                                    yield StreamEvent::Token(content);
                                }
                            }
                        }
                        Err(e) => {
                            yield StreamEvent::Error(format!("malformed stream chunk: {e}"));
                            return;
                        }
                    }
                }
            }

            yield StreamEvent::Usage { tokens_input, tokens_output };
            yield StreamEvent::Done;
        })
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn classify_status_for_retry(status: StatusCode) -> bool {
    !status.is_client_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!classify_status_for_retry(StatusCode::BAD_REQUEST));
        assert!(!classify_status_for_retry(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(classify_status_for_retry(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(classify_status_for_retry(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn retry_delay_table_has_two_entries_for_three_attempts() {
        assert_eq!(RETRY_DELAYS.len(), MAX_ATTEMPTS - 1);
        assert_eq!(RETRY_DELAYS[0], Duration::from_secs(1));
        assert_eq!(RETRY_DELAYS[1], Duration::from_secs(3));
    }

    #[tokio::test]
    async fn generate_retries_on_server_error_then_succeeds() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello there"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenerationClient::new(server.uri(), "test-key");
        let messages = vec![crate::prompt::Message {
            role: crate::prompt::Role::User,
            content: "hi".to_string(),
        }];

        let (answer, tokens_input, tokens_output) =
            client.generate("llama-3.1-8b-instant", &messages, 512).await.unwrap();

        assert_eq!(answer, "hello there");
        assert_eq!(tokens_input, 10);
        assert_eq!(tokens_output, 2);
    }

    #[tokio::test]
    async fn generate_does_not_retry_client_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenerationClient::new(server.uri(), "test-key");
        let messages = vec![crate::prompt::Message {
            role: crate::prompt::Role::User,
            content: "hi".to_string(),
        }];

        let result = client.generate("llama-3.1-8b-instant", &messages, 512).await;
        assert!(result.is_err());
    }
}
