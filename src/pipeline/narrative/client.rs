use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::NarrativeError;

/// Temperature for hosted chat models (low: factual, repeatable wording).
pub const CHAT_TEMPERATURE: f32 = 0.3;

/// Text-completion collaborator: one system instruction, one user message,
/// one completion back.
pub trait NarrativeClient: Send + Sync {
    fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError>;

    /// Name of the model behind the client, for logs and health output.
    fn model(&self) -> &str;
}

fn build_http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, NarrativeError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NarrativeError::Http(format!("Failed to create HTTP client: {e}")))
}

fn map_send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> NarrativeError {
    if e.is_connect() {
        NarrativeError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        NarrativeError::Timeout(timeout_secs)
    } else {
        NarrativeError::Http(e.to_string())
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, NarrativeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(NarrativeError::Service {
        status: status.as_u16(),
        body,
    })
}

// ═══════════════════════════════════════════════════════════
// Ollama (local)
// ═══════════════════════════════════════════════════════════

/// Ollama HTTP client for local inference.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, NarrativeError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: build_http_client(timeout_secs)?,
            timeout_secs,
        })
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl NarrativeClient for OllamaClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: user,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;

        let parsed: OllamaGenerateResponse = check_status(response)?
            .json()
            .map_err(|e| NarrativeError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// OpenAI-compatible chat completions (Groq, vLLM, ...)
// ═══════════════════════════════════════════════════════════

pub struct ChatCompletionsClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl ChatCompletionsClient {
    /// `base_url` up to but excluding `/chat/completions`,
    /// e.g. `https://api.groq.com/openai/v1`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, NarrativeError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            client: build_http_client(timeout_secs)?,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
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

/// First choice's message content.
pub fn parse_chat_response(body: &str) -> Result<String, NarrativeError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| NarrativeError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| NarrativeError::MalformedResponse("response has no choices".into()))
}

impl NarrativeClient for ChatCompletionsClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: CHAT_TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;

        let text = check_status(response)?
            .text()
            .map_err(|e| NarrativeError::MalformedResponse(e.to_string()))?;
        parse_chat_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// Retry policy (applied at the boundary, around any client)
// ═══════════════════════════════════════════════════════════

pub struct RetryingClient {
    inner: Box<dyn NarrativeClient>,
    retries: u32,
    backoff: Duration,
}

impl RetryingClient {
    /// `retries` extra attempts after the first; delay doubles each time.
    pub fn new(inner: Box<dyn NarrativeClient>, retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }
}

impl NarrativeClient for RetryingClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(system, user) {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Narrative call failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Replays queued results, then repeats the fallback. Records every call.
pub struct MockNarrativeClient {
    queued: Mutex<VecDeque<Result<String, NarrativeError>>>,
    fallback: Result<String, (u16, String)>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockNarrativeClient {
    pub fn new(response: &str) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with a service error.
    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            fallback: Err((status, body.to_string())),
            ..Self::new("")
        }
    }

    pub fn then(self, result: Result<String, NarrativeError>) -> Self {
        if let Ok(mut q) = self.queued.lock() {
            q.push_back(result);
        }
        self
    }

    /// `(system, user)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl NarrativeClient for MockNarrativeClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((system.to_string(), user.to_string()));
        }
        if let Some(result) = self.queued.lock().ok().and_then(|mut q| q.pop_front()) {
            return result;
        }
        self.fallback.clone().map_err(|(status, body)| NarrativeError::Service { status, body })
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Lets a test keep a handle on the mock after boxing it.
    struct Shared(Arc<MockNarrativeClient>);

    impl NarrativeClient for Shared {
        fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
            self.0.complete(system, user)
        }
        fn model(&self) -> &str {
            self.0.model()
        }
    }

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockNarrativeClient::new("summary text");
        assert_eq!(client.complete("sys", "user").unwrap(), "summary text");
        assert_eq!(client.calls(), vec![("sys".to_string(), "user".to_string())]);
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.1:8b", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model(), "llama3.1:8b");
    }

    #[test]
    fn unreachable_ollama_is_connection_error() {
        let client = OllamaClient::new("http://127.0.0.1:1", "m", 5).unwrap();
        let err = client.complete("s", "u").unwrap_err();
        assert!(matches!(err, NarrativeError::Connection(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn chat_response_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}},{"message":{"content":"x"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Hello");
    }

    #[test]
    fn chat_response_without_choices_is_malformed() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(NarrativeError::MalformedResponse(_))
        ));
        assert!(parse_chat_response("not json").is_err());
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let mock = Arc::new(
            MockNarrativeClient::new("ok")
                .then(Err(NarrativeError::Timeout(1)))
                .then(Err(NarrativeError::Service {
                    status: 503,
                    body: "busy".into(),
                })),
        );
        let client = RetryingClient::new(Box::new(Shared(mock.clone())), 2, Duration::ZERO);
        assert_eq!(client.complete("s", "u").unwrap(), "ok");
        assert_eq!(mock.calls().len(), 3);
    }

    #[test]
    fn retry_gives_up_after_budget() {
        let mock = Arc::new(
            MockNarrativeClient::new("never")
                .then(Err(NarrativeError::Connection("x".into())))
                .then(Err(NarrativeError::Connection("x".into()))),
        );
        let client = RetryingClient::new(Box::new(Shared(mock.clone())), 1, Duration::ZERO);
        assert!(matches!(
            client.complete("s", "u"),
            Err(NarrativeError::Connection(_))
        ));
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let mock = Arc::new(MockNarrativeClient::failing(401, "bad key"));
        let client = RetryingClient::new(Box::new(Shared(mock.clone())), 3, Duration::ZERO);
        let err = client.complete("s", "u").unwrap_err();
        assert!(err.to_string().contains("bad key"));
        assert_eq!(mock.calls().len(), 1);
    }
}
