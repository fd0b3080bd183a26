//! The generation collaborator contract.
//!
//! The core is polymorphic over anything that can turn a prompt into
//! text. Providers implement [`Generator`]; the core only distinguishes
//! transient failures (retried with backoff) from permanent ones
//! (surfaced immediately). The default implementation wraps the Claude
//! client; tests use the scripted generator in [`crate::testing`].

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from a generation call.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Network trouble, timeout, or overload. Worth retrying.
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// The collaborator refused or the request itself is invalid.
    /// Retrying the same request cannot succeed.
    #[error("permanent generation failure: {0}")]
    Permanent(String),
}

/// What kind of content a generation call is producing. Providers may
/// use this to pick models or sampling parameters; the core uses it in
/// error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Outline,
    Draft,
    Expand,
    Rewrite,
    FreshRewrite,
    SuggestEdits,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Outline => "outline",
            OperationKind::Draft => "draft",
            OperationKind::Expand => "expand",
            OperationKind::Rewrite => "rewrite",
            OperationKind::FreshRewrite => "fresh rewrite",
            OperationKind::SuggestEdits => "suggest edits",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully assembled generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: OperationKind,
    pub system: String,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(kind: OperationKind, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError>;
}

/// Bounded-retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,

    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), with jitter.
    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << (retry - 1).min(16);
        let exp = self.base_delay.saturating_mul(factor);
        let capped = exp.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter)
    }
}

/// Call the generator, retrying transient failures with exponential
/// backoff until the policy is exhausted. Permanent failures surface
/// immediately.
pub async fn generate_with_retry(
    generator: &dyn Generator,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<String, GenerateError> {
    let mut attempt = 1;
    loop {
        match generator.generate(request).await {
            Ok(text) => {
                debug!(kind = %request.kind, attempt, "generation succeeded");
                return Ok(text);
            }
            Err(GenerateError::Permanent(message)) => {
                return Err(GenerateError::Permanent(message));
            }
            Err(GenerateError::Transient(message)) => {
                if attempt >= policy.max_attempts {
                    return Err(GenerateError::Transient(format!(
                        "{message} (gave up after {attempt} attempts)"
                    )));
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    kind = %request.kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient generation failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// The default provider: Claude's Messages API.
pub struct ClaudeGenerator {
    client: Claude,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self { client }
    }

    /// Create from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, claude::Error> {
        Ok(Self {
            client: Claude::from_env()?,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client = self.client.with_model(model);
        self
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        let mut api_request = Request::new(vec![Message::user(&request.prompt)])
            .with_system(&request.system)
            .with_max_tokens(request.max_tokens);

        if let Some(temperature) = request.temperature {
            api_request = api_request.with_temperature(temperature);
        }

        let completion = self.client.complete(api_request).await.map_err(|e| {
            if e.is_retryable() {
                GenerateError::Transient(e.to_string())
            } else {
                GenerateError::Permanent(e.to_string())
            }
        })?;

        Ok(completion.text)
    }
}
