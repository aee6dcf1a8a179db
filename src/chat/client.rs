use std::{future::Future, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::repo_types::Role;
use crate::config::ChatConfig;

macro_rules! support_resources {
    () => {
        "- Veterans Crisis Line: dial 988 then press 1, text 838255, or visit https://www.veteranscrisisline.net\n\
         - VA main site (search locations/services): https://www.va.gov\n\
         - Find Vet Centers: https://www.va.gov/find-locations\n\
         - National Suicide & Crisis Lifeline: dial 988\n\
         - Breathing exercise: /exercise/breathing/\n\
         - Grounding exercise: /exercise/grounding/\n\
         - Sleep exercise: /exercise/sleep/\n"
    };
}

pub const QUOTA_FALLBACK: &str = concat!(
    "\u{26a0}\u{fe0f} I can't reach the AI service because this project has no available credit. ",
    "I'm still here to listen and offer general support.\n\n",
    "If you need immediate help or resources, here are some options:\n",
    support_resources!()
);

pub const ERROR_FALLBACK: &str = concat!(
    "\u{26a0}\u{fe0f} I'm having trouble contacting the AI service right now. ",
    "If you're in crisis, call 988 (Press 1). Otherwise, I'm listening. ",
    "Tell me a bit more about what's going on.\n\n",
    "Helpful resources while the AI is unavailable:\n",
    support_resources!()
);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    QuotaFallback,
    ErrorFallback,
}

impl ReplySource {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplySource::Model => "openai",
            ReplySource::QuotaFallback => "quota_fallback",
            ReplySource::ErrorFallback => "error_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub source: ReplySource,
}

impl ChatReply {
    fn quota() -> Self {
        Self { content: QUOTA_FALLBACK.to_string(), source: ReplySource::QuotaFallback }
    }
    fn fallback() -> Self {
        Self { content: ERROR_FALLBACK.to_string(), source: ReplySource::ErrorFallback }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("OPENAI_API_KEY is not set in the environment.")]
    MissingApiKey,
}

/// A hosted chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Network and API failures come back as fallback text, not errors.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<ChatReply, ChatError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(400),
            cap: Duration::from_secs(8),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retrying after `attempt` (1-based). A server-supplied
    /// `Retry-After` replaces the exponential schedule but is still capped.
    pub fn delay(&self, attempt: u32, retry_after: Option<f64>) -> Duration {
        let cap = self.cap.as_secs_f64();
        if let Some(secs) = retry_after {
            return Duration::from_secs_f64(secs.max(0.0).min(cap));
        }
        let exp = self.base.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let jitter = rand::thread_rng().gen::<f64>() * self.jitter.as_secs_f64();
        Duration::from_secs_f64(exp.min(cap) + jitter)
    }
}

/// Outcome of a single HTTP call.
#[derive(Debug)]
pub(crate) enum Attempt {
    Reply(String),
    Status {
        status: StatusCode,
        retry_after: Option<f64>,
        body: String,
    },
    Failed(String),
}

#[derive(Debug, PartialEq)]
enum Next {
    Quota,
    Retry(Option<f64>),
    Stop,
}

/// A 429 is either a rate limit (retry) or an exhausted quota (give up now).
pub(crate) fn is_quota_exhausted(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("insufficient_quota") || lowered.contains("check your plan and billing")
}

fn classify(status: StatusCode, retry_after: Option<f64>, body: &str) -> Next {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if is_quota_exhausted(body) {
            Next::Quota
        } else {
            Next::Retry(retry_after)
        }
    } else if status.is_server_error() {
        Next::Retry(None)
    } else {
        Next::Stop
    }
}

pub(crate) fn parse_retry_after(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) async fn run_with_retry<F, Fut>(policy: &RetryPolicy, mut call: F) -> ChatReply
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    for attempt in 1..=policy.max_attempts {
        match call(attempt).await {
            Attempt::Reply(text) => {
                return ChatReply { content: text.trim().to_string(), source: ReplySource::Model };
            }
            Attempt::Status { status, retry_after, body } => match classify(status, retry_after, &body) {
                Next::Quota => {
                    warn!(%status, "chat completion quota exhausted");
                    return ChatReply::quota();
                }
                Next::Retry(retry_after) => {
                    warn!(%status, attempt, "chat completion retryable error");
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(policy.delay(attempt, retry_after)).await;
                    }
                }
                Next::Stop => {
                    warn!(%status, attempt, "chat completion rejected");
                    break;
                }
            },
            Attempt::Failed(reason) => {
                warn!(%reason, attempt, "chat completion request failed");
                break;
            }
        }
    }
    ChatReply::fallback()
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChat {
    http: reqwest::Client,
    cfg: ChatConfig,
    policy: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(http: reqwest::Client, cfg: ChatConfig) -> Self {
        Self { http, cfg, policy: RetryPolicy::default() }
    }

    #[cfg(test)]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn send_once(&self, key: &str, body: &CompletionRequest<'_>) -> Attempt {
        let res = match self
            .http
            .post(self.endpoint())
            .bearer_auth(key)
            .timeout(Duration::from_secs(self.cfg.timeout_secs))
            .json(body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return Attempt::Failed(e.to_string()),
        };

        let status = res.status();
        if status.is_success() {
            return match res.json::<CompletionResponse>().await {
                Ok(parsed) => Attempt::Reply(
                    parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .unwrap_or_default(),
                ),
                Err(e) => Attempt::Failed(format!("decode completion: {e}")),
            };
        }

        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = res.text().await.unwrap_or_default();
        Attempt::Status { status, retry_after, body }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<ChatReply, ChatError> {
        let key = self.cfg.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;
        let request = CompletionRequest {
            model: &self.cfg.model,
            messages,
            temperature: 0.3,
            max_tokens: 400,
        };
        let body = &request;

        let reply = run_with_retry(&self.policy, move |attempt| {
            debug!(attempt, model = %body.model, "chat completion request");
            self.send_once(key, body)
        })
        .await;

        info!(source = reply.source.as_str(), chars = reply.content.len(), "chat completion finished");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::ZERO,
            cap: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn status(code: u16, body: &str) -> Attempt {
        Attempt::Status {
            status: StatusCode::from_u16(code).unwrap(),
            retry_after: None,
            body: body.to_string(),
        }
    }

    async fn run_script(script: Vec<Attempt>) -> (ChatReply, u32) {
        let calls = AtomicU32::new(0);
        let mut script = VecDeque::from(script);
        let reply = run_with_retry(&instant(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let next = script.pop_front().expect("script exhausted");
            async move { next }
        })
        .await;
        (reply, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn exponential_delay_is_capped_with_bounded_jitter() {
        let policy = RetryPolicy::default();
        for _ in 0..20 {
            let first = policy.delay(1, None).as_secs_f64();
            assert!((0.4..=0.65).contains(&first), "{first}");
            let third = policy.delay(3, None).as_secs_f64();
            assert!((1.6..=1.85).contains(&third), "{third}");
            let late = policy.delay(12, None).as_secs_f64();
            assert!((8.0..=8.25).contains(&late), "{late}");
        }
    }

    #[test]
    fn retry_after_is_honoured_but_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1, Some(2.5)), Duration::from_millis(2500));
        assert_eq!(policy.delay(1, Some(120.0)), Duration::from_secs(8));
        assert_eq!(policy.delay(1, Some(-4.0)), Duration::ZERO);
    }

    #[test]
    fn retry_after_header_parsing() {
        assert_eq!(parse_retry_after(" 3 "), Some(3.0));
        assert_eq!(parse_retry_after("0.5"), Some(0.5));
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn quota_detection_reads_the_error_body() {
        assert!(is_quota_exhausted(r#"{"error":{"code":"insufficient_quota"}}"#));
        assert!(is_quota_exhausted("You exceeded your current quota, please Check your plan and billing details."));
        assert!(!is_quota_exhausted("Rate limit reached for requests"));
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let (reply, calls) = run_script(vec![
            status(429, "Rate limit reached"),
            Attempt::Reply("  Take a slow breath.  ".into()),
        ])
        .await;
        assert_eq!(calls, 2);
        assert_eq!(reply.source, ReplySource::Model);
        assert_eq!(reply.content, "Take a slow breath.");
    }

    #[tokio::test]
    async fn quota_exhaustion_stops_immediately() {
        let (reply, calls) = run_script(vec![status(429, "insufficient_quota")]).await;
        assert_eq!(calls, 1);
        assert_eq!(reply.source, ReplySource::QuotaFallback);
        assert!(reply.content.contains("no available credit"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (reply, calls) = run_script(vec![status(401, "bad key")]).await;
        assert_eq!(calls, 1);
        assert_eq!(reply.source, ReplySource::ErrorFallback);
    }

    #[tokio::test]
    async fn server_errors_retry_until_exhausted() {
        let (reply, calls) =
            run_script(vec![status(503, ""), status(502, ""), status(500, "")]).await;
        assert_eq!(calls, 3);
        assert_eq!(reply.source, ReplySource::ErrorFallback);
        assert!(reply.content.contains("988"));
    }

    #[tokio::test]
    async fn transport_failure_falls_back_once() {
        let (reply, calls) = run_script(vec![Attempt::Failed("connection reset".into())]).await;
        assert_eq!(calls, 1);
        assert_eq!(reply.source, ReplySource::ErrorFallback);
    }

    fn chat_config(api_key: Option<&str>) -> ChatConfig {
        ChatConfig {
            api_key: api_key.map(str::to_string),
            model: "gpt-4o-mini".into(),
            base_url: "http://127.0.0.1:9/v1/".into(),
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let chat = OpenAiChat::new(reqwest::Client::new(), chat_config(None));
        let err = chat.complete(&[PromptMessage::new(Role::User, "hi")]).await.unwrap_err();
        assert!(matches!(err, ChatError::MissingApiKey));
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_fallback() {
        let chat = OpenAiChat::new(reqwest::Client::new(), chat_config(Some("sk-test")))
            .with_policy(instant());
        assert_eq!(chat.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
        let reply = chat.complete(&[PromptMessage::new(Role::User, "hi")]).await.unwrap();
        assert_eq!(reply.source, ReplySource::ErrorFallback);
    }
}
