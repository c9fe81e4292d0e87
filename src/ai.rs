use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{BotError, BotResult};

/// How many messages of a user's conversation are kept and sent along.
pub const HISTORY_LIMIT: usize = 20;
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(500);
const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

pub fn trim_history(history: &mut Vec<ChatMessage>) {
    if history.len() > HISTORY_LIMIT {
        history.drain(..history.len() - HISTORY_LIMIT);
    }
}

#[derive(Deserialize)]
struct Completion {
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

/// Client of an OpenAI compatible chat completion API.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
    system_prompt: String,
}

impl ChatClient {
    /// None when no api key is configured.
    pub fn from_config(config: &Config) -> BotResult<Option<Self>> {
        let api_key = match config.openai_api_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_owned(),
            _ => return Ok(None),
        };
        let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(Some(Self {
            http,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_owned(),
            model: config.openai_model.clone(),
            vision_model: config.vision_model.clone(),
            system_prompt: config.system_prompt.clone(),
        }))
    }

    /// Answers `text` in the context of the stored conversation.
    pub async fn reply(&self, history: &[ChatMessage], text: &str) -> BotResult<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(text));
        let messages = messages.iter().map(serde_json::to_value).collect::<Result<Vec<_>, _>>()?;
        self.complete(&self.model, messages).await
    }

    pub async fn describe_image(&self, prompt: &str, image: &[u8]) -> BotResult<String> {
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        let message = json!({
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{}", data)}},
            ],
        });
        self.complete(&self.vision_model, vec![message]).await
    }

    async fn complete(&self, model: &str, messages: Vec<Value>) -> BotResult<String> {
        let body = json!({ "model": model, "messages": messages });
        with_retry(BACKOFF, || self.request(&body)).await
    }

    async fn request(&self, body: &Value) -> BotResult<String> {
        let response = self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(BotError::Upstream(format!("chat completion: HTTP {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BotError::UpstreamRejected(format!("chat completion: HTTP {}: {}", status, text)));
        }
        let completion: Completion = response.json().await?;
        completion.choices.into_iter()
            .find_map(|c| c.message.content)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BotError::UpstreamRejected("chat completion: empty answer".into()))
    }
}

/// Runs `op` up to three times, doubling the pause after each retryable failure.
pub async fn with_retry<T, F, Fut>(backoff: Duration, mut op: F) -> BotResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BotResult<T>>,
{
    let mut pause = backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                log::warn!("attempt {} failed: {}, retrying in {:?}", attempt, e, pause);
                tokio::time::sleep(pause).await;
                pause *= 2;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn history_keeps_last_messages() {
        let mut history: Vec<_> = (0..25).map(|i| ChatMessage::user(i.to_string())).collect();
        trim_history(&mut history);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].content, "5");
        assert_eq!(serde_json::to_value(&history[0]).unwrap(), json!({"role": "user", "content": "5"}));
    }

    #[tokio::test]
    async fn upstream_errors_are_retried_three_times() {
        let calls = AtomicU32::new(0);
        let result: BotResult<()> = with_retry(Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::Upstream("503".into()))
        }).await;
        assert!(matches!(result, Err(BotError::Upstream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: BotResult<()> = with_retry(Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BotError::UpstreamRejected("400".into()))
        }).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(Duration::ZERO, || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(BotError::Upstream("429".into())),
                _ => Ok("ответ"),
            }
        }).await;
        assert_eq!(result.unwrap(), "ответ");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn client_needs_api_key() {
        let mut config = Config::default();
        config.openai_api_key = None;
        assert!(ChatClient::from_config(&config).unwrap().is_none());
    }
}
