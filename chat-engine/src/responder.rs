use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use common::{
    storage::types::message::{Message, MessageRole},
    utils::config::AppConfig,
};

use crate::{
    context::{context_window, is_education_related, off_topic_reply, SYSTEM_PROMPT},
    OpenAIClientType,
};

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("AI request timed out")]
    Timeout,
    #[error("AI service error: {0}")]
    Service(String),
}

/// The AI collaborator as seen by the turn orchestrator. The history is the
/// active conversation in timestamp order, ending with the message that
/// needs an answer; `extra_context` carries the onboarding context prompt.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn complete(
        &self,
        history: &[Message],
        extra_context: Option<&str>,
    ) -> Result<String, ResponderError>;
}

pub struct OpenAiResponder {
    client: Arc<OpenAIClientType>,
    model: String,
    timeout: Duration,
}

impl OpenAiResponder {
    pub fn new(client: Arc<OpenAIClientType>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }

    pub fn from_config(client: Arc<OpenAIClientType>, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.chat_model.clone(),
            Duration::from_secs(config.ai_timeout_secs),
        )
    }

    fn build_request(
        &self,
        history: &[Message],
        extra_context: Option<&str>,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into()];

        if let Some(context) = extra_context {
            messages.push(ChatCompletionRequestSystemMessage::from(context).into());
        }

        for message in context_window(history) {
            // Error placeholders are local artifacts, not model output
            if message.is_error {
                continue;
            }
            let request_message = match message.role {
                MessageRole::User => {
                    ChatCompletionRequestUserMessage::from(message.content.clone()).into()
                }
                MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
            };
            messages.push(request_message);
        }

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(512u32)
            .build()
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn complete(
        &self,
        history: &[Message],
        extra_context: Option<&str>,
    ) -> Result<String, ResponderError> {
        if let Some(last) = history.last() {
            if last.role == MessageRole::User && !is_education_related(&last.content) {
                debug!("Off-topic question, answering without the model");
                return Ok(off_topic_reply());
            }
        }

        let request = self
            .build_request(history, extra_context)
            .map_err(|e| ResponderError::Service(e.to_string()))?;

        // 1s, 2s, 4s between attempts, capped at 10s
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(500)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(3);

        let call = RetryIf::spawn(
            retry_strategy,
            || async {
                self.client.chat().create(request.clone()).await
            },
            is_transient_error,
        );

        let response = timeout(self.timeout, call)
            .await
            .map_err(|_| ResponderError::Timeout)?
            .map_err(|e| ResponderError::Service(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ResponderError::Service("No content found in completion".into()))?;
        let content = content.trim().to_string();

        if !is_plausible_reply(&content) {
            warn!("Model reply failed validation, substituting fallback text");
            return Ok(invalid_reply_fallback());
        }

        Ok(content)
    }
}

/// Only connection-level failures are worth retrying; API errors come back
/// identical on a retry.
fn is_transient_error(error: &OpenAIError) -> bool {
    matches!(error, OpenAIError::Reqwest(_))
}

fn is_plausible_reply(reply: &str) -> bool {
    if reply.trim().chars().count() < 10 {
        return false;
    }

    let lowered = reply.to_lowercase();
    const REFUSAL_PHRASES: &[&str] = &[
        "as an ai",
        "i cannot",
        "i don't have access",
        "i'm not able to",
        "i cannot provide",
    ];

    !REFUSAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn invalid_reply_fallback() -> String {
    "Sorry, ik kon geen goed antwoord genereren. \
     Kun je je vraag anders formuleren? \
     Ik help je graag met vragen over Surinaams onderwijs!"
        .to_string()
}
