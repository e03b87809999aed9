pub mod chat;
pub mod config;
pub mod dummy;
pub mod usage;

pub use chat::*;
pub use config::*;
pub use dummy::*;
pub use usage::*;

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, Stop,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use bon::Builder;
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::core::LmError;
use crate::utils::truncate;

const HISTORY_WINDOW: usize = 100;

/// A single completion returned by [`LanguageModel::call`].
#[derive(Clone, Debug)]
pub struct LMResponse {
    /// Assistant message chosen by the provider.
    pub output: Message,
    /// Token usage reported by the provider for this call.
    pub usage: LmUsage,
    /// Chat history including the freshly appended assistant response.
    pub chat: Chat,
}

/// A completed exchange kept for [`LM::inspect_history`].
#[derive(Clone, Debug)]
pub struct CallRecord {
    pub chat: Chat,
    pub usage: LmUsage,
}

/// LLM completion service as seen by predictors.
///
/// Implementations issue exactly one provider call per invocation and do not
/// retry; a failure is surfaced as [`LmError`].
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError>;
}

fn get_base_url_by_provider(provider: &str) -> &str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        "anthropic" => "https://api.anthropic.com/v1",
        "google" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "groq" => "https://api.groq.com/openai/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "together" => "https://api.together.xyz/v1",
        _ => "https://openrouter.ai/api/v1",
    }
}

/// OpenAI-compatible language model client.
///
/// Clones share the same HTTP client and history window, so an `LM` can be
/// wrapped in an `Arc` and handed to several predictors at once.
#[derive(Builder)]
#[builder(finish_fn(vis = "", name = build_internal))]
pub struct LM {
    /// Provider API credential.
    #[builder(into)]
    pub api_key: SecretString,
    /// Base URL for the OpenAI-compatible endpoint.
    #[builder(default = "https://api.openai.com/v1".to_string(), into)]
    pub base_url: String,
    /// Inference settings applied to each call.
    #[builder(default)]
    pub config: LMConfig,
    #[builder(skip)]
    client: Option<Client<OpenAIConfig>>,
    #[builder(skip)]
    history: Arc<Mutex<VecDeque<CallRecord>>>,
}

impl Clone for LM {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            config: self.config.clone(),
            client: self.client.clone(),
            history: self.history.clone(),
        }
    }
}

use l_m_builder::{IsSet, State};

impl<S: State> LMBuilder<S> {
    /// Finalizes construction of an [`LM`], resolving `provider/model` names
    /// and initializing the HTTP client.
    pub fn build(self) -> LM
    where
        S::ApiKey: IsSet,
    {
        let mut lm = self.build_internal();

        if let Some((provider, model_id)) = lm.config.model.clone().split_once('/') {
            lm.config.model = model_id.to_string();
            lm.base_url = get_base_url_by_provider(provider).to_string();
        }

        let openai_config = OpenAIConfig::new()
            .with_api_key(lm.api_key.expose_secret().to_string())
            .with_api_base(lm.base_url.clone());
        lm.client = Some(Client::with_config(openai_config));
        lm
    }
}

impl LM {
    /// Builds an [`LM`] from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `DSRS_MODEL`.
    pub fn from_env() -> anyhow::Result<LM> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let config = match std::env::var("DSRS_MODEL") {
            Ok(model) => LMConfig::builder().model(model).build(),
            Err(_) => LMConfig::default(),
        };

        Ok(LM::builder()
            .api_key(api_key)
            .base_url(base_url)
            .config(config)
            .build())
    }

    fn build_request(&self, chat: &Chat) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = chat
            .messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.config.model.clone())
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens);

        if !self.config.stop.is_empty() {
            builder.stop(Stop::StringArray(self.config.stop.clone()));
        }

        builder.build()
    }

    fn record(&self, record: CallRecord) {
        let Ok(mut history) = self.history.lock() else {
            warn!("lm history lock poisoned; dropping record");
            return;
        };
        history.push_front(record);
        history.truncate(HISTORY_WINDOW);
    }

    /// Returns the `n` most recent calls, newest first.
    pub fn inspect_history(&self, n: usize) -> Vec<CallRecord> {
        self.history
            .lock()
            .map(|history| history.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for LM {
    #[tracing::instrument(
        name = "dsrs.lm.call",
        level = "debug",
        skip(self, chat),
        fields(model = %self.config.model, messages = chat.len())
    )]
    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError> {
        let Some(client) = self.client.as_ref() else {
            return Err(LmError::Provider {
                provider: self.base_url.clone(),
                message: "client not initialized".to_string(),
            });
        };

        let request = self
            .build_request(&chat)
            .map_err(|error| lm_error(&self.base_url, error))?;

        let response = tokio::time::timeout(self.config.timeout, client.chat().create(request))
            .await
            .map_err(|_| LmError::Timeout {
                after: self.config.timeout,
            })?
            .map_err(|error| lm_error(&self.base_url, error))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LmError::Provider {
                provider: self.base_url.clone(),
                message: "response contained no message content".to_string(),
            })?;
        let usage = response.usage.map(LmUsage::from).unwrap_or_default();
        debug!(
            total_tokens = usage.total_tokens,
            output = truncate(&content, 120),
            "lm call completed"
        );

        let output = Message::assistant(content);
        let mut full_chat = chat;
        full_chat.push_message(output.clone());

        self.record(CallRecord {
            chat: full_chat.clone(),
            usage: usage.clone(),
        });

        Ok(LMResponse {
            output,
            usage,
            chat: full_chat,
        })
    }
}

fn to_openai_message(message: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

fn lm_error(endpoint: &str, error: OpenAIError) -> LmError {
    match error {
        OpenAIError::Reqwest(source) => LmError::Network {
            endpoint: endpoint.to_string(),
            message: source.to_string(),
        },
        OpenAIError::ApiError(api) if api.message.to_lowercase().contains("rate limit") => {
            LmError::RateLimit {
                message: api.message,
            }
        }
        other => LmError::Provider {
            provider: endpoint.to_string(),
            message: other.to_string(),
        },
    }
}
