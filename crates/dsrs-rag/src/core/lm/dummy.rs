use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{CallRecord, Chat, LMResponse, LanguageModel, LmUsage, Message};
use crate::core::LmError;

type Responder = dyn Fn(&Chat) -> Result<String, LmError> + Send + Sync;

/// In-memory LM used for deterministic tests and examples.
///
/// The responder sees the full chat that would have been sent to a provider
/// and returns the assistant text (or an error to simulate a provider failure).
#[derive(Clone)]
pub struct DummyLM {
    responder: Arc<Responder>,
    history: Arc<Mutex<Vec<CallRecord>>>,
    attempts: Arc<AtomicUsize>,
}

impl DummyLM {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Chat) -> Result<String, LmError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            history: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers with `text`.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Number of calls received so far, including ones that failed.
    pub fn calls(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns the `n` most recent calls, newest first.
    pub fn inspect_history(&self, n: usize) -> Vec<CallRecord> {
        self.history
            .lock()
            .map(|history| history.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for DummyLM {
    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let content = (self.responder)(&chat)?;
        let output = Message::assistant(content);

        let mut full_chat = chat;
        full_chat.push_message(output.clone());

        if let Ok(mut history) = self.history.lock() {
            history.push(CallRecord {
                chat: full_chat.clone(),
                usage: LmUsage::default(),
            });
        }

        Ok(LMResponse {
            output,
            usage: LmUsage::default(),
            chat: full_chat,
        })
    }
}
