use serde::{Deserialize, Serialize};

/// Output of one [`Rag`](crate::Rag) run.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct RagPrediction {
    /// Retrieved passages, most relevant first.
    pub context: Vec<String>,
    pub answer: String,
    /// Present when the generation step runs in chain-of-thought mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Predictions carrying a final answer, scored by answer metrics.
pub trait HasAnswer {
    fn answer(&self) -> &str;
}

/// Predictions carrying the retrieved passages, scored by retrieval metrics.
pub trait HasContext {
    fn context(&self) -> &[String];
}

impl HasAnswer for RagPrediction {
    fn answer(&self) -> &str {
        &self.answer
    }
}

impl HasContext for RagPrediction {
    fn context(&self) -> &[String] {
        &self.context
    }
}
