use bon::Builder;
use std::time::Duration;

/// Tunable inference parameters applied to each [`LM`](super::LM) call.
#[derive(Clone, Debug, Builder)]
pub struct LMConfig {
    /// Model identifier. Accepts `provider/model` to infer the base URL.
    #[builder(default = "gpt-3.5-turbo".to_string(), into)]
    pub model: String,
    /// Sampling temperature.
    #[builder(default = 0.0)]
    pub temperature: f32,
    /// Maximum tokens requested for the completion.
    #[builder(default = 512)]
    pub max_tokens: u32,
    /// Stop sequences forwarded to the provider.
    #[builder(default)]
    pub stop: Vec<String>,
    /// Upper bound on a single completion call, including network time.
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
}

impl Default for LMConfig {
    fn default() -> Self {
        LMConfig::builder().build()
    }
}
