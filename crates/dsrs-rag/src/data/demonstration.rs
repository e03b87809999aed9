use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::Example;
use crate::trace::TraceStep;

/// A few-shot sample injected into a generation step's prompt.
///
/// `augmented` demonstrations were captured from a pipeline run whose
/// prediction passed the metric; the others are raw labeled examples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demonstration {
    #[serde(default)]
    pub augmented: bool,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl Demonstration {
    /// The step's actual input and output bindings at the time it ran.
    pub fn from_step(step: &TraceStep) -> Self {
        let mut fields = step.inputs.clone();
        fields.extend(step.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            augmented: true,
            fields,
        }
    }

    pub fn from_example(example: &Example) -> Self {
        Self {
            augmented: false,
            fields: example.data.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
