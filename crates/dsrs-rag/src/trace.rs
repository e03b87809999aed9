//! Explicit execution traces.
//!
//! A [`Trace`] is threaded through [`Module::forward`](crate::Module::forward)
//! as a `&mut` accumulator; every retrieval and generation step appends one
//! [`TraceStep`] with the bindings it actually saw and produced. Optimizers read
//! the generation steps back out to build demonstrations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Retrieve,
    Generate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_name: String,
    pub kind: StepKind,
    pub inputs: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        step_name: impl Into<String>,
        kind: StepKind,
        inputs: IndexMap<String, Value>,
        outputs: IndexMap<String, Value>,
    ) {
        self.steps.push(TraceStep {
            step_name: step_name.into(),
            kind,
            inputs,
            outputs,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn generation_steps(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps
            .iter()
            .filter(|step| step.kind == StepKind::Generate)
    }
}
