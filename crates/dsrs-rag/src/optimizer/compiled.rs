use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::core::{Module, Optimizable, OptimizerError, PipelineError};
use crate::data::{Demonstration, Example};
use crate::trace::Trace;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledStep {
    pub step_name: String,
    pub demonstrations: Vec<Demonstration>,
}

/// Serializable snapshot of the demonstrations frozen into each generation step.
///
/// ```json
/// {"run_id": "...", "compiled_at": "...",
///  "steps": [{"step_name": "generate_answer", "demonstrations": [{"question": "..."}]}]}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub run_id: Uuid,
    pub compiled_at: DateTime<Utc>,
    pub steps: Vec<CompiledStep>,
}

impl CompiledProgram {
    /// Reads the current demonstrations of every step of `module`.
    pub fn capture<M: Optimizable>(run_id: Uuid, module: &mut M) -> Self {
        let steps = module
            .parameters()
            .into_iter()
            .map(|(step_name, step)| CompiledStep {
                step_name,
                demonstrations: step.demos().to_vec(),
            })
            .collect();

        Self {
            run_id,
            compiled_at: Utc::now(),
            steps,
        }
    }

    pub fn step(&self, step_name: &str) -> Option<&CompiledStep> {
        self.steps.iter().find(|step| step.step_name == step_name)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OptimizerError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptimizerError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Installs these demonstrations into a fresh `module` and freezes it.
    ///
    /// Every stored step must exist on the module; steps the artifact doesn't
    /// mention keep whatever demonstrations they already had.
    pub fn apply<M: Module + Optimizable>(self, mut module: M) -> Result<Compiled<M>, OptimizerError> {
        {
            let mut parameters = module.parameters();
            for step in &self.steps {
                let target = parameters
                    .get_mut(&step.step_name)
                    .ok_or_else(|| OptimizerError::UnknownStep(step.step_name.clone()))?;
                target.set_demos(step.demonstrations.clone());
            }
        }
        info!(run_id = %self.run_id, steps = self.steps.len(), "compiled program applied");

        let report = CompileReport::restored(&self);
        Ok(Compiled {
            module,
            program: self,
            report,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedExample {
    pub index: usize,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step_name: String,
    pub bootstrapped: usize,
    pub labeled: usize,
}

impl StepSummary {
    pub fn demos(&self) -> usize {
        self.bootstrapped + self.labeled
    }
}

/// What happened during one compile run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    pub run_id: Uuid,
    /// Training examples the pipeline was run on.
    pub attempted: usize,
    /// Runs whose prediction passed the metric.
    pub bootstrapped: usize,
    /// Runs that failed in the pipeline or in the metric.
    pub skipped: Vec<SkippedExample>,
    pub steps: Vec<StepSummary>,
    /// Steps left without demonstrations, which run zero-shot.
    pub warnings: Vec<String>,
}

impl CompileReport {
    fn restored(program: &CompiledProgram) -> Self {
        Self {
            run_id: program.run_id,
            steps: program
                .steps
                .iter()
                .map(|step| {
                    let bootstrapped = step
                        .demonstrations
                        .iter()
                        .filter(|demo| demo.augmented)
                        .count();
                    StepSummary {
                        step_name: step.step_name.clone(),
                        bootstrapped,
                        labeled: step.demonstrations.len() - bootstrapped,
                    }
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// A module whose demonstrations were fixed by an optimizer.
///
/// Derefs to the inner module for its read-only API (e.g. [`Rag::run`](crate::Rag::run)).
pub struct Compiled<M> {
    pub(crate) module: M,
    pub(crate) program: CompiledProgram,
    pub(crate) report: CompileReport,
}

impl<M> Compiled<M> {
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    pub fn report(&self) -> &CompileReport {
        &self.report
    }

    /// Frozen demonstrations of `step_name`; empty for unknown steps.
    pub fn demos(&self, step_name: &str) -> &[Demonstration] {
        self.program
            .step(step_name)
            .map(|step| step.demonstrations.as_slice())
            .unwrap_or_default()
    }
}

impl<M> Deref for Compiled<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}

impl<M: Module> Module for Compiled<M> {
    type Output = M::Output;

    async fn forward(&self, example: &Example, trace: &mut Trace) -> Result<M::Output, PipelineError> {
        self.module.forward(example, trace).await
    }
}
