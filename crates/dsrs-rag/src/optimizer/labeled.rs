use bon::Builder;
use tracing::info;
use uuid::Uuid;

use crate::core::{Module, Optimizable, OptimizerError};
use crate::data::{Demonstration, Example, shuffle_and_sample};
use crate::evaluate::Metric;
use crate::optimizer::{CompileReport, Compiled, CompiledProgram, Optimizer, StepSummary};

/// Uses `k` sampled training examples, unchanged, as the demonstrations of
/// every step. The module is never run and the metric is unused.
#[derive(Builder, Debug, Clone)]
pub struct LabeledFewShot {
    #[builder(default = 16)]
    k: usize,
    #[builder(default = 0)]
    seed: u64,
}

impl Optimizer for LabeledFewShot {
    #[tracing::instrument(
        name = "dsrs.optimizer.labeled",
        level = "info",
        skip_all,
        fields(trainset = trainset.len(), k = self.k)
    )]
    async fn compile<M, Mt>(
        &self,
        mut module: M,
        trainset: &[Example],
        _metric: &Mt,
    ) -> Result<Compiled<M>, OptimizerError>
    where
        M: Module + Optimizable,
        Mt: Metric<M::Output>,
    {
        if trainset.is_empty() {
            return Err(OptimizerError::EmptyTrainset);
        }

        let sampled = shuffle_and_sample(trainset.to_vec(), Some(self.k), self.seed);
        let demos: Vec<Demonstration> = sampled.iter().map(Demonstration::from_example).collect();

        let mut steps = Vec::new();
        for (step_name, step) in module.parameters() {
            step.set_demos(demos.clone());
            steps.push(StepSummary {
                step_name,
                bootstrapped: 0,
                labeled: demos.len(),
            });
        }
        if steps.is_empty() {
            return Err(OptimizerError::NoPredictors);
        }

        let run_id = Uuid::new_v4();
        let program = CompiledProgram::capture(run_id, &mut module);
        info!(run_id = %run_id, demos = demos.len(), "labeled compile finished");

        Ok(Compiled {
            module,
            program,
            report: CompileReport {
                run_id,
                steps,
                ..CompileReport::default()
            },
        })
    }
}
