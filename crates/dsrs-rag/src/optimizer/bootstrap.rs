use bon::Builder;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use kdam::{BarExt, tqdm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{Module, Optimizable, OptimizerError};
use crate::data::{Demonstration, Example};
use crate::evaluate::{Metric, MetricOutcome};
use crate::optimizer::{
    CompileReport, Compiled, CompiledProgram, Optimizer, SkippedExample, StepSummary,
};
use crate::trace::Trace;

/// Greedy bootstrap of few-shot demonstrations.
///
/// The module is run on the training set in order. Each run whose prediction
/// passes the metric contributes the actual inputs and outputs of every
/// generation step it executed. Collection stops once
/// `max_bootstrapped_demos` runs have passed. Each step then keeps its first
/// `max_bootstrapped_demos` candidates by training-set index.
///
/// Runs that fail, in the pipeline or in the metric, are logged and skipped.
/// A step that ends with no candidates keeps zero demonstrations and runs
/// zero-shot.
#[derive(Builder, Debug, Clone)]
pub struct BootstrapFewShot {
    /// Quota of passing runs, and the cap on bootstrapped demos per step.
    #[builder(default = 4)]
    max_bootstrapped_demos: usize,
    /// Raw labeled examples topped up after the bootstrapped ones.
    #[builder(default = 0)]
    max_labeled_demos: usize,
    /// Only these named checks must pass, instead of all of them. A name the
    /// metric never emits fails the compile with `InvalidConfig`.
    required_checks: Option<Vec<String>>,
    /// Valid iff `outcome.score() >= metric_threshold`, instead of all checks passing.
    metric_threshold: Option<f32>,
    #[builder(default = 1)]
    num_threads: usize,
    /// Abort once more than this many runs have failed.
    max_errors: Option<usize>,
    #[builder(default = false)]
    display_progress: bool,
    /// Seeds the sampling of labeled demos.
    #[builder(default = 0)]
    seed: u64,
}

/// Result of running the module on one training example.
enum Attempt {
    Passed(Trace),
    Rejected,
    Failed(String),
    /// The metric emitted none of some `required_checks` names.
    Unchecked(Vec<String>),
}

impl BootstrapFewShot {
    fn validate(&self, trainset: &[Example]) -> Result<(), OptimizerError> {
        if trainset.is_empty() {
            return Err(OptimizerError::EmptyTrainset);
        }
        if self.num_threads == 0 {
            return Err(OptimizerError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        if self.required_checks.is_some() && self.metric_threshold.is_some() {
            return Err(OptimizerError::InvalidConfig(
                "set either required_checks or metric_threshold, not both".to_string(),
            ));
        }
        if let Some(checks) = &self.required_checks {
            if checks.is_empty() {
                return Err(OptimizerError::InvalidConfig(
                    "required_checks must name at least one check".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `Err` carries the required check names the outcome doesn't contain.
    fn is_valid(&self, outcome: &MetricOutcome) -> Result<bool, Vec<String>> {
        if let Some(threshold) = self.metric_threshold {
            return Ok(outcome.score() >= threshold);
        }
        match &self.required_checks {
            Some(checks) => {
                let names: Vec<&str> = checks.iter().map(String::as_str).collect();
                let missing = outcome.missing(&names);
                if !missing.is_empty() {
                    return Err(missing.into_iter().map(str::to_string).collect());
                }
                Ok(outcome.passes(&names))
            }
            None => Ok(outcome.passes_all()),
        }
    }

    async fn attempt<M, Mt>(&self, module: &M, metric: &Mt, example: &Example) -> Attempt
    where
        M: Module,
        Mt: Metric<M::Output>,
    {
        let mut trace = Trace::new();
        let prediction = match module.forward(example, &mut trace).await {
            Ok(prediction) => prediction,
            Err(err) => return Attempt::Failed(format!("{:#}", anyhow::Error::new(err))),
        };
        match metric.evaluate(example, &prediction, Some(&trace)) {
            Ok(outcome) => match self.is_valid(&outcome) {
                Ok(true) => Attempt::Passed(trace),
                Ok(false) => Attempt::Rejected,
                Err(missing) => Attempt::Unchecked(missing),
            },
            Err(err) => Attempt::Failed(err.to_string()),
        }
    }

    /// Runs the module over `trainset` until the quota of passing runs is met.
    ///
    /// Returns the passing traces sorted by training index.
    async fn bootstrap<M, Mt>(
        &self,
        module: &M,
        trainset: &[Example],
        metric: &Mt,
        report: &mut CompileReport,
    ) -> Result<Vec<(usize, Trace)>, OptimizerError>
    where
        M: Module,
        Mt: Metric<M::Output>,
    {
        let quota = self.max_bootstrapped_demos;
        let mut passed: Vec<(usize, Trace)> = Vec::new();
        if quota == 0 {
            return Ok(passed);
        }

        let found = AtomicUsize::new(0);
        let mut pb = self
            .display_progress
            .then(|| tqdm!(total = trainset.len(), desc = "Bootstrapping"));

        let mut attempts = stream::iter(trainset.iter().enumerate())
            .map(|(index, example)| {
                let found = &found;
                async move {
                    // Workers started after the quota was met don't run at all.
                    if found.load(Ordering::SeqCst) >= quota {
                        return (index, None);
                    }
                    let attempt = self.attempt(module, metric, example).await;
                    if matches!(attempt, Attempt::Passed(_)) {
                        found.fetch_add(1, Ordering::SeqCst);
                    }
                    (index, Some(attempt))
                }
            })
            .buffer_unordered(self.num_threads);

        while let Some((index, attempt)) = attempts.next().await {
            if let Some(pb) = pb.as_mut() {
                let _ = pb.update(1);
            }
            let Some(attempt) = attempt else {
                continue;
            };

            report.attempted += 1;
            match attempt {
                Attempt::Passed(trace) => {
                    debug!(index, steps = trace.len(), "bootstrap passed");
                    passed.push((index, trace));
                }
                Attempt::Rejected => debug!(index, "bootstrap rejected by metric"),
                Attempt::Unchecked(missing) => {
                    return Err(OptimizerError::InvalidConfig(format!(
                        "required_checks {missing:?} are not emitted by the metric"
                    )));
                }
                Attempt::Failed(reason) => {
                    warn!(index, error = %reason, "skipping training example");
                    report.skipped.push(SkippedExample { index, reason });
                    if let Some(max_errors) = self.max_errors {
                        if report.skipped.len() > max_errors {
                            return Err(OptimizerError::TooManyErrors {
                                errors: report.skipped.len(),
                                max_errors,
                            });
                        }
                    }
                }
            }

            if passed.len() >= quota {
                break;
            }
        }

        passed.sort_by_key(|(index, _)| *index);
        report.bootstrapped = passed.len();
        report.skipped.sort_by_key(|skipped| skipped.index);
        Ok(passed)
    }

    /// Raw demos for one step, drawn from examples that were not bootstrapped.
    fn labeled_demos(
        &self,
        trainset: &[Example],
        bootstrapped: &HashSet<usize>,
        slots: usize,
    ) -> Vec<Demonstration> {
        if slots == 0 {
            return vec![];
        }
        let mut raw: Vec<&Example> = trainset
            .iter()
            .enumerate()
            .filter(|(index, _)| !bootstrapped.contains(index))
            .map(|(_, example)| example)
            .collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        raw.shuffle(&mut rng);
        raw.into_iter()
            .take(slots)
            .map(Demonstration::from_example)
            .collect()
    }
}

impl Optimizer for BootstrapFewShot {
    #[tracing::instrument(
        name = "dsrs.optimizer.bootstrap",
        level = "info",
        skip_all,
        fields(
            trainset = trainset.len(),
            max_bootstrapped_demos = self.max_bootstrapped_demos,
            num_threads = self.num_threads
        )
    )]
    async fn compile<M, Mt>(
        &self,
        mut module: M,
        trainset: &[Example],
        metric: &Mt,
    ) -> Result<Compiled<M>, OptimizerError>
    where
        M: Module + Optimizable,
        Mt: Metric<M::Output>,
    {
        self.validate(trainset)?;
        let step_names: Vec<String> = module.parameters().keys().cloned().collect();
        if step_names.is_empty() {
            return Err(OptimizerError::NoPredictors);
        }

        let run_id = Uuid::new_v4();
        let mut report = CompileReport {
            run_id,
            ..CompileReport::default()
        };

        let passed = self.bootstrap(&module, trainset, metric, &mut report).await?;
        let bootstrapped_indices: HashSet<usize> = passed.iter().map(|(index, _)| *index).collect();

        let mut candidates: IndexMap<String, Vec<Demonstration>> = step_names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for (_, trace) in &passed {
            for step in trace.generation_steps() {
                if let Some(pool) = candidates.get_mut(&step.step_name) {
                    pool.push(Demonstration::from_step(step));
                }
            }
        }

        {
            let mut parameters = module.parameters();
            for (step_name, mut demos) in candidates {
                demos.truncate(self.max_bootstrapped_demos);
                let bootstrapped = demos.len();

                let slots = self.max_labeled_demos.saturating_sub(bootstrapped);
                demos.extend(self.labeled_demos(trainset, &bootstrapped_indices, slots));
                let labeled = demos.len() - bootstrapped;

                if demos.is_empty() {
                    warn!(step = %step_name, "no valid bootstraps; step stays zero-shot");
                    report
                        .warnings
                        .push(format!("step `{step_name}` has no demonstrations and runs zero-shot"));
                }

                if let Some(step) = parameters.get_mut(&step_name) {
                    step.set_demos(demos);
                }
                report.steps.push(StepSummary {
                    step_name,
                    bootstrapped,
                    labeled,
                });
            }
        }

        let program = CompiledProgram::capture(run_id, &mut module);
        info!(
            run_id = %run_id,
            attempted = report.attempted,
            bootstrapped = report.bootstrapped,
            skipped = report.skipped.len(),
            "bootstrap compile finished"
        );

        Ok(Compiled {
            module,
            program,
            report,
        })
    }
}
