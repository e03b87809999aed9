use bon::Builder;
use futures::stream::{self, StreamExt};
use kdam::{BarExt, tqdm};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{EvaluateError, Module};
use crate::data::Example;
use crate::evaluate::{Metric, MetricOutcome};
use crate::utils::truncate;

/// One devset row: the prediction and its outcome, or why there is none.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluationRecord<O> {
    pub index: usize,
    pub example: Example,
    pub prediction: Option<O>,
    pub outcome: Option<MetricOutcome>,
    pub correct: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvaluationReport<O> {
    /// `correct / total`, in `[0, 1]`.
    pub score: f32,
    pub correct: usize,
    pub total: usize,
    /// Runs that failed in the pipeline or in the metric; they count as incorrect.
    pub errors: usize,
    /// In devset order.
    pub records: Vec<EvaluationRecord<O>>,
}

/// Scores a module on a devset as the fraction of examples whose metric
/// outcome passes every check.
///
/// Examples are independent runs; `num_threads > 1` runs that many
/// concurrently. A failed run is recorded and scored as incorrect. With
/// `max_errors` set, exceeding it aborts the evaluation.
#[derive(Builder)]
pub struct Evaluate {
    devset: Vec<Example>,
    #[builder(default = 1)]
    num_threads: usize,
    #[builder(default = false)]
    display_progress: bool,
    /// Number of leading rows to log once the run finishes.
    #[builder(default = 0)]
    display_table: usize,
    max_errors: Option<usize>,
}

impl Evaluate {
    pub fn devset(&self) -> &[Example] {
        &self.devset
    }

    #[tracing::instrument(
        name = "dsrs.evaluate",
        level = "info",
        skip_all,
        fields(devset = self.devset.len(), num_threads = self.num_threads)
    )]
    pub async fn evaluate<M, Mt>(
        &self,
        module: &M,
        metric: &Mt,
    ) -> Result<EvaluationReport<M::Output>, EvaluateError>
    where
        M: Module,
        Mt: Metric<M::Output>,
    {
        if self.devset.is_empty() {
            return Err(EvaluateError::EmptyDevset);
        }
        if self.num_threads == 0 {
            return Err(EvaluateError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }

        let total = self.devset.len();
        let mut pb = self
            .display_progress
            .then(|| tqdm!(total = total, desc = "Evaluating"));

        let mut runs = stream::iter(self.devset.iter().enumerate())
            .map(|(index, example)| async move { (index, example, module.call(example).await) })
            .buffer_unordered(self.num_threads);

        let mut records = Vec::with_capacity(total);
        let mut correct = 0;
        let mut errors = 0;

        while let Some((index, example, result)) = runs.next().await {
            let record = match result {
                Ok(prediction) => match metric.evaluate(example, &prediction, None) {
                    Ok(outcome) => EvaluationRecord {
                        index,
                        example: example.clone(),
                        correct: outcome.passes_all(),
                        prediction: Some(prediction),
                        outcome: Some(outcome),
                        error: None,
                    },
                    Err(err) => {
                        warn!(index, error = %err, "metric failed; counted as incorrect");
                        EvaluationRecord {
                            index,
                            example: example.clone(),
                            prediction: Some(prediction),
                            outcome: None,
                            correct: false,
                            error: Some(err.to_string()),
                        }
                    }
                },
                Err(err) => {
                    let message = format!("{:#}", anyhow::Error::new(err));
                    warn!(index, error = %message, "pipeline run failed; counted as incorrect");
                    EvaluationRecord {
                        index,
                        example: example.clone(),
                        prediction: None,
                        outcome: None,
                        correct: false,
                        error: Some(message),
                    }
                }
            };

            if record.correct {
                correct += 1;
            }
            if record.error.is_some() {
                errors += 1;
                if let Some(max_errors) = self.max_errors {
                    if errors > max_errors {
                        return Err(EvaluateError::TooManyErrors { errors, max_errors });
                    }
                }
            }
            records.push(record);

            if let Some(pb) = pb.as_mut() {
                pb.set_postfix(format!("correct={correct}/{}", records.len()));
                let _ = pb.update(1);
            }
        }

        records.sort_by_key(|record| record.index);
        let score = correct as f32 / total as f32;
        info!(correct, total, errors, score, "evaluation finished");

        for record in records.iter().take(self.display_table) {
            let prediction = record
                .prediction
                .as_ref()
                .and_then(|prediction| serde_json::to_string(prediction).ok())
                .unwrap_or_default();
            info!(
                index = record.index,
                question = truncate(record.example.get_str("question").unwrap_or_default(), 80),
                prediction = truncate(&prediction, 160),
                correct = record.correct,
                "evaluation row"
            );
        }

        Ok(EvaluationReport {
            score,
            correct,
            total,
            errors,
            records,
        })
    }
}
