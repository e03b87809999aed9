use indexmap::IndexMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::core::{
    DemoStep, LanguageModel, LmError, Module, Optimizable, PipelineError, PredictError,
    RetrievalError,
};
use crate::data::{Demonstration, Example, RagPrediction};
use crate::modules::{ContextQuestionInput, GenerateAnswer};
use crate::predictors::{ChainOfThought, Predict};
use crate::retrieve::Retriever;
use crate::trace::{StepKind, Trace};

pub const RETRIEVE_STEP: &str = "retrieve";
pub const GENERATE_STEP: &str = "generate_answer";

enum AnswerGenerator {
    Predict(Predict<GenerateAnswer>),
    ChainOfThought(ChainOfThought<GenerateAnswer>),
}

impl AnswerGenerator {
    /// Returns `(answer, rationale)`.
    async fn generate(
        &self,
        input: ContextQuestionInput,
        trace: &mut Trace,
    ) -> Result<(String, Option<String>), PredictError> {
        match self {
            Self::Predict(predict) => {
                let output = predict.forward(input, trace).await?;
                Ok((output.answer, None))
            }
            Self::ChainOfThought(cot) => {
                let output = cot.forward(input, trace).await?;
                Ok((output.output.answer, Some(output.rationale)))
            }
        }
    }

    fn step(&self) -> &dyn DemoStep {
        match self {
            Self::Predict(predict) => predict,
            Self::ChainOfThought(cot) => cot,
        }
    }

    fn step_mut(&mut self) -> &mut dyn DemoStep {
        match self {
            Self::Predict(predict) => predict,
            Self::ChainOfThought(cot) => cot,
        }
    }
}

/// Two-step retrieval-augmented QA: `retrieve(question)` then
/// `generate_answer(context, question)`.
///
/// Each step makes exactly one collaborator call bounded by `call_timeout`.
/// Nothing is retried here; failures surface as [`PipelineError::Retrieval`]
/// or [`PipelineError::Generation`].
pub struct Rag {
    retriever: Arc<dyn Retriever>,
    generate_answer: AnswerGenerator,
    num_passages: usize,
    call_timeout: Duration,
}

#[bon::bon]
impl Rag {
    #[builder]
    pub fn new(
        retriever: Arc<dyn Retriever>,
        lm: Arc<dyn LanguageModel>,
        #[builder(default = 3)] num_passages: usize,
        #[builder(default = Duration::from_secs(30))] call_timeout: Duration,
        #[builder(default = true)] chain_of_thought: bool,
        #[builder(into)] instruction: Option<String>,
    ) -> Self {
        let generate_answer = if chain_of_thought {
            AnswerGenerator::ChainOfThought(
                ChainOfThought::builder()
                    .name(GENERATE_STEP)
                    .lm(lm)
                    .maybe_instruction(instruction)
                    .build(),
            )
        } else {
            AnswerGenerator::Predict(
                Predict::builder()
                    .name(GENERATE_STEP)
                    .lm(lm)
                    .maybe_instruction(instruction)
                    .build(),
            )
        };

        Self {
            retriever,
            generate_answer,
            num_passages,
            call_timeout,
        }
    }
}

impl Rag {
    pub fn num_passages(&self) -> usize {
        self.num_passages
    }

    pub fn chain_of_thought(&self) -> bool {
        matches!(self.generate_answer, AnswerGenerator::ChainOfThought(_))
    }

    /// Demonstrations currently injected into the generation step.
    pub fn demos(&self) -> &[Demonstration] {
        self.generate_answer.step().demos()
    }

    pub async fn run(&self, question: &str) -> Result<RagPrediction, PipelineError> {
        let mut trace = Trace::default();
        self.run_traced(question, &mut trace).await
    }

    #[tracing::instrument(
        name = "dsrs.rag",
        level = "debug",
        skip(self, trace),
        fields(k = self.num_passages, demos = self.demos().len())
    )]
    pub async fn run_traced(
        &self,
        question: &str,
        trace: &mut Trace,
    ) -> Result<RagPrediction, PipelineError> {
        let context = timeout(
            self.call_timeout,
            self.retriever.retrieve(question, self.num_passages),
        )
        .await
        .map_err(|_| RetrievalError::Timeout {
            after: self.call_timeout,
        })??;
        debug!(passages = context.len(), "context retrieved");

        trace.record(
            RETRIEVE_STEP,
            StepKind::Retrieve,
            IndexMap::from([
                ("query".to_string(), json!(question)),
                ("k".to_string(), json!(self.num_passages)),
            ]),
            IndexMap::from([("passages".to_string(), json!(context))]),
        );

        let input = ContextQuestionInput {
            context: context.clone(),
            question: question.to_string(),
        };
        let (answer, rationale) = timeout(
            self.call_timeout,
            self.generate_answer.generate(input, trace),
        )
        .await
        .map_err(|_| PredictError::from(LmError::Timeout {
            after: self.call_timeout,
        }))??;

        Ok(RagPrediction {
            context,
            answer,
            rationale,
        })
    }
}

impl Module for Rag {
    type Output = RagPrediction;

    async fn forward(&self, example: &Example, trace: &mut Trace) -> Result<RagPrediction, PipelineError> {
        let inputs = example.inputs();
        let question = inputs
            .get_str("question")
            .ok_or_else(|| PipelineError::MissingInput {
                field: "question".to_string(),
            })?;
        self.run_traced(question, trace).await
    }
}

impl Optimizable for Rag {
    fn parameters(&mut self) -> IndexMap<String, &mut dyn DemoStep> {
        let mut parameters: IndexMap<String, &mut dyn DemoStep> = IndexMap::new();
        parameters.insert(GENERATE_STEP.to_string(), self.generate_answer.step_mut());
        parameters
    }
}
