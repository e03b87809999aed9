use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

use crate::adapter::ChatAdapter;
use crate::core::{
    DemoStep, FieldSpec, LanguageModel, Module, Optimizable, PipelineError, PredictError,
    Signature, SignatureSchema,
};
use crate::data::{Demonstration, Example, HasAnswer};
use crate::predictors::{Predict, signature_input};
use crate::trace::Trace;

pub const RATIONALE: FieldSpec = FieldSpec::new(
    "rationale",
    "Let's think step by step in order to produce the answer.",
);

/// Signature output preceded by the model's reasoning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WithRationale<O> {
    pub rationale: String,
    #[serde(flatten)]
    pub output: O,
}

impl<O> Deref for WithRationale<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.output
    }
}

impl<O: HasAnswer> HasAnswer for WithRationale<O> {
    fn answer(&self) -> &str {
        self.output.answer()
    }
}

/// [`Predict`] with a `rationale` output field inserted ahead of the
/// signature's own outputs.
pub struct ChainOfThought<S: Signature> {
    predictor: Predict<S>,
}

#[bon::bon]
impl<S: Signature> ChainOfThought<S> {
    #[builder]
    pub fn new(
        #[builder(into, default = "chain_of_thought".to_string())] name: String,
        lm: Arc<dyn LanguageModel>,
        #[builder(into)] instruction: Option<String>,
        #[builder(default)] demos: Vec<Demonstration>,
        #[builder(default)] adapter: ChatAdapter,
    ) -> Self {
        let predictor = Predict::builder()
            .name(name)
            .lm(lm)
            .maybe_instruction(instruction)
            .demos(demos)
            .adapter(adapter)
            .build();
        Self { predictor }
    }
}

impl<S: Signature> ChainOfThought<S> {
    pub fn from_predict(predictor: Predict<S>) -> Self {
        Self { predictor }
    }

    pub fn schema(&self) -> SignatureSchema {
        self.predictor.schema().prepend_output(RATIONALE)
    }

    pub async fn forward(
        &self,
        input: S::Input,
        trace: &mut Trace,
    ) -> Result<WithRationale<S::Output>, PredictError> {
        self.predictor
            .run_schema(&self.schema(), &input, trace)
            .await
    }

    pub async fn call(&self, input: S::Input) -> Result<WithRationale<S::Output>, PredictError> {
        let mut trace = Trace::default();
        self.forward(input, &mut trace).await
    }
}

impl<S: Signature> DemoStep for ChainOfThought<S> {
    fn name(&self) -> &str {
        self.predictor.name()
    }

    fn demos(&self) -> &[Demonstration] {
        self.predictor.demos()
    }

    fn set_demos(&mut self, demos: Vec<Demonstration>) {
        self.predictor.set_demos(demos);
    }
}

impl<S: Signature> Module for ChainOfThought<S> {
    type Output = WithRationale<S::Output>;

    async fn forward(&self, example: &Example, trace: &mut Trace) -> Result<Self::Output, PipelineError> {
        let input = signature_input::<S>(example)?;
        Ok(ChainOfThought::forward(self, input, trace).await?)
    }
}

impl<S: Signature> Optimizable for ChainOfThought<S> {
    fn parameters(&mut self) -> IndexMap<String, &mut dyn DemoStep> {
        let mut parameters: IndexMap<String, &mut dyn DemoStep> = IndexMap::new();
        parameters.insert(self.predictor.name().to_string(), self);
        parameters
    }
}
