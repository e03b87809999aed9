use bon::Builder;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::ChatAdapter;
use crate::core::{
    DemoStep, LanguageModel, Module, Optimizable, PipelineError, PredictError, Signature,
    SignatureSchema, from_fields, to_fields,
};
use crate::data::{Demonstration, Example};
use crate::trace::{StepKind, Trace};
use crate::utils::truncate;

/// A single generation step: one LM call for signature `S`.
///
/// Demonstrations are rendered as prior user/assistant turns ahead of the live
/// inputs; with no demonstrations the call is zero-shot.
#[derive(Builder)]
pub struct Predict<S: Signature> {
    /// Step name used in traces and compiled programs.
    #[builder(into, default = "predict".to_string())]
    name: String,
    lm: Arc<dyn LanguageModel>,
    /// Overrides the signature's instruction.
    #[builder(into)]
    instruction: Option<String>,
    #[builder(default)]
    demos: Vec<Demonstration>,
    #[builder(default)]
    adapter: ChatAdapter,
    #[builder(skip)]
    _signature: PhantomData<fn() -> S>,
}

impl<S: Signature> Predict<S> {
    pub fn schema(&self) -> SignatureSchema {
        let schema = SignatureSchema::of::<S>();
        match &self.instruction {
            Some(instruction) => schema.with_instruction(instruction.clone()),
            None => schema,
        }
    }

    pub fn instruction(&self) -> String {
        self.schema().instruction
    }

    /// Runs one LM call against `schema` and decodes the parsed fields into `O`.
    ///
    /// The step's input bindings and parsed output bindings are appended to `trace`.
    #[tracing::instrument(
        name = "dsrs.predict",
        level = "debug",
        skip_all,
        fields(step = %self.name, demos = self.demos.len())
    )]
    pub(crate) async fn run_schema<O: DeserializeOwned>(
        &self,
        schema: &SignatureSchema,
        input: &S::Input,
        trace: &mut Trace,
    ) -> Result<O, PredictError> {
        let inputs = to_fields(input).map_err(|source| PredictError::Conversion { source })?;
        let chat = self.adapter.format(schema, &self.demos, &inputs);

        let response = self.lm.call(chat).await?;
        let content = response.output.content();

        let outputs = self
            .adapter
            .parse_response(schema, content)
            .map_err(|source| PredictError::Parse {
                source,
                raw_response: content.to_string(),
            })?;
        debug!(output = truncate(content, 120), "generation step parsed");

        trace.record(self.name.clone(), StepKind::Generate, inputs, outputs.clone());
        from_fields(outputs).map_err(|source| PredictError::Conversion { source })
    }

    pub async fn forward(&self, input: S::Input, trace: &mut Trace) -> Result<S::Output, PredictError> {
        self.run_schema(&self.schema(), &input, trace).await
    }

    pub async fn call(&self, input: S::Input) -> Result<S::Output, PredictError> {
        let mut trace = Trace::default();
        self.forward(input, &mut trace).await
    }
}

/// Reads `S::Input` from the example's input fields.
pub(crate) fn signature_input<S: Signature>(example: &Example) -> Result<S::Input, PipelineError> {
    let inputs = example.inputs();
    let mut fields = IndexMap::new();
    for field in S::input_fields() {
        let Some(value) = inputs.get(field.name) else {
            return Err(PipelineError::MissingInput {
                field: field.name.to_string(),
            });
        };
        fields.insert(field.name.to_string(), value.clone());
    }
    from_fields(fields).map_err(|source| PredictError::Conversion { source }.into())
}

impl<S: Signature> DemoStep for Predict<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn demos(&self) -> &[Demonstration] {
        &self.demos
    }

    fn set_demos(&mut self, demos: Vec<Demonstration>) {
        self.demos = demos;
    }
}

impl<S: Signature> Module for Predict<S> {
    type Output = S::Output;

    async fn forward(&self, example: &Example, trace: &mut Trace) -> Result<S::Output, PipelineError> {
        let input = signature_input::<S>(example)?;
        Ok(Predict::forward(self, input, trace).await?)
    }
}

impl<S: Signature> Optimizable for Predict<S> {
    fn parameters(&mut self) -> IndexMap<String, &mut dyn DemoStep> {
        let mut parameters: IndexMap<String, &mut dyn DemoStep> = IndexMap::new();
        parameters.insert(self.name.clone(), self);
        parameters
    }
}
