use indexmap::IndexMap;
use serde::Serialize;

use crate::core::PipelineError;
use crate::data::{Demonstration, Example};
use crate::trace::Trace;

/// A runnable program: one or more retrieval/generation steps over an [`Example`].
///
/// `forward` appends every step it executes to `trace`; callers that don't care
/// about the trace use [`call`](Module::call).
#[allow(async_fn_in_trait)]
pub trait Module: Send + Sync {
    type Output: Clone + Send + Sync + Serialize;

    async fn forward(
        &self,
        example: &Example,
        trace: &mut Trace,
    ) -> Result<Self::Output, PipelineError>;

    async fn call(&self, example: &Example) -> Result<Self::Output, PipelineError> {
        let mut trace = Trace::default();
        self.forward(example, &mut trace).await
    }
}

/// A generation step whose few-shot demonstrations can be replaced.
pub trait DemoStep: Send + Sync {
    fn name(&self) -> &str;
    fn demos(&self) -> &[Demonstration];
    fn set_demos(&mut self, demos: Vec<Demonstration>);
}

/// Exposes a module's generation steps to optimizers, keyed by step name.
///
/// Compiled programs deliberately don't implement this, so their
/// demonstrations can't change after compilation.
pub trait Optimizable {
    fn parameters(&mut self) -> IndexMap<String, &mut dyn DemoStep>;
}
