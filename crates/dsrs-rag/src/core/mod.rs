mod errors;
pub mod lm;
pub mod module;
pub mod signature;

pub use errors::{
    ErrorClass, EvaluateError, LmError, MetricError, OptimizerError, ParseError, PipelineError,
    PredictError, RetrievalError,
};
pub use lm::*;
pub use module::*;
pub use signature::*;
