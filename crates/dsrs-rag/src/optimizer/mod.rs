//! Few-shot optimizers.
//!
//! An [`Optimizer`] takes ownership of an uncompiled module, fills the
//! demonstrations of each of its generation steps, and hands back a
//! [`Compiled`] wrapper. The wrapper runs the module but no longer exposes its
//! steps, so the selected demonstrations are frozen.

pub mod bootstrap;
pub mod compiled;
pub mod labeled;

pub use bootstrap::*;
pub use compiled::*;
pub use labeled::*;

use crate::core::{Module, Optimizable, OptimizerError};
use crate::data::Example;
use crate::evaluate::Metric;

#[allow(async_fn_in_trait)]
pub trait Optimizer {
    async fn compile<M, Mt>(
        &self,
        module: M,
        trainset: &[Example],
        metric: &Mt,
    ) -> Result<Compiled<M>, OptimizerError>
    where
        M: Module + Optimizable,
        Mt: Metric<M::Output>;
}
