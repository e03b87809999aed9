pub mod cot;
pub mod predict;

pub use cot::*;
pub use predict::*;
