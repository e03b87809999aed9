pub mod rag;
pub mod signatures;

pub use rag::*;
pub use signatures::*;
