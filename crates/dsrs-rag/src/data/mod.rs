pub mod dataloader;
pub mod demonstration;
pub mod example;
pub mod hotpotqa;
pub mod prediction;

pub use dataloader::*;
pub use demonstration::*;
pub use example::*;
pub use hotpotqa::*;
pub use prediction::*;
