pub mod telemetry;
pub mod text;

pub use telemetry::{LogFormat, TelemetryInitError, init_tracing, init_tracing_with};
pub use text::truncate;
