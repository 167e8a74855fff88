pub mod use_cases;

pub use use_cases::pipeline::{Pipeline, PipelineSettings, RunControl};
