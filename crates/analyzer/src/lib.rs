//! Sample planning, land-cover classification, report generator, and data sinks.

pub mod assess;
pub mod engine;
pub mod plan;
pub mod reporter;
pub mod sink;

pub use assess::assess;
pub use engine::ExposureEngine;
pub use plan::SamplePlan;
pub use reporter::Report;
