pub mod cli;
pub mod core;
pub mod modules;

// Re-export commonly used types
pub use core::config::Settings;
pub use core::copy::CopyEngine;
pub use core::error::{ImportError, ImportResult};
pub use core::intermediate::IntermediateDb;
pub use core::mapping::{IdMapping, MappingStore, MappingType};
pub use core::registry::StepRegistry;
pub use core::runner::{PipelineRunner, RunSummary};
pub use core::step::{CopyStep, StepDescriptor, TransformContext};
pub use core::value::{Row, Value};
