// The concurrent inference-and-annotate stage.

pub mod catalog;
pub mod orchestrator;
pub mod scan;
pub mod types;
pub mod worker;
