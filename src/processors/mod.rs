//! Document processing pipeline

pub mod assembler;
pub mod chunker;
pub mod orchestrator;
pub mod text;
