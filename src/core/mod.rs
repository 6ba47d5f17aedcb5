//! Core translation engine module

pub mod anthropic;
pub mod backend;
pub mod client;
pub mod completeness;
pub mod config;
pub mod errors;
pub mod gemini;
pub mod models;
pub mod prompts;
pub mod retry;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
