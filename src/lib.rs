//! Trialscope: natural-language questions over the ClinicalTrials.gov registry.
//!
//! A language model picks one of four registry queries, the queries run
//! against the registry's REST API, their results are flattened into compact
//! JSON, and the model composes the final answer from them.

pub mod agent;
pub mod config;
pub mod inference;
pub mod tools;
pub mod trials;
pub mod types;
