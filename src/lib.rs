//! Quality-assured EVP and business analysis.
//!
//! `Pipeline::analyze` resolves a company's identity and industry, extracts
//! IR figures with provenance, cross-checks them, then writes the narrative
//! and scores the result.

pub mod app;
pub mod model;
pub mod retriever;
pub mod service;

pub use model::{AnalysisReport, Config};
pub use service::{Pipeline, PipelineError};
