//! AI analysis pipeline for Sheetwise
//!
//! This crate turns a dataset plus a natural-language question into a
//! chat-completion call, extracts chart specifications from the answer,
//! and settles the reported token usage against the user's quota.

pub mod bridge;
pub mod chart;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod providers;


pub use bridge::*;
pub use chart::{ChartData, ChartType, DataPoint, Series, VisualizationSpec};
pub use config::{AnalysisConfig, ProviderKind};
pub use error::{AnalysisError, CompletionError, ErrorKind, ProtocolFailure};
pub use orchestrator::{AnalysisOutcome, AnalysisReport, AnalysisService, Stage};
pub use parser::extract_visualization;
pub use prompt::PromptBuilder;
