//! Flow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating flows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Action, Trigger, Flow, Job)
//! - [`parser`]: Action factory and job loading
//! - [`validator`]: Structural validation rules

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Action, ActionKind, Flow, Job, Trigger, TriggerKind};
pub use parser::{build_action, build_flow, load_job_document, parse_job};
pub use validator::validate_flow;
