//! Core domain types
//!
//! These types describe a request as it moves through the pipeline: parsed
//! from a request file, expanded into variants, rendered into a description
//! and finally persisted and tracked as a job.

pub mod batch;
pub mod description;
pub mod job;
pub mod replica;
pub mod request;
pub mod variant;
