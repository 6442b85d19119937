//! Sluice Core
//!
//! Core types shared by the sluice services.
//!
//! This crate contains:
//! - Domain types: requests, job variants, replicas, tracked jobs, batches
//!   and job descriptions
//! - DTOs: payloads exchanged with the status API
//! - The pipeline error taxonomy

pub mod domain;
pub mod dto;
pub mod error;

pub use error::{PipelineError, Result};
