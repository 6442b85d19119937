//! Data Transfer Objects
//!
//! Payloads exchanged between the services and the persisted store, and
//! between the status API and its callers.

pub mod job;
