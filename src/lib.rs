//! Tollgate - Distributed Admission Control
//!
//! This crate decides whether a caller may consume capacity from a named,
//! shared token bucket. Bucket state lives in an external store that applies
//! each refill/consume transition atomically, so independent processes can
//! share one quota without sharing memory.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
