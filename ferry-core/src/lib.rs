//! Ferry Core
//!
//! Core types and abstractions for the Ferry job dispatch bridge.
//!
//! This crate contains:
//! - Domain types: jobs, launch requests, delivery outcomes, idempotency tokens
//! - DTOs: the versioned queue message format

pub mod domain;
pub mod dto;
