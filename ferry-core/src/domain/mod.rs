//! Core domain types
//!
//! This module contains the core domain structures used across Ferry services.
//! They are shared between the producer (which creates jobs) and the
//! dispatcher (which turns them into task launches).

pub mod idempotency;
pub mod job;
pub mod launch;
pub mod outcome;
