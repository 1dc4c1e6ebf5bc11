//! Data Transfer Objects for inter-service communication
//!
//! The producer and the dispatcher never talk directly; the message bodies
//! defined here are the only contract between them.

pub mod job;
