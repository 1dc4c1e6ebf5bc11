//! Scheduler layer for the dispatcher
//!
//! This layer receives batches from the queue, hands them to the dispatch
//! service and commits the outcomes. It also owns the shutdown plumbing
//! shared by the workers and the health endpoint.

pub mod poller;
pub mod shutdown;

pub use poller::BatchPoller;
