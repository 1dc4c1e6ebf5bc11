//! Service layer
//!
//! Services contain the dispatcher's business logic: deciding what happens
//! to each received message, and keeping count of those decisions.

mod dispatch;
mod stats;

pub use dispatch::Dispatcher;
pub use stats::{DispatchStats, StatsSnapshot};
