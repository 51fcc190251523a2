//! Offline-first synchronization of owner-scoped records.
//!
//! Every user mutation lands in the local [`EntityStore`] first and is
//! pushed to the backend afterwards; server listings are merged back in.

mod background;
mod coordinator;
mod engine;
mod gateway;
mod identity;
mod in_flight;
mod record;
mod retry;
mod scheduler;
mod status;
mod store;

pub use background::*;
pub use coordinator::*;
pub use engine::*;
pub use gateway::*;
pub use identity::*;
pub use in_flight::*;
pub use record::*;
pub use retry::*;
pub use scheduler::*;
pub use status::*;
pub use store::*;

#[cfg(test)]
pub(crate) mod testing;
