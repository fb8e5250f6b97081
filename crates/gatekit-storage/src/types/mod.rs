//! Type definitions for gatekit storage.

mod ids;
mod preferences;
mod subscriptions;
mod users;

// Re-export all types from submodules
pub use ids::*;
pub use preferences::*;
pub use subscriptions::*;
pub use users::*;
