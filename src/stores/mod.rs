//! The two [`ContextStore`](habit_context_core::store::ContextStore) lifecycles.

mod ephemeral;
mod persistent;

pub use ephemeral::EphemeralContextStore;
pub use persistent::PersistentContextStore;
