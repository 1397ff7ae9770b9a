//! Game logic: cards, state, and the turn machine.
//!
//! Everything in here is pure in-memory state with no transport
//! awareness; the network layer drives it and fans out the results.

pub mod card;
pub mod engine;
pub mod events;
pub mod state;
