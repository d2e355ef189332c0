//! Director - desktop shell core
//!
//! Supervises the script backend process, exposes its API to the UI through
//! a readiness-gated local proxy, and drives round-based conversations
//! between the human participant and the AI characters.

pub mod api;
pub mod config;
pub mod conversation;
pub mod proxy;
pub mod readiness;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use state::AppState;
