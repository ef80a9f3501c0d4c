//! Behaviour behind the chat and auth screens.
//!
//! ARCHITECTURE
//! ============
//! `conversation` owns the message log and the request lifecycle;
//! `identity` owns sign-in. They do not depend on each other; the
//! front-end wires them together through routing.

pub mod conversation;
pub mod identity;
