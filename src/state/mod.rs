//! Client-side state models.
//!
//! DESIGN
//! ======
//! State is split by domain (`auth`, `chat`, `ui`) so the session and the
//! front-end can depend on small focused models. None of it is persisted.

pub mod auth;
pub mod chat;
pub mod ui;
