//! evo — wellness coaching chat client.
//!
//! DESIGN
//! ======
//! `state` holds plain models, `services` holds the conversation session
//! and the identity client, `llm` talks to the completion service. The
//! `evo` binary is a terminal front-end over these.

pub mod llm;
pub mod services;
pub mod state;
