//! Peyk — a multi-tenant school chatbot relay.
//!
//! Each school runs its own bot on Bale and/or Eitaa. Peyk receives their
//! webhook updates, resolves the sending chat to a user and school, fetches
//! that school's bot token, streams the question through the AI backend,
//! and relays the answer back to the chat — without ever surfacing an
//! error to the chat platform.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod types;

pub mod ai;
pub mod audit;
pub mod credentials;
pub mod identity;
pub mod platforms;

pub mod gateway;
pub mod relay;
