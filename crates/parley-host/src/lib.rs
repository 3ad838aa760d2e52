//! Parley Host Library
//!
//! Host-process side of the permission negotiation protocol:
//! - Permission broker serving the exchange directory and a local socket
//! - Decision memory and per-workspace dialog routing
//! - Terminal fallback dialogs
//! - Session state and streaming transcript assembly

pub mod assembler;
pub mod console;
pub mod permission;
pub mod session;
