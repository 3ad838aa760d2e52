//! Agent event vocabulary and backend adapters.
//!
//! Backends write newline-delimited JSON. Adapters translate each line into
//! the shared [`AgentEvent`] vocabulary, implementing a tolerant reader
//! pattern: unknown fields are ignored and unknown kinds are passed through as
//! [`AgentEvent::Unknown`].

mod backend;
mod parser;
mod types;

pub use backend::Backend;
pub use parser::{parse_line, parse_value};
pub use types::*;
