//! Parley Core Library
//!
//! Shared functionality for the Parley host and agent processes:
//! - Exchange directory contract, record payloads and transport frames
//! - Permission vocabulary and parameter-scoped memory keys
//! - Path extraction and containment checks
//! - Agent event vocabulary and backend adapters
//! - Configuration resolution and hierarchy
//! - Common error types and tracing setup

pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod frame;
pub mod paths;
pub mod permissions;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{ExchangeDir, RequestKind};
pub use frame::{RequestFrame, ResponseFrame};
pub use permissions::{PermissionDecision, PermissionMode};
