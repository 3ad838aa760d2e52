//! Parley Agent Library
//!
//! Agent-process side of the permission negotiation protocol:
//! - Path pre-checks that deny system paths and pull temp paths into the project
//! - Request channels over the exchange directory or a local socket
//! - The request emitter, which fails closed on every error path

pub mod channel;
pub mod emitter;
pub mod error;
pub mod guard;

pub use channel::{AnyChannel, FileChannel, RequestChannel};
#[cfg(unix)]
pub use channel::SocketChannel;
pub use emitter::{PermissionOutcome, RequestEmitter};
pub use error::EmitterError;
pub use guard::{PathGuard, Rewrite};
