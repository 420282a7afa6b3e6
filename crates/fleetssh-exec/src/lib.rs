//! fleetssh-exec: Per-host transport abstraction
//!
//! Provides the `Transport` trait used by the fan-out engine, with
//! implementations for SSH (russh + SFTP) and the local machine.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod shell;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeyError, KeySource, ResolvedKey};
pub use local::LocalTransport;
pub use result::{Auth, CommandResult, ConnectionInfo, RemoteFile};
pub use ssh::{SshTransport, SshTransportBuilder};
pub use traits::Transport;
