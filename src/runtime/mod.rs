pub mod host;
pub mod ssh;

pub use host::{ClusterHost, HostError};
pub use ssh::{SshHost, SshTarget};
