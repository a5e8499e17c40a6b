//! Everything that talks to, or interprets output of, the rclone binary.

mod cache;
mod client;
mod remote;
mod size;

pub use cache::RemoteTypeCache;
pub use client::{DEFAULT_RCLONE_PATH, DEFAULT_TIMEOUT, RcloneClient, RemoteInfo, UNKNOWN_TYPE};
pub use remote::{InvalidRemote, MAX_REMOTE_NAME_LENGTH, RemoteIdentifier};
pub use size::{ParseError, ProbeResult, parse_size_output};
