//! Process spawning, probing and termination utilities.
//!
//! Everything here is job-agnostic: it knows about pids, process trees and
//! output streams, not about job names or persisted state.

pub mod probe;
mod spawn;
pub mod tree;

pub use probe::Identity;
pub use spawn::{spawn, OutputStream, ProcessOptions, SpawnedProcess};
pub use tree::ProcessTree;
