//! Crawlvisor - a supervisor for long-running crawl jobs.
//!
//! The supervisor launches each job as an OS process, tracks it until it
//! exits, enforces its timeout, and keeps a persisted status record plus a
//! bounded log tail per job. Crash-looping jobs are held back by a circuit
//! breaker, and runs orphaned by a supervisor restart are detected and
//! reaped.
//!
//! Architecture:
//! - `supervisor` owns the state and the background loops
//! - `db` persists status and logs (Postgres, with an in-memory fallback)
//! - `process` spawns, probes and signals OS processes
//! - `server` exposes the control API over HTTP; `cli` is a thin client for it

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod process;
pub mod server;
pub mod supervisor;
