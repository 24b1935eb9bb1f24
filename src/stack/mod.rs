//! Container stack lifecycle wrapper
//!
//! Thin orchestration convenience over the host's `docker compose` /
//! `docker-compose` CLI: bring the stack up, wait for the designated
//! service to exit, tear the stack down, and surface the captured exit
//! code. All orchestration semantics belong to the external tool.

pub mod command;
pub mod runner;

pub use command::ComposeCommand;
pub use runner::{StackRunner, DEFAULT_SERVICE};
