//! `helpme` capability server (library surface).
//!
//! The primary entrypoint is the `helpme` binary (MCP stdio server + CLI). The modules are
//! public so the dispatcher and capability registry can be embedded elsewhere.

pub mod capabilities;
pub mod config;
pub mod descriptors;
pub mod dispatch;
pub mod envelope;
pub mod guard;
pub mod logging;
pub mod session;
pub mod supersede;

#[cfg(feature = "stdio")]
pub mod mcp;
