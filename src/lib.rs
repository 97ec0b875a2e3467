//! fwprobe - Automated Firewall Rule Tester
//!
//! Checks that a declared set of firewall rules matches what the firewall
//! actually does: rules are applied with iptables, each one is probed with
//! a single hping3 packet, and declared and observed verdicts are compared
//! and rendered into an HTML report.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, iptables application, probing, comparison
//! - [`report`] - HTML report rendering
//! - [`session`] - Mode dispatch for the command line
//! - [`elevation`] - Privilege escalation for iptables and hping3
//! - [`audit`] - Audit logging for all privileged operations
//! - [`config`] - Configuration defaults
//! - [`logging`] - Log output setup
//! - [`utils`] - XDG directories

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod logging;
pub mod report;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use crate::core::error::{Error, Result};
pub use crate::core::rules::{Action, Direction, Protocol, Rule};
