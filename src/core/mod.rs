//! Core rule-testing functionality
//!
//! - [`rules`]: Declared rule model and rule-file loading
//! - [`firewall`]: Applying and flushing rules with iptables
//! - [`traffic`]: Probing rules with hping3 and classifying the output
//! - [`validator`]: Comparing declared and observed actions
//! - [`results`]: Persisting the last validation run
//! - [`error`]: Error types

pub mod error;
pub mod firewall;
pub mod results;
pub mod rules;
pub mod traffic;
pub mod validator;

#[cfg(test)]
pub mod test_helpers;
