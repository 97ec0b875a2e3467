//! Privilege elevation for system operations
//!
//! Both external tools fwprobe drives need root:
//!
//! - **iptables**: applying and flushing rules
//! - **hping3**: crafting raw probe packets
//!
//! # Elevation Strategy
//!
//! - **Root**: tools run directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **Non-interactive fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `FWPROBE_ELEVATION_METHOD`: Force a specific elevation method (`sudo`, `run0`, or `pkexec`).
//!   Useful for scripts with sudoers NOPASSWD rules.
//!   Example: `FWPROBE_ELEVATION_METHOD=sudo fwprobe --validate-rules`
//! - `FWPROBE_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//! - `FWPROBE_IPTABLES_COMMAND` / `FWPROBE_HPING3_COMMAND`: Replace the tool
//!   binary, e.g. with a mock script.
//!
//! # Security
//!
//! - Only the two tool binaries can be elevated
//! - Commands are constructed without shell interpolation
//! - Audit logging tracks privileged operations (via caller)
//!
//! # Example
//!
//! ```no_run
//! use fwprobe::elevation::create_elevated_iptables_command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cmd = create_elevated_iptables_command(&["-L", "-n"])?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use std::ffi::OsStr;
use std::io;
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `FWPROBE_ELEVATION_METHOD`
    #[error("Invalid FWPROBE_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// External tools that may be run with elevated privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Iptables,
    Hping3,
}

impl Tool {
    /// Default binary name looked up in PATH
    pub const fn binary(self) -> &'static str {
        match self {
            Tool::Iptables => "iptables",
            Tool::Hping3 => "hping3",
        }
    }

    const fn override_var(self) -> &'static str {
        match self {
            Tool::Iptables => "FWPROBE_IPTABLES_COMMAND",
            Tool::Hping3 => "FWPROBE_HPING3_COMMAND",
        }
    }

    /// Program to execute, honoring the per-tool override variable
    pub fn program(self) -> String {
        std::env::var(self.override_var())
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.binary().to_string())
    }

    /// Renders a command line for display (dry-run output, logs)
    pub fn command_line<S: AsRef<str>>(self, args: &[S]) -> String {
        let mut line = self.binary().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg.as_ref());
        }
        line
    }
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrap<S: AsRef<OsStr>>(elevator: &str, program: &str, args: &[S]) -> Command {
    let mut cmd = Command::new(elevator);
    cmd.arg(program).args(args);
    cmd
}

/// Internal helper to build an elevated command for a specific tool.
///
/// Not exposed publicly - callers use the per-tool functions so only
/// approved binaries can be elevated.
fn build_elevated_command<S: AsRef<OsStr>>(
    tool: Tool,
    args: &[S],
) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    let program = tool.program();

    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var("FWPROBE_TEST_NO_ELEVATION").is_ok() {
        let mut cmd = Command::new(&program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 2. Direct Root Execution (No prompt needed)
    if nix::unistd::getuid().is_root() {
        let mut cmd = Command::new(&program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 3. Explicit elevation method override
    if let Ok(method) = std::env::var("FWPROBE_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if !binary_exists(&method) {
                        return Err(ElevationError::MethodNotAvailable(method));
                    }
                    Ok(wrap(&method, &program, args))
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // 4. Automatic detection - prefer run0 (no SUID), fallback to sudo/pkexec
    if binary_exists("run0") {
        return Ok(wrap("run0", &program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);

    if is_atty {
        Ok(wrap("sudo", &program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrap("pkexec", &program, args))
    }
}

/// Creates an elevated `iptables` command with the specified arguments
///
/// Arguments are passed directly without shell interpretation.
///
/// # Errors
///
/// Returns `Err(ElevationError)` if no usable elevation method is available.
pub fn create_elevated_iptables_command<S: AsRef<OsStr>>(
    args: &[S],
) -> Result<Command, ElevationError> {
    build_elevated_command(Tool::Iptables, args)
}

/// Creates an elevated `hping3` command with the specified arguments
///
/// hping3 needs raw sockets, so it is elevated the same way as iptables.
///
/// # Errors
///
/// Returns `Err(ElevationError)` if no usable elevation method is available.
pub fn create_elevated_hping3_command<S: AsRef<OsStr>>(
    args: &[S],
) -> Result<Command, ElevationError> {
    build_elevated_command(Tool::Hping3, args)
}
