use crate::elevation::ElevationError;
use thiserror::Error;

/// Core error types for fwprobe
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rules file could not be read or parsed
    #[error("Failed to load rules file {path}: {message}")]
    RuleFile { path: String, message: String },

    /// iptables command execution failed
    #[error("iptables error: {message}")]
    Iptables {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Traffic generator could not be run for a rule
    #[error("Traffic probe failed for rule {rule_id}: {message}")]
    Probe { rule_id: u32, message: String },

    /// Configuration file exists but cannot be used
    #[error("Invalid config file {path}: {message}")]
    Config { path: String, message: String },

    /// Rule set failed a consistency check
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] ElevationError),

    /// Report template could not be compiled
    #[error("Report template error: {0}")]
    Template(String),

    /// Report template could not be rendered
    #[error("Report render error: {0}")]
    Render(#[from] handlebars::RenderError),

    /// Persisted validation run is unusable
    #[error("Results error: {0}")]
    Results(#[from] ResultsError),
}

impl Error {
    /// Returns a user-facing translation for errors coming from external tools.
    pub fn translation(&self) -> Option<ErrorTranslation> {
        match self {
            Error::Iptables { message, stderr, .. } => Some(IptablesErrorPattern::match_error(
                stderr.as_deref().unwrap_or(message),
            )),
            Error::Elevation(e) => Some(
                ErrorTranslation::new("Unable to run the tool with root privileges")
                    .with_suggestion(e.to_string())
                    .with_suggestion("Run as root, or set FWPROBE_ELEVATION_METHOD=sudo"),
            ),
            Error::Results(_) => Some(
                ErrorTranslation::new("The saved validation run cannot be trusted")
                    .with_suggestion("Run --validate-rules to produce a fresh run"),
            ),
            _ => None,
        }
    }
}

/// Errors loading the persisted last validation run
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Results file corrupted: invalid structure")]
    Corrupted,

    #[error("Results checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Results format version mismatch: found v{found}, expected v{expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of iptables error patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Permission errors
        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run fwprobe as root or allow sudo for iptables")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available")
                .with_help("https://man7.org/linux/man-pages/man8/iptables.8.html");
        }

        // xtables lock held by another process
        if lower.contains("xtables lock") {
            return ErrorTranslation::new("Firewall is locked by another process")
                .with_suggestion("Another process is modifying iptables")
                .with_suggestion("Wait a moment and try again")
                .with_suggestion(
                    "Check for conflicting firewall managers: sudo systemctl status firewalld ufw",
                );
        }

        // Kernel table unavailable
        if lower.contains("can't initialize iptables table")
            || lower.contains("table does not exist")
        {
            return ErrorTranslation::new("The iptables kernel table is not available")
                .with_suggestion("Load the kernel module: sudo modprobe ip_tables")
                .with_suggestion("On nftables-only systems install iptables-nft")
                .with_help("https://wiki.archlinux.org/title/Iptables");
        }

        // Missing iptables
        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S iptables  (Arch)");
        }

        // Chain errors
        if lower.contains("no chain/target/match by that name")
            || (lower.contains("chain") && lower.contains("does not exist"))
        {
            return ErrorTranslation::new("Firewall chain or target not found")
                .with_suggestion("Rules are appended to the INPUT and OUTPUT chains of the filter table")
                .with_suggestion("Verify the filter table exists: sudo iptables -L");
        }

        // Port/protocol mismatches
        if lower.contains("unknown option") && lower.contains("dport") {
            return ErrorTranslation::new("Port match not supported for this protocol")
                .with_suggestion("Only TCP and UDP rules can match a destination port");
        }

        if lower.contains("invalid port") || (lower.contains("port") && lower.contains("range")) {
            return ErrorTranslation::new("Invalid port")
                .with_suggestion("Port numbers must be between 0 and 65535");
        }

        if lower.contains("unknown protocol") {
            return ErrorTranslation::new("Unknown protocol")
                .with_suggestion("Supported protocols are tcp, udp and icmp");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -L")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
