//! Console command safety filter
//!
//! Rejects destructive or injection-prone console commands before they reach
//! the engine. A rejection is a local `COMMAND_BLOCKED` failure.

use crate::error::{RelayError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Commands that terminate, crash, or stall the engine
const DANGEROUS_COMMANDS: &[&str] = &[
    "quit",
    "exit",
    "kill",
    "crash",
    "r.gpucrash",
    "r.crash",
    "debug crash",
    "forcecrash",
    "debug break",
    "assert false",
    "check(false)",
    "viewmode visualizebuffer basecolor",
    "viewmode visualizebuffer worldnormal",
    "buildpaths",
    "rebuildnavigation",
    "obj garbage",
    "obj list",
    "memreport",
    "delete",
    "destroy",
];

/// Substrings that indicate shell or Python injection
const FORBIDDEN_TOKENS: &[&str] = &[
    "del ",
    "format ",
    "shutdown",
    "reboot",
    "rmdir",
    "mklink",
    "start \"",
    "system(",
    "import os",
    "import subprocess",
    "subprocess.",
    "os.system",
    "exec(",
    "eval(",
    "__import__",
    "import sys",
    "import importlib",
    "with open",
    "open(",
    "write(",
    "read(",
];

/// Shell verbs blocked only in first position; "transform" must not match "rm"
const FORBIDDEN_FIRST_WORDS: &[&str] = &["rm", "copy", "move"];

static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    DANGEROUS_COMMANDS
        .iter()
        .filter_map(|cmd| Regex::new(&format!(r"(?i)(?:^|\s){}(?:\s|$)", regex::escape(cmd))).ok())
        .collect()
});

static PYTHON_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)^py(?:\s|$)").ok());

/// Validates console commands for the textual command channel
pub struct CommandFilter;

impl CommandFilter {
    /// Reject `command` if it matches the blocklist
    pub fn validate(command: &str) -> Result<()> {
        match Self::violation(command) {
            Some(reason) => {
                warn!("Blocked console command {:?}: {}", command, reason);
                Err(RelayError::command_blocked(reason))
            }
            None => Ok(()),
        }
    }

    /// Human-readable reason `command` is unsafe, if it is
    pub fn violation(command: &str) -> Option<String> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Some("Console command must be a non-empty string".to_string());
        }
        if trimmed.contains('\n') || trimmed.contains('\r') {
            return Some("Multi-line console commands are not allowed. Send one command per call.".to_string());
        }

        let lower = trimmed.to_lowercase();
        if PYTHON_PREFIX.as_ref().map_or(false, |re| re.is_match(&lower)) {
            return Some("Python console commands are blocked".to_string());
        }
        if DANGEROUS_PATTERNS.iter().any(|re| re.is_match(&lower)) {
            return Some(format!("Dangerous command blocked: {}", trimmed));
        }
        if lower.contains("&&") || lower.contains("||") {
            return Some("Command chaining with && or || is blocked".to_string());
        }
        if trimmed.contains(';') {
            return Some("Command chaining with ; is blocked".to_string());
        }
        if trimmed.contains('|') {
            return Some("Command piping with | is blocked".to_string());
        }
        if let Some(token) = FORBIDDEN_TOKENS.iter().find(|t| lower.contains(*t)) {
            return Some(format!("Command contains unsafe token {:?}", token.trim()));
        }
        let first = lower.split_whitespace().next().unwrap_or_default();
        if FORBIDDEN_FIRST_WORDS.contains(&first) {
            return Some(format!("Shell command '{}' is blocked", first));
        }
        if trimmed.contains('`') {
            return Some("Backtick characters are blocked".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn blocks_termination_and_crash_triggers() {
        for command in ["quit", "EXIT", "r.GPUCrash", "debug crash", "obj garbage now", "check(false)"] {
            let err = CommandFilter::validate(command).unwrap_err();
            assert_eq!(err.code(), ErrorCode::CommandBlocked, "{}", command);
        }
    }

    #[test]
    fn word_boundaries_avoid_false_positives() {
        assert!(CommandFilter::validate("show exitmenu").is_ok());
        assert!(CommandFilter::validate("stat fps").is_ok());
        assert!(CommandFilter::validate("r.ScreenPercentage 75").is_ok());
        assert!(CommandFilter::validate("transform actor").is_ok());
    }

    #[test]
    fn blocks_chaining_and_injection() {
        assert!(CommandFilter::validate("stat fps && quit").is_err());
        assert!(CommandFilter::validate("stat fps; stat unit").is_err());
        assert!(CommandFilter::validate("stat fps | more").is_err());
        assert!(CommandFilter::validate("py import os").is_err());
        assert!(CommandFilter::validate("rm -rf /").is_err());
        assert!(CommandFilter::validate("echo `whoami`").is_err());
        assert!(CommandFilter::validate("stat fps\nquit").is_err());
        assert!(CommandFilter::validate("   ").is_err());
    }
}
