//! Command scripts: fixed, ordered command sequences for one intent.
//!
//! The device grammar is fixed; the commands below must match it literally.

use crate::error::ConfigError;

/// Hostname written back when the resource is deleted.
pub const DEFAULT_HOSTNAME: &str = "TEST-FABRIC-ENGINE";

/// Read-only command reporting the system name.
pub const SHOW_SYS_INFO: &str = "show sys-info";

/// One command plus the label used when it cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    /// Text written to the remote shell (without line terminator).
    pub command: String,

    /// Human-readable action, rendered as "Failed to {label}".
    pub label: String,
}

impl ScriptStep {
    /// Create a step from a command line and its failure label.
    pub fn new(command: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            label: label.into(),
        }
    }
}

/// An immutable, named sequence of steps, executed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    name: String,
    steps: Vec<ScriptStep>,
}

impl CommandScript {
    /// Start building a script.
    pub fn builder(name: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// `enable`, `configure terminal`, `sys name <hostname>`, `exit`,
    /// `save config`, `exit`.
    pub fn set_hostname(hostname: &str) -> Result<Self, ConfigError> {
        validate_hostname(hostname)?;
        Ok(Self::sys_name_sequence("set hostname", hostname))
    }

    /// The set-hostname sequence with [`DEFAULT_HOSTNAME`].
    pub fn reset_hostname() -> Self {
        Self::sys_name_sequence("reset hostname", DEFAULT_HOSTNAME)
    }

    /// Interactive query: `enable`, `show sys-info`, `exit`.
    pub fn query_hostname() -> Self {
        Self::builder("query hostname")
            .step("enable", "send 'enable'")
            .step(SHOW_SYS_INFO, "send 'show sys-info'")
            .step("exit", "exit session")
            .build()
    }

    fn sys_name_sequence(name: &str, hostname: &str) -> Self {
        Self::builder(name)
            .step("enable", "send 'enable'")
            .step("configure terminal", "send 'configure terminal'")
            .step(format!("sys name {}", hostname), "set hostname")
            .step("exit", "exit configuration mode")
            .step("save config", "save configuration")
            .step("exit", "exit session")
            .build()
    }

    /// Script name, used in log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in send order.
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Command texts in send order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.command.as_str())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the script sends nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for [`CommandScript`].
#[derive(Debug)]
pub struct ScriptBuilder {
    name: String,
    steps: Vec<ScriptStep>,
}

impl ScriptBuilder {
    /// Append a step.
    pub fn step(mut self, command: impl Into<String>, label: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::new(command, label));
        self
    }

    /// Finish the script.
    pub fn build(self) -> CommandScript {
        CommandScript {
            name: self.name,
            steps: self.steps,
        }
    }
}

/// Check that a hostname can be sent as the single token of `sys name`.
pub fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    let reason = if hostname.is_empty() {
        Some("hostname cannot be empty")
    } else if hostname.chars().any(char::is_whitespace) {
        Some("hostname cannot contain whitespace")
    } else if hostname.chars().any(char::is_control) {
        Some("hostname cannot contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidHostname {
            value: hostname.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_hostname_sequence() {
        let script = CommandScript::set_hostname("LAB-VOSS02").unwrap();
        assert_eq!(script.name(), "set hostname");
        assert_eq!(
            script.commands().collect::<Vec<_>>(),
            vec![
                "enable",
                "configure terminal",
                "sys name LAB-VOSS02",
                "exit",
                "save config",
                "exit",
            ]
        );
        assert_eq!(script.steps()[2].label, "set hostname");
    }

    #[test]
    fn test_reset_uses_default_literal() {
        let script = CommandScript::reset_hostname();
        assert_eq!(script.len(), 6);
        assert_eq!(script.steps()[2].command, "sys name TEST-FABRIC-ENGINE");
    }

    #[test]
    fn test_query_sequence() {
        let script = CommandScript::query_hostname();
        assert_eq!(
            script.commands().collect::<Vec<_>>(),
            vec!["enable", "show sys-info", "exit"]
        );
    }

    #[test]
    fn test_rejects_hostname_that_would_split_the_command() {
        assert!(CommandScript::set_hostname("").is_err());
        assert!(CommandScript::set_hostname("LAB VOSS").is_err());
        assert!(CommandScript::set_hostname("LAB\nsave config").is_err());
        assert!(validate_hostname("LAB-VOSS01").is_ok());
    }

    #[test]
    fn test_builder() {
        let script = CommandScript::builder("custom")
            .step("enable", "send 'enable'")
            .build();
        assert_eq!(script.len(), 1);
        assert!(!script.is_empty());
        assert!(CommandScript::builder("empty").build().is_empty());
    }
}
