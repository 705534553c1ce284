//! Registry of log-triggered actions.
//!
//! Actions are configured as a mapping from an event selector to one or more
//! action specs:
//!
//! ```text
//! "warning:HTTP 403"  -> "abort"
//! "error"             -> ["status |= 1", "wait 2.5"]
//! "*:challenge"       -> "flag download=stop"
//! ```
//!
//! The selector is `<level>[:<regex>]`; an empty level or `*` applies to the
//! four standard levels. "Before" actions run ahead of the log event and may
//! rewrite its level or mutate the [`JobContext`]; "after" actions run once
//! the event was emitted and may sleep, print, run a command, or raise a
//! [`ControlError`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::flags::FlagKind;
use super::{ControlError, JobContext, Level};
use crate::config::units::DurationSpec;

#[allow(clippy::expect_used)]
static STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([&|^=])=?\s*(\d+)").expect("status action regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(file|post|child|download)(?:\s*[= ]\s*(.+))?$")
        .expect("flag action regex is valid") // Static pattern, safe to panic
});

/// Errors in action configuration.
#[derive(Debug, Error)]
pub enum ActionSpecError {
    /// The action type is not recognized.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The action type is known but its arguments are malformed.
    #[error("invalid arguments for '{action}' action: '{args}'")]
    InvalidArguments {
        /// Action type.
        action: &'static str,
        /// The rejected argument string.
        args: String,
    },

    /// The level part of a selector is neither a name nor a number.
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    /// The pattern part of a selector is not a valid regex.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// The flag names a stage this downloader never polls.
    #[error("flag '{0}' is not supported; only 'file' and 'download' flags are polled")]
    UnsupportedFlag(String),

    /// The value for a selector is not a string or a list of strings.
    #[error("actions for '{0}' must be a string or a list of strings")]
    InvalidSpec(String),
}

/// Operator of a `status` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOp {
    And,
    Or,
    Xor,
    Set,
}

impl StatusOp {
    fn apply(self, current: u32, value: u32) -> u32 {
        match self {
            Self::And => current & value,
            Self::Or => current | value,
            Self::Xor => current ^ value,
            Self::Set => value,
        }
    }
}

/// A single configured action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Rewrite the effective level of the log event.
    SetLevel(Level),
    /// Combine the job status bitmask with a value.
    Status { op: StatusOp, value: u32 },
    /// Set a cooperative flag.
    Flag { kind: FlagKind, value: String },
    /// Print a line to stdout.
    Print(String),
    /// Run a shell command and wait for it.
    Exec(String),
    /// Sleep, or wait for Enter when no duration is given.
    Wait(Option<DurationSpec>),
    /// Stop the current resource.
    Abort,
    /// Terminate the job.
    Terminate,
    /// Restart the job.
    Restart,
    /// Exit the process.
    Exit(i32),
    /// Raise a named condition.
    Raise { name: String, message: String },
}

impl Action {
    /// Parses a `<type> <args>` action spec.
    ///
    /// # Errors
    ///
    /// Returns [`ActionSpecError`] for unknown types and malformed arguments.
    pub fn parse(spec: &str) -> Result<Self, ActionSpecError> {
        let spec = spec.trim();
        let (kind, args) = spec.split_once(' ').unwrap_or((spec, ""));

        match kind {
            "abort" => Ok(Self::Abort),
            "terminate" => Ok(Self::Terminate),
            "restart" => Ok(Self::Restart),
            "print" => Ok(Self::Print(args.to_string())),
            "exec" => Ok(Self::Exec(args.to_string())),
            "exit" => {
                let args = args.trim();
                if args.is_empty() {
                    return Ok(Self::Exit(0));
                }
                args.parse()
                    .map(Self::Exit)
                    .map_err(|_| ActionSpecError::InvalidArguments {
                        action: "exit",
                        args: args.to_string(),
                    })
            }
            "level" => {
                let name = args.trim_start_matches([' ', '~', '=']);
                Level::parse(name)
                    .map(Self::SetLevel)
                    .ok_or_else(|| ActionSpecError::InvalidLevel(name.to_string()))
            }
            "status" => {
                let invalid = || ActionSpecError::InvalidArguments {
                    action: "status",
                    args: args.to_string(),
                };
                let captures = STATUS_PATTERN.captures(args).ok_or_else(invalid)?;
                let op = match &captures[1] {
                    "&" => StatusOp::And,
                    "|" => StatusOp::Or,
                    "^" => StatusOp::Xor,
                    _ => StatusOp::Set,
                };
                let value = captures[2].parse().map_err(|_| invalid())?;
                Ok(Self::Status { op, value })
            }
            "flag" => {
                let invalid = || ActionSpecError::InvalidArguments {
                    action: "flag",
                    args: args.to_string(),
                };
                let captures = FLAG_PATTERN.captures(args.trim()).ok_or_else(invalid)?;
                let kind = captures[1]
                    .parse()
                    .map_err(|_| ActionSpecError::UnsupportedFlag(captures[1].to_lowercase()))?;
                let value = captures
                    .get(2)
                    .map_or_else(|| "stop".to_string(), |m| m.as_str().trim().to_lowercase());
                Ok(Self::Flag { kind, value })
            }
            "wait" => {
                let args = args.trim();
                if args.is_empty() {
                    return Ok(Self::Wait(None));
                }
                DurationSpec::parse(args)
                    .map(|spec| Self::Wait(Some(spec)))
                    .ok_or_else(|| ActionSpecError::InvalidArguments {
                        action: "wait",
                        args: args.to_string(),
                    })
            }
            "raise" => {
                let (name, message) = args.trim().split_once(' ').unwrap_or((args.trim(), ""));
                Ok(Self::Raise {
                    name: name.to_string(),
                    message: message.to_string(),
                })
            }
            other => Err(ActionSpecError::UnknownAction(other.to_string())),
        }
    }

    /// Returns true for actions that run before the log event is emitted.
    #[must_use]
    pub fn runs_before(&self) -> bool {
        matches!(
            self,
            Self::SetLevel(_) | Self::Status { .. } | Self::Flag { .. }
        )
    }
}

#[derive(Debug)]
struct Rule {
    pattern: Option<Regex>,
    actions: Vec<Action>,
}

impl Rule {
    fn matches(&self, message: &str) -> bool {
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(message))
    }
}

/// Scratch state for one log call, seen by "before" actions.
#[derive(Debug)]
pub struct CallContext<'a> {
    /// Effective level of the event; "before" actions may change it.
    pub level: Level,
    /// The job the event belongs to.
    pub job: &'a mut JobContext,
}

/// Mapping from `(level, pattern)` to ordered action lists.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    before: HashMap<Level, Vec<Rule>>,
    after: HashMap<Level, Vec<Rule>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from the `actions` object of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ActionSpecError`] for malformed selectors or specs.
    pub fn from_config(actions: &serde_json::Map<String, Value>) -> Result<Self, ActionSpecError> {
        let mut registry = Self::new();
        for (event, spec) in actions {
            registry.add(event, &spec_list(event, spec)?)?;
        }
        Ok(registry)
    }

    /// Registers `specs` for the `<level>[:<regex>]` selector `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionSpecError`] for malformed selectors or specs.
    pub fn add(&mut self, event: &str, specs: &[&str]) -> Result<(), ActionSpecError> {
        let (level, pattern) = event.split_once(':').unwrap_or((event, ""));
        let pattern = if pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(pattern).map_err(|source| ActionSpecError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?,
            )
        };

        let mut before = Vec::new();
        let mut after = Vec::new();
        for spec in specs {
            let action = Action::parse(spec)?;
            if action.runs_before() {
                before.push(action);
            } else {
                after.push(action);
            }
        }

        let level = level.trim();
        let levels = if level.is_empty() || level == "*" {
            Level::STANDARD.to_vec()
        } else {
            vec![Level::parse(level).ok_or_else(|| ActionSpecError::InvalidLevel(level.into()))?]
        };

        for level in levels {
            if !before.is_empty() {
                self.before.entry(level).or_default().push(Rule {
                    pattern: pattern.clone(),
                    actions: before.clone(),
                });
            }
            if !after.is_empty() {
                self.after.entry(level).or_default().push(Rule {
                    pattern: pattern.clone(),
                    actions: after.clone(),
                });
            }
        }
        debug!(event, count = specs.len(), "registered log actions");
        Ok(())
    }

    /// Returns true when no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Runs matching "before" actions for an event at `level`.
    pub fn apply_before(&self, level: Level, message: &str, call: &mut CallContext<'_>) {
        let Some(rules) = self.before.get(&level) else {
            return;
        };
        for rule in rules.iter().filter(|rule| rule.matches(message)) {
            for action in &rule.actions {
                match action {
                    Action::SetLevel(new_level) => call.level = *new_level,
                    Action::Status { op, value } => {
                        call.job.status = op.apply(call.job.status, *value);
                    }
                    Action::Flag { kind, value } => call.job.flags.set(*kind, value.clone()),
                    _ => {}
                }
            }
        }
    }

    /// Runs matching "after" actions for an event at `level`.
    ///
    /// # Errors
    ///
    /// Returns the [`ControlError`] raised by the first `abort`, `terminate`,
    /// `restart`, `exit`, or `raise` action reached.
    pub async fn apply_after(&self, level: Level, message: &str) -> Result<(), ControlError> {
        let Some(rules) = self.after.get(&level) else {
            return Ok(());
        };
        for rule in rules.iter().filter(|rule| rule.matches(message)) {
            for action in &rule.actions {
                run_after_action(action).await?;
            }
        }
        Ok(())
    }
}

/// Actions bound to one process signal, "before" actions first.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBinding {
    /// Signal name as configured, e.g. `SIGUSR1`.
    pub name: String,
    /// Actions to run on every delivery.
    pub actions: Vec<Action>,
}

/// Parses the `signals` object of the configuration file.
///
/// Each key is a signal name and each value a spec or a list of specs, as in
/// `actions`. Signal names are resolved only when listeners are installed.
///
/// # Errors
///
/// Returns [`ActionSpecError`] for malformed specs.
pub fn signal_bindings(
    signals: &serde_json::Map<String, Value>,
) -> Result<Vec<SignalBinding>, ActionSpecError> {
    signals
        .iter()
        .map(|(name, spec)| {
            let mut actions = spec_list(name, spec)?
                .into_iter()
                .map(Action::parse)
                .collect::<Result<Vec<_>, _>>()?;
            actions.sort_by_key(|action| !action.runs_before());
            Ok(SignalBinding {
                name: name.clone(),
                actions,
            })
        })
        .collect()
}

fn spec_list<'a>(event: &str, spec: &'a Value) -> Result<Vec<&'a str>, ActionSpecError> {
    match spec {
        Value::String(single) => Ok(vec![single.as_str()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| ActionSpecError::InvalidSpec(event.to_string()))
            })
            .collect(),
        _ => Err(ActionSpecError::InvalidSpec(event.to_string())),
    }
}

pub(super) async fn run_after_action(action: &Action) -> Result<(), ControlError> {
    match action {
        Action::Print(text) => println!("{text}"),
        Action::Exec(command) => run_command(command).await,
        Action::Wait(Some(spec)) => tokio::time::sleep(spec.sample()).await,
        Action::Wait(None) => wait_for_enter().await,
        Action::Abort => return Err(ControlError::Stop),
        Action::Terminate => return Err(ControlError::Terminate),
        Action::Restart => return Err(ControlError::Restart),
        Action::Exit(code) => return Err(ControlError::Exit(*code)),
        Action::Raise { name, message } => return Err(ControlError::from_name(name, message)),
        Action::SetLevel(_) | Action::Status { .. } | Action::Flag { .. } => {}
    }
    Ok(())
}

async fn run_command(command: &str) {
    #[cfg(windows)]
    let mut process = {
        let mut process = tokio::process::Command::new("cmd");
        process.arg("/C").arg(command);
        process
    };
    #[cfg(not(windows))]
    let mut process = {
        let mut process = tokio::process::Command::new("sh");
        process.arg("-c").arg(command);
        process
    };

    match process.status().await {
        Ok(status) if !status.success() => {
            debug!(command, ?status, "action command exited unsuccessfully");
        }
        Ok(_) => {}
        Err(error) => warn!(command, %error, "failed to run action command"),
    }
}

async fn wait_for_enter() {
    let prompt = tokio::task::spawn_blocking(|| {
        use std::io::{BufRead, Write};
        print!("Press Enter to continue");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
    });
    if let Err(error) = prompt.await {
        debug!(%error, "interactive wait was interrupted");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_control_actions() {
        assert_eq!(Action::parse("abort").unwrap(), Action::Abort);
        assert_eq!(Action::parse("terminate").unwrap(), Action::Terminate);
        assert_eq!(Action::parse("restart").unwrap(), Action::Restart);
        assert_eq!(Action::parse("exit 3").unwrap(), Action::Exit(3));
        assert_eq!(Action::parse("exit").unwrap(), Action::Exit(0));
    }

    #[test]
    fn test_parse_status_operators() {
        assert_eq!(
            Action::parse("status |= 4").unwrap(),
            Action::Status {
                op: StatusOp::Or,
                value: 4
            }
        );
        assert_eq!(
            Action::parse("status &=1").unwrap(),
            Action::Status {
                op: StatusOp::And,
                value: 1
            }
        );
        assert_eq!(
            Action::parse("status = 0").unwrap(),
            Action::Status {
                op: StatusOp::Set,
                value: 0
            }
        );
        assert!(Action::parse("status += 1").is_err());
    }

    #[test]
    fn test_parse_flag_defaults_to_stop() {
        assert_eq!(
            Action::parse("flag download").unwrap(),
            Action::Flag {
                kind: FlagKind::Download,
                value: "stop".into()
            }
        );
        assert_eq!(
            Action::parse("flag FILE = Terminate").unwrap(),
            Action::Flag {
                kind: FlagKind::File,
                value: "terminate".into()
            }
        );
        assert!(Action::parse("flag nothing").is_err());
    }

    #[test]
    fn test_parse_flag_rejects_unpolled_stages() {
        assert!(matches!(
            Action::parse("flag post=terminate"),
            Err(ActionSpecError::UnsupportedFlag(name)) if name == "post"
        ));
        let error = Action::parse("flag Child").unwrap_err();
        assert!(error.to_string().contains("flag 'child' is not supported"));
    }

    #[test]
    fn test_parse_level_and_wait() {
        assert_eq!(
            Action::parse("level ~debug").unwrap(),
            Action::SetLevel(Level::DEBUG)
        );
        assert_eq!(Action::parse("wait").unwrap(), Action::Wait(None));
        assert!(matches!(Action::parse("wait 1-2").unwrap(), Action::Wait(Some(_))));
        assert!(Action::parse("wait forever").is_err());
    }

    #[test]
    fn test_parse_unknown_action_rejected() {
        assert!(matches!(
            Action::parse("explode now"),
            Err(ActionSpecError::UnknownAction(name)) if name == "explode"
        ));
    }

    #[test]
    fn test_signal_bindings_order_before_actions_first() {
        let signals = json!({
            "SIGUSR1": ["print paused", "flag download=stop", "wait 1"],
            "SIGUSR2": "terminate",
        });
        let bindings = signal_bindings(signals.as_object().unwrap()).unwrap();

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, "SIGUSR1");
        assert_eq!(
            bindings[0].actions[0],
            Action::Flag {
                kind: FlagKind::Download,
                value: "stop".into()
            }
        );
        assert_eq!(bindings[0].actions[1], Action::Print("paused".into()));
        assert!(matches!(bindings[0].actions[2], Action::Wait(Some(_))));
        assert_eq!(bindings[1].actions, vec![Action::Terminate]);
    }

    #[test]
    fn test_signal_bindings_reject_malformed_specs() {
        let signals = json!({"SIGUSR1": 5});
        assert!(matches!(
            signal_bindings(signals.as_object().unwrap()),
            Err(ActionSpecError::InvalidSpec(name)) if name == "SIGUSR1"
        ));

        let signals = json!({"SIGHUP": ["flag post"]});
        assert!(matches!(
            signal_bindings(signals.as_object().unwrap()),
            Err(ActionSpecError::UnsupportedFlag(_))
        ));
    }

    #[test]
    fn test_before_actions_mutate_call_context() {
        let mut registry = ActionRegistry::new();
        registry
            .add("warning:404", &["status |= 4", "level info"])
            .unwrap();

        let mut job = JobContext::default();
        let mut call = CallContext {
            level: Level::WARNING,
            job: &mut job,
        };
        registry.apply_before(Level::WARNING, "'404 Not Found' for 'x'", &mut call);
        assert_eq!(call.level, Level::INFO);
        assert_eq!(job.status, 4);
    }

    #[test]
    fn test_pattern_must_match() {
        let mut registry = ActionRegistry::new();
        registry.add("warning:^HTTP", &["status |= 1"]).unwrap();

        let mut job = JobContext::default();
        let mut call = CallContext {
            level: Level::WARNING,
            job: &mut job,
        };
        registry.apply_before(Level::WARNING, "unrelated", &mut call);
        assert_eq!(job.status, 0);
    }

    #[test]
    fn test_wildcard_level_registers_all_standard_levels() {
        let mut registry = ActionRegistry::new();
        registry.add("*", &["status ^= 2"]).unwrap();

        let mut job = JobContext::default();
        for level in Level::STANDARD {
            let mut call = CallContext {
                level,
                job: &mut job,
            };
            registry.apply_before(level, "anything", &mut call);
        }
        assert_eq!(job.status, 0, "four xors cancel out");
    }

    #[tokio::test]
    async fn test_after_actions_raise_control_errors() {
        let mut registry = ActionRegistry::new();
        registry.add("error", &["abort"]).unwrap();
        registry.add("warning:restart me", &["restart"]).unwrap();

        assert_eq!(
            registry.apply_after(Level::ERROR, "boom").await,
            Err(ControlError::Stop)
        );
        assert_eq!(
            registry.apply_after(Level::WARNING, "please restart me").await,
            Err(ControlError::Restart)
        );
        assert_eq!(registry.apply_after(Level::WARNING, "fine").await, Ok(()));
    }

    #[test]
    fn test_from_config_accepts_strings_and_lists() {
        let config = json!({
            "warning": "abort",
            "error:fatal": ["status |= 1", "terminate"],
        });
        let registry = ActionRegistry::from_config(config.as_object().unwrap()).unwrap();
        assert!(!registry.is_empty());

        let bad = json!({ "warning": 5 });
        assert!(matches!(
            ActionRegistry::from_config(bad.as_object().unwrap()),
            Err(ActionSpecError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut registry = ActionRegistry::new();
        assert!(matches!(
            registry.add("warning:(", &["abort"]),
            Err(ActionSpecError::InvalidPattern { .. })
        ));
    }
}
