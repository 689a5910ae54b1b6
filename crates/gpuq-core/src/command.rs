//! Control commands read from drop-in command files
//!
//! A command file is a JSON object. Each recognized key carries a list of
//! strings, and one file may carry any subset of the keys:
//!
//! ```json
//! { "enqueue_tail": ["train.py", "eval.py"], "add_exempt": ["4242"] }
//! ```
//!
//! Keys are applied in [`COMMAND_PRECEDENCE`] order, whatever order they
//! appear in the file. Unknown keys are ignored.

use serde::{Deserialize, Serialize};

/// Kinds of control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    AddExempt,
    RemoveExempt,
    ReadQueue,
    EnqueueTail,
    EnqueueHead,
    DequeueByName,
    SetBackgroundMode,
    ShowHelp,
    RequestExit,
}

/// Order in which the kinds of one batch are applied
pub const COMMAND_PRECEDENCE: [CommandKind; 9] = [
    CommandKind::AddExempt,
    CommandKind::RemoveExempt,
    CommandKind::ReadQueue,
    CommandKind::EnqueueTail,
    CommandKind::EnqueueHead,
    CommandKind::DequeueByName,
    CommandKind::SetBackgroundMode,
    CommandKind::ShowHelp,
    CommandKind::RequestExit,
];

impl CommandKind {
    /// Position of this kind in [`COMMAND_PRECEDENCE`]
    pub fn precedence(self) -> usize {
        COMMAND_PRECEDENCE
            .iter()
            .position(|k| *k == self)
            .unwrap_or(COMMAND_PRECEDENCE.len())
    }

    /// Key used for this kind in a command file
    pub fn key(self) -> &'static str {
        match self {
            CommandKind::AddExempt => "add_exempt",
            CommandKind::RemoveExempt => "remove_exempt",
            CommandKind::ReadQueue => "read_queue",
            CommandKind::EnqueueTail => "enqueue_tail",
            CommandKind::EnqueueHead => "enqueue_head",
            CommandKind::DequeueByName => "dequeue_by_name",
            CommandKind::SetBackgroundMode => "set_background_mode",
            CommandKind::ShowHelp => "show_help",
            CommandKind::RequestExit => "request_exit",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A decoded control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Add pids to the allow-list
    AddExempt(Vec<String>),
    /// Remove pids from the allow-list
    RemoveExempt(Vec<String>),
    /// Print the queue
    ReadQueue,
    /// Append jobs to the queue
    EnqueueTail(Vec<String>),
    /// Promote jobs to the front of the queue
    EnqueueHead(Vec<String>),
    /// Remove every occurrence of the named jobs
    DequeueByName(Vec<String>),
    /// Switch background mode; the value is a boolean-like string
    SetBackgroundMode(String),
    /// Print the help text
    ShowHelp,
    /// Stop after the current step
    RequestExit,
}

impl ControlCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            ControlCommand::AddExempt(_) => CommandKind::AddExempt,
            ControlCommand::RemoveExempt(_) => CommandKind::RemoveExempt,
            ControlCommand::ReadQueue => CommandKind::ReadQueue,
            ControlCommand::EnqueueTail(_) => CommandKind::EnqueueTail,
            ControlCommand::EnqueueHead(_) => CommandKind::EnqueueHead,
            ControlCommand::DequeueByName(_) => CommandKind::DequeueByName,
            ControlCommand::SetBackgroundMode(_) => CommandKind::SetBackgroundMode,
            ControlCommand::ShowHelp => CommandKind::ShowHelp,
            ControlCommand::RequestExit => CommandKind::RequestExit,
        }
    }
}

/// Argument list of a command file key; a bare string counts as one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgList {
    Many(Vec<String>),
    One(String),
}

impl ArgList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ArgList::Many(v) => v,
            ArgList::One(s) => vec![s],
        }
    }
}

impl From<Vec<String>> for ArgList {
    fn from(v: Vec<String>) -> Self {
        ArgList::Many(v)
    }
}

/// On-disk form of a command file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_exempt: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_exempt: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_queue: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueue_tail: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueue_head: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dequeue_by_name: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_background_mode: Option<ArgList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_help: Option<serde_json::Value>,
    /// Same as `show_help`; both may appear in one file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_exit: Option<serde_json::Value>,
}

impl CommandBatch {
    /// Decode a command file's content
    pub fn from_json(content: &str) -> crate::GpuqResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Encode as command file content
    pub fn to_json(&self) -> crate::GpuqResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The batch's commands in [`COMMAND_PRECEDENCE`] order
    pub fn into_commands(self) -> Vec<ControlCommand> {
        let mut commands = Vec::new();

        if let Some(args) = self.add_exempt {
            commands.push(ControlCommand::AddExempt(args.into_vec()));
        }
        if let Some(args) = self.remove_exempt {
            commands.push(ControlCommand::RemoveExempt(args.into_vec()));
        }
        if self.read_queue.is_some() {
            commands.push(ControlCommand::ReadQueue);
        }
        if let Some(args) = self.enqueue_tail {
            commands.push(ControlCommand::EnqueueTail(args.into_vec()));
        }
        if let Some(args) = self.enqueue_head {
            commands.push(ControlCommand::EnqueueHead(args.into_vec()));
        }
        if let Some(args) = self.dequeue_by_name {
            commands.push(ControlCommand::DequeueByName(args.into_vec()));
        }
        if let Some(args) = self.set_background_mode {
            let value = args.into_vec().into_iter().next().unwrap_or_default();
            commands.push(ControlCommand::SetBackgroundMode(value));
        }
        if self.show_help.is_some() || self.info.is_some() {
            commands.push(ControlCommand::ShowHelp);
        }
        if self.request_exit.is_some() {
            commands.push(ControlCommand::RequestExit);
        }

        commands.sort_by_key(|c| c.kind().precedence());
        commands
    }
}

/// Parse a boolean-like string (`yes`, `off`, `1`, ...)
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Usage text printed for `show_help` / `info`
pub const HELP_TEXT: &str = "\
gpuq control files

Drop a JSON object into the control directory as command.json or
command<N>.json. Every key takes a list of strings; keys may be combined
and are applied in this order:

  add_exempt           pids the scheduler must never kill
  remove_exempt        pids to drop from the exempt list
  read_queue           print the current queue
  enqueue_tail         jobs to append to the queue
  enqueue_head         jobs to move to the front of the queue
  dequeue_by_name      jobs to remove from the queue (every occurrence)
  set_background_mode  [\"true\"|\"false\"] keep running on an empty queue
  info / show_help     print this message
  request_exit         exit once the running job finishes

Example:
  {\"enqueue_tail\": [\"train.py\"], \"add_exempt\": [\"4242\"]}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_is_total() {
        for (i, kind) in COMMAND_PRECEDENCE.iter().enumerate() {
            assert_eq!(kind.precedence(), i);
        }
    }

    #[test]
    fn test_commands_follow_precedence_not_key_order() {
        let batch = CommandBatch::from_json(
            r#"{"request_exit": [], "enqueue_tail": ["a.py"], "add_exempt": ["12"]}"#,
        )
        .unwrap();

        let kinds: Vec<CommandKind> = batch.into_commands().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::AddExempt,
                CommandKind::EnqueueTail,
                CommandKind::RequestExit
            ]
        );
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let batch = CommandBatch::from_json(r#"{"reboot": ["now"], "read_queue": []}"#).unwrap();
        assert_eq!(batch.into_commands(), vec![ControlCommand::ReadQueue]);
    }

    #[test]
    fn test_info_and_bare_string() {
        let batch =
            CommandBatch::from_json(r#"{"info": [], "set_background_mode": "yes"}"#).unwrap();
        assert_eq!(
            batch.into_commands(),
            vec![
                ControlCommand::SetBackgroundMode("yes".to_string()),
                ControlCommand::ShowHelp
            ]
        );
    }

    #[test]
    fn test_info_and_show_help_together() {
        let batch = CommandBatch::from_json(
            r#"{"show_help": [], "info": [], "enqueue_tail": ["a.py"]}"#,
        )
        .unwrap();
        assert_eq!(
            batch.into_commands(),
            vec![
                ControlCommand::EnqueueTail(vec!["a.py".to_string()]),
                ControlCommand::ShowHelp
            ]
        );
    }

    #[test]
    fn test_null_value_counts_as_absent() {
        let batch = CommandBatch::from_json(r#"{"request_exit": null}"#).unwrap();
        assert!(batch.into_commands().is_empty());
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let result = CommandBatch::from_json("{\"enqueue_tail\": [");
        assert!(matches!(result, Err(crate::GpuqError::Serialization(_))));
    }

    #[test]
    fn test_to_json_skips_absent_keys() {
        let batch = CommandBatch {
            enqueue_head: Some(vec!["a.py".to_string()].into()),
            ..Default::default()
        };
        let json = batch.to_json().unwrap();
        assert!(json.contains("enqueue_head"));
        assert!(!json.contains("request_exit"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
