//! Command dispatch surface
//!
//! Tool calls arrive as JSON objects tagged by `command`, using the field
//! names of the memory tool (`path`, `view_range`, `file_text`, `old_str`,
//! `new_str`, `insert_line`, `insert_text`, `old_path`, `new_path`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::memory::types::{DirEntry, NodeKind};
use crate::path::ROOT;

/// Names accepted in the `command` field
pub const COMMAND_NAMES: [&str; 6] = ["view", "create", "str_replace", "insert", "delete", "rename"];

fn default_view_path() -> String {
    ROOT.to_string()
}

/// One memory tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    View {
        #[serde(default = "default_view_path")]
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        view_range: Option<[usize; 2]>,
    },
    Create {
        path: String,
        file_text: String,
    },
    StrReplace {
        path: String,
        old_str: String,
        new_str: String,
    },
    Insert {
        path: String,
        insert_line: usize,
        insert_text: String,
    },
    Delete {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::View { .. } => "view",
            Command::Create { .. } => "create",
            Command::StrReplace { .. } => "str_replace",
            Command::Insert { .. } => "insert",
            Command::Delete { .. } => "delete",
            Command::Rename { .. } => "rename",
        }
    }

    /// Decode a JSON tool call.
    ///
    /// An unrecognised `command` value is reported as
    /// [`MemoryError::UnknownCommand`]; anything else malformed as a
    /// serialization error.
    pub fn from_json(input: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let name = value
            .get("command")
            .and_then(|c| c.as_str())
            .ok_or_else(|| MemoryError::Serialization("no command specified".to_string()))?;

        if !COMMAND_NAMES.contains(&name) {
            return Err(MemoryError::UnknownCommand(name.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Success payload of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutput {
    /// Listing of a directory, sorted by name
    Directory { path: String, entries: Vec<DirEntry> },
    /// File text, or the selected lines when a range was given
    File {
        path: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        first_line: Option<usize>,
    },
    Created { path: String },
    Replaced { path: String },
    Inserted { path: String, line: usize },
    Deleted { path: String, kind: NodeKind },
    Renamed { from: String, to: String },
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Directory { path, entries } => {
                write!(f, "Directory: {path}")?;
                if entries.is_empty() {
                    return write!(f, "\n(empty)");
                }
                for entry in entries {
                    match entry.kind {
                        NodeKind::Directory => write!(f, "\n- {}/", entry.name)?,
                        NodeKind::File => write!(f, "\n- {} ({} bytes)", entry.name, entry.size_bytes)?,
                    }
                }
                Ok(())
            }
            CommandOutput::File {
                content,
                first_line: None,
                ..
            } => f.write_str(content),
            CommandOutput::File {
                content,
                first_line: Some(first),
                ..
            } => {
                for (i, line) in content.lines().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{:4} | {}", first + i, line)?;
                }
                Ok(())
            }
            CommandOutput::Created { path } => write!(f, "Successfully created: {path}"),
            CommandOutput::Replaced { path } => write!(f, "Successfully replaced 1 occurrence in {path}"),
            CommandOutput::Inserted { path, line } => {
                write!(f, "Successfully inserted text at line {line} in {path}")
            }
            CommandOutput::Deleted { path, kind } => match kind {
                NodeKind::Directory => write!(f, "Successfully deleted directory: {path}"),
                NodeKind::File => write!(f, "Successfully deleted file: {path}"),
            },
            CommandOutput::Renamed { from, to } => write!(f, "Successfully renamed {from} to {to}"),
        }
    }
}
