use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memtree::engine::{Command, CommandOutput, MemoryEngine};
use memtree::memory::NodeKind;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_size, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "Show a file or list a directory")]
    View(ViewArgs),

    #[clap(about = "Create or overwrite a file")]
    Create(CreateArgs),

    #[clap(about = "Replace the single occurrence of a string in a file")]
    StrReplace(StrReplaceArgs),

    #[clap(about = "Insert a line after the given line number (0 = top)")]
    Insert(InsertArgs),

    #[clap(about = "Delete a file or directory")]
    Delete(DeleteArgs),

    #[clap(about = "Move a file or directory")]
    Rename(RenameArgs),

    #[clap(about = "Run a raw JSON tool call")]
    Exec(ExecArgs),

    #[clap(about = "Show file metadata and tier without counting an access")]
    Info(InfoArgs),
}

#[derive(Parser)]
pub struct ViewArgs {
    #[clap(default_value = "/memories", help = "Path under /memories")]
    pub path: String,

    #[clap(
        long,
        num_args = 2,
        value_names = ["START", "END"],
        help = "Inclusive 1-indexed line range"
    )]
    pub range: Option<Vec<usize>>,
}

#[derive(Parser)]
pub struct CreateArgs {
    #[clap(help = "Path under /memories")]
    pub path: String,

    #[clap(help = "File text", required_unless_present = "from_file")]
    pub text: Option<String>,

    #[clap(long, help = "Read the file text from a local file", conflicts_with = "text")]
    pub from_file: Option<PathBuf>,
}

#[derive(Parser)]
pub struct StrReplaceArgs {
    pub path: String,
    #[clap(help = "Text to find (must occur exactly once)")]
    pub old: String,
    #[clap(help = "Replacement text")]
    pub new: String,
}

#[derive(Parser)]
pub struct InsertArgs {
    pub path: String,
    #[clap(help = "Line to insert after (0 inserts at the top)")]
    pub line: usize,
    pub text: String,
}

#[derive(Parser)]
pub struct DeleteArgs {
    pub path: String,
}

#[derive(Parser)]
pub struct RenameArgs {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Parser)]
pub struct InfoArgs {
    pub path: String,
}

#[derive(Parser)]
pub struct ExecArgs {
    #[clap(help = r#"Tool call, e.g. '{"command":"view","path":"/memories"}'"#)]
    pub json: String,
}

impl MemorySubcommand {
    /// Build the engine command for these arguments
    pub fn to_command(&self) -> CliResult<Option<Command>> {
        let command = match self {
            MemorySubcommand::View(args) => Command::View {
                path: args.path.clone(),
                view_range: match args.range.as_deref() {
                    Some([start, end]) => Some([*start, *end]),
                    Some(_) => return Err("--range takes exactly two line numbers".into()),
                    None => None,
                },
            },
            MemorySubcommand::Create(args) => {
                let file_text = match (&args.text, &args.from_file) {
                    (_, Some(file)) => std::fs::read_to_string(file)
                        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?,
                    (Some(text), None) => text.clone(),
                    (None, None) => return Err("Provide the file text or --from-file".into()),
                };
                Command::Create {
                    path: args.path.clone(),
                    file_text,
                }
            }
            MemorySubcommand::StrReplace(args) => Command::StrReplace {
                path: args.path.clone(),
                old_str: args.old.clone(),
                new_str: args.new.clone(),
            },
            MemorySubcommand::Insert(args) => Command::Insert {
                path: args.path.clone(),
                insert_line: args.line,
                insert_text: args.text.clone(),
            },
            MemorySubcommand::Delete(args) => Command::Delete {
                path: args.path.clone(),
            },
            MemorySubcommand::Rename(args) => Command::Rename {
                old_path: args.old_path.clone(),
                new_path: args.new_path.clone(),
            },
            MemorySubcommand::Exec(_) | MemorySubcommand::Info(_) => return Ok(None),
        };
        Ok(Some(command))
    }
}

impl MemoryCommand {
    pub async fn execute(&self, engine: &MemoryEngine, format: OutputFormat) -> CliResult<()> {
        let output = match (&self.command, self.command.to_command()?) {
            (_, Some(command)) => engine.dispatch(command).await?,
            (MemorySubcommand::Exec(args), None) => engine.dispatch_json(&args.json).await?,
            (MemorySubcommand::Info(args), None) => return Self::info(engine, args, format).await,
            (_, None) => return Err("No command to run".into()),
        };

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
            OutputFormat::Table => Self::print(&output),
        }
        Ok(())
    }

    async fn info(engine: &MemoryEngine, args: &InfoArgs, format: OutputFormat) -> CliResult<()> {
        let file = engine.file(&args.path).await?;
        let tier = file.tier.map_or_else(|| "cold".to_string(), |t| t.to_string());

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "path": &file.path,
                    "size_bytes": file.size_bytes,
                    "lines": file.line_count(),
                    "modified": file.modified.to_rfc3339(),
                    "tier": tier,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Field", "Value"]);

                table.add_row(["Path", file.path.as_str()]);
                table.add_row(["Size".to_string(), format_size(file.size_bytes)]);
                table.add_row(["Lines".to_string(), file.line_count().to_string()]);
                table.add_row(["Modified".to_string(), format_timestamp(&file.modified)]);
                table.add_row(["Tier", tier.as_str()]);

                println!("{table}");
                let first = file.content.lines().next().unwrap_or("");
                println!("\nPreview: {}", truncate_string(first, 60));
            }
        }

        Ok(())
    }

    fn print(output: &CommandOutput) {
        match output {
            CommandOutput::Directory { path, entries } if !entries.is_empty() => {
                println!("Directory: {path}\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Name", "Kind", "Size"]);

                for entry in entries {
                    let (kind, size) = match entry.kind {
                        NodeKind::Directory => ("dir", String::from("-")),
                        NodeKind::File => ("file", format_size(entry.size_bytes)),
                    };
                    table.add_row([entry.name.as_str(), kind, size.as_str()]);
                }

                println!("{table}");
                println!("\nTotal: {} entries", entries.len());
            }
            other => println!("{other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[clap(subcommand)]
        command: MemorySubcommand,
    }

    fn parse(args: &[&str]) -> MemorySubcommand {
        let mut argv = vec!["memory"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).command
    }

    #[test]
    fn test_view_range_maps_to_command() {
        let command = parse(&["view", "/memories/a.md", "--range", "2", "4"]).to_command().unwrap();
        assert_eq!(
            command,
            Some(Command::View {
                path: "/memories/a.md".to_string(),
                view_range: Some([2, 4]),
            })
        );
    }

    #[test]
    fn test_view_defaults_to_root() {
        let command = parse(&["view"]).to_command().unwrap();
        assert_eq!(
            command,
            Some(Command::View {
                path: "/memories".to_string(),
                view_range: None,
            })
        );
    }

    #[test]
    fn test_str_replace_args() {
        let command = parse(&["str-replace", "a.md", "old", "new"]).to_command().unwrap();
        assert_eq!(
            command,
            Some(Command::StrReplace {
                path: "a.md".to_string(),
                old_str: "old".to_string(),
                new_str: "new".to_string(),
            })
        );
    }

    #[test]
    fn test_info_has_no_prebuilt_command() {
        assert!(parse(&["info", "/memories/a.md"]).to_command().unwrap().is_none());
    }

    #[test]
    fn test_exec_has_no_prebuilt_command() {
        let command = parse(&["exec", r#"{"command":"view"}"#]).to_command().unwrap();
        assert!(command.is_none());
    }
}
