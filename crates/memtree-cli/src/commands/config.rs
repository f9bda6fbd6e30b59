use std::path::Path;

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memtree::config::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_size};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show current configuration")]
    Show,
}

impl ConfigCommand {
    pub async fn execute(&self, config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config, config_path, format),
        }
    }

    fn show(config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (default search path)"),
                }
                println!("==============================\n");

                print_section(
                    "Storage",
                    &[
                        ("data_dir", config.storage.data_dir.display().to_string()),
                        ("backend", format!("{:?}", config.storage.backend).to_lowercase()),
                        ("max_segment_len", config.storage.max_segment_len.to_string()),
                    ],
                );

                let tiers = &config.tiers;
                print_section(
                    "Tiers",
                    &[
                        ("working_budget_bytes", format_size(tiers.working_budget_bytes)),
                        ("archival_budget_bytes", format_size(tiers.archival_budget_bytes)),
                        ("persona_budget_bytes", format_size(tiers.persona_budget_bytes)),
                        ("promote_access_threshold", tiers.promote_access_threshold.to_string()),
                        ("access_window_secs", tiers.access_window_secs.to_string()),
                        ("persona_patterns", tiers.persona_patterns.join(", ")),
                        ("archival_overflow", tiers.archival_overflow.to_string()),
                    ],
                );

                print_section(
                    "Editor",
                    &[("cascade_delete", config.editor.cascade_delete.to_string())],
                );

                let reorganizer = &config.reorganizer;
                print_section(
                    "Reorganizer",
                    &[
                        ("enabled", reorganizer.enabled.to_string()),
                        ("interval_secs", reorganizer.interval_secs.to_string()),
                        ("similarity_threshold", reorganizer.similarity_threshold.to_string()),
                        ("demote_after_secs", reorganizer.demote_after_secs.to_string()),
                        ("promote_min_accesses", reorganizer.promote_min_accesses.to_string()),
                        ("global_budget_bytes", format_size(reorganizer.global_budget_bytes)),
                        ("summary_max_lines", reorganizer.summary_max_lines.to_string()),
                    ],
                );
            }
        }

        Ok(())
    }
}

fn print_section(title: &str, rows: &[(&str, String)]) {
    println!("[{title}]");
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Setting", "Value"]);

    for (setting, value) in rows {
        table.add_row([*setting, value.as_str()]);
    }

    println!("{table}\n");
}
