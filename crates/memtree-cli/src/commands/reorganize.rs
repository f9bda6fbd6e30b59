use std::sync::Arc;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memtree::config::ReorganizerConfig;
use memtree::engine::MemoryEngine;
use memtree::reorganizer::Reorganizer;
use tokio_util::sync::CancellationToken;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ReorganizeCommand {
    #[clap(long, help = "Override the similarity threshold used for merging (0.0-1.0)")]
    pub similarity: Option<f32>,

    #[clap(long, help = "Override the tracked-bytes budget that triggers summarization")]
    pub global_budget: Option<u64>,
}

impl ReorganizeCommand {
    /// Run one maintenance cycle in the foreground
    pub async fn execute(
        &self,
        engine: Arc<MemoryEngine>,
        mut config: ReorganizerConfig,
        format: OutputFormat,
    ) -> CliResult<()> {
        if let Some(similarity) = self.similarity {
            if !(0.0..=1.0).contains(&similarity) {
                return Err(format!("Similarity must be between 0.0 and 1.0, got {similarity}").into());
            }
            config.similarity_threshold = similarity;
        }
        if let Some(budget) = self.global_budget {
            let tier_total = engine.router().config().total_budget_bytes();
            if budget >= tier_total {
                return Err(format!(
                    "Global budget must be below the sum of the tier budgets ({tier_total} bytes), got {budget}"
                )
                .into());
            }
            config.global_budget_bytes = budget;
        }

        let reorganizer = Reorganizer::new(engine, config);
        let report = reorganizer.run_cycle(&CancellationToken::new()).await;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Table => {
                println!("Reorganization Results");
                println!("======================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Step", "Count"]);

                for (label, count) in [
                    ("Merged", report.merged),
                    ("Promoted", report.promoted),
                    ("Demoted", report.demoted),
                    ("Summarized", report.summarized),
                    ("Skipped", report.skipped),
                    ("Errors", report.errors),
                ] {
                    table.add_row([label.to_string(), count.to_string()]);
                }

                println!("{table}\n");
                println!("Total: {} changes", report.changes());
            }
        }

        Ok(())
    }
}
