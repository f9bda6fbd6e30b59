use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use memtree::engine::MemoryEngine;
use memtree::memory::Tier;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_size, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "List tracked entries (optionally of one tier: working, archival, persona)")]
    pub entries: Option<Option<String>>,

    #[clap(long, short, default_value = "20", help = "Maximum number of entries to display")]
    pub limit: usize,

    #[clap(long, help = "Show merge and summary history")]
    pub provenance: bool,
}

impl StatsCommand {
    pub async fn execute(&self, engine: &MemoryEngine, format: OutputFormat) -> CliResult<()> {
        let router = engine.router();
        let tiers = router.stats();

        let tier_filter: Option<Tier> = match self.entries.as_ref().and_then(|t| t.as_deref()) {
            Some(t) => Some(t.parse::<Tier>()?),
            None => None,
        };
        let mut entries = if self.entries.is_some() {
            router.snapshot()
        } else {
            Vec::new()
        };
        if let Some(tier) = tier_filter {
            entries.retain(|(_, entry)| entry.tier == tier);
        }
        entries.sort_by(|a, b| b.1.last_access.cmp(&a.1.last_access));
        entries.truncate(self.limit);

        let provenance = if self.provenance {
            router.provenance()
        } else {
            Vec::new()
        };

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "store": engine.store().name(),
                    "tracked_entries": router.tracked_count(),
                    "tracked_bytes": router.total_tracked_bytes(),
                    "tiers": tiers,
                    "entries": entries.iter().map(|(path, entry)| {
                        serde_json::json!({
                            "path": path.to_string(),
                            "tier": entry.tier,
                            "size_bytes": entry.size_bytes,
                            "access_count": entry.access_count,
                            "importance": entry.importance,
                            "last_access": entry.last_access.to_rfc3339(),
                        })
                    }).collect::<Vec<_>>(),
                    "provenance": provenance,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("memtree Statistics ({} store)", engine.store().name());
                println!("======================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "Entries", "Used", "Budget", "Utilization"]);

                for stats in &tiers {
                    table.add_row([
                        stats.tier.to_string(),
                        stats.entries.to_string(),
                        format_size(stats.used_bytes),
                        format_size(stats.budget_bytes),
                        format!("{:.1}%", stats.utilization * 100.0),
                    ]);
                }

                println!("{table}\n");
                println!(
                    "Total: {} tracked entries ({})",
                    router.tracked_count(),
                    format_size(router.total_tracked_bytes())
                );

                if self.entries.is_some() {
                    println!();
                    if entries.is_empty() {
                        println!("No tracked entries.");
                    } else {
                        let mut table = Table::new();
                        table
                            .load_preset(UTF8_FULL_CONDENSED)
                            .set_content_arrangement(ContentArrangement::Dynamic)
                            .set_header(["Path", "Tier", "Size", "Accesses", "Importance", "Last Access"]);

                        for (path, entry) in &entries {
                            table.add_row([
                                truncate_string(&path.to_string(), 50),
                                entry.tier.to_string(),
                                format_size(entry.size_bytes),
                                entry.access_count.to_string(),
                                format!("{:.2}", entry.importance),
                                format_timestamp(&entry.last_access),
                            ]);
                        }
                        println!("{table}");
                    }
                }

                if self.provenance {
                    println!();
                    if provenance.is_empty() {
                        println!("No provenance records.");
                    }
                    for record in &provenance {
                        println!("- {record}");
                    }
                }
            }
        }

        Ok(())
    }
}
