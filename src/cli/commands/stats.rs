//! Implementation of the `citriage stats` command.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::context::AppContext;
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{Config, PromptCacheStats};
use crate::domain::ports::{KnowledgeStore, PromptCacheRepository};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Number of root causes to list, most frequent first
    #[arg(long, short, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RootCauseRow {
    pub id: String,
    pub category: String,
    pub title: String,
    pub occurrences: u64,
    pub discovery_method: String,
    pub last_seen_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub detections: BTreeMap<String, u64>,
    pub cache: PromptCacheStats,
    pub root_cause_count: usize,
    pub top_root_causes: Vec<RootCauseRow>,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();

        if self.detections.is_empty() {
            lines.push("No detections recorded yet.".to_string());
        } else {
            let mut detections = table(&["Method", "Jobs"]);
            for (method, count) in &self.detections {
                detections.add_row(vec![Cell::new(method), Cell::new(count)]);
            }
            lines.push(detections.to_string());
        }

        lines.push(format!(
            "Prompt cache: {} entries, {} resolved, {} reuses",
            self.cache.entries, self.cache.resolved, self.cache.total_reuses
        ));

        if !self.top_root_causes.is_empty() {
            lines.push(format!(
                "Top {} of {} root causes:",
                self.top_root_causes.len(),
                self.root_cause_count
            ));
            let mut causes = table(&["Category", "Title", "Seen", "Discovered by", "Last seen"]);
            for rc in &self.top_root_causes {
                causes.add_row(vec![
                    Cell::new(&rc.category),
                    Cell::new(truncate(&rc.title, 60)),
                    Cell::new(rc.occurrences),
                    Cell::new(&rc.discovery_method),
                    Cell::new(&rc.last_seen_at),
                ]);
            }
            lines.push(causes.to_string());
        }

        lines.join("\n")
    }
}

pub async fn execute(args: StatsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    let detections = ctx.knowledge.detection_stats().await?;
    let cache = ctx.cache_entries.stats().await?;
    let mut causes = ctx.knowledge.list_root_causes().await?;
    causes.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
    });
    let root_cause_count = causes.len();

    let top_root_causes = causes
        .into_iter()
        .take(args.limit)
        .map(|rc| RootCauseRow {
            id: rc.id.to_string(),
            category: rc.category,
            title: rc.title,
            occurrences: rc.occurrence_count,
            discovery_method: rc.discovery_method.to_string(),
            last_seen_at: rc.last_seen_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    output(
        &StatsOutput {
            detections,
            cache,
            root_cause_count,
            top_root_causes,
        },
        json_mode,
    );
    Ok(())
}
