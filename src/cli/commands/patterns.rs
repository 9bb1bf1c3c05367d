//! Implementation of the `citriage patterns` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::output::{output, table, CommandOutput};
use crate::services::builtin_rules;

#[derive(Args, Debug)]
pub struct PatternsArgs {
    /// Only list rules of this category
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PatternRow {
    pub id: String,
    pub category: String,
    pub title: String,
    pub confidence: f64,
    pub regex: String,
}

#[derive(Debug, Serialize)]
pub struct PatternsOutput {
    pub rules: Vec<PatternRow>,
}

impl CommandOutput for PatternsOutput {
    fn to_human(&self) -> String {
        if self.rules.is_empty() {
            return "No matching rules.".to_string();
        }
        let mut table = table(&["#", "Id", "Category", "Title", "Confidence"]);
        for (i, rule) in self.rules.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&rule.id),
                Cell::new(&rule.category),
                Cell::new(&rule.title),
                Cell::new(format!("{:.2}", rule.confidence)),
            ]);
        }
        format!("Rules are evaluated in this order; the first match wins.\n{table}")
    }
}

pub async fn execute(args: PatternsArgs, json_mode: bool) -> Result<()> {
    let rules = builtin_rules()
        .context("Failed to compile built-in rules")?
        .into_iter()
        .filter(|r| args.category.as_deref().is_none_or(|c| r.category == c))
        .map(|r| PatternRow {
            regex: r.regex.as_str().to_string(),
            id: r.id,
            category: r.category,
            title: r.title,
            confidence: r.confidence,
        })
        .collect();

    output(&PatternsOutput { rules }, json_mode);
    Ok(())
}
