//! Implementation of the `citriage reprocess` command.
//!
//! Annotations and steps always come from the database; only logs are
//! looked up again.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::ReportOutput;
use crate::adapters::evidence::FileEvidenceSource;
use crate::cli::context::AppContext;
use crate::cli::output::output;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ReprocessArgs {
    /// Directory holding one `<job_id>.log` file per job
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

pub async fn execute(args: ReprocessArgs, config: &Config, json_mode: bool) -> Result<()> {
    let source = FileEvidenceSource::new(args.logs_dir);

    let ctx = AppContext::open(config).await?;
    let report = ctx.processor.reprocess(&source).await.context("Reprocessing failed")?;

    output(&ReportOutput::from_report(&ctx, report).await?, json_mode);
    Ok(())
}
