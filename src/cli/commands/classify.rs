//! Implementation of the `citriage classify` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::ReportOutput;
use crate::adapters::evidence::{FileEvidenceSource, RunManifest};
use crate::cli::context::AppContext;
use crate::cli::output::output;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Run manifest (YAML or JSON) describing the run and its failed jobs
    pub manifest: PathBuf,

    /// Directory holding one `<job_id>.log` file per job
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

pub async fn execute(args: ClassifyArgs, config: &Config, json_mode: bool) -> Result<()> {
    let manifest = RunManifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;
    let run = manifest.run.clone();
    let jobs = manifest.job_records();
    let source = FileEvidenceSource::new(args.logs_dir).with_manifest(manifest);

    let ctx = AppContext::open(config).await?;
    let report = ctx
        .processor
        .process_run(&run, &jobs, &source)
        .await
        .with_context(|| format!("Failed to process run {}", run.id))?;

    output(&ReportOutput::from_report(&ctx, report).await?, json_mode);
    Ok(())
}
