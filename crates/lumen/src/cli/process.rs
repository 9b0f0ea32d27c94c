//! The `lumen process` command: run the pipeline once in the foreground.
//!
//! This is the manual path for re-processing images whose record ended up
//! `failed` (or stuck in `processing` after a crash).

use clap::Args;
use serde_json::{json, Value};

use lumen_core::{Config, ImagePipeline, PipelineOutcome, ProcessingRequest};

/// Arguments for the `process` command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Image id (primary key of the images table)
    #[arg(long)]
    pub image_id: i64,

    /// Owning user id
    #[arg(long)]
    pub user_id: String,

    /// Storage key of the original upload, e.g. u1/original/cat.jpg
    #[arg(long)]
    pub original_path: String,

    /// Original filename (defaults to the last segment of the path)
    #[arg(long)]
    pub filename: Option<String>,
}

/// Execute the process command.
///
/// Prints the outcome as JSON on stdout; exits non-zero when the run failed.
pub async fn execute(args: ProcessArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pipeline = ImagePipeline::from_config(&config)?;

    let filename = args.filename.unwrap_or_else(|| {
        args.original_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    });
    let request = ProcessingRequest::new(args.image_id, args.user_id, args.original_path, filename);

    let outcome = pipeline.process(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);

    match outcome {
        PipelineOutcome::Failed { .. } | PipelineOutcome::Aborted(_) => {
            anyhow::bail!("Processing image {} did not complete", request.image_id)
        }
        _ => Ok(()),
    }
}

fn outcome_json(outcome: &PipelineOutcome) -> Value {
    match outcome {
        PipelineOutcome::Completed(record) => json!({
            "outcome": outcome.label(),
            "record": record,
        }),
        PipelineOutcome::Failed { step, error } => json!({
            "outcome": outcome.label(),
            "step": step.as_str(),
            "error_kind": error.kind(),
            "error": error.to_string(),
        }),
        PipelineOutcome::Aborted(error) => json!({
            "outcome": outcome.label(),
            "error_kind": error.kind(),
            "error": error.to_string(),
        }),
        PipelineOutcome::AlreadyCompleted | PipelineOutcome::InProgress => json!({
            "outcome": outcome.label(),
        }),
    }
}
