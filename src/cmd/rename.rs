//! The `rename` subcommand.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::{
    async_utils::{JoinWorker, io::write_jsonl},
    batch::{
        self, BatchInput, BatchOptions, BatchOutcome, DEFAULT_FALLBACK_LABEL, FileStatus,
    },
    credentials::Credentials,
    ocr::{OcrOpts, baidu::BaiduOcr},
    prelude::*,
    ui::Ui,
};

/// Rename command line arguments.
#[derive(Debug, Args)]
pub struct RenameOpts {
    /// A folder of images to rename in place. With `--staging-dir`, any
    /// number of image files or folders to copy and rename.
    #[clap(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Copy the inputs into this folder and rename the copies, leaving the
    /// originals alone.
    #[clap(long)]
    pub staging_dir: Option<PathBuf>,

    /// Max number of images to process at a time. Defaults to all of them.
    #[clap(short = 'j', long = "jobs")]
    pub job_count: Option<usize>,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    /// Base name for images where no name was found.
    #[clap(long, default_value = DEFAULT_FALLBACK_LABEL)]
    pub fallback_label: String,

    /// Write per-file results to this JSONL file instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

impl RenameOpts {
    /// Work out what we're renaming.
    fn batch_input(&self) -> Result<BatchInput> {
        match (&self.staging_dir, self.inputs.as_slice()) {
            (Some(staging_dir), _) => Ok(BatchInput::Staged {
                files: self.inputs.clone(),
                staging_dir: staging_dir.clone(),
            }),
            (None, [folder]) => Ok(BatchInput::Folder(folder.clone())),
            (None, _) => Err(anyhow!(
                "renaming in place takes exactly one folder (use --staging-dir to rename several inputs)"
            )),
        }
    }
}

/// The `rename` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_rename(ui: Ui, opts: &RenameOpts) -> Result<()> {
    let input = opts.batch_input()?;
    let credentials = Credentials::from_env()?;
    let service = Arc::new(BaiduOcr::new(opts.ocr.api)?);
    let client = opts.ocr.recognition_client(service)?;
    let batch_opts = BatchOptions {
        jobs: opts.job_count,
        fallback_label: opts.fallback_label.clone(),
    };

    // Run the batch on its own task, so Ctrl-C can cancel it.
    let cancel = CancellationToken::new();
    let worker = JoinWorker::spawn({
        let ui = ui.clone();
        let cancel = cancel.clone();
        async move {
            batch::run(&ui, &client, &credentials, input, &batch_opts, &cancel).await
        }
    });
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        }
    });
    let outcome = worker.join().await;
    interrupt.abort();
    let outcome = outcome?;

    write_jsonl(opts.output_path.as_deref(), &outcome.files).await?;
    print_summary(&ui, &outcome);
    if outcome.cancelled {
        return Err(anyhow!(
            "interrupted after {} of {} images",
            outcome.files.len(),
            outcome.total
        ));
    }
    Ok(())
}

/// Tell the user how it went.
fn print_summary(ui: &Ui, outcome: &BatchOutcome) {
    ui.display_message(
        "🪪",
        &format!(
            "{} images: {} renamed, {} kept, {} unrecognized, {} failed, {} suffixes removed",
            outcome.total,
            outcome.renamed,
            outcome.kept,
            outcome.unrecognized,
            outcome.failed,
            outcome.restored.len(),
        ),
    );
    for file in &outcome.files {
        if file.status == FileStatus::Failed {
            let reason = file.errors.last().map(String::as_str).unwrap_or("unknown error");
            ui.display_message("⚠️", &format!("{}: {reason}", file.file));
        }
    }
    if outcome.cancelled {
        ui.display_message("🛑", "Suffixes were not reconciled; run `reconcile` to finish");
    }
}
