//! The `reconcile` subcommand.

use clap::Args;

use crate::{
    async_utils::io::write_jsonl,
    batch::DEFAULT_FALLBACK_LABEL,
    naming::list_images,
    prelude::*,
    reconcile::{plan_reconciliation, reconcile},
    ui::Ui,
};

/// Reconcile command line arguments.
#[derive(Debug, Args)]
pub struct ReconcileOpts {
    /// The folder to reconcile.
    pub folder: PathBuf,

    /// Print what we would rename, without renaming anything.
    #[clap(long)]
    pub dry_run: bool,

    /// Names based on this label are never collapsed.
    #[clap(long, default_value = DEFAULT_FALLBACK_LABEL)]
    pub fallback_label: String,

    /// Write the renames to this JSONL file instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `reconcile` subcommand.
#[instrument(level = "debug", skip_all, fields(folder = %opts.folder.display()))]
pub async fn cmd_reconcile(ui: &Ui, opts: &ReconcileOpts) -> Result<()> {
    if !opts.folder.is_dir() {
        return Err(anyhow!(
            "{} does not exist or is not a folder",
            opts.folder.display()
        ));
    }
    let restores = if opts.dry_run {
        plan_reconciliation(&list_images(&opts.folder)?, &opts.fallback_label)
    } else {
        reconcile(&opts.folder, &opts.fallback_label)?
    };
    write_jsonl(opts.output_path.as_deref(), &restores).await?;
    let verb = if opts.dry_run { "Would remove" } else { "Removed" };
    ui.display_message("🔁", &format!("{verb} {} suffixes", restores.len()));
    Ok(())
}
