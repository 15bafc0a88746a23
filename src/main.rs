use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod batch;
mod cmd;
mod credentials;
mod extract;
mod naming;
mod ocr;
mod prelude;
mod rate_limit;
mod reconcile;
mod retry;
mod ui;

/// Rename photos of ID documents after the person named on them, using
/// Baidu's cloud OCR.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - BAIDU_OCR_API_KEY: The API key of your Baidu OCR application.
  - BAIDU_OCR_SECRET_KEY: The matching secret key.
  - BAIDU_OCR_API_BASE (optional): Override the server URL.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Rename images after the name found on them.
    Rename(cmd::rename::RenameOpts),
    /// Remove numeric suffixes that are no longer needed, for example after
    /// an interrupted run.
    Reconcile(cmd::reconcile::ReconcileOpts),
    /// Print the name found in a saved recognition response.
    Extract(cmd::extract::ExtractOpts),
    /// Print schemas for output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Rename(opts) => opts.output_path.is_none(),
            Cmd::Reconcile(opts) => opts.output_path.is_none(),
            Cmd::Extract(_) => true,
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Rename(opts) => {
            cmd::rename::cmd_rename(ui, opts).await?;
        }
        Cmd::Reconcile(opts) => {
            cmd::reconcile::cmd_reconcile(&ui, opts).await?;
        }
        Cmd::Extract(opts) => {
            cmd::extract::cmd_extract(opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
