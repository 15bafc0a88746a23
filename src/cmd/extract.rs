//! The `extract` subcommand.

use clap::Args;
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::read_to_string_or_stdin, extract::extract_name,
    ocr::baidu::parse_recognition_response, prelude::*,
};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// A saved recognition response. Reads standard input if omitted.
    #[clap(value_name = "JSON")]
    pub input_path: Option<PathBuf>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_extract(opts: &ExtractOpts) -> Result<()> {
    let body = read_to_string_or_stdin(opts.input_path.as_deref()).await?;
    let lines = parse_recognition_response(&body)
        .context("failed to parse recognition response")?;
    debug!(line_count = lines.len(), "Parsed recognition response");
    let name = extract_name(&lines)
        .ok_or_else(|| anyhow!("no name found in {} recognized lines", lines.len()))?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{name}\n").as_bytes())
        .await
        .context("failed to write name")?;
    stdout.flush().await.context("failed to flush name")?;
    Ok(())
}
