//! I/O utilities: reading small inputs from a file or standard input, and
//! writing JSONL records to a file or standard output.

use tokio::{
    fs::File,
    io::{AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Read all of a file, or standard input if `path` is `None`, as UTF-8.
pub async fn read_to_string_or_stdin(path: Option<&Path>) -> Result<String> {
    let mut data = String::new();
    match path {
        Some(path) => {
            File::open(path)
                .await
                .with_context(|| format!("Failed to open file at path: {:?}", path))?
                .read_to_string(&mut data)
                .await
                .with_context(|| format!("Failed to read file at path: {:?}", path))?;
        }
        None => {
            tokio::io::stdin()
                .read_to_string(&mut data)
                .await
                .context("Failed to read standard input")?;
        }
    }
    Ok(data)
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write records as JSONL to either standard output or a file.
pub async fn write_jsonl<T>(path: Option<&Path>, records: &[T]) -> Result<()>
where
    T: Serialize,
{
    let mut writer = BufWriter::new(create_writer(path).await?);
    for record in records {
        let json =
            serde_json::to_string(record).context("Failed to serialize output record")?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write JSON to output")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}
