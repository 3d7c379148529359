//! Playlist and report writing.

use std::path::{Path, PathBuf};

use iptv_rank_protocol::{encode_entries, RankedEntry};
use log::info;
use thiserror::Error;

use crate::pipeline::PipelineOutput;

/// Output errors.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write the final playlist, one `channel,url` line per entry.
pub async fn write_output(path: &Path, entries: &[RankedEntry]) -> Result<(), OutputError> {
    write_file(path, &encode_entries(entries)).await?;
    info!(
        "Wrote {} entr{} to {:?}",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        path
    );
    Ok(())
}

/// Write the full run as pretty JSON.
pub async fn write_report(path: &Path, output: &PipelineOutput) -> Result<(), OutputError> {
    let json = serde_json::to_vec_pretty(output)?;
    write_file(path, &json).await?;
    info!("Wrote report for {} channel(s) to {:?}", output.channels.len(), path);
    Ok(())
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, contents).await.map_err(io_err)
}
