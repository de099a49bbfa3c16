//! Registry of published Citrinet checkpoints and the download cache.
//!
//! Checkpoints are identified by name, mapped to their NGC archive URL and
//! cached on disk. Downloading an already-cached checkpoint is a no-op.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AsrError, AsrResult};

/// Published Citrinet checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CitrinetCheckpoint {
    /// Citrinet-256, English, LibriSpeech + common voice.
    SttEnCitrinet256,
    /// Citrinet-512, English.
    SttEnCitrinet512,
    /// Citrinet-1024, English.
    SttEnCitrinet1024,
}

impl CitrinetCheckpoint {
    /// All known checkpoints.
    pub fn all() -> &'static [CitrinetCheckpoint] {
        &[
            CitrinetCheckpoint::SttEnCitrinet256,
            CitrinetCheckpoint::SttEnCitrinet512,
            CitrinetCheckpoint::SttEnCitrinet1024,
        ]
    }

    /// Canonical identifier, as used by the upstream model catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            CitrinetCheckpoint::SttEnCitrinet256 => "stt_en_citrinet_256",
            CitrinetCheckpoint::SttEnCitrinet512 => "stt_en_citrinet_512",
            CitrinetCheckpoint::SttEnCitrinet1024 => "stt_en_citrinet_1024",
        }
    }

    /// Download URL of the checkpoint archive.
    pub fn url(&self) -> String {
        format!(
            "https://api.ngc.nvidia.com/v2/models/nvidia/nemo/{name}/versions/1.0.0rc1/files/{name}.nemo",
            name = self.as_str()
        )
    }

    /// File name of the archive inside the cache folder.
    pub fn file_name(&self) -> String {
        format!("{}.nemo", self.as_str())
    }

    /// Resolve a checkpoint from its string identifier.
    ///
    /// Unknown names are an error, matching how the rest of the workspace
    /// rejects invalid configuration values.
    pub fn from_name(name: &str) -> AsrResult<CitrinetCheckpoint> {
        match name.to_lowercase().as_str() {
            "stt_en_citrinet_256" | "citrinet_256" | "citrinet-256" => {
                Ok(CitrinetCheckpoint::SttEnCitrinet256)
            }
            "stt_en_citrinet_512" | "citrinet_512" | "citrinet-512" => {
                Ok(CitrinetCheckpoint::SttEnCitrinet512)
            }
            "stt_en_citrinet_1024" | "citrinet_1024" | "citrinet-1024" => {
                Ok(CitrinetCheckpoint::SttEnCitrinet1024)
            }
            other => Err(AsrError::Checkpoint(format!(
                "Unknown checkpoint name: {other}"
            ))),
        }
    }
}

impl fmt::Display for CitrinetCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default folder where downloaded checkpoints are cached.
///
/// Created on demand under the user's home directory.
pub fn default_cache_folder() -> AsrResult<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| {
        AsrError::Download("HOME is not set, pass an explicit checkpoint folder".to_string())
    })?;
    let folder = PathBuf::from(home).join(".citrinet");
    std::fs::create_dir_all(&folder)?;
    Ok(folder)
}

/// Download a checkpoint archive into `checkpoint_folder` (or the default
/// cache folder) and return the local file path.
///
/// Idempotent: when the target file already exists it is returned as-is and
/// no network request is made.
pub fn download_checkpoint(
    checkpoint: CitrinetCheckpoint,
    checkpoint_folder: Option<&Path>,
) -> AsrResult<PathBuf> {
    let folder = match checkpoint_folder {
        Some(folder) => folder.to_path_buf(),
        None => default_cache_folder()?,
    };

    let target = folder.join(checkpoint.file_name());
    if target.exists() {
        debug!("{checkpoint}: already cached at {}", target.display());
        return Ok(target);
    }

    std::fs::create_dir_all(&folder)?;

    let url = checkpoint.url();
    info!("{checkpoint}: downloading {url}");

    let response = ureq::get(&url)
        .call()
        .map_err(|e| AsrError::Download(format!("Failed to fetch {url}: {e}")))?;
    if response.status() != 200 {
        return Err(AsrError::Download(format!(
            "Unexpected status {} for {url}",
            response.status()
        )));
    }

    // Stream to a .part file first so an interrupted download never leaves
    // a truncated archive behind under the final name.
    let partial = folder.join(format!("{}.part", checkpoint.file_name()));
    let mut file = std::fs::File::create(&partial)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    std::fs::rename(&partial, &target)?;

    info!("{checkpoint}: saved to {}", target.display());
    Ok(target)
}
