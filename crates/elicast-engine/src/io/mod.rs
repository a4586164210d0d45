use crate::op::{Operation, Timestamp};
use crate::rerecord::{HistorySelection, PastRecording, RerecordError, Rerecording};
use relative_path::{RelativePath, RelativePathBuf};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

const RESOLVED_SUFFIX: &str = ".resolved.json";

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid sessions directory: {0}")]
    InvalidSessionsDir(String),
}

/// A past re-recording exported by the recorder, waiting to be spliced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerecordRequest {
    pub log: Vec<Operation>,
    pub selection: HistorySelection,
    /// Operations recorded over the selection, without recording boundaries.
    pub recorded: Vec<Operation>,
    /// Length of the new recording in milliseconds.
    pub recorded_interval: Timestamp,
    #[serde(default)]
    pub sound_chunk_idx: u32,
    /// Wall-clock time (ms) at which the new recording started.
    #[serde(default)]
    pub started_at: u64,
}

impl RerecordRequest {
    pub fn into_rerecording(self) -> Result<Rerecording, RerecordError> {
        let mut recording = PastRecording::start(self.selection, self.sound_chunk_idx, self.started_at);
        for op in self.recorded {
            recording.record(op);
        }
        recording.finish(
            self.log,
            self.selection.from_ts + self.recorded_interval,
            self.started_at + self.recorded_interval,
        )
    }
}

/// Read an operation log stored as a JSON array
pub fn read_log(relative_path: &RelativePath, sessions_root: &Path) -> Result<Vec<Operation>, IoError> {
    read_json(relative_path, sessions_root)
}

/// Write an operation log as a JSON array
pub fn write_log(
    relative_path: &RelativePath,
    sessions_root: &Path,
    ops: &[Operation],
) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(sessions_root);

    // Create parent directories if they don't exist
    if let Some(parent) = absolute_path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }

    let content = serde_json::to_string_pretty(ops).map_err(|source| IoError::Json {
        path: absolute_path.clone(),
        source,
    })?;
    fs::write(&absolute_path, content).map_err(IoError::Io)
}

pub fn read_request(relative_path: &RelativePath, sessions_root: &Path) -> Result<RerecordRequest, IoError> {
    read_json(relative_path, sessions_root)
}

fn read_json<T: DeserializeOwned>(relative_path: &RelativePath, sessions_root: &Path) -> Result<T, IoError> {
    let absolute_path = relative_path.to_path(sessions_root);
    if !absolute_path.exists() {
        return Err(IoError::NotFound(absolute_path));
    }
    let content = fs::read_to_string(&absolute_path).map_err(IoError::Io)?;
    serde_json::from_str(&content).map_err(|source| IoError::Json {
        path: absolute_path,
        source,
    })
}

/// Session and request files under `sessions_root`, as sorted paths relative
/// to it. Resolved outputs written by the resolver are left out.
pub fn scan_sessions(sessions_root: &Path) -> Result<Vec<RelativePathBuf>, IoError> {
    validate_sessions_dir(sessions_root)?;

    let mut found = Vec::new();
    let mut pending = vec![sessions_root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || name.ends_with(RESOLVED_SUFFIX) {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(sessions_root)
                && let Ok(relative) = RelativePathBuf::from_path(relative)
            {
                found.push(relative);
            }
        }
    }

    found.sort();
    log::debug!("Found {} session files under {}", found.len(), sessions_root.display());
    Ok(found)
}

/// Where the resolved log of `request` is written: `talk/req.json` becomes
/// `talk/req.resolved.json`.
pub fn resolved_path(request: &RelativePath) -> RelativePathBuf {
    let stem = request.file_stem().unwrap_or("request");
    request.with_file_name(format!("{stem}{RESOLVED_SUFFIX}"))
}

pub fn validate_sessions_dir(path: &Path) -> Result<(), IoError> {
    if !path.exists() {
        return Err(IoError::InvalidSessionsDir(format!(
            "{} does not exist",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(IoError::InvalidSessionsDir(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(())
}
