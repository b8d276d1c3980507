//! JSON document loading for requests, snapshots and replay recordings.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::RequestError;

/// Read and deserialize a camelCase JSON document.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, RequestError> {
    let content = std::fs::read_to_string(path).map_err(|e| RequestError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| RequestError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
