//! On-disk index file: `BKRIDX` magic, a little-endian `u16` format version,
//! then a bincode payload of header and backend state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{IndexKind, IndexState, IndexStateRef, VectorIndex};
use crate::distance::DistanceMetric;
use crate::error::{RecError, RecResult};
use crate::persistence::write_atomic;

const MAGIC: &[u8; 6] = b"BKRIDX";
const FORMAT_VERSION: u16 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 2;

/// Metadata stored ahead of the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFileHeader {
    /// Embedder that produced every stored vector.
    pub model_id: String,
    pub metric: DistanceMetric,
    pub kind: IndexKind,
    pub dimensions: Option<usize>,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    header: &'a IndexFileHeader,
    state: IndexStateRef<'a>,
}

#[derive(Deserialize)]
struct IndexFile {
    header: IndexFileHeader,
    state: IndexState,
}

/// Serializes `index` to `path`, replacing any existing file atomically.
pub fn save_index(path: &Path, index: &dyn VectorIndex, model_id: &str) -> RecResult<IndexFileHeader> {
    let header = IndexFileHeader {
        model_id: model_id.to_string(),
        metric: index.metric(),
        kind: index.kind(),
        dimensions: index.dimensions(),
        count: index.len(),
        created_at: Utc::now(),
    };

    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + index.len() * index.dimensions().unwrap_or(0) * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bincode::serialize_into(&mut bytes, &IndexFileRef { header: &header, state: index.state() })?;

    write_atomic(path, &bytes)?;
    debug!(path = ?path, count = header.count, kind = %header.kind, "Saved index file");
    Ok(header)
}

/// Reads an index written by [`save_index`].
pub fn load_index(path: &Path) -> RecResult<(Box<dyn VectorIndex>, IndexFileHeader)> {
    let bytes = fs::read(path).map_err(|e| RecError::io(path, e))?;
    let corrupt = |reason: String| RecError::CorruptFile { path: path.to_path_buf(), reason };

    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not a bookrec index file".to_string()));
    }
    let version = u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {} (expected {})", version, FORMAT_VERSION)));
    }

    let file: IndexFile = bincode::deserialize(&bytes[PREAMBLE_LEN..])
        .map_err(|e| corrupt(format!("undecodable payload: {}", e)))?;
    let header = file.header;
    let index = file.state.into_index();

    if index.len() != header.count {
        return Err(corrupt(format!("header declares {} vectors, payload holds {}", header.count, index.len())));
    }
    if index.kind() != header.kind || index.metric() != header.metric || index.dimensions() != header.dimensions {
        return Err(corrupt("header does not match the stored index".to_string()));
    }

    info!(path = ?path, count = header.count, kind = %header.kind, model_id = %header.model_id, "Loaded index file");
    Ok((index, header))
}
