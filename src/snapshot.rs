//! On-disk snapshot of the vector index.
//!
//! Two artifacts live side by side in the index directory and are only valid
//! together:
//!
//! `vectors.bin`
//! - magic: `b"VIDX"`
//! - version: u8 (1)
//! - model fingerprint: [u8; 32] (SHA-256 of the embedding model name)
//! - dimensions: u32 (little-endian)
//! - count: u64 (little-endian)
//! - vectors: `count × dimensions` f32 (little-endian), already normalized
//!
//! `ids.json`
//! - JSON array of document identifiers, position `i` naming vector `i`

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::index::VectorIndex;

const MAGIC: &[u8; 4] = b"VIDX";
const FORMAT_VERSION: u8 = 1;
/// magic(4) + version(1) + fingerprint(32) + dimensions(4) + count(8)
const HEADER_SIZE: usize = 49;

const VECTORS_FILE: &str = "vectors.bin";
const IDS_FILE: &str = "ids.json";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("no snapshot on disk")]
    Missing,

    #[error("only one of the two snapshot artifacts exists")]
    Partial,

    #[error("snapshot holds {vectors} vectors but {ids} identifiers")]
    CountMismatch { vectors: usize, ids: usize },

    #[error("snapshot is empty")]
    Empty,

    #[error("snapshot dimension {got} does not match expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("snapshot was built with a different embedding model")]
    ModelMismatch,

    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads and writes the snapshot pair under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    fingerprint: [u8; 32],
}

impl SnapshotStore {
    pub fn new(dir: PathBuf, model_name: &str) -> Self {
        Self {
            dir,
            fingerprint: model_fingerprint(model_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn ids_path(&self) -> PathBuf {
        self.dir.join(IDS_FILE)
    }

    /// Write both artifacts. Each file goes to a temp path first and is then
    /// renamed into place.
    pub fn save(&self, index: &VectorIndex) -> Result<(), SnapshotError> {
        std::fs::create_dir_all(&self.dir)?;

        let vectors_tmp = self.vectors_path().with_extension("bin.tmp");
        let ids_tmp = self.ids_path().with_extension("json.tmp");

        let written = self
            .write_vectors(&vectors_tmp, index)
            .and_then(|_| write_ids(&ids_tmp, index.ids()));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&vectors_tmp);
            let _ = std::fs::remove_file(&ids_tmp);
            return Err(e);
        }

        std::fs::rename(&vectors_tmp, self.vectors_path())?;
        std::fs::rename(&ids_tmp, self.ids_path())?;
        Ok(())
    }

    /// Load the pair, accepting it only when it is complete, non-empty,
    /// self-consistent, and compatible with `expected_dims`.
    pub fn load(&self, expected_dims: Option<usize>) -> Result<VectorIndex, SnapshotError> {
        let vectors_path = self.vectors_path();
        let ids_path = self.ids_path();

        match (vectors_path.exists(), ids_path.exists()) {
            (false, false) => return Err(SnapshotError::Missing),
            (true, false) | (false, true) => return Err(SnapshotError::Partial),
            (true, true) => {}
        }

        let mut bytes = Vec::new();
        File::open(&vectors_path)?.read_to_end(&mut bytes)?;
        let header = parse_header(&bytes)?;

        if header.dims == 0 {
            return Err(SnapshotError::Malformed("zero dimensions".to_string()));
        }
        if header.fingerprint != self.fingerprint {
            return Err(SnapshotError::ModelMismatch);
        }
        if let Some(expected) = expected_dims {
            if expected != header.dims {
                return Err(SnapshotError::DimensionMismatch {
                    expected,
                    got: header.dims,
                });
            }
        }

        let ids: Vec<String> = serde_json::from_slice(&std::fs::read(&ids_path)?)
            .map_err(|e| SnapshotError::Malformed(format!("{}: {}", IDS_FILE, e)))?;

        if header.count != ids.len() {
            return Err(SnapshotError::CountMismatch {
                vectors: header.count,
                ids: ids.len(),
            });
        }
        if header.count == 0 {
            return Err(SnapshotError::Empty);
        }

        let payload = &bytes[HEADER_SIZE..];
        let expected_len = header
            .count
            .checked_mul(header.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| SnapshotError::Malformed("vector payload too large".to_string()))?;
        if payload.len() != expected_len {
            return Err(SnapshotError::Malformed(format!(
                "expected {} payload bytes, found {}",
                expected_len,
                payload.len()
            )));
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(VectorIndex::from_parts(header.dims, data, ids))
    }

    /// Delete both artifacts if present.
    pub fn remove(&self) -> Result<(), SnapshotError> {
        for path in [self.vectors_path(), self.ids_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn write_vectors(&self, path: &Path, index: &VectorIndex) -> Result<(), SnapshotError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&[FORMAT_VERSION])?;
        writer.write_all(&self.fingerprint)?;
        writer.write_all(&(index.dims() as u32).to_le_bytes())?;
        writer.write_all(&(index.len() as u64).to_le_bytes())?;
        for value in index.data() {
            writer.write_all(&value.to_le_bytes())?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        file.sync_all()?;
        Ok(())
    }
}

fn write_ids(path: &Path, ids: &[String]) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec(ids)
        .map_err(|e| SnapshotError::Malformed(format!("{}: {}", IDS_FILE, e)))?;
    let mut file = File::create(path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    Ok(())
}

struct Header {
    fingerprint: [u8; 32],
    dims: usize,
    count: usize,
}

fn parse_header(bytes: &[u8]) -> Result<Header, SnapshotError> {
    if bytes.len() < HEADER_SIZE {
        return Err(SnapshotError::Malformed("truncated header".to_string()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(SnapshotError::Malformed("bad magic".to_string()));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(SnapshotError::Malformed(format!(
            "unsupported version {}",
            bytes[4]
        )));
    }

    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&bytes[5..37]);

    let mut dims = [0u8; 4];
    dims.copy_from_slice(&bytes[37..41]);
    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[41..49]);

    Ok(Header {
        fingerprint,
        dims: u32::from_le_bytes(dims) as usize,
        count: u64::from_le_bytes(count) as usize,
    })
}

fn model_fingerprint(model_name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}
