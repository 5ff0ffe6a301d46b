//! Per-item result records on disk.
//!
//! Each item gets three files under the output directory:
//! - `<stem>.json`: the serialized [`ItemResult`]
//! - `<stem>.digest`: SHA-256 of the JSON bytes
//! - `<stem>.lean`: the rendered artifact, when there is one
//!
//! The stem is the item id itself when it is filename-safe. Otherwise it is
//! the sanitized id plus a short digest of the raw id, so distinct ids never
//! share a stem.
//!
//! Records are written independently, so a crash mid-batch leaves every
//! finished item readable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::error::{FormalizeError, Result};
use crate::domain::result::ItemResult;
use crate::lean::render_lean_file;
use crate::summary::BatchSummary;

const SUMMARY_FILE: &str = "summary.json";

/// Hex digits of the id digest appended to sanitized stems.
const STEM_DIGEST_LEN: usize = 12;

/// Hex SHA-256 of `data`.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// File stem for an item id. Anything outside `[A-Za-z0-9._-]` becomes `_`;
/// when that changes the id, a digest of the raw id is appended.
pub fn record_stem(item_id: &str) -> String {
    let sanitized: String = item_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = match sanitized.trim_start_matches('.') {
        "" => "_",
        s => s,
    };
    if stem == item_id {
        return stem.to_string();
    }
    let digest = digest_hex(item_id.as_bytes());
    format!("{stem}-{}", &digest[..STEM_DIGEST_LEN])
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, item_id: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", record_stem(item_id)))
    }

    /// Write the record for one item, returning the JSON path.
    pub fn write(&self, result: &ItemResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let json_path = self.path(&result.item_id, "json");
        let json = serde_json::to_vec_pretty(result)?;
        std::fs::write(&json_path, &json)?;
        std::fs::write(self.path(&result.item_id, "digest"), digest_hex(&json))?;

        if let (Some(signature), Some(artifact)) = (&result.signature, &result.artifact) {
            std::fs::write(
                self.path(&result.item_id, "lean"),
                render_lean_file(signature, artifact),
            )?;
        }
        Ok(json_path)
    }

    /// Read and verify the record for `item_id`.
    pub fn load(&self, item_id: &str) -> Result<ItemResult> {
        let json_path = self.path(item_id, "json");
        if !json_path.exists() {
            return Err(FormalizeError::RecordNotFound(item_id.to_string()));
        }
        let result = Self::load_path(&json_path)?;
        if result.item_id != item_id {
            return Err(FormalizeError::RecordMismatch {
                requested: item_id.to_string(),
                found: result.item_id,
            });
        }
        Ok(result)
    }

    /// Read and verify a record given the path of its JSON file.
    pub fn load_path(json_path: &Path) -> Result<ItemResult> {
        let json = std::fs::read(json_path)?;
        let expected = std::fs::read_to_string(json_path.with_extension("digest"))?;
        let actual = digest_hex(&json);
        if expected.trim() != actual {
            return Err(FormalizeError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&json)?)
    }

    /// Every verified record in the directory. Unreadable or tampered
    /// records are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<ItemResult>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| p.file_name().is_some_and(|name| name != SUMMARY_FILE))
            .collect();
        paths.sort();

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::load_path(&path) {
                Ok(result) => results.push(result),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable record"),
            }
        }
        Ok(results)
    }

    /// Ids whose verified record is resolved (any status but Fatal).
    pub fn resolved_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(ItemResult::is_resolved)
            .map(|r| r.item_id)
            .collect())
    }

    pub fn write_summary(&self, summary: &BatchSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(SUMMARY_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(summary)?)?;
        Ok(path)
    }
}
