//! SHA-256 verification of model snapshot files
//!
//! Hashes weight, config and tokenizer files under a directory and compares
//! them by file name against an optional reference map.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Result, SomniaError};

/// Extensions of weight files
pub const MODEL_EXTENSIONS: &[&str] = &["bin", "safetensors", "pt", "pth", "ckpt"];

/// Non-weight files worth hashing
pub const MODEL_FILE_NAMES: &[&str] = &[
    "config.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "pytorch_model.bin.index.json",
    "model.safetensors.index.json",
];

const CHUNK_SIZE: usize = 64 * 1024;

/// Overall verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    /// No reference given; hashes only
    Calculated,
    /// Every reference entry present and matching
    Verified,
    /// At least one file differs or is missing
    Mismatch,
}

/// Result of hashing a model directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashReport {
    /// Directory that was scanned
    pub model_path: PathBuf,
    /// Number of model files found
    pub total_files: usize,
    /// File name to hex digest
    pub hashes: BTreeMap<String, String>,
    /// Files whose digest matched the reference
    pub verified_files: Vec<String>,
    /// Files whose digest differed from the reference
    pub mismatched_files: Vec<String>,
    /// Reference entries with no matching file
    pub missing_files: Vec<String>,
    /// Overall outcome
    pub status: VerifyStatus,
}

/// Whether `path` names a file that should be hashed
#[must_use]
pub fn is_model_file(path: &Path) -> bool {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext));
    let by_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| MODEL_FILE_NAMES.contains(&name));
    by_ext || by_name
}

/// Model files under `dir`, recursively, in sorted order
///
/// # Errors
///
/// Returns [`SomniaError::IoError`] if a directory cannot be listed.
pub fn find_model_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_model_file(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Hex SHA-256 of a file, streamed in chunks
///
/// # Errors
///
/// Returns [`SomniaError::IoError`] if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash every model file under `dir` and compare against `reference`
///
/// # Errors
///
/// Returns [`SomniaError::IoError`] if `dir` holds no model files or a file
/// cannot be read.
pub fn verify_dir(dir: &Path, reference: Option<&BTreeMap<String, String>>) -> Result<HashReport> {
    info!(dir = %dir.display(), "Scanning model directory");
    let files = find_model_files(dir)?;
    if files.is_empty() {
        return Err(SomniaError::IoError {
            message: format!("No model files found in {}", dir.display()),
        });
    }

    let mut report = HashReport {
        model_path: dir.to_path_buf(),
        total_files: files.len(),
        hashes: BTreeMap::new(),
        verified_files: Vec::new(),
        mismatched_files: Vec::new(),
        missing_files: Vec::new(),
        status: VerifyStatus::Calculated,
    };

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let digest = sha256_file(path)?;
        debug!(file = %name, digest = %&digest[..16], "Hashed");

        if let Some(expected) = reference.and_then(|r| r.get(&name)) {
            if expected.eq_ignore_ascii_case(&digest) {
                report.verified_files.push(name.clone());
            } else {
                warn!(file = %name, "Digest mismatch");
                report.mismatched_files.push(name.clone());
            }
        }
        report.hashes.insert(name, digest);
    }

    if let Some(reference) = reference {
        report.missing_files = reference
            .keys()
            .filter(|name| !report.hashes.contains_key(*name))
            .cloned()
            .collect();
        report.status = if report.mismatched_files.is_empty() && report.missing_files.is_empty() {
            VerifyStatus::Verified
        } else {
            VerifyStatus::Mismatch
        };
    }

    info!(
        files = report.total_files,
        status = ?report.status,
        mismatched = report.mismatched_files.len(),
        missing = report.missing_files.len(),
        "Verification finished"
    );
    Ok(report)
}

/// Read a reference map (file name to hex digest) from JSON
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON object of strings.
pub fn load_reference(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| SomniaError::FormatError {
        reason: format!("Invalid reference file {}: {e}", path.display()),
    })
}

/// Write a digest map as pretty-printed JSON
///
/// # Errors
///
/// Returns [`SomniaError::IoError`] if the file cannot be written.
pub fn save_hashes(hashes: &BTreeMap<String, String>, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(hashes).map_err(|e| SomniaError::FormatError {
        reason: e.to_string(),
    })?;
    std::fs::write(path, json)?;
    Ok(())
}
