//! Auditable composition artifacts with digest verification.

use std::path::{Path, PathBuf};

use crate::controller::CompositionResult;
use crate::domain::digest::sha256_hex;
use crate::domain::{BeatcutError, Result};

const ARTIFACT_FILE: &str = "composition.json";
const DIGEST_FILE: &str = "composition.digest";

/// Persist `<dir>/<request_id>/composition.json` and its `.digest`.
pub fn write_composition_artifact(result: &CompositionResult, dir: &Path) -> Result<PathBuf> {
    let request_dir = dir.join(&result.request_id);
    std::fs::create_dir_all(&request_dir)?;

    let artifact_path = request_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(&artifact_path, &json)?;
    std::fs::write(request_dir.join(DIGEST_FILE), sha256_hex(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read `<dir>/<request_id>/composition.json`, checking it against its digest.
pub fn read_composition_artifact(request_id: &str, dir: &Path) -> Result<CompositionResult> {
    let request_dir = dir.join(request_id);
    let json = std::fs::read(request_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(request_dir.join(DIGEST_FILE))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(BeatcutError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
