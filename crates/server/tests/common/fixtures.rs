//! Test fixtures for generating test data.

use bytes::Bytes;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Split a file into `n` chunks of near-equal size, none empty.
#[allow(dead_code)]
pub fn split_chunks(data: &Bytes, n: usize) -> Vec<Bytes> {
    let base = data.len() / n;
    let extra = data.len() % n;
    let mut chunks = Vec::with_capacity(n);
    let mut offset = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        chunks.push(data.slice(offset..offset + len));
        offset += len;
    }
    chunks
}

/// Body of a start-upload request.
#[allow(dead_code)]
pub fn start_body(file_name: &str, file_size: usize, total_chunks: usize) -> Value {
    json!({
        "file_name": file_name,
        "file_size": file_size,
        "total_chunks": total_chunks,
        "owner_id": Uuid::new_v4().to_string(),
        "content_type": "application/zip",
    })
}

/// Body of a completion request publishing a full game version.
#[allow(dead_code)]
pub fn game_version_body(game_id: &str, version: &str) -> Value {
    json!({
        "game_id": game_id,
        "platform": "windows",
        "version": version,
        "final_file_name": format!("{game_id}-{version}.zip"),
        "file_type": "game_version",
        "changelog": "Launch build",
    })
}

/// Body of a completion request publishing an addon version.
#[allow(dead_code)]
pub fn addon_body(game_id: &str, addon_id: Option<&str>, version: &str) -> Value {
    json!({
        "game_id": game_id,
        "platform": "linux",
        "version": version,
        "final_file_name": "addon.pak",
        "file_type": "game_addon",
        "addon_id": addon_id,
    })
}

/// Body of a completion request publishing a patch.
#[allow(dead_code)]
pub fn patch_body(game_id: &str, from: Option<&str>, to: Option<&str>) -> Value {
    json!({
        "game_id": game_id,
        "platform": "windows",
        "final_file_name": "update.patch",
        "file_type": "game_patch",
        "from_version": from,
        "to_version": to,
    })
}
