//! Chunk numbering and per-chunk digests.

use crate::hash::ContentHash;
use crate::upload::UploadId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based chunk position within an upload.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkNumber(u32);

impl ChunkNumber {
    /// Validate a chunk number against the total chunk count of a session.
    pub fn new(number: u32, total_chunks: u32) -> crate::Result<Self> {
        if number == 0 || number > total_chunks {
            return Err(crate::Error::InvalidChunkNumber {
                number,
                total: total_chunks,
            });
        }
        Ok(Self(number))
    }

    /// Iterate chunk numbers `1..=total_chunks` in ascending order.
    pub fn all(total_chunks: u32) -> impl Iterator<Item = ChunkNumber> {
        (1..=total_chunks).map(ChunkNumber)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Scratch object key for this chunk of the given upload.
    ///
    /// Zero-padded so that a lexicographic listing returns chunks in order.
    pub fn to_object_key(&self, upload_id: &UploadId) -> String {
        format!("{}{:08}", chunk_prefix(upload_id), self.0)
    }
}

impl fmt::Debug for ChunkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkNumber({})", self.0)
    }
}

impl fmt::Display for ChunkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scratch key prefix holding every chunk of one upload.
pub fn chunk_prefix(upload_id: &UploadId) -> String {
    format!("uploads/{upload_id}/chunks/")
}

/// Size and hash of one chunk as it was received.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDigest {
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the chunk bytes.
    pub hash: ContentHash,
}

impl ChunkDigest {
    /// Digest chunk data.
    pub fn of(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            hash: ContentHash::compute(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_number_bounds() {
        assert!(ChunkNumber::new(0, 3).is_err());
        assert!(ChunkNumber::new(4, 3).is_err());
        assert_eq!(ChunkNumber::new(3, 3).unwrap().get(), 3);
    }

    #[test]
    fn test_object_keys_sort_in_chunk_order() {
        let id = UploadId::new();
        let k9 = ChunkNumber::new(9, 12).unwrap().to_object_key(&id);
        let k10 = ChunkNumber::new(10, 12).unwrap().to_object_key(&id);
        assert!(k9 < k10);
        assert!(k9.starts_with(&chunk_prefix(&id)));
    }

    #[test]
    fn test_all_is_ascending() {
        let numbers: Vec<u32> = ChunkNumber::all(3).map(|n| n.get()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
