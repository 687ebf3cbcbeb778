// Deterministic feature-hashing embeddings
// No network and no model; texts sharing words land close together


use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::{RagError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct HashingProvider;

impl HashingProvider {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Signed bag-of-words projection into `dimensions` buckets, L2-normalized
    #[inline]
    pub fn project(text: &str, dimensions: usize) -> Vec<f32> {
        let mut vector = vec![0.0_f32; dimensions];
        if dimensions == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0_u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str, _model: &str, dimensions: u32) -> Result<Vec<f32>> {
        if dimensions == 0 {
            return Err(RagError::Provider(
                "hashing provider needs at least one dimension".to_string(),
            ));
        }
        Ok(Self::project(text, dimensions as usize))
    }
}
