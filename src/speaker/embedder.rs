//! Speaker embedding extraction

use async_trait::async_trait;

use crate::audio::samples_to_wav;

/// Fixed-length speaker embedding vector
///
/// Owner profiles are stored L2-normalized; runtime embeddings live for one
/// authorization decision.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerEmbedding {
    values: Vec<f32>,
}

impl SpeakerEmbedding {
    /// Wrap a raw vector
    #[must_use]
    pub const fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// The raw vector
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Vector dimensionality
    #[must_use]
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm of the vector
    #[must_use]
    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Return a unit-length copy. A zero vector is returned unchanged.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let norm = self.l2_norm();
        if norm == 0.0 {
            return self.clone();
        }
        Self {
            values: self.values.iter().map(|v| v / norm).collect(),
        }
    }

    /// Cosine similarity with another embedding
    ///
    /// Mismatched dimensions or degenerate zero-norm vectors yield 0.0, so
    /// they can never be misclassified as a match.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }

        let mut dot = 0.0_f32;
        let mut norm_a = 0.0_f32;
        let mut norm_b = 0.0_f32;

        for (x, y) in self.values.iter().zip(other.values.iter()) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom == 0.0 {
            return 0.0;
        }

        dot / denom
    }

    /// Arithmetic mean of several embeddings, re-normalized to unit length
    ///
    /// Returns `None` for an empty list or mismatched dimensions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_of(embeddings: &[Self]) -> Option<Self> {
        let first = embeddings.first()?;
        let dim = first.dim();
        if embeddings.iter().any(|e| e.dim() != dim) {
            return None;
        }

        let mut sum = vec![0.0_f32; dim];
        for embedding in embeddings {
            for (acc, v) in sum.iter_mut().zip(embedding.values.iter()) {
                *acc += v;
            }
        }

        let count = embeddings.len() as f32;
        for v in &mut sum {
            *v /= count;
        }

        Some(Self::new(sum).normalized())
    }

    /// Serialize to little-endian f32 bytes for on-disk storage
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from little-endian f32 bytes
    ///
    /// Returns `None` if the byte length is not a multiple of 4.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 || bytes.is_empty() {
            return None;
        }

        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Some(Self { values })
    }
}

/// Speaker-embedding collaborator contract
///
/// Returns `None` on any extraction failure (audio too short, model error)
/// rather than propagating an error to the caller.
#[async_trait]
pub trait SpeakerEmbedder: Send + Sync {
    /// Extract an embedding from raw mono samples
    async fn embed(&self, samples: &[f32], sample_rate: u32) -> Option<SpeakerEmbedding>;
}

/// Response from the speaker-embedding service
#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// HTTP client for a speaker-embedding service
///
/// Posts the utterance as WAV and expects `{"embedding": [f32, ...]}` back.
pub struct HttpSpeakerEmbedder {
    client: reqwest::Client,
    url: String,
}

impl HttpSpeakerEmbedder {
    /// Create a client for the given service URL
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl SpeakerEmbedder for HttpSpeakerEmbedder {
    async fn embed(&self, samples: &[f32], sample_rate: u32) -> Option<SpeakerEmbedding> {
        let wav = match samples_to_wav(samples, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "embedding WAV encoding failed");
                return None;
            }
        };

        let response = match self
            .client
            .post(&self.url)
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "embedding request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "embedding service error");
            return None;
        }

        match response.json::<EmbeddingResponse>().await {
            Ok(result) if !result.embedding.is_empty() => {
                Some(SpeakerEmbedding::new(result.embedding))
            }
            Ok(_) => {
                tracing::warn!("embedding service returned empty vector");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse embedding response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let a = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        let b = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = SpeakerEmbedding::new(vec![1.0, 0.0]);
        let b = SpeakerEmbedding::new(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let zero = SpeakerEmbedding::new(vec![0.0, 0.0, 0.0]);
        let other = SpeakerEmbedding::new(vec![1.0, 2.0, 3.0]);
        assert!(zero.cosine_similarity(&other).abs() < f32::EPSILON);
        assert!(zero.cosine_similarity(&zero).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = SpeakerEmbedding::new(vec![1.0, 2.0]);
        let b = SpeakerEmbedding::new(vec![1.0, 2.0, 3.0]);
        assert!(a.cosine_similarity(&b).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mean_is_unit_norm() {
        let a = SpeakerEmbedding::new(vec![1.0, 0.0]);
        let b = SpeakerEmbedding::new(vec![0.0, 1.0]);
        let mean = SpeakerEmbedding::mean_of(&[a, b]).unwrap();
        assert!((mean.l2_norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_of_empty_is_none() {
        assert!(SpeakerEmbedding::mean_of(&[]).is_none());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let original = SpeakerEmbedding::new(vec![0.25, -1.5, 3.75]);
        let bytes = original.to_bytes();
        let restored = SpeakerEmbedding::from_bytes(&bytes).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_from_bytes_rejects_ragged_input() {
        assert!(SpeakerEmbedding::from_bytes(&[0, 1, 2]).is_none());
        assert!(SpeakerEmbedding::from_bytes(&[]).is_none());
    }
}
