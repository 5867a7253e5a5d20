//! Speaker verification against the enrolled owner profile

use serde::{Deserialize, Serialize};

use super::SpeakerEmbedding;

/// Binary speaker classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpeakerId {
    /// The enrolled owner, authorized for critical intents
    Owner,
    /// Anyone else (including "no owner enrolled")
    Guest,
}

impl std::fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "OWNER"),
            Self::Guest => write!(f, "GUEST"),
        }
    }
}

/// Compares runtime embeddings against the registered owner embedding
#[derive(Debug)]
pub struct SpeakerVerifier {
    owner: Option<SpeakerEmbedding>,
    threshold: f32,
}

impl SpeakerVerifier {
    /// Create a verifier with an optional owner profile and a threshold
    #[must_use]
    pub const fn new(owner: Option<SpeakerEmbedding>, threshold: f32) -> Self {
        Self { owner, threshold }
    }

    /// Classify a runtime embedding as Owner or Guest
    ///
    /// With no owner enrolled, always returns Guest: nothing can be
    /// privileged until enrollment completes.
    #[must_use]
    pub fn verify(&self, embedding: &SpeakerEmbedding) -> SpeakerId {
        let Some(owner) = &self.owner else {
            return SpeakerId::Guest;
        };

        let similarity = owner.cosine_similarity(embedding);
        let result = if similarity >= self.threshold {
            SpeakerId::Owner
        } else {
            SpeakerId::Guest
        };

        tracing::info!(
            similarity,
            threshold = self.threshold,
            result = %result,
            "speaker verification"
        );

        result
    }

    /// Replace the in-memory owner profile (after enrollment reload)
    pub fn set_owner(&mut self, owner: Option<SpeakerEmbedding>) {
        self.owner = owner;
    }

    /// Adjust the similarity threshold at runtime
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
        tracing::info!(threshold, "verification threshold updated");
    }

    /// Whether an owner profile is loaded
    #[must_use]
    pub const fn has_owner(&self) -> bool {
        self.owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_owner_always_guest() {
        let verifier = SpeakerVerifier::new(None, 0.75);
        let embedding = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(verifier.verify(&embedding), SpeakerId::Guest);
    }

    #[test]
    fn test_similar_embedding_is_owner() {
        let owner = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        let verifier = SpeakerVerifier::new(Some(owner), 0.75);

        let close = SpeakerEmbedding::new(vec![0.95, 0.05, 0.0]);
        assert_eq!(verifier.verify(&close), SpeakerId::Owner);
    }

    #[test]
    fn test_distinct_embedding_is_guest() {
        let owner = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        let verifier = SpeakerVerifier::new(Some(owner), 0.75);

        let distinct = SpeakerEmbedding::new(vec![0.0, 1.0, 0.0]);
        assert_eq!(verifier.verify(&distinct), SpeakerId::Guest);
    }

    #[test]
    fn test_zero_norm_never_matches() {
        let owner = SpeakerEmbedding::new(vec![1.0, 0.0, 0.0]);
        let verifier = SpeakerVerifier::new(Some(owner), 0.1);

        let zero = SpeakerEmbedding::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(verifier.verify(&zero), SpeakerId::Guest);
    }

    #[test]
    fn test_threshold_is_runtime_mutable() {
        let owner = SpeakerEmbedding::new(vec![1.0, 0.0]);
        let mut verifier = SpeakerVerifier::new(Some(owner), 0.99);

        let candidate = SpeakerEmbedding::new(vec![0.9, 0.1]);
        assert_eq!(verifier.verify(&candidate), SpeakerId::Guest);

        verifier.set_threshold(0.5);
        assert_eq!(verifier.verify(&candidate), SpeakerId::Owner);
    }
}
