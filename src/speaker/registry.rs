//! Owner voice profile persistence
//!
//! The profile is a single binary file of little-endian f32 values,
//! overwritten wholesale on re-enrollment. Absence of the file means "no
//! owner enrolled". Replacement is an atomic rename so a concurrent reader
//! never observes a partially written profile.

use std::path::{Path, PathBuf};

use super::{SpeakerEmbedder, SpeakerEmbedding};
use crate::{Error, Result};

/// Persists and loads the owner voice embedding
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    profile_path: PathBuf,
}

impl VoiceRegistry {
    /// Create a registry for the given profile path
    #[must_use]
    pub fn new(profile_path: impl Into<PathBuf>) -> Self {
        Self {
            profile_path: profile_path.into(),
        }
    }

    /// Path of the persisted profile
    #[must_use]
    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    /// Whether an owner profile exists on disk
    #[must_use]
    pub fn is_owner_registered(&self) -> bool {
        self.profile_path.exists()
    }

    /// Load the owner embedding, if enrolled
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or decoded
    pub fn load_owner_profile(&self) -> Result<Option<SpeakerEmbedding>> {
        if !self.is_owner_registered() {
            return Ok(None);
        }

        let bytes = std::fs::read(&self.profile_path)?;
        let embedding = SpeakerEmbedding::from_bytes(&bytes).ok_or_else(|| {
            Error::Enrollment(format!(
                "corrupt owner profile at {}",
                self.profile_path.display()
            ))
        })?;

        tracing::debug!(
            dim = embedding.dim(),
            path = %self.profile_path.display(),
            "owner profile loaded"
        );
        Ok(Some(embedding))
    }

    /// Persist an embedding as the owner profile, atomically
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the profile path, so readers see either the old or the new profile,
    /// never a partial write.
    ///
    /// # Errors
    ///
    /// Returns error if the write or rename fails
    pub fn persist_profile(&self, embedding: &SpeakerEmbedding) -> Result<()> {
        let dir = self
            .profile_path
            .parent()
            .ok_or_else(|| Error::Enrollment("profile path has no parent".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &embedding.to_bytes())?;
        tmp.persist(&self.profile_path)
            .map_err(|e| Error::Enrollment(format!("profile swap failed: {e}")))?;

        tracing::info!(
            dim = embedding.dim(),
            path = %self.profile_path.display(),
            "owner profile persisted"
        );
        Ok(())
    }

    /// Extract embeddings from several utterances, average them, and persist
    /// the result as the owner profile
    ///
    /// Extraction failures are discarded; at least one valid embedding is
    /// required. On failure the previous profile, if any, is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if no utterance yields a valid embedding or the
    /// profile cannot be written
    pub async fn register_owner_from_list(
        &self,
        utterances: &[Vec<f32>],
        sample_rate: u32,
        embedder: &dyn SpeakerEmbedder,
    ) -> Result<()> {
        let mut embeddings = Vec::new();
        for audio in utterances {
            if let Some(embedding) = embedder.embed(audio, sample_rate).await {
                embeddings.push(embedding);
            }
        }

        if embeddings.is_empty() {
            return Err(Error::Enrollment(
                "no valid embeddings extracted from enrollment audio".to_string(),
            ));
        }

        let profile = SpeakerEmbedding::mean_of(&embeddings).ok_or_else(|| {
            Error::Enrollment("enrollment embeddings have mismatched dimensions".to_string())
        })?;

        tracing::info!(
            utterances = utterances.len(),
            valid = embeddings.len(),
            "averaging enrollment embeddings"
        );
        self.persist_profile(&profile)
    }

    /// Remove the owner registration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed
    pub fn delete_owner_registration(&self) -> Result<bool> {
        if !self.is_owner_registered() {
            return Ok(false);
        }
        std::fs::remove_file(&self.profile_path)?;
        tracing::info!("owner registration deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedEmbedder {
        value: Option<Vec<f32>>,
    }

    #[async_trait]
    impl SpeakerEmbedder for FixedEmbedder {
        async fn embed(&self, _samples: &[f32], _sample_rate: u32) -> Option<SpeakerEmbedding> {
            self.value.clone().map(SpeakerEmbedding::new)
        }
    }

    fn temp_registry() -> (tempfile::TempDir, VoiceRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = VoiceRegistry::new(dir.path().join("owner_voice.bin"));
        (dir, registry)
    }

    #[test]
    fn test_absent_profile_means_unenrolled() {
        let (_dir, registry) = temp_registry();
        assert!(!registry.is_owner_registered());
        assert!(registry.load_owner_profile().unwrap().is_none());
    }

    #[test]
    fn test_persist_and_reload() {
        let (_dir, registry) = temp_registry();
        let profile = SpeakerEmbedding::new(vec![0.6, 0.8]);
        registry.persist_profile(&profile).unwrap();

        let loaded = registry.load_owner_profile().unwrap().unwrap();
        assert_eq!(loaded, profile);
    }

    #[tokio::test]
    async fn test_register_from_list_normalizes() {
        let (_dir, registry) = temp_registry();
        let embedder = FixedEmbedder {
            value: Some(vec![3.0, 4.0]),
        };

        registry
            .register_owner_from_list(&[vec![0.1; 16000], vec![0.2; 16000]], 16000, &embedder)
            .await
            .unwrap();

        let profile = registry.load_owner_profile().unwrap().unwrap();
        assert!((profile.l2_norm() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_register_empty_list_fails_and_keeps_profile() {
        let (_dir, registry) = temp_registry();
        let prior = SpeakerEmbedding::new(vec![1.0, 0.0]);
        registry.persist_profile(&prior).unwrap();

        let embedder = FixedEmbedder { value: None };
        let result = registry
            .register_owner_from_list(&[], 16000, &embedder)
            .await;
        assert!(result.is_err());

        // Prior profile untouched
        let loaded = registry.load_owner_profile().unwrap().unwrap();
        assert_eq!(loaded, prior);
    }

    #[tokio::test]
    async fn test_register_all_extractions_fail() {
        let (_dir, registry) = temp_registry();
        let embedder = FixedEmbedder { value: None };

        let result = registry
            .register_owner_from_list(&[vec![0.1; 8000]], 16000, &embedder)
            .await;
        assert!(result.is_err());
        assert!(!registry.is_owner_registered());
    }

    #[test]
    fn test_delete_registration() {
        let (_dir, registry) = temp_registry();
        assert!(!registry.delete_owner_registration().unwrap());

        registry
            .persist_profile(&SpeakerEmbedding::new(vec![1.0]))
            .unwrap();
        assert!(registry.delete_owner_registration().unwrap());
        assert!(!registry.is_owner_registered());
    }
}
