//! Speaker identity: embeddings, verification, and owner enrollment

mod embedder;
mod enroll;
mod registry;
mod verifier;

pub use embedder::{HttpSpeakerEmbedder, SpeakerEmbedder, SpeakerEmbedding};
pub use enroll::{EnrollmentFlow, StepOutcome, ENROLLMENT_PHRASES};
pub use registry::VoiceRegistry;
pub use verifier::{SpeakerId, SpeakerVerifier};
