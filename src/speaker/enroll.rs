//! Owner enrollment state machine
//!
//! Three fixed prompt phrases; each accepted repetition contributes its raw
//! audio. Matching is deliberately loose — exact transcription of the prompt
//! is unreliable, so an utterance advances the step if it shares a few words
//! with the expected phrase or is simply long enough.

/// Fixed enrollment prompt phrases, one per step
pub const ENROLLMENT_PHRASES: [&str; 3] = [
    "Activa el protocolo de seguridad por mi voz.",
    "Mi voz es mi contraseña única y personal.",
    "Protege mis archivos y mi sistema operativo.",
];

/// Minimum transcript length that counts as a valid repetition even when no
/// expected word matched
const MIN_UTTERANCE_CHARS: usize = 10;

/// Outcome of feeding one utterance into the enrollment flow
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Utterance not understood; repeat the same prompt
    Retry { prompt: &'static str },
    /// Step accepted; speak the next prompt
    Advance { step: usize, prompt: &'static str },
    /// All steps accepted; the collected audio is ready for embedding
    Finished { utterances: Vec<Vec<f32>> },
}

/// Multi-step enrollment flow
///
/// While an `EnrollmentFlow` exists, the router routes every command event
/// here and nowhere else.
#[derive(Debug)]
pub struct EnrollmentFlow {
    step: usize,
    collected: Vec<Vec<f32>>,
}

impl EnrollmentFlow {
    /// Start a new enrollment at step 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            step: 1,
            collected: Vec::new(),
        }
    }

    /// Current step (1-based)
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Prompt phrase for the current step
    #[must_use]
    pub fn current_prompt(&self) -> &'static str {
        ENROLLMENT_PHRASES[self.step - 1]
    }

    /// Feed one utterance into the flow
    ///
    /// `audio` is the raw utterance snapshot forwarded by the capture worker
    /// in registration mode; it may be absent if the snapshot was dropped.
    pub fn accept(&mut self, transcript: &str, audio: Option<Vec<f32>>) -> StepOutcome {
        let expected = self.current_prompt();
        if !phrase_accepted(transcript, expected) {
            tracing::debug!(step = self.step, transcript, "enrollment utterance rejected");
            return StepOutcome::Retry { prompt: expected };
        }

        tracing::info!(step = self.step, "enrollment step completed");
        if let Some(samples) = audio {
            self.collected.push(samples);
        }

        if self.step < ENROLLMENT_PHRASES.len() {
            self.step += 1;
            StepOutcome::Advance {
                step: self.step,
                prompt: self.current_prompt(),
            }
        } else {
            StepOutcome::Finished {
                utterances: std::mem::take(&mut self.collected),
            }
        }
    }

    /// Number of utterances collected so far
    #[must_use]
    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }
}

impl Default for EnrollmentFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Loose phrase-match heuristic: the transcript contains one of the first
/// three words of the expected phrase, or is longer than a minimal length.
fn phrase_accepted(transcript: &str, expected: &str) -> bool {
    let clean = transcript.to_lowercase();
    let clean = clean.trim();
    if clean.is_empty() {
        return false;
    }

    let expected_lower = expected.to_lowercase();
    let leading_words = expected_lower.split_whitespace().take(3);
    for word in leading_words {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if !word.is_empty() && clean.contains(word) {
            return true;
        }
    }

    clean.chars().count() > MIN_UTTERANCE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_flow() {
        let mut flow = EnrollmentFlow::new();
        assert_eq!(flow.step(), 1);

        let outcome = flow.accept("activa el protocolo", Some(vec![0.1; 8000]));
        assert!(matches!(outcome, StepOutcome::Advance { step: 2, .. }));

        let outcome = flow.accept("mi voz es mi contraseña", Some(vec![0.2; 8000]));
        assert!(matches!(outcome, StepOutcome::Advance { step: 3, .. }));

        let outcome = flow.accept("protege mis archivos", Some(vec![0.3; 8000]));
        match outcome {
            StepOutcome::Finished { utterances } => assert_eq!(utterances.len(), 3),
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn test_unintelligible_utterance_retries() {
        let mut flow = EnrollmentFlow::new();
        let outcome = flow.accept("eh", None);
        assert_eq!(
            outcome,
            StepOutcome::Retry {
                prompt: ENROLLMENT_PHRASES[0]
            }
        );
        assert_eq!(flow.step(), 1);
    }

    #[test]
    fn test_long_mismatched_utterance_still_advances() {
        // Exact transcription is unreliable; length alone is enough
        let mut flow = EnrollmentFlow::new();
        let outcome = flow.accept("una frase bastante larga sin coincidencias", None);
        assert!(matches!(outcome, StepOutcome::Advance { .. }));
    }

    #[test]
    fn test_missing_audio_not_collected() {
        let mut flow = EnrollmentFlow::new();
        flow.accept("activa el protocolo", None);
        assert_eq!(flow.collected_count(), 0);

        flow.accept("mi voz es mi contraseña", Some(vec![0.1; 100]));
        assert_eq!(flow.collected_count(), 1);
    }

    #[test]
    fn test_empty_transcript_rejected() {
        let mut flow = EnrollmentFlow::new();
        assert!(matches!(flow.accept("  ", None), StepOutcome::Retry { .. }));
    }
}
