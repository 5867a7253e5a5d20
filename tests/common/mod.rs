//! Shared test doubles for pipeline and router tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use nimbus_assistant::capture::CaptureControl;
use nimbus_assistant::chat::{ChatModel, ChatTurn};
use nimbus_assistant::context::{ContextProbe, ForegroundContext};
use nimbus_assistant::router::{IntentClassifier, IntentResolution};
use nimbus_assistant::speaker::{SpeakerEmbedder, SpeakerEmbedding};
use nimbus_assistant::speech::SpeechOutput;
use nimbus_assistant::stt::{StreamingRecognizer, Transcript};
use nimbus_assistant::ui::{AvatarUi, UiState};
use nimbus_assistant::Result;

/// Recognizer that replays a scripted sequence of results
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Option<Transcript>>>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<Option<Transcript>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl StreamingRecognizer for ScriptedRecognizer {
    async fn accept(&mut self, _frame: &[f32]) -> Result<Option<Transcript>> {
        Ok(self.script.lock().unwrap().pop_front().flatten())
    }
}

/// Embedder that returns a fixed vector and counts invocations
pub struct FixedEmbedder {
    pub value: Option<Vec<f32>>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(value: Option<Vec<f32>>) -> Self {
        Self {
            value,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeakerEmbedder for FixedEmbedder {
    async fn embed(&self, _samples: &[f32], _sample_rate: u32) -> Option<SpeakerEmbedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value.clone().map(SpeakerEmbedding::new)
    }
}

/// Speech output that records calls instead of playing audio
#[derive(Default)]
pub struct FakeSpeech {
    pub spoken: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    pub speaking: AtomicBool,
    pub current: Mutex<String>,
    pub voice: Mutex<String>,
}

impl FakeSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the engine being mid-utterance
    pub fn start_speaking(&self, text: &str) {
        self.speaking.store(true, Ordering::SeqCst);
        *self.current.lock().unwrap() = text.to_string();
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.spoken.lock().unwrap().last().cloned()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SpeechOutput for FakeSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.current.lock().unwrap().clear();
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn current_text(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn set_voice(&self, voice: &str) {
        *self.voice.lock().unwrap() = voice.to_string();
    }
}

/// Capture control that records every signal
#[derive(Default)]
pub struct FakeCapture {
    pub speaking: Mutex<Vec<bool>>,
    pub registration: Mutex<Vec<bool>>,
    pub reloads: AtomicUsize,
    pub thresholds: Mutex<Vec<f32>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn last_registration(&self) -> Option<bool> {
        self.registration.lock().unwrap().last().copied()
    }

    pub fn last_speaking(&self) -> Option<bool> {
        self.speaking.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl CaptureControl for FakeCapture {
    async fn set_speaking(&self, active: bool) {
        self.speaking.lock().unwrap().push(active);
    }

    async fn set_registration(&self, active: bool) {
        self.registration.lock().unwrap().push(active);
    }

    async fn reload_profile(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    async fn set_threshold(&self, threshold: f32) {
        self.thresholds.lock().unwrap().push(threshold);
    }
}

/// Classifier backed by a fixed text → resolution table
pub struct TableClassifier {
    pub table: HashMap<String, IntentResolution>,
    pub calls: AtomicUsize,
}

impl TableClassifier {
    pub fn new(entries: Vec<(&str, IntentResolution)>) -> Arc<Self> {
        Arc::new(Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for TableClassifier {
    async fn classify(&self, text: &str) -> Result<IntentResolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| IntentResolution::general_chat(text)))
    }
}

/// Chat model that streams preset sentences
pub struct ScriptedChat {
    pub sentences: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(sentences: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            sentences: sentences.into_iter().map(String::from).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_chat(
        &self,
        _prompt: &str,
        _history: &[ChatTurn],
    ) -> Result<mpsc::Receiver<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        let sentences = self.sentences.clone();
        tokio::spawn(async move {
            for sentence in sentences {
                if tx.send(sentence).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Probe returning an empty context
pub struct StaticProbe;

#[async_trait]
impl ContextProbe for StaticProbe {
    async fn current(&self) -> ForegroundContext {
        ForegroundContext::default()
    }
}

/// UI recording state transitions and messages
#[derive(Default)]
pub struct RecordingUi {
    pub states: Mutex<Vec<UiState>>,
    pub chat_shown: AtomicUsize,
    pub chat_hidden: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl AvatarUi for RecordingUi {
    fn set_state(&self, state: UiState) {
        self.states.lock().unwrap().push(state);
    }

    fn show_chat(&self) {
        self.chat_shown.fetch_add(1, Ordering::SeqCst);
    }

    fn hide_chat(&self) {
        self.chat_hidden.fetch_add(1, Ordering::SeqCst);
    }

    fn assistant_message(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}
