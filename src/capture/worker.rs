//! Capture worker process entry point
//!
//! Runs as a child process of the daemon (`nimbus capture-worker`). Loads
//! its own recognizer and embedder, owns the microphone, and streams
//! capture events as JSON lines on stdout. Control signals arrive as JSON
//! lines on stdin.
//!
//! Model or microphone initialization failure is fatal: the process exits
//! nonzero and the supervisor sees the event stream close. Per-frame
//! processing errors are logged and the loop continues.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::audio::{AudioCapture, SAMPLE_RATE};
use crate::capture::CapturePipeline;
use crate::config::Config;
use crate::events::ControlSignal;
use crate::speaker::{HttpSpeakerEmbedder, SpeakerVerifier, VoiceRegistry};
use crate::stt::{SegmentingRecognizer, SpeechToText};
use crate::{Error, Result};

/// Build the STT client for the configured provider
fn build_stt(config: &Config) -> Result<SpeechToText> {
    match config.voice.stt_provider.as_str() {
        "deepgram" => SpeechToText::new_deepgram(
            config.api_keys.deepgram.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        ),
        _ => SpeechToText::new_whisper(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        ),
    }
}

/// Run the capture worker until stdin closes
///
/// # Errors
///
/// Returns error on model or microphone initialization failure; the caller
/// exits the process with a nonzero status.
#[allow(clippy::future_not_send)] // cpal streams aren't Send; runs on the main thread
pub async fn run(config: &Config) -> Result<()> {
    tracing::info!(pid = std::process::id(), "capture worker starting");

    // Model initialization is fatal: the worker is useless without it
    let stt = build_stt(config)?;
    let recognizer = SegmentingRecognizer::new(stt, SAMPLE_RATE);
    let embedder = HttpSpeakerEmbedder::new(config.voice.embedding_url.clone());

    let registry = VoiceRegistry::new(config.profile_path());
    let owner = registry.load_owner_profile().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to load owner profile, verification disabled");
        None
    });
    let verifier = SpeakerVerifier::new(owner, config.security.verify_threshold);

    let mut pipeline =
        CapturePipeline::new(recognizer, Box::new(embedder), verifier, SAMPLE_RATE);

    // Microphone failure is equally fatal
    let mut capture = AudioCapture::open()?;
    tracing::info!("capture worker listening");

    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<ControlSignal>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<ControlSignal>(&line) {
                    Ok(signal) => {
                        if ctrl_tx.send(signal).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line, "malformed control signal"),
                },
                Ok(None) | Err(_) => break,
            }
        }
    });

    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            frame = capture.next_frame() => {
                let Some(frame) = frame else {
                    return Err(Error::Capture("microphone stream ended".to_string()));
                };

                match pipeline.push_frame(&frame).await {
                    Ok(Some(event)) => {
                        let line = serde_json::to_string(&event)?;
                        stdout.write_all(line.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Per-frame decode errors are non-fatal
                        tracing::error!(error = %e, "frame processing error");
                    }
                }
            }
            signal = ctrl_rx.recv() => {
                match signal {
                    Some(signal) => apply_signal(signal, &mut pipeline, &registry),
                    None => {
                        // stdin closed: the daemon is gone
                        tracing::info!("control channel closed, capture worker exiting");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Apply one control signal to the pipeline
fn apply_signal<R: crate::stt::StreamingRecognizer>(
    signal: ControlSignal,
    pipeline: &mut CapturePipeline<R>,
    registry: &VoiceRegistry,
) {
    match signal {
        ControlSignal::Speaking { active } => pipeline.set_speaking(active),
        ControlSignal::Registration { active } => pipeline.set_registration(active),
        ControlSignal::SetThreshold { threshold } => {
            pipeline.verifier_mut().set_threshold(threshold);
        }
        ControlSignal::ReloadProfile => match registry.load_owner_profile() {
            Ok(owner) => {
                tracing::info!(loaded = owner.is_some(), "owner profile reloaded");
                pipeline.verifier_mut().set_owner(owner);
            }
            Err(e) => {
                tracing::error!(error = %e, "owner profile reload failed");
            }
        },
    }
}

/// Exit-code wrapper used by `main` for the hidden subcommand
///
/// # Errors
///
/// Propagates fatal initialization errors
#[allow(clippy::future_not_send)]
pub async fn run_or_die() -> Result<()> {
    let config = Config::load()?;
    run(&config).await.map_err(|e| {
        tracing::error!(error = %e, "capture worker fatal error");
        Error::Capture(e.to_string())
    })
}
