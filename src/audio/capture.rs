//! Microphone capture as a stream of fixed-size frames
//!
//! The device callback chops incoming samples into fixed 100 ms frames and
//! hands them to the consumer over a bounded channel. The callback never
//! blocks: if the consumer falls behind, frames are dropped at the device
//! boundary instead of stalling the audio thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz mono for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per frame (100 ms at 16 kHz)
pub const FRAME_SAMPLES: usize = 1600;

/// Frames buffered between the device callback and the consumer
const FRAME_QUEUE: usize = 32;

/// Open handle on the default microphone
///
/// Dropping the handle stops the capture stream.
pub struct AudioCapture {
    _stream: Stream,
    frames: mpsc::Receiver<Vec<f32>>,
}

impl AudioCapture {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot deliver
    /// 16 kHz mono. This is fatal for the capture worker.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("microphone does not support 16 kHz mono".to_string()))?;
        let config = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "opening microphone"
        );

        let (tx, frames) = mpsc::channel(FRAME_QUEUE);
        let mut carry: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        carry.push(sample);
                        if carry.len() == FRAME_SAMPLES {
                            let frame =
                                std::mem::replace(&mut carry, Vec::with_capacity(FRAME_SAMPLES));
                            // Consumer behind: drop the frame, never block
                            // the audio thread
                            let _ = tx.try_send(frame);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            frames,
        })
    }

    /// Receive the next captured frame
    ///
    /// Returns `None` when the capture stream has ended.
    pub async fn next_frame(&mut self) -> Option<Vec<f32>> {
        self.frames.recv().await
    }
}

/// Convert f32 samples to WAV bytes for STT and embedding APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_to_wav_header() {
        let samples = [0.0, 0.5, -0.5, 1.0, -1.0];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }
}
