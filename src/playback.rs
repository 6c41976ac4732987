//! Playback of generated audio through the default output device.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::recording::audio::suppress_alsa_warnings;

/// Mono audio decoded from a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Decodes WAV bytes and downmixes them to mono.
///
/// # Errors
/// - If the bytes are not a readable WAV file
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| anyhow!("Generated audio is not a playable WAV file: {e}"))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow!("Corrupt WAV data: {e}"))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| anyhow!("Corrupt WAV data: {e}"))?
        }
    };

    let samples = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Read position into a mono source played at a different device rate.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    position: f64,
    step: f64,
    len: usize,
}

impl PlaybackCursor {
    pub fn new(len: usize, source_rate: u32, device_rate: u32) -> Self {
        let step = if device_rate == 0 {
            1.0
        } else {
            source_rate as f64 / device_rate as f64
        };
        Self {
            position: 0.0,
            step,
            len,
        }
    }

    /// Returns the next sample, or `None` once the source is exhausted.
    pub fn next_sample(&mut self, samples: &[f32]) -> Option<f32> {
        let index = self.position as usize;
        if index >= self.len {
            return None;
        }
        self.position += self.step;
        samples.get(index).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.position as usize >= self.len
    }

    pub fn rewind(&mut self) {
        self.position = 0.0;
    }

    /// Index of the next source sample.
    pub fn index(&self) -> usize {
        (self.position as usize).min(self.len)
    }
}

struct PlayerShared {
    samples: Vec<f32>,
    cursor: Mutex<PlaybackCursor>,
    playing: Mutex<bool>,
}

/// Plays one decoded artifact. Dropping it closes the output stream.
pub struct Player {
    shared: Arc<PlayerShared>,
    sample_rate: u32,
    duration: Duration,
    ended_reported: bool,
    _stream: cpal::Stream,
}

impl Player {
    /// Opens the default output device, paused at the start of `audio`.
    ///
    /// # Errors
    /// - If no output device is available or it cannot be configured
    pub fn new(audio: DecodedAudio) -> Result<Self> {
        let device = suppress_alsa_warnings(|| {
            cpal::default_host()
                .default_output_device()
                .ok_or_else(|| anyhow!("No audio output device available"))
        })?;

        let supported = device
            .default_output_config()
            .map_err(|e| anyhow!("Cannot configure output device: {e}"))?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        tracing::debug!(
            "Output configuration: {}Hz, {} channels, source {}Hz",
            device_rate,
            channels,
            audio.sample_rate
        );

        let duration = audio.duration();
        let sample_rate = audio.sample_rate;
        let shared = Arc::new(PlayerShared {
            cursor: Mutex::new(PlaybackCursor::new(
                audio.samples.len(),
                audio.sample_rate,
                device_rate,
            )),
            samples: audio.samples,
            playing: Mutex::new(false),
        });

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(&device, &config, channels, &shared)?,
            SampleFormat::I16 => build_output::<i16>(&device, &config, channels, &shared)?,
            SampleFormat::U16 => build_output::<u16>(&device, &config, channels, &shared)?,
            other => return Err(anyhow!("Unsupported output sample format: {other:?}")),
        };
        stream
            .play()
            .map_err(|e| anyhow!("Cannot start audio output: {e}"))?;

        Ok(Self {
            shared,
            sample_rate,
            duration,
            ended_reported: false,
            _stream: stream,
        })
    }

    pub fn play(&mut self) {
        if self.shared.cursor.lock().unwrap().is_finished() {
            self.rewind();
        }
        self.ended_reported = false;
        *self.shared.playing.lock().unwrap() = true;
        tracing::debug!("Playback started");
    }

    pub fn pause(&self) {
        *self.shared.playing.lock().unwrap() = false;
        tracing::debug!("Playback paused at {:?}", self.position());
    }

    pub fn rewind(&self) {
        self.shared.cursor.lock().unwrap().rewind();
    }

    /// Returns true once when playback has run off the end.
    pub fn take_ended(&mut self) -> bool {
        let finished = self.shared.cursor.lock().unwrap().is_finished();
        if finished && !self.ended_reported {
            self.ended_reported = true;
            *self.shared.playing.lock().unwrap() = false;
            return true;
        }
        false
    }

    pub fn position(&self) -> Duration {
        let index = self.shared.cursor.lock().unwrap().index();
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(index as f64 / self.sample_rate as f64)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    shared: &Arc<PlayerShared>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let shared = Arc::clone(shared);
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let playing = *shared.playing.lock().unwrap();
            let mut cursor = shared.cursor.lock().unwrap();
            for frame in data.chunks_mut(channels.max(1)) {
                let value = if playing {
                    cursor.next_sample(&shared.samples).unwrap_or(0.0)
                } else {
                    0.0
                };
                let sample = T::from_sample(value);
                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        |err| {
            tracing::error!("Audio output stream error: {}", err);
        },
        None,
    )?;
    Ok(stream)
}

/// Formats a time as `m:ss`, or `--` when unknown.
pub fn format_time(time: Option<Duration>) -> String {
    match time {
        Some(t) => {
            let secs = t.as_secs();
            format!("{}:{:02}", secs / 60, secs % 60)
        }
        None => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::audio::encode_wav;

    #[test]
    fn test_decode_wav_int_mono() {
        let bytes = encode_wav(&[0, 16384, -16384, 0], 8000).unwrap();
        let audio = decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples, vec![0.0, 0.5, -0.5, 0.0]);
        assert_eq!(audio.duration().as_micros(), 500);
    }

    #[test]
    fn test_decode_wav_stereo_float() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 4,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [1.0f32, 0.0, -0.5, -0.5] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let audio = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(audio.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_wav(b"not audio at all").is_err());
    }

    #[test]
    fn test_cursor_runs_to_end_and_rewinds() {
        let samples = [0.1, 0.2, 0.3];
        let mut cursor = PlaybackCursor::new(samples.len(), 8000, 8000);

        assert_eq!(cursor.next_sample(&samples), Some(0.1));
        assert_eq!(cursor.next_sample(&samples), Some(0.2));
        assert!(!cursor.is_finished());
        assert_eq!(cursor.next_sample(&samples), Some(0.3));
        assert!(cursor.is_finished());
        assert_eq!(cursor.next_sample(&samples), None);

        cursor.rewind();
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.next_sample(&samples), Some(0.1));
    }

    #[test]
    fn test_cursor_resamples() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        // Source at half the device rate: every sample is played twice.
        let mut cursor = PlaybackCursor::new(samples.len(), 4000, 8000);
        let played: Vec<f32> = std::iter::from_fn(|| cursor.next_sample(&samples)).collect();
        assert_eq!(played, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);

        let mut cursor = PlaybackCursor::new(samples.len(), 16000, 8000);
        let played: Vec<f32> = std::iter::from_fn(|| cursor.next_sample(&samples)).collect();
        assert_eq!(played, vec![1.0, 3.0]);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(None), "--");
        assert_eq!(format_time(Some(Duration::from_secs(0))), "0:00");
        assert_eq!(format_time(Some(Duration::from_millis(65_900))), "1:05");
    }
}
