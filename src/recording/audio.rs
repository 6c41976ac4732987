//! Microphone capture and clip encoding.
//!
//! The input stream is opened once per session and keeps running. Every
//! callback feeds the live monitor window used by the waveform; while a
//! recording is active the callback's samples are also kept as a chunk.
//! Stopping a recording concatenates the chunks into a 16-bit mono WAV clip.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use hound::WavWriter;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::visualization::MonitorWindow;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Ordered mono PCM fragments of the current recording.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<i16>>,
}

impl ChunkBuffer {
    /// Appends a chunk. Empty chunks are dropped.
    pub fn push(&mut self, chunk: Vec<i16>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total number of samples across all chunks.
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Joins all chunks in arrival order.
    pub fn concat(&self) -> Vec<i16> {
        self.chunks.concat()
    }
}

/// An encoded audio file ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: String,
}

impl Clip {
    /// Encodes mono samples as a WAV clip named `recording.wav`.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Result<Self> {
        Ok(Self {
            bytes: encode_wav(samples, sample_rate)?,
            file_name: "recording.wav".to_string(),
            mime: "audio/wav".to_string(),
        })
    }

    /// Reads an audio file from disk for upload.
    ///
    /// # Errors
    /// - If the extension does not map to an audio MIME type
    /// - If the file cannot be read
    pub fn from_file(path: &Path) -> Result<Self> {
        let mime = audio_mime_for(path).ok_or_else(|| {
            anyhow!(
                "{} is not an audio file. Only audio/* files can be uploaded.",
                path.display()
            )
        })?;

        let bytes = std::fs::read(path)
            .map_err(|e| anyhow!("Failed to read {}: {e}", path.display()))?;

        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        tracing::debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            mime
        );

        Ok(Self {
            bytes,
            file_name,
            mime: mime.to_string(),
        })
    }
}

/// Maps a file extension to an `audio/*` MIME type.
pub fn audio_mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => return None,
    };
    Some(mime)
}

/// Encodes 16-bit mono PCM as an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let wav_spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Averages interleaved frames down to one channel.
pub fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        0 | 1 => data.to_vec(),
        _ => data
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect(),
    }
}

/// State shared between the input callback and the session.
struct CaptureShared {
    chunks: Mutex<ChunkBuffer>,
    monitor: Mutex<MonitorWindow>,
    capturing: AtomicBool,
}

impl CaptureShared {
    fn accept(&self, mono: Vec<i16>) {
        self.monitor.lock().unwrap().extend(&mono);
        if self.capturing.load(Ordering::Acquire) {
            self.chunks.lock().unwrap().push(mono);
        }
    }
}

/// Microphone input owned by one recorder session.
pub struct Microphone {
    device_name: String,
    sample_rate: u32,
    shared: Arc<CaptureShared>,
    stream: Option<cpal::Stream>,
}

impl Microphone {
    /// Creates a microphone handle. Nothing is opened until [`Microphone::open`].
    ///
    /// # Arguments
    /// * `device_name` - "default", a device index, or a device name
    /// * `requested_sample_rate` - Preferred rate; the device's native rate wins
    /// * `window_size` - Number of recent samples kept for the waveform
    pub fn new(device_name: String, requested_sample_rate: u32, window_size: usize) -> Self {
        Self {
            device_name,
            sample_rate: requested_sample_rate,
            shared: Arc::new(CaptureShared {
                chunks: Mutex::new(ChunkBuffer::default()),
                monitor: Mutex::new(MonitorWindow::new(window_size)),
                capturing: AtomicBool::new(false),
            }),
            stream: None,
        }
    }

    /// Opens the input device and starts streaming into the monitor window.
    ///
    /// # Errors
    /// - If the device is missing or cannot be configured
    /// - If the input stream cannot be built or started
    pub fn open(&mut self) -> Result<()> {
        self.stream = None;

        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_input_device(&host, &self.device_name)
            }
        })?;

        let device_label = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_label);

        let supported = device
            .default_input_config()
            .map_err(|e| anyhow!("Cannot configure {device_label}: {e}"))?;
        let device_sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        if device_sample_rate != self.sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.sample_rate,
                device_sample_rate
            );
        }
        self.sample_rate = device_sample_rate;

        tracing::debug!(
            "Input configuration: {}Hz, {} channels, {:?}",
            device_sample_rate,
            channels,
            supported.sample_format()
        );

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let stream = match sample_format {
            SampleFormat::I16 => self.build_stream::<i16>(&device, &config, channels)?,
            SampleFormat::U16 => self.build_stream::<u16>(&device, &config, channels)?,
            SampleFormat::F32 => self.build_stream::<f32>(&device, &config, channels)?,
            other => return Err(anyhow!("Unsupported input sample format: {other:?}")),
        };

        stream
            .play()
            .map_err(|e| anyhow!("Cannot start microphone stream: {e}"))?;
        self.stream = Some(stream);

        tracing::debug!("Input stream started");
        Ok(())
    }

    fn build_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample,
        i16: cpal::FromSample<T>,
    {
        let shared = Arc::clone(&self.shared);
        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                shared.accept(downmix(&converted, channels));
            },
            |err| {
                tracing::error!("Audio input stream error: {}", err);
            },
            None,
        )?;
        Ok(stream)
    }

    /// Starts a new recording, discarding any earlier chunks.
    pub fn begin(&self) {
        self.shared.chunks.lock().unwrap().clear();
        self.shared.capturing.store(true, Ordering::Release);
        tracing::debug!("Capture started");
    }

    /// Stops the recording and encodes it.
    ///
    /// # Errors
    /// - If nothing was captured
    /// - If WAV encoding fails
    pub fn finish(&self) -> Result<Clip> {
        self.shared.capturing.store(false, Ordering::Release);

        let chunks = self.shared.chunks.lock().unwrap();
        if chunks.is_empty() {
            tracing::warn!("Recording stopped with no samples captured");
            return Err(anyhow!("Nothing was recorded. Check your microphone and try again."));
        }
        let samples = chunks.concat();
        drop(chunks);

        tracing::info!(
            "Recording stopped: {:.2}s ({} samples at {}Hz)",
            samples.len() as f32 / self.sample_rate as f32,
            samples.len(),
            self.sample_rate
        );

        let clip = Clip::from_samples(&samples, self.sample_rate)?;
        tracing::debug!("Encoded clip: {} bytes", clip.bytes.len());
        Ok(clip)
    }

    /// Seconds of audio in the current recording.
    pub fn recorded_secs(&self) -> f32 {
        self.shared.chunks.lock().unwrap().sample_count() as f32 / self.sample_rate as f32
    }

    /// Copy of the latest samples for the waveform.
    pub fn monitor_samples(&self) -> Vec<i16> {
        self.shared.monitor.lock().unwrap().samples()
    }

    /// Actual sample rate, valid after [`Microphone::open`].
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Finds an input device by numeric index or exact name.
///
/// # Errors
/// - If no device matches `device_spec`
pub fn find_input_device(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).ok_or_else(|| {
            anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            )
        });
    }

    devices
        .into_iter()
        .find(|device| device.name().map(|n| n == device_spec).unwrap_or(false))
        .ok_or_else(|| {
            anyhow!(
                "Audio input device '{device_spec}' not found. Use 'charade list-devices' to see available devices."
            )
        })
}

/// Runs `f` with stderr pointed at /dev/null to hide ALSA's device probing noise.
#[cfg(target_os = "linux")]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    if unsafe { libc::dup2(dev_null.as_raw_fd(), libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// No ALSA outside Linux, so nothing to hide.
#[cfg(not(target_os = "linux"))]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_buffer_skips_empty_chunks() {
        let mut buffer = ChunkBuffer::default();
        buffer.push(vec![1, 2]);
        buffer.push(Vec::new());
        buffer.push(vec![3]);

        assert_eq!(buffer.chunks.len(), 2);
        assert_eq!(buffer.sample_count(), 3);
        assert_eq!(buffer.concat(), vec![1, 2, 3]);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.concat().is_empty());
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[5, -5, 7], 1), vec![5, -5, 7]);
        assert_eq!(downmix(&[100, 200, -100, -300], 2), vec![150, -200]);
        assert_eq!(downmix(&[3, 6, 9, 0, 0, 3], 3), vec![6, 1]);
    }

    #[test]
    fn test_encode_wav_writes_riff_header() {
        let bytes = encode_wav(&[0, 1000, -1000, 0], 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn test_begin_clears_previous_recording() {
        let mic = Microphone::new("default".into(), 16000, 64);
        mic.begin();
        mic.shared.accept(vec![1, 2, 3]);
        assert!(mic.finish().is_ok());
        assert!(!mic.shared.capturing.load(Ordering::Acquire));

        mic.shared.accept(vec![9, 9]);
        mic.begin();
        assert!(mic.shared.chunks.lock().unwrap().is_empty());
        assert!(mic.finish().is_err());
    }

    #[test]
    fn test_monitor_fed_while_not_capturing() {
        let mic = Microphone::new("default".into(), 16000, 4);
        mic.shared.accept(vec![1, 2, 3, 4, 5]);
        assert_eq!(mic.monitor_samples(), vec![2, 3, 4, 5]);
        assert!(mic.shared.chunks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_audio_mime_for_extensions() {
        assert_eq!(audio_mime_for(Path::new("a.WAV")), Some("audio/wav"));
        assert_eq!(audio_mime_for(Path::new("hum.webm")), Some("audio/webm"));
        assert_eq!(audio_mime_for(Path::new("x.mp3")), Some("audio/mpeg"));
        assert_eq!(audio_mime_for(Path::new("notes.txt")), None);
        assert_eq!(audio_mime_for(Path::new("noext")), None);
    }

    #[test]
    fn test_clip_from_file_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello").unwrap();
        let err = Clip::from_file(&text).unwrap_err();
        assert!(err.to_string().contains("audio/*"));

        let wav = dir.path().join("hum.wav");
        std::fs::write(&wav, encode_wav(&[1, 2, 3], 8000).unwrap()).unwrap();
        let clip = Clip::from_file(&wav).unwrap();
        assert_eq!(clip.file_name, "hum.wav");
        assert_eq!(clip.mime, "audio/wav");
        assert_eq!(&clip.bytes[0..4], b"RIFF");
    }
}
