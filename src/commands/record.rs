//! The recorder session: record, generate, play back.
//!
//! Runs the frame loop that ties the session state machine to the
//! microphone, the generation service, the artifact store and the player.
//! `upload` runs the same session with a file submitted up front.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::artifact::{self, ArtifactStore, DEFAULT_DOWNLOAD_NAME};
use crate::config::CharadeConfig;
use crate::generation::GenerationClient;
use crate::playback::{decode_wav, Player};
use crate::recording::{Clip, LevelMeter, Microphone, RecorderTui, SessionView, UiCommand};
use crate::session::{Effect, Event, Session, SessionState};
use crate::ui::ErrorScreen;

/// Records from the microphone and generates music from the take.
///
/// # Arguments
/// * `output` - Where to save the generated audio once it arrives
pub async fn handle_record(output: Option<PathBuf>) -> Result<(), anyhow::Error> {
    tracing::info!("=== charade Recorder Started ===");
    run_session(None, output).await
}

/// Generates music from an existing audio file instead of a recording.
///
/// # Arguments
/// * `file` - Audio file to upload
/// * `output` - Where to save the generated audio once it arrives
pub async fn handle_upload(file: PathBuf, output: Option<PathBuf>) -> Result<(), anyhow::Error> {
    tracing::info!("=== charade Upload Started: {} ===", file.display());
    if !file.exists() {
        return Err(anyhow::anyhow!("Audio file not found: {}", file.display()));
    }
    run_session(Some(file), output).await
}

async fn run_session(
    pending_file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), anyhow::Error> {
    let config = match CharadeConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            let mut error_screen = ErrorScreen::new()?;
            error_screen.show_error(&format!(
                "Configuration Error:\n\n{err}\n\nPlease check your ~/.config/charade/charade.toml file and try again."
            ))?;
            error_screen.cleanup()?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, window={}, endpoint={}",
        config.audio.device,
        config.audio.sample_rate,
        config.audio.window_size,
        config.generation.endpoint
    );

    let mut recorder = Recorder::new(&config, pending_file, output)?;

    let mut tui = RecorderTui::new().map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    let external_press = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&external_press))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    // Show the loading screen before the microphone blocks.
    tui.render(&recorder.view())
        .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;
    recorder.start();

    loop {
        recorder.poll_upload().await;
        recorder.poll_playback();

        if external_press.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: pressing the action button");
            recorder.press();
        }

        recorder.refresh_monitor();
        tui.render(&recorder.view())
            .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;

        match tui.handle_input(recorder.session.accepts_file()) {
            Ok(UiCommand::Continue) => {}
            Ok(UiCommand::Action) => recorder.press(),
            Ok(UiCommand::SubmitFile(path)) => recorder.choose_file(path),
            Ok(UiCommand::Save) => recorder.save_download(),
            Ok(UiCommand::Quit) => break,
            Err(e) => {
                tracing::error!("Input handling error: {}", e);
                return Err(anyhow::anyhow!("Input handling error: {e}"));
            }
        }
    }

    tui.cleanup()
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {e}"))?;

    if let Some(upload) = recorder.upload.take() {
        tracing::warn!("Leaving while a generation request is still running");
        upload.abort();
    }
    for path in &recorder.saved {
        println!("Saved {}", path.display());
    }

    tracing::info!(
        "=== charade Recorder Exited in state {} ===",
        recorder.session.state()
    );
    Ok(())
}

/// Everything one session owns. Dropped in field order on exit.
struct Recorder {
    session: Session,
    player: Option<Player>,
    microphone: Microphone,
    meter: LevelMeter,
    client: GenerationClient,
    artifacts: ArtifactStore,
    upload: Option<JoinHandle<anyhow::Result<Vec<u8>>>>,
    captured: Option<anyhow::Result<Clip>>,
    pending_file: Option<PathBuf>,
    output: Option<PathBuf>,
    saved: Vec<PathBuf>,
    monitor: Vec<i16>,
    notice: Option<String>,
    window_size: usize,
    peak_volume_threshold: u8,
}

impl Recorder {
    fn new(
        config: &CharadeConfig,
        pending_file: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            session: Session::new(),
            player: None,
            microphone: Microphone::new(
                config.audio.device.clone(),
                config.audio.sample_rate,
                config.audio.window_size,
            ),
            meter: LevelMeter::new(config.audio.reference_level_db),
            client: GenerationClient::new(&config.generation)?,
            artifacts: ArtifactStore::for_process()?,
            upload: None,
            captured: None,
            pending_file,
            output,
            saved: Vec::new(),
            monitor: Vec::new(),
            notice: None,
            window_size: config.audio.window_size,
            peak_volume_threshold: config.audio.peak_volume_threshold,
        })
    }

    /// Runs the session's entry effects, then submits a pending file if any.
    fn start(&mut self) {
        for effect in self.session.entry_effects() {
            self.run_effect(effect);
        }
        self.submit_pending_file();
    }

    fn dispatch(&mut self, event: Event) {
        for effect in self.session.apply(event) {
            self.run_effect(effect);
        }
    }

    fn press(&mut self) {
        match self.session.press() {
            Some(event) => self.dispatch(event),
            None => tracing::debug!("Action disabled in state {}", self.session.state()),
        }
    }

    fn choose_file(&mut self, path: PathBuf) {
        if self.session.accepts_file() {
            self.dispatch(Event::FileChosen(path));
        }
    }

    fn submit_pending_file(&mut self) {
        if self.session.accepts_file() {
            if let Some(path) = self.pending_file.take() {
                self.dispatch(Event::FileChosen(path));
            }
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        tracing::debug!("Running effect {:?}", effect);
        match effect {
            Effect::RequestMicrophone => match self.microphone.open() {
                Ok(()) => self.dispatch(Event::PermissionGranted),
                Err(e) => {
                    tracing::error!("Failed to open microphone: {e}");
                    self.dispatch(Event::PermissionDenied(format!(
                        "Could not access the microphone: {e}"
                    )));
                }
            },
            Effect::StartCapture => {
                self.microphone.begin();
                self.notice = None;
            }
            Effect::StopCapture => {
                self.captured = Some(self.microphone.finish());
            }
            Effect::UploadRecording => match self.captured.take() {
                Some(Ok(clip)) => self.start_upload(clip),
                Some(Err(e)) => self.dispatch(Event::GenerationFailed(e.to_string())),
                None => self.dispatch(Event::GenerationFailed(
                    "No recording to upload.".to_string(),
                )),
            },
            Effect::UploadFile(path) => match Clip::from_file(&path) {
                Ok(clip) => self.start_upload(clip),
                Err(e) => {
                    tracing::error!("Cannot upload {}: {e}", path.display());
                    self.dispatch(Event::GenerationFailed(e.to_string()));
                }
            },
            Effect::Play => match self.player.as_mut() {
                Some(player) => player.play(),
                None => {
                    self.notice = Some("Playback unavailable".to_string());
                    self.dispatch(Event::PlaybackEnded);
                }
            },
            Effect::Pause => {
                if let Some(player) = &self.player {
                    player.pause();
                }
            }
            Effect::Rewind => {
                if let Some(player) = &self.player {
                    player.rewind();
                }
            }
        }
    }

    fn start_upload(&mut self, clip: Clip) {
        tracing::info!(
            "Uploading {} ({} bytes) to {}",
            clip.file_name,
            clip.bytes.len(),
            self.client.url()
        );
        let client = self.client.clone();
        self.upload = Some(tokio::spawn(async move { client.generate(clip).await }));
    }

    /// Finishes the upload once its task is done.
    async fn poll_upload(&mut self) {
        if !self.upload.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.upload.take() else {
            return;
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("Generation task failed: {e}")),
        };

        match result.and_then(|bytes| self.accept_artifact(&bytes)) {
            Ok(()) => self.dispatch(Event::GenerationSucceeded),
            Err(e) => {
                tracing::error!("Generation failed: {e}");
                self.dispatch(Event::GenerationFailed(e.to_string()));
            }
        }
        self.submit_pending_file();
    }

    /// Stores the generated audio and loads it for playback.
    fn accept_artifact(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.player = None;
        let artifact = self.artifacts.replace(bytes)?;
        tracing::info!("Generated audio stored at {}", artifact.path.display());

        let loaded = self
            .artifacts
            .read()
            .and_then(|stored| decode_wav(&stored))
            .and_then(Player::new);
        match loaded {
            Ok(player) => {
                tracing::info!("Generated audio loaded: {:?}", player.duration());
                self.player = Some(player);
            }
            Err(e) => {
                tracing::warn!("Generated audio cannot be played here: {e}");
                self.notice = Some(format!("Playback unavailable: {e}"));
            }
        }

        match artifact::last_output_path() {
            Ok(path) => {
                if let Err(e) = self.artifacts.save_as(&path) {
                    tracing::warn!("Failed to keep a copy for replay: {e}");
                }
            }
            Err(e) => tracing::warn!("No data directory for replay copy: {e}"),
        }

        if let Some(dest) = self.output.clone() {
            self.save_to(dest);
        }
        Ok(())
    }

    fn poll_playback(&mut self) {
        if self.session.state() != SessionState::Playing {
            return;
        }
        if self.player.as_mut().is_some_and(|p| p.take_ended()) {
            self.dispatch(Event::PlaybackEnded);
        }
    }

    /// Saves the generated audio under the suggested name in the working directory.
    fn save_download(&mut self) {
        if self.artifacts.current().is_none() {
            self.notice = Some("Nothing generated yet".to_string());
            return;
        }
        self.save_to(PathBuf::from(DEFAULT_DOWNLOAD_NAME));
    }

    fn save_to(&mut self, dest: PathBuf) {
        match self.artifacts.save_as(&dest) {
            Ok(()) => {
                self.notice = Some(format!("Saved {}", dest.display()));
                if !self.saved.contains(&dest) {
                    self.saved.push(dest);
                }
            }
            Err(e) => {
                tracing::error!("Save failed: {e}");
                self.notice = Some(format!("Save failed: {e}"));
            }
        }
    }

    /// Pulls the latest microphone samples for this frame.
    fn refresh_monitor(&mut self) {
        if self.session.state() == SessionState::Recording {
            self.monitor = self.microphone.monitor_samples();
            self.meter.update(&self.monitor, self.microphone.sample_rate());
        } else {
            self.monitor.clear();
        }
    }

    fn view(&self) -> SessionView<'_> {
        SessionView {
            state: self.session.state(),
            action: self.session.action(),
            action_enabled: self.session.is_action_enabled(),
            accepts_file: self.session.accepts_file(),
            error: self.session.error(),
            monitor: &self.monitor,
            window_size: self.window_size,
            elapsed: if self.session.state() == SessionState::Recording {
                Duration::from_secs_f32(self.microphone.recorded_secs())
            } else {
                Duration::ZERO
            },
            volume: self.meter.volume(),
            peak: self.meter.peak(),
            peak_volume_threshold: self.peak_volume_threshold,
            playback: self.player.as_ref().map(|p| (p.position(), p.duration())),
            notice: self.notice.as_deref(),
        }
    }
}
