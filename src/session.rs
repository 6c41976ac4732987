//! Recorder session state machine.
//!
//! A session moves through loading, recording, generating and playback states.
//! All transitions go through [`Session::apply`], which returns the side effects
//! the controller has to carry out. The session itself never touches audio
//! devices, the network or the terminal.

use std::fmt;

/// The state a recorder session is in. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the microphone to open
    Loading,
    /// Microphone open, nothing recorded yet
    ReadyToRecord,
    /// Capturing microphone input
    Recording,
    /// Clip uploaded, waiting for the generated audio
    Generating,
    /// Generated audio available and not playing
    Paused,
    /// Generated audio playing
    Playing,
    /// A recoverable failure; see [`Session::error`]
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Loading => "loading",
            Self::ReadyToRecord => "readyToRecord",
            Self::Recording => "recording",
            Self::Generating => "generating",
            Self::Paused => "paused",
            Self::Playing => "playing",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Which async boundary an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The microphone could not be opened
    Capture,
    /// The upload failed or the service answered with an error
    Generation,
}

/// A user-facing error with its recovery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    fn new(kind: ErrorKind, message: String) -> Self {
        let message = if message.trim().is_empty() {
            match kind {
                ErrorKind::Capture => "Could not access the microphone.".to_string(),
                ErrorKind::Generation => "Could not generate music from the recording.".to_string(),
            }
        } else {
            message
        };
        Self { kind, message }
    }
}

/// Inputs to the state machine: key presses and async completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PermissionGranted,
    PermissionDenied(String),
    ActionPressed,
    /// An audio file was picked as an alternative to recording
    FileChosen(std::path::PathBuf),
    GenerationSucceeded,
    GenerationFailed(String),
    PlaybackEnded,
    Retry,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RequestMicrophone,
    StartCapture,
    StopCapture,
    UploadRecording,
    UploadFile(std::path::PathBuf),
    Play,
    Pause,
    Rewind,
}

/// The single control offered in each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Record,
    Stop,
    Play,
    Pause,
    Retry,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Stop => "stop",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Retry => "retry",
        }
    }
}

/// One recorder session, from start-up to exit.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    error: Option<SessionError>,
    microphone_ready: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session in `Loading`. The caller must perform
    /// [`Session::entry_effects`] to get it going.
    pub fn new() -> Self {
        Self {
            state: SessionState::Loading,
            error: None,
            microphone_ready: false,
        }
    }

    /// Effects to run when the session starts.
    pub fn entry_effects(&self) -> Vec<Effect> {
        vec![Effect::RequestMicrophone]
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// The control shown for the current state.
    pub fn action(&self) -> Action {
        match self.state {
            SessionState::Loading | SessionState::ReadyToRecord => Action::Record,
            SessionState::Recording | SessionState::Generating => Action::Stop,
            SessionState::Paused => Action::Play,
            SessionState::Playing => Action::Pause,
            SessionState::Error => Action::Retry,
        }
    }

    /// Whether the action control responds. Disabled while loading and generating.
    pub fn is_action_enabled(&self) -> bool {
        !matches!(self.state, SessionState::Loading | SessionState::Generating)
    }

    /// Whether an audio file can be submitted instead of a recording.
    pub fn accepts_file(&self) -> bool {
        matches!(
            self.state,
            SessionState::ReadyToRecord | SessionState::Paused | SessionState::Error
        )
    }

    /// Maps a press of the action control to the event it stands for.
    ///
    /// Returns `None` when the control is disabled.
    pub fn press(&self) -> Option<Event> {
        if !self.is_action_enabled() {
            return None;
        }
        Some(match self.state {
            SessionState::Error => Event::Retry,
            _ => Event::ActionPressed,
        })
    }

    /// Applies an event and returns the effects the controller must run.
    ///
    /// Events that make no sense in the current state are ignored.
    pub fn apply(&mut self, event: Event) -> Vec<Effect> {
        use SessionState as S;

        let previous = self.state;
        let (next, effects) = match (self.state, event) {
            (S::Loading, Event::PermissionGranted) => {
                self.microphone_ready = true;
                (S::ReadyToRecord, vec![])
            }
            (S::Loading, Event::PermissionDenied(message)) => {
                self.microphone_ready = false;
                self.error = Some(SessionError::new(ErrorKind::Capture, message));
                (S::Error, vec![])
            }
            (S::ReadyToRecord, Event::ActionPressed) => (S::Recording, vec![Effect::StartCapture]),
            (S::Recording, Event::ActionPressed) => (
                S::Generating,
                vec![Effect::StopCapture, Effect::UploadRecording],
            ),
            (S::ReadyToRecord | S::Paused | S::Error, Event::FileChosen(path)) => {
                self.error = None;
                (S::Generating, vec![Effect::UploadFile(path)])
            }
            (S::Generating, Event::GenerationSucceeded) => (S::Paused, vec![]),
            (S::Generating, Event::GenerationFailed(message)) => {
                self.error = Some(SessionError::new(ErrorKind::Generation, message));
                (S::Error, vec![])
            }
            (S::Paused, Event::ActionPressed) => (S::Playing, vec![Effect::Play]),
            (S::Playing, Event::ActionPressed) => (S::Paused, vec![Effect::Pause]),
            (S::Playing, Event::PlaybackEnded) => (S::Paused, vec![Effect::Rewind]),
            (S::Error, Event::Retry) => {
                self.error = None;
                if self.microphone_ready {
                    (S::ReadyToRecord, vec![])
                } else {
                    (S::Loading, vec![Effect::RequestMicrophone])
                }
            }
            (state, event) => {
                tracing::debug!("Ignoring {:?} in state {}", event, state);
                return Vec::new();
            }
        };

        self.state = next;
        if previous != next {
            tracing::info!("Session state: {} -> {}", previous, next);
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_session() -> Session {
        let mut session = Session::new();
        session.apply(Event::PermissionGranted);
        session
    }

    fn paused_session() -> Session {
        let mut session = ready_session();
        session.apply(Event::ActionPressed);
        session.apply(Event::ActionPressed);
        session.apply(Event::GenerationSucceeded);
        session
    }

    #[test]
    fn test_starts_loading_and_requests_microphone() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Loading);
        assert_eq!(session.entry_effects(), vec![Effect::RequestMicrophone]);
    }

    #[test]
    fn test_action_enabled_matches_state_table() {
        let cases = [
            (SessionState::Loading, false, Action::Record),
            (SessionState::ReadyToRecord, true, Action::Record),
            (SessionState::Recording, true, Action::Stop),
            (SessionState::Generating, false, Action::Stop),
            (SessionState::Paused, true, Action::Play),
            (SessionState::Playing, true, Action::Pause),
            (SessionState::Error, true, Action::Retry),
        ];
        for (state, enabled, action) in cases {
            let session = Session {
                state,
                error: None,
                microphone_ready: true,
            };
            assert_eq!(session.is_action_enabled(), enabled, "enabled in {state}");
            assert_eq!(session.action(), action, "action in {state}");
            assert_eq!(session.press().is_some(), enabled, "press in {state}");
        }
    }

    #[test]
    fn test_full_record_generate_play_cycle() {
        let mut session = Session::new();

        assert!(session.apply(Event::PermissionGranted).is_empty());
        assert_eq!(session.state(), SessionState::ReadyToRecord);

        assert_eq!(session.apply(Event::ActionPressed), vec![Effect::StartCapture]);
        assert_eq!(session.state(), SessionState::Recording);

        assert_eq!(
            session.apply(Event::ActionPressed),
            vec![Effect::StopCapture, Effect::UploadRecording]
        );
        assert_eq!(session.state(), SessionState::Generating);

        session.apply(Event::GenerationSucceeded);
        assert_eq!(session.state(), SessionState::Paused);

        assert_eq!(session.apply(Event::ActionPressed), vec![Effect::Play]);
        assert_eq!(session.state(), SessionState::Playing);

        assert_eq!(session.apply(Event::PlaybackEnded), vec![Effect::Rewind]);
        assert_eq!(session.state(), SessionState::Paused);
    }

    #[test]
    fn test_pause_while_playing() {
        let mut session = paused_session();
        session.apply(Event::ActionPressed);
        assert_eq!(session.apply(Event::ActionPressed), vec![Effect::Pause]);
        assert_eq!(session.state(), SessionState::Paused);
    }

    #[test]
    fn test_permission_denied_never_reaches_ready() {
        let mut session = Session::new();
        session.apply(Event::PermissionDenied("No audio input device available".into()));

        assert_eq!(session.state(), SessionState::Error);
        let error = session.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Capture);
        assert!(!error.message.is_empty());

        // Recording is not reachable without going through a retry first.
        assert!(session.apply(Event::ActionPressed).is_empty());
        assert_eq!(session.state(), SessionState::Error);
    }

    #[test]
    fn test_capture_retry_goes_back_to_loading() {
        let mut session = Session::new();
        session.apply(Event::PermissionDenied(String::new()));
        assert_eq!(session.press(), Some(Event::Retry));

        assert_eq!(session.apply(Event::Retry), vec![Effect::RequestMicrophone]);
        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_generation_failure_then_retry() {
        let mut session = ready_session();
        session.apply(Event::ActionPressed);
        session.apply(Event::ActionPressed);
        session.apply(Event::GenerationFailed(
            "Generation service error (status 500)".into(),
        ));

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.action(), Action::Retry);
        assert_eq!(session.error().unwrap().kind, ErrorKind::Generation);

        assert!(session.apply(Event::Retry).is_empty());
        assert_eq!(session.state(), SessionState::ReadyToRecord);
    }

    #[test]
    fn test_retry_without_microphone_reopens_it() {
        let mut session = Session::new();
        session.apply(Event::PermissionDenied("denied".into()));
        session.apply(Event::FileChosen("hum.wav".into()));
        session.apply(Event::GenerationFailed("server down".into()));
        assert_eq!(session.error().unwrap().kind, ErrorKind::Generation);

        assert_eq!(session.apply(Event::Retry), vec![Effect::RequestMicrophone]);
        assert_eq!(session.state(), SessionState::Loading);
        assert!(!session.microphone_ready);
    }

    #[test]
    fn test_blank_error_message_gets_default() {
        let mut session = ready_session();
        session.apply(Event::ActionPressed);
        session.apply(Event::ActionPressed);
        session.apply(Event::GenerationFailed("   ".into()));
        assert!(!session.error().unwrap().message.trim().is_empty());
    }

    #[test]
    fn test_file_chosen_feeds_generation() {
        let path = std::path::PathBuf::from("hum.wav");

        let mut session = ready_session();
        assert_eq!(
            session.apply(Event::FileChosen(path.clone())),
            vec![Effect::UploadFile(path.clone())]
        );
        assert_eq!(session.state(), SessionState::Generating);

        session.apply(Event::GenerationFailed("boom".into()));
        assert!(session.accepts_file());
        session.apply(Event::FileChosen(path));
        assert_eq!(session.state(), SessionState::Generating);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_events_ignored_outside_their_state() {
        let mut session = Session::new();
        assert!(session.apply(Event::ActionPressed).is_empty());
        assert!(session.apply(Event::GenerationSucceeded).is_empty());
        assert!(session.apply(Event::FileChosen("a.wav".into())).is_empty());
        assert_eq!(session.state(), SessionState::Loading);

        let mut session = ready_session();
        session.apply(Event::ActionPressed);
        assert!(session.apply(Event::PlaybackEnded).is_empty());
        assert!(!session.accepts_file());
        assert_eq!(session.state(), SessionState::Recording);
    }
}
