//! Microphone capture, live waveform and the recorder screen.

pub mod audio;
pub mod ui;
pub mod visualization;

pub use audio::{Clip, Microphone};
pub use ui::{RecorderTui, SessionView, UiCommand};
pub use visualization::LevelMeter;
