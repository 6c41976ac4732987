//! Terminal user interface for the recorder session.
//!
//! Draws the state header, the live waveform while recording, the generating
//! animation, playback progress and the error panel, and turns key presses
//! into [`UiCommand`]s.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Line as TraceLine},
        Block, Borders, Paragraph, Wrap,
    },
};
use std::error::Error;
use std::io::{stdout, Stdout};
use std::path::PathBuf;
use std::time::Duration;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use super::visualization::{amplitude_window, decimate, trace_points};
use crate::playback::format_time;
use crate::session::{Action, SessionError, SessionState};

const BG: Color = Color::Rgb(0, 0, 0);
const FG: Color = Color::Rgb(206, 224, 220);
const ACCENT: Color = Color::Rgb(185, 207, 212);
const DIM: Color = Color::Rgb(100, 100, 100);
const ERROR_BG: Color = Color::Rgb(255, 0, 0);

/// Vertical padding of the waveform, in canvas units.
const TRACE_PADDING_Y: f64 = 2.0;

/// What the user asked for during one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Nothing happened
    Continue,
    /// The action key (Space or Enter)
    Action,
    /// A path was submitted from the upload prompt
    SubmitFile(PathBuf),
    /// Save the generated audio under its suggested name ('s')
    Save,
    /// Leave the recorder (Escape, 'q' or Ctrl+C)
    Quit,
}

/// Everything a frame needs to know about the session.
pub struct SessionView<'a> {
    pub state: SessionState,
    pub action: Action,
    pub action_enabled: bool,
    pub accepts_file: bool,
    pub error: Option<&'a SessionError>,
    pub monitor: &'a [i16],
    pub window_size: usize,
    pub elapsed: Duration,
    pub volume: u8,
    pub peak: u8,
    pub peak_volume_threshold: u8,
    /// Position and total length while a generated file is loaded
    pub playback: Option<(Duration, Duration)>,
    pub notice: Option<&'a str>,
}

/// Musical "progress" shown while the generation service works.
#[derive(Debug, Default)]
pub struct GeneratingAnimation {
    frame: usize,
}

impl GeneratingAnimation {
    const NOTES: [&'static str; 4] = ["♩", "♪", "♫", "♬"];

    pub fn advance(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    /// A row of notes scrolling to the right.
    pub fn line(&self, width: usize) -> String {
        let count = (width / 2).clamp(1, 12);
        (0..count)
            .map(|i| Self::NOTES[(self.frame / 2 + i) % Self::NOTES.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Terminal UI for the recorder.
pub struct RecorderTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    prompt: Option<Input>,
    animation: GeneratingAnimation,
    cleaned_up: bool,
}

impl RecorderTui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> Result<Self, Box<dyn Error>> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(RecorderTui {
            terminal,
            prompt: None,
            animation: GeneratingAnimation::default(),
            cleaned_up: false,
        })
    }

    /// Opens the upload path prompt.
    fn open_prompt(&mut self) {
        self.prompt = Some(Input::default());
    }

    /// Draws one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, view: &SessionView) -> Result<(), Box<dyn Error>> {
        if view.state == SessionState::Generating {
            self.animation.advance();
        }
        let animation = &self.animation;
        let prompt = self.prompt.as_ref();

        self.terminal.draw(|frame| {
            let area = frame.area();
            frame.render_widget(Block::default().style(Style::default().bg(BG)), area);

            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(if prompt.is_some() { 3 } else { 0 }),
                    Constraint::Length(1),
                ])
                .split(area);

            render_header(frame, layout[0], view);

            match view.state {
                SessionState::Recording => render_trace(frame, layout[1], view),
                SessionState::Generating => {
                    let text = vec![
                        ratatui::text::Line::from(animation.line(layout[1].width as usize)),
                        ratatui::text::Line::from(""),
                        ratatui::text::Line::from("Arranging your melody..."),
                    ];
                    render_centered(frame, layout[1], text, Style::default().fg(FG));
                }
                SessionState::Error => render_error(frame, layout[1], view.error),
                SessionState::Loading => render_centered(
                    frame,
                    layout[1],
                    vec![ratatui::text::Line::from("Opening microphone...")],
                    Style::default().fg(DIM),
                ),
                SessionState::ReadyToRecord => render_centered(
                    frame,
                    layout[1],
                    vec![ratatui::text::Line::from("Press space and hum a melody")],
                    Style::default().fg(FG),
                ),
                SessionState::Paused | SessionState::Playing => {
                    let symbol = if view.state == SessionState::Playing { "▶" } else { "⏸" };
                    render_centered(
                        frame,
                        layout[1],
                        vec![ratatui::text::Line::from(format!("{symbol}  Your arrangement is ready"))],
                        Style::default().fg(FG),
                    );
                }
            }

            if let Some(input) = prompt {
                let block = Block::default()
                    .title(" Audio file to upload (Enter to send, Esc to cancel) ")
                    .borders(Borders::ALL)
                    .style(Style::default().fg(FG).bg(BG));
                let inner = block.inner(layout[2]);
                frame.render_widget(&block, layout[2]);
                frame.render_widget(Paragraph::new(input.value()), inner);
                frame.set_cursor_position(Position::new(
                    inner.x + input.visual_cursor() as u16,
                    inner.y,
                ));
            }

            render_footer(frame, layout[3], view);
        })?;

        Ok(())
    }

    /// Polls for one key press and maps it to a command.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, accepts_file: bool) -> Result<UiCommand, Box<dyn Error>> {
        if !event::poll(Duration::from_millis(50))? {
            return Ok(UiCommand::Continue);
        }
        let ev = event::read()?;
        let Event::Key(key) = ev else {
            return Ok(UiCommand::Continue);
        };

        if self.prompt.is_some() {
            return Ok(self.handle_prompt_key(key, &ev));
        }

        Ok(match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => {
                tracing::debug!("Action key pressed");
                UiCommand::Action
            }
            KeyCode::Char('u') if accepts_file => {
                tracing::debug!("Upload prompt opened");
                self.open_prompt();
                UiCommand::Continue
            }
            KeyCode::Char('s') => UiCommand::Save,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                tracing::debug!("Ctrl+C pressed: leaving recorder");
                UiCommand::Quit
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                tracing::debug!("Escape or 'q' pressed: leaving recorder");
                UiCommand::Quit
            }
            _ => UiCommand::Continue,
        })
    }

    fn handle_prompt_key(&mut self, key: KeyEvent, ev: &Event) -> UiCommand {
        match key.code {
            KeyCode::Enter => {
                let value = self
                    .prompt
                    .take()
                    .map(|input| input.value().trim().to_string())
                    .unwrap_or_default();
                if value.is_empty() {
                    UiCommand::Continue
                } else {
                    UiCommand::SubmitFile(PathBuf::from(value))
                }
            }
            KeyCode::Esc => {
                self.prompt = None;
                UiCommand::Continue
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.prompt = None;
                UiCommand::Continue
            }
            _ => {
                if let Some(input) = self.prompt.as_mut() {
                    input.handle_event(ev);
                }
                UiCommand::Continue
            }
        }
    }

    /// Leaves raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> Result<(), Box<dyn Error>> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for RecorderTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn render_header(frame: &mut Frame, area: Rect, view: &SessionView) {
    let header = ratatui::text::Line::from(vec![
        Span::styled(
            " Piranha Plants as Charade ",
            Style::default().fg(BG).bg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(view.state.to_string(), Style::default().fg(DIM)),
    ]);
    frame.render_widget(Paragraph::new(header).style(Style::default().bg(BG)), area);
}

fn render_trace(frame: &mut Frame, area: Rect, view: &SessionView) {
    let width = area.width as f64;
    let height = area.height as f64 * 4.0;

    let window = amplitude_window(view.monitor, view.window_size);
    let points = trace_points(&window, width, height, TRACE_PADDING_Y);
    let points = decimate(&points, area.width as usize * 2 + 1);

    let canvas = Canvas::default()
        .background_color(BG)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            // Canvas y grows upwards, the trace is laid out top-down.
            for pair in points.windows(2) {
                ctx.draw(&TraceLine {
                    x1: pair[0].0,
                    y1: height - pair[0].1,
                    x2: pair[1].0,
                    y2: height - pair[1].1,
                    color: FG,
                });
            }
        });
    frame.render_widget(canvas, area);
}

fn render_centered(
    frame: &mut Frame,
    area: Rect,
    lines: Vec<ratatui::text::Line<'static>>,
    style: Style,
) {
    let height = lines.len() as u16;
    let centered = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: area.width,
        height: height.min(area.height),
    };
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(style);
    frame.render_widget(paragraph, centered);
}

fn render_error(frame: &mut Frame, area: Rect, error: Option<&SessionError>) {
    let message = error
        .map(|e| e.message.as_str())
        .unwrap_or("Something went wrong.");
    let error_style = Style::default().fg(Color::Rgb(255, 255, 255)).bg(ERROR_BG);

    frame.render_widget(Block::default().style(error_style), area);

    let padding_x = area.width / 10;
    let lines = vec![
        ratatui::text::Line::from(message.to_string()),
        ratatui::text::Line::from(""),
        ratatui::text::Line::from("Press space to retry or u to upload an audio file instead."),
    ];
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(error_style);
    let text_area = Rect {
        x: area.x + padding_x,
        y: area.y + area.height / 3,
        width: area.width.saturating_sub(padding_x * 2),
        height: area.height - area.height / 3,
    };
    frame.render_widget(paragraph, text_area);
}

fn render_footer(frame: &mut Frame, area: Rect, view: &SessionView) {
    let mut spans = Vec::new();

    match view.state {
        SessionState::Recording => {
            let secs = view.elapsed.as_secs();
            let peak_style = if view.peak >= view.peak_volume_threshold {
                Style::default().bg(Color::Red).fg(Color::Rgb(255, 255, 255))
            } else {
                Style::default()
            };
            spans.push(Span::styled("● ", Style::default().fg(Color::Red)));
            spans.push(Span::raw(format!("{}:{:02}", secs / 60, secs % 60)));
            spans.push(Span::raw(" / "));
            spans.push(Span::raw(format!("{}%", view.volume)));
            spans.push(Span::raw(" / "));
            spans.push(Span::styled(format!("{}%", view.peak), peak_style));
            spans.push(Span::raw("   "));
        }
        SessionState::Paused | SessionState::Playing => {
            let (position, duration) = view
                .playback
                .map(|(p, d)| (Some(p), Some(d)))
                .unwrap_or((None, None));
            spans.push(Span::raw(format!(
                "{} / {}   ",
                format_time(position),
                format_time(duration)
            )));
        }
        _ => {}
    }

    let action_style = if view.action_enabled {
        Style::default().fg(FG).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DIM)
    };
    spans.push(Span::styled(format!("[space] {}", view.action.label()), action_style));

    if view.accepts_file {
        spans.push(Span::styled("  [u] upload", Style::default().fg(ACCENT)));
    }
    if view.playback.is_some() {
        spans.push(Span::styled("  [s] save", Style::default().fg(ACCENT)));
    }
    spans.push(Span::styled("  [q] quit", Style::default().fg(ACCENT)));

    if let Some(notice) = view.notice {
        spans.push(Span::styled(format!("   {notice}"), Style::default().fg(DIM)));
    }

    let footer = Paragraph::new(ratatui::text::Line::from(spans))
        .style(Style::default().fg(ACCENT).bg(BG));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generating_animation_scrolls() {
        let mut animation = GeneratingAnimation::default();
        let first = animation.line(20);
        animation.advance();
        animation.advance();
        let second = animation.line(20);

        assert_ne!(first, second);
        assert_eq!(first.split(' ').count(), 10);
        assert_eq!(animation.line(0).split(' ').count(), 1);
    }
}
