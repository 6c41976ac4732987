//! Full-screen display for errors that stop charade before the recorder starts.

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::Paragraph, widgets::Wrap};
use std::io::{self, Stdout};
use std::time::Duration;

const ERROR_BG: Color = Color::Rgb(255, 0, 0);
const ERROR_FG: Color = Color::Rgb(255, 255, 255);

/// Red screen showing one message until a key is pressed.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    cleaned_up: bool,
}

impl ErrorScreen {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(ErrorScreen {
            terminal,
            cleaned_up: false,
        })
    }

    /// Shows `message` centred on a red background and waits for any key.
    ///
    /// # Errors
    /// - If rendering or event polling fails
    pub fn show_error(&mut self, message: &str) -> anyhow::Result<()> {
        let lines = error_lines(message);
        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                frame.render_widget(
                    ratatui::widgets::Block::default().style(Style::default().bg(ERROR_BG)),
                    area,
                );

                let height = (lines.len() as u16).min(area.height);
                let text_area = Rect {
                    x: area.x + area.width / 10,
                    y: area.y + area.height.saturating_sub(height) / 2,
                    width: area.width * 8 / 10,
                    height: area.height - area.height.saturating_sub(height) / 2,
                };
                let paragraph = Paragraph::new(lines.clone())
                    .style(Style::default().fg(ERROR_FG).bg(ERROR_BG))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true });
                frame.render_widget(paragraph, text_area);
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Restores the terminal.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// The message split into lines, followed by the dismiss hint.
fn error_lines(message: &str) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = message
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press any key to exit",
        Style::default().add_modifier(Modifier::DIM),
    )));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lines_append_hint() {
        let lines = error_lines("Configuration Error:\n\nbad endpoint");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].to_string(), "Configuration Error:");
        assert_eq!(lines[2].to_string(), "bad endpoint");
        assert_eq!(lines[4].to_string(), "Press any key to exit");
    }
}
