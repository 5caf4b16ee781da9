use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Modifier, Style};
use tui::text::{Span, Spans};
use tui::widgets::{Block, Borders, Paragraph};
use tui::Terminal;

/// control LED bits, in the same order as the panel modes
pub const LED_INPUT: u8 = 0x01;
pub const LED_ADDRESS: u8 = 0x02;
pub const LED_MEMORY: u8 = 0x04;
pub const LED_RUN: u8 = 0x08;

/// Display is used by the front panel to light its LEDs. It should abstract
/// the implementation details, so LEDs, a terminal or a test double all work.
pub trait Display {
    /// show 8 data LEDs and the control LEDs. control bits 0-3 are Input,
    /// Address, Memory and Run; bits 4-7 dim the Run LED (0 brightest)
    fn render(&mut self, data: u8, control: u8) -> Result<(), io::Error>;
}

/// Run LED brightness, 0-255, from the control byte
pub fn run_brightness(control: u8) -> u8 {
    if control & LED_RUN == 0 {
        0
    } else {
        0xff - (control & 0xf0)
    }
}

/// the panel in a terminal, rendered using TUI and Crossterm
pub struct TermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TermDisplay {
    pub fn new() -> Result<TermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        Ok(TermDisplay { terminal })
    }
}

fn lamp(on: bool, colour: Color) -> Span<'static> {
    if on {
        Span::styled(" ● ", Style::default().fg(colour).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(" ○ ", Style::default().fg(Color::DarkGray))
    }
}

impl Display for TermDisplay {
    fn render(&mut self, data: u8, control: u8) -> Result<(), io::Error> {
        // bit 7 is on the left, as on the panel
        let data_row: Vec<Span> = (0..8)
            .rev()
            .map(|bit| lamp(data & (1 << bit) != 0, Color::Red))
            .collect();

        let run = run_brightness(control);
        let control_row = vec![
            lamp(control & LED_INPUT != 0, Color::Yellow),
            lamp(control & LED_ADDRESS != 0, Color::Yellow),
            lamp(control & LED_MEMORY != 0, Color::Yellow),
            if run > 0 {
                Span::styled(" ● ", Style::default().fg(Color::Rgb(run, 0, 0)))
            } else {
                lamp(false, Color::Red)
            },
        ];

        let text = vec![
            Spans::from(" 7  6  5  4  3  2  1  0"),
            Spans::from(data_row),
            Spans::from(""),
            Spans::from("INP ADR MEM RUN"),
            Spans::from(control_row),
            Spans::from(""),
            Spans::from("0-7 bits  c clear  d disp  a set  r read  w store  g start  h stop  esc quit"),
        ];

        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, f.size().width.min(80), 11);
            let panel = Paragraph::new(text).block(
                Block::default()
                    .title("KENBAK-1")
                    .borders(Borders::ALL)
                    .style(Style::default().bg(Color::Black)),
            );
            f.render_widget(panel, size);
        })?;
        Ok(())
    }
}

/// the panel's LEDs: only passes frames on to the display when they change
pub struct Leds<'a> {
    display: &'a mut dyn Display,
    shown: Option<(u8, u8)>,
}

impl<'a> Leds<'a> {
    pub fn new(display: &'a mut dyn Display) -> Self {
        Leds {
            display,
            shown: None,
        }
    }

    pub fn show(&mut self, data: u8, control: u8) -> Result<(), io::Error> {
        if self.shown == Some((data, control)) {
            return Ok(());
        }
        self.display.render(data, control)?;
        self.shown = Some((data, control));
        Ok(())
    }
}

/// useful for testing non-display routines
pub struct DummyDisplay;

impl Display for DummyDisplay {
    #[allow(unused)]
    fn render(&mut self, data: u8, control: u8) -> Result<(), io::Error> {
        Ok(())
    }
}

/// keeps every frame it is asked to show
#[derive(Default)]
pub struct RecordingDisplay {
    pub frames: Vec<(u8, u8)>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        RecordingDisplay::default()
    }

    pub fn last(&self) -> Option<(u8, u8)> {
        self.frames.last().copied()
    }
}

impl Display for RecordingDisplay {
    fn render(&mut self, data: u8, control: u8) -> Result<(), io::Error> {
        self.frames.push((data, control));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_brightness() {
        assert_eq!(run_brightness(0), 0);
        assert_eq!(run_brightness(LED_RUN), 0xff);
        assert_eq!(run_brightness(LED_RUN | 0xf0), 0x0f);
        // dimming bits do nothing with Run off
        assert_eq!(run_brightness(0xf0), 0);
    }

    #[test]
    fn test_recording_display() -> Result<(), io::Error> {
        let mut d = RecordingDisplay::new();
        d.render(1, LED_INPUT)?;
        d.render(2, LED_RUN)?;
        assert_eq!(d.frames, vec![(1, LED_INPUT), (2, LED_RUN)]);
        assert_eq!(d.last(), Some((2, LED_RUN)));
        Ok(())
    }

    #[test]
    fn test_leds_skip_repeats() -> Result<(), io::Error> {
        let mut d = RecordingDisplay::new();
        {
            let mut leds = Leds::new(&mut d);
            leds.show(1, LED_INPUT)?;
            leds.show(1, LED_INPUT)?;
            leds.show(1, LED_RUN)?;
            leds.show(1, LED_INPUT)?;
        }
        assert_eq!(d.frames, vec![(1, LED_INPUT), (1, LED_RUN), (1, LED_INPUT)]);
        Ok(())
    }

    #[test]
    #[ignore]
    // NB. needs a real terminal
    fn test_term_display_renders() -> Result<(), io::Error> {
        let mut d = TermDisplay::new()?;
        d.render(0xa5, LED_RUN | 0x80)
    }
}
