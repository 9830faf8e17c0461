//! Terminal session and the event stream the main loop selects on.

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{Event as CrosstermEvent, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::event::Event;

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Raw mode and the alternate screen, held until dropped.
pub struct Screen {
    terminal: Tui,
}

impl Screen {
    pub fn enter() -> io::Result<Self> {
        execute!(io::stdout(), EnterAlternateScreen)?;
        enable_raw_mode()?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Self { terminal })
    }

    pub fn terminal(&mut self) -> &mut Tui {
        &mut self.terminal
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        if let Err(err) = restore() {
            tracing::warn!(%err, "could not restore terminal");
        }
    }
}

/// Leave the alternate screen and raw mode. Also called from the panic hook.
pub fn restore() -> io::Result<()> {
    execute!(io::stdout(), LeaveAlternateScreen)?;
    disable_raw_mode()
}

/// The events the list browser reacts to. Key releases and repeats, mouse
/// input and pastes are dropped.
fn translate(event: CrosstermEvent) -> Option<Event> {
    match event {
        CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
        CrosstermEvent::Resize(_, _) => Some(Event::Resize),
        // redraw whatever another program left on screen
        CrosstermEvent::FocusGained => Some(Event::Render),
        _ => None,
    }
}

/// Terminal input merged with tick and render timers.
/// The first event is always [`Event::Init`].
pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Events {
    pub fn spawn(tick_rate: Duration, render_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let task = tokio::spawn(async move {
            let mut input = EventStream::new();
            let mut ticks = interval(tick_rate);
            let mut frames = interval(render_rate);

            tx.send(Event::Init).ok();
            loop {
                let event = tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticks.tick() => Event::Tick,
                    _ = frames.tick() => Event::Render,
                    maybe = input.next() => match maybe {
                        Some(Ok(raw)) => match translate(raw) {
                            Some(event) => event,
                            None => continue,
                        },
                        Some(Err(err)) => {
                            tracing::warn!(%err, "terminal input error");
                            continue;
                        }
                        None => break,
                    },
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self { rx, cancel, task }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for Events {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

    #[test]
    fn only_key_presses_reach_the_app() {
        let press = KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE);
        assert!(matches!(
            translate(CrosstermEvent::Key(press)),
            Some(Event::Key(key)) if key.code == KeyCode::Char('j')
        ));

        let release =
            KeyEvent::new_with_kind(KeyCode::Char('j'), KeyModifiers::NONE, KeyEventKind::Release);
        assert!(translate(CrosstermEvent::Key(release)).is_none());
    }

    #[test]
    fn resize_and_focus_redraw() {
        assert!(matches!(translate(CrosstermEvent::Resize(80, 24)), Some(Event::Resize)));
        assert!(matches!(translate(CrosstermEvent::FocusGained), Some(Event::Render)));
        assert!(translate(CrosstermEvent::FocusLost).is_none());
    }

    #[test]
    fn mouse_and_paste_are_ignored() {
        let moved = MouseEvent {
            kind: MouseEventKind::Moved,
            column: 3,
            row: 4,
            modifiers: KeyModifiers::NONE,
        };
        assert!(translate(CrosstermEvent::Mouse(moved)).is_none());
        assert!(translate(CrosstermEvent::Paste("plugins/".to_string())).is_none());
    }
}
