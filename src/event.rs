use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::action::Action;

#[derive(Debug, Clone)]
pub enum Event {
    Init,
    Tick,
    Render,
    Resize,
    Key(KeyEvent),
}

impl Event {
    pub fn is_quit(&self) -> bool {
        matches!(
            self,
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            })
        )
    }
}

/// Where key presses go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing into the filter line.
    Filter,
    /// A selection popup is open.
    Popup,
}

pub fn map_key(key: KeyEvent, mode: InputMode) -> Action {
    match mode {
        InputMode::Filter => match key.code {
            KeyCode::Esc | KeyCode::Enter => Action::ExitFilterMode,
            KeyCode::Backspace => Action::FilterBackspace,
            KeyCode::Char(c) => Action::FilterInput(c),
            _ => Action::None,
        },
        InputMode::Popup => match key.code {
            KeyCode::Char('j') | KeyCode::Down => Action::PopupDown,
            KeyCode::Char('k') | KeyCode::Up => Action::PopupUp,
            KeyCode::Enter => Action::PopupSelect,
            KeyCode::Esc | KeyCode::Char('q') => Action::Back,
            _ => Action::None,
        },
        InputMode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Back,
            KeyCode::Char('j') | KeyCode::Down => Action::ScrollDown,
            KeyCode::Char('k') | KeyCode::Up => Action::ScrollUp,
            KeyCode::Char('g') | KeyCode::Home => Action::GoToTop,
            KeyCode::Char('G') | KeyCode::End => Action::GoToBottom,
            KeyCode::Enter => Action::Select,
            KeyCode::Tab => Action::NextList,
            KeyCode::BackTab => Action::PrevList,
            KeyCode::Char('/') => Action::EnterFilterMode,
            KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => Action::NextPage,
            KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => Action::PrevPage,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('o') => Action::OpenInBrowser,
            KeyCode::Char('y') => Action::YankUrl,
            KeyCode::Char('b') => Action::ShowBranches,
            KeyCode::Char('t') => Action::ShowTags,
            KeyCode::Char('d') => Action::ShowDashboards,
            KeyCode::Char('s') => Action::ShowServerSelect,
            _ => Action::None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn ctrl_c_quits() {
        let event = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(event.is_quit());
        assert!(!Event::Key(key(KeyCode::Char('c'))).is_quit());
    }

    #[test]
    fn filter_mode_captures_letters() {
        assert!(matches!(
            map_key(key(KeyCode::Char('n')), InputMode::Filter),
            Action::FilterInput('n')
        ));
        assert!(matches!(
            map_key(key(KeyCode::Char('n')), InputMode::Normal),
            Action::NextPage
        ));
        assert!(matches!(
            map_key(key(KeyCode::Enter), InputMode::Filter),
            Action::ExitFilterMode
        ));
        assert!(matches!(
            map_key(key(KeyCode::Char('d')), InputMode::Filter),
            Action::FilterInput('d')
        ));
    }

    #[test]
    fn repository_sub_list_keys() {
        assert!(matches!(
            map_key(key(KeyCode::Char('b')), InputMode::Normal),
            Action::ShowBranches
        ));
        assert!(matches!(
            map_key(key(KeyCode::Char('t')), InputMode::Normal),
            Action::ShowTags
        ));
        assert!(matches!(
            map_key(key(KeyCode::Char('d')), InputMode::Normal),
            Action::ShowDashboards
        ));
    }

    #[test]
    fn popup_mode_navigates_popup() {
        assert!(matches!(
            map_key(key(KeyCode::Char('j')), InputMode::Popup),
            Action::PopupDown
        ));
        assert!(matches!(
            map_key(key(KeyCode::Esc), InputMode::Popup),
            Action::Back
        ));
        assert!(matches!(
            map_key(key(KeyCode::Char('r')), InputMode::Popup),
            Action::None
        ));
    }
}
