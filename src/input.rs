use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::InputMode;
use crate::model::SortKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    ActivateRow,
    Escape,
    StartCommand,
    StartFilter,
    ToggleHelp,
    ShowDetail,
    ShowYaml,
    LoadLogs,
    ExecProbe,
    ConfirmDelete,
    ToggleConfigSwitch,
    ClearNamespace,
    SortBy(SortKey),
    Refresh,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
    ConfirmYes,
    ConfirmNo,
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Command | InputMode::Filter => map_input_mode_key(key),
        InputMode::Confirm => map_confirm_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') if key.modifiers.is_empty() => Some(Action::Quit),
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up => Some(Action::Up),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::ConfirmDelete)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Char('g') if key.modifiers.is_empty() => Some(Action::Top),
        KeyCode::Char('G') => Some(Action::Bottom),
        KeyCode::Home => Some(Action::Top),
        KeyCode::End => Some(Action::Bottom),
        KeyCode::Enter => Some(Action::ActivateRow),
        KeyCode::Esc => Some(Action::Escape),
        KeyCode::Char(':') => Some(Action::StartCommand),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('d') if key.modifiers.is_empty() => Some(Action::ShowDetail),
        KeyCode::Char('y') if key.modifiers.is_empty() => Some(Action::ShowYaml),
        KeyCode::Char('l') if key.modifiers.is_empty() => Some(Action::LoadLogs),
        KeyCode::Char('s') if key.modifiers.is_empty() => Some(Action::ExecProbe),
        KeyCode::Char('c') if key.modifiers.is_empty() => Some(Action::ToggleConfigSwitch),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('0') if key.modifiers.is_empty() => Some(Action::ClearNamespace),
        KeyCode::Char('N') => Some(Action::SortBy(SortKey::Name)),
        KeyCode::Char('A') => Some(Action::SortBy(SortKey::Age)),
        KeyCode::Char('C') => Some(Action::SortBy(SortKey::Cpu)),
        KeyCode::Char('M') => Some(Action::SortBy(SortKey::Memory)),
        KeyCode::Char('T') => Some(Action::SortBy(SortKey::Restarts)),
        _ => None,
    }
}

fn map_confirm_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Action::ConfirmNo),
        _ => None,
    }
}

fn map_input_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::CancelInput)
        }
        KeyCode::Char(c) => Some(Action::InputChar(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, map_key};
    use crate::app::InputMode;
    use crate::model::SortKey;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shifted(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::SHIFT)
    }

    #[test]
    fn normal_mode_maps_navigation_keys() {
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Char('j'))),
            Some(Action::Down)
        );
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Enter)),
            Some(Action::ActivateRow)
        );
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Char(':'))),
            Some(Action::StartCommand)
        );
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Char('/'))),
            Some(Action::StartFilter)
        );
    }

    #[test]
    fn shifted_letters_select_sort_keys() {
        assert_eq!(
            map_key(InputMode::Normal, shifted(KeyCode::Char('C'))),
            Some(Action::SortBy(SortKey::Cpu))
        );
        assert_eq!(
            map_key(InputMode::Normal, shifted(KeyCode::Char('N'))),
            Some(Action::SortBy(SortKey::Name))
        );
        assert_eq!(
            map_key(InputMode::Normal, shifted(KeyCode::Char('T'))),
            Some(Action::SortBy(SortKey::Restarts))
        );
    }

    #[test]
    fn confirm_mode_only_accepts_yes_or_no() {
        assert_eq!(
            map_key(InputMode::Confirm, key(KeyCode::Char('y'))),
            Some(Action::ConfirmYes)
        );
        assert_eq!(
            map_key(InputMode::Confirm, key(KeyCode::Esc)),
            Some(Action::ConfirmNo)
        );
        assert_eq!(map_key(InputMode::Confirm, key(KeyCode::Char('j'))), None);
    }

    #[test]
    fn command_mode_collects_characters() {
        assert_eq!(
            map_key(InputMode::Command, key(KeyCode::Char('p'))),
            Some(Action::InputChar('p'))
        );
        assert_eq!(
            map_key(InputMode::Command, key(KeyCode::Enter)),
            Some(Action::SubmitInput)
        );
        assert_eq!(
            map_key(InputMode::Filter, key(KeyCode::Esc)),
            Some(Action::CancelInput)
        );
    }
}
