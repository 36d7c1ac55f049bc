//! Confirmation prompt modeled as a pure state machine.
//!
//! `update(dialog, event) -> (dialog, command)` holds all behavior; rendering
//! and input reading live in the CLI. Scripted inputs (see
//! [`DIALOG_INPUTS_ENV`]) drive the same transitions in tests.

use thiserror::Error;

/// Comma-separated key names fed to dialogs instead of the terminal.
pub const DIALOG_INPUTS_ENV: &str = "BRANCHFLOW_DIALOG_INPUTS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Enter,
    Esc,
    CtrlC,
    Char(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dialog input '{0}' (expected enter, esc, ctrl+c or a single character)")]
pub struct UnknownKey(pub String);

impl KeyEvent {
    /// Parse a key name: `enter`, `esc`, `ctrl+c`, or a single character.
    pub fn parse(name: &str) -> Result<Self, UnknownKey> {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "enter" => Ok(KeyEvent::Enter),
            "esc" => Ok(KeyEvent::Esc),
            "ctrl+c" => Ok(KeyEvent::CtrlC),
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(KeyEvent::Char(c)),
                    _ => Err(UnknownKey(name.to_string())),
                }
            }
        }
    }

    /// Interpret one line typed at a prompt: empty is Enter, otherwise its first character.
    pub fn from_line(line: &str) -> Self {
        line.trim().chars().next().map_or(KeyEvent::Enter, KeyEvent::Char)
    }
}

/// Parse the value of [`DIALOG_INPUTS_ENV`].
pub fn parse_test_inputs(raw: &str) -> Result<Vec<KeyEvent>, UnknownKey> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(KeyEvent::parse)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStatus {
    Active,
    Accepted,
    Aborted,
}

/// Emitted when the dialog reaches a final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogCommand {
    Accept,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDialog {
    prompt: String,
    status: DialogStatus,
}

impl ConfirmDialog {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            status: DialogStatus::Active,
        }
    }

    pub fn status(&self) -> DialogStatus {
        self.status
    }

    pub fn update(mut self, event: KeyEvent) -> (Self, Option<DialogCommand>) {
        if self.status != DialogStatus::Active {
            return (self, None);
        }
        let command = match event {
            KeyEvent::Enter | KeyEvent::Char('o' | 'y' | 'Y') => Some(DialogCommand::Accept),
            KeyEvent::Esc | KeyEvent::CtrlC | KeyEvent::Char('q' | 'n' | 'N') => {
                Some(DialogCommand::Abort)
            }
            KeyEvent::Char(_) => None,
        };
        match command {
            Some(DialogCommand::Accept) => self.status = DialogStatus::Accepted,
            Some(DialogCommand::Abort) => self.status = DialogStatus::Aborted,
            None => {}
        }
        (self, command)
    }

    pub fn view(&self) -> String {
        match self.status {
            DialogStatus::Active => format!("{} [Y/n] ", self.prompt),
            DialogStatus::Accepted => format!("{} yes", self.prompt),
            DialogStatus::Aborted => format!("{} aborted", self.prompt),
        }
    }
}

/// Feed `events` until the dialog finishes. Running out of input aborts.
pub fn run_scripted(
    mut dialog: ConfirmDialog,
    events: impl IntoIterator<Item = KeyEvent>,
) -> DialogStatus {
    for event in events {
        let (next, command) = dialog.update(event);
        dialog = next;
        if command.is_some() {
            return dialog.status();
        }
    }
    DialogStatus::Aborted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_and_abort_keys() {
        for key in [KeyEvent::Enter, KeyEvent::Char('o'), KeyEvent::Char('y')] {
            let (dialog, command) = ConfirmDialog::new("Undo?").update(key);
            assert_eq!(command, Some(DialogCommand::Accept), "{key:?}");
            assert_eq!(dialog.status(), DialogStatus::Accepted);
        }
        for key in [
            KeyEvent::Esc,
            KeyEvent::CtrlC,
            KeyEvent::Char('q'),
            KeyEvent::Char('n'),
        ] {
            let (dialog, command) = ConfirmDialog::new("Undo?").update(key);
            assert_eq!(command, Some(DialogCommand::Abort), "{key:?}");
            assert_eq!(dialog.status(), DialogStatus::Aborted);
        }
    }

    #[test]
    fn other_keys_are_ignored_and_finished_dialogs_stay_finished() {
        let (dialog, command) = ConfirmDialog::new("Undo?").update(KeyEvent::Char('x'));
        assert_eq!(command, None);
        assert_eq!(dialog.status(), DialogStatus::Active);

        let (dialog, _) = dialog.update(KeyEvent::Esc);
        let (dialog, command) = dialog.update(KeyEvent::Enter);
        assert_eq!(command, None);
        assert_eq!(dialog.status(), DialogStatus::Aborted);
        assert_eq!(dialog.view(), "Undo? aborted");
    }

    #[test]
    fn scripted_run_stops_at_first_decision_and_aborts_on_eof() {
        let inputs = parse_test_inputs("x, z ,enter,esc").expect("parse");
        assert_eq!(
            run_scripted(ConfirmDialog::new("Undo?"), inputs),
            DialogStatus::Accepted
        );
        assert_eq!(
            run_scripted(ConfirmDialog::new("Undo?"), [KeyEvent::Char('x')]),
            DialogStatus::Aborted
        );
        assert_eq!(
            run_scripted(ConfirmDialog::new("Undo?"), []),
            DialogStatus::Aborted
        );
    }

    #[test]
    fn parses_key_names_and_lines() {
        assert_eq!(
            parse_test_inputs("ctrl+c,Enter,q").expect("parse"),
            vec![KeyEvent::CtrlC, KeyEvent::Enter, KeyEvent::Char('q')]
        );
        assert_eq!(
            parse_test_inputs("space bar").unwrap_err(),
            UnknownKey("space bar".to_string())
        );
        assert_eq!(KeyEvent::from_line("\n"), KeyEvent::Enter);
        assert_eq!(KeyEvent::from_line("no\n"), KeyEvent::Char('n'));
    }
}
