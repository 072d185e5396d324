//! Terminal styling for session output.

use std::io::IsTerminal;

use hwst_session::ResultState;
use owo_colors::OwoColorize;

fn paint(text: &str, colorize: impl FnOnce(&str) -> String) -> String {
    if std::io::stdout().is_terminal() {
        colorize(text)
    } else {
        text.to_string()
    }
}

pub fn success(text: impl AsRef<str>) -> String {
    paint(text.as_ref(), |text| text.green().to_string())
}

pub fn warning(text: impl AsRef<str>) -> String {
    paint(text.as_ref(), |text| text.yellow().to_string())
}

pub fn error(text: impl AsRef<str>) -> String {
    paint(text.as_ref(), |text| text.red().to_string())
}

pub fn accent(text: impl AsRef<str>) -> String {
    paint(text.as_ref(), |text| text.cyan().to_string())
}

/// Result label colored by severity.
pub fn result(state: ResultState) -> String {
    let label = state.label();
    match state {
        ResultState::Passed => success(label),
        state if state.is_failure() => error(label),
        ResultState::Warning | ResultState::Cancelled | ResultState::Cancelling => warning(label),
        _ => label.to_string(),
    }
}
