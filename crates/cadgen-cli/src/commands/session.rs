//! /history, /code and /error

use super::CommandResult;
use cadgen_pipeline::Session;

pub struct SessionCommand;

impl SessionCommand {
    pub fn history(session: &Session) -> CommandResult {
        let entries = session.history_previews();
        if entries.is_empty() {
            return CommandResult::Message("No history yet".to_string());
        }

        let mut output = format!("History ({} turns)\n", entries.len());
        output.push_str(&"-".repeat(40));
        output.push('\n');
        for entry in entries {
            output.push_str(&format!(
                "[{}] {:<9} {}{}\n",
                entry.index,
                entry.role.as_str(),
                entry.preview,
                if entry.truncated { "..." } else { "" }
            ));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn code(session: &Session) -> CommandResult {
        if session.last_code.is_empty() {
            CommandResult::Message("No program has run yet".to_string())
        } else {
            CommandResult::Message(format!("```python\n{}\n```", session.last_code))
        }
    }

    pub fn error(session: &Session) -> CommandResult {
        if session.last_error.is_empty() {
            CommandResult::Message("No error recorded".to_string())
        } else {
            CommandResult::Message(session.last_error.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadgen_ai::ChatMessage;

    fn text(result: CommandResult) -> String {
        match result {
            CommandResult::Message(m) => m,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn test_history_previews() {
        let mut session = Session::default();
        assert_eq!(text(SessionCommand::history(&session)), "No history yet");

        session.history.push(ChatMessage::user("a 10mm cube"));
        session.history.push(ChatMessage::assistant(format!("```python\n{}\n```", "x".repeat(300))));
        let listing = text(SessionCommand::history(&session));
        assert!(listing.contains("[0] user      a 10mm cube"));
        assert!(listing.contains("[1] assistant ```python "));
        assert!(listing.ends_with("..."));
    }

    #[test]
    fn test_code_and_error() {
        let mut session = Session::default();
        assert_eq!(text(SessionCommand::code(&session)), "No program has run yet");
        assert_eq!(text(SessionCommand::error(&session)), "No error recorded");

        session.last_code = "Box(1, 1, 1)".into();
        session.last_error = "NameError: name 'Box' is not defined".into();
        assert_eq!(text(SessionCommand::code(&session)), "```python\nBox(1, 1, 1)\n```");
        assert!(text(SessionCommand::error(&session)).starts_with("NameError"));
    }
}
