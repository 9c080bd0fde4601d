//! Slash commands for interactive mode

mod provider;
mod session;

pub use provider::{ModelCommand, ProviderCommand};
pub use session::SessionCommand;

use crate::samples::{self, Sample};
use cadgen_ai::Provider;
use cadgen_pipeline::Session;

/// Result of executing a slash command
#[derive(Debug)]
pub enum CommandResult {
    /// Show a message to the user
    Message(String),
    /// Run the repair loop, optionally with an explicit attempt count
    Retry(Option<u32>),
    /// Clear history and the last run
    Clear,
    /// Switch the active provider
    ChangeProvider(Provider),
    /// Set the model of the active provider
    ChangeModel(String),
    /// Probe the active provider
    TestConnection,
    /// Print the copy-paste prompt for a request
    Prompt(String),
    /// Read a pasted response from stdin and run it
    Paste,
    /// Run a bundled sample
    RunSample(&'static Sample),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &Session) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let (command, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = command.to_lowercase();
    let args = args.trim();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "retry" | "r" => {
            if args.is_empty() {
                CommandResult::Retry(None)
            } else {
                match args.parse::<u32>() {
                    Ok(n) if n >= 1 => CommandResult::Retry(Some(n)),
                    _ => CommandResult::Message(format!(
                        "Invalid attempt count: '{}'\nUsage: /retry [N]",
                        args
                    )),
                }
            }
        }

        "clear" | "c" => CommandResult::Clear,

        "history" => SessionCommand::history(session),

        "code" => SessionCommand::code(session),

        "error" => SessionCommand::error(session),

        "provider" | "p" => ProviderCommand::execute(args, session),

        "model" | "m" => ModelCommand::execute(args, session),

        "test" => CommandResult::TestConnection,

        "prompt" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /prompt <what to build>".to_string())
            } else {
                CommandResult::Prompt(args.to_string())
            }
        }

        "paste" => CommandResult::Paste,

        "samples" => CommandResult::Message(samples::listing()),

        "sample" => match samples::find(args) {
            Some(sample) => CommandResult::RunSample(sample),
            None if args.is_empty() => CommandResult::Message(samples::listing()),
            None => CommandResult::Message(format!(
                "No sample named '{}'\nUse /samples to list them",
                args
            )),
        },

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Type what you want to build, e.g. "a 10mm cube with a 4mm hole".

Available commands:
  /help, /h, /?          Show this help message
  /retry, /r [N]         Ask the model to fix the last failing program (N attempts)
  /clear, /c             Clear history and the last run
  /history               List conversation turns
  /code                  Show the last executed program
  /error                 Show the last error
  /provider, /p [name]   Show or switch provider (anthropic, openai, google)
  /model, /m [id]        Show or set the model of the active provider
  /test                  Check the active provider's credentials
  /prompt <request>      Print a prompt to paste into an external chat
  /paste                 Paste a chat reply (end with a line containing only '.')
  /samples               List bundled samples
  /sample <id>           Run a bundled sample
  /quit, /exit, /q       Exit cadgen

Press Ctrl-C to abort a running request or program."#
        .to_string()
}
