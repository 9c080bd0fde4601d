//! /provider and /model commands

use super::CommandResult;
use cadgen_ai::Provider;
use cadgen_pipeline::Session;

pub struct ProviderCommand;

impl ProviderCommand {
    /// List providers if no args, otherwise switch to the named one
    pub fn execute(args: &str, session: &Session) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(list_providers(session));
        }
        match args.parse::<Provider>() {
            Ok(provider) => CommandResult::ChangeProvider(provider),
            Err(e) => CommandResult::Message(e.to_string()),
        }
    }
}

pub struct ModelCommand;

impl ModelCommand {
    /// Show the active model if no args, otherwise set it
    pub fn execute(args: &str, session: &Session) -> CommandResult {
        if args.is_empty() {
            CommandResult::Message(format!(
                "Model: {} ({})\nSet with: /model <id>",
                session.active().model,
                session.provider
            ))
        } else {
            CommandResult::ChangeModel(args.to_string())
        }
    }
}

fn list_providers(session: &Session) -> String {
    let mut output = String::from("Providers:\n");
    for provider in Provider::ALL {
        let settings = session.settings(provider);
        let marker = if provider == session.provider { " *" } else { "" };
        let key = if settings.has_credentials() {
            "key set"
        } else {
            "no key"
        };
        output.push_str(&format!(
            "  {:<10} {:<24} ({}){}\n",
            provider.id(),
            settings.model,
            key,
            marker
        ));
    }
    output.push_str("\nSwitch with: /provider <name>");
    output
}
