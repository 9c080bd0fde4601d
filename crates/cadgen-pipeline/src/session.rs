//! Conversation session: provider settings, history and the last failure

use cadgen_ai::{ChatMessage, Provider, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters of each turn shown in history listings
pub const HISTORY_PREVIEW_CHARS: usize = 140;

/// Credentials and model selection for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Override for the provider's default endpoint
    pub base_url: Option<String>,
}

impl ProviderSettings {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            api_key: None,
            model: provider.default_model().to_string(),
            base_url: None,
        }
    }

    /// Whether a non-blank key is configured
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }
}

/// One line of a history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub index: usize,
    pub role: Role,
    /// Single-line prefix of the content
    pub preview: String,
    pub truncated: bool,
}

/// State for one user session.
///
/// Orchestrators borrow it mutably for the duration of a run. `history` only
/// grows on successful round trips; `last_code` and `last_error` describe the
/// outcome of the most recent run.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub provider: Provider,
    settings: HashMap<Provider, ProviderSettings>,
    /// Turns replayed to the provider on every call, in order
    pub history: Vec<ChatMessage>,
    /// Most recently executed program (after patching)
    pub last_code: String,
    /// Failure text of `last_code`, empty after a success
    pub last_error: String,
    /// Raw text of the most recent provider response
    pub last_response: String,
}

impl Session {
    pub fn new(provider: Provider) -> Self {
        let settings = Provider::ALL
            .iter()
            .map(|p| (*p, ProviderSettings::for_provider(*p)))
            .collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            provider,
            settings,
            history: Vec::new(),
            last_code: String::new(),
            last_error: String::new(),
            last_response: String::new(),
        }
    }

    pub fn settings(&self, provider: Provider) -> &ProviderSettings {
        // Every provider is inserted in `new`
        &self.settings[&provider]
    }

    pub fn settings_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        self.settings
            .entry(provider)
            .or_insert_with(|| ProviderSettings::for_provider(provider))
    }

    /// Settings of the active provider
    pub fn active(&self) -> &ProviderSettings {
        self.settings(self.provider)
    }

    pub fn set_api_key(&mut self, provider: Provider, api_key: impl Into<String>) {
        let key = api_key.into();
        self.settings_mut(provider).api_key = (!key.trim().is_empty()).then_some(key);
    }

    pub fn set_model(&mut self, provider: Provider, model: impl Into<String>) {
        self.settings_mut(provider).model = model.into();
    }

    pub fn set_base_url(&mut self, provider: Provider, base_url: Option<String>) {
        self.settings_mut(provider).base_url = base_url;
    }

    /// Whether a previous run left a failing program to repair
    pub fn has_failure(&self) -> bool {
        !self.last_code.is_empty() && !self.last_error.is_empty()
    }

    /// Append a successful round trip: one user turn, then one assistant turn
    pub(crate) fn record_success(&mut self, request: &str, response: &str, code: &str) {
        self.history.push(ChatMessage::user(request));
        self.history.push(ChatMessage::assistant(response));
        self.last_code = code.to_string();
        self.last_error.clear();
    }

    pub(crate) fn record_failure(&mut self, code: &str, error: &str) {
        self.last_code = code.to_string();
        self.last_error = error.to_string();
    }

    pub(crate) fn forget_failure(&mut self) {
        self.last_code.clear();
        self.last_error.clear();
    }

    /// Reset history and run state. Provider settings survive.
    pub fn clear(&mut self) {
        self.history.clear();
        self.last_code.clear();
        self.last_error.clear();
        self.last_response.clear();
    }

    /// Numbered single-line previews of every turn
    pub fn history_previews(&self) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let truncated = message.content.chars().count() > HISTORY_PREVIEW_CHARS;
                let preview = message
                    .content
                    .chars()
                    .take(HISTORY_PREVIEW_CHARS)
                    .collect::<String>()
                    .replace('\n', " ");
                HistoryEntry {
                    index,
                    role: message.role,
                    preview,
                    truncated,
                }
            })
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Provider::Anthropic)
    }
}
