//! Intent resolution: transcript in, ordered action records out
//!
//! The resolver asks a language model to classify the utterance against the
//! device catalog and parses its JSON reply. Any failure is reported as "no
//! decision" (`None`) so the caller can apologise instead of crashing.

mod action;
mod llm;
mod prompt;

pub use action::{ActionRecord, ServiceCall, parse_actions, strip_code_fences};
pub use llm::{LanguageModel, LlmClient, LlmProvider};
pub use prompt::{VALID_DOMAINS, VALID_SERVICES, build_prompt};

use crate::catalog::DeviceCatalog;

/// Turns transcripts into action records with a single model call
pub struct IntentResolver {
    model: Box<dyn LanguageModel>,
    catalog: DeviceCatalog,
}

impl IntentResolver {
    /// Create a resolver over `catalog`
    #[must_use]
    pub fn new(model: Box<dyn LanguageModel>, catalog: DeviceCatalog) -> Self {
        Self { model, catalog }
    }

    /// Device catalog embedded in every prompt
    #[must_use]
    pub const fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Resolve a transcript; `None` means no decision could be made
    pub async fn resolve(&self, transcript: &str) -> Option<Vec<ActionRecord>> {
        let prompt = build_prompt(transcript, &self.catalog);

        let raw = match self.model.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "intent model call failed");
                return None;
            }
        };

        match parse_actions(&raw) {
            Ok(actions) => {
                tracing::debug!(count = actions.len(), ?actions, "intent resolved");
                Some(actions)
            }
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "unparseable intent reply");
                None
            }
        }
    }
}
