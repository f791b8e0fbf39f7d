//! Executes resolved actions against the hub and the speaker

use std::sync::Arc;
use std::time::Duration;

use crate::hub::HomeHub;
use crate::intent::ActionRecord;
use crate::voice::Speaker;

/// Spoken when the resolver could not decide what to do
pub const NO_DECISION_REPLY: &str = "I'm not sure what to do.";

/// Tally of one dispatch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Service calls the hub accepted and chat replies spoken
    pub executed: usize,
    /// Service calls that failed
    pub failed: usize,
    /// Records with an unhandled action tag
    pub skipped: usize,
}

/// Runs action records in order, one at a time
pub struct ActionDispatcher {
    hub: Arc<dyn HomeHub>,
    speaker: Arc<dyn Speaker>,
    pause: Duration,
}

impl ActionDispatcher {
    /// Create a dispatcher that waits `pause` between a service call and the next action
    #[must_use]
    pub fn new(hub: Arc<dyn HomeHub>, speaker: Arc<dyn Speaker>, pause: Duration) -> Self {
        Self {
            hub,
            speaker,
            pause,
        }
    }

    /// Act on a resolver decision; `None` or an empty list earns an apology
    pub async fn handle_decision(&self, decision: Option<Vec<ActionRecord>>) -> DispatchReport {
        match decision {
            Some(actions) if !actions.is_empty() => self.dispatch(&actions).await,
            _ => {
                self.speaker.speak(NO_DECISION_REPLY).await;
                DispatchReport::default()
            }
        }
    }

    /// Execute `actions` in order
    ///
    /// A failed service call is logged and does not stop later actions.
    pub async fn dispatch(&self, actions: &[ActionRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (i, action) in actions.iter().enumerate() {
            match action {
                ActionRecord::ServiceCall(call) => {
                    self.speaker
                        .speak(&format!("Executing {} on {}.", call.service, call.domain))
                        .await;

                    match self.hub.call_service(call).await {
                        Ok(()) => report.executed += 1,
                        Err(e) => {
                            tracing::warn!(
                                domain = %call.domain,
                                service = %call.service,
                                entity_id = %call.entity_id,
                                error = %e,
                                "service call failed"
                            );
                            report.failed += 1;
                        }
                    }

                    // Give the hub time to settle before the next command
                    if i + 1 < actions.len() {
                        tokio::time::sleep(self.pause).await;
                    }
                }
                ActionRecord::ChatReply { response } => {
                    self.speaker.speak(response).await;
                    report.executed += 1;
                }
                ActionRecord::Unknown(tag) => {
                    tracing::debug!(action = %tag, "skipping unknown action");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            executed = report.executed,
            failed = report.failed,
            skipped = report.skipped,
            "dispatch complete"
        );
        report
    }
}
