//! Prompt construction for intent classification

use std::fmt::Write;

use crate::catalog::DeviceCatalog;

/// Domains the model may target
pub const VALID_DOMAINS: [&str; 4] = ["switch", "light", "lock", "media_player"];

/// Services the model may call
pub const VALID_SERVICES: [&str; 9] = [
    "turn_on",
    "turn_off",
    "unlock",
    "lock",
    "media_play",
    "media_pause",
    "media_stop",
    "volume_mute",
    "select_source",
];

/// Build the classification prompt for one utterance
#[must_use]
pub fn build_prompt(transcript: &str, catalog: &DeviceCatalog) -> String {
    let mut devices = String::new();
    for (name, entity_id) in catalog.iter() {
        let _ = writeln!(devices, "- {name} ({entity_id})");
    }
    if devices.is_empty() {
        devices.push_str("(no devices configured)\n");
    }

    // JSON-quote the utterance so stray quotes can't break the prompt
    let quoted = serde_json::to_string(transcript).unwrap_or_else(|_| format!("\"{transcript}\""));

    let domains = quote_list(&VALID_DOMAINS);
    let services = quote_list(&VALID_SERVICES);

    format!(
        r#"You are Jarvis, a smart home assistant that turns spoken requests into home-automation actions.
The user said: {quoted}

Available devices:
{devices}
Instructions:
1. Work out what the user wants.
2. Map each friendly device name to its entity_id from the list above.
3. Reply with a JSON list of actions and nothing else: no prose, no markdown.

Media players and TVs:
- If the user asks to open an app (for example YouTube or Netflix), use action "call_service" with domain "media_player" and service "select_source".
- Include a "source" field containing the app name exactly as spoken (for example "YouTube").

Valid values:
- domain: {domains}
- service: {services}

Format:
[
  {{
    "action": "call_service",
    "domain": "media_player",
    "service": "select_source",
    "entity_id": "media_player.living_room_tv",
    "source": "YouTube"
  }}
]

For general conversation, reply with:
[ {{ "action": "chat", "response": "A short spoken reply." }} ]
"#
    )
}

fn quote_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|i| format!("\"{i}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
