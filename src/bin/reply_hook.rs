//! reply-hook: chat-client hook binary for read-aloud.
//!
//! Reads one hook event (JSON) from stdin and forwards it to the narration
//! bridge. Exits quietly whenever the bridge is not reachable.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use reply_reader::narrator::transcript::extract_last_assistant_text;

const DEFAULT_API: &str = "http://127.0.0.1:8768";
const MAX_RESPONSE_CHARS: usize = 2000;

#[derive(Deserialize)]
struct HookEvent {
    hook_event_name: Option<String>,
    transcript_path: Option<String>,
}

#[derive(Serialize)]
struct TextRequest {
    text: String,
}

enum Action {
    Response(String),
    Stop,
    Ignore,
}

fn action_for(event: &HookEvent) -> Action {
    match event.hook_event_name.as_deref() {
        Some("Stop") => event
            .transcript_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| extract_last_assistant_text(Path::new(p), MAX_RESPONSE_CHARS))
            .map_or(Action::Ignore, Action::Response),
        Some("UserPromptSubmit") => Action::Stop,
        _ => Action::Ignore,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        return;
    }

    let Ok(event) = serde_json::from_str::<HookEvent>(&input) else {
        return;
    };

    let api = std::env::var("REPLY_READER_API").unwrap_or_else(|_| DEFAULT_API.to_string());
    let api = api.trim_end_matches('/');

    // Short timeouts: the client waits on this hook
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| Client::new());

    let request = match action_for(&event) {
        Action::Response(text) => client
            .post(format!("{api}/response"))
            .json(&TextRequest { text }),
        Action::Stop => client.post(format!("{api}/stop")),
        Action::Ignore => return,
    };

    let _ = request.send().await;
}
