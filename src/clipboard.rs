//! Clipboard watcher.
//!
//! Polls the system clipboard with arboard on a dedicated thread and
//! forwards new text to the narration service as a detector candidate.

use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ClipboardConfig;
use crate::service::Command;

/// Remembers the last clipboard text so only changes are forwarded.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: Option<String>,
    primed: bool,
}

impl ChangeTracker {
    /// Record the current clipboard text. Returns it when it differs from
    /// the previous observation. The first observation only primes the
    /// tracker so whatever was copied before startup is not narrated.
    pub fn observe(&mut self, text: Option<String>) -> Option<String> {
        let text = text.filter(|t| !t.trim().is_empty());
        if !self.primed {
            self.primed = true;
            self.last = text;
            return None;
        }
        if text.is_none() || text == self.last {
            return None;
        }
        self.last = text.clone();
        text
    }
}

/// Spawn the polling thread. It exits when the service stops listening.
pub fn spawn_watcher(config: &ClipboardConfig, commands: mpsc::Sender<Command>) {
    let interval = Duration::from_millis(config.poll_interval_ms.max(100));

    let spawned = thread::Builder::new()
        .name("clipboard-watcher".into())
        .spawn(move || {
            let mut clipboard = match arboard::Clipboard::new() {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to open clipboard: {e}, clipboard reading disabled");
                    return;
                }
            };
            info!("Watching clipboard every {}ms", interval.as_millis());

            let mut tracker = ChangeTracker::default();
            loop {
                let current = clipboard.get_text().ok();
                if let Some(text) = tracker.observe(current) {
                    debug!("Clipboard changed ({} chars)", text.len());
                    if commands.blocking_send(Command::ResponseDetected { text }).is_err() {
                        break;
                    }
                }
                thread::sleep(interval);
            }
            debug!("Clipboard watcher stopped");
        });

    if let Err(e) = spawned {
        warn!("Failed to start clipboard watcher: {e}");
    }
}
