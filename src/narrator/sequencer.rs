//! Speech queue sequencer.
//!
//! IDLE → SPEAKING ⇄ PAUSED → IDLE
//!
//! Owns the ordered queue of text segments and is the only component that
//! submits or cancels utterances, so at most one utterance is ever active.
//! Engine callbacks arrive as [`EngineEvent`]s tagged with the utterance id;
//! events for an utterance that is no longer current are ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::engine::{EngineEvent, NarrationEngine, Utterance, UtteranceId, Voice};
use super::filter::filter;
use super::segmenter::{segment, DEFAULT_MAX_SEGMENT_CHARS};
use super::settings::Settings;
use crate::error::Error;

/// Delay before moving on after a failed segment.
pub const RECOVERY_BACKOFF: Duration = Duration::from_millis(500);

/// How long a submitted utterance may sit without starting.
pub const STALL_TIMEOUT: Duration = Duration::from_millis(500);

pub const IDLE_MESSAGE: &str = "TTS service running, waiting for AI responses...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Speaking,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Speaking => write!(f, "SPEAKING"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

/// Status line plus the fields a settings panel needs.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: PlaybackState,
    pub message: String,
    pub last_error: Option<String>,
    pub queued: usize,
    pub enabled: bool,
    pub voice: Option<String>,
    pub settings: Settings,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            message: IDLE_MESSAGE.into(),
            last_error: None,
            queued: 0,
            enabled: true,
            voice: None,
            settings: Settings::default(),
        }
    }
}

/// The utterance currently handed to the engine.
struct Current {
    id: UtteranceId,
    text: String,
    started: bool,
}

pub struct SpeechQueue {
    engine: Option<Arc<dyn NarrationEngine>>,
    queue: VecDeque<String>,
    state: PlaybackState,
    current: Option<Current>,
    next_id: UtteranceId,
    settings: Settings,
    voice: Option<Voice>,
    max_segment_chars: usize,
    retry_at: Option<Instant>,
    stall_at: Option<Instant>,
    /// The simplified-utterance fallback was used for this `speak()`.
    fallback_used: bool,
    status: watch::Sender<Status>,
}

impl SpeechQueue {
    /// Build a sequencer. `engine: None` means synthesis is unavailable on
    /// this host: the error is reported once and every `speak` is a no-op.
    pub fn new(engine: Option<Arc<dyn NarrationEngine>>, settings: Settings) -> Self {
        let settings = settings.clamped();
        let (status, _) = watch::channel(Status {
            settings: settings.clone(),
            ..Status::default()
        });

        let queue = Self {
            engine,
            queue: VecDeque::new(),
            state: PlaybackState::Idle,
            current: None,
            next_id: 1,
            settings,
            voice: None,
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
            retry_at: None,
            stall_at: None,
            fallback_used: false,
            status,
        };

        if queue.engine.is_none() {
            let err = Error::EngineUnavailable {
                binary: "narration engine".into(),
            };
            warn!("{err}");
            queue.status.send_modify(|s| {
                s.message = format!("Error: {err}");
                s.last_error = Some(err.to_string());
            });
        }
        queue
    }

    pub fn with_max_segment_chars(mut self, max: usize) -> Self {
        self.max_segment_chars = max.max(1);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state != PlaybackState::Idle
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Sender side of the status channel, for fields owned by the service.
    pub fn status(&self) -> &watch::Sender<Status> {
        &self.status
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings.clamped();
        let settings = self.settings.clone();
        self.status.send_modify(|s| s.settings = settings);
        self.report("Speech settings updated");
    }

    pub fn set_voice(&mut self, voice: Option<Voice>) {
        let name = voice.as_ref().map(|v| v.name.clone());
        self.voice = voice;
        self.status.send_modify(|s| s.voice = name);
    }

    /// Narrate `text`, replacing whatever is currently being narrated.
    pub fn speak(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if self.engine.is_none() {
            debug!("Ignoring speak: no narration engine");
            return;
        }

        self.stop();
        self.fallback_used = false;

        let processed = filter(text, self.settings.filter_code_blocks);
        let segments = segment(&processed, self.max_segment_chars);
        if segments.is_empty() {
            self.report("No text to speak after processing");
            return;
        }

        info!("Queued {} segments ({} chars)", segments.len(), processed.len());
        self.queue.extend(segments);

        if self.state == PlaybackState::Idle {
            self.speak_next();
        }
    }

    /// Submit the head of the queue, or go idle when it is empty.
    pub fn speak_next(&mut self) {
        self.retry_at = None;
        self.stall_at = None;

        let Some(engine) = self.engine.clone() else {
            return;
        };

        let Some(text) = self.queue.pop_front() else {
            self.current = None;
            self.transition(PlaybackState::Idle);
            self.report(IDLE_MESSAGE);
            return;
        };

        let id = self.next_id;
        self.next_id += 1;

        let preview: String = text.chars().take(50).collect();
        self.current = Some(Current {
            id,
            text: text.clone(),
            started: false,
        });
        self.transition(PlaybackState::Speaking);
        self.stall_at = Some(Instant::now() + STALL_TIMEOUT);
        self.report(&format!("Speaking: {preview}..."));

        debug!("Submitting utterance {id} ({} chars, {} queued)", text.len(), self.queue.len());
        engine.speak(self.utterance(id, text, self.voice.clone()));
    }

    /// Dispatch an engine notification.
    pub fn on_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Start(id) => {
                if let Some(current) = self.current.as_mut().filter(|c| c.id == id) {
                    current.started = true;
                    self.stall_at = None;
                    debug!("Utterance {id} started");
                }
            }
            EngineEvent::End(id) => {
                if !self.is_current(id) {
                    return;
                }
                debug!("Utterance {id} ended");
                self.current = None;
                self.speak_next();
            }
            EngineEvent::Error(id, code) => {
                if !self.is_current(id) {
                    debug!("Ignoring {code} for stale utterance {id}");
                    return;
                }
                self.current = None;
                self.stall_at = None;

                match Error::from_engine(code) {
                    Error::PlaybackCanceled => {
                        debug!("Utterance {id} canceled");
                        self.queue.clear();
                        self.transition(PlaybackState::Idle);
                        self.report(IDLE_MESSAGE);
                    }
                    err => {
                        warn!("Speech error on utterance {id}: {err}");
                        self.status.send_modify(|s| s.last_error = Some(err.to_string()));
                        self.transition(PlaybackState::Idle);
                        self.report(&format!("Error: {err}"));
                        if !self.queue.is_empty() {
                            self.retry_at = Some(Instant::now() + RECOVERY_BACKOFF);
                        }
                    }
                }
            }
            // Handled by the voice catalog
            EngineEvent::VoicesChanged => {}
        }
    }

    /// Earliest instant at which `on_timer` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.retry_at, self.stall_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run due recovery retries and the stall watchdog.
    pub fn on_timer(&mut self, now: Instant) {
        if self.retry_at.is_some_and(|at| at <= now) {
            self.retry_at = None;
            info!("Recovering: moving on to next segment");
            self.speak_next();
            return;
        }

        if self.stall_at.is_some_and(|at| at <= now) {
            self.stall_at = None;
            self.check_stalled();
        }
    }

    /// Resubmit a non-starting utterance without its voice override, at most
    /// once per `speak()`.
    fn check_stalled(&mut self) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        if self.state != PlaybackState::Speaking
            || engine.is_speaking()
            || engine.is_pending()
            || self.fallback_used
        {
            return;
        }
        let Some(current) = self.current.take_if(|c| !c.started) else {
            return;
        };

        self.fallback_used = true;
        warn!("Utterance {} did not start, retrying with default voice", current.id);
        engine.cancel();

        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(Current {
            id,
            text: current.text.clone(),
            started: false,
        });
        self.report("Retrying with default voice");
        engine.speak(self.utterance(id, current.text, None));
    }

    /// Clear the queue and cancel anything in flight.
    pub fn stop(&mut self) {
        self.queue.clear();
        self.retry_at = None;
        self.stall_at = None;
        self.current = None;
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        self.transition(PlaybackState::Idle);
        self.report("Speech stopped");
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Speaking || self.current.is_none() {
            return;
        }
        if let Some(engine) = &self.engine {
            engine.pause();
            self.stall_at = None;
            self.transition(PlaybackState::Paused);
            self.report("Speech paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        if let Some(engine) = &self.engine {
            engine.resume();
            self.transition(PlaybackState::Speaking);
            self.report("Speech resumed");
        }
    }

    fn is_current(&self, id: UtteranceId) -> bool {
        self.current.as_ref().is_some_and(|c| c.id == id)
    }

    fn utterance(&self, id: UtteranceId, text: String, voice: Option<Voice>) -> Utterance {
        Utterance {
            id,
            text,
            voice,
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            volume: self.settings.volume,
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!("State: {} → {}", self.state, next);
            self.state = next;
        }
    }

    fn report(&self, message: &str) {
        let state = self.state;
        let queued = self.queue.len();
        self.status.send_modify(|s| {
            s.state = state;
            s.queued = queued;
            s.message = message.to_string();
        });
    }
}
