//! Narration service: the owning context for the speech queue.
//!
//! One task owns the [`SpeechQueue`] and [`VoiceCatalog`] and multiplexes
//! bridge commands, engine events, the voice-retry interval and the queue's
//! timers. Nothing else touches the engine.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::narrator::detector::ResponseDetector;
use crate::narrator::engine::{EngineEvent, NarrationEngine, Voice};
use crate::narrator::sequencer::{SpeechQueue, Status};
use crate::narrator::settings::SettingsUpdate;
use crate::narrator::voices::{host_language, VoiceCatalog};

pub const TEST_SENTENCE: &str = "This is a test of the selected voice and speech settings.";

/// Messages accepted from the host bridge, hooks and the clipboard watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Narrate text; ignored while narration is disabled.
    Speak { text: String },
    /// Narrate text even while disabled.
    ForceSpeech { text: String },
    /// A detector candidate; narrated when it looks new and auto-read is on.
    ResponseDetected { text: String },
    Stop,
    Pause,
    Resume,
    UpdateSettings(SettingsUpdate),
    /// Update and persist settings.
    SaveSettings(SettingsUpdate),
    ReadLastResponse,
    ReloadVoices,
    TestVoice,
    SetEnabled(bool),
}

/// Cheap handle for talking to a running service.
#[derive(Clone)]
pub struct NarrationHandle {
    pub commands: mpsc::Sender<Command>,
    pub status: watch::Receiver<Status>,
    pub voices: watch::Receiver<Vec<Voice>>,
}

pub struct NarrationService {
    config: Config,
    config_path: Option<PathBuf>,
    engine: Option<Arc<dyn NarrationEngine>>,
    queue: SpeechQueue,
    catalog: VoiceCatalog,
    detector: ResponseDetector,
    enabled: bool,
    last_response: Option<String>,
    voices_tx: watch::Sender<Vec<Voice>>,
}

impl NarrationService {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        engine: Option<Arc<dyn NarrationEngine>>,
        detector: ResponseDetector,
    ) -> Self {
        let settings = config.speech.settings();
        let queue = SpeechQueue::new(engine.clone(), settings.clone())
            .with_max_segment_chars(config.speech.max_segment_chars);

        let locale = if config.speech.locale.is_empty() {
            host_language()
        } else {
            config.speech.locale.clone()
        };
        let catalog = VoiceCatalog::new(
            locale,
            settings.preferred_voice().map(String::from),
            config.voices.max_attempts,
        );

        let enabled = config.speech.enabled;
        queue.status().send_modify(|s| s.enabled = enabled);

        let (voices_tx, _) = watch::channel(Vec::new());

        Self {
            config,
            config_path,
            engine,
            queue,
            catalog,
            detector,
            enabled,
            last_response: None,
            voices_tx,
        }
    }

    pub fn status(&self) -> watch::Receiver<Status> {
        self.queue.subscribe()
    }

    pub fn voices(&self) -> watch::Receiver<Vec<Voice>> {
        self.voices_tx.subscribe()
    }

    /// Run until the command channel closes or `shutdown` resolves.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);

        if let Some(engine) = self.engine.clone() {
            if self.catalog.load(engine.as_ref()) {
                self.apply_voices();
            }
        }

        let mut voice_retry =
            tokio::time::interval(Duration::from_millis(self.config.voices.retry_interval_ms.max(1)));
        voice_retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately and the initial load already happened
        voice_retry.tick().await;

        info!("Narration service ready");

        loop {
            let deadline = self.queue.next_deadline();
            let can_retry_voices = self.engine.is_some() && self.catalog.needs_retry();

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("Command channel closed");
                            break;
                        }
                    }
                }
                Some(event) = events.recv() => self.handle_event(event),
                _ = voice_retry.tick(), if can_retry_voices => self.retry_voices(),
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.queue.on_timer(std::time::Instant::now());
                }
                () = &mut shutdown => {
                    info!("Shutting down narration service");
                    break;
                }
            }
        }

        self.queue.stop();
    }

    pub fn handle_command(&mut self, command: Command) {
        debug!("Command: {command:?}");
        match command {
            Command::Speak { text } => {
                if !self.enabled {
                    debug!("Narration disabled, ignoring speak");
                    return;
                }
                self.remember(&text);
                self.queue.speak(&text);
            }
            Command::ForceSpeech { text } => {
                self.remember(&text);
                self.queue.speak(&text);
            }
            Command::ResponseDetected { text } => {
                let Some(text) = self.detector.accept(&text) else {
                    return;
                };
                info!("AI response detected ({} chars)", text.len());
                self.last_response = Some(text.clone());
                if self.enabled && self.config.speech.auto_read {
                    self.queue.speak(&text);
                }
            }
            Command::Stop => self.queue.stop(),
            Command::Pause => self.queue.pause(),
            Command::Resume => self.queue.resume(),
            Command::UpdateSettings(update) => self.update_settings(update),
            Command::SaveSettings(update) => {
                self.update_settings(update);
                let settings = self.queue.settings().clone();
                self.config.speech.store_settings(&settings);
                self.persist();
            }
            Command::ReadLastResponse => match self.last_response.clone() {
                Some(text) => self.queue.speak(&text),
                None => {
                    info!("No response to read yet");
                    self.queue
                        .status()
                        .send_modify(|s| s.message = "No AI response to read yet".into());
                }
            },
            Command::ReloadVoices => {
                if let Some(engine) = self.engine.clone() {
                    if self.catalog.reload(engine.as_ref()) {
                        self.apply_voices();
                    }
                }
            }
            Command::TestVoice => self.queue.speak(TEST_SENTENCE),
            Command::SetEnabled(enabled) => {
                if self.enabled == enabled {
                    return;
                }
                self.enabled = enabled;
                info!("Narration {}", if enabled { "enabled" } else { "disabled" });
                if !enabled {
                    self.queue.stop();
                }
                self.queue.status().send_modify(|s| s.enabled = enabled);
                self.config.speech.enabled = enabled;
                self.persist();
            }
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::VoicesChanged => {
                let Some(engine) = self.engine.clone() else {
                    return;
                };
                if self.catalog.on_voices_changed(engine.as_ref()) {
                    self.apply_voices();
                }
            }
            other => self.queue.on_event(other),
        }
    }

    fn retry_voices(&mut self) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        if self.catalog.retry_tick(engine.as_ref()) {
            self.apply_voices();
        }
    }

    fn update_settings(&mut self, update: SettingsUpdate) {
        let mut settings = self.queue.settings().clone();
        settings.apply(update);
        self.catalog
            .set_preferred(settings.preferred_voice().map(String::from));
        self.queue.update_settings(settings);
        self.queue.set_voice(self.catalog.selected().cloned());
    }

    /// Push the catalog's list and selection to the queue and observers.
    fn apply_voices(&mut self) {
        self.queue.set_voice(self.catalog.selected().cloned());
        self.voices_tx.send_replace(self.catalog.voices().to_vec());
    }

    fn remember(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.last_response = Some(text.trim().to_string());
        }
    }

    fn persist(&self) {
        let Some(path) = self.config_path.clone().or_else(Config::user_path) else {
            warn!("No location to save config to");
            return;
        };
        if let Err(e) = self.config.save(&path) {
            warn!("{e}");
        }
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::narrator::detector::HeuristicClassifier;
    use crate::narrator::engine::EngineErrorCode;
    use crate::narrator::sequencer::tests::RecordingEngine;
    use crate::narrator::sequencer::PlaybackState;

    fn service(config: Config) -> (Arc<RecordingEngine>, NarrationService, tempfile::TempDir) {
        let engine = Arc::new(RecordingEngine::default());
        *engine.voices.lock().unwrap() = vec![
            Voice::new("A", "fr-FR"),
            Voice::new("B", "en-US"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let detector =
            ResponseDetector::new(Box::new(HeuristicClassifier::new(&DetectorConfig::default())));
        let mut config = config;
        config.speech.locale = "en".into();
        let service = NarrationService::new(
            config,
            Some(dir.path().join("config.yaml")),
            Some(engine.clone()),
            detector,
        );
        (engine, service, dir)
    }

    fn spoken_texts(engine: &RecordingEngine) -> Vec<String> {
        engine.spoken().into_iter().map(|u| u.text).collect()
    }

    #[test]
    fn disabled_service_ignores_speak_but_not_force() {
        let mut config = Config::default();
        config.speech.enabled = false;
        let (engine, mut service, _dir) = service(config);

        service.handle_command(Command::Speak { text: "Hello there.".into() });
        assert!(engine.spoken().is_empty());

        service.handle_command(Command::ForceSpeech { text: "Forced words.".into() });
        assert_eq!(spoken_texts(&engine), vec!["Forced words."]);
    }

    #[test]
    fn detected_response_is_read_once_and_replayable() {
        let (engine, mut service, _dir) = service(Config::default());
        let text = "I refactored the loader and added two tests.";

        service.handle_command(Command::ResponseDetected { text: text.into() });
        service.handle_command(Command::ResponseDetected { text: text.into() });
        assert_eq!(spoken_texts(&engine).len(), 1);

        service.handle_command(Command::Stop);
        service.handle_command(Command::ReadLastResponse);
        assert_eq!(spoken_texts(&engine), vec![text, text]);
    }

    #[test]
    fn auto_read_off_only_remembers() {
        let mut config = Config::default();
        config.speech.auto_read = false;
        let (engine, mut service, _dir) = service(config);

        service.handle_command(Command::ResponseDetected {
            text: "The build is green again after the fix.".into(),
        });
        assert!(engine.spoken().is_empty());

        service.handle_command(Command::ReadLastResponse);
        assert_eq!(engine.spoken().len(), 1);
    }

    #[test]
    fn read_last_without_response_reports() {
        let (engine, mut service, _dir) = service(Config::default());
        service.handle_command(Command::ReadLastResponse);
        assert!(engine.spoken().is_empty());
        assert_eq!(service.status().borrow().message, "No AI response to read yet");
    }

    #[test]
    fn settings_update_reselects_voice() {
        let (engine, mut service, _dir) = service(Config::default());
        service.handle_command(Command::ReloadVoices);
        assert_eq!(service.status().borrow().voice.as_deref(), Some("B"));

        service.handle_command(Command::UpdateSettings(SettingsUpdate {
            voice: Some("A".into()),
            rate: Some(0.1),
            ..SettingsUpdate::default()
        }));
        service.handle_command(Command::TestVoice);

        let utterance = &engine.spoken()[0];
        assert_eq!(utterance.voice.as_ref().unwrap().name, "A");
        assert_eq!(utterance.rate, 0.5);
        assert_eq!(utterance.text, TEST_SENTENCE);
    }

    #[test]
    fn save_settings_and_disable_persist_config() {
        let (_engine, mut service, dir) = service(Config::default());
        let path = dir.path().join("config.yaml");

        service.handle_command(Command::SaveSettings(SettingsUpdate {
            pitch: Some(1.5),
            filter_code_blocks: Some(false),
            ..SettingsUpdate::default()
        }));
        let saved = Config::load(Some(&path));
        assert_eq!(saved.speech.pitch, 1.5);
        assert!(!saved.speech.filter_code_blocks);

        service.handle_command(Command::SetEnabled(false));
        assert!(!Config::load(Some(&path)).speech.enabled);
        assert!(!service.status().borrow().enabled);
    }

    #[test]
    fn disabling_stops_current_narration() {
        let (_engine, mut service, _dir) = service(Config::default());
        service.handle_command(Command::Speak { text: "One. Two. Three.".into() });
        service.handle_command(Command::SetEnabled(false));
        assert_eq!(service.status().borrow().state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn run_loop_advances_on_engine_events() {
        let (engine, service, _dir) = service(Config::default());
        let mut status = service.status();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(service.run(cmd_rx, event_rx, async {
            let _ = stop_rx.await;
        }));

        cmd_tx
            .send(Command::Speak { text: "x".repeat(150) + ". " + &"y".repeat(150) + "." })
            .await
            .unwrap();
        status
            .wait_for(|s| s.state == PlaybackState::Speaking)
            .await
            .unwrap();

        event_tx.send(EngineEvent::Start(engine.last_id())).unwrap();
        event_tx
            .send(EngineEvent::Error(engine.last_id(), EngineErrorCode::SynthesisFailed))
            .unwrap();
        // Recovery backoff then the second segment is submitted
        status
            .wait_for(|s| s.state == PlaybackState::Speaking && s.queued == 0)
            .await
            .unwrap();
        event_tx.send(EngineEvent::End(engine.last_id())).unwrap();
        status
            .wait_for(|s| s.state == PlaybackState::Idle && s.queued == 0)
            .await
            .unwrap();

        assert_eq!(engine.spoken().len(), 2);
        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
