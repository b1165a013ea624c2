//! eSpeak-NG narration engine.
//!
//! Pipeline per utterance:
//! 1. Text → WAV via `espeak-ng --stdout` (text on stdin)
//! 2. WAV → rodio `Decoder`
//! 3. Decoder → rodio `Sink` on a shared mixer, polled until drained or cancelled
//!
//! Voices are discovered in the background with `espeak-ng --voices`, so the
//! list starts empty and an `EngineEvent::VoicesChanged` follows.

use std::io::Cursor;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::engine::{EngineErrorCode, EngineEvent, NarrationEngine, Utterance, UtteranceId, Voice};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The utterance currently owned by the engine.
struct Playback {
    id: UtteranceId,
    cancelled: Arc<AtomicBool>,
    /// Set once synthesis finished.
    sink: Option<Arc<Sink>>,
    /// Requested pause; may arrive before there is a sink to pause.
    paused: bool,
    /// `Start` was reported for this utterance.
    announced: bool,
    /// Synthesis and playback task.
    task: Option<AbortHandle>,
}

impl Playback {
    fn new(id: UtteranceId, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            id,
            cancelled,
            sink: None,
            paused: false,
            announced: false,
            task: None,
        }
    }

    /// Pause or resume. Returns true when this call makes audio begin for
    /// the first time.
    fn set_paused(&mut self, paused: bool) -> bool {
        self.paused = paused;
        let Some(sink) = &self.sink else {
            return false;
        };
        if paused {
            sink.pause();
            return false;
        }
        sink.play();
        !std::mem::replace(&mut self.announced, true)
    }

    /// Take over a paused sink holding the synthesized audio. Playback only
    /// begins when no pause is pending; returns true in that case.
    fn attach(&mut self, sink: Arc<Sink>) -> bool {
        self.sink = Some(sink);
        self.set_paused(self.paused)
    }

    /// Silence the audio and kill synthesis still in progress.
    fn stop(self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(task) = self.task {
            task.abort();
        }
        if let Some(sink) = self.sink {
            sink.stop();
        }
    }
}

#[derive(Clone)]
struct Shared {
    binary: String,
    mixer: Mixer,
    active: Arc<Mutex<Option<Playback>>>,
    events: UnboundedSender<EngineEvent>,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the service is shutting down
        let _ = self.events.send(event);
    }

    /// Stop a playback that was replaced or cancelled. An aborted task
    /// reports nothing itself, so the interruption is emitted here.
    fn interrupt(&self, playback: Playback) {
        let id = playback.id;
        debug!("Interrupting utterance {id}");
        playback.stop();
        self.emit(EngineEvent::Error(id, EngineErrorCode::Interrupted));
    }

    /// Drop the active playback if it still belongs to `id`.
    fn release(&self, id: UtteranceId) {
        let mut active = self.active.lock().unwrap();
        if active.as_ref().is_some_and(|p| p.id == id) {
            *active = None;
        }
    }
}

pub struct EspeakEngine {
    shared: Shared,
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl EspeakEngine {
    /// Locate the binary, open the audio output and start voice discovery.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &EngineConfig, events: UnboundedSender<EngineEvent>) -> Result<Self> {
        let binary = detect_binary(&config.binary)?;
        let mixer = open_output()?;
        info!("Narration engine: {binary}");

        let engine = Self {
            shared: Shared {
                binary,
                mixer,
                active: Arc::new(Mutex::new(None)),
                events,
            },
            voices: Arc::new(Mutex::new(Vec::new())),
        };
        engine.discover_voices();
        Ok(engine)
    }

    fn discover_voices(&self) {
        let shared = self.shared.clone();
        let voices = self.voices.clone();

        tokio::spawn(async move {
            let output = match tokio::process::Command::new(&shared.binary)
                .arg("--voices")
                .output()
                .await
            {
                Ok(o) if o.status.success() => o,
                Ok(o) => {
                    warn!(
                        "'{} --voices' failed with {}: {}",
                        shared.binary,
                        o.status,
                        String::from_utf8_lossy(&o.stderr).trim()
                    );
                    return;
                }
                Err(e) => {
                    warn!("Failed to run '{} --voices': {e}", shared.binary);
                    return;
                }
            };

            let parsed = parse_voices(&String::from_utf8_lossy(&output.stdout));
            debug!("Discovered {} espeak voices", parsed.len());
            *voices.lock().unwrap() = parsed;
            shared.emit(EngineEvent::VoicesChanged);
        });
    }
}

impl NarrationEngine for EspeakEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    fn speak(&self, utterance: Utterance) {
        let id = utterance.id;
        let cancelled = Arc::new(AtomicBool::new(false));
        let previous = self
            .shared
            .active
            .lock()
            .unwrap()
            .replace(Playback::new(id, cancelled.clone()));
        if let Some(previous) = previous {
            self.shared.interrupt(previous);
        }

        let task = tokio::spawn(play_utterance(self.shared.clone(), utterance, cancelled));
        if let Some(p) = self.shared.active.lock().unwrap().as_mut().filter(|p| p.id == id) {
            p.task = Some(task.abort_handle());
        }
    }

    fn cancel(&self) {
        let playback = self.shared.active.lock().unwrap().take();
        if let Some(playback) = playback {
            self.shared.interrupt(playback);
        }
    }

    fn pause(&self) {
        if let Some(p) = self.shared.active.lock().unwrap().as_mut() {
            p.set_paused(true);
        }
    }

    fn resume(&self) {
        let started = self
            .shared
            .active
            .lock()
            .unwrap()
            .as_mut()
            .and_then(|p| p.set_paused(false).then_some(p.id));
        if let Some(id) = started {
            self.shared.emit(EngineEvent::Start(id));
        }
    }

    fn is_speaking(&self) -> bool {
        self.shared
            .active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| p.sink.is_some())
    }

    fn is_paused(&self) -> bool {
        self.shared
            .active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| p.paused)
    }

    fn is_pending(&self) -> bool {
        self.shared
            .active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| p.sink.is_none())
    }
}

async fn play_utterance(shared: Shared, utterance: Utterance, cancelled: Arc<AtomicBool>) {
    let id = utterance.id;

    let wav = match synthesize(&shared.binary, &utterance).await {
        Ok(wav) => wav,
        Err(code) => {
            shared.release(id);
            shared.emit(EngineEvent::Error(id, code));
            return;
        }
    };

    if cancelled.load(Ordering::Relaxed) {
        shared.emit(EngineEvent::Error(id, EngineErrorCode::Canceled));
        return;
    }

    let source = match Decoder::new(Cursor::new(wav)) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to decode synthesized audio: {e}");
            shared.release(id);
            shared.emit(EngineEvent::Error(id, EngineErrorCode::SynthesisFailed));
            return;
        }
    };

    // Held paused until attached, so a pause requested during synthesis
    // keeps it silent
    let sink = Arc::new(Sink::connect_new(&shared.mixer));
    sink.pause();
    sink.set_volume(utterance.volume);
    sink.append(source);

    let started = {
        let mut active = shared.active.lock().unwrap();
        match active.as_mut() {
            Some(p) if p.id == id && !cancelled.load(Ordering::Relaxed) => {
                Some(p.attach(sink.clone()))
            }
            _ => None,
        }
    };
    match started {
        None => {
            sink.stop();
            shared.emit(EngineEvent::Error(id, EngineErrorCode::Canceled));
            return;
        }
        Some(true) => shared.emit(EngineEvent::Start(id)),
        Some(false) => debug!("Utterance {id} synthesized while paused, holding audio"),
    }

    loop {
        if cancelled.load(Ordering::Relaxed) {
            sink.stop();
            shared.emit(EngineEvent::Error(id, EngineErrorCode::Interrupted));
            return;
        }
        if sink.empty() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    shared.release(id);
    shared.emit(EngineEvent::End(id));
}

/// Run espeak and collect its WAV output.
async fn synthesize(binary: &str, utterance: &Utterance) -> std::result::Result<Vec<u8>, EngineErrorCode> {
    let mut cmd = tokio::process::Command::new(binary);
    cmd.arg("--stdout");
    if let Some(voice) = &utterance.voice {
        cmd.arg("-v").arg(&voice.lang);
    }
    cmd.arg("-s").arg(words_per_minute(utterance.rate).to_string());
    cmd.arg("-p").arg(espeak_pitch(utterance.pitch).to_string());
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        warn!("Failed to spawn {binary}: {e}");
        EngineErrorCode::SynthesisUnavailable
    })?;

    let mut stdin = child.stdin.take().ok_or(EngineErrorCode::SynthesisFailed)?;
    stdin
        .write_all(utterance.text.as_bytes())
        .await
        .map_err(|e| {
            warn!("Failed to write text to {binary}: {e}");
            EngineErrorCode::SynthesisFailed
        })?;
    // EOF so espeak starts speaking
    drop(stdin);

    let output = child.wait_with_output().await.map_err(|e| {
        warn!("{binary} did not finish: {e}");
        EngineErrorCode::SynthesisFailed
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("{binary} exited with {}: {}", output.status, stderr.trim());
        return Err(if utterance.voice.is_some() && stderr.contains("voice") {
            EngineErrorCode::VoiceUnavailable
        } else {
            EngineErrorCode::SynthesisFailed
        });
    }
    if output.stdout.is_empty() {
        return Err(EngineErrorCode::SynthesisFailed);
    }

    debug!("Synthesized {} bytes for utterance {}", output.stdout.len(), utterance.id);
    Ok(output.stdout)
}

/// Pick the configured binary, or the first of espeak-ng / espeak on PATH.
fn detect_binary(configured: &str) -> Result<String> {
    let candidates: &[&str] = if configured.is_empty() {
        &["espeak-ng", "espeak"]
    } else {
        &[configured]
    };

    candidates
        .iter()
        .find(|b| which::which(b).is_ok())
        .map(|b| (*b).to_string())
        .ok_or_else(|| Error::EngineUnavailable {
            binary: candidates.join(" / "),
        })
}

/// Open the default output device on a dedicated thread.
///
/// The `OutputStream` stays on that thread for the process lifetime; the
/// engine only needs its mixer.
fn open_output() -> Result<Mixer> {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("reply-reader-audio".into())
        .spawn(move || match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => {
                let _ = tx.send(Ok(stream.mixer().clone()));
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
            }
        })
        .map_err(|e| Error::AudioOutput(e.to_string()))?;

    rx.recv()
        .map_err(|e| Error::AudioOutput(e.to_string()))?
        .map_err(Error::AudioOutput)
}

fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate).round().clamp(80.0, 450.0) as u32
}

fn espeak_pitch(pitch: f32) -> u32 {
    (BASE_PITCH * pitch).round().clamp(0.0, 99.0) as u32
}

/// Parse `espeak-ng --voices` output.
///
/// Columns are whitespace separated: Pty, Language, Age/Gender, VoiceName,
/// File, Other Languages. Voice names use underscores for spaces.
pub fn parse_voices(output: &str) -> Vec<Voice> {
    output.lines().filter_map(parse_voice_line).collect()
}

fn parse_voice_line(line: &str) -> Option<Voice> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    // Header line has "Pty" here
    parts[0].parse::<u32>().ok()?;

    let lang = parts[1];
    let name = parts[3].replace('_', " ");
    if lang.is_empty() || name.is_empty() {
        return None;
    }
    Some(Voice::new(name, lang))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES_SAMPLE: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  de              --/M      German             gmw/de
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  fr-fr           --/M      French_(France)    roa/fr               (fr 5)

garbage line
";

    #[test]
    fn parses_voice_listing() {
        let voices = parse_voices(VOICES_SAMPLE);
        assert_eq!(voices.len(), 5);
        assert_eq!(voices[0], Voice::new("Afrikaans", "af"));
        assert_eq!(voices[2], Voice::new("English (Great Britain)", "en-gb"));
        assert_eq!(voices[3].lang, "en-us");
    }

    #[test]
    fn skips_header_and_short_lines() {
        assert!(parse_voice_line("Pty Language Age/Gender VoiceName File").is_none());
        assert!(parse_voice_line("5 en --/M").is_none());
        assert!(parse_voice_line("").is_none());
    }

    #[test]
    fn rate_and_pitch_mapping() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.1), 80);
        assert_eq!(espeak_pitch(1.0), 50);
        assert_eq!(espeak_pitch(2.0), 99);
        assert_eq!(espeak_pitch(0.5), 25);
    }

    fn playback(id: UtteranceId) -> Playback {
        Playback::new(id, Arc::new(AtomicBool::new(false)))
    }

    fn held_sink() -> Arc<Sink> {
        let (sink, _output) = Sink::new();
        sink.pause();
        Arc::new(sink)
    }

    #[test]
    fn pause_during_synthesis_holds_audio_until_resume() {
        let mut p = playback(1);
        assert!(!p.set_paused(true));

        let sink = held_sink();
        assert!(!p.attach(sink.clone()));
        assert!(sink.is_paused());

        assert!(p.set_paused(false));
        assert!(!sink.is_paused());
        // Only the first resume starts the utterance
        assert!(!p.set_paused(true));
        assert!(!p.set_paused(false));
    }

    #[test]
    fn attach_without_pause_plays_immediately() {
        let mut p = playback(1);
        let sink = held_sink();
        assert!(p.attach(sink.clone()));
        assert!(!sink.is_paused());
    }

    #[test]
    fn pause_after_attach_pauses_sink() {
        let mut p = playback(1);
        let sink = held_sink();
        p.attach(sink.clone());
        p.set_paused(true);
        assert!(sink.is_paused());
        assert!(p.paused);
    }

    #[tokio::test]
    async fn stop_aborts_pending_synthesis() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut p = Playback::new(7, cancelled.clone());
        let task = tokio::spawn(std::future::pending::<()>());
        p.task = Some(task.abort_handle());

        p.stop();

        assert!(cancelled.load(Ordering::Relaxed));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn missing_binary_is_engine_unavailable() {
        let err = detect_binary("definitely-not-a-real-tts-binary").unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable { .. }));
    }
}
