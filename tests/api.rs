use std::net::SocketAddr;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use reply_reader::narrator::api::router;
use reply_reader::narrator::engine::Voice;
use reply_reader::narrator::sequencer::Status;
use reply_reader::narrator::settings::SettingsUpdate;
use reply_reader::service::{Command, NarrationHandle};

struct Bridge {
    addr: SocketAddr,
    commands: mpsc::Receiver<Command>,
    client: reqwest::Client,
    _status: watch::Sender<Status>,
    _voices: watch::Sender<Vec<Voice>>,
}

impl Bridge {
    async fn start() -> Self {
        let (cmd_tx, commands) = mpsc::channel(16);
        let (status_tx, status) = watch::channel(Status {
            voice: Some("English (America)".into()),
            ..Status::default()
        });
        let (voices_tx, voices) = watch::channel(vec![Voice::new("English (America)", "en-us")]);

        let app = router(NarrationHandle {
            commands: cmd_tx,
            status,
            voices,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            commands,
            client: reqwest::Client::new(),
            _status: status_tx,
            _voices: voices_tx,
        }
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Value {
        let mut request = self.client.post(format!("http://{}{path}", self.addr));
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.unwrap().json().await.unwrap()
    }

    async fn get(&self, path: &str) -> Value {
        self.client
            .get(format!("http://{}{path}", self.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn speak_is_forwarded_as_command() {
    let mut bridge = Bridge::start().await;

    let resp = bridge.post("/speak", Some(json!({ "text": "Hello there." }))).await;
    assert_eq!(resp["status"], "speaking");
    assert_eq!(
        bridge.commands.recv().await,
        Some(Command::Speak { text: "Hello there.".into() })
    );
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let mut bridge = Bridge::start().await;

    for path in ["/speak", "/force-speech", "/response"] {
        let resp = bridge.post(path, Some(json!({ "text": "  \n " }))).await;
        assert_eq!(resp["status"], "error", "{path}");
        assert_eq!(resp["error"], "empty text");
    }
    assert!(bridge.commands.try_recv().is_err());
}

#[tokio::test]
async fn control_routes_map_to_commands() {
    let mut bridge = Bridge::start().await;

    let cases = [
        ("/stop", Command::Stop),
        ("/pause", Command::Pause),
        ("/resume", Command::Resume),
        ("/read-last", Command::ReadLastResponse),
        ("/reload-voices", Command::ReloadVoices),
        ("/test-voice", Command::TestVoice),
        ("/enable", Command::SetEnabled(true)),
        ("/disable", Command::SetEnabled(false)),
    ];
    for (path, expected) in cases {
        let resp = bridge.post(path, None).await;
        assert_ne!(resp["status"], "error", "{path}");
        assert_eq!(bridge.commands.recv().await, Some(expected), "{path}");
    }
}

#[tokio::test]
async fn settings_accept_partial_camel_case_updates() {
    let mut bridge = Bridge::start().await;

    bridge
        .post("/settings", Some(json!({ "rate": 1.5, "filterCodeBlocks": false })))
        .await;
    assert_eq!(
        bridge.commands.recv().await,
        Some(Command::UpdateSettings(SettingsUpdate {
            rate: Some(1.5),
            filter_code_blocks: Some(false),
            ..SettingsUpdate::default()
        }))
    );

    let resp = bridge.post("/settings/save", Some(json!({ "voice": "German" }))).await;
    assert_eq!(resp["status"], "saved");
    assert!(matches!(
        bridge.commands.recv().await,
        Some(Command::SaveSettings(SettingsUpdate { voice: Some(v), .. })) if v == "German"
    ));
}

#[tokio::test]
async fn status_and_voices_reflect_service_state() {
    let bridge = Bridge::start().await;

    let status = bridge.get("/status").await;
    assert_eq!(status["state"], "idle");
    assert_eq!(status["enabled"], true);
    assert_eq!(status["settings"]["rate"], 1.0);

    let voices = bridge.get("/voices").await;
    assert_eq!(voices["selected"], "English (America)");
    assert_eq!(voices["voices"][0]["lang"], "en-us");
}

#[tokio::test]
async fn stopped_service_reports_error() {
    let mut bridge = Bridge::start().await;
    bridge.commands.close();

    let resp = bridge.post("/stop", None).await;
    assert_eq!(resp["status"], "error");
}
