//! Integration tests for the HTTP task bridge client and the worker loop.
//!
//! A fake task bridge is served with actix-web on a random local port.

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use taskworker_transcribe::models::ProgressUpdate;
use taskworker_transcribe::{
    BridgeError, HttpTaskBridge, Segment, TakeRequest, TaskBridge, TranscribeError, Transcriber,
    Transcription, TranscriptionInfo, Worker, WorkerConfig,
};

#[derive(Default)]
struct FakeBridge {
    tasks: Mutex<VecDeque<String>>,
    files: HashMap<String, Vec<u8>>,
    takes: Mutex<Vec<TakeRequest>>,
    progress: Mutex<Vec<(String, String)>>,
    completed: Mutex<Vec<(String, Value)>>,
}

async fn take(state: web::Data<FakeBridge>, body: web::Json<TakeRequest>) -> HttpResponse {
    state.takes.lock().unwrap().push(body.into_inner());
    let next = state.tasks.lock().unwrap().pop_front();
    match next {
        Some(id) => HttpResponse::Ok().json(json!({
            "id": id,
            "type": "transcribe",
            "status": "inprogress"
        })),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn file(state: web::Data<FakeBridge>, id: web::Path<String>) -> HttpResponse {
    match state.files.get(id.as_str()) {
        Some(bytes) => HttpResponse::Ok()
            .content_type("application/octet-stream")
            .body(bytes.clone()),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn progress(
    state: web::Data<FakeBridge>,
    id: web::Path<String>,
    body: web::Json<ProgressUpdate>,
) -> HttpResponse {
    state
        .progress
        .lock()
        .unwrap()
        .push((id.into_inner(), body.into_inner().progress));
    HttpResponse::Ok().finish()
}

async fn complete(
    state: web::Data<FakeBridge>,
    id: web::Path<String>,
    body: web::Json<Value>,
) -> HttpResponse {
    state
        .completed
        .lock()
        .unwrap()
        .push((id.into_inner(), body.into_inner()));
    HttpResponse::Ok().finish()
}

/// Start the fake bridge, returning its API root
async fn serve(state: web::Data<FakeBridge>) -> (Url, ServerHandle) {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/api/v2/tasks/take/", web::post().to(take))
            .route("/api/v2/tasks/file/{id}", web::get().to(file))
            .route("/api/v2/tasks/progress/{id}/", web::post().to(progress))
            .route("/api/v2/tasks/complete/{id}/", web::post().to(complete))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("Failed to bind fake task bridge");

    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    let api_url = WorkerConfig::api_url_from(&format!("http://{}", addr)).unwrap();
    (api_url, handle)
}

fn state(task_ids: &[&str], files: &[(&str, &[u8])]) -> web::Data<FakeBridge> {
    web::Data::new(FakeBridge {
        tasks: Mutex::new(task_ids.iter().map(|id| id.to_string()).collect()),
        files: files
            .iter()
            .map(|(id, bytes)| (id.to_string(), bytes.to_vec()))
            .collect(),
        ..FakeBridge::default()
    })
}

struct ScriptedTranscriber;

impl Transcriber for ScriptedTranscriber {
    fn library(&self) -> &str {
        "scripted"
    }

    fn transcribe(&self, audio_file: &Path) -> Result<Transcription, TranscribeError> {
        // The worker must hand over the downloaded file
        let audio = std::fs::read(audio_file)?;
        assert_eq!(audio, b"five seconds of audio");

        Ok(Transcription {
            info: TranscriptionInfo {
                language: "en".to_string(),
                duration: 5.0,
            },
            segments: Box::new(
                vec![
                    Ok(Segment::new(0.0, 2.0, " hello")),
                    Ok(Segment::new(2.0, 5.0, " world ")),
                ]
                .into_iter(),
            ),
        })
    }
}

fn worker_config(api_url: Url, temp_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        api_url,
        worker: "integration-worker".to_string(),
        model: "tiny".to_string(),
        device: "cpu".to_string(),
        command_path: PathBuf::from("unused"),
        models_dir: PathBuf::from("unused"),
        temp_dir: temp_dir.to_path_buf(),
        library: "faster-whisper".to_string(),
        poll_interval: Duration::from_secs(3),
    }
}

#[actix_web::test]
async fn test_take_returns_task_or_none() {
    let state = state(&["abc"], &[]);
    let (api_url, server) = serve(state.clone()).await;
    let bridge = HttpTaskBridge::new(api_url);
    let request = TakeRequest {
        task_type: "transcribe".to_string(),
        worker: "integration-worker".to_string(),
    };

    let task = bridge.take(&request).await.unwrap().expect("task expected");
    assert_eq!(task.id, "abc");
    assert_eq!(task.extra.get("status"), Some(&json!("inprogress")));

    // Queue is empty now, the bridge answers 404
    assert!(bridge.take(&request).await.unwrap().is_none());
    assert_eq!(*state.takes.lock().unwrap(), vec![request.clone(), request]);

    server.stop(true).await;
}

#[actix_web::test]
async fn test_fetch_file_writes_download() {
    let state = state(&[], &[("abc", &b"RIFF audio bytes"[..])]);
    let (api_url, server) = serve(state).await;
    let bridge = HttpTaskBridge::new(api_url);
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("abc");

    let written = bridge.fetch_file("abc", &destination).await.unwrap();
    assert_eq!(written, 16);
    assert_eq!(std::fs::read(&destination).unwrap(), b"RIFF audio bytes");

    let missing = bridge.fetch_file("nope", &dir.path().join("nope")).await;
    assert!(matches!(
        missing,
        Err(BridgeError::UnexpectedStatus { status: StatusCode::NOT_FOUND, .. })
    ));

    server.stop(true).await;
}

#[actix_web::test]
async fn test_progress_payload() {
    let state = state(&[], &[]);
    let (api_url, server) = serve(state.clone()).await;
    let bridge = HttpTaskBridge::new(api_url);

    bridge.report_progress("abc", 40).await.unwrap();
    assert_eq!(
        *state.progress.lock().unwrap(),
        vec![("abc".to_string(), "40".to_string())]
    );

    server.stop(true).await;
}

#[actix_web::test]
async fn test_unreachable_bridge() {
    // Nothing listens on the discard port
    let bridge = HttpTaskBridge::new(Url::parse("http://127.0.0.1:9/api/v2/").unwrap());
    let request = TakeRequest {
        task_type: "transcribe".to_string(),
        worker: "integration-worker".to_string(),
    };

    assert!(matches!(
        bridge.take(&request).await,
        Err(BridgeError::Http(_))
    ));
}

#[actix_web::test]
async fn test_worker_processes_task_end_to_end() {
    let state = state(&["abc"], &[("abc", &b"five seconds of audio"[..])]);
    let (api_url, server) = serve(state.clone()).await;
    let dir = TempDir::new().unwrap();
    let worker = Worker::new(
        worker_config(api_url.clone(), dir.path()),
        Arc::new(HttpTaskBridge::new(api_url)),
        Arc::new(ScriptedTranscriber),
    );

    assert!(worker.check_and_process().await.unwrap());
    assert!(!worker.check_and_process().await.unwrap());

    assert_eq!(
        *state.progress.lock().unwrap(),
        vec![
            ("abc".to_string(), "40".to_string()),
            ("abc".to_string(), "100".to_string()),
        ]
    );

    let completed = state.completed.lock().unwrap().clone();
    assert_eq!(completed.len(), 1);
    let (id, body) = &completed[0];
    assert_eq!(id, "abc");
    let result = &body["result"];
    assert_eq!(result["language"], json!("en"));
    assert_eq!(
        result["texts"],
        json!([
            {"start": 0.0, "end": 2.0, "text": "hello"},
            {"start": 2.0, "end": 5.0, "text": "world"}
        ])
    );
    assert!(result.get("error").is_none());
    assert_eq!(result["worker"], json!("integration-worker"));
    assert_eq!(result["library"], json!("scripted"));
    assert_eq!(result["device"], json!("cpu"));
    assert_eq!(result["model"], json!("tiny"));

    assert!(!dir.path().join("abc").exists());

    server.stop(true).await;
}

#[actix_web::test]
async fn test_worker_reports_missing_file() {
    let state = state(&["abc"], &[]);
    let (api_url, server) = serve(state.clone()).await;
    let dir = TempDir::new().unwrap();
    let worker = Worker::new(
        worker_config(api_url.clone(), dir.path()),
        Arc::new(HttpTaskBridge::new(api_url)),
        Arc::new(ScriptedTranscriber),
    );

    assert!(worker.check_and_process().await.unwrap());

    assert!(state.progress.lock().unwrap().is_empty());
    let completed = state.completed.lock().unwrap().clone();
    assert_eq!(completed.len(), 1);
    let result = &completed[0].1["result"];
    assert!(result["error"].as_str().unwrap().contains("404"));
    assert!(result.get("texts").is_none());
    assert!(result.get("language").is_none());
    assert!(!dir.path().join("abc").exists());

    server.stop(true).await;
}
