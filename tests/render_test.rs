//! # Music Render Pipeline Tests
//!
//! Request-shaping tests cover the lyric truncation bounds and structure
//! scaffolding. Wire tests run submit/poll/fetch against a local mock of the
//! render provider; the timeout test runs on tokio's paused clock so the full
//! five-minute budget elapses without real waiting.
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test --test render_test
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use hum_to_song::error::PipelineError;
use hum_to_song::render::{
    ensure_structured, truncate_lyrics_for_prompt, RenderClient, RenderModel, RenderRequest,
    MAX_PROMPT_CHARS, MAX_PROMPT_PARAGRAPHS, TRUNCATION_MARKER,
};

// ---------------------------------------------------------------------------
// Request shaping
// ---------------------------------------------------------------------------

fn long_lyrics(paragraphs: usize, line: &str) -> String {
    vec![line.to_string(); paragraphs].join("\n\n")
}

#[test]
fn six_paragraphs_of_900_chars_are_bounded_with_a_marker() {
    // 6 paragraphs, ~150 chars each
    let line = "a".repeat(148);
    let lyrics = long_lyrics(6, &line);
    assert!(lyrics.len() > 880);

    let (shaped, cut) = truncate_lyrics_for_prompt(&lyrics);
    assert!(cut);
    assert!(shaped.split("\n\n").count() <= MAX_PROMPT_PARAGRAPHS);
    assert!(shaped.chars().count() <= MAX_PROMPT_CHARS);
    assert!(shaped.ends_with(TRUNCATION_MARKER));
}

#[test]
fn short_lyrics_pass_through_unchanged() {
    let lyrics = "just one verse\n\nand a chorus";
    let (shaped, cut) = truncate_lyrics_for_prompt(lyrics);
    assert!(!cut);
    assert_eq!(shaped, lyrics);
}

#[test]
fn a_single_oversized_paragraph_is_cut_at_the_char_bound() {
    let lyrics = "b".repeat(700);
    let (shaped, cut) = truncate_lyrics_for_prompt(&lyrics);
    assert!(cut);
    assert_eq!(shaped.chars().count(), MAX_PROMPT_CHARS);
    assert!(shaped.ends_with(TRUNCATION_MARKER));
}

#[test]
fn paragraph_only_cut_still_gets_a_marker() {
    let line = "c".repeat(30);
    let (shaped, cut) = truncate_lyrics_for_prompt(&long_lyrics(6, &line));
    assert!(cut);
    assert!(shaped.ends_with(TRUNCATION_MARKER));
    assert!(shaped.chars().count() <= MAX_PROMPT_CHARS);
}

#[test]
fn truncation_respects_multibyte_characters() {
    let lyrics: String = std::iter::repeat('\u{1F3B5}').take(700).collect();
    let (shaped, cut) = truncate_lyrics_for_prompt(&lyrics);
    assert!(cut);
    assert!(shaped.chars().count() <= MAX_PROMPT_CHARS);
}

#[test]
fn unstructured_lyrics_get_verse_and_chorus_scaffolding() {
    let shaped = ensure_structured("line one\nline two");
    assert_eq!(shaped, "[verse]\nline one\nline two\n\n[chorus]\nline one\nline two");
}

#[test]
fn sectioned_lyrics_are_left_alone() {
    let lyrics = "[Verse 1]\nline one\n\n[Chorus]\nline two";
    assert_eq!(ensure_structured(lyrics), lyrics);
}

// ---------------------------------------------------------------------------
// Wire tests against a mock render provider
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct MockProvider {
    base: String,
    /// Polls before the job turns terminal; None means never
    polls_until_terminal: Option<usize>,
    terminal_status: &'static str,
    poll_count: Arc<AtomicUsize>,
    /// Last submitted input body, for request-shaping assertions
    last_input: Arc<Mutex<Option<serde_json::Value>>>,
}

async fn create_handler(
    State(provider): State<MockProvider>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    *provider.last_input.lock().unwrap() = Some(body["input"].clone());
    Json(json!({
        "id": "job-1",
        "status": "starting",
        "urls": {"get": format!("{}/v1/predictions/job-1", provider.base)}
    }))
}

async fn poll_handler(State(provider): State<MockProvider>) -> Json<serde_json::Value> {
    let polls = provider.poll_count.fetch_add(1, Ordering::SeqCst) + 1;
    let terminal = provider
        .polls_until_terminal
        .map(|n| polls >= n)
        .unwrap_or(false);
    if !terminal {
        return Json(json!({
            "id": "job-1",
            "status": "processing",
            "urls": {"get": format!("{}/v1/predictions/job-1", provider.base)}
        }));
    }
    match provider.terminal_status {
        "succeeded" => Json(json!({
            "id": "job-1",
            "status": "succeeded",
            "urls": {"get": format!("{}/v1/predictions/job-1", provider.base)},
            "output": format!("{}/output/job-1.mp3", provider.base)
        })),
        status => Json(json!({
            "id": "job-1",
            "status": status,
            "urls": {"get": format!("{}/v1/predictions/job-1", provider.base)},
            "error": "synth core meltdown"
        })),
    }
}

fn rendered_bytes() -> Vec<u8> {
    (0..2048u32).map(|i| (i % 251) as u8).collect()
}

async fn output_handler() -> Vec<u8> {
    rendered_bytes()
}

async fn start_mock_provider(
    polls_until_terminal: Option<usize>,
    terminal_status: &'static str,
) -> (Url, MockProvider) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let provider = MockProvider {
        base: format!("http://{}", addr),
        polls_until_terminal,
        terminal_status,
        poll_count: Arc::new(AtomicUsize::new(0)),
        last_input: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/v1/predictions", post(create_handler))
        .route(
            "/v1/models/minimax/music-1.5/predictions",
            post(create_handler),
        )
        .route("/v1/predictions/job-1", get(poll_handler))
        .route("/output/job-1.mp3", get(output_handler))
        .with_state(provider.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (Url::parse(&format!("http://{}/", addr)).unwrap(), provider)
}

fn client_for(base: Url) -> RenderClient {
    RenderClient::new("test-token")
        .unwrap()
        .with_base_url(base)
        .with_timing(Duration::from_millis(10), Duration::from_secs(5))
}

fn request_for(model: RenderModel) -> RenderRequest {
    RenderRequest {
        lyrics: "[Verse 1]\nCity lights are calling\n\n[Chorus]\nSing it back".to_string(),
        tags: "pop, catchy, mainstream, upbeat, happy vocals".to_string(),
        duration_seconds: 60,
        model,
    }
}

#[tokio::test]
async fn successful_job_returns_the_output_bytes() {
    let (base, provider) = start_mock_provider(Some(3), "succeeded").await;
    let client = client_for(base);

    let rendered = client
        .render(&request_for(RenderModel::MinimaxMusic), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(rendered.bytes.as_ref(), rendered_bytes().as_slice());
    assert!(rendered.url.ends_with("/output/job-1.mp3"));
    assert!(provider.poll_count.load(Ordering::SeqCst) >= 3);

    // Profile B sends a prompt, not tags, and no duration
    let input = provider.last_input.lock().unwrap().clone().unwrap();
    assert!(input.get("prompt").is_some());
    assert!(input.get("tags").is_none());
    assert!(input.get("duration").is_none());
}

#[tokio::test]
async fn ace_step_submits_duration_and_tags() {
    let (base, provider) = start_mock_provider(Some(1), "succeeded").await;
    let client = client_for(base);

    client
        .render(&request_for(RenderModel::AceStep), &CancellationToken::new())
        .await
        .unwrap();

    let input = provider.last_input.lock().unwrap().clone().unwrap();
    assert_eq!(input["duration"], 60);
    assert!(input.get("tags").is_some());
    assert!(input.get("prompt").is_none());
    // Structured lyrics pass through without scaffolding
    assert!(input["lyrics"].as_str().unwrap().starts_with("[Verse 1]"));
}

#[tokio::test]
async fn long_lyrics_are_truncated_on_the_wire_for_minimax() {
    let (base, provider) = start_mock_provider(Some(1), "succeeded").await;
    let client = client_for(base);

    let mut request = request_for(RenderModel::MinimaxMusic);
    request.lyrics = long_lyrics(6, &"d".repeat(148));

    client.render(&request, &CancellationToken::new()).await.unwrap();

    let input = provider.last_input.lock().unwrap().clone().unwrap();
    let submitted = input["lyrics"].as_str().unwrap();
    assert!(submitted.chars().count() <= MAX_PROMPT_CHARS);
    assert!(submitted.ends_with(TRUNCATION_MARKER));
}

#[tokio::test]
async fn unsupported_duration_is_rejected_before_submission() {
    let (base, provider) = start_mock_provider(Some(1), "succeeded").await;
    let client = client_for(base);

    let mut request = request_for(RenderModel::AceStep);
    request.duration_seconds = 45;

    let err = client
        .render(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::RenderFailed(message) => assert!(message.contains("45")),
        other => panic!("expected RenderFailed, got {:?}", other),
    }
    assert!(provider.last_input.lock().unwrap().is_none());
}

#[tokio::test]
async fn failed_job_carries_the_provider_detail() {
    let (base, _provider) = start_mock_provider(Some(2), "failed").await;
    let client = client_for(base);

    let err = client
        .render(&request_for(RenderModel::MinimaxMusic), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::RenderFailed(message) => {
            assert!(message.contains("synth core meltdown"), "message: {}", message)
        }
        other => panic!("expected RenderFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn provider_side_cancellation_is_reported() {
    let (base, _provider) = start_mock_provider(Some(2), "canceled").await;
    let client = client_for(base);

    let err = client
        .render(&request_for(RenderModel::MinimaxMusic), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RenderCanceled));
}

#[tokio::test]
async fn local_cancellation_stops_polling() {
    let (base, provider) = start_mock_provider(None, "succeeded").await;
    let client = client_for(base);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client
        .render(&request_for(RenderModel::MinimaxMusic), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RenderCanceled));

    let polls_at_cancel = provider.poll_count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.poll_count.load(Ordering::SeqCst), polls_at_cancel);
}

#[tokio::test(start_paused = true)]
async fn a_job_that_never_terminates_times_out() {
    let (base, provider) = start_mock_provider(None, "succeeded").await;
    // Production timing: 2 s polls against a 5 minute budget. The paused
    // clock auto-advances through every sleep, so this finishes immediately.
    let client = RenderClient::new("test-token").unwrap().with_base_url(base);

    let err = client
        .render(&request_for(RenderModel::MinimaxMusic), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::RenderTimedOut { budget } => {
            assert_eq!(budget, Duration::from_secs(300))
        }
        other => panic!("expected RenderTimedOut, got {:?}", other),
    }
    // ~150 polls happened inside the budget
    let polls = provider.poll_count.load(Ordering::SeqCst);
    assert!(polls >= 140, "expected ~150 polls, saw {}", polls);
}
