//! # Song Draft Generator Tests
//!
//! Parsing tests cover fence stripping, the bounded repair pass, sectioned
//! lyrics flattening, and strict option-set validation. Wire tests run the
//! full generate call against a local mock of the generation service.
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test --test draft_test
//! ```

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use url::Url;

use hum_to_song::draft::{parse_draft_payload, strip_code_fence, DraftGenerator};
use hum_to_song::error::PipelineError;
use hum_to_song::types::{CapturedAudio, Genre, Vocals};

fn payload_with_vocals(vocals: &str) -> String {
    format!(
        r#"{{"title":"Neon Dreams","lyrics":"[Verse 1]\nCity lights are calling","musicDescription":{{"genre":"Pop","mood":"Happy","arrangement":"Full Band","vocals":"{}"}},"imagePrompt":"a neon city skyline at night"}}"#,
        vocals
    )
}

#[test]
fn parses_a_plain_payload() {
    let parsed = parse_draft_payload(&payload_with_vocals("Female")).unwrap();
    assert_eq!(parsed.title, "Neon Dreams");
    assert_eq!(parsed.style.genre, Genre::Pop);
    assert_eq!(parsed.style.vocals, Vocals::Female);
    assert!(parsed.lyrics.starts_with("[Verse 1]"));
    assert_eq!(parsed.image_prompt, "a neon city skyline at night");
}

#[test]
fn strips_code_fences_before_parsing() {
    let fenced = format!("```json\n{}\n```", payload_with_vocals("Male"));
    assert_eq!(strip_code_fence(&fenced), payload_with_vocals("Male"));

    let parsed = parse_draft_payload(&fenced).unwrap();
    assert_eq!(parsed.style.vocals, Vocals::Male);

    // Fence without a language tag
    let fenced = format!("```\n{}\n```", payload_with_vocals("Male"));
    assert!(parse_draft_payload(&fenced).is_ok());
}

#[test]
fn sectioned_lyrics_flatten_in_original_order() {
    let payload = r#"{"title":"T","lyrics":{"Verse 1":"first words","Chorus":"hook line","Verse 2":"second words"},"musicDescription":{"genre":"Rock","mood":"Epic","arrangement":"Full Band","vocals":"Male"},"imagePrompt":"art"}"#;
    let parsed = parse_draft_payload(payload).unwrap();
    assert_eq!(
        parsed.lyrics,
        "[Verse 1]\nfirst words\n\n[Chorus]\nhook line\n\n[Verse 2]\nsecond words"
    );
}

#[test]
fn raw_newlines_inside_strings_are_repaired() {
    // A payload where the model forgot to escape a newline inside the lyrics
    // string; the first parse fails, the repair pass recovers it
    let payload = "{\"title\":\"T\",\"lyrics\":\"line one\nline two\",\"musicDescription\":{\"genre\":\"Jazz\",\"mood\":\"Relaxing\",\"arrangement\":\"Acoustic\",\"vocals\":\"Female\"},\"imagePrompt\":\"art\"}";
    let parsed = parse_draft_payload(payload).unwrap();
    assert_eq!(parsed.lyrics, "line one\nline two");
}

#[test]
fn unknown_vocals_value_fails_instead_of_defaulting() {
    let err = parse_draft_payload(&payload_with_vocals("Unknown")).unwrap_err();
    match err {
        PipelineError::GenerationFailed(message) => {
            assert!(message.contains("vocals"), "unexpected message: {}", message);
            assert!(message.contains("Unknown"));
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
}

#[test]
fn out_of_set_genre_is_rejected() {
    let payload = r#"{"title":"T","lyrics":"words","musicDescription":{"genre":"Ambient","mood":"Happy","arrangement":"Acoustic","vocals":"Male"},"imagePrompt":"art"}"#;
    let err = parse_draft_payload(payload).unwrap_err();
    assert!(matches!(err, PipelineError::GenerationFailed(_)));
}

#[test]
fn missing_fields_are_rejected() {
    let payload = r#"{"lyrics":"words","musicDescription":{"genre":"Pop","mood":"Happy","arrangement":"Acoustic","vocals":"Male"},"imagePrompt":"art"}"#;
    assert!(parse_draft_payload(payload).is_err());
}

#[test]
fn unparseable_payload_error_quotes_the_prefix() {
    let garbage = "this is not json at all, not even close";
    let err = parse_draft_payload(garbage).unwrap_err();
    match err {
        PipelineError::GenerationFailed(message) => {
            assert!(message.contains("this is not json"), "message: {}", message)
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Wire tests against a mock generation service
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct MockGenService {
    text_payload: String,
    text_ok: bool,
    image_ok: bool,
}

async fn model_call_handler(
    State(service): State<MockGenService>,
    Path(call): Path<String>,
) -> axum::response::Response {
    if call.ends_with(":generateContent") {
        if !service.text_ok {
            return (StatusCode::INTERNAL_SERVER_ERROR, "generation exploded").into_response();
        }
        return Json(json!({
            "candidates": [
                {"content": {"parts": [{"text": service.text_payload}]}}
            ]
        }))
        .into_response();
    }
    if call.ends_with(":predict") {
        if !service.image_ok {
            return (StatusCode::INTERNAL_SERVER_ERROR, "image exploded").into_response();
        }
        return Json(json!({
            "predictions": [
                {"bytesBase64Encoded": "QUJDRA==", "mimeType": "image/jpeg"}
            ]
        }))
        .into_response();
    }
    (StatusCode::NOT_FOUND, "unknown model call").into_response()
}

async fn start_mock_service(service: MockGenService) -> Url {
    let app = Router::new()
        .route("/models/{call}", post(model_call_handler))
        .with_state(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

fn captured_fixture() -> CapturedAudio {
    CapturedAudio {
        bytes: b"RIFFfake-wav-bytes".to_vec().into(),
        mime_type: "audio/wav".to_string(),
        duration_seconds: 1.0,
    }
}

#[tokio::test]
async fn generate_returns_a_complete_draft() {
    let base = start_mock_service(MockGenService {
        text_payload: payload_with_vocals("Female"),
        text_ok: true,
        image_ok: true,
    })
    .await;

    let generator = DraftGenerator::new("test-key").unwrap().with_base_url(base);
    let draft = generator.generate(&captured_fixture()).await.unwrap();

    assert_eq!(draft.title, "Neon Dreams");
    assert_eq!(draft.style.vocals, Vocals::Female);
    assert_eq!(draft.album_art_url, "data:image/jpeg;base64,QUJDRA==");
}

#[tokio::test]
async fn failed_album_art_fails_the_whole_operation() {
    let base = start_mock_service(MockGenService {
        text_payload: payload_with_vocals("Female"),
        text_ok: true,
        image_ok: false,
    })
    .await;

    let generator = DraftGenerator::new("test-key").unwrap().with_base_url(base);
    let err = generator.generate(&captured_fixture()).await.unwrap_err();
    assert!(matches!(err, PipelineError::GenerationFailed(_)));
}

#[tokio::test]
async fn service_error_surfaces_as_generation_failure() {
    let base = start_mock_service(MockGenService {
        text_payload: String::new(),
        text_ok: false,
        image_ok: true,
    })
    .await;

    let generator = DraftGenerator::new("test-key").unwrap().with_base_url(base);
    let err = generator.generate(&captured_fixture()).await.unwrap_err();
    match err {
        PipelineError::GenerationFailed(message) => {
            assert!(message.contains("HTTP 500"), "message: {}", message)
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn out_of_set_style_from_the_wire_is_rejected() {
    let payload = r#"{"title":"T","lyrics":"words","musicDescription":{"genre":"Pop","mood":"Happy","arrangement":"Acoustic","vocals":"Robot"},"imagePrompt":"art"}"#;
    let base = start_mock_service(MockGenService {
        text_payload: payload.to_string(),
        text_ok: true,
        image_ok: true,
    })
    .await;

    let generator = DraftGenerator::new("test-key").unwrap().with_base_url(base);
    let err = generator.generate(&captured_fixture()).await.unwrap_err();
    assert!(matches!(err, PipelineError::GenerationFailed(_)));
}
