use base64::Engine as _;
use chrono::NaiveDate;
use genai_image_runner::{
    ai::{GeminiAuth, GeminiImageClient, MockGenerationClient, OpenRouterClient},
    app::App,
    artifact::{ArtifactWriter, CollisionPolicy, FixedClock},
    models::{Envelope, GenerationRequest, IterationOutcome, ResponseShape, Segment},
    normalize::normalize,
    Error,
};
use image::{ImageFormat, Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_base64(color: [u8; 4]) -> String {
    let image = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(color)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn fixed_writer(dir: &tempfile::TempDir, collision: CollisionPolicy) -> ArtifactWriter {
    let now = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();
    ArtifactWriter::new(dir.path())
        .with_collision_policy(collision)
        .with_clock(Arc::new(FixedClock(now)))
}

#[test]
fn test_documented_envelope_scenarios() {
    let chat = Envelope::new(
        ResponseShape::ChatCompletion,
        json!({"choices":[{"message":{"content":"hello","images":[{"type":"image_url","image_url":{"url":"data:image/png;base64,QUJD"}}]}}]}),
    );
    assert_eq!(
        normalize(&chat).unwrap(),
        vec![
            Segment::Text("hello".to_string()),
            Segment::Image("QUJD".to_string())
        ]
    );

    let missing = Envelope::new(ResponseShape::ChatCompletion, json!({ "id": "gen-1" }));
    assert_eq!(normalize(&missing).unwrap(), Vec::<Segment>::new());

    let parts = Envelope::new(
        ResponseShape::GenerateContent,
        json!({"candidates":[{"content":{"parts":[{"text":"hi"},{"inline_data":{"data":"QUJD"}}]}}]}),
    );
    assert_eq!(
        normalize(&parts).unwrap(),
        vec![
            Segment::Text("hi".to_string()),
            Segment::Image("QUJD".to_string())
        ]
    );

    let empty_parts = Envelope::new(
        ResponseShape::GenerateContent,
        json!({"candidates":[{"content":{"parts":[]}}]}),
    );
    assert!(matches!(normalize(&empty_parts), Err(Error::Shape(_))));
}

#[tokio::test]
async fn test_openrouter_end_to_end_writes_images() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Two variations",
                    "images": [
                        { "type": "image_url", "image_url": { "url": format!("data:image/png;base64,{}", png_base64([255, 0, 0, 255])) } },
                        { "type": "image_url", "image_url": { "url": format!("data:image/png;base64,{}", png_base64([0, 255, 0, 255])) } }
                    ]
                }
            }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = OpenRouterClient::new("key".to_string(), "google/gemini-2.5-flash-image-preview".to_string())
        .with_base_url(server.uri());
    let app = App::with_services(
        Box::new(client),
        fixed_writer(&dir, CollisionPolicy::Sequence),
        GenerationRequest::new("sys", "a black desk"),
    );

    let mut out = Vec::<u8>::new();
    let summary = app.run(2, &mut out).await;

    assert_eq!(summary.completed(), 2);
    assert_eq!(summary.images_saved(), 4);

    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("new_generation"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "generate_2024-02-29_23-59-59.png",
            "generate_2024-02-29_23-59-59_1.png",
            "generate_2024-02-29_23-59-59_2.png",
            "generate_2024-02-29_23-59-59_3.png",
        ]
    );

    let printed = String::from_utf8(out).unwrap();
    assert_eq!(printed.matches("Output text: Two variations").count(), 2);
}

#[tokio::test]
async fn test_same_second_images_overwrite_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockGenerationClient::new(ResponseShape::MessageContent)
        .with_response(json!([
            { "image_url": { "url": format!("data:image/png;base64,{}", png_base64([1, 1, 1, 255])) } },
            { "image_url": { "url": format!("data:image/png;base64,{}", png_base64([9, 9, 9, 255])) } }
        ]));

    let app = App::with_services(
        Box::new(client),
        fixed_writer(&dir, CollisionPolicy::Overwrite),
        GenerationRequest::new("sys", "two images"),
    );

    let summary = app.run(1, &mut Vec::<u8>::new()).await;

    let IterationOutcome::Completed { report, .. } = &summary.outcomes[0] else {
        panic!("expected a completed iteration");
    };
    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.saved[0], report.saved[1]);

    let files = std::fs::read_dir(dir.path().join("new_generation"))
        .unwrap()
        .count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn test_transport_errors_do_not_stop_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/[^/]+:generateContent$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = GeminiImageClient::new(
        GeminiAuth::ApiKey("key".to_string()),
        "gemini-2.5-flash-image-preview".to_string(),
    )
    .with_base_url(server.uri());
    let app = App::with_services(
        Box::new(client),
        fixed_writer(&dir, CollisionPolicy::Overwrite),
        GenerationRequest::new("sys", "a desk"),
    );

    let summary = app.run(3, &mut Vec::<u8>::new()).await;

    assert_eq!(summary.failed(), 3);
    assert!(summary.outcomes.iter().all(|o| matches!(
        o,
        IterationOutcome::Failed { error, .. } if error.contains("503")
    )));
    assert!(!dir.path().join("new_generation").exists());
}
