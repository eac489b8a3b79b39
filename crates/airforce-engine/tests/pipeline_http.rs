use std::io::Cursor;

use airforce_contracts::config::Config;
use airforce_contracts::profiles::{pack, ModelFamily, ParameterProfile, ProfileFields};
use airforce_engine::{
    ContentFetcher, ContentKind, FetchOutcome, GenerationPipeline, GenerationStage,
};
use image::{ImageFormat, Rgb, RgbImage};
use mockito::Matcher;
use serde_json::{json, Map, Value};

const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom\x00\x00\x00\x08free";

fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let image = RgbImage::from_pixel(width, height, Rgb([12, 200, 34]));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn sse_body(url: &str) -> String {
    format!("data: {}\ndata: [DONE]\n", json!({"data": [{"url": url}]}))
}

#[test]
fn fetched_png_becomes_an_image_visual() -> anyhow::Result<()> {
    let mut server = mockito::Server::new();
    let content_url = format!("{}/files/out.png", server.url());
    let _generation = server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_body(sse_body(&content_url))
        .create();
    let _file = server
        .mock("GET", "/files/out.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png_bytes(6, 4)?)
        .create();

    let config = Config::new(server.url(), "sk", "", "");
    let profile = pack(ModelFamily::Imagen, &ProfileFields::default());
    let outcome = GenerationPipeline::new().generate(&config, &profile, "meadow");

    assert_eq!(outcome.stage(), GenerationStage::Image);
    assert_eq!(outcome.visual.dimensions(), (6, 4));
    assert_eq!(outcome.visual.get_pixel(0, 0), &Rgb([12, 200, 34]));
    assert!(outcome.execution.debug_response.ends_with("\n\nGenerated 1 image"));
    Ok(())
}

#[test]
fn undecodable_bytes_are_kept_untouched_as_video() {
    let mut server = mockito::Server::new();
    let content_url = format!("{}/files/clip", server.url());
    let _generation = server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_body(sse_body(&content_url))
        .create();
    let _file = server
        .mock("GET", "/files/clip")
        .with_status(200)
        .with_body(MP4_HEADER)
        .create();

    let config = Config::new(server.url(), "sk", "", "");
    let profile = pack(ModelFamily::Wan, &ProfileFields::default());
    let outcome = GenerationPipeline::new().generate(&config, &profile, "surf");

    assert_eq!(outcome.stage(), GenerationStage::Video);
    match &outcome.content {
        Some(FetchOutcome::Classified(content)) => {
            assert_eq!(content.kind, ContentKind::Video);
            assert_eq!(content.bytes, MP4_HEADER);
            assert_eq!(content.url, content_url);
        }
        other => panic!("unexpected content: {other:?}"),
    }
    assert_eq!(outcome.visual.dimensions(), (1024, 1024));
    assert!(outcome.execution.debug_response.ends_with("\n\nGenerated 1 video"));
}

#[test]
fn fetch_failure_yields_placeholder_from_profile_size() {
    let mut server = mockito::Server::new();
    let content_url = format!("{}/files/gone.png", server.url());
    let _generation = server
        .mock("POST", "/images/generations")
        .with_status(200)
        .with_body(sse_body(&content_url))
        .create();
    let _file = server.mock("GET", "/files/gone.png").with_status(404).create();

    let mut payload = Map::new();
    payload.insert("model".to_string(), Value::String("imagen-4".to_string()));
    payload.insert("size".to_string(), Value::String("640x360".to_string()));
    let profile = ParameterProfile::from_payload(payload);

    let config = Config::new(server.url(), "sk", "", "");
    let outcome = GenerationPipeline::new().generate(&config, &profile, "city");

    assert_eq!(outcome.stage(), GenerationStage::FetchFailed);
    assert_eq!(outcome.visual.dimensions(), (640, 360));
    assert!(outcome.visual.pixels().all(|pixel| pixel == &Rgb([0, 0, 0])));
    assert_eq!(
        outcome.execution.content_url.as_deref(),
        Some(content_url.as_str())
    );
    assert!(outcome.execution.debug_response.contains("\n\nDownload failed: "));
    assert!(outcome.execution.debug_response.contains("404"));
}

#[test]
fn rejected_generation_never_fetches() {
    let mut server = mockito::Server::new();
    let _generation = server
        .mock("POST", "/images/generations")
        .with_status(401)
        .with_body(r#"{"error":"unauthorized"}"#)
        .create();
    let file = server.mock("GET", Matcher::Any).expect(0).create();

    let config = Config::new(server.url(), "sk", "", "");
    let profile = pack(ModelFamily::Seedream, &ProfileFields::default());
    let outcome = GenerationPipeline::new().generate(&config, &profile, "x");

    file.assert();
    assert_eq!(outcome.stage(), GenerationStage::Rejected(401));
    assert!(outcome.content.is_none());
    assert_eq!(outcome.visual.dimensions(), (1024, 1024));
}

#[test]
fn empty_body_is_a_fetch_failure() {
    let mut server = mockito::Server::new();
    let _file = server.mock("GET", "/empty").with_status(200).create();

    let outcome = ContentFetcher::new().fetch(&format!("{}/empty", server.url()), (32, 16));
    assert_eq!(outcome.kind(), None);
    assert!(outcome.error().is_some_and(|error| error.contains("empty body")));
    assert_eq!(outcome.visual().dimensions(), (32, 16));
}

#[test]
fn complete_fetches_without_a_generation_request() -> anyhow::Result<()> {
    let mut server = mockito::Server::new();
    let generation = server
        .mock("POST", "/images/generations")
        .expect(0)
        .create();
    let _file = server
        .mock("GET", "/files/memo.png")
        .with_status(200)
        .with_body(png_bytes(2, 2)?)
        .create();

    let execution = airforce_engine::ExecutionResult {
        content_url: Some(format!("{}/files/memo.png", server.url())),
        debug_request: "{}".to_string(),
        debug_response: "[]".to_string(),
        error: None,
        status: Some(200),
        events: Vec::new(),
    };
    let profile = pack(ModelFamily::Nano, &ProfileFields::default());
    let outcome = GenerationPipeline::new().complete(execution, &profile);

    generation.assert();
    assert_eq!(outcome.stage(), GenerationStage::Image);
    assert_eq!(outcome.execution.debug_response, "[]\n\nGenerated 1 image");
    Ok(())
}
