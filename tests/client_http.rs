use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, http::StatusCode, routing::post};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use dream_canvas::error::GenerationError;
use dream_canvas::events::GenerationRequest;
use dream_canvas::service::{
    EndpointKind, GenerationPayload, ImageService, ImageTuning, StableDiffusionClient,
};
use dream_canvas::tasks::generator::{Generator, RequestSink};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

type Captured = Arc<Mutex<Vec<Value>>>;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fake service answering both endpoints with `image` and recording bodies.
fn fake_service(image: &[u8]) -> (Router, Captured) {
    let captured = Captured::default();
    let encoded = STANDARD.encode(image);
    let handler = {
        let captured = captured.clone();
        move |Json(body): Json<Value>| {
            let captured = captured.clone();
            let encoded = encoded.clone();
            async move {
                captured.lock().unwrap().push(body);
                Json(json!({ "images": [encoded], "parameters": {}, "info": "" }))
            }
        }
    };
    let router = Router::new()
        .route("/sdapi/v1/txt2img", post(handler.clone()))
        .route("/sdapi/v1/img2img", post(handler));
    (router, captured)
}

fn payload(seed_image: Option<Vec<u8>>) -> GenerationPayload {
    GenerationPayload {
        prompt: "x".into(),
        seed: None,
        steps: 20,
        width: 512,
        height: 512,
        seed_image,
    }
}

#[tokio::test]
async fn text_request_posts_prompt_and_decodes_first_image() {
    let (router, captured) = fake_service(b"\x89PNG fake");
    let client = StableDiffusionClient::new(serve(router).await).unwrap();

    let result = client
        .send(EndpointKind::TextToImage, &payload(None))
        .await
        .expect("service call");
    assert_eq!(result.first_image().unwrap().bytes, b"\x89PNG fake");

    let bodies = captured.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["prompt"], "x");
    assert_eq!(bodies[0]["steps"], 20);
    assert_eq!(bodies[0]["width"], 512);
    assert_eq!(bodies[0]["height"], 512);
    assert!(bodies[0].get("init_images").is_none());
}

#[tokio::test]
async fn image_request_carries_seed_and_tuning() {
    let (router, captured) = fake_service(b"next");
    let tuning = ImageTuning {
        denoising_strength: 0.5,
        guidance_scale: 7.0,
    };
    let client = StableDiffusionClient::with_options(serve(router).await, tuning, None).unwrap();

    client
        .send(EndpointKind::ImageToImage, &payload(Some(b"seed".to_vec())))
        .await
        .unwrap();

    let bodies = captured.lock().unwrap();
    assert_eq!(bodies[0]["init_images"], json!([STANDARD.encode(b"seed")]));
    assert_eq!(bodies[0]["denoising_strength"], 0.5);
    assert_eq!(bodies[0]["cfg_scale"], 7.0);
    assert_eq!(bodies[0]["seed"], -1);
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let router = Router::new().route(
        "/sdapi/v1/txt2img",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") }),
    );
    let client = StableDiffusionClient::new(serve(router).await).unwrap();

    let err = client
        .send(EndpointKind::TextToImage, &payload(None))
        .await
        .unwrap_err();
    match err {
        GenerationError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "model loading");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let router = Router::new().route("/sdapi/v1/txt2img", post(|| async { "not json" }));
    let client = StableDiffusionClient::new(serve(router).await).unwrap();

    let err = client
        .send(EndpointKind::TextToImage, &payload(None))
        .await
        .unwrap_err();
    assert!(err.is_decode(), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StableDiffusionClient::with_options(
        format!("http://{addr}"),
        ImageTuning::default(),
        Some(Duration::from_secs(2)),
    )
    .unwrap();
    let err = client
        .send(EndpointKind::TextToImage, &payload(None))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generator_delivers_service_image_to_callback() {
    let (router, captured) = fake_service(b"hello");
    let client = StableDiffusionClient::new(serve(router).await).unwrap();
    let (generator, _worker) = Generator::spawn(client, CancellationToken::new());

    let (tx, rx) = tokio::sync::oneshot::channel();
    generator
        .submit(
            GenerationRequest::builder("x")
                .on_complete(move |image| {
                    let _ = tx.send(image.bytes);
                })
                .build(),
        )
        .unwrap();

    let bytes = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert_eq!(bytes, b"hello");
    assert_eq!(captured.lock().unwrap()[0]["prompt"], "x");
}
