//! HTTP surface: SMS webhook, health and queue endpoints

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use fleetspot_ingest::{build_router, AppState};
use helpers::Harness;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

fn app(h: &Harness) -> axum::Router {
    build_router(AppState::new(
        h.pool.clone(),
        h.engine.clone(),
        h.publisher.clone(),
    ))
}

fn sms(form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/sms")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_sms_reply_is_twiml() {
    let h = Harness::new().await;

    let response = app(&h)
        .oneshot(sms("From=%2B15550001111&Body=help&NumMedia=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/xml"
    );
    let body = body_text(response).await;
    assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>Send a photo"));
    assert!(body.ends_with("</Message>\n</Response>"));
}

#[tokio::test]
async fn test_sms_with_media_escapes_reply() {
    let h = Harness::new().await;
    h.add_photo("https://media/1", b"photo-one", None);

    let response = app(&h)
        .oneshot(sms(
            "From=%2B15550001111&Body=&NumMedia=1&MediaUrl0=https%3A%2F%2Fmedia%2F1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("What&apos;s the plate number?"));
}

#[tokio::test]
async fn test_turn_failure_still_replies() {
    let h = Harness::new().await;

    let response = app(&h)
        .oneshot(sms(
            "From=%2B15550001111&NumMedia=1&MediaUrl0=https%3A%2F%2Fmedia%2Fgone",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("something went wrong"));
}

#[tokio::test]
async fn test_sms_without_sender_is_rejected() {
    let h = Harness::new().await;

    let response = app(&h).oneshot(sms("Body=hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;

    let response = app(&h)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "fleetspot-ingest");
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_queue_stats() {
    let h = Harness::new().await;

    let response = app(&h)
        .oneshot(Request::get("/api/queue").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["count"], 0);
    assert_eq!(json["should_post"], false);
    assert!(json["oldest_age_hours"].is_null());
}
