use std::time::Duration;

use futures::{SinkExt, StreamExt};
use orrery_core::types::{ChatMessage, ChatRequest, NarrationRequest};
use orrery_session::{Error, Session, SessionConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn frame(event: &str, data: Value) -> Message {
    Message::Text(json!({ "event": event, "data": data }).to_string().into())
}

/// Minimal backend: greets, answers narration and rejects chat, echoing
/// the correlation id each time.
async fn spawn_backend() -> String {
    orrery_core::logging::init_subscriber("orrery_session=debug,orrery_fabric=debug");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.send(frame("connection_established", json!({ "message": "welcome" })))
                    .await
                    .unwrap();

                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else { continue };
                    let request: Value = serde_json::from_str(text.as_str()).unwrap();
                    let id = request["data"]["correlation_id"].clone();
                    let reply = match request["event"].as_str() {
                        Some("request_narration") => {
                            ws.send(frame("navigate_to", json!({ "target": "earth" })))
                                .await
                                .unwrap();
                            frame(
                                "narration_response",
                                json!({ "text": "Hello", "correlation_id": id }),
                            )
                        }
                        Some("chat_message") => frame(
                            "chat_error",
                            json!({ "message": "no universe loaded", "correlation_id": id }),
                        ),
                        _ => continue,
                    };
                    ws.send(reply).await.unwrap();
                }
            });
        }
    });

    endpoint
}

#[tokio::test]
async fn round_trips_over_a_real_websocket() {
    let endpoint = spawn_backend().await;
    let session = Session::new(SessionConfig::new(&endpoint)).unwrap();

    let (tx, mut navigations) = mpsc::unbounded_channel();
    session
        .on_navigate(move |action| {
            let _ = tx.send(action);
        })
        .unwrap();
    assert!(!session.is_connected());

    let narration = session
        .request_narration(&NarrationRequest::new().with("object_id", "earth"))
        .await
        .unwrap();
    assert_eq!(Value::from(narration), json!({ "text": "Hello" }));
    assert!(session.is_connected());

    let action = tokio::time::timeout(Duration::from_secs(5), navigations.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.get("target"), Some(&json!("earth")));

    let err = session
        .send_chat_message(&ChatRequest::new(ChatMessage::new().with("message", "hi")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server { .. }));
    assert_eq!(err.to_string(), "no universe loaded");

    session.teardown();
    assert!(!session.is_connected());
    assert!(!session.is_initialized());
}

#[tokio::test]
async fn reconnects_after_teardown() {
    let endpoint = spawn_backend().await;
    let session = Session::create(endpoint).unwrap();

    session.ensure_ready().await.unwrap();
    assert!(session.is_connected());
    session.teardown();

    let narration = session
        .request_narration(&NarrationRequest::new())
        .await
        .unwrap();
    assert_eq!(narration.get("text"), Some(&json!("Hello")));
    assert!(session.is_connected());
}
