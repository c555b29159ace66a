//! SSE 事件流的端到端流程。
//!
//! 起一个真实的 TCP 监听，用流式 HTTP 客户端读取事件帧，
//! 验证编帧、扇出和断开清理。

use std::{sync::Arc, time::Duration};

use application::{spawn_heartbeat, BroadcastHub, LoginRateLimiter};
use domain::{RoomEvent, RoomId};
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;
use web_api::{router, AppState};

async fn spawn_app(hub: Arc<BroadcastHub>) -> String {
    let state = AppState::new(
        hub,
        Arc::new(LoginRateLimiter::with_policy(
            5,
            Duration::from_secs(60),
            false,
        )),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// 读取流式响应，直到累计内容包含 `needle` 或超时
async fn read_until(
    stream: &mut (impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin),
    needle: &str,
) -> String {
    let mut buffer = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while !buffer.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("timed out waiting for stream data")
            .expect("stream ended early")
            .expect("stream error");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
    }
    buffer
}

#[tokio::test]
async fn test_stream_delivers_published_event_frames() {
    let hub = Arc::new(BroadcastHub::with_settings(16, Duration::from_secs(25)));
    let base = spawn_app(hub.clone()).await;
    let room_id = Uuid::new_v4();

    let response = reqwest::get(format!("{base}/api/chatrooms/{room_id}/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    hub.publish(
        RoomId::new(room_id),
        RoomEvent::new_message(json!({"content": "hello"})),
    );

    let mut stream = Box::pin(response.bytes_stream());
    let buffer = read_until(&mut stream, "\n\n").await;

    // 一行事件类型、一行 JSON 数据、空行结尾
    assert!(buffer.contains("event: new-message\n"));
    assert!(buffer.contains(r#"data: {"content":"hello"}"#));
}

#[tokio::test]
async fn test_heartbeat_frames_keep_connection_alive() {
    let hub = Arc::new(BroadcastHub::with_settings(16, Duration::from_millis(50)));
    let base = spawn_app(hub.clone()).await;
    let room_id = Uuid::new_v4();

    let task = spawn_heartbeat(hub.clone());

    let response = reqwest::get(format!("{base}/api/chatrooms/{room_id}/stream"))
        .await
        .unwrap();
    let mut stream = Box::pin(response.bytes_stream());
    let buffer = read_until(&mut stream, "event: heartbeat").await;
    assert!(buffer.contains("event: heartbeat\n"));

    task.abort();
}

#[tokio::test]
async fn test_disconnect_unregisters_subscriber() {
    let hub = Arc::new(BroadcastHub::with_settings(16, Duration::from_secs(25)));
    let base = spawn_app(hub.clone()).await;
    let room_id = Uuid::new_v4();
    let room = RoomId::new(room_id);

    let response = reqwest::get(format!("{base}/api/chatrooms/{room_id}/stream"))
        .await
        .unwrap();
    assert_eq!(hub.subscriber_count(room), 1);

    // 客户端断开后，下一次发布之前注册表应已收敛
    drop(response);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        // 发布同时验证了向正在断开的通道投递不会抛错
        hub.publish(room, RoomEvent::heartbeat());
        if hub.subscriber_count(room) == 0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "subscriber was not cleaned up after disconnect"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(hub.publish(room, RoomEvent::heartbeat()), 0);
}
