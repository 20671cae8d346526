//! `WsUserServiceClient` against a stub user service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use hall::UserService;
use hall_protocol::{Codec, JsonCodec, Message};
use hall_server::WsUserServiceClient;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Accepts one connection and answers every request with a stale frame
/// followed by the real reply.
async fn start_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if !msg.is_binary() {
                continue;
            }
            let request: Message = JsonCodec.decode(&msg.into_data()).unwrap();

            let stale = Message::new("User", &request.route, b"old".to_vec(), "stale000");
            let reply = Message::new(
                "User",
                &request.route,
                format!("echo:{}", request.route).into_bytes(),
                &request.reply,
            );
            for frame in [stale, reply] {
                let bytes = JsonCodec.encode(&frame).unwrap();
                ws.send(WsMessage::Binary(bytes.into())).await.unwrap();
            }
        }
    });

    format!("ws://{addr}")
}

/// Accepts any number of connections and answers each request on its own
/// task: `slow` after one second, `hangup` by closing the connection,
/// anything else right away.
async fn start_multiplexing_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();
                let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
                let writer = tokio::spawn(async move {
                    while let Some(bytes) = rx.recv().await {
                        if sink.send(WsMessage::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                });

                while let Some(Ok(msg)) = stream.next().await {
                    if !msg.is_binary() {
                        continue;
                    }
                    let request: Message = JsonCodec.decode(&msg.into_data()).unwrap();
                    if request.route == "hangup" {
                        break;
                    }
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if request.route == "slow" {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        let reply = Message::new("User", &request.route, Vec::new(), &request.reply);
                        let _ = tx.send(JsonCodec.encode(&reply).unwrap()).await;
                    });
                }
                writer.abort();
            });
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn test_request_sync_matches_reply_by_correlation_id() {
    let url = start_stub().await;
    let client = WsUserServiceClient::new(url, Duration::from_secs(2));

    let reply = client
        .request_sync(Message::new("User", "login", Vec::new(), "abcd1234"))
        .await
        .unwrap();

    assert_eq!(reply.reply, "abcd1234");
    assert_eq!(reply.data, b"echo:login");
}

#[tokio::test]
async fn test_request_sync_reuses_connection() {
    let url = start_stub().await;
    let client = WsUserServiceClient::new(url, Duration::from_secs(2));

    for id in ["id000001", "id000002"] {
        let reply = client
            .request_sync(Message::new("User", "getUserInfo", Vec::new(), id))
            .await
            .unwrap();
        assert_eq!(reply.reply, id);
    }
}

#[tokio::test]
async fn test_request_sync_unreachable_returns_upstream_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = WsUserServiceClient::new(format!("ws://{addr}"), Duration::from_secs(2));
    let err = client
        .request_sync(Message::new("User", "login", Vec::new(), "x"))
        .await
        .unwrap_err();

    assert_eq!(err.service, "user service");
    assert!(err.reason.starts_with("connect"));
}

#[tokio::test]
async fn test_request_sync_concurrent_calls_do_not_wait_for_each_other() {
    let url = start_multiplexing_stub().await;
    let client = Arc::new(WsUserServiceClient::new(url, Duration::from_secs(5)));

    let slow = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .request_sync(Message::new("User", "slow", Vec::new(), "slow0001"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let reply = client
        .request_sync(Message::new("User", "login", Vec::new(), "fast0001"))
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(reply.reply, "fast0001");
    assert!(waited < Duration::from_millis(500), "login waited {waited:?}");
    assert_eq!(slow.await.unwrap().unwrap().reply, "slow0001");
}

#[tokio::test]
async fn test_request_sync_lost_connection_fails_call_and_next_call_reconnects() {
    let url = start_multiplexing_stub().await;
    let client = WsUserServiceClient::new(url, Duration::from_secs(2));

    let err = client
        .request_sync(Message::new("User", "hangup", Vec::new(), "gone0001"))
        .await
        .unwrap_err();
    assert_eq!(err.reason, "connection closed");

    let reply = client
        .request_sync(Message::new("User", "login", Vec::new(), "back0001"))
        .await
        .unwrap();
    assert_eq!(reply.reply, "back0001");
}

#[tokio::test]
async fn test_request_sync_without_reply_times_out() {
    let url = start_multiplexing_stub().await;
    let client = WsUserServiceClient::new(url, Duration::from_millis(200));

    let err = client
        .request_sync(Message::new("User", "slow", Vec::new(), "late0001"))
        .await
        .unwrap_err();

    assert_eq!(err.reason, "timed out");
}
