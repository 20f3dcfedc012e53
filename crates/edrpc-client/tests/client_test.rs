//! Client integration tests against a stub framed server.
//!
//! The stub speaks raw frames, which lets these tests exercise behavior a
//! well-behaved host never shows: dropped connections mid-call, unsolicited
//! and duplicate responses, and responses that never come.

use std::time::Duration;

use edrpc_client::{BridgeClient, ClientConfig};
use edrpc_common::protocol::envelope::{ArgMap, Message, ResponseEnvelope};
use edrpc_common::transport::{framing, ConnectionState};
use edrpc_common::BridgeError;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};

async fn stub_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn read_request(stream: &mut TcpStream) -> (String, Value) {
    let frame = framing::read_frame(stream).await.unwrap().expect("request frame");
    match Message::decode(&frame).unwrap() {
        Message::Request(request) => (request.id, Value::Object(request.params)),
        other => panic!("expected request, got {:?}", other),
    }
}

async fn send_response(stream: &mut TcpStream, response: ResponseEnvelope) {
    framing::write_frame(stream, &response.encode().unwrap()).await.unwrap();
}

#[tokio::test]
async fn connect_is_idempotent() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn call_round_trip() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (id, _params) = read_request(&mut stream).await;
        send_response(&mut stream, ResponseEnvelope::success(id, json!({"pong": true}))).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let result = client.call("ping", ArgMap::new()).await.unwrap();
    assert_eq!(result, json!({"pong": true}));
    assert_eq!(client.outstanding_calls(), 0);
}

#[tokio::test]
async fn disconnect_abandons_all_outstanding_calls() {
    let (listener, addr) = stub_listener().await;
    let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        // Accept, read the requests, never answer, then drop the socket.
        let (mut stream, _) = listener.accept().await.unwrap();
        for _ in 0..3 {
            let _ = read_request(&mut stream).await;
        }
        let _ = hold_rx.await;
        drop(stream);
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call("hang", ArgMap::new()).await })
        })
        .collect();

    // Wait for all three to be registered, then cut the connection.
    for _ in 0..50 {
        if client.outstanding_calls() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.outstanding_calls(), 3);
    hold_tx.send(()).unwrap();

    for call in calls {
        match call.await.unwrap() {
            Err(BridgeError::Disconnected(_)) => {}
            other => panic!("expected disconnected, got {:?}", other),
        }
    }
    assert_eq!(client.outstanding_calls(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn stale_and_duplicate_responses_are_discarded() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        // Unsolicited response for an id that was never issued.
        send_response(&mut stream, ResponseEnvelope::success("999", json!("stale"))).await;

        // Then answer the real call twice with the same id.
        let (id, _params) = read_request(&mut stream).await;
        send_response(&mut stream, ResponseEnvelope::success(id.clone(), json!("first"))).await;
        send_response(&mut stream, ResponseEnvelope::success(id, json!("second"))).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let result = client.call("real", ArgMap::new()).await.unwrap();
    assert_eq!(result, json!("first"));

    // The duplicate settled nothing and the connection is still healthy.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.outstanding_calls(), 0);
}

#[tokio::test]
async fn timeout_rejects_only_that_call() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        // First call is never answered; second one is.
        let (_slow_id, _) = read_request(&mut stream).await;
        let (fast_id, _) = read_request(&mut stream).await;
        send_response(&mut stream, ResponseEnvelope::success(fast_id, json!("done"))).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_with_timeout("slow", ArgMap::new(), Duration::from_millis(50))
                .await
        })
    };
    // Make sure the slow call is sent before the fast one.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fast = client.call("fast", ArgMap::new()).await.unwrap();
    assert_eq!(fast, json!("done"));

    match slow.await.unwrap() {
        Err(BridgeError::Timeout(ms)) => assert_eq!(ms, 50),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(client.outstanding_calls(), 0);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn error_response_maps_back_onto_the_taxonomy() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (id, _params) = read_request(&mut stream).await;
        send_response(
            &mut stream,
            ResponseEnvelope::failure(Some(id), -32601, "Unknown method: ghost"),
        )
        .await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let mut arguments = ArgMap::new();
    arguments.insert("x".into(), json!(1));
    match client.invoke("ghost", arguments).await {
        Err(BridgeError::UnknownMethod(message)) => {
            assert_eq!(message, "Unknown method: ghost");
        }
        other => panic!("expected unknown method, got {:?}", other),
    }
}

#[tokio::test]
async fn explicit_disconnect_rejects_outstanding_calls() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();

    let hanging = {
        let client = client.clone();
        tokio::spawn(async move { client.call("hang", ArgMap::new()).await })
    };
    for _ in 0..50 {
        if client.outstanding_calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.disconnect();

    match hanging.await.unwrap() {
        Err(BridgeError::Disconnected(reason)) => assert_eq!(reason, "disconnected by caller"),
        other => panic!("expected disconnected, got {:?}", other),
    }

    // A fresh call fails fast instead of hanging.
    let err = client.call("ping", ArgMap::new()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Disconnected(_)));
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (listener, addr) = stub_listener().await;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                while let Ok(Some(frame)) = framing::read_frame(&mut stream).await {
                    if let Ok(Message::Request(request)) = Message::decode(&frame) {
                        send_response(
                            &mut stream,
                            ResponseEnvelope::success(request.id, json!("ok")),
                        )
                        .await;
                    }
                }
            });
        }
    });

    let client = BridgeClient::new(ClientConfig::new(&addr));
    client.connect().await.unwrap();
    assert_eq!(client.call("a", ArgMap::new()).await.unwrap(), json!("ok"));

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    assert_eq!(client.call("b", ArgMap::new()).await.unwrap(), json!("ok"));
}
