// ABOUTME: End-to-end scenarios exercising two or more peers over real loopback
// ABOUTME: TCP sockets, covering the request/response, round-robin, and error-handling behaviors

use dpx::config::DpxConfig;
use dpx::error::ErrorCode;
use dpx::frame::Frame;
use dpx::peer::Peer;
use std::time::Duration;

fn test_config() -> DpxConfig {
    DpxConfig::default().with_retry(3, Duration::from_millis(20))
}

#[tokio::test]
async fn s1_request_response() {
    let server = Peer::with_config(test_config());
    let addr = server.bind("127.0.0.1", 0).await.unwrap();

    let client = Peer::with_config(test_config());
    client.connect("127.0.0.1", addr.port()).await;

    let client_channel = client.open("foobar").await.unwrap();
    client_channel
        .send_frame(Frame::data().with_payload(vec![49, 50, 51]).with_last(true))
        .await
        .unwrap();

    let server_channel = server.accept().await.unwrap();
    let request = server_channel.receive_frame().await.unwrap();
    assert_eq!(request.payload, vec![49, 50, 51]);

    server_channel
        .send_frame(Frame::data().with_payload(vec![51, 50, 49]).with_last(true))
        .await
        .unwrap();

    let response = client_channel.receive_frame().await.unwrap();
    assert_eq!(response.payload, vec![51, 50, 49]);
}

#[tokio::test]
async fn s2_method_preserved() {
    let server = Peer::with_config(test_config());
    let addr = server.bind("127.0.0.1", 0).await.unwrap();

    let client = Peer::with_config(test_config());
    client.connect("127.0.0.1", addr.port()).await;

    let client_channel = client.open("foobar").await.unwrap();
    client_channel
        .send_frame(Frame::data().with_payload(vec![1]).with_last(true))
        .await
        .unwrap();

    let server_channel = server.accept().await.unwrap();
    server_channel.receive_frame().await.unwrap();

    assert_eq!(client_channel.method().await, Some("foobar".to_string()));
    assert_eq!(server_channel.method().await, Some("foobar".to_string()));
}

#[tokio::test]
async fn s3_round_robin_across_three_servers() {
    let server1 = Peer::with_config(test_config());
    let addr1 = server1.bind("127.0.0.1", 0).await.unwrap();
    let server2 = Peer::with_config(test_config());
    let addr2 = server2.bind("127.0.0.1", 0).await.unwrap();

    let client = Peer::with_config(test_config());
    let client_addr = client.bind("127.0.0.1", 0).await.unwrap();
    client.connect("127.0.0.1", addr1.port()).await;
    client.connect("127.0.0.1", addr2.port()).await;

    let server3 = Peer::with_config(test_config());
    server3.connect("127.0.0.1", client_addr.port()).await;

    for (server, tag) in [(&server1, b'1'), (&server2, b'2'), (&server3, b'3')] {
        tokio::spawn(echo_tagged(server.clone(), tag));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut seen_ids = std::collections::HashSet::new();
    for i in 0..4 {
        let channel = client.open("foo").await.unwrap();
        channel
            .send_frame(
                Frame::data()
                    .with_payload(format!("req{i}").into_bytes())
                    .with_last(true),
            )
            .await
            .unwrap();
        let reply = channel.receive_frame().await.unwrap();
        assert!(!reply.payload.is_empty());
        seen_ids.insert(reply.payload[0]);
    }

    let expected: std::collections::HashSet<u8> = [b'1', b'2', b'3'].into_iter().collect();
    assert_eq!(seen_ids, expected, "expected one reply from each server");
}

async fn echo_tagged(server: std::sync::Arc<Peer>, tag: u8) {
    loop {
        let Some(channel) = server.accept().await else {
            return;
        };
        let tag = tag;
        tokio::spawn(async move {
            while let Some(frame) = channel.receive_frame().await {
                let mut reversed: Vec<u8> = frame.payload.iter().rev().cloned().collect();
                reversed.insert(0, tag);
                let last = frame.last;
                if channel
                    .send_frame(Frame::data().with_payload(reversed).with_last(last))
                    .await
                    .is_err()
                {
                    break;
                }
                if last {
                    break;
                }
            }
        });
    }
}

#[tokio::test]
async fn s4_graceful_close_is_idempotent() {
    let server = Peer::with_config(test_config());
    let addr = server.bind("127.0.0.1", 0).await.unwrap();
    let client = Peer::with_config(test_config());
    client.connect("127.0.0.1", addr.port()).await;

    let client_channel = client.open("foobar").await.unwrap();
    client_channel
        .send_frame(Frame::data().with_payload(vec![1]).with_last(true))
        .await
        .unwrap();
    server.accept().await.unwrap();

    assert_eq!(client.close().await, ErrorCode::None);
    assert_eq!(client.close().await, ErrorCode::PeerAlreadyClosed);
    assert_eq!(server.close().await, ErrorCode::None);
    assert_eq!(server.close().await, ErrorCode::PeerAlreadyClosed);
}

#[tokio::test]
async fn s5_header_preservation() {
    let server = Peer::with_config(test_config());
    let addr = server.bind("127.0.0.1", 0).await.unwrap();
    let client = Peer::with_config(test_config());
    client.connect("127.0.0.1", addr.port()).await;

    let client_channel = client.open("m").await.unwrap();
    let mut frame = Frame::data().with_payload(vec![1]).with_last(true);
    frame.header_add("k1", "v1");
    frame.header_add("k2", "v2");
    client_channel.send_frame(frame).await.unwrap();

    let server_channel = server.accept().await.unwrap();
    let received = server_channel.receive_frame().await.unwrap();
    assert_eq!(received.header_len(), 2);
    assert_eq!(received.header_find("k1"), Some("v1"));
    assert_eq!(received.header_find("k2"), Some("v2"));
}

#[tokio::test]
async fn s6_protocol_error_closes_channel() {
    let server = Peer::with_config(test_config());
    let addr = server.bind("127.0.0.1", 0).await.unwrap();
    let client = Peer::with_config(test_config());
    client.connect("127.0.0.1", addr.port()).await;

    let client_channel = client.open("m").await.unwrap();
    client_channel
        .send_frame(Frame::data().with_payload(vec![1]).with_last(true))
        .await
        .unwrap();
    let server_channel = server.accept().await.unwrap();
    server_channel.receive_frame().await.unwrap();

    let bad_frame = Frame::data().with_error("boom");
    server_channel.send_frame(bad_frame).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(client_channel.receive_frame().await.is_none());
    assert_eq!(client_channel.error().await, ErrorCode::ChanFrame);
}
