//! Integration tests exercising a live notification server over HTTP.

use std::sync::Arc;
use std::time::Duration;

use gena_parser::{DidlDecodeError, DidlDecoder, DidlObject, EventValue};
use gena_server::{Event, EventCallback, EventServer, ServerConfig};
use tokio::sync::mpsc;

struct NoDidl;

impl DidlDecoder for NoDidl {
    fn decode(&self, didl: &str) -> Result<Vec<DidlObject>, DidlDecodeError> {
        Err(DidlDecodeError::Malformed(didl.to_string()))
    }
}

/// Start a server on an OS-assigned port and return it with its base URL.
async fn start_server() -> (EventServer, String) {
    let config = ServerConfig {
        listen_port: 0,
        ..ServerConfig::default()
    };
    let server = EventServer::new(config, Arc::new(NoDidl));
    server.start().await.expect("failed to start server");
    let addr = server.local_addr().await.unwrap();
    (server, format!("http://{addr}"))
}

/// Callback that forwards every received event over a channel.
fn channel_callback() -> (EventCallback, mpsc::UnboundedReceiver<Arc<Event>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = EventCallback::new(move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
            Ok(())
        }
    });
    (callback, rx)
}

fn notify_method() -> reqwest::Method {
    reqwest::Method::from_bytes(b"NOTIFY").unwrap()
}

const SIMPLE_BODY: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
    <e:property><TransportState>PLAYING</TransportState></e:property>
</e:propertyset>"#;

#[tokio::test]
async fn test_notify_is_delivered_to_registered_callback() {
    let (server, base_url) = start_server().await;
    let (callback, mut rx) = channel_callback();
    server.registry().register("uuid:abc", callback).await;

    let response = reqwest::Client::new()
        .request(notify_method(), &base_url)
        .header("SID", "uuid:abc")
        .header("SEQ", "1")
        .body(SIMPLE_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event delivered")
        .unwrap();
    assert_eq!(event.sid, "uuid:abc");
    assert_eq!(event.seq, "1");
    assert_eq!(
        event.variable("transport_state").and_then(EventValue::as_text),
        Some("PLAYING")
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_notify_methods_get_204() {
    let (server, base_url) = start_server().await;

    let response = reqwest::Client::new()
        .get(format!("{base_url}/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = reqwest::Client::new()
        .post(&base_url)
        .body("ignored")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_hanging() {
    let (server, base_url) = start_server().await;

    let response = reqwest::Client::new()
        .request(notify_method(), &base_url)
        .header("SID", "uuid:abc")
        .header("SEQ", "0")
        .body("this is not xml")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_utf8_body_is_rejected() {
    let (server, base_url) = start_server().await;

    let response = reqwest::Client::new()
        .request(notify_method(), &base_url)
        .header("SID", "uuid:abc")
        .header("SEQ", "0")
        .body(vec![0xff, 0xfe, 0x3c, 0x65])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_sid_is_accepted_and_delivered_to_nobody() {
    let (server, base_url) = start_server().await;
    let (callback, mut rx) = channel_callback();
    server.registry().register("uuid:someone-else", callback).await;

    let response = reqwest::Client::new()
        .request(notify_method(), &base_url)
        .header("SID", "uuid:stranger")
        .header("SEQ", "0")
        .body(SIMPLE_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_callback_does_not_affect_siblings() {
    let (server, base_url) = start_server().await;

    let failing = EventCallback::new(|_event| async { Err("handler exploded".into()) });
    let (working, mut rx) = channel_callback();
    server.registry().register("uuid:abc", failing).await;
    server.registry().register("uuid:abc", working).await;

    let response = reqwest::Client::new()
        .request(notify_method(), &base_url)
        .header("SID", "uuid:abc")
        .header("SEQ", "0")
        .body(SIMPLE_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("working callback was not invoked")
        .unwrap();
    assert_eq!(event.sid, "uuid:abc");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_arrive_in_notify_order() {
    let (server, base_url) = start_server().await;
    let (callback, mut rx) = channel_callback();
    server.registry().register("uuid:abc", callback).await;

    let client = reqwest::Client::new();
    for seq in 0..3 {
        let response = client
            .request(notify_method(), &base_url)
            .header("SID", "uuid:abc")
            .header("SEQ", seq.to_string())
            .body(SIMPLE_BODY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    for expected in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("missing event")
            .unwrap();
        assert_eq!(event.seq, expected.to_string());
    }

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_handler_does_not_reorder_events() {
    let (server, base_url) = start_server().await;

    // Dawdle on the first event so later NOTIFYs arrive while it is still
    // being handled; they must wait behind it rather than overtake it.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callback = EventCallback::new(move |event: Arc<Event>| {
        let tx = tx.clone();
        async move {
            if event.seq == "0" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let _ = tx.send(event);
            Ok(())
        }
    });
    server.registry().register("uuid:abc", callback).await;

    let client = reqwest::Client::new();
    for seq in 0..3 {
        let response = client
            .request(notify_method(), &base_url)
            .header("SID", "uuid:abc")
            .header("SEQ", seq.to_string())
            .body(SIMPLE_BODY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    for expected in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("missing event")
            .unwrap();
        assert_eq!(event.seq, expected.to_string());
    }

    server.shutdown().await.unwrap();
}
