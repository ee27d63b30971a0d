//! WebSocket transport round trips against a real socket.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use shoalfire_transport::{Connection, Transport, WebSocketTransport};

async fn bound_transport() -> (WebSocketTransport, String) {
    let transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = transport.local_addr().expect("local addr");
    (transport, format!("ws://{addr}"))
}

#[tokio::test]
async fn accepts_and_receives_client_frames() {
    let (mut transport, url) = bound_transport().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("connect");
        ws.send(Message::Binary(b"hello".to_vec().into()))
            .await
            .expect("send");
        ws.close(None).await.expect("close");
    });

    let conn = transport.accept().await.expect("accept");
    assert_eq!(conn.recv().await.unwrap(), Some(b"hello".to_vec()));
    // Clean close surfaces as None.
    assert_eq!(conn.recv().await.unwrap(), None);
    client.await.unwrap();
}

#[tokio::test]
async fn text_frames_arrive_as_bytes() {
    let (mut transport, url) = bound_transport().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("connect");
        ws.send(Message::Text("{\"cmd\":\"status\"}".into()))
            .await
            .expect("send");
        ws.close(None).await.expect("close");
    });

    let conn = transport.accept().await.expect("accept");
    assert_eq!(
        conn.recv().await.unwrap(),
        Some(b"{\"cmd\":\"status\"}".to_vec())
    );
    client.await.unwrap();
}

#[tokio::test]
async fn server_send_reaches_client() {
    let (mut transport, url) = bound_transport().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("connect");
        let frame = ws.next().await.expect("frame").expect("ok");
        assert_eq!(frame.into_data().as_ref(), b"pong");
    });

    let conn = transport.accept().await.expect("accept");
    conn.send(b"pong").await.expect("send");
    client.await.unwrap();
}

#[tokio::test]
async fn cloned_connection_can_send_while_other_half_receives() {
    let (mut transport, url) = bound_transport().await;

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("connect");
        // Expect the server's push before we send anything.
        let frame = ws.next().await.expect("frame").expect("ok");
        assert_eq!(frame.into_data().as_ref(), b"push");
        ws.send(Message::Binary(b"reply".to_vec().into()))
            .await
            .expect("send");
        ws.close(None).await.expect("close");
    });

    let conn = transport.accept().await.expect("accept");
    let writer = conn.clone();

    // The reader is parked in recv while the clone sends.
    let reader = tokio::spawn(async move { conn.recv().await });
    writer.send(b"push").await.expect("send");

    assert_eq!(reader.await.unwrap().unwrap(), Some(b"reply".to_vec()));
    client.await.unwrap();
}

#[tokio::test]
async fn connection_ids_are_unique() {
    let (mut transport, url) = bound_transport().await;

    let url2 = url.clone();
    let c1 = tokio::spawn(async move {
        tokio_tungstenite::connect_async(url).await.expect("connect")
    });
    let conn1 = transport.accept().await.expect("accept");
    let c2 = tokio::spawn(async move {
        tokio_tungstenite::connect_async(url2).await.expect("connect")
    });
    let conn2 = transport.accept().await.expect("accept");

    assert_ne!(conn1.id(), conn2.id());
    c1.await.unwrap();
    c2.await.unwrap();
}
