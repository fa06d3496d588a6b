use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    server::AppState,
    transport::{routes, websocket_server::websocket_handler},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::get_root))
        .route("/stats", get(routes::get_stats))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{configs::Config, protocol::OutgoingMessage, room::RoomRegistry, storage::MemoryStore};
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn serve() -> (Arc<AppState>, String) {
        let config = Arc::new(Config::default());
        let registry = RoomRegistry::new(config.clone(), Arc::new(MemoryStore::new()));
        let state = Arc::new(AppState::new(config, registry));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (state, addr.to_string())
    }

    async fn next_frame<S>(stream: &mut S) -> OutgoingMessage
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().unwrap()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn websocket_join_and_clock_sync() {
        let (state, addr) = serve().await;
        let url = format!("ws://{}/ws?roomId=123456&username=Alice&clientId=a", addr);
        let (mut socket, _) = connect_async(url).await.unwrap();

        // greeting: sources, controls, membership
        for _ in 0..3 {
            assert!(matches!(
                next_frame(&mut socket).await,
                OutgoingMessage::RoomEvent { .. }
            ));
        }
        assert!(state.registry.contains(&"123456".into()));

        socket
            .send(Message::text(r#"{"type":"NTP_REQUEST","t0":100}"#.to_string()))
            .await
            .unwrap();
        match next_frame(&mut socket).await {
            OutgoingMessage::NtpResponse { t0, t1, t2, .. } => {
                assert_eq!(t0, 100.0);
                assert!(t2 >= t1);
            }
            other => panic!("expected NTP_RESPONSE, got {:?}", other),
        }

        socket.close(None).await.unwrap();
        for _ in 0..50 {
            if state
                .registry
                .get(&"123456".into())
                .is_some_and(|entry| entry.lock().is_empty())
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("client was not removed after close");
    }

    #[tokio::test]
    async fn upgrade_requires_identifiers() {
        let (_state, addr) = serve().await;
        for query in [
            "roomId=12345&username=A&clientId=a",
            "roomId=123456&clientId=a",
            "roomId=123456&username=A",
        ] {
            let url = format!("ws://{}/ws?{}", addr, query);
            match connect_async(url).await {
                Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
                    assert_eq!(resp.status(), 400, "query {}", query)
                }
                other => panic!("expected 400 for {}, got {:?}", query, other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn stats_report_rooms() {
        let (state, addr) = serve().await;
        let (tx, _rx) = crate::room::broadcast::channel();
        state
            .registry
            .add_client(&"654321".into(), "a".into(), "A".into(), tx);

        let body: serde_json::Value = reqwest::get(format!("http://{}/stats", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["rooms"], 1);
        assert_eq!(body["clients"], 1);
        assert_eq!(body["roomSummaries"][0]["roomId"], "654321");
        assert_eq!(body["roomSummaries"][0]["playing"], false);

        let root = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(root.contains("running"));
    }
}
