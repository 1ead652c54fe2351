use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use protocol::{LOGS_LIMIT, StreamMessage};

use crate::server::AppState;

pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Snapshot first, then trade log lines as they happen and a status every
/// `status_push`. Client frames other than close are ignored.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // subscribe before the snapshot so no line falls in between
    let mut lines = state.bot.subscribe_logs();

    let first = match state.bot.status().await {
        Ok(status) => StreamMessage::Snapshot {
            status,
            logs: state.bot.logs(LOGS_LIMIT),
        },
        Err(e) => StreamMessage::Error {
            message: e.to_string(),
        },
    };
    if send(&mut sender, &first).await.is_err() {
        return;
    }

    let mut ticker = tokio::time::interval(state.status_push);
    ticker.tick().await;

    loop {
        let msg = tokio::select! {
            line = lines.recv() => match line {
                Ok(line) => StreamMessage::Log { line },
                Err(RecvError::Lagged(n)) => {
                    debug!("stream client lagged, skipped {} lines", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => match state.bot.status().await {
                Ok(status) => StreamMessage::Status { status },
                Err(e) => StreamMessage::Error { message: e.to_string() },
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        if send(&mut sender, &msg).await.is_err() {
            break;
        }
    }

    debug!("stream client disconnected");
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &StreamMessage) -> Result<(), ()> {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            warn!("stream encode failed: {}", e);
            return Err(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use protocol::StreamMessage;

    use std::sync::Arc;

    use crate::config::ServerConfig;
    use crate::server::tests::{Unreachable, state_with, test_state};
    use crate::server::{AppState, build_router};

    async fn next_frame<S>(ws: &mut S) -> StreamMessage
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("frame in time")
                .expect("stream open")
                .expect("valid frame");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Serve `state` on an ephemeral port and return its stream URL
    async fn serve(state: AppState) -> String {
        let config = ServerConfig {
            frontend_dir: "does/not/exist".into(),
            ..ServerConfig::default()
        };
        let app = build_router(state, &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{}/bot/ws", addr)
    }

    #[tokio::test]
    async fn snapshot_then_log_lines_and_status() {
        let state = test_state();
        let url = serve(state.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        match next_frame(&mut ws).await {
            StreamMessage::Snapshot { status, logs } => {
                assert!(!status.running);
                assert!(logs.is_empty());
            }
            other => panic!("expected snapshot, got {:?}", other),
        }

        state.bot.start();

        let mut saw_log = false;
        let mut saw_running = false;
        for _ in 0..10 {
            match next_frame(&mut ws).await {
                StreamMessage::Log { line } => saw_log |= line.ends_with("✅ bot started"),
                StreamMessage::Status { status } => saw_running |= status.running,
                other => panic!("unexpected {:?}", other),
            }
            if saw_log && saw_running {
                break;
            }
        }
        assert!(saw_log && saw_running);
    }

    #[tokio::test]
    async fn exchange_failure_is_pushed_as_error_frames() {
        let state = state_with(Arc::new(Unreachable));
        let url = serve(state.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        // no snapshot without a status; the first frame reports the failure
        match next_frame(&mut ws).await {
            StreamMessage::Error { message } => {
                assert_eq!(message, "transport error: connection refused");
            }
            other => panic!("expected error frame, got {:?}", other),
        }

        // periodic pushes keep reporting it, log lines still flow
        state.bot.trade_log().push("still logging");
        let mut saw_error = false;
        let mut saw_log = false;
        for _ in 0..10 {
            match next_frame(&mut ws).await {
                StreamMessage::Error { .. } => saw_error = true,
                StreamMessage::Log { line } => saw_log |= line.ends_with("still logging"),
                other => panic!("unexpected {:?}", other),
            }
            if saw_error && saw_log {
                break;
            }
        }
        assert!(saw_error && saw_log);
    }
}
