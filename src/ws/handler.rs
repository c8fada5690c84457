//! WebSocket upgrade handler

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::session::{Channel, Outbound};
use crate::ws::dispatcher::{Dispatcher, Flow};
use crate::ws::protocol::ServerMsg;

/// Outbound queue depth per connection
const OUTBOUND_BUFFER: usize = 64;
/// How long the writer gets to flush after the reader stops
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler. Authentication happens in-band with `AUTH`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let channel = Channel::new(tx);
    let connection_id = channel.id();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let mut writer = tokio::spawn(run_writer(ws_sink, rx));

    let mut dispatcher = Dispatcher::new(&state, channel);
    run_reader(&mut dispatcher, ws_stream).await;

    // Release the binding and queue the close frame behind pending replies
    dispatcher.disconnect().await;
    drop(dispatcher);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        warn!(connection_id = %connection_id, "Writer did not drain in time");
        writer.abort();
    }

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> dispatcher
async fn run_reader(dispatcher: &mut Dispatcher, mut ws_stream: SplitStream<WebSocket>) {
    while let Some(result) = ws_stream.next().await {
        let flow = match result {
            Ok(Message::Text(text)) => dispatcher.handle_text(&text).await,
            Ok(Message::Binary(_)) => {
                warn!(user_id = ?dispatcher.user_id(), "Received binary message");
                dispatcher.handle_binary().await
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Flow::Continue,
            Ok(Message::Close(_)) => {
                info!(user_id = ?dispatcher.user_id(), "Client initiated close");
                Flow::Close
            }
            Err(e) => {
                error!(user_id = ?dispatcher.user_id(), error = %e, "WebSocket error");
                Flow::Close
            }
        };
        if flow == Flow::Close {
            break;
        }
    }
}

/// Writer task: outbound queue -> WebSocket
async fn run_writer(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(msg) => {
                if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                    debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            Outbound::Close => {
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: "".into(),
                };
                if let Err(e) = ws_sink.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
        }
    }
    let _ = ws_sink.close().await;
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
