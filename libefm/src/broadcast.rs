use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use super::constants::{ROUND_MESSAGE_TYPE, WS_CHANNEL_CAPACITY};
use super::error::BroadcastError;
use super::throttle::Throttle;

/// The JSON payload pushed to websocket clients: `{"type":"round","data":[...]}`
#[derive(Debug, Serialize)]
pub struct RoundMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: &'a [i64],
}

impl<'a> RoundMessage<'a> {
    pub fn new(data: &'a [i64]) -> Self {
        Self {
            kind: ROUND_MESSAGE_TYPE,
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, BroadcastError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// BroadcastHub is the publishing side of the websocket fan-out.
///
/// Every connected client holds a receiver on the same channel. Publishing is throttled:
/// rounds that arrive before the minimum period has passed are dropped. There is no
/// delivery guarantee; a client that falls behind skips what it missed.
#[derive(Debug)]
pub struct BroadcastHub {
    tx: broadcast::Sender<String>,
    throttle: Throttle,
}

impl BroadcastHub {
    pub fn new(min_period: Duration) -> Self {
        let (tx, _) = broadcast::channel(WS_CHANNEL_CAPACITY);
        Self {
            tx,
            throttle: Throttle::new(min_period),
        }
    }

    /// Publish a round to every connected client.
    ///
    /// Returns the number of clients the message was handed to; 0 if it was throttled or
    /// nobody is listening.
    pub fn publish(&mut self, values: &[i64], now: Instant) -> Result<usize, BroadcastError> {
        if !self.throttle.allow(now) {
            return Ok(0);
        }
        let json = RoundMessage::new(values).to_json()?;
        // An error here only means there are no receivers
        Ok(self.tx.send(json).unwrap_or(0))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<String> {
        self.tx.clone()
    }
}

#[derive(Debug, Clone)]
struct SocketState {
    rounds: broadcast::Sender<String>,
    shutdown: watch::Receiver<bool>,
}

/// A websocket server running on its own thread and tokio runtime.
///
/// Clients connect to `/` and receive every round published on the hub the server was
/// spawned with. Anything a client sends is only logged.
#[derive(Debug)]
pub struct WebsocketBroadcaster {
    handle: Option<JoinHandle<Result<(), BroadcastError>>>,
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl WebsocketBroadcaster {
    /// Bind the address and start serving. Binding happens before this returns, so an
    /// address already in use is reported here.
    pub fn spawn(addr: SocketAddr, hub: &BroadcastHub) -> Result<Self, BroadcastError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let listener = runtime.block_on(tokio::net::TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = SocketState {
            rounds: hub.sender(),
            shutdown: shutdown_rx.clone(),
        };
        let handle = std::thread::spawn(move || {
            runtime.block_on(serve(listener, state, shutdown_rx))
        });
        log::info!("Websocket broadcaster listening on ws://{local_addr}");

        Ok(Self {
            handle: Some(handle),
            shutdown: shutdown_tx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close all client connections and wait for the server thread to exit
    pub fn stop(mut self) -> Result<(), BroadcastError> {
        let _ = self.shutdown.send(true);
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(BroadcastError::ThreadPanic),
            },
            None => Ok(()),
        }
    }
}

impl Drop for WebsocketBroadcaster {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn serve(
    listener: tokio::net::TcpListener,
    state: SocketState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BroadcastError> {
    let app = Router::new().route("/", get(ws_handler)).with_state(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    log::info!("Websocket broadcaster stopped");
    Ok(())
}

async fn ws_handler(State(state): State<SocketState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SocketState, socket: WebSocket) {
    if *state.shutdown.borrow() {
        return;
    }
    log::info!("Websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut rounds = state.rounds.subscribe();
    let mut shutdown = state.shutdown.clone();

    let mut tx_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rounds.recv() => match msg {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            // Client went away mid-broadcast
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("Websocket client lagged, skipped {skipped} rounds");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut rx_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => log::info!("Received: {}", text.as_str()),
                Message::Close(_) => return,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut tx_task) => {
            rx_task.abort();
        },
        _ = (&mut rx_task) => {
            tx_task.abort();
        }
    }
    log::info!("Websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_message_shape() {
        let json = RoundMessage::new(&[-3, 0, 12]).to_json().unwrap();
        assert_eq!(json, r#"{"type":"round","data":[-3,0,12]}"#);
    }

    #[test]
    fn test_publish_without_clients_is_dropped() {
        let mut hub = BroadcastHub::new(Duration::ZERO);
        assert_eq!(hub.publish(&[1, 2], Instant::now()).unwrap(), 0);
    }

    #[test]
    fn test_fan_out_reaches_every_client() {
        let mut hub = BroadcastHub::new(Duration::ZERO);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.publish(&[7, 8], Instant::now()).unwrap(), 2);
        let expected = r#"{"type":"round","data":[7,8]}"#;
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_publish_is_throttled() {
        let mut hub = BroadcastHub::new(Duration::from_millis(250));
        let mut client = hub.subscribe();
        let start = Instant::now();
        assert_eq!(hub.publish(&[1], start).unwrap(), 1);
        assert_eq!(
            hub.publish(&[2], start + Duration::from_millis(100)).unwrap(),
            0
        );
        assert_eq!(
            hub.publish(&[3], start + Duration::from_millis(260)).unwrap(),
            1
        );
        assert!(client.try_recv().unwrap().contains("[1]"));
        assert!(client.try_recv().unwrap().contains("[3]"));
        assert!(client.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_client_is_dropped() {
        let mut hub = BroadcastHub::new(Duration::ZERO);
        let keep = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);
        assert_eq!(hub.publish(&[5], Instant::now()).unwrap(), 1);
        drop(keep);
    }

    #[test]
    fn test_server_binds_and_stops() {
        let hub = BroadcastHub::new(Duration::ZERO);
        let server = WebsocketBroadcaster::spawn("127.0.0.1:0".parse().unwrap(), &hub).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.stop().unwrap();
    }
}
