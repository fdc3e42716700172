//! Server network layer: websocket transport and the single owner loop

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ClientMessage;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::{Effect, Game};
use crate::liveness::Probe;
use crate::rate_limiter::RateLimiter;
use crate::scheduler::{self, Scheduler, Tick};
use crate::utils::get_timestamp;
use crate::world::ConnectionId;

/// Messages sent from connection and timer tasks to the run loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        closer: oneshot::Sender<()>,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    Frame {
        connection_id: ConnectionId,
        text: String,
    },
    Pong {
        connection_id: ConnectionId,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
    RemovalDue {
        agent_id: String,
        life: u64,
    },
    WatchdogExpired {
        connection_id: ConnectionId,
        seq: u64,
    },
}

/// Per-socket limits handed to every connection task
#[derive(Debug, Clone, Copy)]
struct SocketSettings {
    outbound_queue: usize,
    max_message_bytes: usize,
    close_grace: Duration,
    rate_window: Duration,
    rate_threshold: u32,
}

impl SocketSettings {
    fn new(config: &ServerConfig) -> Self {
        Self {
            outbound_queue: config.outbound_queue.max(1),
            max_message_bytes: config.max_message_bytes,
            close_grace: config.close_grace,
            rate_window: config.rate_window,
            rate_threshold: config.rate_threshold,
        }
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_bytes);
        ws_config.max_frame_size = Some(self.max_message_bytes);
        ws_config
    }
}

/// Main server: owns the game and every connection's state
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    clients: ClientManager,
    game: Game,
    scheduler: Scheduler,

    /// Lifecycle and timer events
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    /// Admitted client frames; bounded so slow processing pushes back on readers
    frames_tx: mpsc::Sender<ServerEvent>,
    frames_rx: mpsc::Receiver<ServerEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig, game: Game) -> Result<Self, ServerError> {
        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!("Server listening on ws://{}", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::channel(config.inbound_queue.max(1));
        Ok(Server {
            listener,
            local_addr,
            clients: ClientManager::new(config.max_connections),
            scheduler: Scheduler::new(&config),
            config,
            game,
            events_tx,
            events_rx,
            frames_tx,
            frames_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task that accepts sockets and hands each to its own task
    fn spawn_acceptor(
        listener: TcpListener,
        events: mpsc::UnboundedSender<ServerEvent>,
        frames: mpsc::Sender<ServerEvent>,
        settings: SocketSettings,
    ) {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted TCP connection from {}", addr);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            events.clone(),
                            frames.clone(),
                            settings,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main loop: processes one event, frame or tick at a time, to completion
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            local_addr,
            config,
            clients,
            game,
            scheduler,
            events_tx,
            mut events_rx,
            frames_tx,
            mut frames_rx,
        } = self;
        let settings = SocketSettings::new(&config);
        Self::spawn_acceptor(listener, events_tx.clone(), frames_tx, settings);

        let mut state = RunState {
            config,
            clients,
            game,
            scheduler,
            events_tx,
        };

        info!("Server on {} started", local_addr);
        loop {
            let event = tokio::select! {
                event = events_rx.recv() => event,
                frame = frames_rx.recv() => frame,
                tick = state.scheduler.next() => {
                    state.handle_tick(tick);
                    continue;
                }
            };
            match event {
                Some(event) => state.handle_event(event),
                None => {
                    info!("Event channel closed, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Everything the run loop mutates
struct RunState {
    config: ServerConfig,
    clients: ClientManager,
    game: Game,
    scheduler: Scheduler,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl RunState {
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                addr,
                sender,
                closer,
                reply,
            } => {
                let id = self.clients.add_connection(addr, sender, closer);
                if id.is_none() {
                    warn!("Rejecting connection from {}: server full", addr);
                }
                match (reply.send(id), id) {
                    (Ok(()), Some(id)) => self.send_snapshot_to(id),
                    // the socket task went away before registration finished
                    (Err(_), Some(id)) => self.disconnect(id),
                    _ => {}
                }
            }
            ServerEvent::Frame {
                connection_id,
                text,
            } => self.handle_frame(connection_id, &text, get_timestamp()),
            ServerEvent::Pong { connection_id } => self.clients.on_pong(connection_id),
            ServerEvent::Disconnected { connection_id } => self.disconnect(connection_id),
            ServerEvent::RemovalDue { agent_id, life } => {
                self.scheduler.removal_fired(&agent_id, life);
                if self.game.remove_dead_agent(&agent_id, life) {
                    debug!("Grace period over for {}", agent_id);
                }
            }
            ServerEvent::WatchdogExpired { connection_id, seq } => {
                if self.clients.watchdog_expired(connection_id, seq) {
                    warn!("Connection {} missed its pong, closing", connection_id);
                    self.disconnect(connection_id);
                }
            }
        }
    }

    /// Decode and dispatch an admitted frame. Nothing here can fail the
    /// connection.
    fn handle_frame(&mut self, connection_id: ConnectionId, text: &str, now: u64) {
        // frames can still be queued after their connection closed
        if !self.clients.contains(connection_id) {
            debug!("Dropping frame from closed connection {}", connection_id);
            return;
        }

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame from connection {}: {}", connection_id, e);
                return;
            }
        };

        match self.game.dispatch(connection_id, message, now) {
            Ok(effects) => self.apply_effects(effects),
            Err(e) => debug!("Ignored message from connection {}: {}", connection_id, e),
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        let mut broadcast = false;
        for effect in effects {
            match effect {
                Effect::Broadcast => broadcast = true,
                Effect::ScheduleRemoval {
                    agent_id,
                    life,
                    delay,
                } => self
                    .scheduler
                    .schedule_removal(&self.events_tx, agent_id, life, delay),
                Effect::CancelRemoval { agent_id } => self.scheduler.cancel_removal(&agent_id),
            }
        }
        if broadcast {
            self.broadcast_snapshot();
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        let now = get_timestamp();
        match tick {
            Tick::Snapshot => self.broadcast_snapshot(),
            Tick::Consumables => {
                if self.game.has_agents() {
                    let report = self.game.tick_consumables(now);
                    if report.expired > 0 || report.spawned > 0 {
                        debug!(
                            "Consumables: {} expired, {} spawned, {} live",
                            report.expired,
                            report.spawned,
                            self.game.world().consumables.len()
                        );
                    }
                    self.broadcast_snapshot();
                }
            }
            Tick::IdleSweep => {
                let report = self.game.sweep(now);
                if report.removed > 0 {
                    info!("Swept {} idle agents", report.removed);
                }
            }
            Tick::Liveness => self.probe_connections(),
        }
    }

    fn probe_connections(&mut self) {
        for id in self.clients.ids() {
            match self.clients.probe(id) {
                Some(Probe::Close) => {
                    warn!("Connection {} did not answer the last probe", id);
                    self.disconnect(id);
                }
                Some(Probe::Ping { seq }) => {
                    self.clients.send_to(id, Message::Ping(Vec::new()));
                    let watchdog = scheduler::spawn_watchdog(
                        &self.events_tx,
                        id,
                        seq,
                        self.config.pong_timeout,
                    );
                    self.clients.arm_watchdog(id, watchdog);
                }
                None => {}
            }
        }
    }

    fn serialize_snapshot(&self) -> Option<String> {
        match serde_json::to_string(&self.game.snapshot()) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                None
            }
        }
    }

    fn broadcast_snapshot(&self) {
        if self.clients.is_empty() {
            return;
        }
        if let Some(text) = self.serialize_snapshot() {
            self.clients.broadcast(&text);
        }
    }

    fn send_snapshot_to(&self, id: ConnectionId) {
        if let Some(text) = self.serialize_snapshot() {
            self.clients.send_to(id, Message::Text(text));
        }
    }

    /// Drops the connection, its watchdog and its agents, and tears the
    /// socket down
    fn disconnect(&mut self, id: ConnectionId) {
        let Some(connection) = self.clients.remove_connection(id) else {
            return;
        };
        connection.close();
        let removed = self.game.disconnect(id);
        if !removed.is_empty() {
            info!("Removed agents {:?} of connection {}", removed, id);
        }
    }
}

/// What the reader does with one inbound websocket message
#[derive(Debug)]
enum Inbound {
    Forward(ServerEvent),
    Skip,
    Close,
}

/// Applies the per-connection rate limit to one inbound message.
///
/// Every client-originated frame counts against the window, pings included.
/// Pongs answer our own probes and are never throttled; Close ends the read
/// loop.
fn inbound_event(
    connection_id: ConnectionId,
    message: Message,
    limiter: &mut RateLimiter,
    now: u64,
) -> Inbound {
    let event = match message {
        Message::Close(_) => return Inbound::Close,
        Message::Pong(_) => return Inbound::Forward(ServerEvent::Pong { connection_id }),
        Message::Text(text) => Some(ServerEvent::Frame {
            connection_id,
            text,
        }),
        Message::Binary(data) => Some(ServerEvent::Frame {
            connection_id,
            text: String::from_utf8_lossy(&data).into_owned(),
        }),
        // answered by the websocket layer
        Message::Ping(_) | Message::Frame(_) => None,
    };

    if !limiter.admit(now) {
        debug!("Rate limit: dropped frame from connection {}", connection_id);
        return Inbound::Skip;
    }
    match event {
        Some(event) => Inbound::Forward(event),
        None => Inbound::Skip,
    }
}

/// Runs one websocket: handshake, registration, then reader and writer
/// halves until either side ends or the run loop closes it.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    frames: mpsc::Sender<ServerEvent>,
    settings: SocketSettings,
) {
    let ws_stream = match accept_async_with_config(stream, Some(settings.websocket_config())).await
    {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (sender, mut outbound) = mpsc::channel::<Message>(settings.outbound_queue);
    let (closer, close_rx) = oneshot::channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    if events
        .send(ServerEvent::Connected {
            addr,
            sender,
            closer,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }
    let connection_id = match reply_rx.await {
        Ok(Some(id)) => id,
        _ => {
            let _ = write.send(Message::Close(None)).await;
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        let mut limiter = RateLimiter::new(
            settings.rate_window,
            settings.rate_threshold,
            get_timestamp(),
        );
        while let Some(result) = read.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    debug!("Read error on connection {}: {}", connection_id, e);
                    break;
                }
            };
            match inbound_event(connection_id, message, &mut limiter, get_timestamp()) {
                Inbound::Forward(event) => {
                    if frames.send(event).await.is_err() {
                        break;
                    }
                }
                Inbound::Skip => {}
                Inbound::Close => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = close_rx => {
            recv_task.abort();
            if timeout(settings.close_grace, &mut send_task).await.is_err() {
                debug!("Connection {} did not flush before close", connection_id);
                send_task.abort();
            }
        }
    }
    let _ = events.send(ServerEvent::Disconnected { connection_id });
}
