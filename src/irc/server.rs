/// IRC server core: the client registry, channel table, connection
/// lifecycle, and the accept and per-client loops.
///
/// All shared state lives in one [`ServerState`] behind an `Arc<RwLock>`.
/// Each accepted connection gets a tokio task that frames lines off the
/// socket and runs the dispatcher to completion under the write lock, so
/// registry and channel mutations are serialized. Every frame bound for a
/// client, its own replies included, goes through that client's unbounded
/// outbox; the connection task drains it into the socket, which makes
/// per-recipient delivery order the enqueue order.
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::{Arc, LazyLock};

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use super::channel::Channel;
use super::codec::LineCodec;
use super::handlers::Flow;
use super::message::{Message, ParseError};
use super::replies;
use crate::config::Config;

/// Server identity, used as the prefix of every server-origin line.
pub static SERVER_NAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".into())
});

/// Stable per-connection id, assigned at accept time. Channels reference
/// clients by nick → ClientId so a nick change only rekeys lookups.
pub type ClientId = u64;

/// One connected client: registration progress plus the outbox handle.
#[derive(Debug)]
pub struct ClientHandle {
    pub nick: Option<String>,
    pub user: Option<String>,
    pub realname: Option<String>,
    pub password_ok: bool,
    pub registered: bool,
    /// Sending to a disconnected client is a silent no-op.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Process-wide server state: one instance, threaded through the event
/// loops rather than global.
#[derive(Debug)]
pub struct ServerState {
    password: String,
    next_id: ClientId,
    /// All connections, registered or not.
    pub clients: HashMap<ClientId, ClientHandle>,
    /// Nickname uniqueness index. A nick is reserved the moment NICK
    /// succeeds, before registration completes.
    pub nicks: HashMap<String, ClientId>,
    /// Active channels. A channel with no users is removed immediately.
    pub channels: HashMap<String, Channel>,
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<RwLock<ServerState>>;

impl ServerState {
    pub fn new(password: String) -> Self {
        ServerState {
            password,
            next_id: 0,
            clients: HashMap::new(),
            nicks: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Track a newly accepted connection and hand back its id.
    pub fn register_connection(&mut self, tx: mpsc::UnboundedSender<Message>) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(
            id,
            ClientHandle {
                nick: None,
                user: None,
                realname: None,
                password_ok: false,
                registered: false,
                tx,
            },
        );
        id
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut ClientHandle> {
        self.clients.get_mut(&id)
    }

    /// The client's nick for reply purposes, `*` before NICK succeeds.
    pub fn display_nick(&self, id: ClientId) -> String {
        self.clients
            .get(&id)
            .and_then(|c| c.nick.clone())
            .unwrap_or_else(|| "*".into())
    }

    /// `nick!user@host` prefix for frames relayed on this client's behalf.
    pub fn user_prefix(&self, id: ClientId) -> String {
        let (nick, user) = match self.clients.get(&id) {
            Some(c) => {
                let nick = c.nick.clone().unwrap_or_else(|| "*".into());
                let user = c.user.clone().unwrap_or_else(|| nick.clone());
                (nick, user)
            }
            None => ("*".into(), "*".into()),
        };
        replies::user_id(&nick, &user)
    }

    pub fn lookup_nick(&self, nick: &str) -> Option<ClientId> {
        self.nicks.get(nick).copied()
    }

    /// Enqueue one frame on a client's outbox.
    pub fn send(&self, id: ClientId, msg: Message) {
        if let Some(client) = self.clients.get(&id) {
            let _ = client.tx.send(msg);
        }
    }

    /// Enqueue a frame to every channel member.
    pub fn broadcast(&self, channel: &Channel, msg: &Message) {
        for id in channel.member_ids() {
            self.send(id, msg.clone());
        }
    }

    /// Enqueue a frame to every channel member except one.
    pub fn broadcast_except(&self, channel: &Channel, skip: ClientId, msg: &Message) {
        for id in channel.member_ids() {
            if id != skip {
                self.send(id, msg.clone());
            }
        }
    }

    /// Tear down a connection: QUIT broadcast to co-channel members (one
    /// copy each), removal from every channel with operator refill, and
    /// destruction of channels left empty. Safe to call twice; the second
    /// call finds nothing.
    pub fn remove_client(&mut self, id: ClientId, reason: &str) {
        let Some(handle) = self.clients.remove(&id) else {
            return;
        };
        let Some(nick) = handle.nick else {
            return;
        };
        self.nicks.remove(&nick);

        let user = handle.user.as_deref().unwrap_or(&nick);
        let quit = replies::quit(&replies::user_id(&nick, user), reason);
        let mut notified: HashSet<ClientId> = HashSet::new();
        for channel in self.channels.values() {
            if channel.is_member(&nick) {
                for member in channel.member_ids() {
                    if member != id && notified.insert(member) {
                        self.send(member, quit.clone());
                    }
                }
            }
        }

        for channel in self.channels.values_mut() {
            if channel.is_member(&nick) {
                channel.remove_member(&nick);
            }
        }
        self.channels.retain(|_, channel| !channel.is_empty());
    }
}

/// Bind, wire up signal-driven shutdown, and serve until told to stop.
pub async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "tarn listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    serve(listener, config.password, shutdown_rx).await
}

/// Resolve when any of SIGINT, SIGTERM, SIGTSTP, SIGQUIT arrives.
async fn wait_for_shutdown_signal() {
    async fn wait(kind: SignalKind) {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    }

    tokio::select! {
        _ = wait(SignalKind::interrupt()) => {}
        _ = wait(SignalKind::terminate()) => {}
        _ = wait(SignalKind::quit()) => {}
        _ = wait(SignalKind::from_raw(libc::SIGTSTP)) => {}
    }
}

/// Accept loop. Exits cleanly when the shutdown flag flips; per-connection
/// accept errors are logged and do not stop the server.
pub async fn serve(
    listener: TcpListener,
    password: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let state: SharedState = Arc::new(RwLock::new(ServerState::new(password)));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        info!(%addr, "new connection");
                        let state = Arc::clone(&state);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(socket, state, shutdown).await {
                                warn!(%addr, "client error: {e}");
                            }
                            info!(%addr, "disconnected");
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
            _ = shutdown.changed() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Per-connection task: frame lines, dispatch, drain the outbox.
async fn handle_client(
    socket: TcpStream,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut framed = Framed::new(socket, LineCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = state.write().await.register_connection(tx);

    let result = client_loop(id, &mut framed, &mut rx, &state, &mut shutdown).await;

    // Flush whatever the handlers queued before the connection winds down.
    while let Ok(msg) = rx.try_recv() {
        if framed.send(msg).await.is_err() {
            break;
        }
    }

    // A QUIT command already removed the client; any other exit path (EOF,
    // read error, shutdown) counts as an abrupt disconnect.
    state.write().await.remove_client(id, "Connection closed");

    result
}

async fn client_loop(
    id: ClientId,
    framed: &mut Framed<TcpStream, LineCodec>,
    rx: &mut mpsc::UnboundedReceiver<Message>,
    state: &SharedState,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(line)) => match Message::parse(&line) {
                        Ok(msg) => {
                            let mut st = state.write().await;
                            if let Flow::Quit = st.dispatch(id, &msg) {
                                return Ok(());
                            }
                        }
                        Err(ParseError::Empty) => {}
                        Err(err @ ParseError::InvalidParam { .. }) => {
                            let st = state.read().await;
                            let nick = st.display_nick(id);
                            st.send(id, replies::err_unknown_error(&nick, &err.to_string()));
                        }
                    },
                    Some(Err(e)) => {
                        warn!("read error: {e}");
                        return Ok(());
                    }
                    None => return Ok(()), // connection closed
                }
            }

            Some(msg) = rx.recv() => {
                framed.send(msg).await?;
            }

            _ = shutdown.changed() => return Ok(()),
        }
    }
}
