//! Connection state machine of one CMW-Light client connection
//!
//! The client owns no timers and spawns no tasks. The caller drives it:
//! `receive`/`poll` to read replies, `housekeeping` on a schedule to emit
//! heartbeats and notice a silent server.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use cmwlight_core::message::{Body, Header, Message, RequestContext};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::directory::{resolve_endpoint, DirectoryResolver};
use crate::error::{Error, Result};
use crate::publisher::{EventKind, EventPublisher};
use crate::subscription::{Subscription, Subscriptions};
use crate::transport::{with_timeout, TcpTransport, Transport};

/// Only used to build the diagnostic identity string
static CONNECTIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of one [`Client::housekeeping`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Housekeeping {
    /// Not connected, nothing to do
    Idle,
    /// Server traffic is recent and no heartbeat was due
    Alive,
    /// A client heartbeat went out
    HeartbeatSent,
    /// Server silent for too long; the client is now disconnected
    Stalled,
}

pub struct Client {
    channel: Channel,
    config: ClientConfig,
    state: ConnectionState,
    identity: String,
    connection: u64,
    channels: u64,
    last_id: u64,
    /// GET/SET ids still waiting for their single reply
    pending: HashSet<u64>,
    subscriptions: Subscriptions,
    last_heartbeat: Option<Instant>,
    last_activity: Option<Instant>,
}

impl Client {
    /// Wrap a transport; no traffic happens until [`Client::connect`]
    pub fn new(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        let connection = CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        let identity = identity(&config.identity_prefix, connection, 0);
        Self {
            channel: Channel::from_transport(transport),
            config,
            state: ConnectionState::Disconnected,
            identity,
            connection,
            channels: 0,
            last_id: 0,
            pending: HashSet::new(),
            subscriptions: Subscriptions::new(),
            last_heartbeat: None,
            last_activity: None,
        }
    }

    /// Open a TCP connection and run the handshake
    pub async fn connect_tcp(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let mut builder = TcpTransport::builder().address(addr);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let mut client = Self::new(builder.connect().await?, config);
        client.connect().await?;
        Ok(client)
    }

    /// Look `device` up in the directory, then connect to its server
    pub async fn connect_device<R>(resolver: &R, device: &str, config: ClientConfig) -> Result<Self>
    where
        R: DirectoryResolver + ?Sized,
    {
        let addr = resolve_endpoint(resolver, device).await?;
        Self::connect_tcp(addr, config).await
    }

    /// Run the CLIENT_CONNECT handshake
    ///
    /// Does nothing unless the client is disconnected. On failure the client
    /// goes back to disconnected and the call may be retried.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        self.channels += 1;
        self.identity = identity(&self.config.identity_prefix, self.connection, self.channels);
        debug!(identity = %self.identity, peer = %self.channel.peer(), "connecting");

        match self.handshake().await {
            Ok(server_version) => {
                let now = Instant::now();
                self.state = ConnectionState::Connected;
                self.last_activity = Some(now);
                self.last_heartbeat = Some(now);
                info!(identity = %self.identity, server_version = %server_version, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!(identity = %self.identity, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<String> {
        let hello = Message::ClientConnect {
            version: self.config.version.clone(),
        };
        self.channel.send(&hello).await?;

        let limit = self.config.connect_timeout;
        let reply = with_timeout(limit, "Connect", self.channel.receive()).await?;
        match reply {
            Message::ServerConnectAck { version } => {
                if major(&version) != major(&self.config.version) {
                    return Err(Error::VersionMismatch {
                        client: self.config.version.clone(),
                        server: version,
                    });
                }
                Ok(version)
            }
            other => Err(Error::UnexpectedReply {
                expected: "SERVER_CONNECT_ACK",
                actual: other.message_type(),
            }),
        }
    }

    /// Swap in a fresh transport after the old one died
    ///
    /// Outstanding GET/SET ids are forgotten; subscriptions are kept for
    /// [`Client::resubscribe`] once [`Client::connect`] succeeds again.
    pub fn reattach(&mut self, transport: impl Transport + 'static) {
        self.channel = Channel::from_transport(transport);
        self.state = ConnectionState::Disconnected;
        self.pending.clear();
        self.last_activity = None;
        self.last_heartbeat = None;
    }

    /// Send a GET; the reply carries the returned id
    pub async fn get(
        &mut self,
        device: &str,
        property: &str,
        context: RequestContext,
    ) -> Result<u64> {
        let id = self.request(device, property, Body::Get(context)).await?;
        self.pending.insert(id);
        Ok(id)
    }

    /// Send a SET carrying an already encoded payload
    pub async fn set(
        &mut self,
        device: &str,
        property: &str,
        data: Vec<u8>,
        context: RequestContext,
    ) -> Result<u64> {
        let id = self
            .request(device, property, Body::Set { data, context })
            .await?;
        self.pending.insert(id);
        Ok(id)
    }

    /// Encode `value` with `codec` and send it as a SET
    pub async fn set_value<T, C>(
        &mut self,
        codec: &C,
        device: &str,
        property: &str,
        value: &T,
        context: RequestContext,
    ) -> Result<u64>
    where
        T: Serialize,
        C: Codec,
    {
        let data = codec.encode(value)?;
        self.set(device, property, data, context).await
    }

    /// Send a SUBSCRIBE and start tracking it under the returned id
    pub async fn subscribe(
        &mut self,
        device: &str,
        property: &str,
        context: RequestContext,
    ) -> Result<u64> {
        let id = self
            .request(device, property, Body::Subscribe(context.clone()))
            .await?;
        self.subscriptions
            .insert(Subscription::new(id, device, property, context));
        Ok(id)
    }

    /// Send an UNSUBSCRIBE for a subscription id
    ///
    /// The request reuses the subscription's own id instead of allocating a
    /// new one: the server finds the subscription to cancel by the id of the
    /// SUBSCRIBE that created it.
    ///
    /// The id stops being tracked right away, so notifications still in
    /// flight for it are discarded by [`Client::receive`].
    pub async fn unsubscribe(&mut self, id: u64) -> Result<()> {
        self.ensure_connected()?;
        let sub = self
            .subscriptions
            .remove(id)
            .ok_or(Error::UnknownSubscription(id))?;
        let message = Message::Request {
            header: self.header(id, &sub.device, &sub.property),
            body: Body::Unsubscribe,
        };
        debug!(id, device = %sub.device, property = %sub.property, "unsubscribing");
        self.channel.send(&message).await
    }

    /// Re-send SUBSCRIBE for every tracked subscription under its original id
    pub async fn resubscribe(&mut self) -> Result<usize> {
        self.ensure_connected()?;
        let ids = self.subscriptions.reset();
        for &id in &ids {
            let Some(sub) = self.subscriptions.get(id) else {
                continue;
            };
            let message = Message::Request {
                header: self.header(id, &sub.device, &sub.property),
                body: Body::Subscribe(sub.context.clone()),
            };
            self.channel.send(&message).await?;
        }
        info!(identity = %self.identity, count = ids.len(), "resubscribed");
        Ok(ids.len())
    }

    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.channel.send(&Message::ClientHeartbeat).await?;
        self.last_heartbeat = Some(Instant::now());
        Ok(())
    }

    /// Receive one message
    ///
    /// `Ok(None)` means the message was consumed here: a server heartbeat, a
    /// reply nobody waits for, or traffic for a subscription that is gone.
    pub async fn receive(&mut self) -> Result<Option<Message>> {
        self.ensure_connected()?;
        let limit = self.config.receive_timeout;
        let frames = with_timeout(limit, "Receive", self.channel.receive_frames()).await?;
        // any traffic proves the server alive, even a message we fail to decode
        self.last_activity = Some(Instant::now());
        let message = self.channel.decode(frames)?;

        let deliver = match &message {
            Message::ServerHeartbeat => {
                trace!(identity = %self.identity, "server heartbeat");
                false
            }
            Message::Reply { header, body } => self.correlate(header.id, body),
            other => {
                return Err(Error::UnexpectedReply {
                    expected: "SERVER_REP or SERVER_HB",
                    actual: other.message_type(),
                })
            }
        };
        Ok(deliver.then_some(message))
    }

    /// Receive one message and hand it to `publisher`; false if nothing was delivered
    pub async fn poll<P>(&mut self, publisher: &mut P) -> Result<bool>
    where
        P: EventPublisher + ?Sized,
    {
        let Some(message) = self.receive().await? else {
            return Ok(false);
        };
        let kind = EventKind::of(&message);
        publisher.publish(kind, &self.channel.peer(), message)?;
        Ok(true)
    }

    /// Emit a heartbeat when one is due and check that the server is alive
    pub async fn housekeeping(&mut self, now: Instant) -> Result<Housekeeping> {
        if self.state != ConnectionState::Connected {
            return Ok(Housekeeping::Idle);
        }

        let silent = self
            .last_activity
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        if silent >= self.config.stall_after() {
            warn!(
                identity = %self.identity,
                silent_ms = silent.as_millis() as u64,
                "server stalled"
            );
            self.state = ConnectionState::Disconnected;
            self.pending.clear();
            return Ok(Housekeeping::Stalled);
        }

        let due = self.last_heartbeat.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.heartbeat_interval
        });
        if !due {
            return Ok(Housekeeping::Alive);
        }
        self.channel.send(&Message::ClientHeartbeat).await?;
        self.last_heartbeat = Some(now);
        trace!(identity = %self.identity, "client heartbeat");
        Ok(Housekeeping::HeartbeatSent)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.state = ConnectionState::Disconnected;
        self.pending.clear();
        self.channel.close().await
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Session id sent in every request header
    pub fn session_id(&self) -> &str {
        self.config.session_id.as_deref().unwrap_or(&self.identity)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn subscription(&self, id: u64) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Whether a GET/SET id still waits for its reply
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains(&id)
    }

    pub fn peer(&self) -> String {
        self.channel.peer()
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            _ => Err(Error::NotConnected),
        }
    }

    fn header(&self, id: u64, device: &str, property: &str) -> Header {
        Header::new(id, device, property).session_id(self.session_id())
    }

    async fn request(&mut self, device: &str, property: &str, body: Body) -> Result<u64> {
        self.ensure_connected()?;
        self.last_id += 1;
        let id = self.last_id;
        let request_type = body.request_type();
        let message = Message::Request {
            header: self.header(id, device, property),
            body,
        };
        self.channel.send(&message).await?;
        debug!(id, device, property, ?request_type, "request sent");
        Ok(id)
    }

    /// Update bookkeeping for a reply; false if it must be discarded
    fn correlate(&mut self, id: u64, body: &Body) -> bool {
        let known = match body {
            Body::Reply { .. } | Body::Exception(_) => self.pending.remove(&id),
            Body::SubscribeAck { source_id } => self.subscriptions.acknowledge(id, *source_id),
            Body::NotificationData {
                notification_id, ..
            } => self.subscriptions.notify(id, *notification_id),
            Body::NotificationException(_) | Body::SubscribeException(_) => {
                self.subscriptions.fail(id)
            }
            _ => true,
        };
        if !known {
            debug!(id, request_type = ?body.request_type(), "discarding reply for unknown id");
        }
        known
    }
}

fn identity(prefix: &str, connection: u64, channel: u64) -> String {
    format!("{prefix}-{}-{connection}-{channel}", std::process::id())
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
