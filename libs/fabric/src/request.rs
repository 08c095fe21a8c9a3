use std::net::SocketAddr;

use cmwlight_core::message::{Message, RequestContext};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Result;

/// Perform a one-off TCP GET
///
/// Connects, runs the handshake, sends the GET and waits for its REPLY or
/// EXCEPTION, then closes the connection. Heartbeats and unrelated traffic
/// are skipped.
pub async fn get_tcp(
    addr: SocketAddr,
    device: &str,
    property: &str,
    context: RequestContext,
    config: ClientConfig,
) -> Result<Message> {
    let mut client = Client::connect_tcp(addr, config).await?;
    let id = client.get(device, property, context).await?;

    let reply = loop {
        match client.receive().await? {
            Some(message) if message.header().is_some_and(|h| h.id == id) => break message,
            _ => continue,
        }
    };

    client.close().await?;
    Ok(reply)
}
