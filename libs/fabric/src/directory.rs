//! Device name to server endpoint resolution
//!
//! The directory answers one line per device, either
//!
//! ```text
//! <device> *NOT_BOUND*
//! <device> <server> rda3://<n>#Address:#string#18#tcp:%2F%2Fhost:1234#...
//! ```
//!
//! where each descriptor is a protocol tag followed by `key:#type#length#value`
//! groups with percent-encoded values. Talking to the directory server itself
//! is left to implementations of [`DirectoryResolver`].

use std::collections::HashMap;
use std::net::SocketAddr;

use percent_encoding::percent_decode_str;
use tracing::debug;
use url::{Host, Url};

use crate::error::{Error, Result};

const NOT_BOUND: &str = "*NOT_BOUND*";

/// One way of reaching a device's server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDescriptor {
    pub server: String,
    pub protocol: String,
    /// Attribute keys without their trailing ':'
    pub attributes: Vec<(String, String)>,
}

impl ServerDescriptor {
    /// Parse a `proto://n#key:#type#len#value...` descriptor
    pub fn parse(server: &str, descriptor: &str) -> Result<Self> {
        let malformed = |reason: &str| {
            Error::Custom(format!("Malformed server descriptor '{descriptor}': {reason}"))
        };

        let (protocol, rest) = descriptor
            .split_once("://")
            .ok_or_else(|| malformed("missing protocol"))?;
        let mut parts = rest.split('#');
        parts
            .next()
            .and_then(|count| count.parse::<usize>().ok())
            .ok_or_else(|| malformed("missing field count"))?;

        let fields: Vec<&str> = parts.collect();
        if fields.len() % 4 != 0 {
            return Err(malformed("incomplete attribute"));
        }
        let attributes = fields
            .chunks(4)
            .map(|chunk| -> Result<(String, String)> {
                let key = chunk[0].trim_end_matches(':').to_string();
                let value = percent_decode_str(chunk[3])
                    .decode_utf8()
                    .map_err(|_| malformed("value is not UTF-8 once decoded"))?;
                Ok((key, value.into_owned()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            server: server.to_string(),
            protocol: protocol.to_string(),
            attributes,
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `Address:` endpoint, e.g. `tcp://host:1234`
    pub fn address(&self) -> Option<&str> {
        self.attribute("Address")
    }

    /// The `Address:` endpoint parsed as a URL
    pub fn endpoint(&self) -> Option<Url> {
        self.address().and_then(|address| Url::parse(address).ok())
    }
}

/// Maps device names to the servers hosting them
///
/// Unbound devices map to an empty list.
#[async_trait::async_trait]
pub trait DirectoryResolver: Send + Sync {
    async fn resolve(&self, devices: &[&str]) -> Result<HashMap<String, Vec<ServerDescriptor>>>;
}

/// Fixed directory, typically loaded from a saved directory reply
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: HashMap<String, Vec<ServerDescriptor>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: impl Into<String>, servers: Vec<ServerDescriptor>) {
        self.entries.insert(device.into(), servers);
    }

    /// Load every non-empty line of a directory reply
    pub fn from_reply(reply: &str) -> Result<Self> {
        let mut directory = Self::new();
        for line in reply.lines().filter(|l| !l.trim().is_empty()) {
            let (device, servers) = parse_line(line)?;
            directory.insert(device, servers);
        }
        Ok(directory)
    }
}

#[async_trait::async_trait]
impl DirectoryResolver for StaticDirectory {
    async fn resolve(&self, devices: &[&str]) -> Result<HashMap<String, Vec<ServerDescriptor>>> {
        devices
            .iter()
            .map(|device| match self.entries.get(*device) {
                Some(servers) => Ok((device.to_string(), servers.clone())),
                None => Err(Error::Resolve {
                    device: device.to_string(),
                    reason: "unknown device".to_string(),
                }),
            })
            .collect()
    }
}

/// Parse one directory reply line into a device and its servers
pub fn parse_line(line: &str) -> Result<(String, Vec<ServerDescriptor>)> {
    let mut tokens = line.split_whitespace();
    let device = tokens
        .next()
        .ok_or_else(|| Error::Custom("Empty directory line".to_string()))?
        .to_string();
    let server = match tokens.next() {
        Some(NOT_BOUND) | None => return Ok((device, Vec::new())),
        Some(server) => server,
    };

    let servers = tokens
        .map(|descriptor| ServerDescriptor::parse(server, descriptor))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::Resolve {
            device: device.clone(),
            reason: e.to_string(),
        })?;
    Ok((device, servers))
}

/// Resolve `device` and pick the first server with a usable `tcp://` address
pub async fn resolve_endpoint<R>(resolver: &R, device: &str) -> Result<SocketAddr>
where
    R: DirectoryResolver + ?Sized,
{
    let resolve_error = |reason: &str| Error::Resolve {
        device: device.to_string(),
        reason: reason.to_string(),
    };

    let mut resolved = resolver.resolve(&[device]).await?;
    let servers = resolved.remove(device).unwrap_or_default();
    if servers.is_empty() {
        return Err(resolve_error("device is not bound to a server"));
    }

    let endpoint = servers
        .iter()
        .filter_map(ServerDescriptor::endpoint)
        .find(|url| url.scheme() == "tcp")
        .ok_or_else(|| resolve_error("no tcp endpoint among the server descriptors"))?;
    let port = endpoint
        .port()
        .ok_or_else(|| resolve_error("endpoint has no port"))?;
    debug!(device, %endpoint, "resolved device");

    let addr = match endpoint.host() {
        Some(Host::Ipv4(ip)) => SocketAddr::from((ip, port)),
        Some(Host::Ipv6(ip)) => SocketAddr::from((ip, port)),
        Some(Host::Domain(name)) => {
            let found = tokio::net::lookup_host((name, port)).await?.next();
            found.ok_or_else(|| resolve_error("endpoint host has no address"))?
        }
        None => return Err(resolve_error("endpoint has no host")),
    };
    Ok(addr)
}
