//! Tor as the anonymizing network
//!
//! Circuits are renewed with `SIGNAL NEWNYM` over the control port, and the
//! current exit address is read from a plain-text IP echo service reached
//! through the HTTP proxy.

use crate::config::{ProxyConfig, TorConfig};
use crate::fetch::build_http_client;
use crate::rotation::RotationError;
use async_trait::async_trait;
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const ADDRESS_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// The anonymizing network as seen by the rotation protocol
#[async_trait]
pub trait ExitNetwork: Send + Sync {
    /// Asks the network for a fresh exit circuit
    async fn renew_exit_circuit(&self) -> Result<(), RotationError>;

    /// Reads the exit address currently visible to target servers
    async fn current_exit_address(&self) -> Result<IpAddr, RotationError>;
}

/// Tor reached through its control port and an HTTP proxy in front of it
pub struct TorNetwork {
    control_addr: String,
    password: String,
    ip_check_url: String,
    client: Client,
    control_timeout: Duration,
}

impl TorNetwork {
    pub fn new(tor: &TorConfig, proxy: &ProxyConfig) -> Result<Self, RotationError> {
        let client = build_http_client(proxy.http_proxy.as_deref(), ADDRESS_CHECK_TIMEOUT)
            .map_err(|e| RotationError::AddressCheck(e.to_string()))?;

        Ok(Self {
            control_addr: format!("{}:{}", tor.control_host, tor.control_port),
            password: tor.password.clone(),
            ip_check_url: tor.ip_check_url.clone(),
            client,
            control_timeout: Duration::from_secs(tor.control_timeout_secs),
        })
    }
}

#[async_trait]
impl ExitNetwork for TorNetwork {
    async fn renew_exit_circuit(&self) -> Result<(), RotationError> {
        let stream = timeout(self.control_timeout, TcpStream::connect(&self.control_addr))
            .await
            .map_err(|_| {
                RotationError::Control(format!("Connecting to {} timed out", self.control_addr))
            })??;
        let (read, write) = stream.into_split();
        let mut control = ControlConnection {
            reader: BufReader::new(read),
            writer: write,
            reply_timeout: self.control_timeout,
        };

        let authenticate = format!("AUTHENTICATE {}", quote(&self.password));
        control.command(&authenticate, "AUTHENTICATE").await?;
        control.command("SIGNAL NEWNYM", "SIGNAL NEWNYM").await?;

        // The reply to QUIT carries nothing we need
        let _ = control.command("QUIT", "QUIT").await;

        tracing::debug!("Requested new Tor circuit via {}", self.control_addr);
        Ok(())
    }

    async fn current_exit_address(&self) -> Result<IpAddr, RotationError> {
        read_address(&self.client, &self.ip_check_url).await
    }
}

/// Looks up the harvester's own address, bypassing the proxy
pub async fn lookup_real_address(ip_check_url: &str) -> Result<IpAddr, RotationError> {
    let client = build_http_client(None, ADDRESS_CHECK_TIMEOUT)
        .map_err(|e| RotationError::AddressCheck(e.to_string()))?;
    read_address(&client, ip_check_url).await
}

async fn read_address(client: &Client, url: &str) -> Result<IpAddr, RotationError> {
    let body = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| RotationError::AddressCheck(e.to_string()))?
        .text()
        .await
        .map_err(|e| RotationError::AddressCheck(e.to_string()))?;

    body.trim()
        .parse()
        .map_err(|_| RotationError::AddressCheck(format!("not an address: {:?}", body.trim())))
}

/// An open control port session
struct ControlConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    reply_timeout: Duration,
}

impl ControlConnection {
    /// Sends one control command and expects a `250` reply
    ///
    /// `label` is what appears in errors, so credentials never end up in logs.
    async fn command(&mut self, command: &str, label: &str) -> Result<(), RotationError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        let read = timeout(self.reply_timeout, self.reader.read_line(&mut reply))
            .await
            .map_err(|_| {
                RotationError::Control(format!(
                    "{}: no reply from Tor within {:?}",
                    label, self.reply_timeout
                ))
            })??;

        if read == 0 {
            return Err(RotationError::Control(format!(
                "{}: connection closed by Tor",
                label
            )));
        }

        if reply.starts_with("250") {
            Ok(())
        } else {
            Err(RotationError::Control(format!(
                "{} rejected: {}",
                label,
                reply.trim_end()
            )))
        }
    }
}

/// Quotes a control protocol string argument
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
