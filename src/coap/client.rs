//! Minimal confirmable-request client, used by the CLI subcommands and tests.

use super::message::{Code, Message, MessageType};
use super::DEFAULT_PORT;
use crate::dispatch::Method;
use anyhow::{bail, Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout_at, Instant};

/// A response received from the server.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: Code,
    pub payload: Vec<u8>,
}

impl Response {
    /// Payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub struct CoapClient {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
}

impl CoapClient {
    /// Connect to `server` (`host`, `host:port` or an IP literal; the port
    /// defaults to 5683).
    pub async fn connect(server: &str, timeout: Duration) -> Result<Self> {
        let target = with_default_port(server);
        let server = lookup_host(&target)
            .await
            .with_context(|| format!("Failed to resolve {target}"))?
            .next()
            .with_context(|| format!("No address found for {target}"))?;

        let local: SocketAddr = if server.is_ipv4() {
            (IpAddr::from([0u8; 4]), 0).into()
        } else {
            (IpAddr::from([0u16; 8]), 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket
            .connect(server)
            .await
            .with_context(|| format!("Failed to connect UDP socket to {server}"))?;

        Ok(Self {
            socket,
            server,
            timeout,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Send a confirmable request and wait for its response.
    ///
    /// Accepts a piggybacked ACK with the same message ID, or a separate
    /// response carrying the same token (which is acknowledged if
    /// confirmable).
    pub async fn request(&self, method: Method, path: &str, payload: &[u8]) -> Result<Response> {
        let message_id: u16 = rand::random();
        let token = rand::random::<[u8; 4]>().to_vec();
        let request = Message::request(
            MessageType::Confirmable,
            method,
            message_id,
            token.clone(),
            path,
            payload.to_vec(),
        );
        self.socket.send(&request.encode()?).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; super::server::DEFAULT_MAX_DATAGRAM];
        loop {
            let len = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => bail!(
                    "CoAP request timed out after {}ms ({} /{path})",
                    self.timeout.as_millis(),
                    method
                ),
            };
            let Ok(reply) = Message::decode(&buf[..len]) else {
                tracing::debug!("Ignoring malformed datagram from {}", self.server);
                continue;
            };

            match reply.mtype {
                MessageType::Reset if reply.message_id == message_id => {
                    bail!("Server reset the request ({method} /{path})")
                }
                MessageType::Acknowledgement if reply.message_id == message_id => {
                    if reply.code == Code::EMPTY {
                        // Separate response follows.
                        continue;
                    }
                    if reply.token == token {
                        return Ok(Response {
                            code: reply.code,
                            payload: reply.payload,
                        });
                    }
                }
                MessageType::Confirmable | MessageType::NonConfirmable if reply.token == token => {
                    if reply.mtype == MessageType::Confirmable {
                        self.socket
                            .send(&Message::empty_ack(reply.message_id).encode()?)
                            .await?;
                    }
                    return Ok(Response {
                        code: reply.code,
                        payload: reply.payload,
                    });
                }
                _ => {}
            }
        }
    }
}

fn with_default_port(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{DEFAULT_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_applied() {
        assert_eq!(with_default_port("10.0.0.5"), "10.0.0.5:5683");
        assert_eq!(with_default_port("10.0.0.5:7000"), "10.0.0.5:7000");
        assert_eq!(with_default_port("::1"), "[::1]:5683");
        assert_eq!(with_default_port("device.local"), "device.local:5683");
        assert_eq!(with_default_port("device.local:7000"), "device.local:7000");
    }

    #[tokio::test]
    async fn times_out_without_server() {
        // Bound but never answered.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let client = CoapClient::connect(&addr.to_string(), Duration::from_millis(50))
            .await
            .unwrap();
        let err = client.request(Method::Get, "led", b"tok").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn accepts_separate_response() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = device.local_addr().unwrap();
        let client = CoapClient::connect(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();

        let responder = async {
            let mut buf = [0u8; 256];
            let (len, peer) = device.recv_from(&mut buf).await.unwrap();
            let request = Message::decode(&buf[..len]).unwrap();
            let ack = Message::empty_ack(request.message_id);
            device.send_to(&ack.encode().unwrap(), peer).await.unwrap();

            let mut separate = Message::new(MessageType::NonConfirmable, Code::CONTENT, 1);
            separate.token = request.token.clone();
            separate.payload = b"STATE:OFF".to_vec();
            device.send_to(&separate.encode().unwrap(), peer).await.unwrap();
        };

        let (reply, ()) = tokio::join!(client.request(Method::Get, "led", b"tok"), responder);
        assert_eq!(reply.unwrap().text(), "STATE:OFF");
    }
}
