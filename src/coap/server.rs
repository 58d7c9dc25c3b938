//! UDP service loop.
//!
//! One datagram is decoded, dispatched and answered before the next one is
//! read, so the dispatcher never sees overlapping requests.

use super::message::{Code, Message, MessageType};
use crate::actuator::Actuator;
use crate::clock::Clock;
use crate::dispatch::{Dispatcher, Reply, Request};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Default receive buffer: the RFC 7252 recommended upper bound for a
/// datagram (1024-byte payload plus header and options).
pub const DEFAULT_MAX_DATAGRAM: usize = 1152;

pub struct CoapServer<A: Actuator, C: Clock> {
    socket: UdpSocket,
    dispatcher: Dispatcher<A, C>,
    next_message_id: u16,
    max_datagram: usize,
}

impl<A: Actuator, C: Clock> CoapServer<A, C> {
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher<A, C>) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind CoAP socket on {addr}"))?;
        Ok(Self::from_socket(socket, dispatcher))
    }

    pub fn from_socket(socket: UdpSocket, dispatcher: Dispatcher<A, C>) -> Self {
        Self {
            socket,
            dispatcher,
            next_message_id: rand::random(),
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }

    pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
        self.max_datagram = max_datagram.max(64);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Dispatcher<A, C> {
        &self.dispatcher
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F: Future<Output = ()>>(mut self, shutdown: F) -> Result<()> {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut buf = vec![0u8; self.max_datagram];

        loop {
            let received = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("CoAP server shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => received,
            };

            let (len, peer) = match received {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("CoAP receive failed: {e}");
                    continue;
                }
            };

            if let Some(reply) = self.handle_datagram(&buf[..len], peer) {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    tracing::warn!(peer = %peer, "CoAP send failed: {e}");
                }
            }
        }
    }

    /// Decode one datagram, dispatch it and encode the reply, if any.
    pub fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let request = match Message::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(peer = %peer, "Dropping malformed datagram: {e}");
                return None;
            }
        };

        let response = match (request.mtype, request.code) {
            (MessageType::Acknowledgement | MessageType::Reset, _) => return None,
            // CoAP ping
            (MessageType::Confirmable, Code::EMPTY) => Message::reset(request.message_id),
            (_, Code::EMPTY) => return None,
            (MessageType::Confirmable, code) if !code.is_request() => {
                tracing::debug!(peer = %peer, code = %code, "Rejecting confirmable non-request");
                Message::reset(request.message_id)
            }
            (_, code) if !code.is_request() => {
                tracing::debug!(peer = %peer, code = %code, "Ignoring non-request message");
                return None;
            }
            (_, code) => self.respond(&request, code, peer),
        };

        match response.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(peer = %peer, "Failed to encode CoAP response: {e}");
                None
            }
        }
    }

    fn respond(&mut self, request: &Message, code: Code, peer: SocketAddr) -> Message {
        let (code, payload) = match code.method() {
            Some(method) => {
                let path = request.uri_path();
                tracing::debug!(peer = %peer, method = %method, path = %path, "CoAP request");
                match self
                    .dispatcher
                    .handle(&Request::new(&path, method, &request.payload))
                {
                    Reply::Content(body) => (Code::CONTENT, body.into_bytes()),
                    Reply::NotFound => (Code::NOT_FOUND, Vec::new()),
                    Reply::MethodNotAllowed => (Code::METHOD_NOT_ALLOWED, Vec::new()),
                }
            }
            None => (Code::METHOD_NOT_ALLOWED, Vec::new()),
        };

        let fresh_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        Message::response_to(request, code, payload, fresh_id)
    }
}
