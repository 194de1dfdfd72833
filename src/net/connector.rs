//! Outbound transport establishment.
//!
//! # Responsibilities
//! - Open TCP (and TLS for https) to an endpoint within the connect timeout
//! - Wrap the transport in a write-stall guard
//! - Run the HTTP/1.1 handshake and spawn the connection driver task

use std::io;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::TransportFailure;
use crate::http::request::{Endpoint, Scheme};
use crate::net::connection::Connection;
use crate::net::tls;
use crate::resilience::timeouts::{within, StallGuard, StallLimit};

/// Any bidirectional byte stream a connection can run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Opens new connections. Cheap to clone.
#[derive(Clone)]
pub struct Connector {
    tls: TlsConnector,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").finish_non_exhaustive()
    }
}

impl Connector {
    pub fn new() -> Result<Self, TransportFailure> {
        let tls = tls::client_connector()
            .map_err(|e| TransportFailure::Connection(format!("TLS setup failed: {e}")))?;
        Ok(Self { tls })
    }

    /// Establish a connection. Only TCP + TLS count against `connect_timeout`.
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Option<Duration>,
    ) -> Result<Connection, TransportFailure> {
        let io = within(connect_timeout, self.open(endpoint), |after| {
            TransportFailure::ConnectTimeout {
                endpoint: endpoint.clone(),
                after,
            }
        })
        .await?;

        let write_stall = StallLimit::default();
        let guarded = StallGuard::new(io, write_stall.clone());
        let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(guarded))
            .await
            .map_err(|e| TransportFailure::Connection(format!("handshake with {endpoint} failed: {e}")))?;

        let connection = Connection::new(endpoint.clone(), sender, write_stall);
        let id = connection.id();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
            } else {
                tracing::trace!(connection_id = %id, "Connection closed");
            }
        });

        tracing::debug!(connection_id = %id, endpoint = %endpoint, "Connection established");
        Ok(connection)
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Io>, TransportFailure> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| connect_failure(endpoint, e))?;
        let _ = tcp.set_nodelay(true);

        match endpoint.scheme {
            Scheme::Http => {
                let io: Box<dyn Io> = Box::new(tcp);
                Ok(io)
            }
            Scheme::Https => {
                let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
                    TransportFailure::Connection(format!("invalid server name {}: {e}", endpoint.host))
                })?;
                let stream = self.tls.connect(server_name, tcp).await.map_err(|e| {
                    TransportFailure::Connection(format!("TLS handshake with {endpoint} failed: {e}"))
                })?;
                let io: Box<dyn Io> = Box::new(stream);
                Ok(io)
            }
        }
    }
}

fn connect_failure(endpoint: &Endpoint, err: io::Error) -> TransportFailure {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => TransportFailure::ConnectionRefused {
            endpoint: endpoint.clone(),
        },
        _ => TransportFailure::Connection(format!("connect to {endpoint} failed: {err}")),
    }
}
