//! Trait abstraction for datagram sockets to enable testing

use async_trait::async_trait;
use std::io;
use tokio::net::UdpSocket;

/// Address the production socket binds to (any interface, ephemeral port)
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";

/// Trait for datagram send operations
#[async_trait]
pub trait DatagramIO: Send {
    /// Send one datagram to `host:port`
    async fn send_to(&mut self, payload: &[u8], host: &str, port: u16) -> io::Result<usize>;
}

/// Creates datagram handles on demand
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new handle
    async fn connect(&self) -> io::Result<Box<dyn DatagramIO>>;
}

/// Wrapper around tokio::net::UdpSocket that implements DatagramIO
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl DatagramIO for UdpTransport {
    async fn send_to(&mut self, payload: &[u8], host: &str, port: u16) -> io::Result<usize> {
        self.socket.send_to(payload, (host, port)).await
    }
}

/// Binds an unconnected UDP socket per connect call
#[derive(Debug, Clone)]
pub struct UdpConnector {
    bind_addr: String,
}

impl UdpConnector {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }
}

impl Default for UdpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BIND_ADDR)
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(&self) -> io::Result<Box<dyn DatagramIO>> {
        let socket = UdpSocket::bind(&self.bind_addr).await?;
        Ok(Box::new(UdpTransport::new(socket)))
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// One datagram captured by the mock network
    #[derive(Debug, Clone, PartialEq)]
    pub struct SentDatagram {
        pub host: String,
        pub port: u16,
        pub payload: Vec<u8>,
    }

    impl SentDatagram {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.payload).into_owned()
        }
    }

    /// Mock network for testing
    ///
    /// Acts as the connector; every socket it hands out records into the
    /// same shared log.
    #[derive(Clone, Default)]
    pub struct MockNetwork {
        pub sent: Arc<Mutex<Vec<SentDatagram>>>,
        pub connects: Arc<Mutex<usize>>,
        pub send_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub connect_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_sent(&self) -> Vec<SentDatagram> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_commands(&self) -> Vec<String> {
            self.get_sent().iter().map(SentDatagram::text).collect()
        }

        pub fn connect_count(&self) -> usize {
            *self.connects.lock().unwrap()
        }

        pub fn set_send_error(&self, error: Option<io::ErrorKind>) {
            *self.send_error.lock().unwrap() = error;
        }

        pub fn set_connect_error(&self, error: Option<io::ErrorKind>) {
            *self.connect_error.lock().unwrap() = error;
        }
    }

    struct MockSocket {
        network: MockNetwork,
    }

    #[async_trait]
    impl DatagramIO for MockSocket {
        async fn send_to(&mut self, payload: &[u8], host: &str, port: u16) -> io::Result<usize> {
            if let Some(error) = *self.network.send_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock send error"));
            }
            self.network.sent.lock().unwrap().push(SentDatagram {
                host: host.to_string(),
                port,
                payload: payload.to_vec(),
            });
            Ok(payload.len())
        }
    }

    #[async_trait]
    impl Connector for MockNetwork {
        async fn connect(&self) -> io::Result<Box<dyn DatagramIO>> {
            if let Some(error) = *self.connect_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock connect error"));
            }
            *self.connects.lock().unwrap() += 1;
            Ok(Box::new(MockSocket {
                network: self.clone(),
            }))
        }
    }
}
