use std::net::SocketAddr;

use {
    async_trait::async_trait,
    tokio::{net::UdpSocket, sync::OnceCell},
    tracing::{debug, error},
};

use crate::{Error, Result, Sink};

/// Sends all lines as one newline-joined datagram to every configured host.
pub struct UdpSink {
    hosts: Vec<String>,
    port: u16,
    max_chars: usize,
    v4: OnceCell<UdpSocket>,
    v6: OnceCell<UdpSocket>,
}

impl UdpSink {
    pub fn new(hosts: Vec<String>, port: u32, max_chars: usize) -> Result<Self> {
        let port = u16::try_from(port).map_err(|_| Error::InvalidPort {
            field: "udp_port",
            value: port,
        })?;
        Ok(Self {
            hosts,
            port,
            max_chars,
            v4: OnceCell::new(),
            v6: OnceCell::new(),
        })
    }

    async fn socket_for(&self, addr: &SocketAddr) -> std::io::Result<&UdpSocket> {
        if addr.is_ipv4() {
            self.v4
                .get_or_try_init(|| UdpSocket::bind("0.0.0.0:0"))
                .await
        } else {
            self.v6.get_or_try_init(|| UdpSocket::bind("[::]:0")).await
        }
    }

    async fn send_to_host(&self, host: &str, payload: &[u8]) -> std::io::Result<()> {
        let addr = tokio::net::lookup_host((host, self.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no address")
            })?;
        let socket = self.socket_for(&addr).await?;
        socket.send_to(payload, addr).await?;
        Ok(())
    }
}

/// Truncate each line to `max_chars` characters and join with `\n`.
#[must_use]
pub fn render_payload(lines: &[String], max_chars: usize) -> String {
    lines
        .iter()
        .map(|line| match line.char_indices().nth(max_chars) {
            Some((idx, _)) => &line[..idx],
            None => line.as_str(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Sink for UdpSink {
    fn name(&self) -> &'static str {
        "udp"
    }

    async fn send(&self, lines: &[String]) -> Result<()> {
        let payload = render_payload(lines, self.max_chars);
        let mut failures = 0;
        let mut last_error = None;
        for host in &self.hosts {
            match self.send_to_host(host, payload.as_bytes()).await {
                Ok(()) => debug!(host, port = self.port, bytes = payload.len(), "datagram sent"),
                Err(e) => {
                    error!(host, port = self.port, error = %e, "UDP send failed");
                    failures += 1;
                    last_error = Some(e);
                },
            }
        }
        // Partial delivery counts as success.
        match last_error {
            Some(last) if failures == self.hosts.len() => Err(Error::AllHostsFailed {
                hosts: failures,
                last,
            }),
            _ => Ok(()),
        }
    }
}
