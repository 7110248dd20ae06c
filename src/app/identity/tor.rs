//! Tor control-port client
//!
//! Speaks just enough of the Tor control protocol to authenticate and send
//! `SIGNAL NEWNYM`, which makes Tor use fresh circuits for new connections.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use super::IdentityRotator;
use crate::constants::identity::{CONTROL_TIMEOUT, DEFAULT_CONTROL_ADDR};
use crate::errors::{IdentityError, IdentityResult};

/// Identity rotator backed by a local Tor control port
#[derive(Clone)]
pub struct TorControl {
    addr: String,
    password: Option<String>,
}

impl TorControl {
    /// Create a client for `addr` (`host:port`)
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password,
        }
    }

    /// Control endpoint address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn signal_newnym(&self) -> IdentityResult<()> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| IdentityError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(authenticate_command(self.password.as_deref()).as_bytes())
            .await?;
        expect_ok(&mut reader).await?;

        write_half.write_all(b"SIGNAL NEWNYM\r\n").await?;
        expect_ok(&mut reader).await?;

        // Polite close; errors here do not matter
        let _ = write_half.write_all(b"QUIT\r\n").await;
        Ok(())
    }
}

impl Default for TorControl {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_ADDR, None)
    }
}

impl std::fmt::Debug for TorControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorControl")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl IdentityRotator for TorControl {
    async fn rotate(&self) -> IdentityResult<()> {
        debug!("Requesting new Tor identity via {}", self.addr);
        tokio::time::timeout(CONTROL_TIMEOUT, self.signal_newnym())
            .await
            .map_err(|_| IdentityError::Timeout {
                seconds: CONTROL_TIMEOUT.as_secs(),
            })?
    }
}

fn authenticate_command(password: Option<&str>) -> String {
    match password {
        Some(password) => {
            let escaped = password.replace('\\', "\\\\").replace('"', "\\\"");
            format!("AUTHENTICATE \"{}\"\r\n", escaped)
        }
        None => "AUTHENTICATE\r\n".to_string(),
    }
}

/// Read one reply line and require a `250` status
async fn expect_ok<R>(reader: &mut R) -> IdentityResult<()>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(IdentityError::Rejected {
            reply: "connection closed".to_string(),
        });
    }

    let reply = line.trim_end();
    if reply.starts_with("250") {
        Ok(())
    } else {
        Err(IdentityError::Rejected {
            reply: reply.to_string(),
        })
    }
}
