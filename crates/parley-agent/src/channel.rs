//! Request channels.
//!
//! A channel delivers one request frame to the host and waits for the reply.
//! [`FileChannel`] speaks the exchange-directory protocol; [`SocketChannel`]
//! sends the same frames over a Unix domain socket.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use parley_core::config::Config;
use parley_core::exchange::ExchangeDir;
use parley_core::frame::{RequestFrame, ResponseFrame};

use crate::error::EmitterError;

/// Delivers a request and waits up to `timeout` for its response.
pub trait RequestChannel: Send + Sync {
    fn round_trip(
        &self,
        request: RequestFrame,
        timeout: Duration,
    ) -> impl Future<Output = Result<ResponseFrame, EmitterError>> + Send;
}

/// Exchange-directory channel: write the request, poll for the response.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: ExchangeDir,
    poll_interval: Duration,
}

impl FileChannel {
    pub const fn new(dir: ExchangeDir, poll_interval: Duration) -> Self {
        Self { dir, poll_interval }
    }

    pub const fn dir(&self) -> &ExchangeDir {
        &self.dir
    }

    async fn discard(&self, file_name: &str) {
        if let Err(e) = self.dir.remove(file_name).await {
            warn!(file = file_name, error = %e, "Failed to remove exchange record");
        }
    }
}

impl RequestChannel for FileChannel {
    async fn round_trip(
        &self,
        request: RequestFrame,
        timeout: Duration,
    ) -> Result<ResponseFrame, EmitterError> {
        let kind = request.kind();
        let id = request.request_id().to_string();
        let request_name = kind.request_file_name(&id);
        let response_name = kind.response_file_name(&id);

        if let Err(e) = request.write_to(&self.dir).await {
            self.discard(&request_name).await;
            return Err(EmitterError::Write(e));
        }
        debug!(request_id = %id, kind = kind.as_str(), "Request written");

        let deadline = Instant::now() + timeout;
        loop {
            match ResponseFrame::read_from(&self.dir, kind, &id).await {
                Ok(Some(response)) => {
                    self.discard(&response_name).await;
                    return Ok(response);
                }
                Ok(None) => {}
                Err(e) => {
                    self.discard(&response_name).await;
                    self.discard(&request_name).await;
                    return Err(EmitterError::Malformed(e.to_string()));
                }
            }
            if Instant::now() >= deadline {
                // Nobody claimed it; take it back so a late host never acts on it.
                self.discard(&request_name).await;
                return Err(EmitterError::Timeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Unix socket channel: one request line out, one reply line back.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct SocketChannel {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl SocketChannel {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn exchange(&self, request: &RequestFrame) -> Result<ResponseFrame, EmitterError> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let stream = tokio::net::UnixStream::connect(&self.path).await?;
        let (read, mut write) = stream.into_split();

        let mut line =
            serde_json::to_string(request).map_err(|e| EmitterError::Write(e.into()))?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;
        write.flush().await?;

        let mut reader = BufReader::new(read);
        let mut reply = String::new();
        if reader.read_line(&mut reply).await? == 0 {
            return Err(EmitterError::Malformed(
                "connection closed without a reply".into(),
            ));
        }
        serde_json::from_str(&reply).map_err(|e| EmitterError::Malformed(e.to_string()))
    }
}

#[cfg(unix)]
impl RequestChannel for SocketChannel {
    async fn round_trip(
        &self,
        request: RequestFrame,
        timeout: Duration,
    ) -> Result<ResponseFrame, EmitterError> {
        tokio::time::timeout(timeout, self.exchange(&request))
            .await
            .map_err(|_| EmitterError::Timeout(timeout))?
    }
}

/// Channel chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyChannel {
    File(FileChannel),
    #[cfg(unix)]
    Socket(SocketChannel),
}

impl AnyChannel {
    /// The socket channel when enabled in `config`, else the file channel.
    pub fn from_config(config: &Config) -> parley_core::Result<Self> {
        let dir = config.exchange.open_dir()?;
        #[cfg(unix)]
        if config.exchange.socket_enabled {
            return Ok(Self::Socket(SocketChannel::new(
                config.exchange.socket_path(&dir),
            )));
        }
        Ok(Self::File(FileChannel::new(
            dir,
            config.exchange.emitter_poll_interval(),
        )))
    }
}

impl RequestChannel for AnyChannel {
    async fn round_trip(
        &self,
        request: RequestFrame,
        timeout: Duration,
    ) -> Result<ResponseFrame, EmitterError> {
        match self {
            Self::File(channel) => channel.round_trip(request, timeout).await,
            #[cfg(unix)]
            Self::Socket(channel) => channel.round_trip(request, timeout).await,
        }
    }
}
