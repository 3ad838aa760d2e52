//! Unix socket listener.
//!
//! Alternative transport for agents that can reach the host over a local
//! socket. Each connection carries one request frame and gets one reply
//! frame, resolved through the same broker logic as exchange files.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use parley_core::exchange::{PermissionResponseRecord, QuestionResponseRecord};
use parley_core::frame::{RequestFrame, ResponseFrame};

use super::broker::PermissionBroker;
use super::pending::Transport;
use super::types::BrokerError;

/// Serves request frames over a Unix domain socket.
pub struct SocketServer {
    broker: Arc<PermissionBroker>,
    path: PathBuf,
    listener: UnixListener,
}

impl SocketServer {
    /// Bind the socket, replacing a stale one left by a previous host.
    pub fn bind(broker: Arc<PermissionBroker>, path: &Path) -> Result<Self, BrokerError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        info!(path = %path.display(), "Permission socket listening");
        Ok(Self {
            broker,
            path: path.to_path_buf(),
            listener,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until shutdown, then remove the socket file.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let broker = Arc::clone(&self.broker);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, broker).await {
                                warn!(error = %e, "Socket request failed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Socket accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(error = %e, "Socket file already gone");
        }
        info!("Permission socket closed");
    }
}

async fn handle_connection(
    stream: UnixStream,
    broker: Arc<PermissionBroker>,
) -> Result<(), BrokerError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    // A malformed frame closes the connection unanswered; the agent fails closed.
    let request: RequestFrame = serde_json::from_str(line.trim())?;
    debug!(
        request_id = request.request_id(),
        kind = %request.kind().as_str(),
        "Socket request received"
    );

    let response = resolve(&broker, request).await;
    let mut output = serde_json::to_string(&response)?;
    output.push('\n');
    writer.write_all(output.as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

async fn resolve(broker: &Arc<PermissionBroker>, request: RequestFrame) -> ResponseFrame {
    let kind = request.kind();
    let response = match request {
        RequestFrame::Permission(record) => broker
            .resolve_permission(record, Transport::Socket)
            .await
            .map(|decision| {
                ResponseFrame::Permission(PermissionResponseRecord {
                    allow: decision.is_allow(),
                })
            }),
        RequestFrame::Question(record) => broker
            .resolve_questions(record, Transport::Socket)
            .await
            .map(|answers| ResponseFrame::Question(QuestionResponseRecord { answers })),
        RequestFrame::Plan(record) => broker
            .resolve_plan(record, Transport::Socket)
            .await
            .map(|verdict| ResponseFrame::Plan(verdict.into())),
    };
    response.unwrap_or_else(|| ResponseFrame::fail_closed(kind))
}
