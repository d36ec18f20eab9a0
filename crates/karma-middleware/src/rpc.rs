//! TCP adapters for the command and stop ports.
//!
//! Both ports speak newline-delimited text. The command port parses each
//! line into a [`Command`], hands it to a [`CommandHandler`] on the blocking
//! pool (handlers drive motion and may block for seconds) and writes the
//! [`Reply`] back. Commands from all clients run one at a time, in arrival
//! order; a client whose command arrives mid-action waits for its turn. The
//! stop port ignores content: any line raises the [`StopSignal`].

use std::net::SocketAddr;
use std::sync::Arc;

use karma_types::KarmaError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::protocol::{Command, Reply};

/// Executes parsed commands. Called from a blocking thread.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: Command) -> Reply;
}

/// Receiver of out-of-band stop requests.
pub trait StopSignal: Send + Sync {
    fn raise(&self);
}

async fn bind(addr: SocketAddr, port: &str) -> Result<TcpListener, KarmaError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| KarmaError::Io(format!("{port} bind error on {addr}: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// RpcServer
// ────────────────────────────────────────────────────────────────────────────

/// The command port.
pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<dyn CommandHandler>,
    /// Held while a command runs.
    dispatch: Arc<Mutex<()>>,
    quit: Arc<Notify>,
}

impl RpcServer {
    /// Bind the command port.
    ///
    /// # Errors
    ///
    /// Returns [`KarmaError::Io`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn CommandHandler>) -> Result<Self, KarmaError> {
        Ok(Self {
            listener: bind(addr, "rpc").await?,
            handler,
            dispatch: Arc::new(Mutex::new(())),
            quit: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, KarmaError> {
        Ok(self.listener.local_addr()?)
    }

    /// Notified once a client has been answered `bye`.
    pub fn quit_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.quit)
    }

    /// Serve clients until one of them sends `quit`.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "rpc port listening");
        }
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&self.handler);
                        let dispatch = Arc::clone(&self.dispatch);
                        let quit = Arc::clone(&self.quit);
                        tokio::spawn(async move {
                            if let Err(e) = serve_commands(stream, handler, dispatch, quit).await {
                                warn!(%peer, error = %e, "rpc client error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "rpc accept error"),
                },
                _ = self.quit.notified() => {
                    info!("rpc port closing on quit");
                    // Let other waiters (e.g. main) see it too.
                    self.quit.notify_one();
                    return;
                }
            }
        }
    }
}

async fn serve_commands(
    stream: TcpStream,
    handler: Arc<dyn CommandHandler>,
    dispatch: Arc<Mutex<()>>,
    quit: Arc<Notify>,
) -> Result<(), KarmaError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        let reply = match Command::parse(&line) {
            Some(command) => {
                debug!(?command, "rpc request");
                let _turn = dispatch.lock().await;
                let handler = Arc::clone(&handler);
                tokio::task::spawn_blocking(move || handler.handle(command))
                    .await
                    .map_err(|e| KarmaError::Io(format!("command handler panicked: {e}")))?
            }
            None => {
                debug!(line = %line, "unrecognised rpc request");
                Reply::Empty
            }
        };

        write.write_all(format!("{reply}\n").as_bytes()).await?;
        write.flush().await?;

        if reply == Reply::Bye {
            quit.notify_one();
            break;
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// StopServer
// ────────────────────────────────────────────────────────────────────────────

/// The stop port.
pub struct StopServer {
    listener: TcpListener,
    signal: Arc<dyn StopSignal>,
}

impl StopServer {
    /// Bind the stop port.
    ///
    /// # Errors
    ///
    /// Returns [`KarmaError::Io`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, signal: Arc<dyn StopSignal>) -> Result<Self, KarmaError> {
        Ok(Self {
            listener: bind(addr, "stop").await?,
            signal,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, KarmaError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept stop clients forever.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "stop port listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let signal = Arc::clone(&self.signal);
                    tokio::spawn(async move {
                        if let Err(e) = relay_stops(stream, signal).await {
                            warn!(%peer, error = %e, "stop client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "stop accept error"),
            }
        }
    }
}

async fn relay_stops(stream: TcpStream, signal: Arc<dyn StopSignal>) -> Result<(), KarmaError> {
    let mut lines = BufReader::new(stream).lines();
    while lines.next_line().await?.is_some() {
        info!("stop requested");
        let signal = Arc::clone(&signal);
        tokio::task::spawn_blocking(move || signal.raise())
            .await
            .map_err(|e| KarmaError::Io(format!("stop handler panicked: {e}")))?;
    }
    Ok(())
}
