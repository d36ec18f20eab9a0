//! Tool-tip pixel stream.
//!
//! The tracker streams `u v` lines; only the most recent pixel matters, so
//! the feed is a [`tokio::sync::watch`] channel. [`pixel_channel`] returns
//! the writing half ([`PixelFeed`]) and a [`WatchPixels`] reader implementing
//! [`PixelSource`], whose non-blocking poll yields the latest pixel received
//! since the previous poll and `None` otherwise.

use std::net::SocketAddr;

use karma_hal::PixelSource;
use karma_types::{KarmaError, Pixel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Writing half of the pixel feed.
#[derive(Clone)]
pub struct PixelFeed {
    tx: watch::Sender<Option<Pixel>>,
}

impl PixelFeed {
    /// Publish a new observation, replacing any unread one.
    pub fn publish(&self, pixel: Pixel) {
        self.tx.send_replace(Some(pixel));
    }
}

/// Reading half of the pixel feed.
pub struct WatchPixels {
    rx: watch::Receiver<Option<Pixel>>,
}

impl PixelSource for WatchPixels {
    fn poll(&mut self) -> Option<Pixel> {
        match self.rx.has_changed() {
            Ok(true) => *self.rx.borrow_and_update(),
            _ => None,
        }
    }
}

/// A connected feed/source pair with no observation yet.
pub fn pixel_channel() -> (PixelFeed, WatchPixels) {
    let (tx, rx) = watch::channel(None);
    (PixelFeed { tx }, WatchPixels { rx })
}

/// Parse a `u v [...]` line. Fewer than two numbers is not an observation.
pub fn parse_pixel(line: &str) -> Option<Pixel> {
    let mut it = line.split_whitespace().map(str::parse::<f64>);
    match (it.next(), it.next()) {
        (Some(Ok(u)), Some(Ok(v))) => Some(Pixel::new(u, v)),
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// VisionServer
// ────────────────────────────────────────────────────────────────────────────

/// TCP listener forwarding every pixel line into a [`PixelFeed`].
pub struct VisionServer {
    listener: TcpListener,
    feed: PixelFeed,
}

impl VisionServer {
    /// Bind the vision port.
    ///
    /// # Errors
    ///
    /// Returns [`KarmaError::Io`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, feed: PixelFeed) -> Result<Self, KarmaError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| KarmaError::Io(format!("vision bind error on {addr}: {e}")))?;
        Ok(Self { listener, feed })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, KarmaError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept trackers forever.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "vision port listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let feed = self.feed.clone();
                    tokio::spawn(async move {
                        if let Err(e) = stream_pixels(stream, feed).await {
                            warn!(%peer, error = %e, "vision stream closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "vision accept error"),
            }
        }
    }
}

async fn stream_pixels(stream: TcpStream, feed: PixelFeed) -> Result<(), KarmaError> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_pixel(&line) {
            Some(px) => feed.publish(px),
            None => debug!(line = %line, "ignoring malformed pixel line"),
        }
    }
    Ok(())
}
