//! Tool-tip pixel feed.

use karma_types::Pixel;

/// Non-blocking source of tool-tip observations.
///
/// `poll` never waits: `None` simply means no new observation arrived since
/// the previous poll.
pub trait PixelSource: Send {
    fn poll(&mut self) -> Option<Pixel>;
}
