/// Marker that announces a live stream in a channel post.
pub const LIVE_MARKER: &str = "#live";

/// Decides whether a post announces a live stream.
///
/// Plain case-sensitive substring match on [`LIVE_MARKER`]; no other signal
/// is considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamDetector;

impl StreamDetector {
    pub fn is_live_signal(&self, text: &str) -> bool {
        text.contains(LIVE_MARKER)
    }
}
