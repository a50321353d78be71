//! Terminal output for the active lyric line.

use lyra_core::{ActiveLine, TrackLyrics};
use std::io::Write;
use std::sync::Arc;

/// Marker printed for empty synced lines (instrumental breaks)
const BREAK_MARKER: &str = "♪";

/// Turns [`ActiveLine`] changes into printable lines.
///
/// Remembers which lyrics document it last announced so that a header is
/// printed once per track rather than on every line change.
#[derive(Default)]
pub struct LinePrinter {
    shown: Option<Arc<TrackLyrics>>,
}

impl LinePrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for a change reported by the sync engine
    pub fn format(&mut self, active: &ActiveLine) -> Vec<String> {
        let mut out = Vec::new();

        if !same_document(self.shown.as_ref(), active.lyrics.as_ref()) {
            self.shown.clone_from(&active.lyrics);
            if let Some(lyrics) = &active.lyrics {
                out.extend(header(lyrics));
            }
        }

        if let (Some(line), Some(position_ms)) = (active.line(), active.position_ms) {
            let text = if line.text.trim().is_empty() {
                BREAK_MARKER
            } else {
                line.text.as_str()
            };
            out.push(format!("{} {}", format_timestamp(position_ms), text));
        }

        out
    }

    /// Format and write to stdout
    pub fn print(&mut self, active: &ActiveLine) {
        let lines = self.format(active);
        if lines.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        for line in lines {
            // A closed stdout is not worth stopping the render loop for
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();
    }
}

fn same_document(a: Option<&Arc<TrackLyrics>>, b: Option<&Arc<TrackLyrics>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn header(lyrics: &TrackLyrics) -> Vec<String> {
    if lyrics.synced.is_empty() {
        let mut out = vec![format!(
            "-- plain lyrics from {} (no timing available) --",
            lyrics.lyrics.source
        )];
        out.extend(lyrics.lyrics.plain.lines().map(str::to_string));
        out
    } else {
        vec![format!(
            "-- {} synced lines from {} --",
            lyrics.synced.len(),
            lyrics.lyrics.source
        )]
    }
}

/// `mm:ss` for a position in milliseconds
#[must_use]
pub fn format_timestamp(position_ms: u64) -> String {
    let total_secs = position_ms / 1000;
    format!("[{:02}:{:02}]", total_secs / 60, total_secs % 60)
}
