//! Status text and the per-monitor bar state handed to the bar renderer.

use std::fmt;

use crate::tag::TagMask;

/// Bytes 0x01..=0x08 in the status text switch the colour of what follows.
const MAX_COLOUR_MARKER: u8 = 0x08;

/// Split status text into (colour index, text) runs. Text before the first
/// marker uses colour 0.
pub fn segments(status: &str) -> Vec<(u8, &str)> {
    let mut out = vec![];
    let mut colour = 0;
    let mut start = 0;
    for (i, b) in status.bytes().enumerate() {
        if (1..=MAX_COLOUR_MARKER).contains(&b) {
            if i > start {
                out.push((colour, &status[start..i]));
            }
            colour = b - 1;
            start = i + 1;
        }
    }
    if start < status.len() {
        out.push((colour, &status[start..]));
    }
    out
}

/// Everything a bar shows for one monitor.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BarContent {
    pub workspace: usize,
    pub views: [TagMask; 2],
    /// Tags held by at least one client of the monitor
    pub occupied: TagMask,
    pub urgent: TagMask,
    pub layout_symbol: String,
    pub title: Option<String>,
    /// Only the selected monitor carries the status text
    pub status: Option<String>,
}

/// One line per bar: workspace, view and tag masks, layout symbol, then the
/// title and the status runs, tab separated. Each status run is written as
/// `^c<colour>^<text>` so renderers never see the raw marker bytes.
impl fmt::Display for BarContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:#x} {:#x} {:#x} {:#x} {}\t{}\t",
            self.workspace,
            self.views[0],
            self.views[1],
            self.occupied,
            self.urgent,
            self.layout_symbol,
            self.title.as_deref().unwrap_or(""),
        )?;
        for (colour, text) in segments(self.status.as_deref().unwrap_or("")) {
            write!(f, "^c{}^{}", colour, text)?;
        }
        Ok(())
    }
}
