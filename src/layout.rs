//! Pure arrangement functions.
//!
//! A layout takes the visible tiled clients of a monitor (in creation order)
//! together with the active workspace's view parameters and produces target
//! rectangles. Nothing here touches focus, tags or the X server.

use xcb::Window;

use crate::{geometry::Rectangle, tag::TagMask};

/// How the slots of one region are laid out.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Stacking {
    /// Slots are stacked top to bottom, each spanning the region width
    Vertical,
    /// Slots sit side by side, each spanning the region height
    Horizontal,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LayoutKind {
    /// Primary (view 0) region on the left, secondary (view 1) on the right
    Tile { primary: Stacking, secondary: Stacking },
    /// Every tiled client covers the whole work area
    Monocle,
    /// Geometry is left to the clients and interactive operations
    Floating,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Layout {
    pub symbol: &'static str,
    pub kind: LayoutKind,
}

/// The workspace state a tiling arrangement depends on.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct TileParams {
    pub views: [TagMask; 2],
    /// Slot caps of the two regions, 0 meaning unlimited
    pub caps: [u32; 2],
    /// Share of the work width given to the primary region
    pub vf: f32,
}

/// A visible, tiled client as seen by a layout.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Tiled {
    pub id: Window,
    pub tags: TagMask,
    pub border: u32,
}

/// The outcome of running a layout.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Arrangement {
    /// Client area (border already removed) for each placed client
    pub placements: Vec<(Window, Rectangle)>,
    pub symbol: String,
}

impl Layout {
    pub const fn new(symbol: &'static str, kind: LayoutKind) -> Layout {
        Layout { symbol, kind }
    }

    /// False for the floating passthrough layout.
    pub fn arranges(&self) -> bool {
        self.kind != LayoutKind::Floating
    }

    /// Run the layout over `clients`. `n_visible` counts every visible client
    /// on the monitor, floating ones included, and feeds the monocle symbol.
    pub fn arrange(
        &self,
        params: &TileParams,
        work: Rectangle,
        clients: &[Tiled],
        n_visible: usize,
    ) -> Arrangement {
        match self.kind {
            LayoutKind::Tile { primary, secondary } => Arrangement {
                placements: tile(params, work, clients, [primary, secondary]),
                symbol: self.symbol.to_string(),
            },
            LayoutKind::Monocle => Arrangement {
                placements: clients
                    .iter()
                    .map(|c| (c.id, work.shrink_by_border(c.border)))
                    .collect(),
                symbol: if n_visible > 0 {
                    format!("[{}]", n_visible)
                } else {
                    self.symbol.to_string()
                },
            },
            LayoutKind::Floating => Arrangement {
                placements: vec![],
                symbol: self.symbol.to_string(),
            },
        }
    }
}

fn tile(
    params: &TileParams,
    work: Rectangle,
    clients: &[Tiled],
    stacking: [Stacking; 2],
) -> Vec<(Window, Rectangle)> {
    let mut regions: [Vec<&Tiled>; 2] = [vec![], vec![]];
    for c in clients {
        if c.tags & params.views[0] != 0 {
            regions[0].push(c);
        } else if c.tags & params.views[1] != 0 {
            regions[1].push(c);
        }
    }

    let primary_w = if regions[0].is_empty() {
        0
    } else if regions[1].is_empty() {
        work.w
    } else {
        (work.w as f32 * params.vf) as u32
    };
    let areas = [
        Rectangle::new(work.x, work.y, primary_w, work.h),
        Rectangle::new(work.x + primary_w as i32, work.y, work.w - primary_w, work.h),
    ];

    let mut placements = Vec::with_capacity(clients.len());
    for (i, region) in regions.iter().enumerate() {
        let slots = split(areas[i], stacking[i], region.len(), params.caps[i]);
        for (c, r) in region.iter().zip(slots) {
            placements.push((c.id, r.shrink_by_border(c.border)));
        }
    }
    placements
}

/// Divide `area` into `n` rectangles. With a non-zero cap only `cap` distinct
/// slots exist and every client past the cap lands on the last one. The last
/// slot absorbs the division remainder.
fn split(area: Rectangle, stacking: Stacking, n: usize, cap: u32) -> Vec<Rectangle> {
    if n == 0 {
        return vec![];
    }
    let slots = if cap > 0 { n.min(cap as usize) } else { n } as u32;
    let extent = match stacking {
        Stacking::Vertical => area.h,
        Stacking::Horizontal => area.w,
    };
    let size = extent / slots;

    (0..n as u32)
        .map(|i| {
            let slot = i.min(slots - 1);
            let offset = slot * size;
            let len = if slot == slots - 1 { extent - offset } else { size };
            match stacking {
                Stacking::Vertical => Rectangle::new(area.x, area.y + offset as i32, area.w, len),
                Stacking::Horizontal => Rectangle::new(area.x + offset as i32, area.y, len, area.h),
            }
        })
        .collect()
}
