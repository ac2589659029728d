//! Rectangles and the size-hint constraint applied before committing geometry.

/// An x,y coordinate pair
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Point {
    /// An absolute x coordinate relative to the root window
    pub x: i32,
    /// An absolute y coordinate relative to the root window
    pub y: i32,
}

impl Point {
    /// Create a new Point.
    pub fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }
}

/// An X window / screen position: top left corner + extent
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rectangle {
    /// Create a new Rectangle.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Rectangle {
        Rectangle { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    /// Area shared by the two rectangles, zero when they do not overlap.
    pub fn intersection_area(&self, other: &Rectangle) -> u64 {
        let w = (self.right().min(other.right()) - self.x.max(other.x)).max(0);
        let h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0);
        w as u64 * h as u64
    }

    /// Shrink the extent by a border drawn on every side.
    pub fn shrink_by_border(&self, border: u32) -> Rectangle {
        Rectangle {
            x: self.x,
            y: self.y,
            w: self.w.saturating_sub(2 * border),
            h: self.h.saturating_sub(2 * border),
        }
    }
}

// WM_SIZE_HINTS flag bits (ICCCM 4.1.2.3)
const P_MIN_SIZE: u32 = 1 << 4;
const P_MAX_SIZE: u32 = 1 << 5;
const P_RESIZE_INC: u32 = 1 << 6;
const P_ASPECT: u32 = 1 << 7;
const P_BASE_SIZE: u32 = 1 << 8;

/// Normalised WM_NORMAL_HINTS of a client. Absent fields are zero, meaning
/// "unrestricted".
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct SizeHints {
    pub base_w: i32,
    pub base_h: i32,
    pub inc_w: i32,
    pub inc_h: i32,
    pub max_w: i32,
    pub max_h: i32,
    pub min_w: i32,
    pub min_h: i32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl SizeHints {
    /// Decode the raw 32-bit words of a WM_SIZE_HINTS property.
    ///
    /// A short or missing property yields the all-zero hints.
    pub fn from_raw(words: &[u32]) -> SizeHints {
        if words.len() < 18 {
            return SizeHints::default();
        }
        let flags = words[0];
        let field = |i: usize| words[i] as i32;
        let mut hints = SizeHints::default();

        if flags & P_BASE_SIZE != 0 {
            hints.base_w = field(15);
            hints.base_h = field(16);
        } else if flags & P_MIN_SIZE != 0 {
            hints.base_w = field(5);
            hints.base_h = field(6);
        }
        if flags & P_RESIZE_INC != 0 {
            hints.inc_w = field(9);
            hints.inc_h = field(10);
        }
        if flags & P_MAX_SIZE != 0 {
            hints.max_w = field(7);
            hints.max_h = field(8);
        }
        if flags & P_MIN_SIZE != 0 {
            hints.min_w = field(5);
            hints.min_h = field(6);
        } else if flags & P_BASE_SIZE != 0 {
            hints.min_w = field(15);
            hints.min_h = field(16);
        }
        if flags & P_ASPECT != 0 {
            let (min_num, min_den) = (field(11), field(12));
            let (max_num, max_den) = (field(13), field(14));
            if min_num > 0 {
                hints.min_aspect = min_den as f32 / min_num as f32;
            }
            if max_den > 0 {
                hints.max_aspect = max_num as f32 / max_den as f32;
            }
        }
        hints
    }

    /// A window whose minimum and maximum sizes coincide cannot be resized.
    pub fn is_fixed(&self) -> bool {
        self.max_w != 0 && self.max_h != 0 && self.max_w == self.min_w && self.max_h == self.min_h
    }
}

/// The area a requested rectangle is kept inside of.
#[derive(Debug, Clone, Copy)]
pub enum Bounds {
    /// Interactive operations may go anywhere on the whole screen.
    Screen(Rectangle),
    /// Programmatic requests stay on the monitor's work area.
    WorkArea(Rectangle),
}

/// Constrain `req` (client area, border excluded) for a client currently at
/// `current` with border width `border`.
///
/// The position is pulled back on screen, the extent never drops below
/// `min_dim`, and when `honour_hints` is set the ICCCM base/increment/aspect/
/// min/max rules are applied on top.
pub fn apply_size_hints(
    req: Rectangle,
    current: Rectangle,
    border: u32,
    hints: &SizeHints,
    bounds: Bounds,
    min_dim: u32,
    honour_hints: bool,
) -> Rectangle {
    let bw = border as i32;
    let (mut x, mut y) = (req.x, req.y);
    let mut w = (req.w as i32).max(1);
    let mut h = (req.h as i32).max(1);
    let outer_w = current.w as i32 + 2 * bw;
    let outer_h = current.h as i32 + 2 * bw;

    match bounds {
        Bounds::Screen(s) => {
            if x > s.right() {
                x = s.right() - outer_w;
            }
            if y > s.bottom() {
                y = s.bottom() - outer_h;
            }
            if x + w + 2 * bw < s.x {
                x = s.x;
            }
            if y + h + 2 * bw < s.y {
                y = s.y;
            }
        }
        Bounds::WorkArea(a) => {
            if x >= a.right() {
                x = a.right() - outer_w;
            }
            if y >= a.bottom() {
                y = a.bottom() - outer_h;
            }
            if x + w + 2 * bw <= a.x {
                x = a.x;
            }
            if y + h + 2 * bw <= a.y {
                y = a.y;
            }
        }
    }

    let min_dim = min_dim as i32;
    h = h.max(min_dim);
    w = w.max(min_dim);

    if honour_hints {
        let base_is_min = hints.base_w == hints.min_w && hints.base_h == hints.min_h;
        if !base_is_min {
            w -= hints.base_w;
            h -= hints.base_h;
        }
        if hints.min_aspect > 0.0 && hints.max_aspect > 0.0 && w > 0 && h > 0 {
            if hints.max_aspect < w as f32 / h as f32 {
                w = (h as f32 * hints.max_aspect + 0.5) as i32;
            } else if hints.min_aspect < h as f32 / w as f32 {
                h = (w as f32 * hints.min_aspect + 0.5) as i32;
            }
        }
        if base_is_min {
            w -= hints.base_w;
            h -= hints.base_h;
        }
        if hints.inc_w > 0 {
            w -= w % hints.inc_w;
        }
        if hints.inc_h > 0 {
            h -= h % hints.inc_h;
        }
        w = (w + hints.base_w).max(hints.min_w);
        h = (h + hints.base_h).max(hints.min_h);
        if hints.max_w > 0 {
            w = w.min(hints.max_w);
        }
        if hints.max_h > 0 {
            h = h.min(hints.max_h);
        }
    }

    Rectangle::new(x, y, w.max(1) as u32, h.max(1) as u32)
}
