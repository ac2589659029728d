use xcb::Window;

use crate::{
    geometry::{Rectangle, SizeHints},
    tag::TagMask,
};

/// Where a client is in the maximize toggle cycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MaxState {
    None,
    Maximized,
    Restored,
}

/**
 * Meta-data around a client window that we are handling.
 *
 * Primarily state flags and information used when determining which clients
 * to show for a given monitor and how they are tiled.
 */
#[derive(Debug, PartialEq, Clone)]
pub struct Client {
    id: Window,
    pub(crate) name: String,
    pub(crate) class: String,
    pub(crate) instance: String,
    pub(crate) tags: TagMask,
    /// Index of the owning monitor
    pub(crate) monitor: usize,

    pub(crate) rect: Rectangle,
    pub(crate) old_rect: Rectangle,
    pub(crate) pre_max_rect: Rectangle,
    pub(crate) border: u32,
    pub(crate) old_border: u32,

    pub(crate) hints: SizeHints,
    pub(crate) hints_valid: bool,

    // state flags
    pub(crate) fixed: bool,
    pub(crate) floating: bool,
    pub(crate) urgent: bool,
    pub(crate) never_focus: bool,
    pub(crate) fullscreen: bool,
    /// Floating state saved on entering fullscreen
    pub(crate) old_floating: bool,
    pub(crate) max_state: MaxState,
    /// Floating state saved on maximizing
    pub(crate) pre_max_floating: bool,
}

impl Client {
    /// Track a new client window at its current on-screen geometry
    pub fn new(id: Window, rect: Rectangle, border: u32) -> Client {
        Client {
            id,
            name: String::new(),
            class: String::new(),
            instance: String::new(),
            tags: 0,
            monitor: 0,
            rect,
            old_rect: rect,
            pre_max_rect: rect,
            border,
            old_border: border,
            hints: SizeHints::default(),
            hints_valid: false,
            fixed: false,
            floating: false,
            urgent: false,
            never_focus: false,
            fullscreen: false,
            old_floating: false,
            max_state: MaxState::None,
            pre_max_floating: false,
        }
    }

    /// The X window ID of this client
    pub fn id(&self) -> Window {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> TagMask {
        self.tags
    }

    pub fn monitor(&self) -> usize {
        self.monitor
    }

    pub fn rect(&self) -> Rectangle {
        self.rect
    }

    pub fn border(&self) -> u32 {
        self.border
    }

    pub fn is_floating(&self) -> bool {
        self.floating
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    pub fn max_state(&self) -> MaxState {
        self.max_state
    }

    /// Visible under the given workspace tag set
    pub fn is_visible_on(&self, tags: TagMask) -> bool {
        self.tags & tags != 0
    }

    /// Participates in tiling: neither floating nor fullscreen
    pub fn is_tiled(&self) -> bool {
        !self.floating && !self.fullscreen
    }

    /// Width including the border on both sides
    pub fn outer_width(&self) -> u32 {
        self.rect.w + 2 * self.border
    }

    /// Height including the border on both sides
    pub fn outer_height(&self) -> u32 {
        self.rect.h + 2 * self.border
    }

    /// Record a new geometry, remembering the previous one.
    pub(crate) fn set_rect(&mut self, r: Rectangle) {
        self.old_rect = self.rect;
        self.rect = r;
    }

    /// Adopt freshly read WM_NORMAL_HINTS.
    pub(crate) fn set_hints(&mut self, hints: SizeHints) {
        self.fixed = hints.is_fixed();
        self.hints = hints;
        self.hints_valid = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rect_keeps_previous_geometry() {
        let mut c = Client::new(1, Rectangle::new(0, 0, 10, 10), 1);
        c.set_rect(Rectangle::new(5, 5, 20, 20));
        assert_eq!(c.old_rect, Rectangle::new(0, 0, 10, 10));
        assert_eq!(c.outer_width(), 22);
    }

    #[test]
    fn fullscreen_and_floating_clients_are_not_tiled() {
        let mut c = Client::new(1, Rectangle::default(), 0);
        assert!(c.is_tiled());
        c.fullscreen = true;
        assert!(!c.is_tiled());
        c.fullscreen = false;
        c.floating = true;
        assert!(!c.is_tiled());
    }
}
