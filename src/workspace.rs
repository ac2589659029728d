use crate::{
    config::WorkspaceConfig,
    layout::TileParams,
    tag::{self, TagId, TagMask},
};

pub const VF_MIN: f32 = 0.05;
pub const VF_MAX: f32 = 0.95;

/**
 * A tag/layout context of a monitor.
 *
 * The visible tag set is the union of two single-tag views. When both are
 * populated the tiling area is split between them, view 0 taking the
 * primary share `vf`.
 */
#[derive(Debug, PartialEq, Clone)]
pub struct Workspace {
    views: [TagMask; 2],
    tags: TagMask,
    spawn_view: usize,
    pub(crate) spawn_floating: bool,
    pub(crate) layout: usize,
    pub(crate) prev_layout: usize,
    /// Slot caps of view 0 / view 1, 0 is unlimited
    pub(crate) caps: [u32; 2],
    pub(crate) vf: f32,
    pub(crate) show_bar: bool,
}

impl Workspace {
    pub fn new(conf: &WorkspaceConfig) -> Workspace {
        let mut ws = Workspace {
            views: [
                conf.views[0].map_or(0, tag::bit),
                conf.views[1].map_or(0, tag::bit),
            ],
            tags: 0,
            spawn_view: 0,
            spawn_floating: conf.spawn_floating,
            layout: conf.layout,
            prev_layout: conf.layout,
            caps: conf.caps,
            vf: conf.vf,
            show_bar: conf.show_bar,
        };
        ws.update_tags();
        ws
    }

    pub fn tags(&self) -> TagMask {
        self.tags
    }

    pub fn views(&self) -> [TagMask; 2] {
        self.views
    }

    pub fn spawn_view(&self) -> usize {
        self.spawn_view
    }

    pub fn layout(&self) -> usize {
        self.layout
    }

    fn update_tags(&mut self) {
        self.tags = self.views[0] | self.views[1];
    }

    /// Toggle `tag` in view slot `view`.
    ///
    /// Setting a tag that sits in the other slot moves it over, the other slot
    /// receiving whatever this one held, so no tag ever occupies both.
    pub fn set_view(&mut self, view: usize, tag: TagId) {
        let b = tag::bit(tag);
        let other = 1 - view;
        if self.views[view] == b {
            self.views[view] = 0;
            self.spawn_view = other;
        } else {
            if self.views[other] == b {
                self.views[other] = self.views[view];
            }
            self.views[view] = b;
            self.spawn_view = view;
        }
        self.update_tags();
    }

    /// Exchange the two views. Refused while nothing is viewed.
    pub fn swap_views(&mut self) -> bool {
        if self.tags == 0 {
            return false;
        }
        self.views.swap(0, 1);
        self.spawn_view = 1 - self.spawn_view;
        self.update_tags();
        true
    }

    pub fn clear_views(&mut self) {
        self.views = [0, 0];
        self.spawn_view = 0;
        self.update_tags();
    }

    /// Tags a client receives when no rule assigned any.
    pub fn spawn_tags(&self) -> TagMask {
        match self.views[self.spawn_view] {
            0 => tag::bit(0),
            t => t,
        }
    }

    /// Select layout `index`, or toggle back to the previous one.
    pub fn set_layout(&mut self, index: Option<usize>) {
        match index {
            Some(i) if i == self.layout => (),
            Some(i) => {
                self.prev_layout = self.layout;
                self.layout = i;
            }
            None => std::mem::swap(&mut self.layout, &mut self.prev_layout),
        }
    }

    /// Adjust the slot cap of `view`, never going below unlimited (0).
    pub fn inc_cap(&mut self, view: usize, delta: i32) {
        self.caps[view] = (self.caps[view] as i32 + delta).max(0) as u32;
    }

    /// Adjust vf by `delta`; values above 1.0 set it absolutely to `delta - 1.0`.
    /// Out of range results are ignored.
    pub fn set_vf(&mut self, delta: f32) -> bool {
        let vf = if delta < 1.0 { self.vf + delta } else { delta - 1.0 };
        if !(VF_MIN..=VF_MAX).contains(&vf) {
            return false;
        }
        self.vf = vf;
        true
    }

    pub fn tile_params(&self) -> TileParams {
        TileParams {
            views: self.views,
            caps: self.caps,
            vf: self.vf,
        }
    }
}
