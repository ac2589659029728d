use xcb::Window;

use crate::{
    config::Config,
    geometry::{Point, Rectangle},
    workspace::Workspace,
    wm::WindowManager,
    xconnection::XConn,
};

/**
 * One output area along with the clients it owns.
 *
 * `clients` holds creation order (oldest first) and `stack` focus order
 * (most recent first). Every client of the monitor is in both exactly once.
 */
#[derive(Debug, PartialEq, Clone)]
pub struct Monitor {
    pub(crate) screen: Rectangle,
    /// The screen minus the space reserved for the bar
    pub(crate) work: Rectangle,
    pub(crate) bar_y: i32,
    top_bar: bool,
    pub(crate) layout_symbol: String,
    pub(crate) workspaces: Vec<Workspace>,
    pub(crate) active_ws: usize,
    pub(crate) last_ws: usize,
    pub(crate) clients: Vec<Window>,
    pub(crate) stack: Vec<Window>,
    pub(crate) sel: Option<Window>,
}

impl Monitor {
    pub fn new(screen: Rectangle, config: &Config) -> Monitor {
        let workspaces: Vec<Workspace> = config.workspaces.iter().map(Workspace::new).collect();
        let layout_symbol = workspaces
            .first()
            .and_then(|ws| config.layouts.get(ws.layout()))
            .map(|l| l.symbol.to_string())
            .unwrap_or_default();
        let mut mon = Monitor {
            screen,
            work: screen,
            bar_y: 0,
            top_bar: config.top_bar,
            layout_symbol,
            workspaces,
            active_ws: 0,
            last_ws: 0,
            clients: vec![],
            stack: vec![],
            sel: None,
        };
        mon.update_bar_pos(config.bar_height);
        mon
    }

    pub fn screen(&self) -> Rectangle {
        self.screen
    }

    pub fn work(&self) -> Rectangle {
        self.work
    }

    pub fn clients(&self) -> &[Window] {
        &self.clients
    }

    pub fn stack(&self) -> &[Window] {
        &self.stack
    }

    pub fn sel(&self) -> Option<Window> {
        self.sel
    }

    pub fn layout_symbol(&self) -> &str {
        &self.layout_symbol
    }

    pub fn active_workspace(&self) -> usize {
        self.active_ws
    }

    pub fn ws(&self) -> &Workspace {
        &self.workspaces[self.active_ws]
    }

    pub fn ws_mut(&mut self) -> &mut Workspace {
        &mut self.workspaces[self.active_ws]
    }

    /// Recompute the work area from the screen and the active workspace's
    /// bar visibility. A hidden bar sits just above the screen.
    pub fn update_bar_pos(&mut self, bar_height: u32) {
        self.work = self.screen;
        if self.ws().show_bar {
            self.work.h = self.screen.h.saturating_sub(bar_height);
            if self.top_bar {
                self.bar_y = self.screen.y;
                self.work.y = self.screen.y + bar_height as i32;
            } else {
                self.bar_y = self.work.bottom();
            }
        } else {
            self.bar_y = -(bar_height as i32);
        }
    }

    fn set_screen(&mut self, screen: Rectangle, bar_height: u32) {
        self.screen = screen;
        self.update_bar_pos(bar_height);
    }

    /// Make `index` (or the last active workspace) current. Returns false when
    /// nothing changed.
    pub fn switch_workspace(&mut self, index: Option<usize>) -> bool {
        let target = index.unwrap_or(self.last_ws);
        if target == self.active_ws || target >= self.workspaces.len() {
            return false;
        }
        self.last_ws = self.active_ws;
        self.active_ws = target;
        true
    }
}

/// Drop outputs that duplicate the geometry of an earlier one (mirroring).
pub fn unique_regions(regions: &[Rectangle]) -> Vec<Rectangle> {
    let mut unique: Vec<Rectangle> = Vec::with_capacity(regions.len());
    for r in regions {
        if !unique.contains(r) {
            unique.push(*r);
        }
    }
    unique
}

impl<'a, X: XConn> WindowManager<'a, X> {
    /**
     * Sync the monitor list with the current output topology.
     *
     * A monitor whose output kept its geometry keeps its place and state.
     * Monitors left over take the remaining outputs in order (so a lone
     * screen is resized in place), new outputs get fresh monitors and any
     * monitor without an output is removed. Clients of removed monitors move
     * to the first monitor with their tags untouched.
     */
    pub(crate) fn update_geometry(&mut self) -> bool {
        let mut regions = unique_regions(&self.conn.monitor_regions());
        if regions.is_empty() {
            regions.push(self.screen);
        }
        let bar_height = self.config.bar_height;
        let old = std::mem::take(&mut self.monitors);
        let mut remap: Vec<Option<usize>> = vec![None; old.len()];
        let mut slots: Vec<Option<Monitor>> = regions.iter().map(|_| None).collect();
        let mut dirty = false;

        let mut unmatched = vec![];
        for (i, mon) in old.into_iter().enumerate() {
            match (0..regions.len()).find(|&r| slots[r].is_none() && regions[r] == mon.screen) {
                Some(r) => {
                    remap[i] = Some(r);
                    slots[r] = Some(mon);
                }
                None => unmatched.push((i, mon)),
            }
        }

        let mut gone = vec![];
        for (i, mut mon) in unmatched {
            match (0..regions.len()).find(|&r| slots[r].is_none()) {
                Some(r) => {
                    info!("monitor {} resized to {:?}", i, regions[r]);
                    mon.set_screen(regions[r], bar_height);
                    remap[i] = Some(r);
                    slots[r] = Some(mon);
                }
                None => gone.push((i, mon)),
            }
            dirty = true;
        }
        if remap.iter().enumerate().any(|(i, &r)| r != Some(i)) {
            dirty = true;
        }

        for (r, slot) in slots.into_iter().enumerate() {
            let mon = match slot {
                Some(mon) => mon,
                None => {
                    info!("monitor {} added at {:?}", r, regions[r]);
                    dirty = true;
                    Monitor::new(regions[r], &self.config)
                }
            };
            self.monitors.push(mon);
        }

        for c in self.clients.values_mut() {
            c.monitor = remap.get(c.monitor).copied().flatten().unwrap_or(0);
        }
        for (i, mon) in gone {
            info!(
                "monitor {} removed, moving {} clients to monitor 0",
                i,
                mon.clients.len()
            );
            let first = &mut self.monitors[0];
            first.clients.extend(mon.clients.iter().copied());
            for &id in mon.stack.iter().rev() {
                first.stack.insert(0, id);
            }
        }
        self.selmon = remap.get(self.selmon).copied().flatten().unwrap_or(0);

        if dirty {
            self.motion_mon = None;
            if let Some(p) = self.conn.query_pointer() {
                self.selmon = self.point_to_monitor(p);
            }
        }
        dirty
    }

    /// The monitor a rectangle overlaps most, the selected one on no overlap.
    pub(crate) fn rect_to_monitor(&self, r: Rectangle) -> usize {
        let mut best = self.selmon;
        let mut area = 0;
        for (i, mon) in self.monitors.iter().enumerate() {
            let a = mon.work.intersection_area(&r);
            if a > area {
                area = a;
                best = i;
            }
        }
        best
    }

    pub(crate) fn point_to_monitor(&self, p: Point) -> usize {
        self.rect_to_monitor(Rectangle::new(p.x, p.y, 1, 1))
    }

    /// The monitor a window belongs to: the one under the pointer for the
    /// root window, the owner for clients and the selected one otherwise.
    pub(crate) fn win_to_monitor(&self, id: Window) -> usize {
        if id == self.conn.root() {
            if let Some(p) = self.conn.query_pointer() {
                return self.point_to_monitor(p);
            }
        }
        self.clients.get(&id).map_or(self.selmon, |c| c.monitor)
    }

    /// The monitor `dir` steps away from the selected one, wrapping around.
    pub(crate) fn dir_to_monitor(&self, dir: i32) -> usize {
        let n = self.monitors.len() as i32;
        (self.selmon as i32 + dir).rem_euclid(n) as usize
    }
}
