//! Interactive move and resize while a pointer button is held.

use xcb::Window;

use crate::{
    geometry::{Point, Rectangle},
    wm::WindowManager,
    xconnection::{CursorKind, XConn},
};

/// A pointer-driven operation in progress.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Drag {
    pub client: Window,
    /// Pointer position at the start for moves, the client origin for resizes
    pub origin: Point,
    /// Client geometry when the operation started
    pub start: Rectangle,
    /// Server time of the last applied motion sample
    pub last_motion: u32,
}

/// Reactor sub-state. Outside of `Normal` the pointer is grabbed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Mode {
    Normal,
    Moving(Drag),
    Resizing(Drag),
}

impl Mode {
    pub fn client(&self) -> Option<Window> {
        match self {
            Mode::Normal => None,
            Mode::Moving(d) | Mode::Resizing(d) => Some(d.client),
        }
    }
}

/// Pull a coordinate onto `edge` when it is less than `snap` away.
fn snap_to(v: i32, edge: i32, snap: i32) -> Option<i32> {
    if (edge - v).abs() < snap {
        Some(edge)
    } else {
        None
    }
}

impl<'a, X: XConn> WindowManager<'a, X> {
    /// Grab the pointer and begin moving or resizing the selected client.
    /// Fullscreen clients stay where they are.
    pub(crate) fn start_drag(&mut self, resize: bool) {
        let (id, rect, border) = match self.selected().and_then(|id| self.clients.get(&id)) {
            Some(c) if !c.fullscreen => (c.id(), c.rect, c.border as i32),
            _ => return,
        };
        self.restack(self.selmon);

        let cursor = if resize { CursorKind::Resize } else { CursorKind::Move };
        if !self.conn.grab_pointer(cursor) {
            warn!("unable to grab the pointer for {:?}", cursor);
            return;
        }
        let origin = if resize {
            self.conn
                .warp_pointer(id, rect.w as i32 + border - 1, rect.h as i32 + border - 1);
            Point::new(rect.x, rect.y)
        } else {
            match self.conn.query_pointer() {
                Some(p) => p,
                None => {
                    self.conn.ungrab_pointer();
                    return;
                }
            }
        };

        let drag = Drag {
            client: id,
            origin,
            start: rect,
            last_motion: 0,
        };
        debug!("starting {} of {}", if resize { "resize" } else { "move" }, id);
        self.mode = if resize {
            Mode::Resizing(drag)
        } else {
            Mode::Moving(drag)
        };
    }

    /// Apply a motion sample, dropping those that arrive faster than the
    /// configured refresh rate.
    pub(crate) fn drag_motion(&mut self, p: Point, time: u32) {
        let interval = 1000 / self.config.motion_refresh_hz.max(1);
        let (drag, resize) = match &mut self.mode {
            Mode::Normal => return,
            Mode::Moving(d) => (d, false),
            Mode::Resizing(d) => (d, true),
        };
        if time.wrapping_sub(drag.last_motion) <= interval {
            return;
        }
        drag.last_motion = time;
        let drag = *drag;

        if resize {
            self.drag_resize(drag, p);
        } else {
            self.drag_move(drag, p);
        }
    }

    fn drag_move(&mut self, drag: Drag, p: Point) {
        let c = match self.clients.get(&drag.client) {
            Some(c) => c,
            None => return,
        };
        let (w, h) = (c.outer_width() as i32, c.outer_height() as i32);
        let (cur, floating) = (c.rect, c.floating);
        let work = self.monitors[self.selmon].work;
        let snap = self.config.snap_px as i32;

        let mut nx = drag.start.x + (p.x - drag.origin.x);
        let mut ny = drag.start.y + (p.y - drag.origin.y);
        nx = snap_to(nx, work.x, snap)
            .or_else(|| snap_to(nx + w, work.right(), snap).map(|e| e - w))
            .unwrap_or(nx);
        ny = snap_to(ny, work.y, snap)
            .or_else(|| snap_to(ny + h, work.bottom(), snap).map(|e| e - h))
            .unwrap_or(ny);

        let arranges = self.layout_arranges(self.selmon);
        if !floating && arranges && ((nx - cur.x).abs() > snap || (ny - cur.y).abs() > snap) {
            self.toggle_floating(drag.client);
        }
        if !arranges || self.clients.get(&drag.client).map_or(false, |c| c.floating) {
            self.resize(drag.client, Rectangle::new(nx, ny, cur.w, cur.h), true);
        }
    }

    fn drag_resize(&mut self, drag: Drag, p: Point) {
        let c = match self.clients.get(&drag.client) {
            Some(c) => c,
            None => return,
        };
        let bw = c.border as i32;
        let (cur, floating) = (c.rect, c.floating);
        let (ox, oy) = (drag.origin.x, drag.origin.y);
        let work = self.monitors[self.selmon].work;
        let snap = self.config.snap_px as i32;

        let mut nw = (p.x - ox - 2 * bw + 1).max(1);
        let mut nh = (p.y - oy - 2 * bw + 1).max(1);
        if let Some(edge) = snap_to(ox + nw + 2 * bw, work.right(), snap) {
            nw = (edge - ox - 2 * bw).max(1);
        }
        if let Some(edge) = snap_to(oy + nh + 2 * bw, work.bottom(), snap) {
            nh = (edge - oy - 2 * bw).max(1);
        }

        let arranges = self.layout_arranges(self.selmon);
        if !floating
            && arranges
            && ((nw - cur.w as i32).abs() > snap || (nh - cur.h as i32).abs() > snap)
        {
            self.toggle_floating(drag.client);
        }
        if !arranges || self.clients.get(&drag.client).map_or(false, |c| c.floating) {
            let r = Rectangle::new(cur.x, cur.y, nw as u32, nh as u32);
            self.resize(drag.client, r, true);
        }
    }

    /// Finish the operation: release the pointer and hand the client to the
    /// monitor it now mostly covers.
    pub(crate) fn drag_release(&mut self) {
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let id = match mode.client() {
            Some(id) => id,
            None => return,
        };
        if let (Mode::Resizing(_), Some(c)) = (mode, self.clients.get(&id)) {
            let (w, h) = (c.rect.w as i32, c.rect.h as i32);
            let bw = c.border as i32;
            self.conn.warp_pointer(id, w + bw - 1, h + bw - 1);
        }
        self.conn.ungrab_pointer();

        let rect = match self.clients.get(&id) {
            Some(c) => c.rect,
            None => return,
        };
        let m = self.rect_to_monitor(rect);
        if m != self.selmon {
            debug!("moving {} to monitor {} after drag", id, m);
            self.send_to_monitor(id, m);
            self.selmon = m;
            self.focus(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::Action,
        mock::{test_config, MockConn},
        xconnection::XEvent,
    };
    use pretty_assertions::assert_eq;

    fn motion(conn: &MockConn, x: i32, y: i32, time: u32) -> XEvent {
        XEvent::MotionNotify {
            id: conn.root(),
            rpt: Point::new(x, y),
            time,
        }
    }

    /// Two tiled clients side by side: 10 in view 0 on the left, 11 in
    /// view 1 against the right edge of the work area.
    fn side_by_side(conn: &MockConn) -> WindowManager<'_, MockConn> {
        let mut config = test_config();
        config.workspaces[0].views = [Some(0), Some(1)];
        config.workspaces[0].vf = 0.5;
        let mut wm = WindowManager::new(conn, config).unwrap();
        for id in [10, 11].iter().copied() {
            conn.add_window(id, Rectangle::new(0, 0, 100, 100));
            wm.map_request(id);
        }
        wm.run_action(Action::Tag(1));
        wm
    }

    #[test]
    fn small_drags_of_a_tiled_client_do_not_float_it() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);
        let start = wm.client(11).unwrap().rect();
        assert_eq!(start, Rectangle::new(600, 18, 596, 796));

        conn.pointer.set(Some(Point::new(900, 400)));
        wm.run_action(Action::MoveMouse);
        assert_eq!(wm.mode.client(), Some(11));
        wm.handle_event(motion(&conn, 880, 400, 100));
        wm.handle_event(XEvent::ButtonRelease { button: 1 });

        let c = wm.client(11).unwrap();
        assert!(!c.is_floating());
        assert_eq!(c.rect(), start);
        assert_eq!(wm.mode, Mode::Normal);
        assert!(!conn.pointer_grabbed.get());
    }

    #[test]
    fn floating_clients_dragged_near_an_edge_snap_onto_it() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);
        wm.run_action(Action::ToggleFloating);
        wm.resize(11, Rectangle::new(880, 100, 300, 200), false);
        assert_eq!(wm.client(11).unwrap().rect().x, 880);

        // 26px short of the right edge after the drag, inside the snap distance
        conn.pointer.set(Some(Point::new(900, 400)));
        wm.run_action(Action::MoveMouse);
        wm.handle_event(motion(&conn, 890, 400, 100));
        wm.handle_event(XEvent::ButtonRelease { button: 1 });

        let c = wm.client(11).unwrap();
        let work = wm.monitor(0).work();
        assert!(c.is_floating());
        assert_eq!(c.rect(), Rectangle::new(work.right() - 304, 100, 300, 200));
        assert_eq!(c.rect().x + c.outer_width() as i32, work.right());

        // far from every edge nothing is pulled
        conn.pointer.set(Some(Point::new(900, 400)));
        wm.run_action(Action::MoveMouse);
        wm.handle_event(motion(&conn, 700, 400, 200));
        wm.handle_event(XEvent::ButtonRelease { button: 1 });
        assert_eq!(wm.client(11).unwrap().rect().x, work.right() - 304 - 200);
    }

    #[test]
    fn dragging_past_the_threshold_floats_the_client() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);

        conn.pointer.set(Some(Point::new(900, 400)));
        wm.run_action(Action::MoveMouse);
        wm.handle_event(motion(&conn, 800, 450, 100));
        // too soon after the previous sample
        wm.handle_event(motion(&conn, 700, 450, 105));

        let c = wm.client(11).unwrap();
        assert!(c.is_floating());
        assert_eq!(c.rect(), Rectangle::new(500, 68, 596, 796));

        // the left neighbour now has the whole work area
        assert_eq!(wm.client(10).unwrap().rect(), Rectangle::new(0, 18, 1196, 796));
        wm.handle_event(XEvent::ButtonRelease { button: 1 });
    }

    #[test]
    fn resizing_snaps_the_far_edges_to_the_work_area() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);
        wm.run_action(Action::ToggleFloating);
        wm.resize(11, Rectangle::new(100, 100, 300, 200), false);

        wm.run_action(Action::ResizeMouse);
        // warped to the bottom right corner
        assert_eq!(conn.warps.borrow().last(), Some(&(11, 301, 201)));
        wm.handle_event(motion(&conn, 1180, 500, 100));
        wm.handle_event(XEvent::ButtonRelease { button: 3 });

        let c = wm.client(11).unwrap();
        let work = wm.monitor(0).work();
        assert_eq!(c.rect().x + c.outer_width() as i32, work.right());
        assert_eq!(c.rect().h, 500 - 100 - 4 + 1);
    }

    #[test]
    fn fullscreen_clients_cannot_be_dragged() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);
        wm.set_fullscreen(11, true);
        wm.run_action(Action::MoveMouse);
        assert_eq!(wm.mode, Mode::Normal);
    }

    #[test]
    fn releasing_over_another_monitor_transfers_the_client() {
        let conn = MockConn::default();
        conn.screen.set(Rectangle::new(0, 0, 2000, 718));
        *conn.regions.borrow_mut() = vec![
            Rectangle::new(0, 0, 1000, 718),
            Rectangle::new(1000, 0, 1000, 718),
        ];
        let mut wm = WindowManager::new(&conn, test_config()).unwrap();
        conn.add_window(10, Rectangle::new(100, 100, 300, 200));
        wm.map_request(10);
        wm.run_action(Action::ToggleFloating);

        conn.pointer.set(Some(Point::new(200, 200)));
        wm.run_action(Action::MoveMouse);
        wm.handle_event(motion(&conn, 1500, 300, 100));
        wm.handle_event(XEvent::ButtonRelease { button: 1 });

        assert_eq!(wm.client(10).unwrap().monitor(), 1);
        assert_eq!(wm.monitor(1).clients(), &[10]);
        assert!(wm.monitor(0).clients().is_empty());
        assert_eq!(wm.selected_monitor(), 1);
        assert_eq!(wm.focused_client(), Some(10));
    }

    #[test]
    fn other_events_wait_until_the_drag_ends() {
        let conn = MockConn::default();
        let mut wm = side_by_side(&conn);
        conn.pointer.set(Some(Point::new(900, 400)));
        wm.run_action(Action::MoveMouse);

        conn.add_window(12, Rectangle::new(0, 0, 100, 100));
        wm.handle_event(XEvent::MapRequest { id: 12, ignore: false });
        wm.handle_event(XEvent::EnterNotify {
            id: 10,
            normal: true,
            is_root: false,
        });
        // map requests are serviced inline, focus changes are not
        assert!(wm.client(12).is_some());
        assert_eq!(wm.deferred.len(), 1);

        wm.handle_event(XEvent::ButtonRelease { button: 1 });
        assert!(wm.deferred.is_empty());
        assert_eq!(wm.focused_client(), Some(10));
    }
}
