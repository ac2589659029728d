use xcb::Window;

use crate::{
    bindings::{Bindings, ClickRegion},
    geometry::{Point, Rectangle},
    interaction::Mode,
    wm::WindowManager,
    xconnection::{
        ClientMessage, ConfigureRequest, Property, StateAction, WmState, XConn, XEvent, XcbKey,
    },
};

impl<'a, X: XConn> WindowManager<'a, X> {
    /// Route an event. While a move or resize holds the pointer only motion,
    /// release and the requests that cannot wait are handled; everything else
    /// is replayed once the operation ends.
    pub(crate) fn handle_event(&mut self, event: XEvent) {
        debug!("got XEvent: {:?}", event);
        if self.mode == Mode::Normal {
            self.dispatch(event);
            return;
        }
        match event {
            XEvent::MotionNotify { rpt, time, .. } => self.drag_motion(rpt, time),
            XEvent::ButtonRelease { .. } => {
                self.drag_release();
                self.replay_deferred();
            }
            XEvent::ConfigureRequest(_) | XEvent::Expose { .. } | XEvent::MapRequest { .. } => {
                self.dispatch(event)
            }
            // presses are swallowed by the pointer grab
            XEvent::ButtonPress { .. } => (),
            other => self.deferred.push_back(other),
        }
    }

    fn replay_deferred(&mut self) {
        while self.mode == Mode::Normal {
            match self.deferred.pop_front() {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
    }

    /*
     * X Event handler functions
     * These are called in response to incoming XEvents so calling them directly should
     * only be done if the intent is to act as if the corresponding XEvent had been
     * received from the X event loop (i.e. to avoid emitting and picking up the event
     * ourselves)
     */
    fn dispatch(&mut self, event: XEvent) {
        match event {
            XEvent::ButtonPress {
                id,
                rpt,
                state,
                button,
            } => self.handle_button_press(id, rpt, state, button),
            XEvent::ButtonRelease { .. } => (),
            XEvent::MotionNotify { id, rpt, .. } => self.handle_motion_notify(id, rpt),
            XEvent::KeyPress { code } => self.handle_key_press(code),
            XEvent::MapRequest { id, ignore } => {
                if !ignore {
                    self.map_request(id)
                }
            }
            XEvent::UnmapNotify { id, synthetic } => self.handle_unmap_notify(id, synthetic),
            XEvent::DestroyNotify { id } => self.unmanage(id, true),
            XEvent::EnterNotify {
                id,
                normal,
                is_root,
            } => self.handle_enter_notify(id, normal, is_root),
            XEvent::FocusIn { id } => self.handle_focus_in(id),
            XEvent::ConfigureRequest(req) => self.handle_configure_request(req),
            XEvent::ConfigureNotify { r, is_root, .. } => {
                if is_root {
                    self.handle_screen_change(r)
                }
            }
            XEvent::PropertyNotify {
                id,
                prop,
                is_root,
                deleted,
            } => self.handle_property_notify(id, prop, is_root, deleted),
            XEvent::ClientMessage { id, message } => self.handle_client_message(id, message),
            XEvent::Expose { id, count } => {
                if count == 0 {
                    let m = self.win_to_monitor(id);
                    self.draw_bar(m);
                }
            }
            XEvent::MappingNotify { keyboard } => {
                if keyboard {
                    self.refresh_key_bindings()
                }
            }
        }
    }

    /// Manage a window asking to be mapped unless it is already known or
    /// opted out of management.
    pub(crate) fn map_request(&mut self, id: Window) {
        if self.clients.contains_key(&id) {
            return;
        }
        match self.conn.window_attributes(id) {
            Some(attrs) if !attrs.override_redirect => self.manage(id, attrs),
            Some(_) => (),
            None => debug!("window {} vanished before it could be managed", id),
        }
    }

    fn handle_button_press(&mut self, id: Window, rpt: Point, state: u16, button: u8) {
        let m = if id == self.conn.root() {
            self.point_to_monitor(rpt)
        } else {
            self.win_to_monitor(id)
        };
        if m != self.selmon {
            if let Some(sel) = self.selected() {
                self.unfocus(sel, true);
            }
            self.selmon = m;
            self.focus(None);
        }

        let click = if self.clients.contains_key(&id) {
            self.focus(Some(id));
            self.restack(self.selmon);
            self.conn.replay_pointer();
            ClickRegion::ClientWin
        } else {
            ClickRegion::RootWin
        };
        if let Some(action) = self.bindings.button_action(click, state, button) {
            self.run_action(action);
        }
    }

    /// Follow the pointer across monitors on the root window.
    fn handle_motion_notify(&mut self, id: Window, rpt: Point) {
        if id != self.conn.root() {
            return;
        }
        let m = self.point_to_monitor(rpt);
        if self.motion_mon.map_or(false, |prev| prev != m) {
            if let Some(sel) = self.selected() {
                self.unfocus(sel, true);
            }
            self.selmon = m;
            self.focus(None);
        }
        self.motion_mon = Some(m);
    }

    fn handle_key_press(&mut self, key: XcbKey) {
        if let Some(action) = self.bindings.get_action(&key) {
            debug!("handling key code: {:?}", key);
            self.run_action(action);
        }
    }

    /// A client withdrawing itself sends a synthetic unmap and keeps its
    /// window; a real unmap ends management.
    fn handle_unmap_notify(&mut self, id: Window, synthetic: bool) {
        if !self.clients.contains_key(&id) {
            return;
        }
        if synthetic {
            self.conn.set_client_state(id, WmState::Withdrawn);
        } else {
            self.unmanage(id, false);
        }
    }

    /// Focus follows the mouse.
    fn handle_enter_notify(&mut self, id: Window, normal: bool, is_root: bool) {
        if !normal && !is_root {
            return;
        }
        let client = self.clients.get(&id).map(|c| c.id());
        let m = client.map_or_else(|| self.win_to_monitor(id), |c| self.clients[&c].monitor);
        if m != self.selmon {
            if let Some(sel) = self.selected() {
                self.unfocus(sel, true);
            }
            self.selmon = m;
        } else if client.is_none() || client == self.selected() {
            return;
        }
        self.focus(client);
    }

    /// Some clients grab focus on their own; hand it back to the selection.
    fn handle_focus_in(&mut self, id: Window) {
        if let Some(sel) = self.selected() {
            if sel != id {
                self.set_focus(sel);
            }
        }
    }

    /**
     * Floating clients (and every client without a tiling layout) get what
     * they ask for, kept on their monitor. Tiled clients are only told their
     * current geometry. Unmanaged windows are configured as requested.
     */
    fn handle_configure_request(&mut self, req: ConfigureRequest) {
        let (m, floating) = match self.clients.get(&req.id) {
            Some(c) => (c.monitor, c.floating),
            None => {
                self.conn.forward_configure_request(&req);
                return;
            }
        };
        let id = req.id;

        if let Some(border) = req.border {
            if let Some(c) = self.clients.get_mut(&id) {
                c.border = border;
            }
        } else if floating || !self.layout_arranges(m) {
            let screen = self.monitors[m].screen;
            let visible = self.is_visible(id);
            let c = match self.clients.get_mut(&id) {
                Some(c) => c,
                None => return,
            };
            let mut r = c.rect;
            if let Some(x) = req.x {
                c.old_rect.x = r.x;
                r.x = screen.x + x;
            }
            if let Some(y) = req.y {
                c.old_rect.y = r.y;
                r.y = screen.y + y;
            }
            if let Some(w) = req.w {
                c.old_rect.w = r.w;
                r.w = w;
            }
            if let Some(h) = req.h {
                c.old_rect.h = r.h;
                r.h = h;
            }
            let (ow, oh) = ((r.w + 2 * c.border) as i32, (r.h + 2 * c.border) as i32);
            // centre windows that would leave their monitor
            if floating && r.x + ow > screen.right() {
                r.x = screen.x + (screen.w as i32 / 2 - ow / 2);
            }
            if floating && r.y + oh > screen.bottom() {
                r.y = screen.y + (screen.h as i32 / 2 - oh / 2);
            }
            c.rect = r;
            let moved_only = (req.x.is_some() || req.y.is_some()) && req.w.is_none() && req.h.is_none();
            if moved_only {
                self.configure(id);
            }
            if visible {
                self.conn.configure_window(id, Some(r), None, None);
            }
        } else {
            self.configure(id);
        }
    }

    /// The root window changed size: query the outputs again and refit.
    fn handle_screen_change(&mut self, r: Rectangle) {
        let resized = self.screen != r;
        self.screen = r;
        if self.update_geometry() || resized {
            let fullscreen: Vec<Window> = self
                .clients
                .values()
                .filter(|c| c.fullscreen)
                .map(|c| c.id())
                .collect();
            for id in fullscreen {
                self.fit_fullscreen(id);
            }
            self.focus(None);
            self.arrange(None);
        }
    }

    fn handle_property_notify(&mut self, id: Window, prop: Property, is_root: bool, deleted: bool) {
        if is_root {
            if prop == Property::Name {
                self.update_status();
            }
            return;
        }
        if deleted || !self.clients.contains_key(&id) {
            return;
        }
        match prop {
            Property::TransientFor => {
                let parent_known = self
                    .conn
                    .transient_for(id)
                    .map_or(false, |p| self.clients.contains_key(&p));
                let m = match self.clients.get_mut(&id) {
                    Some(c) if !c.floating && parent_known => {
                        c.floating = true;
                        c.monitor
                    }
                    _ => return,
                };
                self.arrange(Some(m));
            }
            Property::NormalHints => {
                if let Some(c) = self.clients.get_mut(&id) {
                    c.hints_valid = false;
                }
            }
            Property::Hints => {
                self.update_wm_hints(id);
                self.draw_bars();
            }
            Property::Name => {
                self.update_title(id);
                let m = self.clients[&id].monitor;
                if self.monitors[m].sel == Some(id) {
                    self.draw_bar(m);
                }
            }
            Property::WindowType => self.update_window_type(id),
            Property::Other => (),
        }
    }

    fn handle_client_message(&mut self, id: Window, message: ClientMessage) {
        let (fullscreen, urgent) = match self.clients.get(&id) {
            Some(c) => (c.fullscreen, c.urgent),
            None => return,
        };
        match message {
            ClientMessage::Fullscreen(action) => {
                let on = match action {
                    StateAction::Add => true,
                    StateAction::Remove => false,
                    StateAction::Toggle => !fullscreen,
                };
                self.set_fullscreen(id, on);
            }
            ClientMessage::Activate => {
                if self.selected() != Some(id) && !urgent {
                    self.set_urgent(id, true);
                    self.conn.set_window_border_color(id, self.config.urgent_border_color);
                    self.draw_bars();
                }
            }
            ClientMessage::Other => (),
        }
    }

    /// The keyboard mapping changed: resolve the bindings again.
    fn refresh_key_bindings(&mut self) {
        let rebuilt = self.conn.keycodes().map_err(|e| e.to_string()).and_then(|codes| {
            let numlock = self.conn.numlock_mask(&codes);
            Bindings::new(&self.config, &codes, numlock).map_err(|e| e.to_string())
        });
        match rebuilt {
            Ok(bindings) => {
                self.bindings = bindings;
                self.conn.grab_keys(&self.bindings.grabbed_keys());
            }
            Err(e) => warn!("keeping the previous key bindings: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bindings::MOD_SUPER,
        geometry::SizeHints,
        mock::{test_config, MockConn},
        tag::bit,
    };
    use pretty_assertions::assert_eq;

    fn setup(conn: &MockConn) -> WindowManager<'_, MockConn> {
        WindowManager::new(conn, test_config()).unwrap()
    }

    fn map(wm: &mut WindowManager<'_, MockConn>, conn: &MockConn, id: Window) {
        conn.add_window(id, Rectangle::new(50, 50, 300, 200));
        wm.handle_event(XEvent::MapRequest { id, ignore: false });
    }

    #[test]
    fn override_redirect_and_known_windows_are_not_managed_twice() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        conn.add_window(10, Rectangle::new(0, 0, 10, 10));
        wm.handle_event(XEvent::MapRequest { id: 10, ignore: true });
        assert!(wm.client(10).is_none());

        map(&mut wm, &conn, 11);
        wm.handle_event(XEvent::MapRequest { id: 11, ignore: false });
        assert_eq!(wm.monitor(0).clients(), &[11]);
    }

    #[test]
    fn destroy_and_unmap_end_management() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        map(&mut wm, &conn, 12);

        wm.handle_event(XEvent::UnmapNotify { id: 12, synthetic: true });
        assert!(wm.client(12).is_some());
        assert_eq!(conn.states.borrow().get(&12), Some(&WmState::Withdrawn));

        wm.handle_event(XEvent::UnmapNotify { id: 12, synthetic: false });
        wm.handle_event(XEvent::DestroyNotify { id: 11 });
        assert_eq!(wm.monitor(0).clients(), &[10]);
        assert_eq!(wm.focused_client(), Some(10));
        // a destroyed window is not touched any more
        assert!(!conn.configured.borrow().contains(&(11, None, Some(0))));
    }

    #[test]
    fn entering_a_client_focuses_it() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);

        wm.handle_event(XEvent::EnterNotify {
            id: 10,
            normal: false,
            is_root: false,
        });
        assert_eq!(wm.focused_client(), Some(11));
        wm.handle_event(XEvent::EnterNotify {
            id: 10,
            normal: true,
            is_root: false,
        });
        assert_eq!(wm.focused_client(), Some(10));
        assert_eq!(conn.focused.get(), Some(10));
        assert_eq!(conn.border_color(10), Some(wm.config.focused_border_color));
        assert_eq!(conn.border_color(11), Some(wm.config.unfocused_border_color));
    }

    #[test]
    fn stolen_focus_is_handed_back() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        conn.focused.set(Some(10));
        wm.handle_event(XEvent::FocusIn { id: 10 });
        assert_eq!(conn.focused.get(), Some(11));
    }

    #[test]
    fn configure_requests_depend_on_management_and_tiling() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        let req = ConfigureRequest {
            id: 99,
            x: Some(5),
            w: Some(40),
            ..ConfigureRequest::default()
        };
        wm.handle_event(XEvent::ConfigureRequest(req));
        assert_eq!(*conn.forwarded.borrow(), vec![req]);

        map(&mut wm, &conn, 10);
        let tiled = wm.client(10).unwrap().rect();
        conn.notified.borrow_mut().clear();
        wm.handle_event(XEvent::ConfigureRequest(ConfigureRequest { id: 10, ..req }));
        assert_eq!(wm.client(10).unwrap().rect(), tiled);
        assert_eq!(*conn.notified.borrow(), vec![(10, tiled)]);

        wm.run_action(crate::actions::Action::ToggleFloating);
        wm.handle_event(XEvent::ConfigureRequest(ConfigureRequest {
            id: 10,
            x: Some(100),
            y: Some(120),
            w: Some(200),
            h: Some(100),
            ..ConfigureRequest::default()
        }));
        assert_eq!(wm.client(10).unwrap().rect(), Rectangle::new(100, 120, 200, 100));

        // too wide for the monitor: centred
        wm.handle_event(XEvent::ConfigureRequest(ConfigureRequest {
            id: 10,
            x: Some(1100),
            ..ConfigureRequest::default()
        }));
        assert_eq!(wm.client(10).unwrap().rect().x, 600 - 102);
    }

    #[test]
    fn fullscreen_requests_follow_the_state_action() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        let fs = |action| XEvent::ClientMessage {
            id: 10,
            message: ClientMessage::Fullscreen(action),
        };
        wm.handle_event(fs(StateAction::Toggle));
        assert!(wm.client(10).unwrap().is_fullscreen());
        wm.handle_event(fs(StateAction::Add));
        assert!(wm.client(10).unwrap().is_fullscreen());
        wm.handle_event(fs(StateAction::Remove));
        assert!(!wm.client(10).unwrap().is_fullscreen());
    }

    #[test]
    fn activation_requests_mark_other_clients_urgent() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        let activate = |id| XEvent::ClientMessage {
            id,
            message: ClientMessage::Activate,
        };
        wm.handle_event(activate(11));
        assert!(!wm.client(11).unwrap().is_urgent());
        wm.handle_event(activate(10));
        assert!(wm.client(10).unwrap().is_urgent());
        assert_eq!(conn.bars.borrow().get(&0).map(|b| b.urgent), Some(bit(0)));

        // focusing clears urgency
        wm.focus(Some(10));
        assert!(!wm.client(10).unwrap().is_urgent());
    }

    #[test]
    fn size_hint_changes_are_read_on_the_next_resize() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        conn.set_size_hints(
            10,
            SizeHints {
                min_w: 300,
                min_h: 200,
                max_w: 300,
                max_h: 200,
                ..SizeHints::default()
            },
        );
        wm.handle_event(XEvent::PropertyNotify {
            id: 10,
            prop: Property::NormalHints,
            is_root: false,
            deleted: false,
        });
        assert!(!wm.client(10).unwrap().hints_valid);

        wm.run_action(crate::actions::Action::ToggleFloating);
        let c = wm.client(10).unwrap();
        assert!(c.hints_valid);
        assert_eq!((c.rect().w, c.rect().h), (300, 200));
    }

    #[test]
    fn root_name_changes_refresh_the_status() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        conn.root_name.replace(Some("load 0.42".into()));
        wm.handle_event(XEvent::PropertyNotify {
            id: conn.root(),
            prop: Property::Name,
            is_root: true,
            deleted: false,
        });
        assert_eq!(wm.status, "load 0.42");
    }

    #[test]
    fn button_bindings_run_on_client_windows() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        wm.handle_event(XEvent::ButtonPress {
            id: 10,
            rpt: Point::new(5, 5),
            state: MOD_SUPER,
            button: 2,
        });
        assert_eq!(wm.focused_client(), Some(10));
        assert!(wm.client(10).unwrap().is_floating());
        assert_eq!(conn.replays.get(), 1);
    }

    #[test]
    fn hidden_clients_are_parked_off_screen() {
        let conn = MockConn::default();
        let mut wm = setup(&conn);
        map(&mut wm, &conn, 10);
        let r = wm.client(10).unwrap().rect();
        wm.run_action(crate::actions::Action::SwitchWorkspace(Some(1)));
        let last = conn
            .configured
            .borrow()
            .iter()
            .rev()
            .find(|(id, r, _)| *id == 10 && r.is_some())
            .and_then(|(_, r, _)| *r);
        assert_eq!(last, Some(Rectangle { x: -2 * 1200, ..r }));
        assert_eq!(wm.client(10).unwrap().rect(), r);
    }
}
