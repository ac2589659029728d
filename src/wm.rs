use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use xcb::Window;

use crate::{
    bindings::Bindings,
    client::Client,
    config::Config,
    geometry::{self, Bounds, Rectangle},
    interaction::Mode,
    layout::Tiled,
    monitor::Monitor,
    rules::{self, WindowProps},
    status::BarContent,
    tag,
    xconnection::{Protocol, WindowAttributes, WmState, XConn, XEvent},
};

const BROKEN_TITLE: &str = "broken";

/**
 * The window manager state and the reactor driving it.
 *
 * Clients live in a single arena keyed by window ID; each [Monitor] orders
 * the IDs it owns by creation and by focus history.
 */
pub struct WindowManager<'a, X: XConn> {
    pub(crate) conn: &'a X,
    pub(crate) config: Config,
    pub(crate) bindings: Bindings,
    pub(crate) clients: HashMap<Window, Client>,
    pub(crate) monitors: Vec<Monitor>,
    pub(crate) selmon: usize,
    /// Size of the root window
    pub(crate) screen: Rectangle,
    pub(crate) mode: Mode,
    /// Events set aside while a move or resize holds the pointer
    pub(crate) deferred: VecDeque<XEvent>,
    /// Monitor the pointer was last seen on by root motion events
    pub(crate) motion_mon: Option<usize>,
    pub(crate) status: String,
    running: bool,
}

impl<'a, X: XConn> WindowManager<'a, X> {
    /// Take over the display: validate the configuration, query the outputs
    /// and adopt the windows that are already mapped.
    pub fn new(conn: &'a X, config: Config) -> Result<Self> {
        config.validate()?;
        conn.register_wm()?;
        let keycodes = conn.keycodes()?;
        let numlock = conn.numlock_mask(&keycodes);
        let bindings = Bindings::new(&config, &keycodes, numlock)?;

        let mut wm = WindowManager {
            conn,
            config,
            bindings,
            clients: HashMap::new(),
            monitors: vec![],
            selmon: 0,
            screen: conn.screen_rect(),
            mode: Mode::Normal,
            deferred: VecDeque::new(),
            motion_mon: None,
            status: String::new(),
            running: false,
        };

        wm.update_geometry();
        wm.update_status();
        wm.conn.grab_keys(&wm.bindings.grabbed_keys());
        wm.scan();
        wm.focus(None);
        wm.arrange(None);
        wm.conn.flush();

        Ok(wm)
    }

    /// Run the event loop until a quit action. Fatal connection errors are
    /// returned after cleaning up.
    pub fn run(&mut self) -> Result<()> {
        self.running = true;
        while self.running {
            let timeout = if self.any_bar_visible() {
                Some(self.config.bar_refresh)
            } else {
                None
            };
            match self.conn.wait_for_event(timeout) {
                Ok(Some(event)) => {
                    self.handle_event(event);
                    while self.running {
                        match self.conn.poll_for_event() {
                            Ok(Some(event)) => self.handle_event(event),
                            Ok(None) => break,
                            Err(e) => return self.abort(e),
                        }
                    }
                }
                Ok(None) => {
                    self.update_status();
                    self.draw_bars();
                }
                Err(e) => return self.abort(e),
            }
            self.conn.flush();
        }
        self.cleanup();
        Ok(())
    }

    fn abort(&mut self, e: anyhow::Error) -> Result<()> {
        error!("{:#}", e);
        self.cleanup();
        Err(e)
    }

    /// Shut down the WindowManager at the end of the current loop iteration
    pub fn exit(&mut self) {
        self.running = false;
    }

    /// Hand every client back in a sane state and release our grabs.
    fn cleanup(&mut self) {
        let ids: Vec<_> = self.monitors.iter().flat_map(|m| m.stack.clone()).collect();
        for id in ids {
            self.unmanage(id, false);
        }
        self.conn.cleanup();
    }

    /// Adopt windows that were mapped (or iconified) before we started.
    /// Transients go last so their parents are already known.
    fn scan(&mut self) {
        let mut transients = vec![];
        for id in self.conn.existing_windows() {
            let attrs = match self.conn.window_attributes(id) {
                Some(a) if !a.override_redirect => a,
                _ => continue,
            };
            if !attrs.viewable && self.conn.wm_state(id) != Some(WmState::Iconic) {
                continue;
            }
            if self.conn.transient_for(id).is_some() {
                transients.push((id, attrs));
            } else {
                self.manage(id, attrs);
            }
        }
        for (id, attrs) in transients {
            self.manage(id, attrs);
        }
    }

    /*
     * Accessors
     */

    pub fn client(&self, id: Window) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn monitor(&self, m: usize) -> &Monitor {
        &self.monitors[m]
    }

    pub fn selected_monitor(&self) -> usize {
        self.selmon
    }

    /// The selected client of the selected monitor
    pub fn focused_client(&self) -> Option<Window> {
        self.selected()
    }

    pub(crate) fn selected(&self) -> Option<Window> {
        self.monitors[self.selmon].sel
    }

    pub(crate) fn is_visible(&self, id: Window) -> bool {
        self.clients
            .get(&id)
            .map_or(false, |c| c.is_visible_on(self.monitors[c.monitor].ws().tags()))
    }

    pub(crate) fn layout_arranges(&self, m: usize) -> bool {
        self.config
            .layouts
            .get(self.monitors[m].ws().layout())
            .map_or(false, |l| l.arranges())
    }

    fn first_visible(&self, m: usize) -> Option<Window> {
        self.monitors[m].stack.iter().copied().find(|&id| self.is_visible(id))
    }

    fn any_bar_visible(&self) -> bool {
        self.monitors.iter().any(|m| m.ws().show_bar)
    }

    /*
     * Client registry
     */

    pub(crate) fn attach(&mut self, id: Window) {
        if let Some(c) = self.clients.get(&id) {
            self.monitors[c.monitor].clients.push(id);
        }
    }

    pub(crate) fn detach(&mut self, id: Window) {
        if let Some(c) = self.clients.get(&id) {
            self.monitors[c.monitor].clients.retain(|&w| w != id);
        }
    }

    pub(crate) fn attach_stack(&mut self, id: Window) {
        if let Some(c) = self.clients.get(&id) {
            self.monitors[c.monitor].stack.insert(0, id);
        }
    }

    /// Remove from the focus history. Removing the selected client selects
    /// the most recent one still visible.
    pub(crate) fn detach_stack(&mut self, id: Window) {
        let m = match self.clients.get(&id) {
            Some(c) => c.monitor,
            None => return,
        };
        self.monitors[m].stack.retain(|&w| w != id);
        if self.monitors[m].sel == Some(id) {
            self.monitors[m].sel = self.first_visible(m);
        }
    }

    fn update_client_list(&self) {
        let ids: Vec<Window> = self.monitors.iter().flat_map(|m| m.clients.iter().copied()).collect();
        self.conn.update_client_list(&ids);
    }

    /*
     * Focus and stacking
     */

    /// Select `id`, or the most recently focused visible client when it is
    /// absent or hidden, and give it input focus.
    pub(crate) fn focus(&mut self, id: Option<Window>) {
        let id = id
            .filter(|&w| self.is_visible(w))
            .or_else(|| self.first_visible(self.selmon));
        if let Some(prev) = self.selected() {
            if Some(prev) != id {
                self.unfocus(prev, false);
            }
        }
        match id {
            Some(w) => {
                let (m, urgent) = match self.clients.get(&w) {
                    Some(c) => (c.monitor, c.urgent),
                    None => return,
                };
                self.selmon = m;
                if urgent {
                    self.set_urgent(w, false);
                }
                self.detach_stack(w);
                self.attach_stack(w);
                self.grab_buttons(w, true);
                self.conn.set_window_border_color(w, self.config.focused_border_color);
                self.set_focus(w);
            }
            None => self.conn.focus_nothing(),
        }
        self.monitors[self.selmon].sel = id;
        self.draw_bars();
    }

    pub(crate) fn unfocus(&mut self, id: Window, drop_input: bool) {
        if !self.clients.contains_key(&id) {
            return;
        }
        self.grab_buttons(id, false);
        self.conn.set_window_border_color(id, self.config.unfocused_border_color);
        if drop_input {
            self.conn.focus_nothing();
        }
    }

    pub(crate) fn set_focus(&self, id: Window) {
        if let Some(c) = self.clients.get(&id) {
            if !c.never_focus {
                self.conn.focus_window(id);
            }
            self.conn.send_protocol(id, Protocol::TakeFocus);
        }
    }

    pub(crate) fn grab_buttons(&self, id: Window, focused: bool) {
        self.conn.grab_buttons(id, focused, &self.bindings.grabbed_buttons());
    }

    /// Raise the selected floating client and stack tiled clients below each
    /// other in focus order.
    pub(crate) fn restack(&mut self, m: usize) {
        self.draw_bar(m);
        let sel = match self.monitors[m].sel.and_then(|id| self.clients.get(&id)) {
            Some(c) => c,
            None => return,
        };
        let arranges = self.layout_arranges(m);
        if sel.floating || !arranges {
            self.conn.configure_window(sel.id(), None, None, Some(true));
        }
        if arranges {
            let mut sibling = None;
            for &id in &self.monitors[m].stack {
                if self.is_visible(id) && self.clients.get(&id).map_or(false, |c| !c.floating) {
                    self.conn.stack_below(id, sibling);
                    sibling = Some(id);
                }
            }
        }
        self.conn.flush();
        self.conn.discard_enter_events();
    }

    pub(crate) fn set_urgent(&mut self, id: Window, urgent: bool) {
        if let Some(c) = self.clients.get_mut(&id) {
            c.urgent = urgent;
            self.conn.set_urgency_hint(id, urgent);
        }
    }

    /*
     * Arrangement
     */

    /// Show, hide and lay out the clients of one monitor, or of all of them.
    pub(crate) fn arrange(&mut self, m: Option<usize>) {
        let targets: Vec<usize> = match m {
            Some(m) => vec![m],
            None => (0..self.monitors.len()).collect(),
        };
        for &m in &targets {
            self.show_hide(m);
        }
        for &m in &targets {
            self.arrange_monitor(m);
        }
        if let Some(m) = m {
            self.restack(m);
        }
    }

    fn arrange_monitor(&mut self, m: usize) {
        let mon = &self.monitors[m];
        let ws = mon.ws();
        let layout = match self.config.layouts.get(ws.layout()) {
            Some(l) => l,
            None => return,
        };
        let tags = ws.tags();
        let visible: Vec<&Client> = mon
            .clients
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|c| c.is_visible_on(tags))
            .collect();
        let tiled: Vec<Tiled> = visible
            .iter()
            .filter(|c| c.is_tiled())
            .map(|c| Tiled {
                id: c.id(),
                tags: c.tags,
                border: c.border,
            })
            .collect();

        let arrangement = layout.arrange(&ws.tile_params(), mon.work, &tiled, visible.len());
        self.monitors[m].layout_symbol = arrangement.symbol;
        for (id, r) in arrangement.placements {
            self.resize(id, r, false);
        }
    }

    /// Move visible clients into place and park hidden ones left of the
    /// screen. Their recorded geometry is kept for when they come back.
    fn show_hide(&mut self, m: usize) {
        let arranges = self.layout_arranges(m);
        let stack = self.monitors[m].stack.clone();
        let (shown, hidden): (Vec<Window>, Vec<Window>) =
            stack.into_iter().partition(|&id| self.is_visible(id));

        for id in shown {
            let c = match self.clients.get(&id) {
                Some(c) => c,
                None => continue,
            };
            let r = c.rect;
            self.conn.configure_window(id, Some(r), None, None);
            if (!arranges || c.floating) && !c.fullscreen {
                self.resize(id, r, false);
            }
        }
        for &id in hidden.iter().rev() {
            if let Some(c) = self.clients.get(&id) {
                let parked = Rectangle {
                    x: -2 * c.outer_width() as i32,
                    ..c.rect
                };
                self.conn.configure_window(id, Some(parked), None, None);
            }
        }
    }

    /// Constrain and apply a requested geometry; nothing is sent to the
    /// server when the result matches the current one.
    pub(crate) fn resize(&mut self, id: Window, r: Rectangle, interact: bool) {
        if let Some(r) = self.constrain(id, r, interact) {
            self.resize_client(id, r);
        }
    }

    fn constrain(&mut self, id: Window, req: Rectangle, interact: bool) -> Option<Rectangle> {
        let stale = !self.clients.get(&id)?.hints_valid;
        if stale {
            let hints = self.conn.size_hints(id);
            self.clients.get_mut(&id)?.set_hints(hints);
        }
        let c = self.clients.get(&id)?;
        let bounds = if interact {
            Bounds::Screen(self.screen)
        } else {
            Bounds::WorkArea(self.monitors[c.monitor].work)
        };
        let honour = c.floating || !self.layout_arranges(c.monitor);
        let r = geometry::apply_size_hints(
            req,
            c.rect,
            c.border,
            &c.hints,
            bounds,
            self.config.bar_height,
            honour,
        );
        if r != c.rect {
            Some(r)
        } else {
            None
        }
    }

    /// Commit a geometry unconditionally.
    pub(crate) fn resize_client(&mut self, id: Window, r: Rectangle) {
        if let Some(c) = self.clients.get_mut(&id) {
            c.set_rect(r);
            self.conn.configure_window(id, Some(r), Some(c.border), None);
            self.conn.send_configure_notify(id, r, c.border);
        }
    }

    /// Tell a client where it is without moving it.
    pub(crate) fn configure(&self, id: Window) {
        if let Some(c) = self.clients.get(&id) {
            self.conn.send_configure_notify(id, c.rect, c.border);
        }
    }

    /*
     * Client lifecycle
     */

    pub(crate) fn manage(&mut self, id: Window, attrs: WindowAttributes) {
        let mut c = Client::new(id, attrs.rect, attrs.border);
        c.name = self.conn.get_wm_name(id).unwrap_or_else(|_| BROKEN_TITLE.into());
        if let Ok((instance, class)) = self.conn.get_wm_class(id) {
            c.instance = instance;
            c.class = class;
        }

        let parent = self
            .conn
            .transient_for(id)
            .and_then(|p| self.clients.get(&p))
            .map(|p| (p.monitor, p.tags));
        match parent {
            Some((m, tags)) => {
                c.monitor = m;
                c.tags = tags;
            }
            None => {
                c.monitor = self.selmon;
                self.apply_rules(&mut c);
            }
        }

        let work = self.monitors[c.monitor].work;
        if c.rect.x + c.outer_width() as i32 > work.right() {
            c.rect.x = work.right() - c.outer_width() as i32;
        }
        if c.rect.y + c.outer_height() as i32 > work.bottom() {
            c.rect.y = work.bottom() - c.outer_height() as i32;
        }
        c.rect.x = c.rect.x.max(work.x);
        c.rect.y = c.rect.y.max(work.y);
        c.old_rect = c.rect;
        c.border = self.config.border_width_px;

        self.conn.configure_window(id, None, Some(c.border), None);
        self.conn.set_window_border_color(id, self.config.unfocused_border_color);
        self.conn.send_configure_notify(id, c.rect, c.border);
        c.set_hints(self.conn.size_hints(id));
        if let Some(hints) = self.conn.wm_hints(id) {
            c.urgent = hints.urgent;
            c.never_focus = hints.input == Some(false);
        }
        if !c.floating {
            c.floating = parent.is_some() || c.fixed;
        }
        let types = self.conn.window_types(id);
        if types.iter().any(|t| self.config.floating_window_types.contains(&t.as_str())) {
            c.floating = true;
        }

        self.conn.mark_new_window(id);
        self.grab_buttons(id, false);
        if c.floating {
            self.conn.configure_window(id, None, None, Some(true));
        }

        info!("managing window {} ({}) on monitor {} with tags {:#x}", id, c.class, c.monitor, c.tags);
        let m = c.monitor;
        let parked = Rectangle {
            x: c.rect.x + 2 * self.screen.w as i32,
            ..c.rect
        };
        self.clients.insert(id, c);
        self.attach(id);
        self.attach_stack(id);
        self.update_client_list();
        // keep it out of sight until arranged
        self.conn.configure_window(id, Some(parked), None, None);
        self.conn.set_client_state(id, WmState::Normal);
        if self.conn.requests_fullscreen(id) {
            self.set_fullscreen(id, true);
        }
        if m == self.selmon {
            if let Some(prev) = self.selected() {
                self.unfocus(prev, false);
            }
        }
        // the new client is at the head of the stack when it is visible
        self.monitors[m].sel = self.first_visible(m);
        self.arrange(Some(m));
        self.conn.map_window(id);
        self.focus(None);
    }

    /// Run the rule table for a client that has no transient parent. A client
    /// matched by no tag-setting rule gets the spawn tags of its workspace.
    pub(crate) fn apply_rules(&mut self, c: &mut Client) {
        let title = c.name.clone();
        let outcome = rules::apply_rules(
            &self.config.rules,
            &self.config.class_aliases,
            WindowProps {
                class: &c.class,
                instance: &c.instance,
                title: &title,
            },
        );
        if let Some(m) = outcome.monitor.filter(|&m| m < self.monitors.len()) {
            c.monitor = m;
        }
        let ws = self.monitors[c.monitor].ws_mut();
        c.floating = outcome.floating.unwrap_or(ws.spawn_floating);
        if let Some(o) = outcome.workspace {
            if let Some(caps) = o.caps {
                ws.caps = caps;
            }
            if let Some(vf) = o.vf {
                ws.vf = vf;
            }
            if let Some(show_bar) = o.show_bar {
                ws.show_bar = show_bar;
            }
            if let Some(layout) = o.layout {
                ws.set_layout(Some(layout));
            }
            let bar_height = self.config.bar_height;
            self.monitors[c.monitor].update_bar_pos(bar_height);
        }
        let tags = outcome.tags & tag::all(self.config.tags.len());
        c.tags = if tags != 0 {
            tags
        } else {
            self.monitors[c.monitor].ws().spawn_tags()
        };
    }

    /// Stop managing a client. A window that still exists gets its original
    /// border back and is marked withdrawn.
    pub(crate) fn unmanage(&mut self, id: Window, destroyed: bool) {
        let (m, old_border) = match self.clients.get(&id) {
            Some(c) => (c.monitor, c.old_border),
            None => return,
        };
        if self.mode.client() == Some(id) {
            self.conn.ungrab_pointer();
            self.mode = Mode::Normal;
        }
        self.detach(id);
        self.detach_stack(id);
        if !destroyed {
            self.conn.configure_window(id, None, Some(old_border), None);
            self.conn.grab_buttons(id, true, &[]);
            self.conn.set_client_state(id, WmState::Withdrawn);
        }
        self.clients.remove(&id);
        info!("unmanaged window {}", id);
        self.focus(None);
        self.update_client_list();
        self.arrange(Some(m));
    }

    /// Enter or leave fullscreen. The previous geometry, border and floating
    /// state come back on leaving.
    pub(crate) fn set_fullscreen(&mut self, id: Window, fullscreen: bool) {
        let c = match self.clients.get_mut(&id) {
            Some(c) => c,
            None => return,
        };
        if fullscreen && !c.fullscreen {
            self.conn.set_fullscreen_state(id, true);
            c.fullscreen = true;
            c.old_floating = c.floating;
            c.old_border = c.border;
            c.border = 0;
            c.floating = true;
            let screen = self.monitors[c.monitor].screen;
            self.resize_client(id, screen);
            self.conn.configure_window(id, None, None, Some(true));
        } else if !fullscreen && c.fullscreen {
            self.conn.set_fullscreen_state(id, false);
            c.fullscreen = false;
            c.floating = c.old_floating;
            c.border = c.old_border;
            let (m, r) = (c.monitor, c.old_rect);
            self.resize_client(id, r);
            self.arrange(Some(m));
        }
    }

    /// Cover the monitor again after its size changed, keeping the geometry
    /// saved on entering fullscreen.
    pub(crate) fn fit_fullscreen(&mut self, id: Window) {
        if let Some(c) = self.clients.get_mut(&id) {
            let screen = self.monitors[c.monitor].screen;
            if c.fullscreen && c.rect != screen {
                c.rect = screen;
                self.conn.configure_window(id, Some(screen), Some(c.border), None);
                self.conn.send_configure_notify(id, screen, c.border);
            }
        }
    }

    /// Move a client to monitor `m`, where it takes the spawn tags of the
    /// active workspace.
    pub(crate) fn send_to_monitor(&mut self, id: Window, m: usize) {
        match self.clients.get(&id) {
            Some(c) if c.monitor != m && m < self.monitors.len() => (),
            _ => return,
        }
        self.unfocus(id, true);
        self.detach(id);
        self.detach_stack(id);
        let tags = self.monitors[m].ws().spawn_tags();
        if let Some(c) = self.clients.get_mut(&id) {
            c.monitor = m;
            c.tags = tags;
        }
        self.attach(id);
        self.attach_stack(id);
        self.focus(None);
        self.arrange(None);
    }

    pub(crate) fn update_title(&mut self, id: Window) {
        let name = self.conn.get_wm_name(id).unwrap_or_else(|_| BROKEN_TITLE.into());
        if let Some(c) = self.clients.get_mut(&id) {
            c.name = name;
        }
    }

    pub(crate) fn update_window_type(&mut self, id: Window) {
        if self.conn.requests_fullscreen(id) {
            self.set_fullscreen(id, true);
        }
        let types = self.conn.window_types(id);
        if types.iter().any(|t| self.config.floating_window_types.contains(&t.as_str())) {
            if let Some(c) = self.clients.get_mut(&id) {
                c.floating = true;
            }
        }
    }

    /// Re-read WM_HINTS. The selected client never stays urgent.
    pub(crate) fn update_wm_hints(&mut self, id: Window) {
        let hints = match self.conn.wm_hints(id) {
            Some(h) => h,
            None => return,
        };
        let selected = self.selected() == Some(id);
        if let Some(c) = self.clients.get_mut(&id) {
            if selected && hints.urgent {
                self.conn.set_urgency_hint(id, false);
            } else {
                c.urgent = hints.urgent;
                if c.urgent {
                    self.conn.set_window_border_color(id, self.config.urgent_border_color);
                }
            }
            c.never_focus = hints.input == Some(false);
        }
    }

    /*
     * Bar state
     */

    /// Refresh the status text from the root window name.
    pub(crate) fn update_status(&mut self) {
        self.status = self
            .conn
            .root_name()
            .unwrap_or_else(|| format!("splitwm-{}", env!("CARGO_PKG_VERSION")));
        self.draw_bar(self.selmon);
    }

    pub(crate) fn draw_bar(&self, m: usize) {
        let mon = &self.monitors[m];
        let ws = mon.ws();
        if !ws.show_bar {
            return;
        }
        let (occupied, urgent) = mon
            .clients
            .iter()
            .filter_map(|id| self.clients.get(id))
            .fold((0, 0), |(occ, urg), c| {
                (occ | c.tags, if c.urgent { urg | c.tags } else { urg })
            });
        let bar = BarContent {
            workspace: mon.active_ws,
            views: ws.views(),
            occupied,
            urgent,
            layout_symbol: mon.layout_symbol.clone(),
            title: mon.sel.and_then(|id| self.clients.get(&id)).map(|c| c.name.clone()),
            status: if m == self.selmon {
                Some(self.status.clone())
            } else {
                None
            },
        };
        self.conn.publish_bar(m, &bar);
    }

    pub(crate) fn draw_bars(&self) {
        for m in 0..self.monitors.len() {
            self.draw_bar(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::Action,
        bindings::{MOD_SHIFT, MOD_SUPER},
        mock::{test_config, MockConn},
        rules::Rule,
        tag::bit,
        xconnection::XcbKey,
    };
    use pretty_assertions::assert_eq;

    fn wm(conn: &MockConn) -> WindowManager<'_, MockConn> {
        WindowManager::new(conn, test_config()).unwrap()
    }

    fn map(wm: &mut WindowManager<'_, MockConn>, conn: &MockConn, id: Window) {
        conn.add_window(id, Rectangle::new(50, 50, 300, 200));
        wm.map_request(id);
    }

    #[test]
    fn managed_clients_always_carry_tags() {
        let conn = MockConn::default();
        let mut config = test_config();
        config.rules = vec![Rule {
            class: Some("Editor"),
            floating: true,
            ..Rule::default()
        }];
        let mut wm = WindowManager::new(&conn, config).unwrap();

        conn.add_window(10, Rectangle::new(0, 0, 100, 100));
        conn.set_class(10, "editor", "Editor");
        wm.map_request(10);
        let c = wm.client(10).unwrap();
        assert_eq!(c.tags(), bit(0));
        assert!(c.is_floating());

        // nothing viewed: the first tag is the fallback
        wm.run_action(Action::ClearViews);
        map(&mut wm, &conn, 11);
        assert_eq!(wm.client(11).unwrap().tags(), bit(0));

        wm.run_action(Action::SetView { view: 1, tag: 5 });
        map(&mut wm, &conn, 12);
        assert_eq!(wm.client(12).unwrap().tags(), bit(5));
    }

    #[test]
    fn clients_sent_to_an_unviewed_tag_elsewhere_are_not_selected() {
        let conn = MockConn::default();
        *conn.regions.borrow_mut() = vec![
            Rectangle::new(0, 0, 1000, 718),
            Rectangle::new(1000, 0, 1000, 718),
        ];
        let mut config = test_config();
        config.rules = vec![Rule {
            class: Some("Mail"),
            tags: bit(7),
            monitor: Some(1),
            ..Rule::default()
        }];
        let mut wm = WindowManager::new(&conn, config).unwrap();
        wm.selmon = 1;
        conn.add_window(30, Rectangle::new(1100, 100, 300, 200));
        wm.map_request(30);
        wm.selmon = 0;

        conn.add_window(40, Rectangle::new(100, 100, 300, 200));
        conn.set_class(40, "mail", "Mail");
        wm.map_request(40);

        assert_eq!(wm.client(40).unwrap().monitor(), 1);
        assert_eq!(wm.client(40).unwrap().tags(), bit(7));
        assert_eq!(wm.monitor(1).sel(), Some(30));
        assert_eq!(wm.monitor(1).stack(), &[40, 30]);

        // nothing else visible there: no selection at all
        wm.unmanage(30, false);
        assert_eq!(wm.monitor(1).sel(), None);
    }

    #[test]
    fn rules_can_retag_and_rebind_workspace_defaults() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        conn.add_window(10, Rectangle::new(0, 0, 100, 100));
        conn.set_class(10, "chromium", "chromium-browser");
        wm.map_request(10);

        assert_eq!(wm.client(10).unwrap().tags(), bit(8));
        assert!((wm.monitor(0).ws().vf - 0.7).abs() < 1e-6);
    }

    #[test]
    fn new_clients_are_focused_and_tiled() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);

        assert_eq!(wm.focused_client(), Some(11));
        assert_eq!(conn.focused.get(), Some(11));
        assert_eq!(wm.monitor(0).clients(), &[10, 11]);
        assert_eq!(wm.monitor(0).stack(), &[11, 10]);
        assert_eq!(wm.client(10).unwrap().rect(), Rectangle::new(0, 18, 1196, 396));
        assert_eq!(wm.client(11).unwrap().rect(), Rectangle::new(0, 418, 1196, 396));
        assert_eq!(*conn.client_list.borrow(), vec![10, 11]);
        assert_eq!(conn.states.borrow().get(&10), Some(&WmState::Normal));
    }

    #[test]
    fn two_populated_views_split_the_work_area() {
        let conn = MockConn::default();
        let mut config = test_config();
        config.workspaces[0].views = [Some(0), Some(1)];
        config.workspaces[0].vf = 0.6;
        let mut wm = WindowManager::new(&conn, config).unwrap();

        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        map(&mut wm, &conn, 12);
        wm.run_action(Action::Tag(1));

        let rect = |id| wm.client(id).unwrap().rect();
        assert_eq!(rect(10), Rectangle::new(0, 18, 716, 396));
        assert_eq!(rect(11), Rectangle::new(0, 418, 716, 396));
        assert_eq!(rect(12), Rectangle::new(720, 18, 476, 796));
    }

    #[test]
    fn losing_the_selection_picks_the_most_recent_visible_client() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        for id in 10..14 {
            map(&mut wm, &conn, id);
        }
        wm.focus(Some(11));
        wm.focus(Some(13));
        // hide 12, the next in line after 11
        wm.clients.get_mut(&12).unwrap().tags = bit(4);
        assert_eq!(wm.monitor(0).stack(), &[13, 11, 12, 10]);

        wm.detach_stack(13);
        assert_eq!(wm.monitor(0).sel(), Some(11));
        wm.attach_stack(13);

        wm.focus(Some(10));
        wm.clients.get_mut(&11).unwrap().tags = bit(4);
        wm.detach_stack(10);
        assert_eq!(wm.monitor(0).sel(), Some(13));
    }

    #[test]
    fn fullscreen_round_trip_restores_geometry_border_and_floating() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        wm.run_action(Action::ToggleFloating);
        let before = wm.client(11).unwrap().clone();

        wm.set_fullscreen(11, true);
        let c = wm.client(11).unwrap();
        assert!(c.is_fullscreen());
        assert_eq!(c.border(), 0);
        assert_eq!(c.rect(), wm.monitor(0).screen());
        assert_eq!(conn.fullscreen_state(11), Some(true));

        wm.set_fullscreen(11, false);
        let c = wm.client(11).unwrap();
        assert!(!c.is_fullscreen());
        assert_eq!(c.rect(), before.rect());
        assert_eq!(c.border(), before.border());
        assert_eq!(c.is_floating(), before.is_floating());

        // a tiled client goes back to tiling
        wm.focus(Some(10));
        wm.set_fullscreen(10, true);
        assert!(wm.client(10).unwrap().is_floating());
        wm.set_fullscreen(10, false);
        assert!(!wm.client(10).unwrap().is_floating());
    }

    #[test]
    fn unmanaging_restores_the_border_and_refocuses() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        map(&mut wm, &conn, 11);
        wm.unmanage(11, false);

        assert!(wm.client(11).is_none());
        assert_eq!(wm.focused_client(), Some(10));
        assert_eq!(wm.monitor(0).clients(), &[10]);
        assert_eq!(conn.states.borrow().get(&11), Some(&WmState::Withdrawn));
        assert!(conn.configured.borrow().contains(&(11, None, Some(0))));
        assert_eq!(*conn.client_list.borrow(), vec![10]);
    }

    #[test]
    fn transients_follow_their_parent_and_float() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        wm.run_action(Action::Tag(3));
        conn.add_window(11, Rectangle::new(0, 0, 50, 50));
        conn.set_transient_for(11, 10);
        wm.map_request(11);
        let c = wm.client(11).unwrap();
        assert_eq!(c.tags(), bit(3));
        assert!(c.is_floating());
    }

    #[test]
    fn existing_windows_are_adopted_at_startup() {
        let conn = MockConn::default();
        conn.add_window(10, Rectangle::new(0, 0, 100, 100));
        conn.add_window(11, Rectangle::new(0, 0, 100, 100));
        conn.set_transient_for(11, 10);
        conn.add_window(12, Rectangle::new(0, 0, 100, 100));
        conn.set_override_redirect(12);
        *conn.existing.borrow_mut() = vec![11, 10, 12];

        let wm = wm(&conn);
        assert_eq!(wm.monitor(0).clients(), &[10, 11]);
        assert!(wm.client(12).is_none());
    }

    #[test]
    fn bar_state_is_published_for_the_selected_monitor() {
        let conn = MockConn::default();
        conn.root_name.replace(Some("\x02cpu\x01 ok".into()));
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        conn.set_name(10, "shell");
        wm.update_title(10);
        wm.update_status();

        let bar = conn.bars.borrow().get(&0).cloned().unwrap();
        assert_eq!(bar.occupied, bit(0));
        assert_eq!(bar.views, [bit(0), 0]);
        assert_eq!(bar.title.as_deref(), Some("shell"));
        assert_eq!(bar.status.as_deref(), Some("\x02cpu\x01 ok"));
        assert_eq!(bar.layout_symbol, "[]=");
    }

    #[test]
    fn run_returns_after_the_quit_binding_and_cleans_up() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        map(&mut wm, &conn, 10);
        conn.push_event(XEvent::KeyPress {
            code: XcbKey {
                mod_mask: MOD_SUPER | MOD_SHIFT,
                code: conn.keycode("q"),
            },
        });
        assert!(wm.run().is_ok());
        assert!(wm.client(10).is_none());
        assert!(conn.cleaned_up.get());
    }

    #[test]
    fn run_fails_when_the_connection_breaks() {
        let conn = MockConn::default();
        let mut wm = wm(&conn);
        assert!(wm.run().is_err());
        assert!(conn.cleaned_up.get());
    }
}
