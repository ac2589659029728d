//! User-facing commands bound to keys and mouse buttons.

use crate::{
    bindings,
    tag::{self, TagId},
    wm::WindowManager,
    xconnection::{Protocol, XConn},
};

/// Every command a key or button binding can trigger.
#[derive(Debug, PartialEq, Clone)]
pub enum Action {
    /// Launch a detached program
    Spawn(&'static [&'static str]),
    Quit,
    /// Ask the selected client to close, killing it if it does not listen
    KillClient,
    /// Cycle focus through the visible clients, forward for positive values
    FocusStack(i32),
    /// Promote the selected tiled client to the head of the creation order
    Zoom,
    FocusMonitor(i32),
    SendToMonitor(i32),
    SetView { view: usize, tag: TagId },
    SwapViews,
    ClearViews,
    /// Switch to the given workspace, `None` toggling back to the last one
    SwitchWorkspace(Option<usize>),
    /// Move the selected client to a single tag
    Tag(TagId),
    ToggleTag(TagId),
    /// Select a layout by index, `None` toggling back to the previous one
    SetLayout(Option<usize>),
    IncCap { view: usize, delta: i32 },
    SetVf(f32),
    ToggleBar,
    ToggleFloating,
    ToggleFullscreen,
    ToggleMaximize,
    MoveMouse,
    ResizeMouse,
}

impl<'a, X: XConn> WindowManager<'a, X> {
    pub(crate) fn run_action(&mut self, action: Action) {
        debug!("running action {:?}", action);
        match action {
            Action::Spawn(argv) => self.spawn(argv),
            Action::Quit => self.exit(),
            Action::KillClient => self.kill_client(),
            Action::FocusStack(dir) => self.focus_stack(dir),
            Action::Zoom => self.zoom(),
            Action::FocusMonitor(dir) => self.focus_monitor(dir),
            Action::SendToMonitor(dir) => {
                if let Some(id) = self.selected() {
                    if self.monitors.len() > 1 {
                        let m = self.dir_to_monitor(dir);
                        self.send_to_monitor(id, m);
                    }
                }
            }
            Action::SetView { view, tag } => {
                self.monitors[self.selmon].ws_mut().set_view(view, tag);
                self.refresh_selected_monitor();
            }
            Action::SwapViews => {
                if self.monitors[self.selmon].ws_mut().swap_views() {
                    self.refresh_selected_monitor();
                }
            }
            Action::ClearViews => {
                self.monitors[self.selmon].ws_mut().clear_views();
                self.refresh_selected_monitor();
            }
            Action::SwitchWorkspace(index) => self.switch_workspace(index),
            Action::Tag(t) => self.set_selected_tags(tag::bit(t)),
            Action::ToggleTag(t) => {
                if let Some(c) = self.selected().and_then(|id| self.clients.get(&id)) {
                    let tags = c.tags ^ tag::bit(t);
                    self.set_selected_tags(tags);
                }
            }
            Action::SetLayout(index) => {
                self.monitors[self.selmon].ws_mut().set_layout(index);
                self.arrange(Some(self.selmon));
            }
            Action::IncCap { view, delta } => {
                self.monitors[self.selmon].ws_mut().inc_cap(view, delta);
                self.arrange(Some(self.selmon));
            }
            Action::SetVf(delta) => {
                if self.layout_arranges(self.selmon) && self.monitors[self.selmon].ws_mut().set_vf(delta) {
                    self.arrange(Some(self.selmon));
                }
            }
            Action::ToggleBar => {
                let bar_height = self.config.bar_height;
                let mon = &mut self.monitors[self.selmon];
                let ws = mon.ws_mut();
                ws.show_bar = !ws.show_bar;
                mon.update_bar_pos(bar_height);
                self.arrange(Some(self.selmon));
            }
            Action::ToggleFloating => {
                if let Some(id) = self.selected() {
                    self.toggle_floating(id);
                }
            }
            Action::ToggleFullscreen => {
                if let Some(c) = self.selected().and_then(|id| self.clients.get(&id)) {
                    let (id, on) = (c.id(), !c.fullscreen);
                    self.set_fullscreen(id, on);
                }
            }
            Action::ToggleMaximize => self.toggle_maximize(),
            Action::MoveMouse => self.start_drag(false),
            Action::ResizeMouse => self.start_drag(true),
        }
    }

    fn spawn(&self, argv: &[&str]) {
        if self.monitors[self.selmon].ws().tags() == 0 {
            debug!("not spawning {:?}: nothing is viewed", argv);
            return;
        }
        if let Err(e) = bindings::spawn(argv) {
            warn!("{:#}", e);
        }
    }

    fn kill_client(&self) {
        if let Some(id) = self.selected() {
            if !self.conn.send_protocol(id, Protocol::Delete) {
                self.conn.kill_window(id);
            }
        }
    }

    fn focus_stack(&mut self, dir: i32) {
        let sel = match self.selected() {
            Some(id) => id,
            None => return,
        };
        let visible: Vec<_> = self.monitors[self.selmon]
            .clients
            .iter()
            .copied()
            .filter(|&id| self.is_visible(id))
            .collect();
        if let Some(pos) = visible.iter().position(|&id| id == sel) {
            let n = visible.len() as i32;
            let next = visible[(pos as i32 + dir).rem_euclid(n) as usize];
            self.focus(Some(next));
            self.restack(self.selmon);
        }
    }

    fn zoom(&mut self) {
        let sel = match self.selected() {
            Some(id) => id,
            None => return,
        };
        if !self.layout_arranges(self.selmon) || !self.clients.get(&sel).map_or(false, |c| c.is_tiled()) {
            return;
        }
        let tiled: Vec<_> = self.monitors[self.selmon]
            .clients
            .iter()
            .copied()
            .filter(|&id| self.is_visible(id) && self.clients.get(&id).map_or(false, |c| c.is_tiled()))
            .collect();
        // zooming the head swaps it with the next tiled client
        let target = if tiled.first() == Some(&sel) {
            match tiled.get(1) {
                Some(&next) => next,
                None => return,
            }
        } else {
            sel
        };
        let clients = &mut self.monitors[self.selmon].clients;
        clients.retain(|&id| id != target);
        clients.insert(0, target);
        self.focus(Some(target));
        self.arrange(Some(self.selmon));
    }

    fn focus_monitor(&mut self, dir: i32) {
        if self.monitors.len() <= 1 {
            return;
        }
        let m = self.dir_to_monitor(dir);
        if m == self.selmon {
            return;
        }
        if let Some(sel) = self.selected() {
            self.unfocus(sel, false);
        }
        self.selmon = m;
        self.focus(None);
    }

    fn switch_workspace(&mut self, index: Option<usize>) {
        let bar_height = self.config.bar_height;
        let mon = &mut self.monitors[self.selmon];
        if mon.switch_workspace(index) {
            mon.update_bar_pos(bar_height);
            self.refresh_selected_monitor();
        }
    }

    /// Retag the selected client. An empty mask is refused.
    fn set_selected_tags(&mut self, tags: tag::TagMask) {
        let valid = tags & tag::all(self.config.tags.len());
        if valid == 0 {
            return;
        }
        if let Some(c) = self.selected().and_then(|id| self.clients.get_mut(&id)) {
            c.tags = valid;
            self.focus(None);
            self.arrange(Some(self.selmon));
        }
    }

    fn refresh_selected_monitor(&mut self) {
        self.focus(None);
        self.arrange(Some(self.selmon));
    }

    pub(crate) fn toggle_floating(&mut self, id: xcb::Window) {
        let rect = match self.clients.get_mut(&id) {
            Some(c) if !c.fullscreen => {
                c.floating = !c.floating || c.fixed;
                if !c.floating {
                    c.max_state = crate::client::MaxState::None;
                }
                c.floating.then(|| c.rect)
            }
            _ => return,
        };
        if let Some(r) = rect {
            self.resize(id, r, false);
        }
        self.arrange(Some(self.selmon));
    }

    fn toggle_maximize(&mut self) {
        use crate::client::MaxState;

        let id = match self.selected() {
            Some(id) => id,
            None => return,
        };
        let work = self.monitors[self.selmon].work;
        let target = match self.clients.get_mut(&id) {
            Some(c) if !c.fullscreen => match c.max_state {
                MaxState::Maximized => {
                    c.max_state = MaxState::Restored;
                    c.floating = c.pre_max_floating;
                    c.pre_max_rect
                }
                MaxState::None | MaxState::Restored => {
                    c.max_state = MaxState::Maximized;
                    c.pre_max_rect = c.rect;
                    c.pre_max_floating = c.floating;
                    c.floating = true;
                    work.shrink_by_border(c.border)
                }
            },
            _ => return,
        };
        self.resize_client(id, target);
        self.arrange(Some(self.selmon));
    }
}
