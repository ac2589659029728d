//! An in-memory display for driving the window manager in tests.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    time::Duration,
};

use anyhow::{anyhow, Result};
use xcb::Window;

use crate::{
    bindings::KeymapTable,
    config::Config,
    geometry::{Point, Rectangle, SizeHints},
    status::BarContent,
    xconnection::{
        ConfigureRequest, CursorKind, Protocol, WindowAttributes, WmHints, WmState, XConn, XEvent,
        XcbKey,
    },
};

const KEY_NAMES: &[&str] = &[
    "Return", "e", "p", "b", "j", "k", "i", "d", "h", "l", "z", "s", "x", "0", "Tab", "q", "t",
    "m", "f", "space", "comma", "period", "1", "2", "3", "4", "5", "6", "7", "8", "9",
];

pub fn test_config() -> Config {
    Config::default()
}

#[derive(Debug, Clone)]
pub struct MockWindow {
    pub attrs: WindowAttributes,
    pub name: String,
    pub instance: String,
    pub class: String,
    pub transient_for: Option<Window>,
    pub types: Vec<String>,
    pub wants_fullscreen: bool,
    pub size_hints: SizeHints,
    pub wm_hints: Option<WmHints>,
    pub protocols: Vec<Protocol>,
}

impl MockWindow {
    fn new(rect: Rectangle) -> MockWindow {
        MockWindow {
            attrs: WindowAttributes {
                rect,
                border: 0,
                override_redirect: false,
                viewable: true,
            },
            name: String::new(),
            instance: "xterm".into(),
            class: "XTerm".into(),
            transient_for: None,
            types: vec![],
            wants_fullscreen: false,
            size_hints: SizeHints::default(),
            wm_hints: None,
            protocols: vec![],
        }
    }
}

/// Records every request the window manager makes and answers queries from
/// the windows registered with [MockConn::add_window].
pub struct MockConn {
    pub screen: Cell<Rectangle>,
    pub events: RefCell<VecDeque<XEvent>>,
    pub regions: RefCell<Vec<Rectangle>>,
    pub existing: RefCell<Vec<Window>>,
    pub windows: RefCell<HashMap<Window, MockWindow>>,
    pub keymap: KeymapTable,

    pub pointer: Cell<Option<Point>>,
    pub pointer_grabbed: Cell<bool>,
    pub grab_ok: Cell<bool>,
    pub warps: RefCell<Vec<(Window, i32, i32)>>,
    pub replays: Cell<u32>,

    pub configured: RefCell<Vec<(Window, Option<Rectangle>, Option<u32>)>>,
    pub forwarded: RefCell<Vec<ConfigureRequest>>,
    pub notified: RefCell<Vec<(Window, Rectangle)>>,
    pub focused: Cell<Option<Window>>,
    pub border_colors: RefCell<HashMap<Window, u32>>,
    pub killed: RefCell<Vec<Window>>,
    pub protocols_sent: RefCell<Vec<(Window, Protocol)>>,
    pub client_list: RefCell<Vec<Window>>,
    pub states: RefCell<HashMap<Window, WmState>>,
    pub fullscreen: RefCell<HashMap<Window, bool>>,
    pub urgency: RefCell<HashMap<Window, bool>>,
    pub bars: RefCell<HashMap<usize, BarContent>>,
    pub root_name: RefCell<Option<String>>,
    pub cleaned_up: Cell<bool>,
}

impl Default for MockConn {
    fn default() -> Self {
        let keymap = KEY_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), 10 + i as u8))
            .collect();
        MockConn {
            screen: Cell::new(Rectangle::new(0, 0, 1200, 818)),
            events: RefCell::new(VecDeque::new()),
            regions: RefCell::new(vec![]),
            existing: RefCell::new(vec![]),
            windows: RefCell::new(HashMap::new()),
            keymap,
            pointer: Cell::new(None),
            pointer_grabbed: Cell::new(false),
            grab_ok: Cell::new(true),
            warps: RefCell::new(vec![]),
            replays: Cell::new(0),
            configured: RefCell::new(vec![]),
            forwarded: RefCell::new(vec![]),
            notified: RefCell::new(vec![]),
            focused: Cell::new(None),
            border_colors: RefCell::new(HashMap::new()),
            killed: RefCell::new(vec![]),
            protocols_sent: RefCell::new(vec![]),
            client_list: RefCell::new(vec![]),
            states: RefCell::new(HashMap::new()),
            fullscreen: RefCell::new(HashMap::new()),
            urgency: RefCell::new(HashMap::new()),
            bars: RefCell::new(HashMap::new()),
            root_name: RefCell::new(None),
            cleaned_up: Cell::new(false),
        }
    }
}

impl MockConn {
    /// Register a viewable, unmanaged window with no border.
    pub fn add_window(&self, id: Window, rect: Rectangle) {
        self.windows.borrow_mut().insert(id, MockWindow::new(rect));
    }

    fn with_window(&self, id: Window, f: impl FnOnce(&mut MockWindow)) {
        if let Some(w) = self.windows.borrow_mut().get_mut(&id) {
            f(w);
        }
    }

    fn window<T>(&self, id: Window, f: impl FnOnce(&MockWindow) -> T) -> Option<T> {
        self.windows.borrow().get(&id).map(f)
    }

    pub fn set_class(&self, id: Window, instance: &str, class: &str) {
        self.with_window(id, |w| {
            w.instance = instance.into();
            w.class = class.into();
        });
    }

    pub fn set_name(&self, id: Window, name: &str) {
        self.with_window(id, |w| w.name = name.into());
    }

    pub fn set_transient_for(&self, id: Window, parent: Window) {
        self.with_window(id, |w| w.transient_for = Some(parent));
    }

    pub fn set_override_redirect(&self, id: Window) {
        self.with_window(id, |w| w.attrs.override_redirect = true);
    }

    pub fn set_protocols(&self, id: Window, protocols: &[Protocol]) {
        self.with_window(id, |w| w.protocols = protocols.to_vec());
    }

    pub fn set_size_hints(&self, id: Window, hints: SizeHints) {
        self.with_window(id, |w| w.size_hints = hints);
    }

    pub fn push_event(&self, event: XEvent) {
        self.events.borrow_mut().push_back(event);
    }

    pub fn keycode(&self, name: &str) -> u8 {
        self.keymap[name]
    }

    pub fn border_color(&self, id: Window) -> Option<u32> {
        self.border_colors.borrow().get(&id).copied()
    }

    pub fn fullscreen_state(&self, id: Window) -> Option<bool> {
        self.fullscreen.borrow().get(&id).copied()
    }
}

impl XConn for MockConn {
    fn root(&self) -> Window {
        1
    }

    fn screen_rect(&self) -> Rectangle {
        self.screen.get()
    }

    fn register_wm(&self) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> bool {
        true
    }

    fn wait_for_event(&self, _timeout: Option<Duration>) -> Result<Option<XEvent>> {
        match self.events.borrow_mut().pop_front() {
            Some(e) => Ok(Some(e)),
            None => Err(anyhow!("connection closed")),
        }
    }

    fn poll_for_event(&self) -> Result<Option<XEvent>> {
        Ok(self.events.borrow_mut().pop_front())
    }

    fn discard_enter_events(&self) {
        self.events
            .borrow_mut()
            .retain(|e| !matches!(e, XEvent::EnterNotify { .. }));
    }

    fn monitor_regions(&self) -> Vec<Rectangle> {
        self.regions.borrow().clone()
    }

    fn existing_windows(&self) -> Vec<Window> {
        self.existing.borrow().clone()
    }

    fn window_attributes(&self, win: Window) -> Option<WindowAttributes> {
        self.window(win, |w| w.attrs)
    }

    fn wm_state(&self, win: Window) -> Option<WmState> {
        self.states.borrow().get(&win).copied()
    }

    fn configure_window(
        &self,
        win: Window,
        region: Option<Rectangle>,
        border_width: Option<u32>,
        _stack_above: Option<bool>,
    ) {
        if region.is_some() || border_width.is_some() {
            self.configured.borrow_mut().push((win, region, border_width));
        }
    }

    fn forward_configure_request(&self, req: &ConfigureRequest) {
        self.forwarded.borrow_mut().push(*req);
    }

    fn send_configure_notify(&self, win: Window, r: Rectangle, _border: u32) {
        self.notified.borrow_mut().push((win, r));
    }

    fn stack_below(&self, _win: Window, _sibling: Option<Window>) {}

    fn map_window(&self, _win: Window) {}

    fn mark_new_window(&self, _win: Window) {}

    fn set_window_border_color(&self, win: Window, color: u32) {
        self.border_colors.borrow_mut().insert(win, color);
    }

    fn focus_window(&self, win: Window) {
        self.focused.set(Some(win));
    }

    fn focus_nothing(&self) {
        self.focused.set(None);
    }

    fn set_client_state(&self, win: Window, state: WmState) {
        self.states.borrow_mut().insert(win, state);
    }

    fn update_client_list(&self, clients: &[Window]) {
        *self.client_list.borrow_mut() = clients.to_vec();
    }

    fn grab_keys(&self, _keys: &[XcbKey]) {}

    fn grab_buttons(&self, _win: Window, _focused: bool, _buttons: &[(u16, u8)]) {}

    fn replay_pointer(&self) {
        self.replays.set(self.replays.get() + 1);
    }

    fn grab_pointer(&self, _cursor: CursorKind) -> bool {
        let ok = self.grab_ok.get();
        self.pointer_grabbed.set(ok);
        ok
    }

    fn ungrab_pointer(&self) {
        self.pointer_grabbed.set(false);
    }

    fn query_pointer(&self) -> Option<Point> {
        self.pointer.get()
    }

    fn warp_pointer(&self, win: Window, x: i32, y: i32) {
        self.warps.borrow_mut().push((win, x, y));
    }

    fn send_protocol(&self, win: Window, protocol: Protocol) -> bool {
        let supported = self
            .window(win, |w| w.protocols.contains(&protocol))
            .unwrap_or(false);
        if supported {
            self.protocols_sent.borrow_mut().push((win, protocol));
        }
        supported
    }

    fn kill_window(&self, win: Window) {
        self.killed.borrow_mut().push(win);
    }

    fn get_wm_name(&self, win: Window) -> Result<String> {
        self.window(win, |w| w.name.clone())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow!("no name for {}", win))
    }

    fn get_wm_class(&self, win: Window) -> Result<(String, String)> {
        self.window(win, |w| (w.instance.clone(), w.class.clone()))
            .ok_or_else(|| anyhow!("no class for {}", win))
    }

    fn size_hints(&self, win: Window) -> SizeHints {
        self.window(win, |w| w.size_hints).unwrap_or_default()
    }

    fn wm_hints(&self, win: Window) -> Option<WmHints> {
        self.window(win, |w| w.wm_hints).flatten()
    }

    fn set_urgency_hint(&self, win: Window, urgent: bool) {
        self.urgency.borrow_mut().insert(win, urgent);
    }

    fn transient_for(&self, win: Window) -> Option<Window> {
        self.window(win, |w| w.transient_for).flatten()
    }

    fn window_types(&self, win: Window) -> Vec<String> {
        self.window(win, |w| w.types.clone()).unwrap_or_default()
    }

    fn requests_fullscreen(&self, win: Window) -> bool {
        self.window(win, |w| w.wants_fullscreen).unwrap_or(false)
    }

    fn set_fullscreen_state(&self, win: Window, fullscreen: bool) {
        self.fullscreen.borrow_mut().insert(win, fullscreen);
    }

    fn keycodes(&self) -> Result<KeymapTable> {
        Ok(self.keymap.clone())
    }

    fn numlock_mask(&self, _keycodes: &KeymapTable) -> u16 {
        0
    }

    fn root_name(&self) -> Option<String> {
        self.root_name.borrow().clone()
    }

    fn publish_bar(&self, monitor: usize, bar: &BarContent) {
        self.bars.borrow_mut().insert(monitor, bar.clone());
    }

    fn cleanup(&self) {
        self.cleaned_up.set(true);
    }
}
