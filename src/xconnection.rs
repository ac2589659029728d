use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    convert::TryFrom,
    os::unix::io::{AsRawFd, BorrowedFd},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use xcb::{xinerama, Atom, Window};
use xcb_util::{ewmh, icccm};

use crate::{
    bindings::{self, KeymapTable},
    geometry::{Point, Rectangle, SizeHints},
    status::BarContent,
};

// Mask out the most significant bit, which indicates if it's a send_event
const XCB_RESPONSE_TYPE_MASK: u8 = 0x7F;
const SEND_EVENT_BIT: u8 = 0x80;
const GRAB_MODE_ASYNC: u8 = xcb::GRAB_MODE_ASYNC as u8;
const GRAB_MODE_SYNC: u8 = xcb::GRAB_MODE_SYNC as u8;
const ROOT_EVENT_MASK: u32 = xcb::EVENT_MASK_PROPERTY_CHANGE
    | xcb::EVENT_MASK_SUBSTRUCTURE_REDIRECT
    | xcb::EVENT_MASK_SUBSTRUCTURE_NOTIFY
    | xcb::EVENT_MASK_STRUCTURE_NOTIFY
    | xcb::EVENT_MASK_BUTTON_PRESS
    | xcb::EVENT_MASK_POINTER_MOTION
    | xcb::EVENT_MASK_ENTER_WINDOW
    | xcb::EVENT_MASK_LEAVE_WINDOW;
const NEW_WINDOW_MASK: &[(u32, u32)] = &[(
    xcb::CW_EVENT_MASK,
    xcb::EVENT_MASK_ENTER_WINDOW
        | xcb::EVENT_MASK_FOCUS_CHANGE
        | xcb::EVENT_MASK_PROPERTY_CHANGE
        | xcb::EVENT_MASK_STRUCTURE_NOTIFY,
)];
const BUTTON_MASK: u16 = (xcb::EVENT_MASK_BUTTON_PRESS | xcb::EVENT_MASK_BUTTON_RELEASE) as u16;
const MOUSE_MASK: u16 = BUTTON_MASK | xcb::EVENT_MASK_POINTER_MOTION as u16;
const INPUT_FOCUS_POINTER_ROOT: u8 = xcb::INPUT_FOCUS_POINTER_ROOT as u8;
const PROP_MODE_REPLACE: u8 = xcb::PROP_MODE_REPLACE as u8;

const CONFIG_WINDOW_BORDER_WIDTH: u16 = xcb::CONFIG_WINDOW_BORDER_WIDTH as u16;
const CONFIG_WINDOW_HEIGHT: u16 = xcb::CONFIG_WINDOW_HEIGHT as u16;
const CONFIG_WINDOW_WIDTH: u16 = xcb::CONFIG_WINDOW_WIDTH as u16;
const CONFIG_WINDOW_X: u16 = xcb::CONFIG_WINDOW_X as u16;
const CONFIG_WINDOW_Y: u16 = xcb::CONFIG_WINDOW_Y as u16;
const CONFIG_WINDOW_SIBLING: u16 = xcb::CONFIG_WINDOW_SIBLING as u16;
const CONFIG_WINDOW_STACK_MODE: u16 = xcb::CONFIG_WINDOW_STACK_MODE as u16;
const CONFIG_WINDOW_STACK_ABOVE: u32 = xcb::STACK_MODE_ABOVE as u32;
const CONFIG_WINDOW_STACK_BELOW: u32 = xcb::STACK_MODE_BELOW as u32;

// X protocol error codes that only mean a window vanished under our feet
const BAD_WINDOW: u8 = 3;
const BAD_MATCH: u8 = 8;
const BAD_DRAWABLE: u8 = 9;
const BAD_ACCESS: u8 = 10;

// glyphs of the standard X cursor font
const XC_LEFT_PTR: u16 = 68;
const XC_SIZING: u16 = 120;
const XC_FLEUR: u16 = 52;

const WM_HINTS_INPUT: u32 = 1;
const WM_HINTS_URGENCY: u32 = 1 << 8;

macro_rules! atoms {
    ( $( $name:ident ),+ ) => {
        #[allow(non_snake_case)]
        pub struct InternedAtoms {
            $(
                pub $name: xcb::Atom
            ),*
        }

        impl InternedAtoms {
            pub fn new(conn: &xcb::Connection) -> Result<InternedAtoms> {
                Ok(InternedAtoms {
                    $(
                        $name: xcb::intern_atom(conn, false, stringify!($name)).get_reply()?.atom()
                    ),*
                })
            }
        }
    };
    // Allow trailing comma:
    ( $( $name:ident ),+ , ) => (atoms!($( $name ),+);)
}

// Intern atoms that are not built-in in icccm or ewmh
atoms!(WM_DELETE_WINDOW, WM_TAKE_FOCUS, WM_STATE, UTF8_STRING);

/// An X key-code along with a modifier mask
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct XcbKey {
    /// Modifier key bit mask
    pub mod_mask: u16,
    /// X key code
    pub code: xcb::Keycode,
}

impl XcbKey {
    /// Build a new XcbKey from an XCB KeyPressEvent
    pub fn from_key_press(k: &xcb::KeyPressEvent) -> XcbKey {
        XcbKey {
            mod_mask: k.state(),
            code: k.detail(),
        }
    }
}

/// Pointer shape shown while idle or during an interactive operation
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CursorKind {
    Normal,
    Move,
    Resize,
}

/// ICCCM WM_STATE values
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WmState {
    Withdrawn = 0,
    Normal = 1,
    Iconic = 3,
}

/// WM_PROTOCOLS messages we may send to a client
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Protocol {
    Delete,
    TakeFocus,
}

/// The parts of WM_HINTS the window manager cares about
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct WmHints {
    pub urgent: bool,
    /// The input field, if the client set one
    pub input: Option<bool>,
}

impl WmHints {
    pub fn from_raw(words: &[u32]) -> WmHints {
        let flags = words.first().copied().unwrap_or(0);
        WmHints {
            urgent: flags & WM_HINTS_URGENCY != 0,
            input: if flags & WM_HINTS_INPUT != 0 {
                words.get(1).map(|&i| i != 0)
            } else {
                None
            },
        }
    }
}

/// Geometry and attributes of a window that is not yet managed
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct WindowAttributes {
    pub rect: Rectangle,
    pub border: u32,
    pub override_redirect: bool,
    pub viewable: bool,
}

/// A client's request to change its geometry or stacking. Absent fields were
/// not part of the request.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ConfigureRequest {
    pub id: Window,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub border: Option<u32>,
    pub sibling: Option<Window>,
    pub stack_mode: Option<u8>,
}

/// Which property of a window changed
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Property {
    TransientFor,
    NormalHints,
    Hints,
    Name,
    WindowType,
    Other,
}

/// _NET_WM_STATE change actions
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StateAction {
    Remove,
    Add,
    Toggle,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClientMessage {
    /// _NET_WM_STATE with _NET_WM_STATE_FULLSCREEN
    Fullscreen(StateAction),
    /// _NET_ACTIVE_WINDOW
    Activate,
    Other,
}

/**
 * Wrapper around the low level XCB event types that require casting to work with.
 * Only the fields the window manager acts on are extracted.
 *
 * https://tronche.com/gui/x/xlib/events/types.html
 */
#[derive(Debug, PartialEq, Clone)]
pub enum XEvent {
    /// xcb docs: https://www.mankier.com/3/xcb_button_press_event_t
    ButtonPress {
        /// The window the grab that reported the press is on
        id: Window,
        /// Absolute coordinate of the event
        rpt: Point,
        /// Modifier mask held when the button was pressed
        state: u16,
        button: u8,
    },

    ButtonRelease {
        button: u8,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_motion_notify_event_t
    MotionNotify {
        id: Window,
        rpt: Point,
        time: u32,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_key_press_event_t
    KeyPress {
        /// The X11 key code that was received along with any modifiers that were held
        code: XcbKey,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_map_request_event_t
    MapRequest {
        /// The ID of the window that wants to be mapped
        id: Window,
        /// Whether or not the WindowManager should handle this window.
        ignore: bool,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_unmap_notify_event_t
    UnmapNotify {
        id: Window,
        /// Generated by a client through SendEvent (ICCCM withdraw)
        synthetic: bool,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_destroy_notify_event_t
    DestroyNotify {
        /// The ID of the window being destroyed
        id: Window,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_enter_notify_event_t
    EnterNotify {
        /// The ID of the window that was entered
        id: Window,
        /// Normal crossing into the window itself (not a grab or inferior)
        normal: bool,
        is_root: bool,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_focus_in_event_t
    FocusIn {
        /// The ID of the window that gained focus
        id: Window,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_configure_request_event_t
    ConfigureRequest(ConfigureRequest),

    /// xcb docs: https://www.mankier.com/3/xcb_configure_notify_event_t
    ConfigureNotify {
        id: Window,
        /// The new window size
        r: Rectangle,
        /// Is this window the root window?
        is_root: bool,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_property_notify_event_t
    PropertyNotify {
        /// The ID of the window that had a property changed
        id: Window,
        /// The property that changed
        prop: Property,
        /// Is this window the root window?
        is_root: bool,
        deleted: bool,
    },

    /// https://www.mankier.com/3/xcb_client_message_event_t
    ClientMessage {
        id: Window,
        message: ClientMessage,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_expose_event_t
    Expose {
        id: Window,
        /// Number of Expose events still to follow
        count: u16,
    },

    /// xcb docs: https://www.mankier.com/3/xcb_mapping_notify_event_t
    MappingNotify {
        keyboard: bool,
    },
}

/**
 * The display surface the window manager drives.
 *
 * Every request is fire-and-forget: operations on windows that vanished in
 * the meantime are dropped by the implementation rather than reported.
 */
pub trait XConn {
    fn root(&self) -> Window;
    /// Full size of the root window
    fn screen_rect(&self) -> Rectangle;
    /// Take ownership of substructure redirection on the root window.
    fn register_wm(&self) -> Result<()>;
    fn flush(&self) -> bool;
    /// Block until an event arrives or `timeout` passes (`Ok(None)`).
    fn wait_for_event(&self, timeout: Option<Duration>) -> Result<Option<XEvent>>;
    /// The next already queued event, if any.
    fn poll_for_event(&self) -> Result<Option<XEvent>>;
    /// Drop pending EnterNotify events caused by our own restacking.
    fn discard_enter_events(&self);

    /// Geometry of each physical output, empty without multi-output support.
    fn monitor_regions(&self) -> Vec<Rectangle>;
    /// Top level windows that already exist.
    fn existing_windows(&self) -> Vec<Window>;
    fn window_attributes(&self, win: Window) -> Option<WindowAttributes>;
    fn wm_state(&self, win: Window) -> Option<WmState>;

    fn configure_window(
        &self,
        win: Window,
        region: Option<Rectangle>,
        border_width: Option<u32>,
        stack_above: Option<bool>,
    );
    /// Grant a configure request of an unmanaged window unchanged.
    fn forward_configure_request(&self, req: &ConfigureRequest);
    /// Tell a client its geometry with a synthetic ConfigureNotify.
    fn send_configure_notify(&self, win: Window, r: Rectangle, border: u32);
    /// Stack `win` directly below `sibling`, or at the bottom.
    fn stack_below(&self, win: Window, sibling: Option<Window>);
    fn map_window(&self, win: Window);
    fn mark_new_window(&self, win: Window);
    fn set_window_border_color(&self, win: Window, color: u32);
    fn focus_window(&self, win: Window);
    fn focus_nothing(&self);
    fn set_client_state(&self, win: Window, state: WmState);
    fn update_client_list(&self, clients: &[Window]);

    fn grab_keys(&self, keys: &[XcbKey]);
    /// Unfocused clients grab every button, focused ones only the bound ones.
    fn grab_buttons(&self, win: Window, focused: bool, buttons: &[(u16, u8)]);
    /// Replay a button press frozen by a synchronous grab to the client.
    fn replay_pointer(&self);
    fn grab_pointer(&self, cursor: CursorKind) -> bool;
    fn ungrab_pointer(&self);
    fn query_pointer(&self) -> Option<Point>;
    fn warp_pointer(&self, win: Window, x: i32, y: i32);

    /// Send a WM_PROTOCOLS message, returning false if the client does not
    /// support it.
    fn send_protocol(&self, win: Window, protocol: Protocol) -> bool;
    fn kill_window(&self, win: Window);

    fn get_wm_name(&self, win: Window) -> Result<String>;
    /// (instance, class) from WM_CLASS
    fn get_wm_class(&self, win: Window) -> Result<(String, String)>;
    fn size_hints(&self, win: Window) -> SizeHints;
    fn wm_hints(&self, win: Window) -> Option<WmHints>;
    fn set_urgency_hint(&self, win: Window, urgent: bool);
    fn transient_for(&self, win: Window) -> Option<Window>;
    /// _NET_WM_WINDOW_TYPE values without their common prefix, e.g. "DIALOG"
    fn window_types(&self, win: Window) -> Vec<String>;
    fn requests_fullscreen(&self, win: Window) -> bool;
    fn set_fullscreen_state(&self, win: Window, fullscreen: bool);

    fn keycodes(&self) -> Result<KeymapTable>;
    fn numlock_mask(&self, keycodes: &KeymapTable) -> u16;
    /// The root window name, used as status text.
    fn root_name(&self) -> Option<String>;
    fn publish_bar(&self, monitor: usize, bar: &BarContent);

    /// Release grabs and clear the active window.
    fn cleanup(&self);
}

/**
 * Events read ahead of the reactor while draining the queue.
 *
 * A fatal error met during the drain is kept and reported once the events
 * read before it have been delivered.
 */
#[derive(Debug, Default)]
struct Backlog {
    events: VecDeque<XEvent>,
    failure: Option<anyhow::Error>,
}

impl Backlog {
    /// Keep a drained event unless it is an EnterNotify. Returns false once
    /// the drain has to stop.
    fn keep(&mut self, drained: Result<Option<XEvent>>) -> bool {
        match drained {
            Ok(Some(XEvent::EnterNotify { .. })) | Ok(None) => true,
            Ok(Some(ev)) => {
                self.events.push_back(ev);
                true
            }
            Err(e) => {
                if self.failure.is_none() {
                    self.failure = Some(e);
                }
                false
            }
        }
    }

    fn next(&mut self) -> Result<Option<XEvent>> {
        if let Some(ev) = self.events.pop_front() {
            return Ok(Some(ev));
        }
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Atoms interned on first use and kept for the life of the connection.
#[derive(Debug, Default)]
struct AtomCache {
    atoms: RefCell<HashMap<String, Atom>>,
}

impl AtomCache {
    fn get_or_intern(
        &self,
        name: &str,
        intern: impl FnOnce(&str) -> Result<Atom>,
    ) -> Result<Atom> {
        if let Some(&atom) = self.atoms.borrow().get(name) {
            return Ok(atom);
        }
        let atom = intern(name)?;
        self.atoms.borrow_mut().insert(name.to_string(), atom);
        Ok(atom)
    }
}

/// Handles communication with an X server via xcb
pub struct XcbConnection {
    conn: ewmh::Connection,
    preferred_screen: i32,
    root: Window,
    atoms: InternedAtoms,
    cursors: [xcb::Cursor; 3],
    /// Events read while draining the queue, delivered before new ones
    backlog: RefCell<Backlog>,
    /// `_SPLITWM_BAR<n>` atoms
    bar_atoms: AtomCache,
}

impl XcbConnection {
    pub fn new() -> Result<XcbConnection> {
        let (conn, preferred_screen) = xcb::Connection::connect(None)
            .context("Unable to connection to X server")?;
        let conn = ewmh::Connection::connect(conn).map_err(|(e, _)| e)?;

        let root = conn
            .get_setup()
            .roots()
            .nth(preferred_screen as usize)
            .context("Unable to get the root window of the preferred screen")?
            .root();

        let atoms = InternedAtoms::new(&conn).context("Failed to intern atoms")?;
        let cursors = [
            create_cursor(&conn, XC_LEFT_PTR)?,
            create_cursor(&conn, XC_FLEUR)?,
            create_cursor(&conn, XC_SIZING)?,
        ];

        Ok(XcbConnection {
            conn,
            preferred_screen,
            root,
            atoms,
            cursors,
            backlog: RefCell::new(Backlog::default()),
            bar_atoms: AtomCache::default(),
        })
    }

    fn cursor(&self, kind: CursorKind) -> xcb::Cursor {
        match kind {
            CursorKind::Normal => self.cursors[0],
            CursorKind::Move => self.cursors[1],
            CursorKind::Resize => self.cursors[2],
        }
    }

    /// Returns the Atom identifier associated with the atom_name str.
    pub fn intern_atom(&self, atom_name: &str) -> Result<Atom> {
        Ok(xcb::intern_atom(&self.conn, false, atom_name).get_reply()?.atom())
    }

    fn set_text_property(&self, win: Window, atom: Atom, data: &str) {
        xcb::change_property(
            &self.conn,             // xcb connection to X11
            PROP_MODE_REPLACE,      // discard current prop and replace
            win,                    // window to change prop on
            atom,                   // prop to change
            self.atoms.UTF8_STRING, // type of prop
            8,                      // data format (8/16/32-bit)
            data.as_bytes(),        // data
        );
    }

    /// Read up to `len` 32-bit words of a property, empty if it is missing.
    fn words_prop(&self, win: Window, atom: Atom, type_: Atom, len: u32) -> Vec<u32> {
        xcb::get_property(&self.conn, false, win, atom, type_, 0, len)
            .get_reply()
            .ok()
            .filter(|r| r.format() == 32)
            .map(|r| r.value::<u32>().to_vec())
            .unwrap_or_default()
    }

    fn atom_name(&self, atom: Atom) -> Option<String> {
        xcb::get_atom_name(&self.conn, atom)
            .get_reply()
            .ok()
            .map(|r| r.name().to_string())
    }

    /// Queries the WM_PROTOCOLS property of a window, returning a list of the
    /// protocols that it supports.
    fn get_wm_protocols(&self, id: Window) -> Result<Vec<xcb::Atom>> {
        let reply = icccm::get_wm_protocols(&self.conn, id, self.conn.WM_PROTOCOLS()).get_reply()?;
        Ok(reply.atoms().to_vec())
    }

    fn send_client_message_event(&self, win: Window, atom: Atom) {
        let data = xcb::ClientMessageData::from_data32([atom, xcb::CURRENT_TIME, 0, 0, 0]);
        let event = xcb::ClientMessageEvent::new(32, win, self.conn.WM_PROTOCOLS(), data);
        xcb::send_event(&self.conn, false, win, xcb::EVENT_MASK_NO_EVENT, &event);
    }

    fn next_raw_event(&self) -> Result<Option<xcb::GenericEvent>> {
        match self.conn.poll_for_event() {
            Some(event) => Ok(Some(event)),
            None => {
                self.conn
                    .has_error()
                    .map_err(|e| anyhow!("X connection broke: {:?}", e))?;
                Ok(None)
            }
        }
    }

    /// Errors caused by windows disappearing mid-request are expected and
    /// dropped; anything else is fatal.
    fn check_error(&self, code: u8) -> Result<()> {
        match code {
            BAD_WINDOW | BAD_MATCH | BAD_DRAWABLE | BAD_ACCESS => {
                debug!("ignoring X error {}", code);
                Ok(())
            }
            _ => Err(anyhow!("fatal X protocol error {}", code)),
        }
    }

    fn translate(&self, event: &xcb::GenericEvent) -> Result<Option<XEvent>> {
        if event.response_type() == 0 {
            let e: &xcb::GenericError = unsafe { xcb::cast_event(event) };
            return self.check_error(e.error_code()).map(|_| None);
        }
        let synthetic = event.response_type() & SEND_EVENT_BIT != 0;
        let etype = event.response_type() & XCB_RESPONSE_TYPE_MASK;

        let ev = match etype {
            xcb::BUTTON_PRESS => {
                let e: &xcb::ButtonPressEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::ButtonPress {
                    id: e.event(),
                    rpt: Point::new(e.root_x() as i32, e.root_y() as i32),
                    state: e.state(),
                    button: e.detail(),
                })
            }

            xcb::BUTTON_RELEASE => {
                let e: &xcb::ButtonReleaseEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::ButtonRelease { button: e.detail() })
            }

            xcb::MOTION_NOTIFY => {
                let e: &xcb::MotionNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::MotionNotify {
                    id: e.event(),
                    rpt: Point::new(e.root_x() as i32, e.root_y() as i32),
                    time: e.time(),
                })
            }

            xcb::KEY_PRESS => {
                let e: &xcb::KeyPressEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::KeyPress {
                    code: XcbKey::from_key_press(e),
                })
            }

            xcb::MAP_REQUEST => {
                let e: &xcb::MapRequestEvent = unsafe { xcb::cast_event(event) };
                let id = e.window();
                xcb::get_window_attributes(&self.conn, id)
                    .get_reply()
                    .ok()
                    .map(|r| XEvent::MapRequest {
                        id,
                        ignore: r.override_redirect(),
                    })
            }

            xcb::UNMAP_NOTIFY => {
                let e: &xcb::UnmapNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::UnmapNotify {
                    id: e.window(),
                    synthetic,
                })
            }

            xcb::DESTROY_NOTIFY => {
                let e: &xcb::DestroyNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::DestroyNotify { id: e.window() })
            }

            xcb::ENTER_NOTIFY => {
                let e: &xcb::EnterNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::EnterNotify {
                    id: e.event(),
                    normal: e.mode() as u32 == xcb::NOTIFY_MODE_NORMAL
                        && e.detail() as u32 != xcb::NOTIFY_DETAIL_INFERIOR,
                    is_root: e.event() == self.root,
                })
            }

            xcb::FOCUS_IN => {
                let e: &xcb::FocusInEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::FocusIn { id: e.event() })
            }

            xcb::CONFIGURE_REQUEST => {
                let e: &xcb::ConfigureRequestEvent = unsafe { xcb::cast_event(event) };
                let mask = e.value_mask();
                let has = |bit: u16| mask & bit != 0;
                Some(XEvent::ConfigureRequest(ConfigureRequest {
                    id: e.window(),
                    x: Some(e.x() as i32).filter(|_| has(CONFIG_WINDOW_X)),
                    y: Some(e.y() as i32).filter(|_| has(CONFIG_WINDOW_Y)),
                    w: Some(e.width() as u32).filter(|_| has(CONFIG_WINDOW_WIDTH)),
                    h: Some(e.height() as u32).filter(|_| has(CONFIG_WINDOW_HEIGHT)),
                    border: Some(e.border_width() as u32).filter(|_| has(CONFIG_WINDOW_BORDER_WIDTH)),
                    sibling: Some(e.sibling()).filter(|_| has(CONFIG_WINDOW_SIBLING)),
                    stack_mode: Some(e.stack_mode()).filter(|_| has(CONFIG_WINDOW_STACK_MODE)),
                }))
            }

            xcb::CONFIGURE_NOTIFY => {
                let e: &xcb::ConfigureNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::ConfigureNotify {
                    id: e.window(),
                    r: Rectangle::new(
                        e.x() as i32,
                        e.y() as i32,
                        e.width() as u32,
                        e.height() as u32,
                    ),
                    is_root: e.window() == self.root,
                })
            }

            xcb::PROPERTY_NOTIFY => {
                let e: &xcb::PropertyNotifyEvent = unsafe { xcb::cast_event(event) };
                let atom = e.atom();
                let prop = if atom == xcb::ATOM_WM_TRANSIENT_FOR {
                    Property::TransientFor
                } else if atom == xcb::ATOM_WM_NORMAL_HINTS {
                    Property::NormalHints
                } else if atom == xcb::ATOM_WM_HINTS {
                    Property::Hints
                } else if atom == xcb::ATOM_WM_NAME || atom == self.conn.WM_NAME() {
                    Property::Name
                } else if atom == self.conn.WM_WINDOW_TYPE() {
                    Property::WindowType
                } else {
                    Property::Other
                };
                Some(XEvent::PropertyNotify {
                    id: e.window(),
                    prop,
                    is_root: e.window() == self.root,
                    deleted: e.state() == xcb::PROPERTY_DELETE as u8,
                })
            }

            xcb::CLIENT_MESSAGE => {
                let e: &xcb::ClientMessageEvent = unsafe { xcb::cast_event(event) };
                let data = e.data().data32();
                let fullscreen = self.conn.WM_STATE_FULLSCREEN();
                let message = if e.type_() == self.conn.WM_STATE()
                    && (data[1] == fullscreen || data[2] == fullscreen)
                {
                    match data[0] {
                        0 => ClientMessage::Fullscreen(StateAction::Remove),
                        1 => ClientMessage::Fullscreen(StateAction::Add),
                        _ => ClientMessage::Fullscreen(StateAction::Toggle),
                    }
                } else if e.type_() == self.conn.ACTIVE_WINDOW() {
                    ClientMessage::Activate
                } else {
                    ClientMessage::Other
                };
                Some(XEvent::ClientMessage {
                    id: e.window(),
                    message,
                })
            }

            xcb::EXPOSE => {
                let e: &xcb::ExposeEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::Expose {
                    id: e.window(),
                    count: e.count(),
                })
            }

            xcb::MAPPING_NOTIFY => {
                let e: &xcb::MappingNotifyEvent = unsafe { xcb::cast_event(event) };
                Some(XEvent::MappingNotify {
                    keyboard: e.request() == xcb::MAPPING_KEYBOARD as u8,
                })
            }

            // NOTE: ignoring other event types
            _ => None,
        };
        Ok(ev)
    }
}

fn create_cursor(conn: &xcb::Connection, glyph: u16) -> Result<xcb::Cursor> {
    let font = conn.generate_id();
    xcb::open_font_checked(conn, font, "cursor")
        .request_check()
        .context("Failed to open the cursor font")?;
    let cursor = conn.generate_id();
    xcb::create_glyph_cursor(
        conn, cursor, font, font, glyph, glyph + 1, 0, 0, 0, 0xffff, 0xffff, 0xffff,
    );
    xcb::close_font(conn, font);
    Ok(cursor)
}

impl XConn for XcbConnection {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_rect(&self) -> Rectangle {
        self.conn
            .get_setup()
            .roots()
            .nth(self.preferred_screen as usize)
            .map(|s| Rectangle::new(0, 0, s.width_in_pixels() as u32, s.height_in_pixels() as u32))
            .unwrap_or_default()
    }

    fn register_wm(&self) -> Result<()> {
        // Register for substructure redirection
        // https://jichu4n.com/posts/how-x-window-managers-work-and-how-to-write-one-part-i/#substructure-redirection
        xcb::change_window_attributes_checked(
            &self.conn,
            self.root,
            &[
                (xcb::CW_EVENT_MASK, ROOT_EVENT_MASK),
                (xcb::CW_CURSOR, self.cursor(CursorKind::Normal)),
            ],
        )
        .request_check()
        .context("Could not register SUBSTRUCTURE_NOTIFY/REDIRECT, is another window manager running?")?;

        ewmh::set_supported(
            &self.conn,
            self.preferred_screen,
            &[
                self.conn.SUPPORTED(),
                self.conn.WM_NAME(),
                self.conn.WM_STATE(),
                self.conn.WM_STATE_FULLSCREEN(),
                self.conn.ACTIVE_WINDOW(),
                self.conn.WM_WINDOW_TYPE(),
                self.conn.WM_WINDOW_TYPE_DIALOG(),
                self.conn.CLIENT_LIST(),
            ],
        );
        xcb::delete_property(&self.conn, self.root, self.conn.CLIENT_LIST());
        self.conn.flush();
        Ok(())
    }

    fn flush(&self) -> bool {
        self.conn.flush()
    }

    fn wait_for_event(&self, timeout: Option<Duration>) -> Result<Option<XEvent>> {
        if let Some(ev) = self.backlog.borrow_mut().next()? {
            return Ok(Some(ev));
        }
        loop {
            while let Some(raw) = self.next_raw_event()? {
                if let Some(ev) = self.translate(&raw)? {
                    return Ok(Some(ev));
                }
            }
            self.conn.flush();

            let fd = unsafe { BorrowedFd::borrow_raw(self.conn.as_raw_fd()) };
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            let t = match timeout {
                Some(d) => PollTimeout::from(u16::try_from(d.as_millis()).unwrap_or(u16::MAX)),
                None => PollTimeout::NONE,
            };
            match poll(&mut fds, t) {
                Ok(0) | Err(Errno::EINTR) => return Ok(None),
                Ok(_) => continue,
                Err(e) => return Err(e).context("poll on the X connection failed"),
            }
        }
    }

    fn poll_for_event(&self) -> Result<Option<XEvent>> {
        if let Some(ev) = self.backlog.borrow_mut().next()? {
            return Ok(Some(ev));
        }
        while let Some(raw) = self.next_raw_event()? {
            if let Some(ev) = self.translate(&raw)? {
                return Ok(Some(ev));
            }
        }
        Ok(None)
    }

    fn discard_enter_events(&self) {
        // round trip so every event caused by our requests has arrived
        let _ = xcb::get_input_focus(&self.conn).get_reply();
        loop {
            let drained = match self.next_raw_event() {
                Ok(Some(raw)) => self.translate(&raw),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            if !self.backlog.borrow_mut().keep(drained) {
                break;
            }
        }
    }

    fn monitor_regions(&self) -> Vec<Rectangle> {
        let active = xinerama::is_active(&self.conn)
            .get_reply()
            .map(|r| r.state() != 0)
            .unwrap_or(false);
        if !active {
            return vec![];
        }
        match xinerama::query_screens(&self.conn).get_reply() {
            Ok(screens) => screens
                .screen_info()
                .map(|s| {
                    Rectangle::new(
                        s.x_org() as i32,
                        s.y_org() as i32,
                        s.width() as u32,
                        s.height() as u32,
                    )
                })
                .collect(),
            Err(e) => {
                warn!("Xinerama query screens error: {:?}", e);
                vec![]
            }
        }
    }

    fn existing_windows(&self) -> Vec<Window> {
        xcb::query_tree(&self.conn, self.root)
            .get_reply()
            .map(|r| r.children().to_vec())
            .unwrap_or_default()
    }

    fn window_attributes(&self, win: Window) -> Option<WindowAttributes> {
        let attrs = xcb::get_window_attributes(&self.conn, win).get_reply().ok()?;
        let geom = xcb::get_geometry(&self.conn, win).get_reply().ok()?;
        Some(WindowAttributes {
            rect: Rectangle::new(
                geom.x() as i32,
                geom.y() as i32,
                geom.width() as u32,
                geom.height() as u32,
            ),
            border: geom.border_width() as u32,
            override_redirect: attrs.override_redirect(),
            viewable: attrs.map_state() == xcb::MAP_STATE_VIEWABLE as u8,
        })
    }

    fn wm_state(&self, win: Window) -> Option<WmState> {
        let state = self.atoms.WM_STATE;
        match self.words_prop(win, state, state, 2).first() {
            Some(0) => Some(WmState::Withdrawn),
            Some(1) => Some(WmState::Normal),
            Some(3) => Some(WmState::Iconic),
            _ => None,
        }
    }

    fn configure_window(
        &self,
        win: Window,
        region: Option<Rectangle>,
        border_width: Option<u32>,
        stack_above: Option<bool>,
    ) {
        let mut args = vec![];
        if let Some(r) = region {
            args.append(&mut vec![
                (CONFIG_WINDOW_X, r.x as u32),
                (CONFIG_WINDOW_Y, r.y as u32),
                (CONFIG_WINDOW_WIDTH, r.w),
                (CONFIG_WINDOW_HEIGHT, r.h),
            ])
        }
        if let Some(bw) = border_width {
            args.push((CONFIG_WINDOW_BORDER_WIDTH, bw));
        }
        if let Some(true) = stack_above {
            args.push((CONFIG_WINDOW_STACK_MODE, CONFIG_WINDOW_STACK_ABOVE));
        }
        xcb::configure_window(&self.conn, win, &args);
    }

    fn forward_configure_request(&self, req: &ConfigureRequest) {
        // This request is not interesting for us: grant it unchanged.
        let values = vec![
            (CONFIG_WINDOW_X, req.x.map(|v| v as u32)),
            (CONFIG_WINDOW_Y, req.y.map(|v| v as u32)),
            (CONFIG_WINDOW_WIDTH, req.w),
            (CONFIG_WINDOW_HEIGHT, req.h),
            (CONFIG_WINDOW_BORDER_WIDTH, req.border),
            (CONFIG_WINDOW_SIBLING, req.sibling),
            (CONFIG_WINDOW_STACK_MODE, req.stack_mode.map(u32::from)),
        ];
        let filtered: Vec<(u16, u32)> = values
            .into_iter()
            .filter_map(|(mask, v)| v.map(|v| (mask, v)))
            .collect();
        xcb::configure_window(&self.conn, req.id, &filtered);
    }

    fn send_configure_notify(&self, win: Window, r: Rectangle, border: u32) {
        let event = xcb::ConfigureNotifyEvent::new(
            win,
            win,
            xcb::NONE,
            r.x as i16,
            r.y as i16,
            r.w as u16,
            r.h as u16,
            border as u16,
            false,
        );
        xcb::send_event(&self.conn, false, win, xcb::EVENT_MASK_STRUCTURE_NOTIFY, &event);
    }

    fn stack_below(&self, win: Window, sibling: Option<Window>) {
        let mut args = vec![(CONFIG_WINDOW_STACK_MODE, CONFIG_WINDOW_STACK_BELOW)];
        if let Some(s) = sibling {
            args.insert(0, (CONFIG_WINDOW_SIBLING, s));
        }
        xcb::configure_window(&self.conn, win, &args);
    }

    fn map_window(&self, win: Window) {
        xcb::map_window(&self.conn, win);
    }

    fn mark_new_window(&self, win: Window) {
        xcb::change_window_attributes(&self.conn, win, NEW_WINDOW_MASK);
    }

    fn set_window_border_color(&self, win: Window, color: u32) {
        xcb::change_window_attributes(&self.conn, win, &[(xcb::CW_BORDER_PIXEL, color)]);
    }

    fn focus_window(&self, id: Window) {
        xcb::set_input_focus(
            &self.conn,               // xcb connection to X11
            INPUT_FOCUS_POINTER_ROOT, // revert to the pointer root when focus is lost
            id,                       // window to focus
            xcb::CURRENT_TIME,        // current time to avoid network race conditions
        );
        ewmh::set_active_window(&self.conn, self.preferred_screen, id);
    }

    /// Unsets EWMH's _NET_ACTIVE_WINDOW to indicate there is no active window.
    fn focus_nothing(&self) {
        xcb::set_input_focus(&self.conn, INPUT_FOCUS_POINTER_ROOT, self.root, xcb::CURRENT_TIME);
        ewmh::set_active_window(&self.conn, self.preferred_screen, xcb::NONE);
    }

    fn set_client_state(&self, win: Window, state: WmState) {
        xcb::change_property(
            &self.conn,
            PROP_MODE_REPLACE,
            win,
            self.atoms.WM_STATE,
            self.atoms.WM_STATE,
            32,
            &[state as u32, xcb::NONE],
        );
    }

    fn update_client_list(&self, clients: &[Window]) {
        ewmh::set_client_list(&self.conn, self.preferred_screen, clients);
    }

    fn grab_keys(&self, keys: &[XcbKey]) {
        xcb::ungrab_key(&self.conn, xcb::GRAB_ANY as u8, self.root, xcb::MOD_MASK_ANY as u16);
        for key in keys {
            // xcb docs: https://www.mankier.com/3/xcb_grab_key
            xcb::grab_key(
                &self.conn,      // xcb connection to X11
                true,            // report events to the root window
                self.root,       // the window to grab: in this case the root window
                key.mod_mask,    // modifiers to grab
                key.code,        // keycode to grab
                GRAB_MODE_ASYNC, // don't lock pointer input while grabbing
                GRAB_MODE_ASYNC, // don't lock keyboard input while grabbing
            );
        }
    }

    fn grab_buttons(&self, win: Window, focused: bool, buttons: &[(u16, u8)]) {
        xcb::ungrab_button(&self.conn, xcb::BUTTON_INDEX_ANY as u8, win, xcb::MOD_MASK_ANY as u16);
        if !focused {
            // xcb docs: https://www.mankier.com/3/xcb_grab_button
            xcb::grab_button(
                &self.conn,
                false,
                win,
                BUTTON_MASK,
                GRAB_MODE_SYNC, // freeze the pointer until the press is replayed
                GRAB_MODE_SYNC,
                xcb::NONE,
                xcb::NONE,
                xcb::BUTTON_INDEX_ANY as u8,
                xcb::MOD_MASK_ANY as u16,
            );
        }
        for &(mods, button) in buttons {
            xcb::grab_button(
                &self.conn,
                false,
                win,
                BUTTON_MASK,
                GRAB_MODE_ASYNC,
                GRAB_MODE_SYNC,
                xcb::NONE,
                xcb::NONE,
                button,
                mods,
            );
        }
    }

    fn replay_pointer(&self) {
        xcb::allow_events(&self.conn, xcb::ALLOW_REPLAY_POINTER as u8, xcb::CURRENT_TIME);
    }

    fn grab_pointer(&self, cursor: CursorKind) -> bool {
        xcb::grab_pointer(
            &self.conn,
            false,
            self.root,
            MOUSE_MASK,
            GRAB_MODE_ASYNC,
            GRAB_MODE_ASYNC,
            xcb::NONE,
            self.cursor(cursor),
            xcb::CURRENT_TIME,
        )
        .get_reply()
        .map(|r| r.status() == xcb::GRAB_STATUS_SUCCESS as u8)
        .unwrap_or(false)
    }

    fn ungrab_pointer(&self) {
        xcb::ungrab_pointer(&self.conn, xcb::CURRENT_TIME);
    }

    fn query_pointer(&self) -> Option<Point> {
        xcb::query_pointer(&self.conn, self.root)
            .get_reply()
            .ok()
            .map(|r| Point::new(r.root_x() as i32, r.root_y() as i32))
    }

    fn warp_pointer(&self, win: Window, x: i32, y: i32) {
        xcb::warp_pointer(&self.conn, xcb::NONE, win, 0, 0, 0, 0, x as i16, y as i16);
    }

    fn send_protocol(&self, id: Window, protocol: Protocol) -> bool {
        let atom = match protocol {
            Protocol::Delete => self.atoms.WM_DELETE_WINDOW,
            Protocol::TakeFocus => self.atoms.WM_TAKE_FOCUS,
        };
        let supported = self
            .get_wm_protocols(id)
            .map(|protocols| protocols.contains(&atom))
            .unwrap_or(false);
        if supported {
            debug!("sending {:?} to window {}", protocol, id);
            self.send_client_message_event(id, atom);
        }
        supported
    }

    fn kill_window(&self, id: Window) {
        info!("Killing window {} using xcb::kill_client()", id);
        xcb::kill_client(&self.conn, id);
    }

    fn get_wm_name(&self, id: Window) -> Result<String> {
        // _NET_WM_NAME is preferred, WM_NAME is the fallback
        match ewmh::get_wm_name(&self.conn, id).get_reply() {
            Ok(r) if !r.string().is_empty() => Ok(r.string().to_string()),
            _ => Ok(icccm::get_wm_name(&self.conn, id).get_reply()?.name().to_string()),
        }
    }

    fn get_wm_class(&self, win: Window) -> Result<(String, String)> {
        let reply = icccm::get_wm_class(&self.conn, win).get_reply()?;
        Ok((reply.instance().to_string(), reply.class().to_string()))
    }

    fn size_hints(&self, win: Window) -> SizeHints {
        SizeHints::from_raw(&self.words_prop(
            win,
            xcb::ATOM_WM_NORMAL_HINTS,
            xcb::ATOM_WM_SIZE_HINTS,
            18,
        ))
    }

    fn wm_hints(&self, win: Window) -> Option<WmHints> {
        let words = self.words_prop(win, xcb::ATOM_WM_HINTS, xcb::ATOM_WM_HINTS, 9);
        if words.is_empty() {
            None
        } else {
            Some(WmHints::from_raw(&words))
        }
    }

    fn set_urgency_hint(&self, win: Window, urgent: bool) {
        let mut words = self.words_prop(win, xcb::ATOM_WM_HINTS, xcb::ATOM_WM_HINTS, 9);
        if words.is_empty() {
            return;
        }
        if urgent {
            words[0] |= WM_HINTS_URGENCY;
        } else {
            words[0] &= !WM_HINTS_URGENCY;
        }
        xcb::change_property(
            &self.conn,
            PROP_MODE_REPLACE,
            win,
            xcb::ATOM_WM_HINTS,
            xcb::ATOM_WM_HINTS,
            32,
            &words,
        );
    }

    fn transient_for(&self, win: Window) -> Option<Window> {
        self.words_prop(win, xcb::ATOM_WM_TRANSIENT_FOR, xcb::ATOM_WINDOW, 1)
            .first()
            .copied()
            .filter(|&w| w != xcb::NONE)
    }

    fn window_types(&self, win: Window) -> Vec<String> {
        ewmh::get_wm_window_type(&self.conn, win)
            .get_reply()
            .map(|r| {
                r.atoms()
                    .iter()
                    .filter_map(|&a| self.atom_name(a))
                    .map(|n| n.trim_start_matches("_NET_WM_WINDOW_TYPE_").to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn requests_fullscreen(&self, win: Window) -> bool {
        ewmh::get_wm_state(&self.conn, win)
            .get_reply()
            .map(|r| r.atoms().contains(&self.conn.WM_STATE_FULLSCREEN()))
            .unwrap_or(false)
    }

    fn set_fullscreen_state(&self, win: Window, fullscreen: bool) {
        if fullscreen {
            ewmh::set_wm_state(&self.conn, win, &[self.conn.WM_STATE_FULLSCREEN()]);
        } else {
            ewmh::set_wm_state(&self.conn, win, &[]);
        }
    }

    fn keycodes(&self) -> Result<KeymapTable> {
        bindings::keycodes_from_xmodmap()
    }

    fn numlock_mask(&self, keycodes: &KeymapTable) -> u16 {
        let numlock = match keycodes.get("Num_Lock") {
            Some(&code) => code,
            None => return 0,
        };
        let reply = match xcb::get_modifier_mapping(&self.conn).get_reply() {
            Ok(r) => r,
            Err(_) => return 0,
        };
        let per_mod = reply.keycodes_per_modifier() as usize;
        reply
            .keycodes()
            .iter()
            .position(|&c| c == numlock)
            .map(|i| 1 << (i / per_mod.max(1)))
            .unwrap_or(0)
    }

    fn root_name(&self) -> Option<String> {
        self.get_wm_name(self.root).ok().filter(|s| !s.is_empty())
    }

    fn publish_bar(&self, monitor: usize, bar: &BarContent) {
        let name = format!("_SPLITWM_BAR{}", monitor);
        match self.bar_atoms.get_or_intern(&name, |n| self.intern_atom(n)) {
            Ok(atom) => self.set_text_property(self.root, atom, &bar.to_string()),
            Err(e) => warn!("unable to publish bar state: {}", e),
        }
    }

    // - Release all of the keybindings we are holding on to
    // - mark ourselves as no longer being the active root window
    fn cleanup(&self) {
        // xcb docs: https://www.mankier.com/3/xcb_ungrab_key
        xcb::ungrab_key(
            &self.conn, // xcb connection to X11
            xcb::GRAB_ANY as u8,
            self.root, // the window to ungrab keys for
            xcb::MOD_MASK_ANY as u16,
        );
        xcb::ungrab_pointer(&self.conn, xcb::CURRENT_TIME);
        xcb::delete_property(&self.conn, self.root, self.conn.ACTIVE_WINDOW());
        self.focus_nothing();
        self.conn.flush();
    }
}
