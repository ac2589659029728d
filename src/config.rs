//! The static configuration tables handed to the window manager at start-up.

use std::time::Duration;

use crate::{
    actions::Action,
    bindings::{self, ButtonBinding, ClickRegion, MOD_SHIFT, MOD_SUPER},
    layout::{Layout, LayoutKind, Stacking},
    rules::{Rule, WorkspaceOverride},
    tag::{self, TagId, TagMask, MAX_TAGS},
    workspace::{VF_MAX, VF_MIN},
};

/// Configuration invariants checked before the reactor starts.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one tag must be configured")]
    NoTags,
    #[error("{count} tags configured but a tag mask only holds {max}")]
    TooManyTags { count: usize, max: usize },
    #[error("at least one workspace must be configured")]
    NoWorkspaces,
    #[error("at least one layout must be configured")]
    NoLayouts,
    #[error("tag index {0} is out of range")]
    UnknownTag(TagId),
    #[error("tag mask {0:#x} refers to unconfigured tags")]
    UnknownTagMask(TagMask),
    #[error("layout index {0} is out of range")]
    UnknownLayout(usize),
    #[error("workspace index {0} is out of range")]
    UnknownWorkspace(usize),
    #[error("vf {0} is outside of {min}..={max}", min = VF_MIN, max = VF_MAX)]
    InvalidVf(f32),
    #[error("invalid key binding: {0}")]
    InvalidKey(String),
}

/// Initial state of one workspace.
#[derive(Debug, PartialEq, Clone)]
pub struct WorkspaceConfig {
    pub views: [Option<TagId>; 2],
    pub layout: usize,
    pub caps: [u32; 2],
    pub vf: f32,
    pub show_bar: bool,
    pub spawn_floating: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            views: [Some(0), None],
            layout: 0,
            caps: [0, 0],
            vf: 0.55,
            show_bar: true,
            spawn_floating: false,
        }
    }
}

/// A key binding in the '<MOD>-<key name>' format understood by
/// [bindings::parse_key_binding].
#[derive(Debug, PartialEq, Clone)]
pub struct KeyBinding {
    pub key: String,
    pub action: Action,
}

impl KeyBinding {
    pub fn new(key: impl Into<String>, action: Action) -> KeyBinding {
        KeyBinding {
            key: key.into(),
            action,
        }
    }
}

/// The main user facing configuration details
#[derive(Debug, Clone)]
pub struct Config {
    /// Tag labels, one bit each. Must have at least one element.
    pub tags: Vec<String>,
    /// Per-workspace defaults, one entry per workspace of every monitor.
    pub workspaces: Vec<WorkspaceConfig>,
    /// _NET_WM_WINDOW_TYPE_XXX values that should always be treated as floating.
    pub floating_window_types: &'static [&'static str],
    /// Focused border color
    pub focused_border_color: u32,
    /// Unfocused border color
    pub unfocused_border_color: u32,
    /// Border color of clients demanding attention
    pub urgent_border_color: u32,
    /// The width of window borders in pixels
    pub border_width_px: u32,
    /// Distance in pixels at which dragged edges snap to the work area
    pub snap_px: u32,
    /// True if the status bar should be at the top of the screen, false if it should be at the bottom
    pub top_bar: bool,
    /// Height of space reserved for status bars in pixels
    pub bar_height: u32,
    /// How often the bar is refreshed while idle
    pub bar_refresh: Duration,
    /// Maximum rate at which pointer motion is applied during move/resize
    pub motion_refresh_hz: u32,
    pub layouts: Vec<Layout>,
    pub rules: Vec<Rule>,
    /// Raw WM_CLASS values and the class name rules match them under
    pub class_aliases: Vec<(&'static str, &'static str)>,
    pub keys: Vec<KeyBinding>,
    pub buttons: Vec<ButtonBinding>,
}

const MODKEY: &str = "M";

impl Default for Config {
    /// Initialise a default Config, giving sensible (but minimal) values for all fields.
    fn default() -> Config {
        let tags: Vec<String> = (1..=9).map(|i| i.to_string()).collect();
        let workspaces = (0..tags.len())
            .map(|i| WorkspaceConfig {
                views: [Some(i), None],
                ..WorkspaceConfig::default()
            })
            .collect();

        Config {
            tags,
            workspaces,
            floating_window_types: &["DIALOG", "UTILITY", "SPLASH"],
            focused_border_color: 0xcc241d,   // #cc241d
            unfocused_border_color: 0x3c3836, // #3c3836
            urgent_border_color: 0xd79921,    // #d79921
            border_width_px: 2,
            snap_px: 32,
            top_bar: true,
            bar_height: 18,
            bar_refresh: Duration::from_secs(1),
            motion_refresh_hz: 60,
            layouts: default_layouts(),
            rules: vec![
                Rule {
                    class: Some("Gimp"),
                    floating: true,
                    ..Rule::default()
                },
                Rule {
                    class: Some("Firefox"),
                    tags: tag::bit(8),
                    ..Rule::default()
                },
                Rule {
                    class: Some("Chromium"),
                    tags: tag::bit(8),
                    workspace: Some(WorkspaceOverride {
                        vf: Some(0.7),
                        ..WorkspaceOverride::default()
                    }),
                    ..Rule::default()
                },
            ],
            class_aliases: vec![("chromium-browser", "Chromium"), ("Google-chrome", "Chromium")],
            keys: default_keys(9),
            buttons: default_buttons(),
        }
    }
}

fn default_layouts() -> Vec<Layout> {
    use Stacking::*;
    vec![
        Layout::new("[]=", LayoutKind::Tile { primary: Vertical, secondary: Vertical }),
        Layout::new("[]|", LayoutKind::Tile { primary: Vertical, secondary: Horizontal }),
        Layout::new("|[]", LayoutKind::Tile { primary: Horizontal, secondary: Vertical }),
        Layout::new("|||", LayoutKind::Tile { primary: Horizontal, secondary: Horizontal }),
        Layout::new("[M]", LayoutKind::Monocle),
        Layout::new("><>", LayoutKind::Floating),
    ]
}

fn default_keys(n_tags: usize) -> Vec<KeyBinding> {
    let k = |key: &str| format!("{}-{}", MODKEY, key);
    let mut keys = vec![
        KeyBinding::new(k("Return"), Action::Spawn(&["alacritty"])),
        KeyBinding::new(k("e"), Action::Spawn(&["spacefm"])),
        KeyBinding::new(k("p"), Action::Spawn(&["dmenu_run"])),
        KeyBinding::new(k("b"), Action::ToggleBar),
        KeyBinding::new(k("j"), Action::FocusStack(1)),
        KeyBinding::new(k("k"), Action::FocusStack(-1)),
        KeyBinding::new(k("i"), Action::IncCap { view: 0, delta: 1 }),
        KeyBinding::new(k("d"), Action::IncCap { view: 0, delta: -1 }),
        KeyBinding::new(k("S-i"), Action::IncCap { view: 1, delta: 1 }),
        KeyBinding::new(k("S-d"), Action::IncCap { view: 1, delta: -1 }),
        KeyBinding::new(k("h"), Action::SetVf(-0.05)),
        KeyBinding::new(k("l"), Action::SetVf(0.05)),
        KeyBinding::new(k("z"), Action::Zoom),
        KeyBinding::new(k("s"), Action::SwapViews),
        KeyBinding::new(k("0"), Action::ClearViews),
        KeyBinding::new(k("Tab"), Action::SwitchWorkspace(None)),
        KeyBinding::new(k("q"), Action::KillClient),
        KeyBinding::new(k("t"), Action::SetLayout(Some(0))),
        KeyBinding::new(k("m"), Action::SetLayout(Some(4))),
        KeyBinding::new(k("f"), Action::SetLayout(Some(5))),
        KeyBinding::new(k("space"), Action::SetLayout(None)),
        KeyBinding::new(k("S-space"), Action::ToggleFloating),
        KeyBinding::new(k("S-f"), Action::ToggleFullscreen),
        KeyBinding::new(k("S-m"), Action::ToggleMaximize),
        KeyBinding::new(k("comma"), Action::FocusMonitor(-1)),
        KeyBinding::new(k("period"), Action::FocusMonitor(1)),
        KeyBinding::new(k("S-comma"), Action::SendToMonitor(-1)),
        KeyBinding::new(k("S-period"), Action::SendToMonitor(1)),
        KeyBinding::new(k("S-q"), Action::Quit),
    ];
    for t in 0..n_tags {
        let n = t + 1;
        keys.push(KeyBinding::new(k(&n.to_string()), Action::SetView { view: 0, tag: t }));
        keys.push(KeyBinding::new(k(&format!("C-{}", n)), Action::SetView { view: 1, tag: t }));
        keys.push(KeyBinding::new(k(&format!("S-{}", n)), Action::Tag(t)));
        keys.push(KeyBinding::new(k(&format!("C-S-{}", n)), Action::ToggleTag(t)));
        keys.push(KeyBinding::new(k(&format!("A-{}", n)), Action::SwitchWorkspace(Some(t))));
    }
    keys
}

fn default_buttons() -> Vec<ButtonBinding> {
    vec![
        ButtonBinding::new(ClickRegion::ClientWin, MOD_SUPER, 1, Action::MoveMouse),
        ButtonBinding::new(ClickRegion::ClientWin, MOD_SUPER, 2, Action::ToggleFloating),
        ButtonBinding::new(ClickRegion::ClientWin, MOD_SUPER, 3, Action::ResizeMouse),
        ButtonBinding::new(ClickRegion::RootWin, MOD_SUPER | MOD_SHIFT, 1, Action::Spawn(&["alacritty"])),
    ]
}

impl Config {
    /// Reject configurations the window manager cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n_tags = self.tags.len();
        if n_tags == 0 {
            return Err(ConfigError::NoTags);
        }
        if n_tags > MAX_TAGS {
            return Err(ConfigError::TooManyTags {
                count: n_tags,
                max: MAX_TAGS,
            });
        }
        if self.workspaces.is_empty() {
            return Err(ConfigError::NoWorkspaces);
        }
        if self.layouts.is_empty() {
            return Err(ConfigError::NoLayouts);
        }

        for ws in &self.workspaces {
            if let Some(t) = ws.views.iter().flatten().find(|&&t| t >= n_tags) {
                return Err(ConfigError::UnknownTag(*t));
            }
            self.check_layout(ws.layout)?;
            if !(VF_MIN..=VF_MAX).contains(&ws.vf) {
                return Err(ConfigError::InvalidVf(ws.vf));
            }
        }

        let valid = tag::all(n_tags);
        for rule in &self.rules {
            if rule.tags & !valid != 0 {
                return Err(ConfigError::UnknownTagMask(rule.tags));
            }
            if let Some(o) = &rule.workspace {
                if let Some(l) = o.layout {
                    self.check_layout(l)?;
                }
                if let Some(vf) = o.vf {
                    if !(VF_MIN..=VF_MAX).contains(&vf) {
                        return Err(ConfigError::InvalidVf(vf));
                    }
                }
            }
        }

        for binding in &self.keys {
            if bindings::parse_modifiers(&binding.key).is_none() {
                return Err(ConfigError::InvalidKey(binding.key.clone()));
            }
            self.check_action(&binding.action)?;
        }
        for binding in &self.buttons {
            self.check_action(&binding.action)?;
        }
        Ok(())
    }

    fn check_layout(&self, index: usize) -> Result<(), ConfigError> {
        if index >= self.layouts.len() {
            Err(ConfigError::UnknownLayout(index))
        } else {
            Ok(())
        }
    }

    fn check_action(&self, action: &Action) -> Result<(), ConfigError> {
        let n_tags = self.tags.len();
        match *action {
            Action::SetView { view, tag } if view > 1 || tag >= n_tags => {
                Err(ConfigError::UnknownTag(tag))
            }
            Action::Tag(t) | Action::ToggleTag(t) if t >= n_tags => Err(ConfigError::UnknownTag(t)),
            Action::IncCap { view, .. } if view > 1 => Err(ConfigError::UnknownTag(view)),
            Action::SetLayout(Some(l)) => self.check_layout(l),
            Action::SwitchWorkspace(Some(w)) if w >= self.workspaces.len() => {
                Err(ConfigError::UnknownWorkspace(w))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn too_many_tags_are_rejected() {
        let mut config = Config::default();
        config.tags = (0..33).map(|i| i.to_string()).collect();
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyTags { count: 33, max: 32 })
        );
    }

    #[test]
    fn empty_tables_are_rejected() {
        let mut config = Config::default();
        config.tags.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoTags));

        let mut config = Config::default();
        config.workspaces.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoWorkspaces));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let mut config = Config::default();
        config.workspaces[0].views[1] = Some(9);
        assert_eq!(config.validate(), Err(ConfigError::UnknownTag(9)));

        let mut config = Config::default();
        config.workspaces[3].layout = 42;
        assert_eq!(config.validate(), Err(ConfigError::UnknownLayout(42)));

        let mut config = Config::default();
        config.rules[0].tags = tag::bit(12);
        assert_eq!(config.validate(), Err(ConfigError::UnknownTagMask(1 << 12)));

        let mut config = Config::default();
        config.keys.push(KeyBinding::new("M-x", Action::SwitchWorkspace(Some(9))));
        assert_eq!(config.validate(), Err(ConfigError::UnknownWorkspace(9)));
    }

    #[test]
    fn bad_vf_and_modifiers_are_rejected() {
        let mut config = Config::default();
        config.workspaces[0].vf = 0.99;
        assert_eq!(config.validate(), Err(ConfigError::InvalidVf(0.99)));

        let mut config = Config::default();
        config.keys.push(KeyBinding::new("X-Return", Action::Quit));
        assert_eq!(config.validate(), Err(ConfigError::InvalidKey("X-Return".into())));
    }
}
