use std::{
    collections::HashMap,
    os::unix::process::CommandExt,
    process::{Command, Stdio},
};

use anyhow::{anyhow, Context, Result};

use crate::{
    actions::Action,
    config::{Config, ConfigError},
    xconnection::XcbKey,
};

pub const MOD_SHIFT: u16 = xcb::MOD_MASK_SHIFT as u16;
pub const MOD_LOCK: u16 = xcb::MOD_MASK_LOCK as u16;
pub const MOD_CONTROL: u16 = xcb::MOD_MASK_CONTROL as u16;
pub const MOD_ALT: u16 = xcb::MOD_MASK_1 as u16;
pub const MOD_SUPER: u16 = xcb::MOD_MASK_4 as u16;
const ALL_MODS: u16 = MOD_SHIFT
    | MOD_CONTROL
    | MOD_ALT
    | xcb::MOD_MASK_2 as u16
    | xcb::MOD_MASK_3 as u16
    | MOD_SUPER
    | xcb::MOD_MASK_5 as u16;

/// Where a mouse button was pressed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClickRegion {
    ClientWin,
    RootWin,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ButtonBinding {
    pub click: ClickRegion,
    pub mod_mask: u16,
    pub button: u8,
    pub action: Action,
}

impl ButtonBinding {
    pub fn new(click: ClickRegion, mod_mask: u16, button: u8, action: Action) -> ButtonBinding {
        ButtonBinding {
            click,
            mod_mask,
            button,
            action,
        }
    }
}

type KeyBindings = HashMap<XcbKey, Action>;

/// The resolved key and button tables.
pub struct Bindings {
    keys: KeyBindings,
    buttons: Vec<ButtonBinding>,
    numlock: u16,
}

impl Bindings {
    /// Resolve the configured key names against the current keymap.
    pub fn new(config: &Config, keycodes: &KeymapTable, numlock: u16) -> Result<Bindings, ConfigError> {
        let mut keys = KeyBindings::new();
        for binding in &config.keys {
            match parse_key_binding(&binding.key, keycodes) {
                Some(key) => {
                    keys.insert(key, binding.action.clone());
                }
                None => return Err(ConfigError::InvalidKey(binding.key.clone())),
            }
        }
        Ok(Bindings {
            keys,
            buttons: config.buttons.clone(),
            numlock,
        })
    }

    /// Modifier state with lock keys and pointer buttons masked out.
    pub fn clean_mask(&self, state: u16) -> u16 {
        state & !(self.numlock | MOD_LOCK) & ALL_MODS
    }

    /// Every lock-key combination a binding must be grabbed under.
    pub fn lock_variants(&self) -> [u16; 4] {
        [0, MOD_LOCK, self.numlock, self.numlock | MOD_LOCK]
    }

    pub fn get_action(&self, key: &XcbKey) -> Option<Action> {
        let key = XcbKey {
            mod_mask: self.clean_mask(key.mod_mask),
            code: key.code,
        };
        self.keys.get(&key).cloned()
    }

    pub fn button_action(&self, click: ClickRegion, state: u16, button: u8) -> Option<Action> {
        let state = self.clean_mask(state);
        self.buttons
            .iter()
            .find(|b| b.click == click && b.button == button && b.mod_mask == state)
            .map(|b| b.action.clone())
    }

    /// Keys to grab on the root window, one entry per lock-key combination.
    pub fn grabbed_keys(&self) -> Vec<XcbKey> {
        self.keys
            .keys()
            .flat_map(|k| {
                IntoIterator::into_iter(self.lock_variants()).map(move |lock| XcbKey {
                    mod_mask: k.mod_mask | lock,
                    code: k.code,
                })
            })
            .collect()
    }

    /// Buttons to grab on client windows, one entry per lock-key combination.
    pub fn grabbed_buttons(&self) -> Vec<(u16, u8)> {
        self.buttons
            .iter()
            .filter(|b| b.click == ClickRegion::ClientWin)
            .flat_map(|b| {
                IntoIterator::into_iter(self.lock_variants())
                    .map(move |lock| (b.mod_mask | lock, b.button))
            })
            .collect()
    }
}

/// Map xmodmap key names to their X key code so that we can bind them by name
pub type KeymapTable = HashMap<String, u8>;

/**
 * Run the xmodmap command to dump the system keymap table.
 *
 * This is done in a form that we can load in and convert back to key
 * codes. This lets the user define key bindings in the way that they
 * would expect while also ensuring that it is east to debug any odd
 * issues with bindings by referring the user to the xmodmap output.
 */
pub fn keycodes_from_xmodmap() -> Result<KeymapTable> {
    let output = Command::new("xmodmap")
        .arg("-pke")
        .output()
        .context("unable to fetch keycodes via xmodmap")?;
    let s = String::from_utf8(output.stdout).context("invalid utf8 from xmodmap")?;
    Ok(parse_xmodmap(&s))
}

/// Parse `xmodmap -pke` output, skipping lines that do not look like
/// `keycode <code> = <names ...>`.
pub fn parse_xmodmap(s: &str) -> KeymapTable {
    s.lines()
        .flat_map(|l| {
            let mut words = l.split_whitespace();
            let key_code = words.nth(1).and_then(|w| w.parse::<u8>().ok());
            let names: Vec<&str> = words.skip(1).collect();
            key_code
                .into_iter()
                .flat_map(move |code| names.clone().into_iter().map(move |name| (name.to_string(), code)))
        })
        .fold(KeymapTable::new(), |mut table, (name, code)| {
            // first keycode producing a name wins
            table.entry(name).or_insert(code);
            table
        })
}

/// Modifier mask of a '<MOD>-<key name>' pattern, `None` on an unknown prefix.
pub fn parse_modifiers(pattern: &str) -> Option<u16> {
    let mut parts: Vec<&str> = pattern.split('-').collect();
    parts.pop()?;
    parts.iter().try_fold(0, |acc, s| {
        let m = match *s {
            "A" => MOD_ALT,
            "M" => MOD_SUPER,
            "S" => MOD_SHIFT,
            "C" => MOD_CONTROL,
            _ => return None,
        };
        Some(acc | m)
    })
}

/**
 * Convert user friendly key bindings into X keycodes.
 *
 * Bindings are of the form '<MOD>-<key name>' with multiple modifiers being
 * allowed, and keynames being taken from the output of 'xmodmap -pke'.
 *
 * Allowed modifiers are:
 *   M - Super
 *   A - Alt
 *   C - Ctrl
 *   S - Shift
 */
pub fn parse_key_binding(pattern: &str, known_codes: &KeymapTable) -> Option<XcbKey> {
    let name = pattern.rsplit('-').next()?;
    let code = known_codes.get(name)?;
    let mask = parse_modifiers(pattern)?;
    Some(XcbKey {
        mod_mask: mask,
        code: *code,
    })
}

/**
 * Run an external command, detached from the window manager.
 *
 * The child gets its own session and its stdout and stderr go to /dev/null.
 */
pub fn spawn(argv: &[&str]) -> Result<()> {
    let (prog, args) = argv.split_first().ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(prog);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
    cmd.spawn()
        .with_context(|| format!("error spawning external program: {}", prog))?;
    Ok(())
}
