//! A dynamic tiling window manager for X11 whose workspaces show two tag
//! views side by side.

#[macro_use]
extern crate log;

pub mod actions;
pub mod bindings;
pub mod client;
pub mod config;
pub mod geometry;
pub mod layout;
pub mod monitor;
pub mod rules;
pub mod status;
pub mod tag;
pub mod wm;
pub mod workspace;
pub mod xconnection;

mod events;
mod interaction;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use wm::WindowManager;
pub use xconnection::XcbConnection;
