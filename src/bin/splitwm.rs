use anyhow::Result;
use nix::sys::signal::{signal, SigHandler, Signal};
use simplelog::{LevelFilter, SimpleLogger};
use splitwm::{Config, WindowManager, XcbConnection};

fn main() -> Result<()> {
    // -- logging --
    let level = if std::env::var_os("SPLITWM_DEBUG").is_some() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::init(level, simplelog::Config::default())?;

    // spawned programs are never waited on
    unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }?;

    let conn = XcbConnection::new()?;
    let mut wm = WindowManager::new(&conn, Config::default())?;
    wm.run()
}
