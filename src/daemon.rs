//! Daemon assembly.
//!
//! The session-bus connection answers client RPCs from zbus's executor; the
//! calling thread follows the display server and runs the output manager.
//! Per-output failures never bring the daemon down; a daemon that lost its
//! compositor keeps serving the bus so clients still get answers.

use crate::bus::{BUS_NAME, DdcLight, OBJECT_PATH};
use crate::error::Error;
use crate::state::SharedState;
use crate::wayland;
use std::sync::Arc;
use tracing::{info, warn};

pub fn run() -> Result<(), Error> {
    let state = Arc::new(SharedState::new());

    let _connection = zbus::blocking::connection::Builder::session()?
        .serve_at(OBJECT_PATH, DdcLight::new(Arc::clone(&state)))?
        .name(BUS_NAME)?
        .build()?;
    info!("serving {BUS_NAME} on the session bus");

    if let Err(err) = wayland::run(state) {
        warn!("no display-server connection; no outputs will be adjusted: {err}");
        loop {
            std::thread::park();
        }
    }
    Ok(())
}
