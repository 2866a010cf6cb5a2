//! Display-server adapter.
//!
//! Listens to the Wayland registry and turns `wl_output` globals into the
//! output-event stream the manager consumes: a bound global is `Added`, its
//! `geometry`/`name` events are coalesced until `done` into
//! `IdentityUpdated`, and a removed global is `Removed`.

use crate::error::Error;
use crate::outputs::{OutputEvent, OutputIdentity, OutputManager};
use crate::state::SharedState;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use wayland_client::{
    Connection, Dispatch, QueueHandle,
    protocol::{wl_output, wl_registry},
};

/// Identity fields accumulate across events and only become an update on
/// `done`.
#[derive(Default)]
struct PendingIdentity {
    make: String,
    model: String,
    connector: String,
}

struct WatcherState {
    manager: OutputManager,
    pending: HashMap<u32, PendingIdentity>,
}

/// Connect to the compositor and dispatch output events forever.
///
/// Returns only on connection or dispatch failure; the caller decides whether
/// the daemon keeps running without display tracking.
pub fn run(state: Arc<SharedState>) -> Result<(), Error> {
    let connection =
        Connection::connect_to_env().map_err(|err| Error::Wayland(err.to_string()))?;
    let mut event_queue = connection.new_event_queue();
    let qh = event_queue.handle();
    let display = connection.display();
    let _registry = display.get_registry(&qh, ());

    let mut watcher = WatcherState {
        manager: OutputManager::new(state),
        pending: HashMap::new(),
    };
    loop {
        event_queue
            .blocking_dispatch(&mut watcher)
            .map_err(|err| Error::Wayland(err.to_string()))?;
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for WatcherState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if interface != "wl_output" {
                    return;
                }
                // Version 4 carries the name (connector) event; clamp to it.
                let version = version.min(4);
                registry.bind::<wl_output::WlOutput, _, _>(name, version, qh, name);
                state.pending.insert(name, PendingIdentity::default());
                state.manager.handle_event(OutputEvent::Added { id: name, version });
            }
            wl_registry::Event::GlobalRemove { name } => {
                if state.pending.remove(&name).is_some() {
                    state.manager.handle_event(OutputEvent::Removed { id: name });
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for WatcherState {
    fn event(
        state: &mut Self,
        _proxy: &wl_output::WlOutput,
        event: wl_output::Event,
        data: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let id = *data;
        let Some(pending) = state.pending.get_mut(&id) else {
            return;
        };
        match event {
            wl_output::Event::Geometry { make, model, .. } => {
                pending.make = make;
                pending.model = model;
            }
            wl_output::Event::Name { name } => {
                pending.connector = name;
            }
            wl_output::Event::Done => {
                if pending.connector.is_empty() {
                    // Compositor too old to report connector names; without
                    // one there is no sysfs directory to probe.
                    debug!("output {id} reported no connector name");
                    return;
                }
                let identity = OutputIdentity {
                    make: pending.make.clone(),
                    model: pending.model.clone(),
                    connector: pending.connector.clone(),
                };
                state
                    .manager
                    .handle_event(OutputEvent::IdentityUpdated { id, identity });
            }
            _ => {}
        }
    }
}
