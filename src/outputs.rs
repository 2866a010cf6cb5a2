//! Lifecycle of one worker per live display.
//!
//! The display-server adapter feeds this manager an event stream; everything
//! here is bookkeeping around probing and worker teardown. An output whose
//! probe fails stays on the books with no worker and is retried on its next
//! identity event.

use crate::control::Control;
use crate::state::SharedState;
use crate::worker::Worker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the display server reports about an output. The connector name is
/// the key used to locate the sysfs card directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputIdentity {
    pub make: String,
    pub model: String,
    pub connector: String,
}

#[derive(Debug)]
pub enum OutputEvent {
    Added { id: u32, version: u32 },
    IdentityUpdated { id: u32, identity: OutputIdentity },
    Removed { id: u32 },
}

struct OutputRecord {
    id: u32,
    identity: Option<OutputIdentity>,
    /// Present iff probing yielded an actuator; the worker owns it.
    worker: Option<Worker>,
}

pub struct OutputManager {
    state: Arc<SharedState>,
    outputs: Vec<OutputRecord>,
}

impl OutputManager {
    pub fn new(state: Arc<SharedState>) -> OutputManager {
        OutputManager {
            state,
            outputs: Vec::new(),
        }
    }

    pub fn handle_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Added { id, version } => self.add_output(id, version),
            OutputEvent::IdentityUpdated { id, identity } => self.update_identity(id, identity),
            OutputEvent::Removed { id } => self.remove_output(id),
        }
    }

    /// Insert a record; identity metadata arrives asynchronously and the
    /// worker is only started once it does.
    fn add_output(&mut self, id: u32, version: u32) {
        debug!("output {id} appeared (version {version})");
        if self.outputs.iter().any(|record| record.id == id) {
            return;
        }
        self.outputs.push(OutputRecord {
            id,
            identity: None,
            worker: None,
        });
    }

    fn update_identity(&mut self, id: u32, identity: OutputIdentity) {
        let Some(record) = self.outputs.iter_mut().find(|record| record.id == id) else {
            debug!("identity event for unknown output {id}");
            return;
        };
        if record.identity.as_ref() == Some(&identity) {
            return;
        }
        // The old worker holds an actuator for the old identity; tear it
        // down (cancel + join) before probing anew.
        record.worker = None;
        record.identity = Some(identity.clone());

        match Control::probe(&identity.connector) {
            Ok(control) => {
                info!(
                    "watching {} for output {} ({}:{})",
                    control.name(),
                    identity.connector,
                    identity.make,
                    identity.model
                );
                record.worker = Some(Worker::spawn(
                    control,
                    Arc::clone(&self.state),
                    identity.connector.clone(),
                ));
            }
            Err(err) => {
                warn!(
                    "failed to infer brightness control for output {} ({}:{}); won't adjust: {err}",
                    identity.connector, identity.make, identity.model
                );
            }
        }
    }

    /// Drop the record; the worker (if any) is cancelled and joined before
    /// the record is destroyed.
    fn remove_output(&mut self, id: u32) {
        let before = self.outputs.len();
        self.outputs.retain(|record| record.id != id);
        if self.outputs.len() < before {
            debug!("output {id} removed");
        }
    }

    #[cfg(test)]
    fn record(&self, id: u32) -> Option<(&Option<OutputIdentity>, bool)> {
        self.outputs
            .iter()
            .find(|record| record.id == id)
            .map(|record| (&record.identity, record.worker.is_some()))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(connector: &str) -> OutputIdentity {
        OutputIdentity {
            make: "Acme".to_string(),
            model: "Display 3000".to_string(),
            connector: connector.to_string(),
        }
    }

    #[test]
    fn added_outputs_are_tracked_without_workers() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        assert_eq!(manager.len(), 1);
        let (stored, has_worker) = manager.record(7).unwrap();
        assert!(stored.is_none());
        assert!(!has_worker);
    }

    #[test]
    fn duplicate_add_is_a_no_op() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn identity_is_stored_even_when_probing_fails() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        // No such connector exists, so the probe fails and the record stays
        // dormant with its identity recorded.
        manager.handle_event(OutputEvent::IdentityUpdated {
            id: 7,
            identity: identity("TEST-OUT-42"),
        });
        let (stored, has_worker) = manager.record(7).unwrap();
        assert_eq!(stored.as_ref(), Some(&identity("TEST-OUT-42")));
        assert!(!has_worker);
    }

    #[test]
    fn unchanged_identity_is_a_no_op() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        manager.handle_event(OutputEvent::IdentityUpdated {
            id: 7,
            identity: identity("TEST-OUT-42"),
        });
        manager.handle_event(OutputEvent::IdentityUpdated {
            id: 7,
            identity: identity("TEST-OUT-42"),
        });
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn identity_change_reprobes_the_new_connector() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        manager.handle_event(OutputEvent::IdentityUpdated {
            id: 7,
            identity: identity("TEST-OUT-42"),
        });
        manager.handle_event(OutputEvent::IdentityUpdated {
            id: 7,
            identity: identity("TEST-OUT-43"),
        });
        let (stored, _) = manager.record(7).unwrap();
        assert_eq!(stored.as_ref().map(|i| i.connector.as_str()), Some("TEST-OUT-43"));
    }

    #[test]
    fn removed_outputs_are_dropped() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Added { id: 7, version: 4 });
        manager.handle_event(OutputEvent::Added { id: 9, version: 4 });
        manager.handle_event(OutputEvent::Removed { id: 7 });
        assert_eq!(manager.len(), 1);
        assert!(manager.record(7).is_none());
        assert!(manager.record(9).is_some());
    }

    #[test]
    fn removing_an_unknown_output_is_harmless() {
        let mut manager = OutputManager::new(Arc::new(SharedState::new()));
        manager.handle_event(OutputEvent::Removed { id: 1234 });
        assert_eq!(manager.len(), 0);
    }
}
