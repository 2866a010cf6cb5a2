//! Session-bus surface.
//!
//! A thin adapter over [`SharedState`]: every method returns the resulting
//! percentage (never a bus error), mutators wake the workers through the
//! shared condition variable and announce the change on the `watch` signal,
//! and `poke` re-announces unconditionally so a freshly started bar can ask
//! for a broadcast.

use crate::state::SharedState;
use std::sync::Arc;
use tracing::warn;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.jjaro.ddclight";
pub const OBJECT_PATH: &str = "/org/jjaro/ddclight";

pub struct DdcLight {
    state: Arc<SharedState>,
}

impl DdcLight {
    pub fn new(state: Arc<SharedState>) -> DdcLight {
        DdcLight { state }
    }

    async fn announce(emitter: &SignalEmitter<'_>, percentage: i64) {
        if let Err(err) = DdcLight::watch(emitter, percentage).await {
            warn!("failed to emit watch signal: {err}");
        }
    }
}

#[zbus::interface(name = "org.jjaro.ddclight")]
impl DdcLight {
    /// Current setpoint, defaulting to 50 before one is established.
    #[zbus(name = "get")]
    fn get(&self) -> i64 {
        self.state.get()
    }

    /// Re-announce the current setpoint and return it.
    #[zbus(name = "poke")]
    async fn poke(&self, #[zbus(signal_emitter)] emitter: SignalEmitter<'_>) -> i64 {
        let value = self.state.get();
        DdcLight::announce(&emitter, value).await;
        value
    }

    /// Store a setpoint, clamped to [0, 100]. Announces only on change.
    #[zbus(name = "set")]
    async fn set(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        percentage: i64,
    ) -> i64 {
        let (value, changed) = self.state.set(percentage);
        if changed {
            DdcLight::announce(&emitter, value).await;
        }
        value
    }

    /// Raise the setpoint by a clamped step, saturating at 100.
    #[zbus(name = "increment")]
    async fn increment(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        percentage: i64,
    ) -> i64 {
        let (value, changed) = self.state.increment(percentage);
        if changed {
            DdcLight::announce(&emitter, value).await;
        }
        value
    }

    /// Lower the setpoint by a clamped step, saturating at 0.
    #[zbus(name = "decrement")]
    async fn decrement(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        percentage: i64,
    ) -> i64 {
        let (value, changed) = self.state.decrement(percentage);
        if changed {
            DdcLight::announce(&emitter, value).await;
        }
        value
    }

    /// Emitted with the resulting setpoint after every change and on `poke`.
    #[zbus(signal, name = "watch")]
    async fn watch(emitter: &SignalEmitter<'_>, percentage: i64) -> zbus::Result<()>;
}
