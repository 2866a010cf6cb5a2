//! Polymorphic brightness actuator and the per-output probe.
//!
//! The two variants share no state, only a contract: percent get/set with a
//! cooperative cancel, a device name, and the last percent known to have been
//! on the hardware.

use crate::backlight::BacklightControl;
use crate::ddc::DdcControl;
use crate::error::Error;
use std::path::Path;

enum ControlKind {
    Backlight(BacklightControl),
    Ddc(DdcControl),
}

pub struct Control {
    kind: ControlKind,
    cached_percent: Option<i64>,
}

impl From<BacklightControl> for Control {
    fn from(backlight: BacklightControl) -> Control {
        Control {
            kind: ControlKind::Backlight(backlight),
            cached_percent: None,
        }
    }
}

impl From<DdcControl> for Control {
    fn from(ddc: DdcControl) -> Control {
        Control {
            kind: ControlKind::Ddc(ddc),
            cached_percent: None,
        }
    }
}

impl Control {
    /// Find the brightness actuator for a connector such as `DP-1`.
    ///
    /// Scans `/sys/class/drm` for the `card<N>-<connector>` symlink, then
    /// tries the backlight class first and DDC/I²C second. I/O failures while
    /// probing surface as errors; a connector with no usable actuator is
    /// `NotFound`. Either way the caller keeps the output and leaves it
    /// dormant.
    pub fn probe(connector: &str) -> Result<Control, Error> {
        Self::probe_in(connector, Path::new("/sys/class/drm"))
    }

    fn probe_in(connector: &str, drm_dir: &Path) -> Result<Control, Error> {
        let entries =
            std::fs::read_dir(drm_dir).map_err(|err| Error::io("opendir", drm_dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| Error::io("readdir", drm_dir, err))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(card_num) = name
                .strip_prefix("card")
                .and_then(|rest| rest.strip_suffix(connector))
                .and_then(|rest| rest.strip_suffix('-'))
            else {
                continue;
            };
            if card_num.parse::<u64>().is_err() {
                continue;
            }

            let output_dir = drm_dir.join(&name);
            if let Some(backlight) = BacklightControl::probe(connector, &output_dir)? {
                return Ok(Control::from(backlight));
            }
            if let Some(ddc) = DdcControl::probe(connector, &output_dir)? {
                return Ok(Control::from(ddc));
            }
            return Err(Error::NotFound(format!(
                "no brightness control found for {connector}"
            )));
        }
        Err(Error::NotFound(format!(
            "no drm output directory found for {connector}"
        )))
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            ControlKind::Backlight(backlight) => backlight.name(),
            ControlKind::Ddc(ddc) => ddc.name(),
        }
    }

    /// Percent the hardware last confirmed, from a successful get or set.
    pub fn cached_percent(&self) -> Option<i64> {
        self.cached_percent
    }

    pub fn get_percent(&mut self, cancel: &mut dyn FnMut() -> bool) -> Result<i64, Error> {
        let result = match &mut self.kind {
            ControlKind::Backlight(backlight) => backlight.get_percent(cancel),
            ControlKind::Ddc(ddc) => ddc.get_percent(cancel),
        };
        if let Ok(percent) = result {
            self.cached_percent = Some(percent);
        }
        result
    }

    pub fn set_percent(
        &mut self,
        percent: i64,
        cancel: &mut dyn FnMut() -> bool,
    ) -> Result<(), Error> {
        let result = match &mut self.kind {
            ControlKind::Backlight(backlight) => backlight.set_percent(percent, cancel),
            ControlKind::Ddc(ddc) => ddc.set_percent(percent, cancel),
        };
        if result.is_ok() {
            self.cached_percent = Some(percent);
        }
        result
    }
}
