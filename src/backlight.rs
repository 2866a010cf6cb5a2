//! Laptop-panel brightness via `/sys/class/backlight`.
//!
//! Sysfs writes are synchronous and transactional, so unlike the DDC path
//! there is no retry loop and the cancel flag is never consulted.

use crate::error::Error;
use crate::sysfs;
use std::fs::File;
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct BacklightControl {
    name: String,
    brightness: File,
    brightness_path: PathBuf,
    actual_brightness: File,
    actual_brightness_path: PathBuf,
    max_brightness: i64,
}

impl BacklightControl {
    /// Look for a backlight device under an output's card directory.
    ///
    /// Accepts only subdirectories whose `subsystem` link resolves into
    /// `…/class/backlight`. Returns `Ok(None)` when the output simply has no
    /// backlight; opening any of the three attribute files is expected to
    /// succeed once such a directory is found.
    pub fn probe(output: &str, output_dir: &Path) -> Result<Option<BacklightControl>, Error> {
        let entries =
            std::fs::read_dir(output_dir).map_err(|err| Error::io("opendir", output_dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| Error::io("readdir", output_dir, err))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| Error::io("readdir", output_dir, err))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let dir = output_dir.join(entry.file_name());
            match sysfs::read_link(dir.join("subsystem"))? {
                Some(target) if target.ends_with("class/backlight") => {}
                _ => continue,
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let max_path = dir.join("max_brightness");
            let max_file = sysfs::open(&max_path)?;
            let max_brightness = sysfs::read_int(&max_file, &max_path)?;
            if max_brightness <= 0 {
                return Err(Error::Precondition(format!(
                    "{output} {name}: max_brightness {max_brightness} is not positive"
                )));
            }
            let brightness_path = dir.join("brightness");
            let brightness = sysfs::open_wo(&brightness_path)?;
            let actual_brightness_path = dir.join("actual_brightness");
            let actual_brightness = sysfs::open(&actual_brightness_path)?;
            return Ok(Some(BacklightControl {
                name,
                brightness,
                brightness_path,
                actual_brightness,
                actual_brightness_path,
                max_brightness,
            }));
        }
        Ok(None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_percent(&mut self, _cancel: &mut dyn FnMut() -> bool) -> Result<i64, Error> {
        let actual = sysfs::read_int(&self.actual_brightness, &self.actual_brightness_path)?;
        Ok(100 * actual / self.max_brightness)
    }

    pub fn set_percent(
        &mut self,
        percent: i64,
        _cancel: &mut dyn FnMut() -> bool,
    ) -> Result<(), Error> {
        let value = (percent * self.max_brightness / 100).to_string();
        let mut file = &self.brightness;
        file.seek(SeekFrom::Start(0))
            .map_err(|err| Error::io("seek", &self.brightness_path, err))?;
        loop {
            match file.write(value.as_bytes()) {
                Ok(n) if n == value.len() => return Ok(()),
                Ok(_) => {
                    return Err(Error::io(
                        "write",
                        &self.brightness_path,
                        std::io::Error::new(ErrorKind::WriteZero, "short write"),
                    ));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io("write", &self.brightness_path, err)),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        name: &str,
        brightness_path: PathBuf,
        actual_brightness_path: PathBuf,
        max_brightness: i64,
    ) -> BacklightControl {
        BacklightControl {
            name: name.to_string(),
            brightness: File::options()
                .write(true)
                .open(&brightness_path)
                .unwrap(),
            brightness_path,
            actual_brightness: File::open(&actual_brightness_path).unwrap(),
            actual_brightness_path,
            max_brightness,
        }
    }
}
