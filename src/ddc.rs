//! DDC/CI brightness control over `/dev/i2c-*`.
//!
//! The protocol is a small framed exchange on I²C slave 0x37: a Get-VCP or
//! Set-VCP request frame with an XOR checksum, and (for GET) a 12-byte reply
//! validated field by field. Monitors are slow and flaky on this bus, so
//! every exchange runs under a bounded retry loop with a cancellation check
//! before each attempt, and the reply is only read after a 40 ms settle
//! delay.

use crate::error::Error;
use crate::sysfs;
use nix::libc;
use nix::sys::stat::{major, minor};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const TRIES: u32 = 10;
/// 7-bit DDC/CI slave address.
const DEVICE_BUS_ADDR: u16 = 0x37;
/// EDID slave address, used only by the DP-MST fallback.
const EDID_BUS_ADDR: u16 = 0x50;
/// Destination byte; the kernel prepends it on the wire, but it still
/// participates in the request checksum.
const DEVICE_WRITE_ADDR: u8 = 0x6e;
const HOST_WRITE_ADDR: u8 = 0x51;
const HOST_READ_ADDR: u8 = 0x50;
const OPCODE_GET_VCP_REQ: u8 = 0x01;
const OPCODE_GET_VCP_RESP: u8 = 0x02;
const OPCODE_SET_VCP_REQ: u8 = 0x03;
const VCP_BRIGHTNESS: u8 = 0x10;
/// Monitors drop the reply when it is read back sooner than this.
const RESPONSE_DELAY: Duration = Duration::from_millis(40);

const fn length_byte(payload: usize) -> u8 {
    0x80 + payload as u8
}

fn checksum(buf: &[u8]) -> u8 {
    buf.iter().fold(0, |cksum, byte| cksum ^ byte)
}

/// Get-VCP brightness request. Index 0 is the synthetic destination byte;
/// callers put `&frame[1..]` on the bus.
fn encode_get_request() -> [u8; 6] {
    let mut req = [
        DEVICE_WRITE_ADDR,
        HOST_WRITE_ADDR,
        length_byte(2),
        OPCODE_GET_VCP_REQ,
        VCP_BRIGHTNESS,
        0,
    ];
    req[5] = checksum(&req[..5]);
    req
}

/// Set-VCP brightness request carrying a big-endian raw value.
fn encode_set_request(value: u16) -> [u8; 8] {
    let mut req = [
        DEVICE_WRITE_ADDR,
        HOST_WRITE_ADDR,
        length_byte(4),
        OPCODE_SET_VCP_REQ,
        VCP_BRIGHTNESS,
        (value >> 8) as u8,
        value as u8,
        0,
    ];
    req[7] = checksum(&req[..7]);
    req
}

/// Validate a Get-VCP reply (synthetic source byte at index 0) and extract
/// `(max, value)`. All fixed bytes must match, max must be nonzero, and the
/// XOR of the full frame must be zero.
fn validate_response(resp: &[u8; 12], label: &str) -> Result<(u16, u16), Error> {
    if resp[1] != DEVICE_WRITE_ADDR {
        return Err(Error::Protocol(format!(
            "{label}: unexpected source address 0x{:02x}",
            resp[1]
        )));
    }
    if resp[2] != length_byte(8) {
        return Err(Error::Protocol(format!(
            "{label}: unexpected length 0x{:02x}",
            resp[2]
        )));
    }
    if resp[3] != OPCODE_GET_VCP_RESP {
        return Err(Error::Protocol(format!(
            "{label}: unexpected resp opcode 0x{:02x}",
            resp[3]
        )));
    }
    if resp[4] != 0 {
        return Err(Error::Protocol(format!(
            "{label}: resp error 0x{:02x}",
            resp[4]
        )));
    }
    if resp[5] != VCP_BRIGHTNESS {
        return Err(Error::Protocol(format!(
            "{label}: unexpected resp vcp 0x{:02x}",
            resp[5]
        )));
    }
    if resp[6] != 0 {
        return Err(Error::Protocol(format!(
            "{label}: unexpected resp type 0x{:02x}",
            resp[6]
        )));
    }
    let max = u16::from_be_bytes([resp[7], resp[8]]);
    if max == 0 {
        return Err(Error::Protocol(format!("{label}: zero max brightness")));
    }
    if checksum(resp) != 0 {
        return Err(Error::Protocol(format!("{label}: bad resp checksum")));
    }
    let value = u16::from_be_bytes([resp[9], resp[10]]);
    Ok((max, value))
}

/// Run `attempt` up to [`TRIES`] times. Cancellation is checked before each
/// attempt's I/O; the last error is surfaced on exhaustion.
fn with_retries<T>(
    cancel: &mut dyn FnMut() -> bool,
    label: &str,
    mut attempt: impl FnMut() -> Result<T, Error>,
) -> Result<T, Error> {
    let mut tries = 0;
    loop {
        if cancel() {
            return Err(Error::Cancelled(label.to_string()));
        }
        tries += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if tries == TRIES => return Err(err),
            Err(_) => {}
        }
    }
}

pub struct DdcControl {
    name: String,
    devnode: PathBuf,
    file: File,
    /// Learned from the first valid GET reply; SETs scale against it.
    max_brightness: Option<u16>,
}

impl DdcControl {
    /// Look for a DDC-capable I²C bus belonging to an output.
    ///
    /// Candidates, in order: the target of the output's `ddc` symlink, then
    /// any `i2c-*` child of the output directory. DP-MST buses only appear
    /// under the card device, so the fallback tries every `DPMST` bus there
    /// whose EDID matches the output's sysfs EDID. The first
    /// candidate that answers a valid Get-VCP wins; candidates that never
    /// answer are skipped.
    pub fn probe(output: &str, output_dir: &Path) -> Result<Option<DdcControl>, Error> {
        if let Some(target) = sysfs::read_link(output_dir.join("ddc"))?
            && let Some(device) = target.file_name().and_then(|name| name.to_str())
            && let Some(control) = Self::probe_device(output, device, None)?
        {
            return Ok(Some(control));
        }

        let mut devices = Vec::new();
        let entries =
            std::fs::read_dir(output_dir).map_err(|err| Error::io("opendir", output_dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| Error::io("readdir", output_dir, err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| Error::io("readdir", output_dir, err))?;
            if !file_type.is_dir() && !file_type.is_symlink() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && name.starts_with("i2c-")
            {
                devices.push(name.to_string());
            }
        }
        for device in &devices {
            if let Some(control) = Self::probe_device(output, device, None)? {
                return Ok(Some(control));
            }
        }

        Self::probe_mst(output, output_dir)
    }

    fn probe_mst(output: &str, output_dir: &Path) -> Result<Option<DdcControl>, Error> {
        let edid_path = output_dir.join("edid");
        let edid_file = sysfs::open(&edid_path)?;
        let sysfs_edid = sysfs::read_bytes(&edid_file, &edid_path, 128)?;

        let card_dir = output_dir.join("device/device");
        let entries =
            std::fs::read_dir(&card_dir).map_err(|err| Error::io("opendir", &card_dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| Error::io("readdir", &card_dir, err))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| Error::io("readdir", &card_dir, err))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let Some(device) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !device.starts_with("i2c-") {
                continue;
            }
            // sysfs doesn't say which MST bus belongs to which output; only
            // consider MST trunks and let the EDID comparison decide.
            let name_path = card_dir.join(&device).join("name");
            let Ok(name_file) = sysfs::open(&name_path) else {
                continue;
            };
            let Ok(adapter_name) = sysfs::read_bytes(&name_file, &name_path, 64) else {
                continue;
            };
            if std::str::from_utf8(&adapter_name).map(str::trim) != Ok("DPMST") {
                continue;
            }
            if let Some(control) = Self::probe_device(output, &device, Some(&sysfs_edid))? {
                return Ok(Some(control));
            }
        }
        Ok(None)
    }

    /// Try one `/dev/i2c-*` candidate: cross-check its device numbers against
    /// sysfs, optionally require its EDID to match, then issue a Get-VCP.
    fn probe_device(
        output: &str,
        device: &str,
        match_edid: Option<&[u8]>,
    ) -> Result<Option<DdcControl>, Error> {
        let dev_attr = PathBuf::from(format!(
            "/sys/bus/i2c/devices/{device}/i2c-dev/{device}/dev"
        ));
        let dev_file = sysfs::open(&dev_attr)?;
        let sysfs_dev = sysfs::read_devnum(&dev_file, &dev_attr)?;

        let devnode = Path::new("/dev").join(device);
        let file = sysfs::open_rw(&devnode)?;
        let metadata = file
            .metadata()
            .map_err(|err| Error::io("fstat", &devnode, err))?;
        if !metadata.file_type().is_char_device() {
            return Err(Error::Precondition(format!(
                "{} is not a character device node",
                devnode.display()
            )));
        }
        if metadata.rdev() != sysfs_dev {
            return Err(Error::Precondition(format!(
                "{} device number {}:{} doesn't match sysfs {}:{}",
                devnode.display(),
                major(metadata.rdev()),
                minor(metadata.rdev()),
                major(sysfs_dev),
                minor(sysfs_dev)
            )));
        }

        if let Some(expected) = match_edid {
            let edid = read_edid(&file, &devnode)?;
            if expected != edid.as_slice() {
                return Ok(None);
            }
        }

        set_slave_address(&file, DEVICE_BUS_ADDR, &devnode)?;
        let mut control = DdcControl {
            name: device.to_string(),
            devnode,
            file,
            max_brightness: None,
        };
        let mut cancel = || false;
        match control.get_percent(&mut cancel) {
            Ok(_) => Ok(Some(control)),
            Err(err) => {
                debug!("{output} {device}: no valid DDC response: {err}");
                Ok(None)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_percent(&mut self, cancel: &mut dyn FnMut() -> bool) -> Result<i64, Error> {
        let (max, value) = self.query_brightness(cancel)?;
        self.max_brightness = Some(max);
        Ok(100 * i64::from(value) / i64::from(max))
    }

    pub fn set_percent(
        &mut self,
        percent: i64,
        cancel: &mut dyn FnMut() -> bool,
    ) -> Result<(), Error> {
        let max = match self.max_brightness {
            Some(max) => max,
            None => {
                let (max, _) = self.query_brightness(cancel)?;
                self.max_brightness = Some(max);
                max
            }
        };
        let label = format!("SetBrightness {}", self.devnode.display());
        let value = (percent * i64::from(max) / 100) as u16;
        let req = encode_set_request(value);
        with_retries(cancel, &label, || self.try_write(&req[1..], &label))
    }

    fn query_brightness(&self, cancel: &mut dyn FnMut() -> bool) -> Result<(u16, u16), Error> {
        let label = format!("GetBrightness {}", self.devnode.display());
        let req = encode_get_request();
        with_retries(cancel, &label, || self.try_write(&req[1..], &label))?;
        std::thread::sleep(RESPONSE_DELAY);
        with_retries(cancel, &label, || {
            let mut resp = [0u8; 12];
            resp[0] = HOST_READ_ADDR;
            self.try_read(&mut resp[1..], &label)?;
            validate_response(&resp, &label)
        })
    }

    fn try_write(&self, buf: &[u8], label: &str) -> Result<(), Error> {
        let mut file = &self.file;
        loop {
            match file.write(buf) {
                Ok(n) if n == buf.len() => return Ok(()),
                Ok(_) => {
                    return Err(Error::io(
                        "write",
                        &self.devnode,
                        std::io::Error::new(ErrorKind::WriteZero, format!("{label}: short write")),
                    ));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io("write", &self.devnode, err)),
            }
        }
    }

    fn try_read(&self, buf: &mut [u8], label: &str) -> Result<(), Error> {
        let mut file = &self.file;
        loop {
            match file.read(buf) {
                Ok(n) if n == buf.len() => return Ok(()),
                Ok(_) => {
                    return Err(Error::io(
                        "read",
                        &self.devnode,
                        std::io::Error::new(
                            ErrorKind::UnexpectedEof,
                            format!("{label}: short read"),
                        ),
                    ));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::io("read", &self.devnode, err)),
            }
        }
    }
}

/// Read the 128-byte EDID base block byte-by-byte over SMBus at slave 0x50.
fn read_edid(file: &File, devnode: &Path) -> Result<[u8; 128], Error> {
    set_slave_address(file, EDID_BUS_ADDR, devnode)?;
    let mut edid = [0u8; 128];
    for (offset, byte) in edid.iter_mut().enumerate() {
        *byte = smbus_read_byte_data(file, offset as u8, devnode)?;
    }
    Ok(edid)
}

const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SMBUS: libc::c_ulong = 0x0720;
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_BYTE_DATA: u32 = 2;

#[repr(C)]
union I2cSmbusData {
    byte: u8,
    word: u16,
    block: [u8; 34],
}

#[repr(C)]
struct I2cSmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut I2cSmbusData,
}

fn set_slave_address(file: &File, addr: u16, devnode: &Path) -> Result<(), Error> {
    loop {
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(addr)) };
        if ret == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::io("ioctl I2C_SLAVE", devnode, err));
        }
        return Ok(());
    }
}

fn smbus_read_byte_data(file: &File, command: u8, devnode: &Path) -> Result<u8, Error> {
    let mut data = I2cSmbusData { block: [0; 34] };
    let mut args = I2cSmbusIoctlData {
        read_write: I2C_SMBUS_READ,
        command,
        size: I2C_SMBUS_BYTE_DATA,
        data: &mut data,
    };
    loop {
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SMBUS, &mut args) };
        if ret == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::io("ioctl I2C_SMBUS", devnode, err));
        }
        return Ok(unsafe { data.byte });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Well-formed Get-VCP reply for a given max/value pair.
    fn reply(max: u16, value: u16) -> [u8; 12] {
        let mut resp = [
            HOST_READ_ADDR,
            DEVICE_WRITE_ADDR,
            length_byte(8),
            OPCODE_GET_VCP_RESP,
            0,
            VCP_BRIGHTNESS,
            0,
            (max >> 8) as u8,
            max as u8,
            (value >> 8) as u8,
            value as u8,
            0,
        ];
        resp[11] = checksum(&resp[..11]);
        resp
    }

    #[test]
    fn get_request_bytes() {
        assert_eq!(
            encode_get_request(),
            [0x6e, 0x51, 0x82, 0x01, 0x10, 0xac]
        );
    }

    #[test]
    fn request_checksum_covers_destination_byte() {
        // XOR of the bytes on the wire plus the synthetic 0x6e is zero.
        assert_eq!(checksum(&encode_get_request()), 0);
        for value in [0u16, 1, 0x02ed, 0xffff] {
            assert_eq!(checksum(&encode_set_request(value)), 0);
        }
    }

    #[test]
    fn set_request_splits_value_big_endian() {
        // 80% of a 937-step scale: 80 * 937 / 100 == 749 == 0x02ed.
        let value = (80i64 * 937 / 100) as u16;
        let req = encode_set_request(value);
        assert_eq!(&req[..5], [0x6e, 0x51, 0x84, 0x03, 0x10]);
        assert_eq!(req[5], 0x02);
        assert_eq!(req[6], 0xed);
    }

    #[test]
    fn response_round_trip() {
        for (max, value) in [(1u16, 1u16), (937, 469), (0xffff, 0x8000), (100, 0)] {
            let (got_max, got_value) = validate_response(&reply(max, value), "test").unwrap();
            assert_eq!((got_max, got_value), (max, value));
            let percent = 100 * i64::from(got_value) / i64::from(got_max);
            assert_eq!(percent, 100 * i64::from(value) / i64::from(max));
        }
    }

    #[test]
    fn response_rejects_flipped_checksum_bit() {
        let mut resp = reply(937, 469);
        resp[11] ^= 0x04;
        assert!(matches!(
            validate_response(&resp, "test"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn response_rejects_corrupt_payload() {
        let mut resp = reply(937, 469);
        resp[9] ^= 0x80;
        assert!(matches!(
            validate_response(&resp, "test"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn response_rejects_zero_max() {
        let mut resp = reply(1, 0);
        resp[7] = 0;
        resp[8] = 0;
        resp[11] = checksum(&resp[..11]);
        assert!(matches!(
            validate_response(&resp, "test"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn response_rejects_wrong_fixed_bytes() {
        for (index, byte) in [(1usize, 0x6fu8), (2, 0x83), (3, 0x01), (4, 0x01), (5, 0x12), (6, 0x01)] {
            let mut resp = reply(937, 469);
            resp[index] = byte;
            resp[11] = checksum(&resp[..11]);
            assert!(
                validate_response(&resp, "test").is_err(),
                "byte {index} = 0x{byte:02x} should be rejected"
            );
        }
    }

    #[test]
    fn retries_stop_after_ten_attempts_and_surface_last_error() {
        let mut attempts = 0;
        let mut cancel = || false;
        let result: Result<(), Error> = with_retries(&mut cancel, "test", || {
            attempts += 1;
            Err(Error::Protocol(format!("attempt {attempts}")))
        });
        assert_eq!(attempts, 10);
        match result {
            Err(Error::Protocol(message)) => assert_eq!(message, "attempt 10"),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn retries_return_first_success() {
        let mut attempts = 0;
        let mut cancel = || false;
        let result = with_retries(&mut cancel, "test", || {
            attempts += 1;
            if attempts < 3 {
                Err(Error::Protocol("not yet".to_string()))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn cancellation_is_checked_before_io() {
        let mut attempts = 0;
        let mut cancel = || true;
        let result: Result<(), Error> = with_retries(&mut cancel, "test", || {
            attempts += 1;
            Ok(())
        });
        assert_eq!(attempts, 0);
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn cancellation_interrupts_a_retry_run() {
        let mut checks = 0;
        let mut cancel = || {
            checks += 1;
            checks > 2
        };
        let mut attempts = 0;
        let result: Result<(), Error> = with_retries(&mut cancel, "test", || {
            attempts += 1;
            Err(Error::Protocol("still failing".to_string()))
        });
        assert_eq!(attempts, 2);
        assert!(result.unwrap_err().is_cancelled());
    }
}
