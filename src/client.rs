//! Session-bus proxy used by the CLI companions.

use crate::error::Error;
use std::io::Write;

mod proxy_gen {
    #[zbus::proxy(
        interface = "org.jjaro.ddclight",
        default_service = "org.jjaro.ddclight",
        default_path = "/org/jjaro/ddclight"
    )]
    pub(super) trait DdcLight {
        #[zbus(name = "get")]
        fn get(&self) -> zbus::Result<i64>;

        #[zbus(name = "poke")]
        fn poke(&self) -> zbus::Result<i64>;

        #[zbus(name = "set")]
        fn set(&self, percentage: i64) -> zbus::Result<i64>;

        #[zbus(name = "increment")]
        fn increment(&self, percentage: i64) -> zbus::Result<i64>;

        #[zbus(name = "decrement")]
        fn decrement(&self, percentage: i64) -> zbus::Result<i64>;

        #[zbus(signal, name = "watch")]
        fn watch(&self, percentage: i64) -> zbus::Result<()>;
    }
}

use proxy_gen::DdcLightProxyBlocking;

fn proxy() -> Result<DdcLightProxyBlocking<'static>, Error> {
    let connection = zbus::blocking::Connection::session()?;
    Ok(DdcLightProxyBlocking::new(&connection)?)
}

pub fn get() -> Result<i64, Error> {
    Ok(proxy()?.get()?)
}

pub fn poke() -> Result<i64, Error> {
    Ok(proxy()?.poke()?)
}

pub fn set(percentage: i64) -> Result<i64, Error> {
    Ok(proxy()?.set(percentage)?)
}

pub fn increment(percentage: i64) -> Result<i64, Error> {
    Ok(proxy()?.increment(percentage)?)
}

pub fn decrement(percentage: i64) -> Result<i64, Error> {
    Ok(proxy()?.decrement(percentage)?)
}

/// Print the current setpoint, then one line per `watch` signal.
///
/// Bars read this output line by line, so every value is flushed as it
/// lands.
pub fn watch() -> Result<(), Error> {
    let proxy = proxy()?;
    let mut stdout = std::io::stdout();
    print_line(&mut stdout, proxy.get()?)?;
    for signal in proxy.receive_watch()? {
        let args = signal.args()?;
        print_line(&mut stdout, *args.percentage())?;
    }
    Ok(())
}

fn print_line(stdout: &mut std::io::Stdout, percentage: i64) -> Result<(), Error> {
    writeln!(stdout, "{percentage}")
        .and_then(|_| stdout.flush())
        .map_err(|err| Error::io("write", "stdout", err))
}
