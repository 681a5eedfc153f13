//! Kernel log.
//!
//! Lines go to COM1 through `uart_16550` on bare metal and to stderr under
//! `cargo test`. A display driver can attach a console hook with
//! [`attach_console`]; from then on it receives every line as well, including
//! the panic banner.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use crate::sync::IrqMutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl KlogLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => KlogLevel::Error,
            1 => KlogLevel::Warn,
            2 => KlogLevel::Info,
            _ => KlogLevel::Debug,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "error" => Some(KlogLevel::Error),
            "warn" => Some(KlogLevel::Warn),
            "info" => Some(KlogLevel::Info),
            "debug" => Some(KlogLevel::Debug),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            KlogLevel::Error => "ERROR",
            KlogLevel::Warn => "WARN ",
            KlogLevel::Info => "INFO ",
            KlogLevel::Debug => "DEBUG",
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

static CONSOLE: IrqMutex<Option<fn(&str)>> = IrqMutex::new(None);

#[cfg(all(target_arch = "x86", target_os = "none"))]
static SERIAL: IrqMutex<uart_16550::SerialPort> =
    IrqMutex::new(unsafe { uart_16550::SerialPort::new(0x3F8) });

/// Bring up COM1. Lines logged before this are still written, the UART just
/// runs with whatever the firmware left configured.
pub fn init_serial() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    SERIAL.lock().init();
}

/// Route every log line to `write` as well as to the serial port.
pub fn attach_console(write: fn(&str)) {
    *CONSOLE.lock() = Some(write);
}

pub fn set_level(level: KlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> KlogLevel {
    KlogLevel::from_raw(CURRENT_LEVEL.load(Ordering::Relaxed))
}

pub fn is_enabled(level: KlogLevel) -> bool {
    level as u8 <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

struct LogWriter {
    console: Option<fn(&str)>,
}

impl Write for LogWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        {
            let _ = SERIAL.lock().write_str(s);
        }
        #[cfg(test)]
        {
            std::eprint!("{}", s);
        }
        if let Some(console) = self.console {
            console(s);
        }
        Ok(())
    }
}

fn writer() -> LogWriter {
    LogWriter {
        console: *CONSOLE.lock(),
    }
}

/// Write one unleveled line.
pub fn print_line(args: fmt::Arguments<'_>) {
    let mut out = writer();
    let _ = out.write_fmt(args);
    let _ = out.write_str("\n");
}

pub fn log_args(level: KlogLevel, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    let mut out = writer();
    let _ = write!(out, "[{}] ", level.tag());
    let _ = out.write_fmt(args);
    let _ = out.write_str("\n");
}

#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::log::print_line(::core::format_args!(""))
    };
    ($($arg:tt)*) => {
        $crate::log::print_line(::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::log::log_args($crate::log::KlogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_args($crate::log::KlogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::log::log_args($crate::log::KlogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_args($crate::log::KlogLevel::Debug, ::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!(KlogLevel::parse("debug"), Some(KlogLevel::Debug));
        assert_eq!(KlogLevel::parse("error"), Some(KlogLevel::Error));
        assert_eq!(KlogLevel::parse("loud"), None);
    }

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(KlogLevel::Error < KlogLevel::Warn);
        assert!(KlogLevel::Info < KlogLevel::Debug);
        assert_eq!(KlogLevel::from_raw(9), KlogLevel::Debug);
    }
}
