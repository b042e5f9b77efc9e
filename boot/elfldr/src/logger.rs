//! # Boot Logger
//!
//! `log` backend that writes to the boot console. Records are formatted as
//! `[LEVEL] message\r\n`. Before a console is installed records are dropped.
//!
//! Only the primary core logs, and only before control moves to the
//! relocated trampoline; the trampoline writes its trace directly.

use core::fmt::{self, Write};

use helix_hal::serial::ConsoleWriter;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Installed console
static CONSOLE: Mutex<Option<&'static mut (dyn ConsoleWriter + Send)>> = Mutex::new(None);

static LOGGER: BootLogger = BootLogger;

/// `log` backend over the boot console
pub struct BootLogger;

/// Install `writer` as the log console
pub fn set_console(writer: &'static mut (dyn ConsoleWriter + Send)) {
    *CONSOLE.lock() = Some(writer);
}

/// Register the boot logger with the `log` facade
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Write formatted output to a console
pub fn write_fmt<W: ConsoleWriter + ?Sized>(console: &mut W, args: fmt::Arguments<'_>) -> fmt::Result {
    struct Adapter<'a, W: ?Sized>(&'a mut W);

    impl<W: ConsoleWriter + ?Sized> Write for Adapter<'_, W> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            ConsoleWriter::write_str(self.0, s);
            Ok(())
        }
    }

    Adapter(console).write_fmt(args)
}

fn write_record<W: ConsoleWriter + ?Sized>(console: &mut W, record: &Record<'_>) {
    let _ = write_fmt(console, format_args!("[{}] {}\r\n", record.level(), record.args()));
}

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = CONSOLE.lock().as_mut() {
            write_record(*console, record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[derive(Default)]
    struct Capture(Vec<u8>);

    impl ConsoleWriter for Capture {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    #[test]
    fn test_record_format() {
        let mut out = Capture::default();
        write_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("core {} refused", 3))
                .build(),
        );
        assert_eq!(out.0, b"[WARN] core 3 refused\r\n");
    }

    #[test]
    fn test_write_fmt() {
        let mut out = Capture::default();
        write_fmt(&mut out, format_args!("EP {:08X}", 0x1000)).unwrap();
        assert_eq!(out.0, b"EP 00001000");
    }
}
