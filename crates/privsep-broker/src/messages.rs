//! The broker/worker message vocabulary.
//!
//! One request/reply pair per privileged operation. Requests flow worker to
//! broker, replies broker to worker; every reply leads with an `Int32`
//! status so application-level failure travels as typed data rather than as
//! a dropped connection.

use std::io::{Read, Write};

use privsep_channel::{Channel, Result};
use privsep_wire::WireValue;

/// Write a file under the broker's root: String16 name, ByteArray contents.
pub const WRITE_FILE: u32 = 4;
/// Reply to [`WRITE_FILE`]: Int32 status, UInt32 bytes written.
pub const WRITE_FILE_ACK: u32 = 5;
/// Replace the clipboard text: String16 (null clears).
pub const CLIPBOARD_SET: u32 = 6;
/// Reply to [`CLIPBOARD_SET`]: Int32 status.
pub const CLIPBOARD_ACK: u32 = 7;
/// Read the clipboard text: no arguments.
pub const CLIPBOARD_GET: u32 = 8;
/// Reply to [`CLIPBOARD_GET`]: Int32 status, String16 text (null when unset
/// or denied).
pub const CLIPBOARD_TEXT: u32 = 9;
/// Ask the broker for a fresh transport: no arguments.
pub const OPEN_SESSION: u32 = 20;
/// Reply to [`OPEN_SESSION`]: String8 socket path of the new transport.
pub const SESSION_READY: u32 = 21;

/// The operation was performed.
pub const STATUS_OK: i32 = 0;
/// Policy denies the capability area.
pub const STATUS_DENIED: i32 = 1;
/// The request names a path outside the broker's root, or no path at all.
pub const STATUS_INVALID_PATH: i32 = 2;
/// The operation was allowed but failed in the OS.
pub const STATUS_IO_ERROR: i32 = 3;

pub fn send_write_file<T: Read + Write>(
    channel: &mut Channel<T>,
    name: &str,
    contents: &[u8],
) -> Result<()> {
    channel.send(
        WRITE_FILE,
        &[WireValue::string16(name), WireValue::from(contents)],
    )
}

pub fn send_write_file_ack<T: Read + Write>(
    channel: &mut Channel<T>,
    status: i32,
    written: u32,
) -> Result<()> {
    channel.send(
        WRITE_FILE_ACK,
        &[WireValue::Int32(status), WireValue::UInt32(written)],
    )
}

pub fn send_clipboard_set<T: Read + Write>(
    channel: &mut Channel<T>,
    text: Option<&str>,
) -> Result<()> {
    channel.send(CLIPBOARD_SET, &[WireValue::opt_string16(text)])
}

pub fn send_clipboard_ack<T: Read + Write>(channel: &mut Channel<T>, status: i32) -> Result<()> {
    channel.send(CLIPBOARD_ACK, &[WireValue::Int32(status)])
}

pub fn send_clipboard_get<T: Read + Write>(channel: &mut Channel<T>) -> Result<()> {
    channel.send(CLIPBOARD_GET, &[])
}

pub fn send_clipboard_text<T: Read + Write>(
    channel: &mut Channel<T>,
    status: i32,
    text: Option<&str>,
) -> Result<()> {
    channel.send(
        CLIPBOARD_TEXT,
        &[WireValue::Int32(status), WireValue::opt_string16(text)],
    )
}

pub fn send_open_session<T: Read + Write>(channel: &mut Channel<T>) -> Result<()> {
    channel.send(OPEN_SESSION, &[])
}

pub fn send_session_ready<T: Read + Write>(channel: &mut Channel<T>, path: &str) -> Result<()> {
    channel.send(SESSION_READY, &[WireValue::from(path)])
}
