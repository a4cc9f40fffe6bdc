//! Frame encoder/decoder.
//!
//! The encoder builds one contiguous, word-aligned buffer per message; the
//! decoder consumes a `BytesMut` that may hold less than one frame (returns
//! `Ok(None)`, caller reads more) or several concatenated frames (returns
//! one per call, leftover bytes stay put). Nothing is dispatched from a
//! frame that fails validation.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};
use crate::value::{WireTag, WireValue};

/// Wire word size in bytes. Every frame is a whole number of words.
pub const WORD: usize = 4;

/// Frame header sentinel.
pub const MARK_HEADER: u32 = u32::from_le_bytes(*b"MSG1");

/// Start-of-data sentinel, written after the tag words.
pub const MARK_DATA: u32 = u32::from_le_bytes(*b"DAT[");

/// End-of-data sentinel, the last word of every frame.
pub const MARK_END: u32 = u32::from_le_bytes(*b"]TAD");

/// Reserved length word denoting "null" rather than "empty".
pub const NULL_LEN: u32 = u32::MAX;

/// Maximum arguments one message may carry.
pub const MAX_ARGS: usize = 10;

/// Default maximum frame size accepted by the decoder: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Fixed header: header mark, message id, argument count, size in words.
const HEADER_WORDS: usize = 4;

/// One decoded message: id plus ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_id: u32,
    pub args: Vec<WireValue>,
}

/// Encode one message into `dst` as a single word-aligned frame.
///
/// The frame is complete in memory when this returns; the caller writes it
/// with one (logical) transport send.
pub fn encode_message(msg_id: u32, args: &[WireValue], dst: &mut BytesMut) -> Result<()> {
    if args.len() > MAX_ARGS {
        return Err(WireError::TooManyArgs {
            count: args.len(),
            max: MAX_ARGS,
        });
    }

    let start = dst.len();
    dst.put_u32_le(MARK_HEADER);
    dst.put_u32_le(msg_id);
    dst.put_u32_le(args.len() as u32);
    dst.put_u32_le(0); // frame size, patched once known

    for arg in args {
        dst.put_u32_le(arg.tag() as u32);
    }
    dst.put_u32_le(MARK_DATA);
    for arg in args {
        encode_payload(arg, dst)?;
    }
    dst.put_u32_le(MARK_END);

    let words = ((dst.len() - start) / WORD) as u32;
    dst[start + 3 * WORD..start + 4 * WORD].copy_from_slice(&words.to_le_bytes());
    Ok(())
}

fn encode_payload(arg: &WireValue, dst: &mut BytesMut) -> Result<()> {
    match arg {
        WireValue::Int32(v) => dst.put_i32_le(*v),
        WireValue::UInt32(v) => dst.put_u32_le(*v),
        WireValue::Char8(v) => dst.put_u32_le(u32::from(*v)),
        WireValue::Char16(v) => dst.put_u32_le(u32::from(*v)),
        WireValue::FileDescriptor(fd) => dst.put_i32_le(*fd),
        WireValue::OsHandle(h) => dst.put_u64_le(*h),
        WireValue::String8(s) => put_counted_bytes(dst, s.as_bytes())?,
        WireValue::ByteArray(b) => put_counted_bytes(dst, b)?,
        WireValue::String16(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            if units.len() >= NULL_LEN as usize {
                return Err(WireError::FrameTooLarge {
                    size: units.len(),
                    max: NULL_LEN as usize - 1,
                });
            }
            dst.put_u32_le(units.len() as u32);
            for unit in &units {
                dst.put_u16_le(*unit);
            }
            put_word_padding(dst, units.len() * 2);
        }
        WireValue::NullString8 | WireValue::NullString16 | WireValue::NullByteArray => {
            dst.put_u32_le(NULL_LEN);
        }
    }
    Ok(())
}

fn put_counted_bytes(dst: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    if bytes.len() >= NULL_LEN as usize {
        return Err(WireError::FrameTooLarge {
            size: bytes.len(),
            max: NULL_LEN as usize - 1,
        });
    }
    dst.put_u32_le(bytes.len() as u32);
    dst.put_slice(bytes);
    put_word_padding(dst, bytes.len());
    Ok(())
}

fn put_word_padding(dst: &mut BytesMut, payload_len: usize) {
    let pad = (WORD - payload_len % WORD) % WORD;
    for _ in 0..pad {
        dst.put_u8(0);
    }
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` while the buffer holds less than one complete frame.
/// On success the frame's bytes are consumed from `src`; bytes of any
/// following frame are left in place, so calling again immediately decodes
/// the next frame with no state carried over.
pub fn decode_message(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_WORDS * WORD {
        return Ok(None); // need more data
    }

    let header = word_at(src, 0);
    if header != MARK_HEADER {
        return Err(WireError::BadHeader { found: header });
    }
    let msg_id = word_at(src, 1);
    let argc = word_at(src, 2) as usize;
    let size_words = word_at(src, 3) as usize;

    if argc > MAX_ARGS {
        return Err(WireError::TooManyArgs {
            count: argc,
            max: MAX_ARGS,
        });
    }

    let total = size_words * WORD;
    if total > max_frame_size {
        return Err(WireError::FrameTooLarge {
            size: total,
            max: max_frame_size,
        });
    }

    // Smallest well-formed frame: header words, one tag word per argument,
    // and the two data sentinels.
    let min_words = HEADER_WORDS + argc + 2;
    if size_words < min_words {
        return Err(WireError::SizeMismatch {
            declared: total,
            consumed: min_words * WORD,
        });
    }

    if src.len() < total {
        return Ok(None); // need more data
    }

    let frame = &src[..total];
    let mut pos = HEADER_WORDS * WORD;

    let mut tags = Vec::with_capacity(argc);
    for _ in 0..argc {
        let word = read_word(frame, &mut pos)?;
        tags.push(WireTag::from_wire(word).ok_or(WireError::UnknownTag(word))?);
    }

    if read_word(frame, &mut pos)? != MARK_DATA {
        return Err(WireError::BadDataMark);
    }

    let mut args = Vec::with_capacity(argc);
    for tag in tags {
        args.push(decode_payload(tag, frame, &mut pos)?);
    }

    if read_word(frame, &mut pos)? != MARK_END {
        return Err(WireError::BadEndMark);
    }
    if pos != total {
        return Err(WireError::SizeMismatch {
            declared: total,
            consumed: pos,
        });
    }

    src.advance(total);
    Ok(Some(Message { msg_id, args }))
}

fn decode_payload(tag: WireTag, frame: &[u8], pos: &mut usize) -> Result<WireValue> {
    Ok(match tag {
        WireTag::Int32 => WireValue::Int32(read_word(frame, pos)? as i32),
        WireTag::UInt32 => WireValue::UInt32(read_word(frame, pos)?),
        WireTag::Char8 => WireValue::Char8(read_word(frame, pos)? as u8),
        WireTag::Char16 => WireValue::Char16(read_word(frame, pos)? as u16),
        WireTag::FileDescriptor => WireValue::FileDescriptor(read_word(frame, pos)? as i32),
        WireTag::OsHandle => {
            let lo = u64::from(read_word(frame, pos)?);
            let hi = u64::from(read_word(frame, pos)?);
            WireValue::OsHandle(hi << 32 | lo)
        }
        WireTag::String8 => {
            let bytes = read_counted_bytes(frame, pos)?;
            WireValue::String8(String::from_utf8(bytes.to_vec())?)
        }
        WireTag::ByteArray => WireValue::ByteArray(read_counted_bytes(frame, pos)?.to_vec()),
        WireTag::String16 => {
            let units = read_word(frame, pos)? as usize;
            let byte_len = units
                .checked_mul(2)
                .ok_or(WireError::LengthOverflow { len: units })?;
            let bytes = read_bytes(frame, pos, byte_len)?;
            let decoded: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            skip_word_padding(pos, byte_len);
            WireValue::String16(String::from_utf16(&decoded).map_err(|_| WireError::Utf16)?)
        }
        WireTag::NullString8 | WireTag::NullString16 | WireTag::NullByteArray => {
            let word = read_word(frame, pos)?;
            if word != NULL_LEN {
                return Err(WireError::BadNullLength { found: word });
            }
            match tag {
                WireTag::NullString8 => WireValue::NullString8,
                WireTag::NullString16 => WireValue::NullString16,
                _ => WireValue::NullByteArray,
            }
        }
    })
}

fn read_counted_bytes<'a>(frame: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_word(frame, pos)? as usize;
    let bytes = read_bytes(frame, pos, len)?;
    skip_word_padding(pos, len);
    Ok(bytes)
}

fn read_word(frame: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = read_bytes(frame, pos, WORD)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(frame: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).ok_or(WireError::LengthOverflow { len })?;
    if end > frame.len() {
        return Err(WireError::LengthOverflow { len });
    }
    let bytes = &frame[*pos..end];
    *pos = end;
    Ok(bytes)
}

fn skip_word_padding(pos: &mut usize, payload_len: usize) {
    *pos += (WORD - payload_len % WORD) % WORD;
}

fn word_at(src: &BytesMut, index: usize) -> u32 {
    let at = index * WORD;
    u32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg_id: u32, args: &[WireValue]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_message(msg_id, args, &mut buf).unwrap();
        buf
    }

    fn decode_one(buf: &mut BytesMut) -> Message {
        decode_message(buf, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap()
    }

    #[test]
    fn roundtrip_every_type() {
        let args = vec![
            WireValue::Int32(-7),
            WireValue::UInt32(3_000_000_000),
            WireValue::Char8(b'x'),
            WireValue::Char16(0x263A),
            WireValue::from("narrow"),
            WireValue::NullString8,
            WireValue::string16("wide ☃"),
            WireValue::NullString16,
            WireValue::from(&b"\x00\x01\x02"[..]),
            WireValue::NullByteArray,
        ];

        let mut wire = encode(42, &args);
        let msg = decode_one(&mut wire);

        assert_eq!(msg.msg_id, 42);
        assert_eq!(msg.args, args);
        assert!(wire.is_empty());
    }

    #[test]
    fn frames_are_word_aligned() {
        let mut wire = encode(3, &[WireValue::Int32(56789), WireValue::from("1234")]);
        // header + id + argc + size + 2 tags + data mark + int + len + "1234" + end mark
        assert_eq!(wire.len(), 11 * WORD);
        assert_eq!(wire.len() % WORD, 0);

        let odd = encode(3, &[WireValue::from("12345")]);
        assert_eq!(odd.len() % WORD, 0);

        let msg = decode_one(&mut wire);
        assert_eq!(msg.msg_id, 3);
        assert_eq!(msg.args.len(), 2);
        assert_eq!(msg.args[0].tag(), WireTag::Int32);
        assert_eq!(msg.args[1].tag(), WireTag::String8);
        assert_eq!(msg.args[0].recover_int32().unwrap(), 56789);
        assert_eq!(msg.args[1].recover_string8().unwrap(), Some("1234"));
    }

    #[test]
    fn null_wide_string_survives_the_wire() {
        let mut wire = encode(
            9,
            &[
                WireValue::opt_string16(None),
                WireValue::string16("ab de"),
                WireValue::UInt32(3_221_225_472),
            ],
        );
        let msg = decode_one(&mut wire);

        assert_eq!(msg.msg_id, 9);
        assert_eq!(msg.args.len(), 3);
        assert_eq!(msg.args[0].tag(), WireTag::NullString16);
        assert_eq!(msg.args[1].recover_string16().unwrap(), Some("ab de"));
        assert_eq!(msg.args[2].recover_uint32().unwrap(), 3_221_225_472);
    }

    #[test]
    fn null_byte_array_distinct_from_empty() {
        let mut wire = encode(13, &[WireValue::NullByteArray]);
        let msg = decode_one(&mut wire);
        assert_eq!(msg.args[0].tag(), WireTag::NullByteArray);
        assert_eq!(msg.args[0].recover_bytes().unwrap(), None);

        let mut wire = encode(13, &[WireValue::ByteArray(Vec::new())]);
        let msg = decode_one(&mut wire);
        assert_eq!(msg.args[0].tag(), WireTag::ByteArray);
        assert_eq!(msg.args[0].recover_bytes().unwrap(), Some(&[][..]));
    }

    #[test]
    fn empty_string_distinct_from_null() {
        let mut wire = encode(1, &[WireValue::from(""), WireValue::NullString8]);
        let msg = decode_one(&mut wire);
        assert_eq!(msg.args[0].recover_string8().unwrap(), Some(""));
        assert_eq!(msg.args[1].recover_string8().unwrap(), None);
    }

    #[test]
    fn zero_argument_message() {
        let mut wire = encode(20, &[]);
        let msg = decode_one(&mut wire);
        assert_eq!(msg.msg_id, 20);
        assert!(msg.args.is_empty());
    }

    #[test]
    fn os_handle_is_two_words() {
        let args = vec![WireValue::OsHandle(0x1234_5678_9ABC_DEF0)];
        let mut wire = encode(7, &args);
        let msg = decode_one(&mut wire);
        assert_eq!(
            msg.args[0].recover_os_handle().unwrap(),
            0x1234_5678_9ABC_DEF0
        );
    }

    #[test]
    fn partial_delivery_any_split_decodes_identically() {
        let args = vec![
            WireValue::Int32(-1),
            WireValue::string16("chunked payload"),
            WireValue::from(&b"bytes"[..]),
        ];
        let wire = encode(11, &args);
        let expected = {
            let mut whole = wire.clone();
            decode_one(&mut whole)
        };

        for cut in 1..wire.len() {
            let mut buf = BytesMut::new();
            buf.extend_from_slice(&wire[..cut]);
            assert!(
                decode_message(&mut buf, DEFAULT_MAX_FRAME_SIZE)
                    .unwrap()
                    .is_none(),
                "cut at {cut} should not yield a frame"
            );
            buf.extend_from_slice(&wire[cut..]);
            let msg = decode_one(&mut buf);
            assert_eq!(msg, expected, "cut at {cut}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn byte_by_byte_delivery() {
        let wire = encode(5, &[WireValue::from("slow")]);
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in wire.iter() {
            buf.extend_from_slice(&[*byte]);
            if let Some(msg) = decode_message(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap() {
                decoded = Some(msg);
            }
        }
        let msg = decoded.expect("final byte should complete the frame");
        assert_eq!(msg.msg_id, 5);
        assert_eq!(msg.args[0].recover_string8().unwrap(), Some("slow"));
    }

    #[test]
    fn concatenated_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        encode_message(1, &[WireValue::Int32(10)], &mut buf).unwrap();
        encode_message(2, &[WireValue::from("two")], &mut buf).unwrap();
        encode_message(3, &[], &mut buf).unwrap();

        let first = decode_one(&mut buf);
        assert_eq!(first.msg_id, 1);
        let second = decode_one(&mut buf);
        assert_eq!(second.msg_id, 2);
        let third = decode_one(&mut buf);
        assert_eq!(third.msg_id, 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn second_frame_unaffected_by_first() {
        // Decode one frame, then feed a completely different frame into the
        // same buffer: no state may leak between them.
        let mut buf = BytesMut::new();
        encode_message(8, &[WireValue::string16("first")], &mut buf).unwrap();
        let _ = decode_one(&mut buf);
        assert!(buf.is_empty());

        encode_message(9, &[WireValue::NullByteArray, WireValue::UInt32(5)], &mut buf).unwrap();
        let msg = decode_one(&mut buf);
        assert_eq!(msg.msg_id, 9);
        assert_eq!(msg.args[0].tag(), WireTag::NullByteArray);
    }

    #[test]
    fn rejects_bad_header() {
        let mut wire = encode(1, &[]);
        wire[0] ^= 0xFF;
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::BadHeader { .. }));
    }

    #[test]
    fn rejects_excess_arg_count() {
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        wire[2 * WORD..3 * WORD].copy_from_slice(&(MAX_ARGS as u32 + 1).to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::TooManyArgs { .. }));
    }

    #[test]
    fn rejects_undersized_declaration() {
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        wire[3 * WORD..4 * WORD].copy_from_slice(&2u32.to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::SizeMismatch { .. }));
    }

    #[test]
    fn rejects_size_disagreeing_with_payload() {
        // Declare one word more than the frame actually uses and pad the
        // buffer so the decoder believes the frame is complete.
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        let declared = (wire.len() / WORD + 1) as u32;
        wire[3 * WORD..4 * WORD].copy_from_slice(&declared.to_le_bytes());
        wire.extend_from_slice(&[0u8; WORD]);
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(
            err,
            WireError::BadEndMark | WireError::SizeMismatch { .. }
        ));
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        wire[4 * WORD..5 * WORD].copy_from_slice(&99u32.to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::UnknownTag(99)));
    }

    #[test]
    fn rejects_corrupt_data_mark() {
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        wire[5 * WORD..6 * WORD].copy_from_slice(&0u32.to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::BadDataMark));
    }

    #[test]
    fn rejects_corrupt_end_mark() {
        let mut wire = encode(1, &[WireValue::Int32(1)]);
        let len = wire.len();
        wire[len - WORD..].copy_from_slice(&0u32.to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::BadEndMark));
    }

    #[test]
    fn rejects_bad_null_length_word() {
        let mut wire = encode(1, &[WireValue::NullString8]);
        // The single payload word sits right after the data mark.
        wire[6 * WORD..7 * WORD].copy_from_slice(&0u32.to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::BadNullLength { found: 0 }));
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut wire = encode(1, &[WireValue::from(&[0xAB; 256][..])]);
        let err = decode_message(&mut wire, 64).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { .. }));
    }

    #[test]
    fn rejects_invalid_utf8_string() {
        let mut wire = encode(1, &[WireValue::ByteArray(vec![0xFF, 0xFE, 0xFD, 0xFC])]);
        // Rewrite the tag word from ByteArray to String8.
        wire[4 * WORD..5 * WORD].copy_from_slice(&(WireTag::String8 as u32).to_le_bytes());
        let err = decode_message(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, WireError::Utf8(_)));
    }

    #[test]
    fn encode_rejects_too_many_args() {
        let args: Vec<WireValue> = (0..MAX_ARGS as i32 + 1).map(WireValue::Int32).collect();
        let mut buf = BytesMut::new();
        let err = encode_message(1, &args, &mut buf).unwrap_err();
        assert!(matches!(err, WireError::TooManyArgs { .. }));
    }

    #[test]
    fn unsigned_roundtrip_across_sign_boundary() {
        let mut wire = encode(2, &[WireValue::UInt32(0xC000_0000)]);
        let msg = decode_one(&mut wire);
        assert_eq!(msg.args[0].recover_uint32().unwrap(), 0xC000_0000);
        assert!(msg.args[0].recover_int32().is_err());
    }
}
