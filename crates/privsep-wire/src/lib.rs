//! Self-describing binary wire format for broker/worker messages.
//!
//! A message is a message id plus an ordered list of [`WireValue`]s. On the
//! wire it becomes one word-aligned frame:
//! - a header sentinel, the message id, the argument count, and the total
//!   frame size in words
//! - one type-tag word per argument
//! - a start-of-data sentinel, each argument's payload, an end-of-data
//!   sentinel
//!
//! Scalars are fixed-width words; strings and byte arrays carry a length
//! word followed by word-padded raw bytes, with a reserved length value
//! denoting "null" as distinct from "empty". The decoder accepts input in
//! arbitrary chunks and rejects any frame whose sentinels or declared sizes
//! do not match the observed bytes.

pub mod codec;
pub mod error;
pub mod value;

pub use codec::{
    decode_message, encode_message, Message, MARK_DATA, MARK_END, MARK_HEADER,
    DEFAULT_MAX_FRAME_SIZE, MAX_ARGS, NULL_LEN, WORD,
};
pub use error::{Result, TypeError, WireError};
pub use value::{WireTag, WireValue};
