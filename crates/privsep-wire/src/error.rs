use crate::value::WireTag;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame does not start with the header sentinel.
    #[error("bad frame header word {found:#010x}")]
    BadHeader { found: u32 },

    /// The start-of-data sentinel is missing where the header declared it.
    #[error("missing start-of-data sentinel")]
    BadDataMark,

    /// The end-of-data sentinel is missing where the declared size ends.
    #[error("missing end-of-data sentinel")]
    BadEndMark,

    /// The frame declares more arguments than a message may carry.
    #[error("too many arguments ({count}, max {max})")]
    TooManyArgs { count: usize, max: usize },

    /// The declared frame size exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The declared frame size disagrees with the bytes actually consumed.
    #[error("frame size mismatch (declared {declared} bytes, consumed {consumed})")]
    SizeMismatch { declared: usize, consumed: usize },

    /// A type-tag word does not name a known wire type.
    #[error("unknown type tag {0:#010x}")]
    UnknownTag(u32),

    /// A null-tagged argument's length word is not the null sentinel.
    #[error("null-tagged argument carries length {found:#010x}")]
    BadNullLength { found: u32 },

    /// An argument's declared length runs past the end of the frame.
    #[error("argument length {len} overruns frame")]
    LengthOverflow { len: usize },

    /// A String8 payload is not valid UTF-8.
    #[error("invalid UTF-8 in string payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A String16 payload is not valid UTF-16.
    #[error("invalid UTF-16 in string payload")]
    Utf16,
}

pub type Result<T> = std::result::Result<T, WireError>;

/// A typed getter was asked for a type the value does not hold.
///
/// This is the sole guard against type confusion on the receive path: every
/// decoded argument passes through a `recover_*` getter before any handler
/// logic may observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("type mismatch: wanted {wanted:?}, value holds {held:?}")]
pub struct TypeError {
    pub wanted: WireTag,
    pub held: WireTag,
}
