//! The tagged union of everything transportable across a channel.

use crate::error::TypeError;

/// Wire type tags. The tag travels with every argument, one word each.
///
/// Numbering is stable: it is part of the wire contract, not an
/// implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WireTag {
    Int32 = 1,
    UInt32 = 2,
    Char8 = 3,
    Char16 = 4,
    String8 = 5,
    NullString8 = 6,
    String16 = 7,
    NullString16 = 8,
    ByteArray = 9,
    NullByteArray = 10,
    FileDescriptor = 11,
    OsHandle = 12,
}

impl WireTag {
    /// Parse a tag word from the wire.
    pub fn from_wire(word: u32) -> Option<Self> {
        Some(match word {
            1 => Self::Int32,
            2 => Self::UInt32,
            3 => Self::Char8,
            4 => Self::Char16,
            5 => Self::String8,
            6 => Self::NullString8,
            7 => Self::String16,
            8 => Self::NullString16,
            9 => Self::ByteArray,
            10 => Self::NullByteArray,
            11 => Self::FileDescriptor,
            12 => Self::OsHandle,
            _ => return None,
        })
    }
}

/// One argument or return value on the wire.
///
/// Immutable after construction; tag and payload are consistent by
/// construction. Null strings and null byte arrays are distinct variants,
/// not empty payloads — the distinction survives serialization.
///
/// `FileDescriptor` and `OsHandle` are first-class variants because they
/// name host kernel resources, not plain integers. The codec transports the
/// raw identifier only; making it valid in the receiving process is the
/// transport's job (SCM_RIGHTS ancillary data on Unix domain sockets,
/// `DuplicateHandle` into an inheritable handle on Windows) and must happen
/// before the peer dereferences the value.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Int32(i32),
    UInt32(u32),
    Char8(u8),
    Char16(u16),
    String8(String),
    NullString8,
    String16(String),
    NullString16,
    ByteArray(Vec<u8>),
    NullByteArray,
    FileDescriptor(i32),
    OsHandle(u64),
}

impl WireValue {
    /// The tag this value travels under.
    pub fn tag(&self) -> WireTag {
        match self {
            Self::Int32(_) => WireTag::Int32,
            Self::UInt32(_) => WireTag::UInt32,
            Self::Char8(_) => WireTag::Char8,
            Self::Char16(_) => WireTag::Char16,
            Self::String8(_) => WireTag::String8,
            Self::NullString8 => WireTag::NullString8,
            Self::String16(_) => WireTag::String16,
            Self::NullString16 => WireTag::NullString16,
            Self::ByteArray(_) => WireTag::ByteArray,
            Self::NullByteArray => WireTag::NullByteArray,
            Self::FileDescriptor(_) => WireTag::FileDescriptor,
            Self::OsHandle(_) => WireTag::OsHandle,
        }
    }

    /// Construct a wide (UTF-16 on the wire) string value.
    pub fn string16(s: impl Into<String>) -> Self {
        Self::String16(s.into())
    }

    /// Construct a wide string value that may be null.
    pub fn opt_string16(s: Option<&str>) -> Self {
        match s {
            Some(s) => Self::String16(s.to_string()),
            None => Self::NullString16,
        }
    }

    fn mismatch(&self, wanted: WireTag) -> TypeError {
        TypeError {
            wanted,
            held: self.tag(),
        }
    }

    // Recovery getters, used by the receiving side. Each fails with a
    // TypeError unless the stored tag matches, so a mistyped argument is
    // rejected before any handler logic can observe a reinterpreted value.

    pub fn recover_int32(&self) -> Result<i32, TypeError> {
        match self {
            Self::Int32(v) => Ok(*v),
            _ => Err(self.mismatch(WireTag::Int32)),
        }
    }

    pub fn recover_uint32(&self) -> Result<u32, TypeError> {
        match self {
            Self::UInt32(v) => Ok(*v),
            _ => Err(self.mismatch(WireTag::UInt32)),
        }
    }

    pub fn recover_char8(&self) -> Result<u8, TypeError> {
        match self {
            Self::Char8(v) => Ok(*v),
            _ => Err(self.mismatch(WireTag::Char8)),
        }
    }

    pub fn recover_char16(&self) -> Result<u16, TypeError> {
        match self {
            Self::Char16(v) => Ok(*v),
            _ => Err(self.mismatch(WireTag::Char16)),
        }
    }

    /// Recover a narrow string; `None` is a decoded null string.
    pub fn recover_string8(&self) -> Result<Option<&str>, TypeError> {
        match self {
            Self::String8(s) => Ok(Some(s)),
            Self::NullString8 => Ok(None),
            _ => Err(self.mismatch(WireTag::String8)),
        }
    }

    /// Recover a wide string; `None` is a decoded null string.
    pub fn recover_string16(&self) -> Result<Option<&str>, TypeError> {
        match self {
            Self::String16(s) => Ok(Some(s)),
            Self::NullString16 => Ok(None),
            _ => Err(self.mismatch(WireTag::String16)),
        }
    }

    /// Recover a byte array; `None` is a decoded null array, distinct from
    /// `Some(&[])`.
    pub fn recover_bytes(&self) -> Result<Option<&[u8]>, TypeError> {
        match self {
            Self::ByteArray(b) => Ok(Some(b)),
            Self::NullByteArray => Ok(None),
            _ => Err(self.mismatch(WireTag::ByteArray)),
        }
    }

    pub fn recover_fd(&self) -> Result<i32, TypeError> {
        match self {
            Self::FileDescriptor(fd) => Ok(*fd),
            _ => Err(self.mismatch(WireTag::FileDescriptor)),
        }
    }

    pub fn recover_os_handle(&self) -> Result<u64, TypeError> {
        match self {
            Self::OsHandle(h) => Ok(*h),
            _ => Err(self.mismatch(WireTag::OsHandle)),
        }
    }
}

impl From<i32> for WireValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u32> for WireValue {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<u8> for WireValue {
    fn from(v: u8) -> Self {
        Self::Char8(v)
    }
}

impl From<u16> for WireValue {
    fn from(v: u16) -> Self {
        Self::Char16(v)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        Self::String8(s.to_string())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        Self::String8(s)
    }
}

/// `None` becomes a null string, preserving the empty-vs-absent distinction.
impl From<Option<&str>> for WireValue {
    fn from(s: Option<&str>) -> Self {
        match s {
            Some(s) => Self::String8(s.to_string()),
            None => Self::NullString8,
        }
    }
}

impl From<&[u8]> for WireValue {
    fn from(b: &[u8]) -> Self {
        Self::ByteArray(b.to_vec())
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(b: Vec<u8>) -> Self {
        Self::ByteArray(b)
    }
}

/// `None` becomes a null byte array, preserving the empty-vs-absent
/// distinction.
impl From<Option<&[u8]>> for WireValue {
    fn from(b: Option<&[u8]>) -> Self {
        match b {
            Some(b) => Self::ByteArray(b.to_vec()),
            None => Self::NullByteArray,
        }
    }
}
