//! Record codec: a 4-byte ASCII tag followed by positional arguments.
//!
//! Wire format of one record payload (the length prefix is added by
//! [`crate::protocol::frame`]):
//!
//! ```text
//! [tag:4][arg0][arg1]...
//!
//! i1  -> 1 byte   big-endian signed
//! i2  -> 2 bytes  big-endian signed
//! i4  -> 4 bytes  big-endian signed
//! s   -> [len:4][bytes:len]
//! v   -> [count:4][i4 * count]
//! ```
//!
//! # Why positional arguments? (for beginners)
//!
//! There are no field names on the wire.  Both peers agree on a *format* for
//! every tag (for example `DKDN` is always `i2 i2 i2`), so the decoder simply
//! walks the bytes in order.  That makes records tiny, but it also means the
//! decoder must be strict: a record with one byte too many or too few cannot be
//! "mostly right", it is rejected as [`ProtocolError::MalformedFrame`].
//!
//! The format table itself lives in [`crate::protocol::messages::arg_format`];
//! this module only knows how to lay out and read back [`Arg`] values.

use std::fmt;

use thiserror::Error;

use crate::protocol::messages::arg_format;

/// Length of the ASCII tag at the start of every record.
pub const TAG_LEN: usize = 4;

/// Errors that can occur while encoding or decoding a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Wrong argument count, wrong argument width, or a length that runs
    /// past (underflow) or stops short of (overflow) the record end.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The tag is well-formed ASCII but not one this codec knows.
    ///
    /// Surfaced instead of dropped so the session decides whether to ignore
    /// the record or disconnect.
    #[error("unknown message tag {0}")]
    UnknownTag(Tag),

    /// A typed value does not fit the integer width its tag assigns to it.
    #[error("value {value} does not fit an argument of {tag}")]
    ValueOutOfRange { tag: Tag, value: i64 },
}

// ── Tags and arguments ────────────────────────────────────────────────────────

/// A 4-byte ASCII message tag such as `DKDN`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; TAG_LEN]);

impl Tag {
    /// Builds a tag from a byte-string literal, e.g. `Tag::new(b"CALV")`.
    pub const fn new(bytes: &[u8; TAG_LEN]) -> Self {
        Self(*bytes)
    }

    /// Returns `true` when every byte is printable ASCII.
    pub fn is_ascii(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// The type of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    I1,
    I2,
    I4,
    /// Length-prefixed byte string.
    Str,
    /// Nested count-prefixed list of `i4` values.
    List,
}

/// One decoded positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    I1(i8),
    I2(i16),
    I4(i32),
    Str(Vec<u8>),
    List(Vec<i32>),
}

impl Arg {
    /// The [`ArgKind`] this value encodes as.
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::I1(_) => ArgKind::I1,
            Arg::I2(_) => ArgKind::I2,
            Arg::I4(_) => ArgKind::I4,
            Arg::Str(_) => ArgKind::Str,
            Arg::List(_) => ArgKind::List,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Arg::I1(_) => 1,
            Arg::I2(_) => 2,
            Arg::I4(_) => 4,
            Arg::Str(s) => 4 + s.len(),
            Arg::List(v) => 4 + 4 * v.len(),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `tag` and `args` into a record payload.
///
/// The arguments are checked against the tag's format table.
///
/// # Errors
///
/// [`ProtocolError::UnknownTag`] if the tag has no format, and
/// [`ProtocolError::MalformedFrame`] if the argument count or kinds do not
/// match that format.
///
/// # Examples
///
/// ```rust
/// use synergy_core::protocol::codec::{decode, encode, Arg};
/// use synergy_core::protocol::messages::tags;
///
/// let bytes = encode(tags::DMMV, &[Arg::I2(10), Arg::I2(-4)]).unwrap();
/// assert_eq!(bytes, b"DMMV\x00\x0a\xff\xfc");
/// let (tag, args) = decode(&bytes).unwrap();
/// assert_eq!(tag, tags::DMMV);
/// assert_eq!(args, vec![Arg::I2(10), Arg::I2(-4)]);
/// ```
pub fn encode(tag: Tag, args: &[Arg]) -> Result<Vec<u8>, ProtocolError> {
    let format = arg_format(tag).ok_or(ProtocolError::UnknownTag(tag))?;
    check_args(tag, format, args)?;
    Ok(encode_unchecked(tag, args))
}

/// Decodes a record payload into its tag and arguments.
///
/// # Errors
///
/// [`ProtocolError::MalformedFrame`] for a payload shorter than a tag or
/// whose arguments do not exactly fill it, and [`ProtocolError::UnknownTag`]
/// for a tag with no format.
pub fn decode(payload: &[u8]) -> Result<(Tag, Vec<Arg>), ProtocolError> {
    let (tag, rest) = split_tag(payload)?;
    let format = arg_format(tag).ok_or(ProtocolError::UnknownTag(tag))?;
    let args = decode_args(tag, rest, format)?;
    Ok((tag, args))
}

/// Splits the leading tag off a payload.
///
/// # Errors
///
/// [`ProtocolError::MalformedFrame`] when fewer than four bytes are present
/// or the tag is not printable ASCII.
pub fn split_tag(payload: &[u8]) -> Result<(Tag, &[u8]), ProtocolError> {
    if payload.len() < TAG_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "record of {} bytes is shorter than a tag",
            payload.len()
        )));
    }
    let mut raw = [0u8; TAG_LEN];
    raw.copy_from_slice(&payload[..TAG_LEN]);
    let tag = Tag(raw);
    if !tag.is_ascii() {
        return Err(ProtocolError::MalformedFrame(format!(
            "tag {tag} is not ASCII"
        )));
    }
    Ok((tag, &payload[TAG_LEN..]))
}

/// Decodes `bytes` (the part after the tag) according to `format`.
///
/// # Errors
///
/// [`ProtocolError::MalformedFrame`] on underflow or trailing bytes.
pub fn decode_args(tag: Tag, bytes: &[u8], format: &[ArgKind]) -> Result<Vec<Arg>, ProtocolError> {
    let mut cursor = Cursor::new(tag, bytes);
    let mut args = Vec::with_capacity(format.len());
    for kind in format {
        args.push(cursor.read(*kind)?);
    }
    cursor.finish()?;
    Ok(args)
}

/// Lays out `tag` and `args` without consulting the format table.
///
/// Used for the greeting, which has no registered tag.
pub fn encode_unchecked(tag: Tag, args: &[Arg]) -> Vec<u8> {
    let len = TAG_LEN + args.iter().map(Arg::encoded_len).sum::<usize>();
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(&tag.0);
    for arg in args {
        write_arg(&mut buf, arg);
    }
    buf
}

/// Appends one argument to `buf`.
pub fn write_arg(buf: &mut Vec<u8>, arg: &Arg) {
    match arg {
        Arg::I1(v) => buf.push(*v as u8),
        Arg::I2(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Arg::I4(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Arg::Str(s) => {
            buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
            buf.extend_from_slice(s);
        }
        Arg::List(values) => {
            buf.extend_from_slice(&(values.len() as u32).to_be_bytes());
            for v in values {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn check_args(tag: Tag, format: &[ArgKind], args: &[Arg]) -> Result<(), ProtocolError> {
    if format.len() != args.len() {
        return Err(ProtocolError::MalformedFrame(format!(
            "{tag} takes {} arguments, got {}",
            format.len(),
            args.len()
        )));
    }
    for (i, (want, arg)) in format.iter().zip(args).enumerate() {
        if *want != arg.kind() {
            return Err(ProtocolError::MalformedFrame(format!(
                "{tag} argument {i} must be {want:?}, got {:?}",
                arg.kind()
            )));
        }
    }
    Ok(())
}

/// Bounds-checked reader over the argument bytes of one record.
pub(crate) struct Cursor<'a> {
    tag: Tag,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tag: Tag, bytes: &'a [u8]) -> Self {
        Self { tag, bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let available = self.bytes.len() - self.pos;
        if n > available {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} needs {n} more bytes at offset {}, only {available} left",
                self.tag, self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read(&mut self, kind: ArgKind) -> Result<Arg, ProtocolError> {
        Ok(match kind {
            ArgKind::I1 => Arg::I1(self.take(1)?[0] as i8),
            ArgKind::I2 => {
                let b = self.take(2)?;
                Arg::I2(i16::from_be_bytes([b[0], b[1]]))
            }
            ArgKind::I4 => Arg::I4(self.read_u32()? as i32),
            ArgKind::Str => {
                let len = self.read_u32()? as usize;
                Arg::Str(self.take(len)?.to_vec())
            }
            ArgKind::List => {
                let count = self.read_u32()? as usize;
                // Reject absurd counts before allocating.
                if count > (self.bytes.len() - self.pos) / 4 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "{} list claims {count} entries past the record end",
                        self.tag
                    )));
                }
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(self.read_u32()? as i32);
                }
                Arg::List(values)
            }
        })
    }

    pub(crate) fn finish(&self) -> Result<(), ProtocolError> {
        let extra = self.bytes.len() - self.pos;
        if extra != 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "{} has {extra} trailing bytes",
                self.tag
            )));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::tags;

    #[test]
    fn test_encode_lays_out_integers_big_endian() {
        // Arrange
        let args = [Arg::I2(0x0102), Arg::I2(-1), Arg::I2(7)];

        // Act
        let bytes = encode(tags::DKDN, &args).expect("encode");

        // Assert
        assert_eq!(&bytes[..4], b"DKDN");
        assert_eq!(&bytes[4..], &[0x01, 0x02, 0xFF, 0xFF, 0x00, 0x07]);
    }

    #[test]
    fn test_encode_string_has_four_byte_length_prefix() {
        let bytes = encode(
            tags::DCLP,
            &[Arg::I1(0), Arg::I4(9), Arg::Str(b"hi".to_vec())],
        )
        .expect("encode");
        assert_eq!(&bytes[4..], &[0, 0, 0, 0, 9, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_encode_rejects_wrong_argument_count() {
        let err = encode(tags::DMMV, &[Arg::I2(1)]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_encode_rejects_wrong_argument_width() {
        let err = encode(tags::DMMV, &[Arg::I2(1), Arg::I4(2)]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_arguments() {
        // Arrange – DMMV needs 4 argument bytes, give it 3
        let bytes = b"DMMV\x00\x01\x00";

        // Act
        let err = decode(bytes).unwrap_err();

        // Assert
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let err = decode(b"CALV\x00").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_rejects_string_length_past_end() {
        let err = decode(b"DCLP\x00\x00\x00\x00\x01\x00\x00\x00\x10ab").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_surfaces_unknown_tag() {
        let err = decode(b"ZZZZ").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownTag(Tag::new(b"ZZZZ")));
    }

    #[test]
    fn test_decode_rejects_payload_shorter_than_tag() {
        let err = decode(b"CA").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_rejects_non_ascii_tag() {
        let err = decode(&[0xFF, b'A', b'B', b'C']).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_list_argument() {
        // Arrange – DSOP with two values
        let bytes = b"DSOP\x00\x00\x00\x02\x00\x00\x00\x01\xff\xff\xff\xff";

        // Act
        let (tag, args) = decode(bytes).expect("decode");

        // Assert
        assert_eq!(tag, tags::DSOP);
        assert_eq!(args, vec![Arg::List(vec![1, -1])]);
    }

    #[test]
    fn test_decode_list_with_huge_count_is_malformed() {
        let err = decode(b"DSOP\xff\xff\xff\xff").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn test_tag_display_escapes_non_printable_bytes() {
        assert_eq!(Tag([b'A', 0, b'B', b'C']).to_string(), "A\\x00BC");
    }
}
