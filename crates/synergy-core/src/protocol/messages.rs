//! Typed protocol messages and the per-tag argument formats.
//!
//! Every runtime record is a [`Message`].  The handshake greeting is special:
//! it starts with the 7-byte string `"Synergy"` instead of a 4-byte tag, so it
//! has its own types, [`Hello`] (server → client) and [`HelloBack`]
//! (client → server).
//!
//! # Directions
//!
//! | Tag    | Direction | Meaning                                   |
//! |--------|-----------|-------------------------------------------|
//! | `CALV` | S↔C       | keep-alive                                |
//! | `CIAK` | S→C       | screen info acknowledged                  |
//! | `CROP` | S→C       | reset options                             |
//! | `CINN` | S→C       | enter: x, y, sequence, modifier mask      |
//! | `COUT` | S→C       | leave                                     |
//! | `CCLP` | S↔C       | clipboard grabbed: id, sequence           |
//! | `CSEC` | S↔C       | screensaver on/off                        |
//! | `CBYE` | S→C       | server is closing the connection          |
//! | `DKDN` | S→C       | key down: key id, mask, button            |
//! | `DKRP` | S→C       | key repeat: key id, mask, count, button   |
//! | `DKUP` | S→C       | key up: key id, mask, button              |
//! | `DMDN` | S→C       | mouse button down                         |
//! | `DMUP` | S→C       | mouse button up                           |
//! | `DMMV` | S→C       | absolute mouse motion                     |
//! | `DMWM` | S→C       | mouse wheel                               |
//! | `DINF` | C→S       | screen info                               |
//! | `DSOP` | S↔C       | set options                               |
//! | `DCLP` | S↔C       | clipboard data                            |
//! | `QINF` | S→C       | query screen info                         |
//! | `QCLP` | S↔C       | request clipboard data                    |
//! | `EINC` | S→C       | incompatible protocol version             |
//! | `EUNK` | S↔C       | unknown client name                       |
//! | `EBSY` | S→C       | client name already connected             |
//! | `EBAD` | S↔C       | protocol violation                        |

use std::fmt;

use crate::domain::clipboard::ClipboardId;
use crate::keymap::key_id::{ButtonId, KeyButton, KeyId};
use crate::keymap::modifier::ModifierMask;
use crate::protocol::codec::{self, Arg, ArgKind, Cursor, ProtocolError, Tag};

/// Protocol major version spoken by this implementation.
pub const PROTOCOL_MAJOR: u16 = 1;
/// Protocol minor version spoken by this implementation.
pub const PROTOCOL_MINOR: u16 = 3;
/// Literal that opens both handshake greetings.
pub const GREETING: &[u8; 7] = b"Synergy";

/// All known record tags.
pub mod tags {
    use crate::protocol::codec::Tag;

    pub const CALV: Tag = Tag::new(b"CALV");
    pub const CIAK: Tag = Tag::new(b"CIAK");
    pub const CROP: Tag = Tag::new(b"CROP");
    pub const CINN: Tag = Tag::new(b"CINN");
    pub const COUT: Tag = Tag::new(b"COUT");
    pub const CCLP: Tag = Tag::new(b"CCLP");
    pub const CSEC: Tag = Tag::new(b"CSEC");
    pub const CBYE: Tag = Tag::new(b"CBYE");
    pub const DKDN: Tag = Tag::new(b"DKDN");
    pub const DKRP: Tag = Tag::new(b"DKRP");
    pub const DKUP: Tag = Tag::new(b"DKUP");
    pub const DMDN: Tag = Tag::new(b"DMDN");
    pub const DMUP: Tag = Tag::new(b"DMUP");
    pub const DMMV: Tag = Tag::new(b"DMMV");
    pub const DMWM: Tag = Tag::new(b"DMWM");
    pub const DINF: Tag = Tag::new(b"DINF");
    pub const DSOP: Tag = Tag::new(b"DSOP");
    pub const DCLP: Tag = Tag::new(b"DCLP");
    pub const QINF: Tag = Tag::new(b"QINF");
    pub const QCLP: Tag = Tag::new(b"QCLP");
    pub const EINC: Tag = Tag::new(b"EINC");
    pub const EUNK: Tag = Tag::new(b"EUNK");
    pub const EBSY: Tag = Tag::new(b"EBSY");
    pub const EBAD: Tag = Tag::new(b"EBAD");
}

use ArgKind::{List, Str, I1, I2, I4};

const NO_ARGS: &[ArgKind] = &[];
const ENTER: &[ArgKind] = &[I2, I2, I4, I2];
const CLIPBOARD_REF: &[ArgKind] = &[I1, I4];
const ONE_I1: &[ArgKind] = &[I1];
const ONE_I2: &[ArgKind] = &[I2];
const TWO_I2: &[ArgKind] = &[I2, I2];
const KEY: &[ArgKind] = &[I2, I2, I2];
const KEY_REPEAT: &[ArgKind] = &[I2, I2, I2, I2];
const INFO: &[ArgKind] = &[I2, I2, I2, I2, I2, I2, I2];
const OPTIONS: &[ArgKind] = &[List];
const CLIPBOARD_DATA: &[ArgKind] = &[I1, I4, Str];

/// Returns the argument format for `tag`, or `None` for an unknown tag.
pub fn arg_format(tag: Tag) -> Option<&'static [ArgKind]> {
    let format = match tag {
        tags::CALV | tags::CIAK | tags::CROP | tags::COUT | tags::CBYE | tags::QINF => NO_ARGS,
        tags::EUNK | tags::EBSY | tags::EBAD => NO_ARGS,
        tags::CINN => ENTER,
        tags::CCLP | tags::QCLP => CLIPBOARD_REF,
        tags::CSEC | tags::DMDN | tags::DMUP => ONE_I1,
        tags::DMWM => ONE_I2,
        tags::DMMV | tags::EINC => TWO_I2,
        tags::DKDN | tags::DKUP => KEY,
        tags::DKRP => KEY_REPEAT,
        tags::DINF => INFO,
        tags::DSOP => OPTIONS,
        tags::DCLP => CLIPBOARD_DATA,
        _ => return None,
    };
    Some(format)
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Identifier of a `DSOP` option: four ASCII characters packed big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionId(pub u32);

impl OptionId {
    /// CapsLock reports only a press edge on the secondary's keyboard.
    pub const HALF_DUPLEX_CAPS_LOCK: OptionId = OptionId::from_chars(b"HDCL");
    /// NumLock reports only a press edge on the secondary's keyboard.
    pub const HALF_DUPLEX_NUM_LOCK: OptionId = OptionId::from_chars(b"HDNL");
    /// Heartbeat interval in milliseconds.
    pub const HEARTBEAT: OptionId = OptionId::from_chars(b"HART");

    pub const fn from_chars(chars: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*chars))
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Tag(self.0.to_be_bytes()))
    }
}

impl fmt::Debug for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionId({self})")
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Geometry reported by a secondary in `DINF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenInfo {
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
    /// Size of the jump zone at the screen edges.
    pub warp_zone: i16,
    pub cursor_x: i16,
    pub cursor_y: i16,
}

/// A decoded runtime record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    InfoAck,
    ResetOptions,
    Enter {
        x: i16,
        y: i16,
        seq: u32,
        mask: ModifierMask,
    },
    Leave,
    GrabClipboard {
        id: ClipboardId,
        seq: u32,
    },
    Screensaver {
        on: bool,
    },
    Close,
    KeyDown {
        id: KeyId,
        mask: ModifierMask,
        button: KeyButton,
    },
    KeyRepeat {
        id: KeyId,
        mask: ModifierMask,
        count: u16,
        button: KeyButton,
    },
    KeyUp {
        id: KeyId,
        mask: ModifierMask,
        button: KeyButton,
    },
    MouseDown {
        button: ButtonId,
    },
    MouseUp {
        button: ButtonId,
    },
    MouseMove {
        x: i16,
        y: i16,
    },
    MouseWheel {
        delta: i16,
    },
    Info(ScreenInfo),
    SetOptions(Vec<(OptionId, i32)>),
    ClipboardData {
        id: ClipboardId,
        seq: u32,
        data: Vec<u8>,
    },
    QueryInfo,
    QueryClipboard {
        id: ClipboardId,
        seq: u32,
    },
    Incompatible {
        major: u16,
        minor: u16,
    },
    UnknownClient,
    Busy,
    ProtocolViolation,
}

impl Message {
    /// The tag this message is sent under.
    pub fn tag(&self) -> Tag {
        match self {
            Message::KeepAlive => tags::CALV,
            Message::InfoAck => tags::CIAK,
            Message::ResetOptions => tags::CROP,
            Message::Enter { .. } => tags::CINN,
            Message::Leave => tags::COUT,
            Message::GrabClipboard { .. } => tags::CCLP,
            Message::Screensaver { .. } => tags::CSEC,
            Message::Close => tags::CBYE,
            Message::KeyDown { .. } => tags::DKDN,
            Message::KeyRepeat { .. } => tags::DKRP,
            Message::KeyUp { .. } => tags::DKUP,
            Message::MouseDown { .. } => tags::DMDN,
            Message::MouseUp { .. } => tags::DMUP,
            Message::MouseMove { .. } => tags::DMMV,
            Message::MouseWheel { .. } => tags::DMWM,
            Message::Info(_) => tags::DINF,
            Message::SetOptions(_) => tags::DSOP,
            Message::ClipboardData { .. } => tags::DCLP,
            Message::QueryInfo => tags::QINF,
            Message::QueryClipboard { .. } => tags::QCLP,
            Message::Incompatible { .. } => tags::EINC,
            Message::UnknownClient => tags::EUNK,
            Message::Busy => tags::EBSY,
            Message::ProtocolViolation => tags::EBAD,
        }
    }

    /// Encodes this message into a record payload (without the length prefix).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ValueOutOfRange`] when a key id does not fit 16 bits.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let tag = self.tag();
        codec::encode(tag, &self.to_args(tag)?)
    }

    /// Decodes a record payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::MalformedFrame`] for bad records and
    /// [`ProtocolError::UnknownTag`] for tags this implementation does not know.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (tag, args) = codec::decode(payload)?;
        Self::from_args(tag, &args)
    }

    fn to_args(&self, tag: Tag) -> Result<Vec<Arg>, ProtocolError> {
        Ok(match self {
            Message::KeepAlive
            | Message::InfoAck
            | Message::ResetOptions
            | Message::Leave
            | Message::Close
            | Message::QueryInfo
            | Message::UnknownClient
            | Message::Busy
            | Message::ProtocolViolation => Vec::new(),
            Message::Enter { x, y, seq, mask } => vec![
                Arg::I2(*x),
                Arg::I2(*y),
                Arg::I4(*seq as i32),
                Arg::I2(mask.bits() as i16),
            ],
            Message::GrabClipboard { id, seq } | Message::QueryClipboard { id, seq } => {
                vec![Arg::I1(id.0 as i8), Arg::I4(*seq as i32)]
            }
            Message::Screensaver { on } => vec![Arg::I1(i8::from(*on))],
            Message::KeyDown { id, mask, button } | Message::KeyUp { id, mask, button } => vec![
                key_arg(tag, *id)?,
                Arg::I2(mask.bits() as i16),
                Arg::I2(*button as i16),
            ],
            Message::KeyRepeat {
                id,
                mask,
                count,
                button,
            } => vec![
                key_arg(tag, *id)?,
                Arg::I2(mask.bits() as i16),
                Arg::I2(*count as i16),
                Arg::I2(*button as i16),
            ],
            Message::MouseDown { button } | Message::MouseUp { button } => {
                vec![Arg::I1(*button as i8)]
            }
            Message::MouseMove { x, y } => vec![Arg::I2(*x), Arg::I2(*y)],
            Message::MouseWheel { delta } => vec![Arg::I2(*delta)],
            Message::Info(info) => vec![
                Arg::I2(info.x),
                Arg::I2(info.y),
                Arg::I2(info.width),
                Arg::I2(info.height),
                Arg::I2(info.warp_zone),
                Arg::I2(info.cursor_x),
                Arg::I2(info.cursor_y),
            ],
            Message::SetOptions(options) => vec![Arg::List(
                options
                    .iter()
                    .flat_map(|(id, value)| [id.0 as i32, *value])
                    .collect(),
            )],
            Message::ClipboardData { id, seq, data } => vec![
                Arg::I1(id.0 as i8),
                Arg::I4(*seq as i32),
                Arg::Str(data.clone()),
            ],
            Message::Incompatible { major, minor } => {
                vec![Arg::I2(*major as i16), Arg::I2(*minor as i16)]
            }
        })
    }

    fn from_args(tag: Tag, args: &[Arg]) -> Result<Self, ProtocolError> {
        use Arg::{List as L, Str as S, I1 as B, I2 as W, I4 as D};

        let msg = match (tag, args) {
            (tags::CALV, []) => Message::KeepAlive,
            (tags::CIAK, []) => Message::InfoAck,
            (tags::CROP, []) => Message::ResetOptions,
            (tags::COUT, []) => Message::Leave,
            (tags::CBYE, []) => Message::Close,
            (tags::QINF, []) => Message::QueryInfo,
            (tags::EUNK, []) => Message::UnknownClient,
            (tags::EBSY, []) => Message::Busy,
            (tags::EBAD, []) => Message::ProtocolViolation,
            (tags::CINN, [W(x), W(y), D(seq), W(mask)]) => Message::Enter {
                x: *x,
                y: *y,
                seq: *seq as u32,
                mask: ModifierMask::from_bits_truncate(*mask as u16),
            },
            (tags::CCLP, [B(id), D(seq)]) => Message::GrabClipboard {
                id: ClipboardId(*id as u8),
                seq: *seq as u32,
            },
            (tags::QCLP, [B(id), D(seq)]) => Message::QueryClipboard {
                id: ClipboardId(*id as u8),
                seq: *seq as u32,
            },
            (tags::CSEC, [B(on)]) => Message::Screensaver { on: *on != 0 },
            (tags::DKDN, [W(id), W(mask), W(button)]) => Message::KeyDown {
                id: KeyId(u32::from(*id as u16)),
                mask: ModifierMask::from_bits_truncate(*mask as u16),
                button: *button as u16,
            },
            (tags::DKUP, [W(id), W(mask), W(button)]) => Message::KeyUp {
                id: KeyId(u32::from(*id as u16)),
                mask: ModifierMask::from_bits_truncate(*mask as u16),
                button: *button as u16,
            },
            (tags::DKRP, [W(id), W(mask), W(count), W(button)]) => Message::KeyRepeat {
                id: KeyId(u32::from(*id as u16)),
                mask: ModifierMask::from_bits_truncate(*mask as u16),
                count: *count as u16,
                button: *button as u16,
            },
            (tags::DMDN, [B(button)]) => Message::MouseDown {
                button: *button as u8,
            },
            (tags::DMUP, [B(button)]) => Message::MouseUp {
                button: *button as u8,
            },
            (tags::DMMV, [W(x), W(y)]) => Message::MouseMove { x: *x, y: *y },
            (tags::DMWM, [W(delta)]) => Message::MouseWheel { delta: *delta },
            (tags::DINF, [W(x), W(y), W(w), W(h), W(zone), W(mx), W(my)]) => {
                Message::Info(ScreenInfo {
                    x: *x,
                    y: *y,
                    width: *w,
                    height: *h,
                    warp_zone: *zone,
                    cursor_x: *mx,
                    cursor_y: *my,
                })
            }
            (tags::DSOP, [L(values)]) => {
                if values.len() % 2 != 0 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "{tag} carries {} values, expected id/value pairs",
                        values.len()
                    )));
                }
                Message::SetOptions(
                    values
                        .chunks_exact(2)
                        .map(|pair| (OptionId(pair[0] as u32), pair[1]))
                        .collect(),
                )
            }
            (tags::DCLP, [B(id), D(seq), S(data)]) => Message::ClipboardData {
                id: ClipboardId(*id as u8),
                seq: *seq as u32,
                data: data.clone(),
            },
            (tags::EINC, [W(major), W(minor)]) => Message::Incompatible {
                major: *major as u16,
                minor: *minor as u16,
            },
            _ => {
                return Err(ProtocolError::MalformedFrame(format!(
                    "{tag} arguments do not match its format"
                )))
            }
        };
        Ok(msg)
    }
}

fn key_arg(tag: Tag, id: KeyId) -> Result<Arg, ProtocolError> {
    u16::try_from(id.0)
        .map(|v| Arg::I2(v as i16))
        .map_err(|_| ProtocolError::ValueOutOfRange {
            tag,
            value: i64::from(id.0),
        })
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Pseudo-tag used in error messages about the greeting.
const GREETING_TAG: Tag = Tag::new(b"Syne");

fn strip_greeting(payload: &[u8]) -> Result<&[u8], ProtocolError> {
    payload.strip_prefix(&GREETING[..]).ok_or_else(|| {
        ProtocolError::MalformedFrame("handshake does not start with \"Synergy\"".to_string())
    })
}

/// Server greeting: `"Synergy"` + major + minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub major: u16,
    pub minor: u16,
}

impl Hello {
    /// The greeting for the version this crate speaks.
    pub fn current() -> Self {
        Self {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = GREETING.to_vec();
        codec::write_arg(&mut buf, &Arg::I2(self.major as i16));
        codec::write_arg(&mut buf, &Arg::I2(self.minor as i16));
        buf
    }

    /// # Errors
    ///
    /// [`ProtocolError::MalformedFrame`] for anything but an exact greeting.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let rest = strip_greeting(payload)?;
        let mut cursor = Cursor::new(GREETING_TAG, rest);
        let major = cursor.read(I2)?;
        let minor = cursor.read(I2)?;
        cursor.finish()?;
        match (major, minor) {
            (Arg::I2(major), Arg::I2(minor)) => Ok(Self {
                major: major as u16,
                minor: minor as u16,
            }),
            _ => Err(ProtocolError::MalformedFrame("bad greeting".to_string())),
        }
    }
}

/// Client reply: `"Synergy"` + major + minor + screen name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloBack {
    pub major: u16,
    pub minor: u16,
    pub name: String,
}

impl HelloBack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = GREETING.to_vec();
        codec::write_arg(&mut buf, &Arg::I2(self.major as i16));
        codec::write_arg(&mut buf, &Arg::I2(self.minor as i16));
        codec::write_arg(&mut buf, &Arg::Str(self.name.as_bytes().to_vec()));
        buf
    }

    /// # Errors
    ///
    /// [`ProtocolError::MalformedFrame`] for a bad prefix, bad lengths or a
    /// name that is not UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let rest = strip_greeting(payload)?;
        let mut cursor = Cursor::new(GREETING_TAG, rest);
        let args = (cursor.read(I2)?, cursor.read(I2)?, cursor.read(Str)?);
        cursor.finish()?;
        match args {
            (Arg::I2(major), Arg::I2(minor), Arg::Str(name)) => Ok(Self {
                major: major as u16,
                minor: minor as u16,
                name: String::from_utf8(name).map_err(|_| {
                    ProtocolError::MalformedFrame("screen name is not UTF-8".to_string())
                })?,
            }),
            _ => Err(ProtocolError::MalformedFrame("bad greeting".to_string())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
