//! Wire protocol: framing, the tagged-record codec and typed messages.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod sequence;
pub mod stream;

pub use codec::{Arg, ArgKind, ProtocolError, Tag};
pub use frame::{encode_frame, FrameDecoder, FrameError, MAX_FRAME_LEN};
pub use messages::{
    tags, Hello, HelloBack, Message, OptionId, ScreenInfo, PROTOCOL_MAJOR, PROTOCOL_MINOR,
};
pub use sequence::SequenceCounter;
pub use stream::{FrameReader, FrameWriter};
