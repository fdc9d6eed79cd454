//! Shared protocol definitions for talking to the autorouter.
//! Kept free of I/O so the client transports and the relay can both
//! depend on it without pulling in a runtime.

pub mod codec;
pub mod command;
pub mod coord;
pub mod frame;

pub use codec::{
    decode_delivery, decode_delivery_slice, delivery_from_value, delivery_to_value,
    encode_delivery, CodecError, WireDialect,
};
pub use command::GroupKind;
pub use coord::{format_hms, LatLon, RawCoord, COORD_SCALE};
pub use frame::{Delivery, Frame, SequenceKind};
