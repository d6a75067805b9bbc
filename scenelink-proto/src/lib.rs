//! Wire protocol for scenelink sender↔listener communication.
//!
//! Messages are serialized as JSON and framed with a 4-byte big-endian
//! length prefix. One connection carries exactly one [`Command`] and its
//! [`Response`].

mod codec;
mod message;

pub use codec::{
    MAX_FRAME, decode, encode, from_payload, read_frame, recv, recv_frame, send, to_payload,
    write_frame,
};
pub use message::{
    Command, DEFAULT_HOST, DEFAULT_PORT, ErrorKind, Params, Response, Value, ValueKind,
};
