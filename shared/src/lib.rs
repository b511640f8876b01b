//! Shared netcode core for the cubes sandbox: fixed-tick simulation constants, the bit-level
//! wire codec, packet framing, snapshot compression, and the entity/authority bookkeeping both
//! the server and the client drive identically.
//!
//! The wire format is the contract between `server` and `client`; both depend on this crate
//! rather than on each other so the codec can never drift out of sync between the two sides of a
//! connection.

pub mod authority;
pub mod bitcodec;
pub mod constants;
pub mod entity;
pub mod packet;
pub mod physics;
pub mod snapshot;
pub mod stream;

pub use bitcodec::{
    bits_required, sequence_greater_than, signed_to_unsigned, unsigned_to_signed, BitReader,
    BitWriter,
};
pub use entity::{Entity, EntityKind, EntityManager, Pose, Velocity};
pub use packet::{read_packet, write_packet, Input, Packet};
pub use snapshot::{CompressionState, QuantizedCubeState, QuantizedSnapshot};
pub use stream::{ReadStream, Stream, WriteStream};
