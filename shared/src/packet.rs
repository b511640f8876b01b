//! Tagged-union framing of the five wire packet kinds over the bit codec.

use crate::constants::MAX_INPUTS_PER_PACKET;
use crate::snapshot::{
    calculate_compression_state, serialize_snapshot_relative_to_baseline, CompressionState,
    QuantizedSnapshot,
};
use crate::stream::{serialize_int, serialize_u16, serialize_u64, ReadStream, Stream, WriteStream};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Input {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub push: bool,
    pub pull: bool,
}

impl Input {
    fn serialize<S: Stream>(&mut self, stream: &mut S) {
        stream.serialize_bool(&mut self.left);
        stream.serialize_bool(&mut self.right);
        stream.serialize_bool(&mut self.up);
        stream.serialize_bool(&mut self.down);
        stream.serialize_bool(&mut self.push);
        stream.serialize_bool(&mut self.pull);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionRequestPacket {
    pub client_guid: u64,
    pub connect_sequence: u16,
}

impl ConnectionRequestPacket {
    fn serialize<S: Stream>(&mut self, stream: &mut S) {
        serialize_u64(stream, &mut self.client_guid);
        serialize_u16(stream, &mut self.connect_sequence);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionAcceptedPacket {
    pub client_guid: u64,
    pub connect_sequence: u16,
}

impl ConnectionAcceptedPacket {
    fn serialize<S: Stream>(&mut self, stream: &mut S) {
        serialize_u64(stream, &mut self.client_guid);
        serialize_u16(stream, &mut self.connect_sequence);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionDeniedPacket {
    pub client_guid: u64,
    pub connect_sequence: u16,
}

impl ConnectionDeniedPacket {
    fn serialize<S: Stream>(&mut self, stream: &mut S) {
        serialize_u64(stream, &mut self.client_guid);
        serialize_u16(stream, &mut self.connect_sequence);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputPacket {
    pub synchronizing: bool,
    pub sync_offset: u16,
    pub sync_sequence: u16,
    pub bracketed: bool,
    pub adjustment_sequence: u16,
    pub tick: u64,
    pub inputs: Vec<Input>,
}

impl InputPacket {
    fn serialize<S: Stream>(&mut self, stream: &mut S) {
        stream.serialize_bool(&mut self.synchronizing);
        if self.synchronizing {
            serialize_u16(stream, &mut self.sync_offset);
            serialize_u16(stream, &mut self.sync_sequence);
            serialize_u64(stream, &mut self.tick);
        } else {
            serialize_u64(stream, &mut self.tick);
            stream.serialize_bool(&mut self.bracketed);
            serialize_u16(stream, &mut self.adjustment_sequence);

            let mut num_inputs = self.inputs.len() as i32;
            serialize_int(stream, &mut num_inputs, 0, MAX_INPUTS_PER_PACKET as i32);

            if S::is_reading() {
                self.inputs = vec![Input::default(); num_inputs as usize];
            }

            for i in 0..num_inputs as usize {
                if i > 0 {
                    // The original source compares against `input[i-i]` (always index 0), a
                    // typo; this compares against the immediately preceding entry, `input[i-1]`.
                    let mut different = if S::is_writing() {
                        self.inputs[i] != self.inputs[i - 1]
                    } else {
                        false
                    };
                    stream.serialize_bool(&mut different);
                    if different {
                        self.inputs[i].serialize(stream);
                    } else if S::is_reading() {
                        self.inputs[i] = self.inputs[i - 1];
                    }
                } else {
                    self.inputs[i].serialize(stream);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct SnapshotPacket {
    pub synchronizing: bool,
    pub sync_offset: u16,
    pub reconnect: bool,
    pub bracketing: bool,
    pub bracket_offset: u16,
    pub adjustment_sequence: u16,
    pub adjustment_offset: i32,
    pub tick: u64,
    pub input_ack: u64,
    pub snapshot: QuantizedSnapshot,
}

impl Default for SnapshotPacket {
    fn default() -> Self {
        SnapshotPacket {
            synchronizing: false,
            sync_offset: 0,
            reconnect: false,
            bracketing: false,
            bracket_offset: 0,
            adjustment_sequence: 0,
            adjustment_offset: 0,
            tick: 0,
            input_ack: 0,
            snapshot: QuantizedSnapshot::default(),
        }
    }
}

impl SnapshotPacket {
    fn serialize<S: Stream>(
        &mut self,
        stream: &mut S,
        compression_state: &CompressionState,
        baseline: &QuantizedSnapshot,
        adjustment_min: i32,
        adjustment_max: i32,
    ) {
        stream.serialize_bool(&mut self.synchronizing);
        if self.synchronizing {
            serialize_u64(stream, &mut self.tick);
            serialize_u16(stream, &mut self.sync_offset);
        } else {
            stream.serialize_bool(&mut self.reconnect);
            stream.serialize_bool(&mut self.bracketing);
            serialize_u16(stream, &mut self.bracket_offset);

            if !self.bracketing {
                serialize_u16(stream, &mut self.adjustment_sequence);
                serialize_int(stream, &mut self.adjustment_offset, adjustment_min, adjustment_max);
            }

            serialize_u64(stream, &mut self.tick);
            serialize_u64(stream, &mut self.input_ack);

            serialize_snapshot_relative_to_baseline(
                stream,
                compression_state,
                &mut self.snapshot,
                baseline,
            );
        }
    }
}

#[derive(Clone)]
pub enum Packet {
    ConnectionRequest(ConnectionRequestPacket),
    ConnectionAccepted(ConnectionAcceptedPacket),
    ConnectionDenied(ConnectionDeniedPacket),
    Input(InputPacket),
    Snapshot(SnapshotPacket),
}

impl Packet {
    fn tag(&self) -> i32 {
        match self {
            Packet::ConnectionRequest(_) => 0,
            Packet::ConnectionAccepted(_) => 1,
            Packet::ConnectionDenied(_) => 2,
            Packet::Input(_) => 3,
            Packet::Snapshot(_) => 4,
        }
    }
}

/// Encodes `packet` into `buffer`. For a `Snapshot` packet, `baseline`/`previous_baseline` drive
/// the delta codec; non-snapshot packets ignore them. Returns the number of bytes written, or
/// `None` if the packet did not fit.
pub fn write_packet(
    buffer: &mut [u8],
    packet: &mut Packet,
    baseline: &QuantizedSnapshot,
    previous_baseline: &QuantizedSnapshot,
    adjustment_min: i32,
    adjustment_max: i32,
) -> Option<usize> {
    let mut stream = WriteStream::new(buffer);
    let mut tag = packet.tag();
    serialize_int(&mut stream, &mut tag, 0, 4);
    match packet {
        Packet::ConnectionRequest(p) => p.serialize(&mut stream),
        Packet::ConnectionAccepted(p) => p.serialize(&mut stream),
        Packet::ConnectionDenied(p) => p.serialize(&mut stream),
        Packet::Input(p) => p.serialize(&mut stream),
        Packet::Snapshot(p) => {
            let compression_state = calculate_compression_state(baseline, previous_baseline);
            p.serialize(
                &mut stream,
                &compression_state,
                baseline,
                adjustment_min,
                adjustment_max,
            );
        }
    }
    stream.flush();
    if stream.overflow() {
        None
    } else {
        // `BitReader`/`BitWriter` operate on whole 32-bit words, so round up to the next word
        // boundary: the tail bytes are still zero (the caller's buffer starts zeroed and nothing
        // past `bytes_written()` was touched), and this keeps whatever slice goes out over the
        // socket a valid length to hand straight back into `read_packet`.
        let bytes = stream.bytes_written();
        Some((bytes + 3) & !3)
    }
}

/// Decodes a packet from `buffer`. `baseline`/`previous_baseline` are required to reconstruct a
/// `Snapshot` packet's cube array; pass the receiver's currently acknowledged baseline. Returns
/// `None` on an unknown tag or a codec overflow (malformed/truncated packet).
pub fn read_packet(
    buffer: &[u8],
    baseline: &QuantizedSnapshot,
    previous_baseline: &QuantizedSnapshot,
    adjustment_min: i32,
    adjustment_max: i32,
) -> Option<Packet> {
    let mut stream = ReadStream::new(buffer);
    let mut tag = 0i32;
    serialize_int(&mut stream, &mut tag, 0, 4);

    let packet = match tag {
        0 => {
            let mut p = ConnectionRequestPacket::default();
            p.serialize(&mut stream);
            Packet::ConnectionRequest(p)
        }
        1 => {
            let mut p = ConnectionAcceptedPacket::default();
            p.serialize(&mut stream);
            Packet::ConnectionAccepted(p)
        }
        2 => {
            let mut p = ConnectionDeniedPacket::default();
            p.serialize(&mut stream);
            Packet::ConnectionDenied(p)
        }
        3 => {
            let mut p = InputPacket::default();
            p.serialize(&mut stream);
            Packet::Input(p)
        }
        4 => {
            let mut p = SnapshotPacket::default();
            let compression_state = calculate_compression_state(baseline, previous_baseline);
            p.serialize(
                &mut stream,
                &compression_state,
                baseline,
                adjustment_min,
                adjustment_max,
            );
            Packet::Snapshot(p)
        }
        _ => return None,
    };

    if stream.overflow() {
        None
    } else {
        Some(packet)
    }
}
