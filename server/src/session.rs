//! Per-client connection, clock-sync, and input-delivery state machine.
//!
//! Each of the `MAX_CLIENTS` slots tracks one peer end to end: connection handshake, the
//! three-phase clock synchronization (sync -> bracket -> steady-state adjustment), and a
//! tick-indexed sliding window of inputs the simulator pulls from every server frame.

use std::net::SocketAddr;

use shared::bitcodec::sequence_greater_than;
use shared::constants::*;
use shared::packet::Input;
use shared::snapshot::QuantizedSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug)]
pub struct SyncData {
    pub syncing: bool,
    pub sequence: u16,
    pub samples_seen: u32,
    pub offset: u16,
    pub previous_input_tick: u64,
}

impl Default for SyncData {
    fn default() -> Self {
        SyncData {
            syncing: true,
            sequence: 0,
            samples_seen: 0,
            offset: 0,
            previous_input_tick: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BracketData {
    pub bracketing: bool,
    pub bracketed: bool,
    pub samples: u32,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct AdjustmentData {
    pub sequence: u16,
    pub samples: u32,
    pub min_ticks_ahead: i32,
    pub first_input_tick: u64,
    pub offset: i32,
    pub reconnect_required: bool,
    pub dropped_inputs: u32,
    pub last_drop_time: f64,
    /// Whether the client has echoed the current `sequence`, so a fresh sampling window may
    /// start accumulating. Starts true: the very first window needs no prior acknowledgment.
    pub applied: bool,
}

impl Default for AdjustmentData {
    fn default() -> Self {
        AdjustmentData {
            sequence: 0,
            samples: 0,
            min_ticks_ahead: i32::MAX,
            first_input_tick: 0,
            offset: 0,
            reconnect_required: false,
            dropped_inputs: 0,
            last_drop_time: 0.0,
            applied: true,
        }
    }
}

/// A tick-indexed circular buffer of inputs. A slot holds a valid entry iff its stored tick
/// equals the tick it was looked up with; slots are seeded with an unreachable tick so an
/// untouched slot never matches.
pub struct InputWindow {
    ticks: Vec<u64>,
    inputs: Vec<Input>,
}

impl InputWindow {
    fn new() -> Self {
        InputWindow {
            ticks: vec![u64::MAX; INPUT_SLIDING_WINDOW as usize],
            inputs: vec![Input::default(); INPUT_SLIDING_WINDOW as usize],
        }
    }

    fn index(tick: u64) -> usize {
        (tick % INPUT_SLIDING_WINDOW as u64) as usize
    }

    pub fn set(&mut self, tick: u64, input: Input) {
        let index = Self::index(tick);
        self.ticks[index] = tick;
        self.inputs[index] = input;
    }

    pub fn get(&self, tick: u64) -> Option<Input> {
        let index = Self::index(tick);
        if self.ticks[index] == tick {
            Some(self.inputs[index])
        } else {
            None
        }
    }

    fn clear(&mut self) {
        self.ticks.fill(u64::MAX);
    }
}

pub struct ClientSlot {
    pub state: ConnectionState,
    pub guid: u64,
    pub connect_sequence: u16,
    pub address: Option<SocketAddr>,
    pub last_recv_time: f64,
    pub sync: SyncData,
    pub bracket: BracketData,
    pub adjustment: AdjustmentData,
    pub input: InputWindow,
    /// The last snapshot actually sent to this client and the one before it, used to drive the
    /// delta codec's baseline prediction. There is no explicit snapshot-ack in this protocol, so
    /// "baseline" here means "most recently sent", not "most recently acknowledged".
    pub baseline: QuantizedSnapshot,
    pub previous_baseline: QuantizedSnapshot,
}

impl ClientSlot {
    fn new() -> Self {
        ClientSlot {
            state: ConnectionState::Disconnected,
            guid: 0,
            connect_sequence: 0,
            address: None,
            last_recv_time: 0.0,
            sync: SyncData::default(),
            bracket: BracketData::default(),
            adjustment: AdjustmentData::default(),
            input: InputWindow::new(),
            baseline: QuantizedSnapshot::default(),
            previous_baseline: QuantizedSnapshot::default(),
        }
    }

    fn reset_for_connect(&mut self, guid: u64, connect_sequence: u16, address: SocketAddr, now: f64) {
        self.state = ConnectionState::Connecting;
        self.guid = guid;
        self.connect_sequence = connect_sequence;
        self.address = Some(address);
        self.last_recv_time = now;
        self.sync = SyncData::default();
        self.bracket = BracketData::default();
        self.adjustment = AdjustmentData::default();
        self.input.clear();
        self.baseline = QuantizedSnapshot::default();
        self.previous_baseline = QuantizedSnapshot::default();
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

pub struct Sessions {
    pub slots: Vec<ClientSlot>,
}

impl Sessions {
    pub fn new() -> Self {
        Sessions {
            slots: (0..MAX_CLIENTS).map(|_| ClientSlot::new()).collect(),
        }
    }

    pub fn find_by_address(&self, address: SocketAddr) -> Option<usize> {
        self.slots.iter().position(|s| s.address == Some(address) && s.state != ConnectionState::Disconnected)
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionReply {
    Accepted,
    Denied,
    Ignored,
}

/// Handles a `ConnectionRequest`, covering first-connect, idempotent re-ACK, and reconnect.
pub fn handle_connection_request(
    sessions: &mut Sessions,
    address: SocketAddr,
    guid: u64,
    connect_sequence: u16,
    now: f64,
) -> ConnectionReply {
    if let Some(slot) = sessions
        .slots
        .iter_mut()
        .find(|s| s.guid == guid && s.address == Some(address) && s.state != ConnectionState::Disconnected)
    {
        if slot.state == ConnectionState::Connecting && slot.connect_sequence == connect_sequence {
            slot.last_recv_time = now;
            return ConnectionReply::Accepted;
        }
        if sequence_greater_than(connect_sequence, slot.connect_sequence) {
            slot.reset_for_connect(guid, connect_sequence, address, now);
            return ConnectionReply::Accepted;
        }
        return ConnectionReply::Ignored;
    }

    if let Some(slot) = sessions.slots.iter_mut().find(|s| s.state == ConnectionState::Disconnected) {
        slot.reset_for_connect(guid, connect_sequence, address, now);
        return ConnectionReply::Accepted;
    }

    ConnectionReply::Denied
}

/// Drops a slot back to `Disconnected` when it has been silent past `TIMEOUT_SECS`.
pub fn check_timeout(slot: &mut ClientSlot, now: f64) -> bool {
    if slot.state != ConnectionState::Disconnected && now - slot.last_recv_time > TIMEOUT_SECS {
        *slot = ClientSlot::new();
        true
    } else {
        false
    }
}

/// One sync-phase sample. Returns `true` exactly when this sample completes the phase.
pub fn process_sync_sample(slot: &mut ClientSlot, server_tick: u64, packet_tick: u64, echoed_sync_offset: u16) -> bool {
    if !slot.sync.syncing {
        return false;
    }

    let oldest = if slot.sync.samples_seen == 0 {
        packet_tick
    } else {
        slot.sync.previous_input_tick + 1
    };

    let candidate = (server_tick + TICKS_PER_SERVER_FRAME).saturating_sub(oldest);
    let candidate = candidate.min(u16::MAX as u64) as u16;
    slot.sync.offset = slot.sync.offset.max(candidate);
    slot.sync.previous_input_tick = packet_tick;
    slot.sync.samples_seen += 1;

    if slot.sync.samples_seen > MAX_SYNC_SAMPLES && echoed_sync_offset == slot.sync.offset {
        slot.sync.syncing = false;
        slot.sync.sequence = slot.sync.sequence.wrapping_add(1);
        slot.bracket.bracketing = true;
        return true;
    }
    false
}

/// Counts consecutive future ticks, starting at `tick + num_inputs`, that already have a window
/// entry — i.e. how far ahead of the requested tick the client's redundant input stream reaches.
pub fn measure_ticks_ahead(window: &InputWindow, tick: u64, num_inputs: u32) -> u32 {
    let mut ahead = 0u32;
    let mut probe = tick + num_inputs as u64;
    while window.get(probe).is_some() {
        ahead += 1;
        probe += 1;
        if ahead as u64 >= INPUT_SLIDING_WINDOW as u64 {
            break;
        }
    }
    ahead
}

/// One bracket-phase sample. Returns `true` exactly when this sample completes the phase.
pub fn process_bracket_sample(slot: &mut ClientSlot, ticks_ahead: u32) -> bool {
    if !slot.bracket.bracketing {
        return false;
    }
    let sample = ticks_ahead.saturating_sub(INPUT_SAFETY as u32);
    slot.bracket.offset = if slot.bracket.samples == 0 {
        sample
    } else {
        slot.bracket.offset.min(sample)
    };
    slot.bracket.samples += 1;

    if slot.bracket.samples >= MAX_BRACKET_SAMPLES {
        slot.bracket.bracketing = false;
        slot.bracket.bracketed = true;
        return true;
    }
    false
}

/// One steady-state adjustment sample. Returns `true` when a new adjustment offset was computed
/// this call (the caller should stamp the outgoing snapshot with the new sequence/offset).
pub fn process_adjustment_sample(slot: &mut ClientSlot, ticks_ahead: u32, echoed_adjustment_sequence: u16) -> bool {
    if echoed_adjustment_sequence == slot.adjustment.sequence {
        slot.adjustment.applied = true;
    }
    if !slot.adjustment.applied {
        return false;
    }

    slot.adjustment.min_ticks_ahead = if slot.adjustment.samples == 0 {
        ticks_ahead as i32
    } else {
        slot.adjustment.min_ticks_ahead.min(ticks_ahead as i32)
    };
    slot.adjustment.samples += 1;

    if slot.adjustment.samples >= MAX_ADJUSTMENT_SAMPLES {
        let raw = slot.adjustment.min_ticks_ahead - INPUT_SAFETY as i32;
        let clamped = raw.clamp(ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX);
        slot.adjustment.offset = -clamped;
        slot.adjustment.sequence = slot.adjustment.sequence.wrapping_add(1);
        slot.adjustment.samples = 0;
        slot.adjustment.min_ticks_ahead = i32::MAX;
        slot.adjustment.applied = false;
        return true;
    }
    false
}

/// Pulls the `TICKS_PER_SERVER_FRAME` inputs starting at `start_tick` out of the slot's window,
/// falling back to the previous tick's input (and bumping the drop counter) on a gap.
pub fn collect_frame_inputs(slot: &mut ClientSlot, start_tick: u64, now: f64) -> Vec<Input> {
    let mut inputs = Vec::with_capacity(TICKS_PER_SERVER_FRAME as usize);
    let mut previous = Input::default();

    for i in 0..TICKS_PER_SERVER_FRAME {
        let tick = start_tick + i;
        let input = match slot.input.get(tick) {
            Some(input) => {
                previous = input;
                input
            }
            None => {
                slot.adjustment.dropped_inputs += 1;
                slot.adjustment.last_drop_time = now;
                if slot.adjustment.dropped_inputs >= RECONNECT_DROPPED_INPUTS {
                    slot.adjustment.reconnect_required = true;
                }
                previous
            }
        };
        inputs.push(input);
    }

    if now - slot.adjustment.last_drop_time > DROP_FORGET_TIME {
        slot.adjustment.dropped_inputs = 0;
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn fresh_connection_request_occupies_a_disconnected_slot() {
        let mut sessions = Sessions::new();
        let reply = handle_connection_request(&mut sessions, addr(1), 0xDEADBEEF, 1, 0.0);
        assert_eq!(reply, ConnectionReply::Accepted);
        assert_eq!(sessions.slots[0].state, ConnectionState::Connecting);
        assert_eq!(sessions.slots[0].guid, 0xDEADBEEF);
    }

    #[test]
    fn duplicate_connection_request_is_idempotent() {
        let mut sessions = Sessions::new();
        handle_connection_request(&mut sessions, addr(1), 1, 1, 0.0);
        let reply = handle_connection_request(&mut sessions, addr(1), 1, 1, 1.0);
        assert_eq!(reply, ConnectionReply::Accepted);
        assert_eq!(sessions.slots[0].last_recv_time, 1.0);
    }

    #[test]
    fn reconnect_wraps_across_sequence_boundary() {
        let mut sessions = Sessions::new();
        handle_connection_request(&mut sessions, addr(1), 1, 65535, 0.0);
        let stale = handle_connection_request(&mut sessions, addr(1), 1, 65534, 1.0);
        assert_eq!(stale, ConnectionReply::Ignored);

        let reconnect = handle_connection_request(&mut sessions, addr(1), 1, 0, 2.0);
        assert_eq!(reconnect, ConnectionReply::Accepted);
        assert_eq!(sessions.slots[0].connect_sequence, 0);
    }

    #[test]
    fn server_is_denied_when_all_slots_are_full() {
        let mut sessions = Sessions::new();
        for i in 0..MAX_CLIENTS {
            let reply = handle_connection_request(&mut sessions, addr(i as u16 + 1), i as u64, 1, 0.0);
            assert_eq!(reply, ConnectionReply::Accepted);
        }
        let reply = handle_connection_request(&mut sessions, addr(9999), 9999, 1, 0.0);
        assert_eq!(reply, ConnectionReply::Denied);
    }

    #[test]
    fn sync_phase_completes_after_max_samples_plus_one() {
        let mut slot = ClientSlot::new();
        slot.sync.syncing = true;
        let mut completed_at = None;
        for sample in 0..(MAX_SYNC_SAMPLES + 2) {
            let tick = sample as u64;
            let server_tick = tick;
            let offset = slot.sync.offset;
            if process_sync_sample(&mut slot, server_tick, tick, offset) {
                completed_at = Some(sample);
                break;
            }
        }
        assert_eq!(completed_at, Some(MAX_SYNC_SAMPLES + 1));
        assert!(!slot.sync.syncing);
        assert!(slot.bracket.bracketing);
    }

    #[test]
    fn timeout_resets_slot_to_disconnected() {
        let mut slot = ClientSlot::new();
        slot.state = ConnectionState::Connected;
        slot.last_recv_time = 0.0;
        assert!(check_timeout(&mut slot, TIMEOUT_SECS + 0.001));
        assert_eq!(slot.state, ConnectionState::Disconnected);
    }

    #[test]
    fn dropped_inputs_trigger_forced_reconnect() {
        let mut slot = ClientSlot::new();
        for tick in 0..RECONNECT_DROPPED_INPUTS as u64 {
            collect_frame_inputs(&mut slot, tick * TICKS_PER_SERVER_FRAME, 0.0);
        }
        assert!(slot.adjustment.reconnect_required);
    }

    #[test]
    fn present_inputs_do_not_count_as_dropped() {
        let mut slot = ClientSlot::new();
        for tick in 0..TICKS_PER_SERVER_FRAME {
            slot.input.set(tick, Input::default());
        }
        collect_frame_inputs(&mut slot, 0, 0.0);
        assert_eq!(slot.adjustment.dropped_inputs, 0);
    }

    #[test]
    fn bracket_offset_takes_the_minimum_sample() {
        let mut slot = ClientSlot::new();
        slot.bracket.bracketing = true;
        process_bracket_sample(&mut slot, 10);
        process_bracket_sample(&mut slot, 3);
        assert_eq!(slot.bracket.offset, 3u32.saturating_sub(INPUT_SAFETY as u32));
    }
}
