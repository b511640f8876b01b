//! Client-side connection and clock-sync state machine: the symmetric peer of
//! `server::session`. Owns the handshake state, the tick offset handed down by the server, and
//! the sliding window of locally gathered inputs that every outgoing packet draws from.

use shared::constants::*;
use shared::packet::Input;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    SendingConnectRequest,
    ConnectionDenied,
    TimedOut,
    Connected,
}

/// A tick-indexed circular buffer of inputs, identical in shape to the server's `InputWindow`: a
/// slot holds a valid entry iff its stored tick equals the tick it was looked up with.
pub struct InputWindow {
    ticks: Vec<u64>,
    inputs: Vec<Input>,
}

impl InputWindow {
    fn new() -> Self {
        InputWindow {
            ticks: vec![u64::MAX; INPUT_SLIDING_WINDOW],
            inputs: vec![Input::default(); INPUT_SLIDING_WINDOW],
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

pub struct ClientSession {
    pub state: ConnectionState,
    pub guid: u64,
    pub connect_sequence: u16,
    pub last_recv_time: f64,

    pub server_tick: u64,
    pub local_tick: u64,

    pub syncing: bool,
    pub ready_to_apply_sync: bool,
    pub synchronized: bool,
    pub sync_offset: u16,
    pub sync_sequence: u16,

    pub bracketing: bool,
    pub adjustment_sequence: u16,

    pub input_ack: u64,
    pub window: InputWindow,
}

impl ClientSession {
    pub fn new() -> Self {
        ClientSession {
            state: ConnectionState::Disconnected,
            guid: 0,
            connect_sequence: 0,
            last_recv_time: 0.0,
            server_tick: 0,
            local_tick: 0,
            syncing: true,
            ready_to_apply_sync: false,
            synchronized: false,
            sync_offset: 0,
            sync_sequence: 0,
            bracketing: false,
            adjustment_sequence: 0,
            input_ack: 0,
            window: InputWindow::new(),
        }
    }

    /// Begins (or restarts, on forced reconnect) the handshake: fresh guid, bumped
    /// `connect_sequence`, and all sync/input state cleared.
    pub fn connect(&mut self, guid: u64, now: f64) {
        self.state = ConnectionState::SendingConnectRequest;
        self.guid = guid;
        self.connect_sequence = self.connect_sequence.wrapping_add(1);
        self.last_recv_time = now;
        self.server_tick = 0;
        self.local_tick = 0;
        self.syncing = true;
        self.ready_to_apply_sync = false;
        self.synchronized = false;
        self.sync_offset = 0;
        self.sync_sequence = 0;
        self.bracketing = false;
        self.adjustment_sequence = 0;
        self.input_ack = 0;
        self.window.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Accepts a matching `ConnectionAccepted`, ignoring one for a stale (guid, connect_sequence)
    /// pair (e.g. a delayed reply to a superseded request).
    pub fn handle_accepted(&mut self, guid: u64, connect_sequence: u16, now: f64) {
        if self.state == ConnectionState::SendingConnectRequest && guid == self.guid && connect_sequence == self.connect_sequence {
            self.state = ConnectionState::Connected;
            self.last_recv_time = now;
        }
    }

    /// Accepts a matching `ConnectionDenied`, ignoring one for a stale (guid, connect_sequence)
    /// pair, the same as `handle_accepted`.
    pub fn handle_denied(&mut self, guid: u64, connect_sequence: u16) {
        if self.state == ConnectionState::SendingConnectRequest && guid == self.guid && connect_sequence == self.connect_sequence {
            self.state = ConnectionState::ConnectionDenied;
        }
    }

    /// Drops to `TimedOut` once silence exceeds `TIMEOUT_SECS`, matching the server's timeout.
    pub fn check_timeout(&mut self, now: f64) -> bool {
        if self.state != ConnectionState::Disconnected
            && self.state != ConnectionState::TimedOut
            && self.state != ConnectionState::ConnectionDenied
            && now - self.last_recv_time > TIMEOUT_SECS
        {
            self.state = ConnectionState::TimedOut;
            true
        } else {
            false
        }
    }

    /// Fills `TICKS_PER_CLIENT_FRAME` consecutive window slots with one sampled input, one per
    /// tick in the client frame just simulated. The window is tick-granular even though input is
    /// sampled at client frame rate, so the server can replay the exact per-tick stream.
    pub fn add_input(&mut self, input: Input) {
        for i in 0..TICKS_PER_CLIENT_FRAME {
            self.window.set(self.local_tick + i, input);
        }
    }

    /// Builds the outgoing input run: up to `MAX_INPUTS_PER_PACKET` entries ending at `tick`,
    /// walking backward and stopping at the first window gap or at an already-acknowledged tick.
    pub fn collect_input_run(&self, tick: u64) -> Vec<Input> {
        let mut run = Vec::new();
        let mut t = tick;
        loop {
            if run.len() >= MAX_INPUTS_PER_PACKET {
                break;
            }
            if t == self.input_ack && !run.is_empty() {
                break;
            }
            let Some(input) = self.window.get(t) else {
                break;
            };
            run.push(input);
            if t == 0 {
                break;
            }
            t -= 1;
        }
        run.reverse();
        run
    }

    /// Applies a received snapshot's header fields, per the "newer than what we've seen"
    /// ordering guarantee: snapshots with `tick <= server_tick` are dropped outright.
    /// `sync_sequence` has no wire representation in `SnapshotPacket`: both ends reset it to the
    /// same value on every (re)connect, so there is nothing to echo back here.
    ///
    /// While bracketing, the server omits `adjustment_sequence`/`adjustment_offset` from the wire
    /// (they decode to their zero default), so the offset is only applied outside bracketing, and
    /// only once per distinct sequence: the comparison is against the field's old value, which
    /// doubles as "last sequence we already applied".
    pub fn apply_snapshot_header(
        &mut self,
        packet_tick: u64,
        server_synchronizing: bool,
        sync_offset: u16,
        bracketing: bool,
        adjustment_sequence: u16,
        adjustment_offset: i32,
        input_ack: u64,
    ) {
        if packet_tick <= self.server_tick {
            return;
        }

        if self.syncing && !server_synchronizing {
            self.ready_to_apply_sync = true;
        } else if !self.syncing && server_synchronizing {
            self.syncing = true;
        }

        self.server_tick = packet_tick;
        self.sync_offset = sync_offset;
        self.bracketing = bracketing;
        if !bracketing && adjustment_sequence != self.adjustment_sequence {
            self.apply_adjustment(adjustment_offset);
        }
        self.adjustment_sequence = adjustment_sequence;
        self.input_ack = input_ack;
    }

    /// Called once per client frame before inputs are sampled: if the server has signalled the
    /// sync offset is ready to apply, snaps `local_tick` forward and leaves the sync phase.
    pub fn apply_ready_sync(&mut self) {
        if self.ready_to_apply_sync {
            self.local_tick = self.server_tick + self.sync_offset as u64;
            self.syncing = false;
            self.ready_to_apply_sync = false;
            self.synchronized = true;
        }
    }

    /// Shifts `local_tick` by a signed adjustment offset from the server: negative skips ticks,
    /// positive repeats them.
    pub fn apply_adjustment(&mut self, offset: i32) {
        if offset >= 0 {
            self.local_tick += offset as u64;
        } else {
            self.local_tick = self.local_tick.saturating_sub((-offset) as u64);
        }
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_assigns_guid_and_bumps_sequence() {
        let mut session = ClientSession::new();
        session.connect(0xDEADBEEF, 0.0);
        assert_eq!(session.state, ConnectionState::SendingConnectRequest);
        assert_eq!(session.guid, 0xDEADBEEF);
        assert_eq!(session.connect_sequence, 1);
    }

    #[test]
    fn accepted_with_matching_pair_connects() {
        let mut session = ClientSession::new();
        session.connect(1, 0.0);
        session.handle_accepted(1, session.connect_sequence, 0.0);
        assert!(session.is_connected());
    }

    #[test]
    fn accepted_for_stale_sequence_is_ignored() {
        let mut session = ClientSession::new();
        session.connect(1, 0.0);
        session.handle_accepted(1, session.connect_sequence.wrapping_sub(1), 0.0);
        assert_eq!(session.state, ConnectionState::SendingConnectRequest);
    }

    #[test]
    fn denied_for_stale_sequence_is_ignored() {
        let mut session = ClientSession::new();
        session.connect(1, 0.0);
        session.handle_denied(1, session.connect_sequence.wrapping_sub(1));
        assert_eq!(session.state, ConnectionState::SendingConnectRequest);
    }

    #[test]
    fn denied_transitions_from_sending_request() {
        let mut session = ClientSession::new();
        session.connect(1, 0.0);
        session.handle_denied(1, session.connect_sequence);
        assert_eq!(session.state, ConnectionState::ConnectionDenied);
    }

    #[test]
    fn silence_past_timeout_marks_timed_out() {
        let mut session = ClientSession::new();
        session.connect(1, 0.0);
        session.handle_accepted(1, session.connect_sequence, 0.0);
        assert!(session.check_timeout(TIMEOUT_SECS + 0.001));
        assert_eq!(session.state, ConnectionState::TimedOut);
    }

    #[test]
    fn add_input_fills_one_client_frame_of_ticks() {
        let mut session = ClientSession::new();
        session.local_tick = 40;
        let input = Input {
            left: true,
            ..Default::default()
        };
        session.add_input(input);
        for i in 0..TICKS_PER_CLIENT_FRAME {
            assert_eq!(session.window.get(40 + i), Some(input));
        }
        assert_eq!(session.window.get(40 + TICKS_PER_CLIENT_FRAME), None);
    }

    #[test]
    fn collect_input_run_stops_at_acknowledged_tick() {
        let mut session = ClientSession::new();
        for tick in 0..10 {
            session.window.set(tick, Input::default());
        }
        session.input_ack = 7;
        let run = session.collect_input_run(9);
        assert_eq!(run.len(), 2);
    }

    #[test]
    fn collect_input_run_stops_at_window_gap() {
        let session_window_start = 100u64;
        let mut session = ClientSession::new();
        for tick in session_window_start..session_window_start + 3 {
            session.window.set(tick, Input::default());
        }
        let run = session.collect_input_run(session_window_start + 2);
        assert_eq!(run.len(), 3);
    }

    #[test]
    fn ready_to_apply_sync_snaps_local_tick_forward() {
        let mut session = ClientSession::new();
        session.server_tick = 1000;
        session.sync_offset = 16;
        session.ready_to_apply_sync = true;
        session.apply_ready_sync();
        assert_eq!(session.local_tick, 1016);
        assert!(session.synchronized);
        assert!(!session.syncing);
    }

    #[test]
    fn apply_snapshot_header_flips_to_ready_when_server_leaves_sync() {
        let mut session = ClientSession::new();
        session.syncing = true;
        session.apply_snapshot_header(1, false, 5, true, 0, 0, 0);
        assert!(session.ready_to_apply_sync);
        assert_eq!(session.sync_offset, 5);
    }

    #[test]
    fn a_new_adjustment_sequence_shifts_local_tick_once() {
        let mut session = ClientSession::new();
        session.syncing = false;
        session.synchronized = true;
        session.server_tick = 10;
        session.local_tick = 1000;

        session.apply_snapshot_header(11, false, 0, false, 1, -4, 0);
        assert_eq!(session.local_tick, 996);

        // Same sequence echoed again (e.g. a retransmitted snapshot): not reapplied.
        session.apply_snapshot_header(12, false, 0, false, 1, -4, 0);
        assert_eq!(session.local_tick, 996);
    }

    #[test]
    fn adjustment_is_not_applied_while_bracketing() {
        let mut session = ClientSession::new();
        session.syncing = false;
        session.synchronized = true;
        session.server_tick = 10;
        session.local_tick = 1000;

        session.apply_snapshot_header(11, false, 0, true, 1, -4, 0);
        assert_eq!(session.local_tick, 1000);
    }

    #[test]
    fn negative_adjustment_skips_local_ticks() {
        let mut session = ClientSession::new();
        session.local_tick = 100;
        session.apply_adjustment(-4);
        assert_eq!(session.local_tick, 96);
    }
}
