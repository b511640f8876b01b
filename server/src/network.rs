//! The synchronous, tick-driven server loop: non-blocking UDP receive, per-client session/sync
//! bookkeeping, a fixed-tick simulator step, authority resolution, and snapshot dispatch.
//!
//! There are exactly two suspension points, matching the budget in the design notes: `sleep` for
//! frame pacing and a non-blocking `recv_from` that returns immediately when no datagram is
//! pending. No background threads are spawned here.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{info, warn};

use shared::authority::{resolve_authority, AuthorityState};
use shared::constants::*;
use shared::entity::EntityManager;
use shared::packet::{
    read_packet, write_packet, ConnectionAcceptedPacket, ConnectionDeniedPacket, Input, Packet,
    SnapshotPacket,
};
use shared::physics::{BodyState, Simulator};
use shared::snapshot::{CompressedQuaternion, QuantizedCubeState, QuantizedSnapshot};

use crate::session::{
    check_timeout, collect_frame_inputs, handle_connection_request, measure_ticks_ahead,
    process_adjustment_sample, process_bracket_sample, process_sync_sample, ConnectionReply,
    ConnectionState, Sessions,
};

pub struct Server {
    socket: UdpSocket,
    sessions: Sessions,
    entities: EntityManager,
    simulator: Box<dyn Simulator>,
    authority: AuthorityState,
    tick: u64,
    start: Instant,
    next_frame_time: f64,
}

impl Server {
    pub fn bind(port: u16, simulator: Box<dyn Simulator>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        info!("server listening on port {port}");
        Ok(Server {
            socket,
            sessions: Sessions::new(),
            entities: EntityManager::new(),
            simulator,
            authority: AuthorityState::new(MAX_ENTITIES),
            tick: 0,
            start: Instant::now(),
            next_frame_time: 0.0,
        })
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Runs until `quit` is set. `quit` is checked once per frame, matching the spec's
    /// flag-based cancellation (no operation is preemptable mid-frame).
    pub fn run(&mut self, quit: &AtomicBool) -> std::io::Result<()> {
        self.next_frame_time = self.now();
        while !quit.load(Ordering::Relaxed) {
            self.run_one_frame();
        }
        Ok(())
    }

    fn run_one_frame(&mut self) {
        let now = self.now();
        let sleep_for = (self.next_frame_time - now - AVG_SLEEP_JITTER).max(0.0);
        if sleep_for > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(sleep_for));
        }

        let now = self.now();
        self.drain_socket(now);
        self.check_timeouts(now);
        self.step_frame(now);

        self.next_frame_time += SERVER_FRAME_DT;
        let mut dropped = 0u32;
        while self.next_frame_time < now - SERVER_FRAME_SAFETY * SERVER_FRAME_DT {
            self.next_frame_time += SERVER_FRAME_DT;
            dropped += 1;
        }
        if dropped > 0 {
            warn!("dropped {dropped} server frame(s)");
        }
    }

    fn check_timeouts(&mut self, now: f64) {
        for (index, slot) in self.sessions.slots.iter_mut().enumerate() {
            if check_timeout(slot, now) {
                info!("client slot {index} timed out");
            }
        }
    }

    fn drain_socket(&mut self, now: f64) {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, from)) => self.handle_datagram(&buffer[..len], from, now),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("socket recv error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, now: f64) {
        let empty = QuantizedSnapshot::default();
        let Some(packet) = read_packet(data, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) else {
            return;
        };

        match packet {
            Packet::ConnectionRequest(p) => {
                let reply = handle_connection_request(&mut self.sessions, from, p.client_guid, p.connect_sequence, now);
                self.send_connection_reply(reply, from, p.client_guid, p.connect_sequence);
            }
            Packet::Input(p) => self.handle_input_packet(from, p, now),
            _ => {}
        }
    }

    fn send_connection_reply(&self, reply: ConnectionReply, to: SocketAddr, guid: u64, connect_sequence: u16) {
        let mut packet = match reply {
            ConnectionReply::Accepted => Packet::ConnectionAccepted(ConnectionAcceptedPacket {
                client_guid: guid,
                connect_sequence,
            }),
            ConnectionReply::Denied => Packet::ConnectionDenied(ConnectionDeniedPacket {
                client_guid: guid,
                connect_sequence,
            }),
            ConnectionReply::Ignored => return,
        };
        self.send_packet(&mut packet, to);
    }

    fn handle_input_packet(&mut self, from: SocketAddr, packet: shared::packet::InputPacket, now: f64) {
        let Some(index) = self.sessions.find_by_address(from) else {
            return;
        };
        let server_tick = self.tick;
        let slot = &mut self.sessions.slots[index];
        slot.last_recv_time = now;
        if slot.state == ConnectionState::Connecting {
            slot.state = ConnectionState::Connected;
            info!("client slot {index} connected");
        }

        if packet.synchronizing {
            if packet.sync_sequence == slot.sync.sequence && process_sync_sample(slot, server_tick, packet.tick, packet.sync_offset) {
                info!("client slot {index} finished clock sync");
            }
            return;
        }

        let count = packet.inputs.len() as u64;
        if count > 0 {
            let base_tick = packet.tick + 1 - count;
            for (i, input) in packet.inputs.iter().enumerate() {
                slot.input.set(base_tick + i as u64, *input);
            }
        }

        let ticks_ahead = measure_ticks_ahead(&slot.input, packet.tick, count as u32);
        if slot.bracket.bracketing {
            if process_bracket_sample(slot, ticks_ahead) {
                info!("client slot {index} finished bracket phase");
            }
        } else if slot.bracket.bracketed {
            process_adjustment_sample(slot, ticks_ahead, packet.adjustment_sequence);
        }
    }

    fn step_frame(&mut self, now: f64) {
        for index in 0..self.sessions.slots.len() {
            if !self.sessions.slots[index].is_connected() {
                continue;
            }
            let start_tick = self.tick;
            let slot = &mut self.sessions.slots[index];
            let inputs = collect_frame_inputs(slot, start_tick, now);
            self.apply_inputs(index, &inputs);
        }

        for i in 0..TICKS_PER_SERVER_FRAME {
            self.simulator.step(self.tick + i, now, 1.0 / TICK_HZ as f64, false);
        }
        self.tick += TICKS_PER_SERVER_FRAME;

        self.run_authority_pass();
        self.dispatch_snapshots();
    }

    /// Input is handed to the solver's force/torque API, which maps gameplay semantics (what
    /// "left" means for a given entity) to physical effect. That mapping is game logic, not part
    /// of this netcode core, so this only acknowledges delivery.
    fn apply_inputs(&mut self, _slot_index: usize, _inputs: &[Input]) {}

    fn run_authority_pass(&mut self) {
        let mut contacts = Vec::new();
        let mut active = vec![false; MAX_ENTITIES];
        for index in 0..MAX_ENTITIES {
            if let Some(entity) = self.entities.get(index) {
                if let Some(body_index) = entity.physics_index {
                    let state = self.simulator.get_state(body_index);
                    active[index] = state.active;
                    for neighbour in self.simulator.object_interactions(body_index) {
                        if neighbour > index {
                            contacts.push((index, neighbour));
                        }
                    }
                }
            }
        }
        resolve_authority(&mut self.authority, &contacts, &active, MAX_PLAYERS as u32, 1.0 / SERVER_HZ as f64);
    }

    fn dispatch_snapshots(&mut self) {
        let snapshot = self.build_snapshot();
        for index in 0..self.sessions.slots.len() {
            if !self.sessions.slots[index].is_connected() {
                continue;
            }
            self.send_snapshot_to(index, &snapshot);
        }
    }

    fn build_snapshot(&self) -> QuantizedSnapshot {
        let mut snapshot = QuantizedSnapshot::default();
        for index in 0..MAX_ENTITIES {
            let Some(entity) = self.entities.get(index) else {
                continue;
            };
            let Some(body_index) = entity.physics_index else {
                continue;
            };
            let state = self.simulator.get_state(body_index);
            snapshot.cubes[index] = quantize_state(&state, self.authority.authority_of(index) != 0);
        }
        snapshot
    }

    fn send_snapshot_to(&mut self, index: usize, snapshot: &QuantizedSnapshot) {
        let address = self.sessions.slots[index].address;
        let Some(address) = address else { return };

        let slot = &mut self.sessions.slots[index];
        let packet = SnapshotPacket {
            synchronizing: slot.sync.syncing,
            sync_offset: slot.sync.offset,
            reconnect: slot.adjustment.reconnect_required,
            bracketing: slot.bracket.bracketing,
            bracket_offset: slot.bracket.offset as u16,
            adjustment_sequence: slot.adjustment.sequence,
            adjustment_offset: slot.adjustment.offset,
            tick: self.tick,
            input_ack: self.tick,
            snapshot: snapshot.clone(),
        };
        slot.adjustment.reconnect_required = false;
        slot.previous_baseline = slot.baseline.clone();
        slot.baseline = snapshot.clone();
        let baseline = slot.baseline.clone();
        let previous_baseline = slot.previous_baseline.clone();

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        if let Some(written) = write_packet(
            &mut buffer,
            &mut Packet::Snapshot(packet),
            &baseline,
            &previous_baseline,
            ADJUSTMENT_OFFSET_MIN,
            ADJUSTMENT_OFFSET_MAX,
        ) {
            let _ = self.socket.send_to(&buffer[..written], address);
        }
    }

    fn send_packet(&self, packet: &mut Packet, to: SocketAddr) {
        let empty = QuantizedSnapshot::default();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        if let Some(written) = write_packet(&mut buffer, packet, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
            let _ = self.socket.send_to(&buffer[..written], to);
        }
    }
}

fn quantize_state(state: &BodyState, interacting: bool) -> QuantizedCubeState {
    let to_units = |v: f32| (v * UNITS_PER_METER as f32).round() as i32;
    let (x, y, z) = state.position;
    let (qx, qy, qz, qw) = state.orientation;
    QuantizedCubeState {
        interacting,
        position: (to_units(x), to_units(y), to_units(z)),
        orientation: CompressedQuaternion::compress(qx, qy, qz, qw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::StubSimulator;
    use shared::packet::{ConnectionRequestPacket, InputPacket};
    use std::net::UdpSocket as StdUdpSocket;

    fn fresh_server() -> Server {
        Server::bind(0, Box::new(StubSimulator::default())).unwrap()
    }

    fn send(socket: &StdUdpSocket, to: SocketAddr, packet: &mut Packet) {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let empty = QuantizedSnapshot::default();
        let written = write_packet(&mut buffer, packet, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX).unwrap();
        socket.send_to(&buffer[..written], to).unwrap();
    }

    #[test]
    fn connection_request_yields_accepted_reply() {
        let mut server = fresh_server();
        let server_addr = server.socket.local_addr().unwrap();
        let client = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_nonblocking(true).unwrap();

        send(
            &client,
            server_addr,
            &mut Packet::ConnectionRequest(ConnectionRequestPacket {
                client_guid: 0xDEADBEEF,
                connect_sequence: 1,
            }),
        );

        std::thread::sleep(Duration::from_millis(20));
        server.drain_socket(0.0);

        assert_eq!(server.sessions.slots[0].state, ConnectionState::Connecting);

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = client.recv_from(&mut buffer).expect("expected a reply datagram");
        let empty = QuantizedSnapshot::default();
        match read_packet(&buffer[..len], &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
            Some(Packet::ConnectionAccepted(p)) => {
                assert_eq!(p.client_guid, 0xDEADBEEF);
                assert_eq!(p.connect_sequence, 1);
            }
            _ => panic!("expected ConnectionAccepted"),
        }
    }

    #[test]
    fn first_input_packet_connects_the_slot() {
        let mut server = fresh_server();
        let client_addr: SocketAddr = "127.0.0.1:9".parse().unwrap();

        handle_connection_request(&mut server.sessions, client_addr, 1, 1, 0.0);

        server.handle_input_packet(
            client_addr,
            InputPacket {
                synchronizing: true,
                sync_offset: 0,
                sync_sequence: 0,
                tick: 0,
                ..Default::default()
            },
            0.0,
        );

        assert_eq!(server.sessions.slots[0].state, ConnectionState::Connected);
    }
}
