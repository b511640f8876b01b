//! The synchronous, tick-driven client loop: non-blocking UDP send/receive, the connection/sync
//! state machine, and delivery of locally sampled input into outgoing packets.
//!
//! As on the server, there are exactly two suspension points: `sleep` for frame pacing and a
//! non-blocking `recv_from`. No background threads are spawned here.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{info, warn};
use rand::Rng;

use shared::constants::*;
use shared::packet::{read_packet, write_packet, ConnectionRequestPacket, Input, InputPacket, Packet};
use shared::snapshot::QuantizedSnapshot;

use crate::session::{ClientSession, ConnectionState};

/// A source of input samples polled once per client frame, abstracting over the platform input
/// sampling this core does not own.
pub trait InputSource {
    fn sample(&mut self) -> Input;
}

pub struct Client {
    socket: UdpSocket,
    server_address: SocketAddr,
    session: ClientSession,
    start: Instant,
    next_frame_time: f64,
}

impl Client {
    pub fn connect(server: &str) -> std::io::Result<Self> {
        let server_address = resolve(server)?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;
        info!("client bound to {}", socket.local_addr()?);

        let mut session = ClientSession::new();
        let guid = rand::thread_rng().gen::<u64>();
        session.connect(guid, 0.0);

        Ok(Client {
            socket,
            server_address,
            session,
            start: Instant::now(),
            next_frame_time: 0.0,
        })
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// Runs until `quit` is set or the session leaves a connectable state (denied/timed out).
    pub fn run(&mut self, quit: &AtomicBool, inputs: &mut dyn InputSource) -> std::io::Result<()> {
        self.next_frame_time = self.now();
        while !quit.load(Ordering::Relaxed) {
            self.run_one_frame(inputs);
            if matches!(self.session.state, ConnectionState::ConnectionDenied | ConnectionState::TimedOut) {
                break;
            }
        }
        Ok(())
    }

    fn run_one_frame(&mut self, inputs: &mut dyn InputSource) {
        let now = self.now();
        let sleep_for = (self.next_frame_time - now - AVG_SLEEP_JITTER).max(0.0);
        if sleep_for > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(sleep_for));
        }

        let now = self.now();
        self.drain_socket(now);
        if self.session.check_timeout(now) {
            warn!("server silent past timeout, giving up");
        }

        match self.session.state {
            ConnectionState::SendingConnectRequest => self.send_connect_request(),
            ConnectionState::Connected => self.step_connected_frame(inputs),
            _ => {}
        }

        self.next_frame_time += CLIENT_FRAME_DT;
        let mut dropped = 0u32;
        while self.next_frame_time < now - SERVER_FRAME_SAFETY * CLIENT_FRAME_DT {
            self.next_frame_time += CLIENT_FRAME_DT;
            dropped += 1;
        }
        if dropped > 0 {
            warn!("dropped {dropped} client frame(s)");
        }
    }

    fn step_connected_frame(&mut self, inputs: &mut dyn InputSource) {
        self.session.apply_ready_sync();
        if !self.session.syncing {
            let sample = inputs.sample();
            self.session.add_input(sample);
        }
        self.send_input_packet();
        self.session.local_tick += TICKS_PER_CLIENT_FRAME;
    }

    fn drain_socket(&mut self, now: f64) {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, from)) if from == self.server_address => self.handle_datagram(&buffer[..len], now),
                Ok(_) => continue,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("socket recv error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], now: f64) {
        let empty = QuantizedSnapshot::default();
        let Some(packet) = read_packet(data, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) else {
            return;
        };
        self.session.last_recv_time = now;

        match packet {
            Packet::ConnectionAccepted(p) => {
                self.session.handle_accepted(p.client_guid, p.connect_sequence, now);
                if self.session.is_connected() {
                    info!("connected, guid={:#x}", p.client_guid);
                }
            }
            Packet::ConnectionDenied(p) => {
                self.session.handle_denied(p.client_guid, p.connect_sequence);
                info!("connection denied");
            }
            Packet::Snapshot(p) => {
                if self.session.is_connected() {
                    if p.reconnect {
                        info!("server requested reconnect");
                        let guid = self.session.guid;
                        self.session.connect(guid, now);
                        return;
                    }
                    self.session.apply_snapshot_header(
                        p.tick,
                        p.synchronizing,
                        p.sync_offset,
                        p.bracketing,
                        p.adjustment_sequence,
                        p.adjustment_offset,
                        p.input_ack,
                    );
                }
            }
            _ => {}
        }
    }

    fn send_connect_request(&mut self) {
        let mut packet = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_guid: self.session.guid,
            connect_sequence: self.session.connect_sequence,
        });
        self.send_packet(&mut packet);
    }

    fn send_input_packet(&mut self) {
        let tick = self.session.local_tick + TICKS_PER_CLIENT_FRAME - 1;
        let input_packet = if self.session.syncing {
            InputPacket {
                synchronizing: true,
                sync_offset: self.session.sync_offset,
                sync_sequence: self.session.sync_sequence,
                tick,
                ..Default::default()
            }
        } else {
            InputPacket {
                synchronizing: false,
                tick,
                bracketed: self.session.bracketing,
                adjustment_sequence: self.session.adjustment_sequence,
                inputs: self.session.collect_input_run(tick),
                ..Default::default()
            }
        };
        self.send_packet(&mut Packet::Input(input_packet));
    }

    fn send_packet(&self, packet: &mut Packet) {
        let empty = QuantizedSnapshot::default();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        if let Some(written) = write_packet(&mut buffer, packet, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
            let _ = self.socket.send_to(&buffer[..written], self.server_address);
        }
    }
}

fn resolve(server: &str) -> std::io::Result<SocketAddr> {
    server
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("could not resolve {server}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::packet::ConnectionAcceptedPacket;
    use std::net::UdpSocket as StdUdpSocket;

    struct NoInput;
    impl InputSource for NoInput {
        fn sample(&mut self) -> Input {
            Input::default()
        }
    }

    #[test]
    fn connect_request_is_sent_while_sending_connect_request() {
        let server = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_nonblocking(true).unwrap();
        let mut client = Client::connect(&server.local_addr().unwrap().to_string()).unwrap();

        client.send_connect_request();

        std::thread::sleep(Duration::from_millis(20));
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, from) = server.recv_from(&mut buffer).expect("expected a connect request");
        let empty = QuantizedSnapshot::default();
        let guid = match read_packet(&buffer[..len], &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
            Some(Packet::ConnectionRequest(p)) => {
                assert_eq!(p.client_guid, client.session.guid);
                assert_eq!(p.connect_sequence, 1);
                p.client_guid
            }
            _ => panic!("expected ConnectionRequest"),
        };

        let mut reply = Packet::ConnectionAccepted(ConnectionAcceptedPacket {
            client_guid: guid,
            connect_sequence: 1,
        });
        let mut out = [0u8; MAX_PACKET_SIZE];
        let written = write_packet(&mut out, &mut reply, &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX).unwrap();
        server.send_to(&out[..written], from).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        client.drain_socket(0.0);
        assert!(client.session.is_connected());
    }

    #[test]
    fn connected_frame_sends_an_input_packet() {
        let server = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_nonblocking(true).unwrap();
        let mut client = Client::connect(&server.local_addr().unwrap().to_string()).unwrap();
        client.session.state = ConnectionState::Connected;
        client.session.syncing = false;

        client.step_connected_frame(&mut NoInput);

        std::thread::sleep(Duration::from_millis(20));
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = server.recv_from(&mut buffer).expect("expected an input packet");
        let empty = QuantizedSnapshot::default();
        match read_packet(&buffer[..len], &empty, &empty, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
            Some(Packet::Input(p)) => assert!(!p.synchronizing),
            _ => panic!("expected Input packet"),
        }
    }
}
