//! Codec size sanity checks: worst-case wire sizes stay inside `MAX_PACKET_SIZE`, and the
//! index/bitmap mode switch at the `NUM_CUBES` threshold picks the smaller encoding.

use shared::constants::*;
use shared::packet::{read_packet, write_packet, Input, InputPacket, Packet, SnapshotPacket};
use shared::snapshot::QuantizedSnapshot;

fn snapshot_with_n_changed(n: usize) -> QuantizedSnapshot {
    let mut snapshot = QuantizedSnapshot::default();
    for i in 0..n.min(NUM_CUBES) {
        snapshot.cubes[i].position = (i as i32 % 100, 1, 2);
    }
    snapshot
}

#[test]
fn fully_changed_snapshot_fits_in_one_datagram() {
    let baseline = QuantizedSnapshot::default();
    let current = snapshot_with_n_changed(NUM_CUBES);

    let mut packet = Packet::Snapshot(SnapshotPacket {
        synchronizing: false,
        tick: 1,
        input_ack: 0,
        snapshot: current,
        ..Default::default()
    });
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let written = write_packet(&mut buffer, &mut packet, &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX)
        .expect("a fully-changed snapshot must still fit in MAX_PACKET_SIZE");
    assert!(written <= MAX_PACKET_SIZE);
}

#[test]
fn sparse_changes_cost_less_than_bitmap_mode_worst_case() {
    let baseline = QuantizedSnapshot::default();
    let sparse = snapshot_with_n_changed(4);

    let mut packet = Packet::Snapshot(SnapshotPacket {
        synchronizing: false,
        tick: 1,
        input_ack: 0,
        snapshot: sparse,
        ..Default::default()
    });
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let written = write_packet(&mut buffer, &mut packet, &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX)
        .expect("sparse snapshot should fit");

    let bitmap_worst_case = NUM_CUBES / 8 + NUM_CUBES * 4;
    assert!(written < bitmap_worst_case, "index mode should beat a full bitmap scan for 4 changed cubes");
}

#[test]
fn boundary_256_changed_cubes_round_trips() {
    let baseline = QuantizedSnapshot::default();
    let current = snapshot_with_n_changed(256);

    let mut packet = Packet::Snapshot(SnapshotPacket {
        synchronizing: false,
        tick: 1,
        input_ack: 0,
        snapshot: current.clone(),
        ..Default::default()
    });
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let written = write_packet(&mut buffer, &mut packet, &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX)
        .expect("256-changed boundary snapshot should fit");

    match read_packet(&buffer[..written], &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX) {
        Some(Packet::Snapshot(decoded)) => {
            for i in 0..256 {
                assert_eq!(decoded.snapshot.cubes[i].position, current.cubes[i].position);
            }
        }
        _ => panic!("expected Snapshot packet"),
    }
}

#[test]
fn max_inputs_per_packet_fits_comfortably_under_the_datagram_limit() {
    let baseline = QuantizedSnapshot::default();
    let mut inputs = Vec::new();
    for i in 0..MAX_INPUTS_PER_PACKET {
        inputs.push(Input {
            left: i % 2 == 0,
            ..Default::default()
        });
    }

    let mut packet = Packet::Input(InputPacket {
        synchronizing: false,
        tick: 1000,
        inputs,
        ..Default::default()
    });
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    let written = write_packet(&mut buffer, &mut packet, &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX)
        .expect("a maximal input packet should fit");
    assert!(written < MAX_PACKET_SIZE / 8, "input packets should be tiny relative to the datagram limit");
}

#[test]
fn encoding_a_thousand_sparse_snapshots_completes_quickly() {
    let baseline = QuantizedSnapshot::default();
    let current = snapshot_with_n_changed(10);
    let start = std::time::Instant::now();

    for _ in 0..1000 {
        let mut packet = Packet::Snapshot(SnapshotPacket {
            synchronizing: false,
            tick: 1,
            input_ack: 0,
            snapshot: current.clone(),
            ..Default::default()
        });
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        write_packet(&mut buffer, &mut packet, &baseline, &baseline, ADJUSTMENT_OFFSET_MIN, ADJUSTMENT_OFFSET_MAX).unwrap();
    }

    let elapsed = start.elapsed();
    assert!(elapsed.as_millis() < 2000, "1000 snapshot encodes took {elapsed:?}, expected well under server frame budget");
}
