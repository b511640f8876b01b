//! Quantized rigid-body snapshot encoding: per-cube position/orientation compression and
//! whole-snapshot delta-against-baseline framing.

use crate::bitcodec::{signed_to_unsigned, unsigned_to_signed};
use crate::constants::{NUM_CUBES, ORIENTATION_BITS};
use crate::stream::{serialize_int, serialize_uint, Stream};

const POSITION_SMALL_LIMIT: u32 = 15;
const POSITION_RANGE_BITS: [u32; 3] = [5, 6, 7];
const POSITION_MAX_DELTA: i32 = 2047;

const ORIENTATION_SMALL_LIMIT: u32 = 3;
const ORIENTATION_RANGE_BITS: [u32; 3] = [4, 5, 7];

const GRAVITY: i32 = 3;
const GROUND_LIMIT: i32 = 105;
const DRAG_FACTOR: f64 = 0.0625;

fn unsigned_range_limit(range_bits: &[u32]) -> u32 {
    range_bits.iter().map(|b| 1u32 << b).sum()
}

/// Ladder of exclusive ranges, each narrower than a flat encoding of the whole span. Used both
/// for position deltas (three ranges) and orientation deltas (three ranges, different widths).
fn serialize_unsigned_range<S: Stream>(stream: &mut S, value: &mut u32, range_bits: &[u32]) {
    let mut range_min: u32 = 0;
    for (i, &bits) in range_bits.iter().enumerate().take(range_bits.len() - 1) {
        let range_max = range_min + ((1u32 << bits) - 1);
        let mut in_range = S::is_writing() && *value <= range_max;
        stream.serialize_bool(&mut in_range);
        if in_range {
            serialize_uint(stream, value, range_min, range_max);
            return;
        }
        range_min += 1u32 << bits;
    }
    let last_bits = *range_bits.last().unwrap();
    let range_max = range_min + ((1u32 << last_bits) - 1);
    serialize_uint(stream, value, range_min, range_max);
}

/// Encodes a position as a delta against a prediction derived from `base` plus the baseline's
/// own recent motion (`base_delta`), so well-behaved constant-velocity motion costs almost
/// nothing on the wire.
pub fn serialize_relative_position<S: Stream>(
    stream: &mut S,
    position: &mut (i32, i32, i32),
    base: (i32, i32, i32),
) {
    let large_limit = unsigned_range_limit(&POSITION_RANGE_BITS);

    let mut dx;
    let mut dy;
    let mut dz;
    let mut all_small = false;
    let mut too_large = false;

    if S::is_writing() {
        dx = signed_to_unsigned(position.0 - base.0);
        dy = signed_to_unsigned(position.1 - base.1);
        dz = signed_to_unsigned(position.2 - base.2);
        all_small = dx <= POSITION_SMALL_LIMIT && dy <= POSITION_SMALL_LIMIT && dz <= POSITION_SMALL_LIMIT;
        too_large = dx >= large_limit || dy >= large_limit || dz >= large_limit;
    } else {
        dx = 0;
        dy = 0;
        dz = 0;
    }

    stream.serialize_bool(&mut all_small);

    if all_small {
        serialize_uint(stream, &mut dx, 0, POSITION_SMALL_LIMIT);
        serialize_uint(stream, &mut dy, 0, POSITION_SMALL_LIMIT);
        serialize_uint(stream, &mut dz, 0, POSITION_SMALL_LIMIT);
    } else {
        stream.serialize_bool(&mut too_large);
        if !too_large {
            serialize_unsigned_range(stream, &mut dx, &POSITION_RANGE_BITS);
            serialize_unsigned_range(stream, &mut dy, &POSITION_RANGE_BITS);
            serialize_unsigned_range(stream, &mut dz, &POSITION_RANGE_BITS);
        } else {
            let mut idx = dx as i32;
            let mut idy = dy as i32;
            let mut idz = dz as i32;
            serialize_int(stream, &mut idx, 0, POSITION_MAX_DELTA);
            serialize_int(stream, &mut idy, 0, POSITION_MAX_DELTA);
            serialize_int(stream, &mut idz, 0, POSITION_MAX_DELTA);
            dx = idx as u32;
            dy = idy as u32;
            dz = idz as u32;
        }
    }

    if S::is_reading() {
        *position = (
            base.0 + unsigned_to_signed(dx),
            base.1 + unsigned_to_signed(dy),
            base.2 + unsigned_to_signed(dz),
        );
    }
}

fn drag(base_delta: i32) -> i32 {
    -((base_delta as f64 * DRAG_FACTOR).ceil() as i32)
}

/// The encoder and decoder compute the identical predicted position from `base` plus the
/// baseline's own recent per-axis drift (`base_delta`) before delta-coding against it, so the
/// on-wire value is `current - prediction` rather than `current - base`.
fn predict_position(base: (i32, i32, i32), base_delta: (i32, i32, i32)) -> (i32, i32, i32) {
    let drag_x = drag(base_delta.0);
    let drag_y = drag(base_delta.1);
    let drag_z = drag(base_delta.2);
    (
        base.0 + base_delta.0 + drag_x,
        base.1 + base_delta.1 + drag_y,
        (base.2 + base_delta.2 - GRAVITY + drag_z).max(GROUND_LIMIT),
    )
}

/// Smallest-three compressed quaternion: the component with the largest absolute magnitude is
/// omitted and reconstructed via the unit-length constraint; its sign is canonicalized to be
/// non-negative so the remaining three components uniquely determine it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressedQuaternion {
    pub largest: u8,
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl CompressedQuaternion {
    const MINIMUM: f32 = -1.0 / std::f32::consts::SQRT_2;
    const MAXIMUM: f32 = 1.0 / std::f32::consts::SQRT_2;

    pub fn compress(x: f32, y: f32, z: f32, w: f32) -> Self {
        let scale = ((1u32 << ORIENTATION_BITS) - 1) as f32;

        let components = [x.abs(), y.abs(), z.abs(), w.abs()];
        let mut largest = 0usize;
        let mut largest_value = components[0];
        for (i, &v) in components.iter().enumerate().skip(1) {
            if v > largest_value {
                largest = i;
                largest_value = v;
            }
        }

        let (a, b, c) = match largest {
            0 => {
                if x >= 0.0 {
                    (y, z, w)
                } else {
                    (-y, -z, -w)
                }
            }
            1 => {
                if y >= 0.0 {
                    (x, z, w)
                } else {
                    (-x, -z, -w)
                }
            }
            2 => {
                if z >= 0.0 {
                    (x, y, w)
                } else {
                    (-x, -y, -w)
                }
            }
            3 => {
                if w >= 0.0 {
                    (x, y, z)
                } else {
                    (-x, -y, -z)
                }
            }
            _ => unreachable!(),
        };

        let quantize = |v: f32| -> u32 {
            let normal = (v - Self::MINIMUM) / (Self::MAXIMUM - Self::MINIMUM);
            (normal * scale + 0.5).floor() as u32
        };

        CompressedQuaternion {
            largest: largest as u8,
            a: quantize(a),
            b: quantize(b),
            c: quantize(c),
        }
    }

    /// Reconstructs a unit quaternion. The caller should treat the result as already normalized
    /// within quantization error; it is not re-normalized here, matching the source's contract.
    pub fn decompress(&self) -> (f32, f32, f32, f32) {
        let scale = ((1u32 << ORIENTATION_BITS) - 1) as f32;
        let inverse_scale = 1.0 / scale;
        let dequantize = |v: u32| -> f32 {
            v as f32 * inverse_scale * (Self::MAXIMUM - Self::MINIMUM) + Self::MINIMUM
        };

        let a = dequantize(self.a);
        let b = dequantize(self.b);
        let c = dequantize(self.c);
        let largest_component = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();

        match self.largest {
            0 => (largest_component, a, b, c),
            1 => (a, largest_component, b, c),
            2 => (a, b, largest_component, c),
            3 => (a, b, c, largest_component),
            _ => unreachable!(),
        }
    }

    pub fn serialize<S: Stream>(&mut self, stream: &mut S) {
        let mut largest = self.largest as u32;
        stream.serialize_bits(&mut largest, 2);
        stream.serialize_bits(&mut self.a, ORIENTATION_BITS);
        stream.serialize_bits(&mut self.b, ORIENTATION_BITS);
        stream.serialize_bits(&mut self.c, ORIENTATION_BITS);
        self.largest = largest as u8;
    }
}

/// A `relative` bit indicates the largest-component index matches the baseline and every
/// per-component delta fits the range ladder; full verbatim encoding is the fallback.
pub fn serialize_relative_orientation<S: Stream>(
    stream: &mut S,
    orientation: &mut CompressedQuaternion,
    base: &CompressedQuaternion,
) {
    let large_limit = unsigned_range_limit(&ORIENTATION_RANGE_BITS);

    let mut da = 0u32;
    let mut db = 0u32;
    let mut dc = 0u32;
    let mut all_small = false;
    let mut relative = false;

    if S::is_writing() && orientation.largest == base.largest {
        da = signed_to_unsigned(orientation.a as i32 - base.a as i32);
        db = signed_to_unsigned(orientation.b as i32 - base.b as i32);
        dc = signed_to_unsigned(orientation.c as i32 - base.c as i32);
        all_small = da <= ORIENTATION_SMALL_LIMIT && db <= ORIENTATION_SMALL_LIMIT && dc <= ORIENTATION_SMALL_LIMIT;
        relative = da < large_limit && db < large_limit && dc < large_limit;
    }

    stream.serialize_bool(&mut relative);

    if relative {
        stream.serialize_bool(&mut all_small);
        if all_small {
            serialize_uint(stream, &mut da, 0, ORIENTATION_SMALL_LIMIT);
            serialize_uint(stream, &mut db, 0, ORIENTATION_SMALL_LIMIT);
            serialize_uint(stream, &mut dc, 0, ORIENTATION_SMALL_LIMIT);
        } else {
            serialize_unsigned_range(stream, &mut da, &ORIENTATION_RANGE_BITS);
            serialize_unsigned_range(stream, &mut db, &ORIENTATION_RANGE_BITS);
            serialize_unsigned_range(stream, &mut dc, &ORIENTATION_RANGE_BITS);
        }
        if S::is_reading() {
            orientation.largest = base.largest;
            orientation.a = (base.a as i32 + unsigned_to_signed(da)) as u32;
            orientation.b = (base.b as i32 + unsigned_to_signed(db)) as u32;
            orientation.c = (base.c as i32 + unsigned_to_signed(dc)) as u32;
        }
    } else {
        orientation.serialize(stream);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantizedCubeState {
    pub interacting: bool,
    pub position: (i32, i32, i32),
    pub orientation: CompressedQuaternion,
}

impl Default for QuantizedCubeState {
    fn default() -> Self {
        QuantizedCubeState {
            interacting: false,
            position: (0, 0, 0),
            orientation: CompressedQuaternion {
                largest: 0,
                a: 0,
                b: 0,
                c: 0,
            },
        }
    }
}

#[derive(Clone)]
pub struct QuantizedSnapshot {
    pub cubes: Vec<QuantizedCubeState>,
}

impl Default for QuantizedSnapshot {
    fn default() -> Self {
        QuantizedSnapshot {
            cubes: vec![QuantizedCubeState::default(); NUM_CUBES],
        }
    }
}

/// Per-axis drift of the baseline snapshot relative to the baseline before it, used to predict
/// constant-velocity motion when delta-coding every cube against this baseline this frame.
#[derive(Clone)]
pub struct CompressionState {
    pub delta: Vec<(i32, i32, i32)>,
}

pub fn calculate_compression_state(
    baseline: &QuantizedSnapshot,
    previous_baseline: &QuantizedSnapshot,
) -> CompressionState {
    let delta = baseline
        .cubes
        .iter()
        .zip(previous_baseline.cubes.iter())
        .map(|(cur, prev)| {
            (
                cur.position.0 - prev.position.0,
                cur.position.1 - prev.position.1,
                cur.position.2 - prev.position.2,
            )
        })
        .collect();
    CompressionState { delta }
}

fn serialize_cube_relative_to_base<S: Stream>(
    stream: &mut S,
    cube: &mut QuantizedCubeState,
    base: &QuantizedCubeState,
    base_delta: (i32, i32, i32),
) {
    stream.serialize_bool(&mut cube.interacting);

    let mut position_changed = if S::is_writing() {
        cube.position != base.position
    } else {
        false
    };
    stream.serialize_bool(&mut position_changed);

    if position_changed {
        let prediction = predict_position(base.position, base_delta);
        serialize_relative_position(stream, &mut cube.position, prediction);
    } else if S::is_reading() {
        cube.position = base.position;
    }

    serialize_relative_orientation(stream, &mut cube.orientation, &base.orientation);
}

fn relative_index_bits_for_difference(difference: u32) -> u32 {
    match difference {
        1 => 1,
        2..=6 => 1 + 1 + 2,
        7..=14 => 1 + 1 + 1 + 3,
        15..=30 => 1 + 1 + 1 + 1 + 4,
        31..=62 => 1 + 1 + 1 + 1 + 1 + 5,
        63..=126 => 1 + 1 + 1 + 1 + 1 + 1 + 6,
        _ => 1 + 1 + 1 + 1 + 1 + 1 + 1 + 10,
    }
}

/// Upper bound on the index-mode encoding's bit cost, used to decide between index mode and
/// bitmap mode without actually running the encoder.
fn count_relative_index_bits(changed: &[bool]) -> usize {
    let mut bits = 8usize; // 0..255 num changed
    let mut first = true;
    let mut previous_index = 0usize;
    for (i, &is_changed) in changed.iter().enumerate() {
        if !is_changed {
            continue;
        }
        if first {
            bits += 10;
            first = false;
        } else {
            let difference = (i - previous_index) as u32;
            bits += relative_index_bits_for_difference(difference) as usize;
        }
        previous_index = i;
    }
    bits
}

/// Prefix-ladder code for a strictly increasing index sequence: common small gaps (runs of
/// nearby changed cubes) cost as little as one bit, with progressively wider fallback tiers.
fn serialize_relative_index<S: Stream>(stream: &mut S, previous: i32, current: &mut i32) {
    let mut difference = if S::is_writing() {
        debug_assert!(*current > previous);
        (*current - previous) as u32
    } else {
        0
    };

    let mut plus_one = S::is_writing() && difference == 1;
    stream.serialize_bool(&mut plus_one);
    if plus_one {
        *current = previous + 1;
        return;
    }

    let mut two_bits = S::is_writing() && difference <= 6;
    stream.serialize_bool(&mut two_bits);
    if two_bits {
        serialize_uint(stream, &mut difference, 2, 6);
        if S::is_reading() {
            *current = previous + difference as i32;
        }
        return;
    }

    let mut three_bits = S::is_writing() && difference <= 14;
    stream.serialize_bool(&mut three_bits);
    if three_bits {
        serialize_uint(stream, &mut difference, 7, 14);
        if S::is_reading() {
            *current = previous + difference as i32;
        }
        return;
    }

    let mut four_bits = S::is_writing() && difference <= 30;
    stream.serialize_bool(&mut four_bits);
    if four_bits {
        serialize_uint(stream, &mut difference, 15, 30);
        if S::is_reading() {
            *current = previous + difference as i32;
        }
        return;
    }

    let mut five_bits = S::is_writing() && difference <= 62;
    stream.serialize_bool(&mut five_bits);
    if five_bits {
        serialize_uint(stream, &mut difference, 31, 62);
        if S::is_reading() {
            *current = previous + difference as i32;
        }
        return;
    }

    let mut six_bits = S::is_writing() && difference <= 126;
    stream.serialize_bool(&mut six_bits);
    if six_bits {
        serialize_uint(stream, &mut difference, 63, 126);
        if S::is_reading() {
            *current = previous + difference as i32;
        }
        return;
    }

    serialize_uint(stream, &mut difference, 127, (NUM_CUBES - 1) as u32);
    if S::is_reading() {
        *current = previous + difference as i32;
    }
}

const MAX_CHANGED: u32 = 256;

/// Delta-encodes an entire snapshot against a baseline, choosing per-snapshot between listing
/// changed indices explicitly and a flat per-cube changed bitmap, whichever is smaller.
pub fn serialize_snapshot_relative_to_baseline<S: Stream>(
    stream: &mut S,
    compression_state: &CompressionState,
    current: &mut QuantizedSnapshot,
    baseline: &QuantizedSnapshot,
) {
    let mut changed = vec![false; NUM_CUBES];
    let mut num_changed = 0u32;
    let mut use_indices = false;

    if S::is_writing() {
        for i in 0..NUM_CUBES {
            changed[i] = current.cubes[i] != baseline.cubes[i];
            if changed[i] {
                num_changed += 1;
            }
        }
        if num_changed > 0 {
            let relative_index_bits = count_relative_index_bits(&changed);
            if num_changed <= MAX_CHANGED && relative_index_bits <= NUM_CUBES {
                use_indices = true;
            }
        }
    }

    stream.serialize_bool(&mut use_indices);

    if use_indices {
        serialize_uint(stream, &mut num_changed, 1, MAX_CHANGED);

        if S::is_writing() {
            let mut first = true;
            let mut previous_index = 0usize;
            for i in 0..NUM_CUBES {
                if !changed[i] {
                    continue;
                }
                if first {
                    let mut idx = i as u32;
                    serialize_uint(stream, &mut idx, 0, (NUM_CUBES - 1) as u32);
                    first = false;
                } else {
                    let mut idx = i as i32;
                    serialize_relative_index(stream, previous_index as i32, &mut idx);
                }
                serialize_cube_relative_to_base(
                    stream,
                    &mut current.cubes[i],
                    &baseline.cubes[i],
                    compression_state.delta[i],
                );
                previous_index = i;
            }
        } else {
            let mut previous_index = 0usize;
            for j in 0..num_changed {
                let index = if j == 0 {
                    let mut idx = 0u32;
                    serialize_uint(stream, &mut idx, 0, (NUM_CUBES - 1) as u32);
                    idx as usize
                } else {
                    let mut idx = 0i32;
                    serialize_relative_index(stream, previous_index as i32, &mut idx);
                    idx as usize
                };
                serialize_cube_relative_to_base(
                    stream,
                    &mut current.cubes[index],
                    &baseline.cubes[index],
                    compression_state.delta[index],
                );
                changed[index] = true;
                previous_index = index;
            }
            for i in 0..NUM_CUBES {
                if !changed[i] {
                    current.cubes[i] = baseline.cubes[i];
                }
            }
        }
    } else {
        for i in 0..NUM_CUBES {
            let mut bit = if S::is_writing() { changed[i] } else { false };
            stream.serialize_bool(&mut bit);
            if bit {
                serialize_cube_relative_to_base(
                    stream,
                    &mut current.cubes[i],
                    &baseline.cubes[i],
                    compression_state.delta[i],
                );
            } else if S::is_reading() {
                current.cubes[i] = baseline.cubes[i];
            }
        }
    }
}
