//! The rigid-body solver that actually integrates cube motion is an external collaborator, not
//! part of this crate. This module specifies the boundary the netcode core calls across: given a
//! `Simulator`, the core drives fixed ticks into it and reads back per-body state to quantize and
//! put on the wire. No solver is implemented here.

use crate::constants::{CLAMP_ANGULAR_SPEED, CLAMP_LINEAR_SPEED};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: (f32, f32, f32),
    pub orientation: (f32, f32, f32, f32),
    pub linear_velocity: (f32, f32, f32),
    pub angular_velocity: (f32, f32, f32),
    pub active: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum Shape {
    Cube { half_extent: f32 },
}

/// Bodies moving faster than this (per axis, in m/s or rad/s) are clamped by the solver before
/// the next quantized snapshot is taken, keeping delta codecs within their bucketed ranges.
pub fn clamp_linear_speed() -> f32 {
    CLAMP_LINEAR_SPEED
}

pub fn clamp_angular_speed() -> f32 {
    CLAMP_ANGULAR_SPEED
}

/// The interface a rigid-body solver must provide. Indices are solver-assigned body handles,
/// distinct from entity indices; callers keep their own entity-to-body mapping.
pub trait Simulator {
    fn step(&mut self, tick: u64, time: f64, dt: f64, paused: bool);

    fn add_body(&mut self, entity_idx: usize, state: BodyState, shape: Shape) -> usize;

    fn remove_body(&mut self, body_index: usize);

    fn set_state(&mut self, body_index: usize, state: BodyState);

    fn get_state(&self, body_index: usize) -> BodyState;

    fn apply_force(&mut self, body_index: usize, force: (f32, f32, f32));

    fn apply_torque(&mut self, body_index: usize, torque: (f32, f32, f32));

    fn add_plane(&mut self, normal: (f32, f32, f32), distance: f32);

    /// Bodies the given body touched during the most recently completed step, used to build the
    /// per-tick contact graph the authority resolver walks.
    fn object_interactions(&self, body_index: usize) -> Vec<usize>;
}
