//! A placeholder `Simulator` so the server binary links and runs without a real rigid-body
//! solver, which is an external collaborator this repository does not implement. Bodies sit
//! exactly where they are set and never interact; this exists only to exercise the netcode loop.

use shared::physics::{BodyState, Shape, Simulator};

#[derive(Default)]
pub struct StubSimulator {
    bodies: Vec<BodyState>,
}

impl Simulator for StubSimulator {
    fn step(&mut self, _tick: u64, _time: f64, _dt: f64, _paused: bool) {}

    fn add_body(&mut self, _entity_idx: usize, state: BodyState, _shape: Shape) -> usize {
        self.bodies.push(state);
        self.bodies.len() - 1
    }

    fn remove_body(&mut self, body_index: usize) {
        if body_index < self.bodies.len() {
            self.bodies[body_index].active = false;
        }
    }

    fn set_state(&mut self, body_index: usize, state: BodyState) {
        self.bodies[body_index] = state;
    }

    fn get_state(&self, body_index: usize) -> BodyState {
        self.bodies[body_index]
    }

    fn apply_force(&mut self, _body_index: usize, _force: (f32, f32, f32)) {}

    fn apply_torque(&mut self, _body_index: usize, _torque: (f32, f32, f32)) {}

    fn add_plane(&mut self, _normal: (f32, f32, f32), _distance: f32) {}

    fn object_interactions(&self, _body_index: usize) -> Vec<usize> {
        Vec::new()
    }
}
