//! Per-player authority resolution.
//!
//! Each player has input authority over their own cube and, transitively, over every cube
//! reachable from it through the current tick's contact graph — pushing a stack of cubes gives
//! you authority over the whole stack so the pile does not fight itself between two clients'
//! predictions. Authority only settles onto a new owner once the previous claim has been inactive
//! for [`AUTHORITY_THRESHOLD`] seconds, so a momentary separation does not hand a cube back and
//! forth every tick.

use std::collections::VecDeque;

use crate::constants::AUTHORITY_THRESHOLD;

pub const UNOWNED: u32 = 0;

pub struct AuthorityState {
    authority: Vec<u32>,
    idle_time: Vec<f64>,
    /// Objects whose authority never changes (player cubes locked to their owning player).
    locked: Vec<bool>,
}

impl AuthorityState {
    pub fn new(num_objects: usize) -> Self {
        AuthorityState {
            authority: vec![UNOWNED; num_objects],
            idle_time: vec![0.0; num_objects],
            locked: vec![false; num_objects],
        }
    }

    pub fn lock(&mut self, object: usize, owner: u32) {
        self.authority[object] = owner;
        self.locked[object] = true;
    }

    pub fn authority_of(&self, object: usize) -> u32 {
        self.authority[object]
    }

    pub fn set_authority(&mut self, object: usize, owner: u32) {
        if !self.locked[object] {
            self.authority[object] = owner;
            self.idle_time[object] = 0.0;
        }
    }
}

/// Runs one tick of authority resolution.
///
/// `contacts` is the undirected contact graph for this tick (pairs of object indices touching
/// each other). `active` flags which objects are still moving; a settled (inactive) object whose
/// authority is not reinforced by a fresh contact starts accumulating idle time and eventually
/// releases back to [`UNOWNED`].
pub fn resolve_authority(
    state: &mut AuthorityState,
    contacts: &[(usize, usize)],
    active: &[bool],
    max_player: u32,
    dt: f64,
) {
    let n = state.authority.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in contacts {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    for player in 1..=max_player {
        let mut visited = vec![false; n];
        let mut queue = VecDeque::new();

        for i in 0..n {
            if state.authority[i] == player {
                visited[i] = true;
                queue.push_back(i);
            } else if state.authority[i] != UNOWNED {
                // Owned by someone else: do not traverse through it.
                visited[i] = true;
            }
        }

        // An inactive object neither gains authority nor relays the claim to its own neighbours:
        // a settled box sitting between two active ones does not bridge them together.
        let mut claimed = Vec::new();
        while let Some(current) = queue.pop_front() {
            for &neighbor in &adjacency[current] {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                if active.get(neighbor).copied().unwrap_or(false) {
                    claimed.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }

        for object in claimed {
            state.set_authority(object, player);
        }
    }

    for i in 0..n {
        if state.locked[i] {
            continue;
        }
        let is_active = active.get(i).copied().unwrap_or(false);
        if is_active {
            state.idle_time[i] = 0.0;
            continue;
        }
        if state.authority[i] == UNOWNED {
            continue;
        }
        state.idle_time[i] += dt;
        if state.idle_time[i] > AUTHORITY_THRESHOLD {
            state.authority[i] = UNOWNED;
            state.idle_time[i] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_spreads_through_contact_chain() {
        let mut state = AuthorityState::new(6);
        state.lock(1, 1);
        state.lock(2, 2);

        let contacts = [(1, 3), (3, 4), (2, 5)];
        let active = [false, true, true, true, true, true];
        resolve_authority(&mut state, &contacts, &active, 2, 1.0 / 240.0);

        assert_eq!(state.authority_of(3), 1);
        assert_eq!(state.authority_of(4), 1);
        assert_eq!(state.authority_of(5), 2);
    }

    #[test]
    fn inactive_objects_do_not_get_claimed_and_block_further_spread() {
        let mut state = AuthorityState::new(4);
        state.lock(1, 1);
        let contacts = [(1, 2), (2, 3)];
        let active = [false, true, false, true];
        resolve_authority(&mut state, &contacts, &active, 1, 1.0 / 240.0);
        assert_eq!(state.authority_of(2), UNOWNED, "an inactive neighbour is never claimed");
        assert_eq!(state.authority_of(3), UNOWNED, "the claim must not bridge past an inactive object");
    }

    #[test]
    fn authority_releases_after_settle_timeout() {
        let mut state = AuthorityState::new(3);
        state.lock(1, 1);
        resolve_authority(&mut state, &[(1, 2)], &[false, true, true], 1, 0.0);
        assert_eq!(state.authority_of(2), 1);

        for _ in 0..10 {
            resolve_authority(&mut state, &[], &[false, false, false], 1, 0.1);
        }
        assert_eq!(state.authority_of(2), UNOWNED);
    }

    #[test]
    fn locked_objects_never_change_authority() {
        let mut state = AuthorityState::new(2);
        state.lock(0, 1);
        resolve_authority(&mut state, &[], &[false, false], 4, 100.0);
        assert_eq!(state.authority_of(0), 1);
    }
}
