//! Authoritative server for the cubes sandbox.
//!
//! The server owns the canonical `EntityManager` and rigid-body simulator, drives the fixed
//! `TICK_HZ` simulation forward `TICKS_PER_SERVER_FRAME` ticks per `SERVER_HZ` frame, and for
//! every connected client maintains an independent connection/clock-sync state machine
//! ([`session`]) that decides which inputs feed that frame's ticks and how the next snapshot is
//! framed. [`network`] wires that state machine to a non-blocking UDP socket in a single-threaded
//! loop; [`simulator`] is a placeholder standing in for the real physics engine.

pub mod network;
pub mod session;
pub mod simulator;
