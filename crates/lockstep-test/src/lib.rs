//! Lockstep Test Harness
//!
//! This crate provides:
//! - `RecordingSink`: an event sink that records and can be waited on
//! - `VirtualClock`: an external clock whose waits complete instantly
//! - `ScriptedMaster` / `RecordingSlave`: in-memory RPC peers with failure injection
//! - `eventually`: polling helper for assertions on worker threads

pub mod peers;
pub mod sink;
pub mod virtual_clock;

pub use peers::*;
pub use sink::*;
pub use virtual_clock::*;

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
