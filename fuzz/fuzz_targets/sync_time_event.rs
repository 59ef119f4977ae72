#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lockstep_core::{EventIdFlags, Timestamp};
use lockstep_rpc::SyncTimeEvent;

/// Raw fields of a `sync_time_event` call as received from a master
#[derive(Debug, Arbitrary)]
struct TimeEventCase {
    event_id: i32,
    new_time: String,
    next_tick: String,
    old_time: String,
    flags: i32,
}

fuzz_target!(|case: TimeEventCase| {
    let _ = EventIdFlags::from_bits(case.flags).bits();
    let _ = Timestamp::parse_optional(&case.next_tick);

    let Ok(event) = SyncTimeEvent::decode(
        case.event_id,
        &case.new_time,
        &case.next_tick,
        &case.old_time,
    ) else {
        return;
    };

    // A decoded event survives its own wire form unchanged
    let encoded = event.encode();
    let decoded = SyncTimeEvent::decode(
        encoded.event_id,
        &encoded.new_time,
        &encoded.next_tick,
        &encoded.old_time,
    );
    assert_eq!(decoded, Ok(event));
});
