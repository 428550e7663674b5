use swap_tracker::swap::status::{StatusTag, derive_status};
use swap_tracker::swap::{Event, EventData, EventKind, EventName};

const NOW: u64 = 1_700_000_000;

fn ev(name: &str, ts: u64) -> Event {
    Event::new(
        name,
        EventData {
            hash: Some(format!("0x{name}{ts}")),
            ts: Some(ts),
            ..EventData::default()
        },
    )
}

fn status(events: &[Event], expire_ts: u64) -> StatusTag {
    derive_status(events, expire_ts, false, NOW)
}

#[test]
fn posted_and_bonded_swap_is_bonded() {
    let events = [ev("POSTED", NOW - 20), ev("BONDED", NOW - 10)];
    assert_eq!(status(&events, NOW + 3600), StatusTag::Bonded);
    assert_eq!(status(&events[..1], NOW + 3600), StatusTag::Posted);
}

#[test]
fn lock_outstanding_past_expiry_needs_cancel() {
    let events = [ev("LOCKED", NOW - 100)];
    let tag = status(&events, NOW - 10);
    assert_eq!(tag, StatusTag::CancelledOverdue);
    assert_eq!(tag.as_str(), "CANCELLED*");
    assert!(tag.needs_action());
    assert_eq!(tag.base(), "CANCELLED");
}

#[test]
fn temporary_record_without_events() {
    assert_eq!(derive_status(&[], NOW + 3600, true, NOW), StatusTag::Temporary);
    assert_eq!(derive_status(&[], NOW - 1, true, NOW), StatusTag::Dropped);
    assert_eq!(derive_status(&[], NOW + 3600, false, NOW), StatusTag::Pending);
}

#[test]
fn released_wins_over_everything_else() {
    let noise = [
        ev("POSTED", NOW - 50),
        ev("LOCKED", NOW - 40),
        ev("CANCELLED", NOW - 30),
        ev("RELEASING", NOW - 25),
    ];
    for expire_ts in [NOW - 1_000, NOW + 1_000] {
        let mut events = noise.to_vec();
        events.push(ev("RELEASED", NOW - 20));
        assert_eq!(status(&events, expire_ts), StatusTag::Released);

        events.push(ev("EXECUTED", NOW - 10));
        assert_eq!(status(&events, expire_ts), StatusTag::Executed);
    }
}

#[test]
fn execution_not_later_than_release_stays_released() {
    let events = [ev("EXECUTED", NOW - 20), ev("RELEASED", NOW - 10)];
    assert_eq!(status(&events, NOW + 60), StatusTag::Released);
    assert!(StatusTag::Released.is_terminal());
}

#[test]
fn executed_without_release_is_releasing() {
    let executed = [ev("LOCKED", NOW - 30), ev("EXECUTED", NOW - 20)];
    assert_eq!(status(&executed, NOW + 60), StatusTag::Releasing);
    assert_eq!(status(&executed, NOW - 5), StatusTag::ReleasingOverdue);

    let mut in_flight = executed.to_vec();
    in_flight.push(ev("RELEASING", NOW - 10));
    let tag = status(&in_flight, NOW - 5);
    assert_eq!(tag, StatusTag::ReleasingInFlight);
    assert_eq!(tag.to_string(), "RELEASING...");
    assert!(tag.is_in_flight());
    assert!(!tag.needs_action());
}

#[test]
fn lock_path() {
    let locked = [ev("LOCKED", NOW - 30)];
    assert_eq!(status(&locked, NOW + 60), StatusTag::Locked);

    let unlocked = [ev("LOCKED", NOW - 30), ev("UNLOCKED", NOW - 20)];
    assert_eq!(status(&unlocked, NOW + 60), StatusTag::Unlocked);
    assert_eq!(status(&unlocked, NOW - 5), StatusTag::ExpiredOverdue);
}

#[test]
fn expiry_without_progress() {
    assert_eq!(status(&[], NOW - 1), StatusTag::Expired);
    assert_eq!(status(&[ev("POSTED", NOW - 99)], NOW - 1), StatusTag::Expired);
    assert_eq!(status(&[], NOW), StatusTag::Pending);
}

#[test]
fn cancelled_swap() {
    let events = [ev("POSTED", NOW - 30), ev("CANCELLED", NOW - 20)];
    assert_eq!(status(&events, NOW + 60), StatusTag::Cancelled);
    assert_eq!(status(&events, NOW - 5), StatusTag::Cancelled);
}

#[test]
fn failed_and_unnamed_events_are_ignored() {
    let mut failed_release = ev("RELEASED", NOW - 10);
    failed_release.data.failed = true;
    let suffixed = ev("EXECUTED:FAILED", NOW - 5);
    assert_eq!(
        suffixed.name,
        Some(EventName {
            kind: EventKind::Executed,
            failed: true
        })
    );

    let unnamed = Event {
        name: None,
        data: EventData::default(),
    };
    let unknown = ev("SOMETHING-NEW", NOW - 1);

    let events = [
        ev("BONDED", NOW - 20),
        failed_release,
        suffixed,
        unnamed,
        unknown,
    ];
    assert_eq!(status(&events, NOW + 60), StatusTag::Bonded);
}

#[test]
fn status_tags_serialize_with_suffixes() -> anyhow::Result<()> {
    let json = serde_json::to_string(&[StatusTag::ExpiredOverdue, StatusTag::ReleasingInFlight])?;
    assert_eq!(json, r#"["EXPIRED*","RELEASING..."]"#);
    Ok(())
}
