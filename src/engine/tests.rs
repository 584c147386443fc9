use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use proptest::prelude::*;

use super::*;
use crate::codec;
use crate::model::*;
use crate::store::{KvStore, Store, StoreError, Transaction};

fn rooms() -> Arc<RoomDirectory> {
    Arc::new(
        RoomDirectory::new(vec![
            Room::new("large", "Large meeting room"),
            Room::new("small", "Small meeting room"),
            Room::new("booth", "Phone booth"),
        ])
        .unwrap(),
    )
}

fn engine() -> Engine<KvStore> {
    Engine::new(KvStore::in_memory(), rooms())
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

fn req(room: &str, start: &str, end: &str, owner: &str) -> ReservationRequest {
    ReservationRequest::new(room, start, end, owner)
}

fn t(s: &str) -> TimeOfDay {
    s.parse().unwrap()
}

fn span(start: &str, end: &str) -> Span {
    Span::new(t(start), t(end)).unwrap()
}

fn denied_by(owner: &str) -> Admission {
    Admission::Denied {
        held_by: owner.into(),
    }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomlock_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn assert_pairwise_disjoint(list: &[Reservation]) {
    for (i, a) in list.iter().enumerate() {
        for b in &list[i + 1..] {
            if a.room == b.room && a.day == b.day {
                assert!(!a.span.overlaps(&b.span), "overlap: {a:?} vs {b:?}");
            }
        }
    }
}

// ── Admission outcomes ───────────────────────────────────

#[test]
fn admitted_reservation_is_listed() {
    let engine = engine();
    let result = engine.admit(day(), &req("large", "10:00", "11:00", "mika")).unwrap();
    let Admission::Admitted(r) = result else {
        panic!("expected admission, got {result:?}");
    };
    assert_eq!(r.room, "large");
    assert_eq!(r.span, span("10:00", "11:00"));
    assert_eq!(engine.list_day(day()).unwrap(), vec![r]);
}

#[test]
fn touching_boundaries_both_admit() {
    let engine = engine();
    assert!(engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap().is_admitted());
    assert!(engine.admit(day(), &req("large", "11:00", "12:00", "b")).unwrap().is_admitted());
    assert!(engine.admit(day(), &req("large", "09:00", "10:00", "c")).unwrap().is_admitted());
    assert_eq!(engine.list_day(day()).unwrap().len(), 3);
}

#[test]
fn contained_overlap_is_denied_with_first_owner() {
    let engine = engine();
    engine.admit(day(), &req("large", "10:00", "11:00", "first")).unwrap();
    assert_eq!(
        engine.admit(day(), &req("large", "10:30", "10:45", "second")).unwrap(),
        denied_by("first")
    );
    assert_eq!(engine.list_day(day()).unwrap().len(), 1);
}

#[test]
fn partial_and_enclosing_overlaps_are_denied() {
    let engine = engine();
    engine.admit(day(), &req("small", "10:00", "11:00", "a")).unwrap();
    for (start, end) in [("09:30", "10:01"), ("10:59", "12:00"), ("08:00", "18:00"), ("10:00", "11:00")] {
        assert_eq!(
            engine.admit(day(), &req("small", start, end, "b")).unwrap(),
            denied_by("a"),
            "{start}-{end}"
        );
    }
}

#[test]
fn denial_names_first_conflict_in_insertion_order() {
    let engine = engine();
    // Later insertion, earlier time: key order is insertion order, not time order.
    engine.admit(day(), &req("large", "10:00", "11:00", "inserted_first")).unwrap();
    engine.admit(day(), &req("large", "09:00", "10:00", "inserted_second")).unwrap();
    assert_eq!(
        engine.admit(day(), &req("large", "09:30", "10:30", "x")).unwrap(),
        denied_by("inserted_first")
    );
}

#[test]
fn rooms_are_independent() {
    let engine = engine();
    assert!(engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap().is_admitted());
    assert!(engine.admit(day(), &req("small", "10:00", "11:00", "b")).unwrap().is_admitted());
    assert!(engine.admit(day(), &req("booth", "10:00", "11:00", "c")).unwrap().is_admitted());
}

#[test]
fn days_are_independent() {
    let engine = engine();
    let tomorrow = day().succ_opt().unwrap();
    assert!(engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap().is_admitted());
    assert!(engine.admit(tomorrow, &req("large", "10:00", "11:00", "b")).unwrap().is_admitted());
    assert_eq!(engine.list_day(day()).unwrap().len(), 1);
    assert_eq!(engine.list_day(tomorrow).unwrap().len(), 1);
    assert_eq!(engine.list_all().unwrap().len(), 2);
}

#[test]
fn identical_non_overlapping_requests_get_distinct_keys() {
    let engine = engine();
    let tomorrow = day().succ_opt().unwrap();
    // Same room and times on two days, then a second identical request per day.
    for d in [day(), tomorrow] {
        engine.admit(d, &req("booth", "12:00", "12:30", "a")).unwrap();
    }
    assert_eq!(engine.raw_entries().unwrap().len(), 2);
    assert_eq!(
        engine.admit(day(), &req("booth", "12:00", "12:30", "a")).unwrap(),
        denied_by("a")
    );
}

// ── Validation ───────────────────────────────────────────

#[test]
fn invalid_requests_never_touch_the_store() {
    let engine = engine();
    let cases = [
        (req("attic", "10:00", "11:00", "a"), "unknown room"),
        (req("large", "11:00", "10:00", "a"), "reversed"),
        (req("large", "10:00", "10:00", "a"), "empty"),
        (req("large", "10am", "11:00", "a"), "bad start"),
        (req("large", "10:00", "25:00", "a"), "bad end"),
        (req("large", "10:00", "11:00", ""), "empty owner"),
        (req("large", "10:00", "11:00", "   "), "blank owner"),
        (req("large", "10:00", "11:00", "a\u{1f}b"), "separator in owner"),
        (req("large", "10:00", "11:00", "line\nbreak"), "control char in owner"),
        (req("large", "10:00", "11:00", &"x".repeat(crate::limits::MAX_OWNER_LEN + 1)), "long owner"),
    ];
    for (request, label) in &cases {
        let err = engine.admit(day(), request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)), "{label}: {err:?}");
        assert!(!err.is_retryable());
    }
    assert!(engine.store().is_empty().unwrap());
}

#[test]
fn validation_reasons_are_specific() {
    let engine = engine();
    assert_eq!(
        engine.validate(day(), &req("attic", "10:00", "11:00", "a")).unwrap_err(),
        InvalidRequest::UnknownRoom("attic".into())
    );
    assert_eq!(
        engine.validate(day(), &req("large", "11:00", "10:00", "a")).unwrap_err(),
        InvalidRequest::EmptyInterval { start: t("11:00"), end: t("10:00") }
    );
    assert!(matches!(
        engine.validate(day(), &req("large", "1:00", "10:00", "a")),
        Err(InvalidRequest::BadTime(_))
    ));
}

// ── Reset ────────────────────────────────────────────────

#[test]
fn reset_allows_previously_conflicting_interval() {
    let engine = engine();
    engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap();
    assert_eq!(
        engine.admit(day(), &req("large", "10:00", "11:00", "b")).unwrap(),
        denied_by("a")
    );
    engine.reset_all().unwrap();
    assert!(engine.list_all().unwrap().is_empty());
    assert!(engine.admit(day(), &req("large", "10:00", "11:00", "b")).unwrap().is_admitted());
}

// ── Queries ──────────────────────────────────────────────

#[test]
fn current_holder_uses_half_open_spans() {
    let engine = engine();
    engine.admit(day(), &req("small", "10:00", "11:00", "a")).unwrap();
    engine.admit(day(), &req("small", "11:00", "12:00", "b")).unwrap();

    let holder = |at: &str| {
        engine
            .current_holder(day(), "small", t(at))
            .unwrap()
            .map(|r| r.owner)
    };
    assert_eq!(holder("09:59"), None);
    assert_eq!(holder("10:00").as_deref(), Some("a"));
    assert_eq!(holder("10:59").as_deref(), Some("a"));
    assert_eq!(holder("11:00").as_deref(), Some("b"));
    assert_eq!(holder("12:00"), None);
    assert!(engine.current_holder(day(), "large", t("10:30")).unwrap().is_none());
}

#[test]
fn find_conflict_reads_without_writing() {
    let engine = engine();
    engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap();
    let mut txn = engine.store().begin().unwrap();
    assert_eq!(
        find_conflict(&mut txn, day(), "large", &span("10:30", "12:00")).unwrap(),
        Some("a".into())
    );
    assert_eq!(find_conflict(&mut txn, day(), "large", &span("11:00", "12:00")).unwrap(), None);
    assert_eq!(find_conflict(&mut txn, day(), "small", &span("10:30", "12:00")).unwrap(), None);
    txn.commit().unwrap();
    assert_eq!(engine.raw_entries().unwrap().len(), 1);
}

// ── Malformed records ────────────────────────────────────

fn plant_corrupt_record(engine: &Engine<KvStore>, room: &str, value: &str) {
    let mut key = codec::room_prefix(day(), room);
    key.extend_from_slice(ulid::Ulid::new().to_string().as_bytes());
    let mut txn = engine.store().begin().unwrap();
    txn.put(key, value.as_bytes().to_vec());
    txn.commit().unwrap();
}

#[test]
fn listing_skips_malformed_records() {
    let engine = engine();
    engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap();
    plant_corrupt_record(&engine, "small", "v1\u{1f}broken");
    engine.admit(day(), &req("booth", "10:00", "11:00", "b")).unwrap();

    let owners: Vec<_> = engine
        .list_day(day())
        .unwrap()
        .into_iter()
        .map(|r| r.owner)
        .collect();
    assert_eq!(owners, ["b", "a"]); // key order: booth < large
    assert_eq!(engine.list_all().unwrap().len(), 2);
    assert_eq!(engine.raw_entries().unwrap().len(), 3);

    let text = crate::view::format_by_room(engine.rooms(), &engine.list_day(day()).unwrap());
    assert!(text.contains("(by a)"));
    assert!(text.contains("small[Small meeting room] :"));
}

#[test]
fn conflict_check_fails_closed_on_malformed_neighbour() {
    let engine = engine();
    plant_corrupt_record(&engine, "large", "v9\u{1f}10:00\u{1f}11:00\u{1f}a");
    let err = engine.admit(day(), &req("large", "14:00", "15:00", "b")).unwrap_err();
    assert!(matches!(err, EngineError::MalformedRecord(_)), "{err:?}");
    // Other rooms are unaffected.
    assert!(engine.admit(day(), &req("small", "14:00", "15:00", "b")).unwrap().is_admitted());
    // The wipe is the recovery path.
    engine.reset_all().unwrap();
    assert!(engine.admit(day(), &req("large", "14:00", "15:00", "b")).unwrap().is_admitted());
}

// ── Concurrency ──────────────────────────────────────────

#[test]
fn racing_transactions_one_wins_loser_retries_into_denial() {
    let engine = engine();

    // Two admitters interleave: both scan, both see no conflict.
    let mut a = engine.store().begin().unwrap();
    let mut b = engine.store().begin().unwrap();
    assert_eq!(find_conflict(&mut a, day(), "large", &span("10:00", "11:00")).unwrap(), None);
    assert_eq!(find_conflict(&mut b, day(), "large", &span("10:30", "11:30")).unwrap(), None);

    let ra = engine.validate(day(), &req("large", "10:00", "11:00", "a")).unwrap();
    let rb = engine.validate(day(), &req("large", "10:30", "11:30", "b")).unwrap();
    let (ka, va) = codec::encode(&ra, ulid::Ulid::new());
    let (kb, vb) = codec::encode(&rb, ulid::Ulid::new());
    a.put(ka, va);
    b.put(kb, vb);
    a.commit().unwrap();
    let err = EngineError::from(b.commit().unwrap_err());
    assert!(err.is_retryable());

    // The retry sees the winner.
    assert_eq!(
        engine.admit(day(), &req("large", "10:30", "11:30", "b")).unwrap(),
        denied_by("a")
    );
    assert_eq!(engine.list_day(day()).unwrap(), vec![ra]);
}

#[test]
fn store_conflict_maps_to_retryable_error() {
    assert!(matches!(
        EngineError::from(StoreError::Conflict),
        EngineError::StoreConflict
    ));
    let internal = EngineError::from(StoreError::Unavailable("down".into()));
    assert!(matches!(internal, EngineError::Internal(_)));
    assert!(!internal.is_retryable());
}

/// Retry loop as a transport would run it.
fn admit_retrying(engine: &Engine<KvStore>, request: &ReservationRequest) -> Admission {
    for _ in 0..1000 {
        match engine.admit(day(), request) {
            Err(EngineError::StoreConflict) => continue,
            other => return other.unwrap(),
        }
    }
    panic!("never settled: {request:?}");
}

#[test]
fn concurrent_identical_requests_admit_exactly_one() {
    let engine = Arc::new(engine());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || admit_retrying(&engine, &req("large", "10:00", "11:00", &format!("u{i}"))))
        })
        .collect();
    let results: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter(|r| r.is_admitted()).collect();
    assert_eq!(winners.len(), 1);
    let Admission::Admitted(winner) = winners[0] else { unreachable!() };
    for r in &results {
        if let Admission::Denied { held_by } = r {
            assert_eq!(held_by, &winner.owner);
        }
    }
    assert_eq!(engine.list_day(day()).unwrap().len(), 1);
}

#[test]
fn concurrent_mixed_requests_keep_rooms_disjoint() {
    let engine = Arc::new(engine());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..24u32 {
                    let room = ["large", "small"][(i % 2) as usize];
                    let start = (i * 7 + worker * 11) % 600;
                    let end = start + 30 + (worker * 5) % 60;
                    let fmt = |m: u32| format!("{:02}:{:02}", 8 + m / 60, m % 60);
                    admit_retrying(&engine, &req(room, &fmt(start), &fmt(end), &format!("w{worker}")));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let list = engine.list_day(day()).unwrap();
    assert!(!list.is_empty());
    assert_pairwise_disjoint(&list);
}

// ── Durability ───────────────────────────────────────────

#[test]
fn admissions_survive_reopen() {
    let path = test_wal_path("survive_reopen.wal");
    {
        let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
        engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap();
        engine.admit(day(), &req("small", "10:00", "11:00", "b")).unwrap();
    }
    let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
    assert_eq!(engine.list_day(day()).unwrap().len(), 2);
    assert_eq!(
        engine.admit(day(), &req("large", "10:15", "10:30", "c")).unwrap(),
        denied_by("a")
    );
    // New keys still sort after the replayed ones.
    engine.admit(day(), &req("large", "09:00", "10:00", "d")).unwrap();
    let owners: Vec<_> = engine
        .list_day(day())
        .unwrap()
        .into_iter()
        .filter(|r| r.room == "large")
        .map(|r| r.owner)
        .collect();
    assert_eq!(owners, ["a", "d"]);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn bookings_after_a_torn_tail_survive_another_restart() {
    use std::io::Write;

    let path = test_wal_path("torn_tail_restart.wal");
    {
        let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
        engine.admit(day(), &req("small", "09:00", "10:00", "a")).unwrap();
    }
    // Crash mid-append leaves a partial record behind.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
    }
    {
        let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
        assert!(engine.admit(day(), &req("small", "10:00", "11:00", "b")).unwrap().is_admitted());
    }
    let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
    let owners: Vec<_> = engine
        .list_day(day())
        .unwrap()
        .into_iter()
        .map(|r| r.owner)
        .collect();
    assert_eq!(owners, ["a", "b"]);
    assert_eq!(
        engine.admit(day(), &req("small", "10:30", "10:45", "c")).unwrap(),
        denied_by("b")
    );
    let _ = std::fs::remove_file(&path);
}

#[test]
fn reset_survives_reopen() {
    let path = test_wal_path("reset_reopen.wal");
    {
        let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
        engine.admit(day(), &req("large", "10:00", "11:00", "a")).unwrap();
        engine.reset_all().unwrap();
    }
    let engine = Engine::new(KvStore::open(&path).unwrap(), rooms());
    assert!(engine.list_all().unwrap().is_empty());
    assert!(engine.admit(day(), &req("large", "10:00", "11:00", "b")).unwrap().is_admitted());
    let _ = std::fs::remove_file(&path);
}

// ── Invariant ────────────────────────────────────────────

fn arb_request() -> impl Strategy<Value = (usize, u32, u32, u8)> {
    (0usize..2, 0u32..(23 * 60), 1u32..180, any::<u8>())
}

proptest! {
    #[test]
    fn admitted_set_never_overlaps(requests in prop::collection::vec(arb_request(), 1..40)) {
        let engine = engine();
        for (room_idx, start, len, owner) in requests {
            let end = (start + len).min(23 * 60 + 59);
            let room = ["large", "small"][room_idx];
            let fmt = |m: u32| format!("{:02}:{:02}", m / 60, m % 60);
            let request = req(room, &fmt(start), &fmt(end), &format!("o{owner}"));
            let proposed = span(&fmt(start), &fmt(end));
            let before = engine.list_day(day()).unwrap();
            match engine.admit(day(), &request).unwrap() {
                Admission::Admitted(_) => {
                    prop_assert!(before.iter().all(|r| r.room != room || !r.span.overlaps(&proposed)));
                }
                Admission::Denied { held_by } => {
                    prop_assert!(before.iter().any(|r| r.room == room
                        && r.owner == held_by
                        && r.span.overlaps(&proposed)));
                }
            }
        }
        assert_pairwise_disjoint(&engine.list_day(day()).unwrap());
    }
}
