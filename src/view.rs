use std::fmt::Write;

use crate::model::Reservation;
use crate::rooms::RoomDirectory;

/// Per-room listing in directory order. Each room's reservations are sorted
/// by start time; the sort is stable, so equal starts keep input order.
/// Rooms without reservations still get their heading.
pub fn format_by_room(rooms: &RoomDirectory, reservations: &[Reservation]) -> String {
    let mut grouped: Vec<Vec<&Reservation>> = vec![Vec::new(); rooms.all().len()];
    for r in reservations {
        match rooms.position(&r.room) {
            Some(idx) => grouped[idx].push(r),
            None => tracing::debug!(room = %r.room, "omitting reservation for unlisted room"),
        }
    }

    let mut out = String::new();
    for (room, mut held) in rooms.all().iter().zip(grouped) {
        held.sort_by_key(|r| r.span.start);
        let _ = writeln!(out, "{}[{}] :", room.name, room.description);
        let lines: Vec<String> = held
            .iter()
            .map(|r| format!("\t`{}` ~ `{}` (by {})", r.span.start, r.span.end, r.owner))
            .collect();
        let _ = writeln!(out, "{}", lines.join("\n"));
    }
    out
}
