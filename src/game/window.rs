use crate::game::chart::{Chart, Window};
use crate::game::timing::distance;
use log::debug;
use smallvec::SmallVec;

/// How far, in wall-clock nanoseconds, the visible range reaches in front of
/// and behind the hit line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollRange {
    pub ahead_ns: i64,
    pub behind_ns: i64,
}

impl ScrollRange {
    #[inline(always)]
    fn is_expired(&self, d: i64) -> bool {
        d < -self.behind_ns
    }

    #[inline(always)]
    fn is_visible_ahead(&self, d: i64) -> bool {
        d < self.ahead_ns
    }
}

/// Slides the active note window to `now_ns` and marks newly expired,
/// unhit, non-mine notes as missed. Returns the indices missed this frame.
///
/// Both cursors only ever move forward. A hold stays in the window until its
/// tail has expired, which also holds back every note after it.
pub fn advance_notes(chart: &mut Chart, rate: u16, now_ns: i64, range: ScrollRange) -> SmallVec<[usize; 4]> {
    let Window { mut start, mut end } = chart.note_window();
    let mut missed = SmallVec::new();

    // --- Grow the front ---
    while end < chart.notes.len() && range.is_visible_ahead(distance(rate, chart.notes[end].time_ns, now_ns)) {
        end += 1;
    }

    // --- Misses ---
    // Heads are time-ordered, so expired heads form a prefix; the cursor
    // walks it once and is never pinned by a hold.
    let mut cursor = chart.miss_cursor();
    while cursor < end && range.is_expired(distance(rate, chart.notes[cursor].time_ns, now_ns)) {
        let note = &mut chart.notes[cursor];
        if note.is_judgeable() {
            note.miss_time_ns = Some(now_ns);
            debug!("Miss: column={} note_time_ns={} now_ns={}", note.column, note.time_ns, now_ns);
            missed.push(cursor);
        }
        cursor += 1;
    }
    chart.set_miss_cursor(cursor);

    // --- Shrink the back ---
    while start < end && range.is_expired(distance(rate, chart.notes[start].last_time_ns(), now_ns)) {
        start += 1;
    }

    chart.set_note_window(Window { start, end });
    missed
}

/// Same sliding rule for gridlines, without any judgment side effects.
pub fn advance_measures(chart: &mut Chart, rate: u16, now_ns: i64, range: ScrollRange) {
    let Window { mut start, mut end } = chart.measure_window();
    while end < chart.measures.len() && range.is_visible_ahead(distance(rate, chart.measures[end].time_ns, now_ns)) {
        end += 1;
    }
    while start < end && range.is_expired(distance(rate, chart.measures[start].time_ns, now_ns)) {
        start += 1;
    }
    chart.set_measure_window(Window { start, end });
}
