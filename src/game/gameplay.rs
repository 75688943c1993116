use crate::game::chart::Chart;
use crate::game::judgment::Judgments;
use crate::game::timing::{distance, ns_to_ms_f64};
use crate::game::timing_stats::SessionStats;
use crate::game::window::{self, ScrollRange};
use log::{debug, info, trace};
use serde::Serialize;

/// A press in a column, timed from playback zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Input {
    pub column: u8,
    pub time_ns: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HitResult {
    pub note_index: usize,
    pub distance_ns: i64,
    pub abs_distance_ns: i64,
}

/// Matches `input` to the closest judgeable note in its column and marks it
/// hit when the distance falls inside the worst judgment window.
///
/// Returns `None` for a whiff; the candidate note is left untouched.
pub fn apply_input(chart: &mut Chart, input: &Input, rate: u16, judgments: &Judgments) -> Option<HitResult> {
    let worst_ns = judgments.worst_threshold_ns();
    let candidates = chart.column_notes(input.column);
    if candidates.is_empty() {
        return None;
    }
    let notes = &chart.notes;
    let dist = |idx: usize| distance(rate, notes[idx].time_ns, input.time_ns);

    // First candidate the input is not late for.
    let split = candidates.partition_point(|&idx| dist(idx) < 0);

    let mut best: Option<(usize, i64)> = None;
    // Earlier side, nearest first.
    for &idx in candidates[..split].iter().rev() {
        let d = dist(idx);
        if d.abs() >= worst_ns {
            break;
        }
        if notes[idx].is_judgeable() {
            best = Some((idx, d));
            break;
        }
    }
    for &idx in &candidates[split..] {
        let d = dist(idx);
        if d.abs() >= worst_ns {
            break;
        }
        if notes[idx].is_judgeable() {
            // Ties go to the earlier note.
            if best.is_none_or(|(_, b)| d.abs() < b.abs()) {
                best = Some((idx, d));
            }
            break;
        }
    }

    let (note_index, distance_ns) = best?;
    chart.notes[note_index].hit_time_ns = Some(input.time_ns);
    Some(HitResult {
        note_index,
        distance_ns,
        abs_distance_ns: distance_ns.abs(),
    })
}

/// What happened during a frame, for presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Hit { column: u8, judgment: usize, distance_ns: i64 },
    Whiff { column: u8 },
    Miss { column: u8 },
}

/// Live state of one play-through of a chart.
pub struct Session {
    pub chart: Chart,
    pub rate: u16,
    pub judgments: Judgments,
    pub stats: SessionStats,
    /// Every press, in arrival order; this is what gets persisted.
    pub inputs: Vec<Input>,
    scroll: ScrollRange,
    // Most recent hit note per column, for hold releases.
    last_hit: Vec<Option<usize>>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(mut chart: Chart, rate: u16, judgments: Judgments, ahead_ns: i64) -> Self {
        chart.reset_session();
        let scroll = ScrollRange {
            ahead_ns,
            behind_ns: judgments.worst_threshold_ns(),
        };
        let columns = usize::from(chart.key_count());
        Self {
            stats: SessionStats::new(judgments.len()),
            chart,
            rate,
            judgments,
            inputs: Vec::new(),
            scroll,
            last_hit: vec![None; columns],
            events: Vec::new(),
        }
    }

    pub fn press(&mut self, column: u8, time_ns: i64) -> Option<HitResult> {
        let input = Input { column, time_ns };
        self.inputs.push(input);

        let Some(hit) = apply_input(&mut self.chart, &input, self.rate, &self.judgments) else {
            trace!("Whiff: column={column} time_ns={time_ns}");
            self.events.push(SessionEvent::Whiff { column });
            return None;
        };
        let Some(judgment) = self.judgments.judge(hit.abs_distance_ns) else {
            return Some(hit);
        };
        self.stats.record_hit(
            judgment,
            hit.distance_ns,
            hit.abs_distance_ns,
            &self.chart.notes,
            self.rate,
        );
        if let Some(slot) = self.last_hit.get_mut(usize::from(column)) {
            *slot = Some(hit.note_index);
        }
        self.events.push(SessionEvent::Hit {
            column,
            judgment,
            distance_ns: hit.distance_ns,
        });
        Some(hit)
    }

    /// Closes the hold most recently hit in `column`, if it is still held.
    pub fn release(&mut self, column: u8, time_ns: i64) {
        let Some(slot) = self.last_hit.get_mut(usize::from(column)) else {
            return;
        };
        let Some(idx) = slot.take() else { return };
        let note = &mut self.chart.notes[idx];
        if note.is_hold() && note.release_time_ns.is_none() {
            note.release_time_ns = Some(time_ns);
            debug!("Released hold in column {column} at {time_ns}ns");
        }
    }

    /// Advances both windows to `now_ns`, counting misses.
    pub fn update(&mut self, now_ns: i64) {
        let missed = window::advance_notes(&mut self.chart, self.rate, now_ns, self.scroll);
        for idx in missed {
            self.stats.record_miss();
            self.events.push(SessionEvent::Miss {
                column: self.chart.notes[idx].column,
            });
        }
        window::advance_measures(&mut self.chart, self.rate, now_ns, self.scroll);
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, SessionEvent> {
        self.events.drain(..)
    }

    pub fn log_summary(&self) {
        info!(
            "Session over: hits={}/{} misses={} mean={:.2}ms stddev={:.2}ms",
            self.stats.total_hits,
            self.chart.non_mine_count(),
            self.stats.misses(),
            ns_to_ms_f64(self.stats.mean_ns),
            ns_to_ms_f64(self.stats.stddev_ns)
        );
    }
}
