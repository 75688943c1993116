use crate::game::note::{Measure, Note};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Key counts for the note-section types we know how to play.
pub const CHART_TYPES: [(&str, u8); 3] = [
    ("dance-single", 4),
    ("dance-solo", 6),
    ("dance-double", 8),
];

pub fn key_count_for_type(chart_type: &str) -> Option<u8> {
    CHART_TYPES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(chart_type))
        .map(|&(_, keys)| keys)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Difficulty {
    pub name: String,
    pub meter: String,
    pub key_count: u8,
    /// Raw note data of this section; only used for hashing.
    pub section: String,
}

impl Difficulty {
    /// SHA-256 of the raw note data, URL-safe base64 so it can name files.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.section.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

/// Half-open `[start, end)` range into a time-ordered array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChartCounts {
    /// Rows with N simultaneous notes are tallied at index N - 1.
    pub simultaneous: Vec<u32>,
    pub notes: u32,
    pub holds: u32,
    pub mines: u32,
}

#[derive(Clone, Debug)]
pub struct Chart {
    pub difficulty: Difficulty,
    pub notes: Vec<Note>,
    pub measures: Vec<Measure>,
    pub counts: ChartCounts,

    // Indices of non-mine notes, per column, in time order.
    column_notes: Vec<Vec<usize>>,

    note_window: Window,
    measure_window: Window,
    // First note whose head has not yet expired.
    miss_cursor: usize,
}

impl Chart {
    pub fn new(
        difficulty: Difficulty,
        notes: Vec<Note>,
        measures: Vec<Measure>,
        counts: ChartCounts,
    ) -> Self {
        debug_assert!(notes.windows(2).all(|w| w[0].time_ns <= w[1].time_ns));
        let mut column_notes = vec![Vec::new(); usize::from(difficulty.key_count)];
        for (i, note) in notes.iter().enumerate() {
            if note.is_mine {
                continue;
            }
            let col = usize::from(note.column);
            if col >= column_notes.len() {
                column_notes.resize_with(col + 1, Vec::new);
            }
            column_notes[col].push(i);
        }
        Self {
            difficulty,
            notes,
            measures,
            counts,
            column_notes,
            note_window: Window::default(),
            measure_window: Window::default(),
            miss_cursor: 0,
        }
    }

    #[inline(always)]
    pub fn key_count(&self) -> u8 {
        self.difficulty.key_count
    }

    pub fn hash(&self) -> String {
        self.difficulty.hash()
    }

    /// Judgeable candidates for a column, as indices into `notes`.
    #[inline(always)]
    pub fn column_notes(&self, column: u8) -> &[usize] {
        self.column_notes
            .get(usize::from(column))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn non_mine_count(&self) -> usize {
        self.column_notes.iter().map(Vec::len).sum()
    }

    /// Latest head or tail time in the chart.
    pub fn last_time_ns(&self) -> Option<i64> {
        self.notes.iter().map(Note::last_time_ns).max()
    }

    pub fn active_notes(&self) -> (&[Note], Window) {
        let w = self.note_window;
        (&self.notes[w.start..w.end], w)
    }

    pub fn active_measures(&self) -> (&[Measure], Window) {
        let w = self.measure_window;
        (&self.measures[w.start..w.end], w)
    }

    #[inline(always)]
    pub const fn note_window(&self) -> Window {
        self.note_window
    }

    #[inline(always)]
    pub const fn measure_window(&self) -> Window {
        self.measure_window
    }

    pub(crate) fn set_note_window(&mut self, window: Window) {
        debug_assert!(window.start >= self.note_window.start && window.end >= self.note_window.end);
        debug_assert!(window.start <= window.end && window.end <= self.notes.len());
        self.note_window = window;
    }

    #[inline(always)]
    pub const fn miss_cursor(&self) -> usize {
        self.miss_cursor
    }

    pub(crate) fn set_miss_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor >= self.miss_cursor && cursor <= self.notes.len());
        self.miss_cursor = cursor;
    }

    pub(crate) fn set_measure_window(&mut self, window: Window) {
        debug_assert!(
            window.start >= self.measure_window.start && window.end >= self.measure_window.end
        );
        debug_assert!(window.start <= window.end && window.end <= self.measures.len());
        self.measure_window = window;
    }

    /// Clears per-note session state and rewinds both windows to `(0, 0)`.
    pub fn reset_session(&mut self) {
        for note in &mut self.notes {
            note.reset();
        }
        self.note_window = Window::default();
        self.measure_window = Window::default();
        self.miss_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{Chart, ChartCounts, Difficulty, key_count_for_type};
    use crate::game::note::Note;

    fn difficulty(section: &str) -> Difficulty {
        Difficulty {
            name: "Hard".to_string(),
            meter: "9".to_string(),
            key_count: 4,
            section: section.to_string(),
        }
    }

    #[test]
    fn recognizes_known_chart_types_only() {
        assert_eq!(key_count_for_type("dance-single"), Some(4));
        assert_eq!(key_count_for_type("dance-solo"), Some(6));
        assert_eq!(key_count_for_type("dance-double"), Some(8));
        assert_eq!(key_count_for_type("pump-single"), None);
    }

    #[test]
    fn hash_is_stable_and_filename_safe() {
        let a = difficulty("1000\n0000\n");
        let b = difficulty("1000\n0000\n");
        let c = difficulty("0100\n0000\n");
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert!(
            a.hash().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "hash={}",
            a.hash()
        );
        assert_eq!(a.hash().len(), 43);
    }

    #[test]
    fn column_index_skips_mines() {
        let notes = vec![
            Note::new(0, 0, 1, false),
            Note::new(0, 10, 1, true),
            Note::new(1, 20, 1, false),
            Note::new(0, 30, 1, false),
        ];
        let chart = Chart::new(difficulty(""), notes, Vec::new(), ChartCounts::default());
        assert_eq!(chart.column_notes(0), &[0, 3]);
        assert_eq!(chart.column_notes(1), &[2]);
        assert!(chart.column_notes(7).is_empty());
        assert_eq!(chart.non_mine_count(), 3);
        assert_eq!(chart.last_time_ns(), Some(30));
    }

    #[test]
    fn reset_session_rewinds_windows() {
        let notes = vec![Note::new(0, 0, 1, false), Note::new(1, 5, 1, false)];
        let mut chart = Chart::new(difficulty(""), notes, Vec::new(), ChartCounts::default());
        chart.notes[0].hit_time_ns = Some(1);
        chart.set_note_window(super::Window { start: 1, end: 2 });
        chart.set_miss_cursor(1);
        chart.reset_session();
        assert_eq!(chart.miss_cursor(), 0);
        assert_eq!(chart.note_window(), super::Window::default());
        assert!(chart.notes.iter().all(|n| !n.is_hit()));
        assert!(chart.active_notes().0.is_empty());
    }
}
