/// A single chart event. Timing fields are fixed by the parser; the
/// `*_time_ns` state fields are only written during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub column: u8,
    pub time_ns: i64,
    /// Tail time for holds and rolls.
    pub end_time_ns: Option<i64>,
    pub is_mine: bool,
    /// Reduced denominator of the row's beat position (1 = 4th, 2 = 8th, 3 = 12th, ...).
    pub denom: u32,

    pub hit_time_ns: Option<i64>,
    pub release_time_ns: Option<i64>,
    pub miss_time_ns: Option<i64>,
}

impl Note {
    pub const fn new(column: u8, time_ns: i64, denom: u32, is_mine: bool) -> Self {
        Self {
            column,
            time_ns,
            end_time_ns: None,
            is_mine,
            denom,
            hit_time_ns: None,
            release_time_ns: None,
            miss_time_ns: None,
        }
    }

    #[inline(always)]
    pub const fn is_hold(&self) -> bool {
        self.end_time_ns.is_some()
    }

    #[inline(always)]
    pub const fn is_hit(&self) -> bool {
        self.hit_time_ns.is_some()
    }

    /// Whether an input may still be matched against this note. A note
    /// that has expired as a miss stays missed.
    #[inline(always)]
    pub const fn is_judgeable(&self) -> bool {
        !self.is_mine && self.hit_time_ns.is_none() && self.miss_time_ns.is_none()
    }

    /// The latest chart time this note stays relevant: the tail for holds.
    #[inline(always)]
    pub fn last_time_ns(&self) -> i64 {
        self.end_time_ns.unwrap_or(self.time_ns)
    }

    pub fn reset(&mut self) {
        self.hit_time_ns = None;
        self.release_time_ns = None;
        self.miss_time_ns = None;
    }
}

/// Gridline marker. `denom` is the musical note value the line sits on:
/// 1 for the start of a measure, 4 for a beat, 8 for an off-beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub denom: u32,
    pub time_ns: i64,
}

#[cfg(test)]
mod tests {
    use super::Note;

    #[test]
    fn reset_clears_only_session_state() {
        let mut note = Note::new(2, 1_000, 4, false);
        note.end_time_ns = Some(2_000);
        note.hit_time_ns = Some(1_010);
        note.release_time_ns = Some(1_990);
        note.reset();
        assert!(!note.is_hit());
        assert_eq!(note.release_time_ns, None);
        assert_eq!(note.end_time_ns, Some(2_000));
        assert_eq!(note.last_time_ns(), 2_000);
    }

    #[test]
    fn mines_are_never_judgeable() {
        let mine = Note::new(0, 0, 1, true);
        assert!(!mine.is_judgeable());
        let mut tap = Note::new(0, 0, 1, false);
        assert!(tap.is_judgeable());
        tap.miss_time_ns = Some(200);
        assert!(!tap.is_judgeable());
    }
}
