use crate::game::timing::NS_PER_MS;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Judgment {
    /// Exclusive upper bound of the absolute distance for this bucket.
    /// Negative for the trailing miss sentinel.
    pub threshold_ns: i64,
    pub label: String,
}

/// Ascending judgment buckets, always terminated by a miss sentinel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Judgments {
    entries: Vec<Judgment>,
}

pub const DEFAULT_WINDOWS_MS: [(i64, &str); 6] = [
    (11, "Exact"),
    (22, "Marvelous"),
    (45, "Perfect"),
    (90, "Great"),
    (135, "Good"),
    (180, "Boo"),
];
pub const DEFAULT_MISS_LABEL: &str = "Miss";

impl Default for Judgments {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOWS_MS
                .iter()
                .map(|&(ms, label)| Judgment {
                    threshold_ns: ms * NS_PER_MS,
                    label: label.to_string(),
                })
                .collect(),
            DEFAULT_MISS_LABEL,
        )
    }
}

impl Judgments {
    /// Builds the table from hit windows; windows are sorted ascending and
    /// non-positive thresholds are dropped. An empty list falls back to the
    /// default windows.
    pub fn new(mut windows: Vec<Judgment>, miss_label: &str) -> Self {
        windows.retain(|j| j.threshold_ns > 0);
        if windows.is_empty() {
            return Self::default();
        }
        windows.sort_by_key(|j| j.threshold_ns);
        windows.push(Judgment {
            threshold_ns: -1,
            label: miss_label.to_string(),
        });
        Self { entries: windows }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Judgment> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Judgment> {
        self.entries.get(index)
    }

    /// Index of the miss sentinel.
    #[inline(always)]
    pub fn miss_index(&self) -> usize {
        self.entries.len() - 1
    }

    /// Threshold of the last non-miss bucket.
    #[inline(always)]
    pub fn worst_threshold_ns(&self) -> i64 {
        self.entries[self.entries.len() - 2].threshold_ns
    }

    /// First bucket whose threshold exceeds `abs_distance_ns`. Never returns
    /// the miss sentinel; distances outside every window yield `None`.
    pub fn judge(&self, abs_distance_ns: i64) -> Option<usize> {
        self.entries[..self.miss_index()]
            .iter()
            .position(|j| abs_distance_ns < j.threshold_ns)
    }
}
