use crate::core::render::{Renderer, Rgb, colored};
use crate::game::gameplay::{Session, SessionEvent};
use crate::game::note::Note;
use crate::game::timing::{distance, ns_to_ms_f64};
use std::time::Duration;

// --- CONSTANTS ---

const NOTE_GLYPH: &str = "⬤";
const MINE_GLYPH: &str = "x";
const HOLD_BODY_GLYPH: &str = "┃";
const HIT_FIELD_GLYPH: &str = "-";

const SPLASH_FRAMES: u32 = 120;
const JUDGMENT_FRAMES: u32 = 120;
const MISS_FLASH_FRAMES: u32 = 240;

// Side panel rows.
const ROW_WINDOW: u16 = 2;
const ROW_RENDER: u16 = 3;
const ROW_LAST: u16 = 9;
const ROW_ERROR: u16 = 10;
const ROW_STDDEV: u16 = 11;
const ROW_MEAN: u16 = 12;
const ROW_TOTAL: u16 = 13;
const ROW_HOLDS: u16 = 14;
const ROW_MINES: u16 = 15;
const ROW_CHORDS: u16 = 16;
const ROW_JUDGMENTS: u16 = 18;

const PANEL_WIDTH: u16 = 36;
const PANEL_DATA_OFFSET: u16 = 14;

const NOTE_COLORS: [(u32, Rgb); 13] = [
    (1, Rgb(236, 30, 0)),     // 4th
    (2, Rgb(0, 118, 236)),    // 8th
    (3, Rgb(106, 0, 236)),    // 12th
    (4, Rgb(236, 195, 0)),    // 16th
    (5, Rgb(106, 106, 106)),  // 20th
    (6, Rgb(236, 0, 106)),    // 24th
    (8, Rgb(236, 128, 0)),    // 32nd
    (12, Rgb(173, 236, 236)), // 48th
    (16, Rgb(0, 236, 128)),   // 64th
    (24, Rgb(106, 106, 106)),
    (32, Rgb(106, 106, 106)),
    (48, Rgb(110, 147, 89)),
    (64, Rgb(106, 106, 106)),
];
const OTHER_NOTE_COLOR: Rgb = Rgb(255, 255, 255);
const MINE_COLOR: Rgb = Rgb(236, 30, 0);
const MISS_COLOR: Rgb = Rgb(220, 20, 20);

pub fn note_color(denom: u32) -> Rgb {
    NOTE_COLORS
        .iter()
        .find(|(d, _)| *d == denom)
        .map_or(OTHER_NOTE_COLOR, |&(_, c)| c)
}

fn measure_glyph(denom: u32) -> (&'static str, Rgb) {
    match denom {
        1 => ("━", Rgb(120, 120, 120)),
        4 => ("─", Rgb(70, 70, 70)),
        _ => ("┄", Rgb(40, 40, 40)),
    }
}

/// Screen geometry for one chart on a terminal of `rows` x `cols` cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub rows: u16,
    pub hit_row: u16,
    pub middle_col: u16,
    pub middle_row: u16,
    pub spacing: u16,
    pub key_count: u8,
    pub ns_to_row: f64,
}

impl Layout {
    pub fn new(rows: u16, cols: u16, bar_row: u16, spacing: u16, key_count: u8, ns_to_row: f64) -> Self {
        Self {
            rows,
            hit_row: rows.saturating_sub(bar_row).max(1),
            middle_col: cols >> 1,
            middle_row: rows >> 1,
            spacing,
            key_count,
            ns_to_row,
        }
    }

    /// Terminal column of chart column `index`, centred on the middle column.
    pub fn column_x(&self, index: u8) -> u16 {
        let mid = self.key_count >> 1;
        if index < mid {
            let steps = u16::from(self.key_count - mid - index);
            self.middle_col.saturating_sub(self.spacing * steps).max(1)
        } else {
            self.middle_col + self.spacing * u16::from(index - mid)
        }
    }

    pub fn side_col(&self) -> u16 {
        self.column_x(0).saturating_sub(PANEL_WIDTH).max(2)
    }

    #[inline(always)]
    pub fn side_data_col(&self) -> u16 {
        self.side_col() + PANEL_DATA_OFFSET
    }

    /// Row at which an event `distance_ns` away from the hit line is drawn,
    /// or `None` when it falls outside the screen.
    pub fn row_for(&self, distance_ns: i64) -> Option<u16> {
        let offset = (distance_ns as f64 * self.ns_to_row) as i64;
        let row = i64::from(self.hit_row) - offset;
        (1..=i64::from(self.rows)).contains(&row).then_some(row as u16)
    }
}

#[derive(Debug)]
struct Decoration {
    row: u16,
    col: u16,
    glyph: String,
    frames: u32,
}

/// Draws a running session: the note field, the side panel and short-lived
/// decorations. Holds only presentation state.
pub struct GameplayScreen {
    layout: Layout,
    // Cells painted by the previous frame's note field: row, column, width.
    drawn: Vec<(u16, u16, usize)>,
    decorations: Vec<Decoration>,
    debug_update_rate: u64,
    frames: u64,
    render_time: Duration,
}

impl GameplayScreen {
    pub fn new(layout: Layout, debug_update_rate: u32) -> Self {
        Self {
            layout,
            drawn: Vec::with_capacity(256),
            decorations: Vec::new(),
            debug_update_rate: u64::from(debug_update_rate.max(1)),
            frames: 0,
            render_time: Duration::ZERO,
        }
    }

    /// Panel labels and chart totals; drawn once before the first frame.
    pub fn draw_static(&self, r: &mut impl Renderer, session: &Session) {
        let side = self.layout.side_col();
        let counts = &session.chart.counts;
        r.fill(ROW_RENDER, side, "     Render:  ");
        r.fill(ROW_LAST, side, "   Last hit:  ");
        r.fill(ROW_ERROR, side, "   Error dt:  ");
        r.fill(ROW_STDDEV, side, "      Stdev:  ");
        r.fill(ROW_MEAN, side, "       Mean:  ");
        r.fill(ROW_TOTAL, side, &format!("      Total:  {:6}", counts.notes));
        r.fill(ROW_HOLDS, side, &format!("      Holds:  {:6}", counts.holds));
        r.fill(ROW_MINES, side, &format!("      Mines:  {:6}", counts.mines));
        let chords: Vec<String> = counts.simultaneous.iter().map(u32::to_string).collect();
        r.fill(ROW_CHORDS, side, &format!("     Chords:  {}", chords.join("/")));
        for (i, judgment) in session.judgments.iter().enumerate() {
            let row = ROW_JUDGMENTS + i as u16;
            r.fill(row, side, &format!("{:>11}:  {:6}", judgment.label, 0));
        }
        self.draw_hit_field(r);
    }

    fn draw_hit_field(&self, r: &mut impl Renderer) {
        for i in 0..self.layout.key_count {
            r.fill(self.layout.hit_row, self.layout.column_x(i), HIT_FIELD_GLYPH);
        }
    }

    fn decorate(&mut self, row: u16, col: u16, glyph: String, frames: u32) {
        self.decorations.push(Decoration { row, col, glyph, frames });
    }

    /// Turns session events into decorations and panel updates.
    pub fn apply_events(&mut self, r: &mut impl Renderer, session: &mut Session) {
        let data = self.layout.side_data_col();
        let events: Vec<SessionEvent> = session.drain_events().collect();
        for event in events {
            match event {
                SessionEvent::Whiff { column } => {
                    let col = self.layout.column_x(column);
                    self.decorate(self.layout.hit_row, col, "*".to_string(), SPLASH_FRAMES);
                }
                SessionEvent::Hit {
                    column,
                    judgment,
                    distance_ns,
                } => {
                    let col = self.layout.column_x(column);
                    self.decorate(self.layout.hit_row, col, "*".to_string(), SPLASH_FRAMES);
                    if let Some(j) = session.judgments.get(judgment) {
                        let label = format!("{:^11}", j.label);
                        let start = self.layout.middle_col.saturating_sub(5).max(1);
                        self.decorate(self.layout.middle_row, start, label, JUDGMENT_FRAMES);
                    }
                    let stats = &session.stats;
                    r.fill(ROW_LAST, data, &format!("{:+6.1} ms", ns_to_ms_f64(distance_ns as f64)));
                    r.fill(ROW_ERROR, data, &format!("{:6.0} ms", ns_to_ms_f64(stats.sum_abs_ns as f64)));
                    r.fill(ROW_STDDEV, data, &format!("{:6.2} ms", ns_to_ms_f64(stats.stddev_ns)));
                    r.fill(ROW_MEAN, data, &format!("{:6.2} ms", ns_to_ms_f64(stats.mean_ns)));
                    self.fill_count(r, session, judgment);
                }
                SessionEvent::Miss { column } => {
                    let col = self.layout.column_x(column);
                    let (top, mid) = (self.layout.middle_row.saturating_sub(1).max(1), self.layout.middle_row);
                    let corners = [
                        (top, col.saturating_sub(1).max(1), "╭"),
                        (top, col + 1, "╮"),
                        (mid, col.saturating_sub(1).max(1), "╰"),
                        (mid, col + 1, "╯"),
                    ];
                    for (row, c, glyph) in corners {
                        self.decorate(row, c, colored(MISS_COLOR, glyph), MISS_FLASH_FRAMES);
                    }
                    self.fill_count(r, session, session.judgments.miss_index());
                }
            }
        }
    }

    fn fill_count(&self, r: &mut impl Renderer, session: &Session, judgment: usize) {
        let count = session.stats.counts.get(judgment).copied().unwrap_or(0);
        r.fill(ROW_JUDGMENTS + judgment as u16, self.layout.side_data_col(), &format!("{count:6}"));
    }

    fn paint(&mut self, r: &mut impl Renderer, row: u16, col: u16, glyph: &str, width: usize) {
        r.fill(row, col, glyph);
        self.drawn.push((row, col, width));
    }

    fn draw_measures(&mut self, r: &mut impl Renderer, session: &Session, now_ns: i64) {
        let first = self.layout.column_x(0).saturating_sub(2).max(1);
        let last = self.layout.column_x(self.layout.key_count.saturating_sub(1)) + 2;
        let (measures, _) = session.chart.active_measures();
        for m in measures {
            let Some(row) = self.layout.row_for(distance(session.rate, m.time_ns, now_ns)) else {
                continue;
            };
            let (glyph, color) = measure_glyph(m.denom);
            let width = usize::from(last - first + 1);
            self.paint(r, row, first, &colored(color, &glyph.repeat(width)), width);
        }
    }

    fn draw_note(&mut self, r: &mut impl Renderer, note: &Note, rate: u16, now_ns: i64) {
        let col = self.layout.column_x(note.column);
        if note.is_mine {
            if let Some(row) = self.layout.row_for(distance(rate, note.time_ns, now_ns)) {
                self.paint(r, row, col, &colored(MINE_COLOR, MINE_GLYPH), 1);
            }
            return;
        }

        let color = note_color(note.denom);
        if let Some(end_ns) = note.end_time_ns
            && note.release_time_ns.is_none()
        {
            let head = i64::from(self.layout.hit_row) - (distance(rate, note.time_ns, now_ns) as f64 * self.layout.ns_to_row) as i64;
            let tail = i64::from(self.layout.hit_row) - (distance(rate, end_ns, now_ns) as f64 * self.layout.ns_to_row) as i64;
            // A held note's body stops at the hit line.
            let bottom = if note.is_hit() { head.min(i64::from(self.layout.hit_row) - 1) } else { head - 1 };
            let top = tail.max(1);
            let body = colored(color, HOLD_BODY_GLYPH);
            for row in top..=bottom.min(i64::from(self.layout.rows)) {
                self.paint(r, row as u16, col, &body, 1);
            }
        }

        if note.is_hit() {
            return;
        }
        if let Some(row) = self.layout.row_for(distance(rate, note.time_ns, now_ns)) {
            self.paint(r, row, col, &colored(color, NOTE_GLYPH), 1);
        }
    }

    /// Clears last frame's note field and paints the current one.
    pub fn draw_frame(&mut self, r: &mut impl Renderer, session: &Session, now_ns: i64) {
        for (row, col, width) in std::mem::take(&mut self.drawn) {
            r.fill(row, col, &" ".repeat(width));
        }
        self.draw_measures(r, session, now_ns);
        self.draw_hit_field(r);

        let (notes, _) = session.chart.active_notes();
        for note in notes {
            self.draw_note(r, note, session.rate, now_ns);
        }
        self.tick_decorations(r);
    }

    fn tick_decorations(&mut self, r: &mut impl Renderer) {
        self.decorations.retain_mut(|d| {
            if d.frames == 0 {
                r.fill(d.row, d.col, &" ".repeat(d.glyph_width()));
                return false;
            }
            r.fill(d.row, d.col, &d.glyph);
            d.frames -= 1;
            true
        });
    }

    /// Accumulates frame render time and refreshes the debug rows every
    /// `debug_update_rate` frames.
    pub fn record_frame(&mut self, r: &mut impl Renderer, session: &Session, render_time: Duration) {
        self.frames += 1;
        self.render_time += render_time;
        if self.frames % self.debug_update_rate != 0 {
            return;
        }
        let window = session.chart.note_window();
        r.fill(
            ROW_WINDOW,
            self.layout.side_col(),
            &format!("     Window:  {} - {} ({})   ", window.start, window.end, window.len()),
        );
        let avg_ns = self.render_time.as_nanos() / u128::from(self.frames);
        r.fill(ROW_RENDER, self.layout.side_data_col(), &format!("{avg_ns} ns "));
    }
}

impl Decoration {
    // Visible width, ignoring colour escapes.
    fn glyph_width(&self) -> usize {
        let mut width = 0;
        let mut in_escape = false;
        for c in self.glyph.chars() {
            match c {
                '\x1b' => in_escape = true,
                'm' if in_escape => in_escape = false,
                _ if in_escape => {}
                _ => width += 1,
            }
        }
        width.max(1)
    }
}
