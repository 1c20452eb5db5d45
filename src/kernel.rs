//! Kernel slot selection order
//!
//! Shared by the dual-copy and raw-flash tables. Slots rank by priority
//! (higher first), ties broken by entry index (lower first). The cursor
//! remembers the last slot handed out so repeated calls walk the ranking
//! without revisiting a slot.

/// A candidate kernel slot, identified by its entry index.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub index: usize,
    pub priority: u8,
}

/// Position in the selection walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// No slot handed out yet; everything is admissible.
    Start,
    /// A slot was handed out; only strictly-later slots are admissible.
    At { priority: u8, index: usize },
    /// The walk ran past the last slot.
    Exhausted,
}

impl Cursor {
    /// Whether a candidate comes after the cursor in selection order.
    pub fn admits(self, c: Candidate) -> bool {
        match self {
            Cursor::Start => true,
            Cursor::Exhausted => false,
            Cursor::At { priority, index } => {
                c.priority < priority || (c.priority == priority && c.index > index)
            }
        }
    }
}

/// Whether `a` is selected in preference to `b`.
fn ranks_before(a: Candidate, b: Candidate) -> bool {
    a.priority > b.priority || (a.priority == b.priority && a.index < b.index)
}

/// Pick the best admissible candidate, if any.
pub(crate) fn select_next<I>(cursor: Cursor, candidates: I) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    let mut best: Option<Candidate> = None;
    for c in candidates {
        if !cursor.admits(c) {
            continue;
        }
        match best {
            Some(b) if !ranks_before(c, b) => {}
            _ => best = Some(c),
        }
    }
    best
}
