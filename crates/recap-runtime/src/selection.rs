//! Range selection for scene creation.
//!
//! One [`SelectionSession`] lives for as long as the host's selection mode
//! is open. The first toggle anchors, the second closes the range in either
//! direction, and a further toggle starts over.

use std::ops::RangeInclusive;

/// Where a selection stands after a toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    /// Nothing selected.
    Empty,
    /// One end chosen.
    Anchored(usize),
    /// Both ends chosen.
    Complete {
        /// Lower position.
        start: usize,
        /// Upper position.
        end: usize,
    },
}

/// Session-scoped selection context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionSession {
    anchor: Option<usize>,
    end: Option<usize>,
}

impl SelectionSession {
    /// Open a fresh selection.
    pub fn begin() -> Self {
        Self::default()
    }

    /// Toggle `position`.
    ///
    /// Toggling the lone anchor again clears it.
    pub fn toggle(&mut self, position: usize) -> SelectionState {
        match (self.anchor, self.end) {
            (Some(anchor), None) if anchor == position => self.anchor = None,
            (Some(_), None) => self.end = Some(position),
            _ => {
                self.anchor = Some(position);
                self.end = None;
            }
        }
        self.state()
    }

    /// Current state.
    pub fn state(&self) -> SelectionState {
        match (self.anchor, self.end) {
            (None, _) => SelectionState::Empty,
            (Some(a), None) => SelectionState::Anchored(a),
            (Some(a), Some(b)) => SelectionState::Complete {
                start: a.min(b),
                end: a.max(b),
            },
        }
    }

    /// Selected positions, ordered. A lone anchor selects one message.
    pub fn range(&self) -> Option<RangeInclusive<usize>> {
        match self.state() {
            SelectionState::Empty => None,
            SelectionState::Anchored(a) => Some(a..=a),
            SelectionState::Complete { start, end } => Some(start..=end),
        }
    }

    /// Whether `position` falls inside the current selection.
    pub fn contains(&self, position: usize) -> bool {
        self.range().is_some_and(|r| r.contains(&position))
    }

    /// Clear without leaving selection mode.
    pub fn reset(&mut self) {
        self.anchor = None;
        self.end = None;
    }
}
