//! Append-only stroke history with a linear undo cursor.
//!
//! Entries before the cursor are applied, entries after it are redoable.
//! Appending after an undo truncates the redoable suffix.

use serde::{Deserialize, Serialize};

use crate::stroke::Stroke;

/// Undo/redo availability reported after every history operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFlags {
    pub can_undo: bool,
    pub can_redo: bool,
}

impl HistoryFlags {
    pub fn new(can_undo: bool, can_redo: bool) -> Self {
        Self { can_undo, can_redo }
    }
}

/// The visible strokes of a room plus its flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub strokes: Vec<Stroke>,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl HistorySnapshot {
    pub fn flags(&self) -> HistoryFlags {
        HistoryFlags::new(self.can_undo, self.can_redo)
    }
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Stroke(Stroke),
    Clear,
}

/// Per-room history log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    /// Number of applied entries.
    applied: usize,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> HistoryFlags {
        HistoryFlags::new(self.can_undo(), self.can_redo())
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    /// Number of trailing entries currently hidden by undo.
    pub fn hidden(&self) -> usize {
        self.entries.len() - self.applied
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Append a stroke, discarding anything redoable.
    pub fn append(&mut self, stroke: Stroke) -> HistoryFlags {
        self.push(HistoryEntry::Stroke(stroke));
        self.flags()
    }

    /// Record a clear. Clearing an already blank board leaves the log untouched.
    pub fn clear(&mut self) -> HistoryFlags {
        if self.visible_strokes().next().is_some() {
            self.push(HistoryEntry::Clear);
        }
        self.flags()
    }

    pub fn undo(&mut self) -> HistoryFlags {
        if self.can_undo() {
            self.applied -= 1;
        }
        self.flags()
    }

    pub fn redo(&mut self) -> HistoryFlags {
        if self.can_redo() {
            self.applied += 1;
        }
        self.flags()
    }

    /// Strokes drawn since the last applied clear, in log order.
    pub fn visible_strokes(&self) -> impl Iterator<Item = &Stroke> {
        let applied = &self.entries[..self.applied];
        let start = applied
            .iter()
            .rposition(|entry| matches!(entry, HistoryEntry::Clear))
            .map_or(0, |i| i + 1);
        applied[start..].iter().filter_map(|entry| match entry {
            HistoryEntry::Stroke(stroke) => Some(stroke),
            HistoryEntry::Clear => None,
        })
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            strokes: self.visible_strokes().cloned().collect(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    fn push(&mut self, entry: HistoryEntry) {
        if self.can_redo() {
            log::debug!("discarding {} redoable history entries", self.hidden());
        }
        self.entries.truncate(self.applied);
        self.entries.push(entry);
        self.applied = self.entries.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{Segment, StrokeStyle};
    use kurbo::Point;

    fn stroke(x: f64) -> Stroke {
        Stroke::new(vec![Segment::new(
            Point::new(x, 0.0),
            Point::new(x + 1.0, 1.0),
            StrokeStyle::default(),
        )])
        .unwrap()
    }

    fn visible_ids(log: &HistoryLog) -> Vec<uuid::Uuid> {
        log.visible_strokes().map(|s| s.id).collect()
    }

    #[test]
    fn test_empty_log_has_no_flags() {
        let log = HistoryLog::new();
        assert_eq!(log.flags(), HistoryFlags::new(false, false));
        assert!(log.snapshot().strokes.is_empty());
    }

    #[test]
    fn test_append_enables_undo() {
        let mut log = HistoryLog::new();
        assert_eq!(log.append(stroke(0.0)), HistoryFlags::new(true, false));
    }

    #[test]
    fn test_undo_then_redo_restores_picture() {
        let mut log = HistoryLog::new();
        log.append(stroke(0.0));
        log.append(stroke(10.0));
        let before = log.snapshot();

        assert_eq!(log.undo(), HistoryFlags::new(true, true));
        assert_eq!(log.snapshot().strokes.len(), 1);
        assert_eq!(log.redo(), HistoryFlags::new(true, false));
        assert_eq!(log.snapshot(), before);
    }

    #[test]
    fn test_append_after_undo_truncates_redo() {
        let mut log = HistoryLog::new();
        log.append(stroke(0.0));
        let doomed = stroke(10.0);
        let doomed_id = doomed.id;
        log.append(doomed);
        log.undo();
        assert!(log.can_redo());

        let flags = log.append(stroke(20.0));
        assert_eq!(flags, HistoryFlags::new(true, false));
        assert_eq!(log.len(), 2);
        assert!(!visible_ids(&log).contains(&doomed_id));

        // Redo is a no-op now.
        log.redo();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_undo_and_redo_saturate() {
        let mut log = HistoryLog::new();
        assert_eq!(log.undo(), HistoryFlags::new(false, false));
        log.append(stroke(0.0));
        log.undo();
        assert_eq!(log.undo(), HistoryFlags::new(false, true));
        log.redo();
        assert_eq!(log.redo(), HistoryFlags::new(true, false));
    }

    #[test]
    fn test_clear_hides_earlier_strokes_and_is_undoable() {
        let mut log = HistoryLog::new();
        log.append(stroke(0.0));
        log.append(stroke(10.0));
        assert_eq!(log.clear(), HistoryFlags::new(true, false));
        assert!(log.snapshot().strokes.is_empty());

        log.append(stroke(20.0));
        assert_eq!(log.snapshot().strokes.len(), 1);

        log.undo();
        log.undo();
        assert_eq!(log.snapshot().strokes.len(), 2);
    }

    #[test]
    fn test_clear_on_blank_board_is_noop() {
        let mut log = HistoryLog::new();
        log.clear();
        assert!(log.is_empty());

        log.append(stroke(0.0));
        log.clear();
        let len = log.len();
        log.clear();
        assert_eq!(log.len(), len);
    }

    #[test]
    fn test_log_serde_roundtrip_keeps_cursor() {
        let mut log = HistoryLog::new();
        log.append(stroke(0.0));
        log.append(stroke(1.0));
        log.undo();
        let json = serde_json::to_string(&log).unwrap();
        let back: HistoryLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
        assert_eq!(back.hidden(), 1);
    }
}
