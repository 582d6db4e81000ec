//! Undo journal backing world-state snapshots.
//!
//! Every mutation of the world state records one entry describing how to
//! undo it. A snapshot is the journal length at the time it was taken;
//! reverting pops entries back to that length and hands them to the caller
//! newest-first so they can be undone in LIFO order. Reverting to an outer
//! snapshot also invalidates every snapshot taken after it.

/// Opaque token returned by [`Journal::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot(usize);

impl Snapshot {
    /// Numeric id of the snapshot, in creation order.
    pub fn id(self) -> usize {
        self.0
    }
}

/// Append-only log of undo entries with nested snapshot marks.
#[derive(Debug, Clone)]
pub struct Journal<T> {
    /// Recorded undo entries, oldest first.
    entries: Vec<T>,
    /// Journal length at each live snapshot, indexed by snapshot id.
    marks: Vec<usize>,
}

impl<T> Journal<T> {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Record an undo entry.
    pub fn record(&mut self, entry: T) {
        self.entries.push(entry);
    }

    /// Mark the current position and return its token.
    pub fn snapshot(&mut self) -> Snapshot {
        let id = self.marks.len();
        self.marks.push(self.entries.len());
        Snapshot(id)
    }

    /// Returns true if `snapshot` can still be reverted to.
    pub fn is_valid(&self, snapshot: Snapshot) -> bool {
        snapshot.0 < self.marks.len()
    }

    /// Remove every entry recorded after `snapshot`, newest first.
    ///
    /// Returns `None` if the snapshot was already invalidated by an earlier
    /// revert or a [`Journal::clear`]; the journal is left untouched then.
    pub fn revert_to(&mut self, snapshot: Snapshot) -> Option<Vec<T>> {
        let mark = *self.marks.get(snapshot.0)?;
        self.marks.truncate(snapshot.0);
        let mut undone = self.entries.split_off(mark);
        undone.reverse();
        Some(undone)
    }

    /// Forget all entries and snapshots, making past mutations permanent.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.marks.clear();
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}
