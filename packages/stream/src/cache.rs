//! Session record cache.

/// Append-only cache of the records received by one streaming session.
///
/// Insertion order is source file order, and the index of a record here
/// is the index used for decimation.
#[derive(Debug, Clone)]
pub struct RecordCache<R> {
    records: Vec<R>,
    batches: usize,
    complete: bool,
}

impl<R> Default for RecordCache<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            batches: 0,
            complete: false,
        }
    }
}

impl<R> RecordCache<R> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All cached records in arrival order.
    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of batches flushed into the cache.
    #[must_use]
    pub const fn batches(&self) -> usize {
        self.batches
    }

    /// Returns `true` once the `done` event has been processed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Appends one flushed batch.
    pub fn append(&mut self, batch: Vec<R>) {
        if batch.is_empty() {
            return;
        }
        self.records.extend(batch);
        self.batches += 1;
    }

    /// Marks the stream as fully loaded.
    pub const fn mark_complete(&mut self) {
        self.complete = true;
    }
}
