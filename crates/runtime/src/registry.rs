//! Stream id allocation and per-id record tables.
//!
//! Uses [`DashMap`] for concurrent access from the dispatch loop and from
//! stream tasks. Lookups hand out clones so no shard lock is held while a
//! record is being used.

use std::sync::atomic::{AtomicU64, Ordering};

use bridge_protocol::StreamId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Strictly increasing stream ids, starting at 1.
///
/// One sequence serves both native and remote streams, so an id never names
/// two streams at once within a bridge's lifetime.
#[derive(Debug, Default)]
pub struct IdSequence {
	last: AtomicU64,
}

impl IdSequence {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next unused id.
	pub fn next_id(&self) -> StreamId {
		self.last.fetch_add(1, Ordering::SeqCst) + 1
	}

	/// Returns the most recently issued id, or 0 if none was issued.
	pub fn last(&self) -> StreamId {
		self.last.load(Ordering::SeqCst)
	}
}

/// Records keyed by stream id.
pub struct StreamTable<R> {
	records: DashMap<StreamId, R>,
}

impl<R> Default for StreamTable<R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R> StreamTable<R> {
	pub fn new() -> Self {
		Self {
			records: DashMap::new(),
		}
	}

	/// Inserts a record unless the id is taken. Returns false if it was.
	pub fn insert(&self, id: StreamId, record: R) -> bool {
		match self.records.entry(id) {
			Entry::Occupied(_) => false,
			Entry::Vacant(slot) => {
				slot.insert(record);
				true
			}
		}
	}

	/// Removes and returns a record. Unknown ids yield `None`.
	pub fn remove(&self, id: StreamId) -> Option<R> {
		self.records.remove(&id).map(|(_, record)| record)
	}

	pub fn contains(&self, id: StreamId) -> bool {
		self.records.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Removes every record, returning them.
	pub fn drain(&self) -> Vec<R> {
		let ids: Vec<StreamId> = self.records.iter().map(|entry| *entry.key()).collect();
		ids.into_iter().filter_map(|id| self.remove(id)).collect()
	}
}

impl<R: Clone> StreamTable<R> {
	/// Returns a clone of the record for `id`. Unknown ids yield `None`.
	pub fn lookup(&self, id: StreamId) -> Option<R> {
		self.records.get(&id).map(|entry| entry.value().clone())
	}
}
