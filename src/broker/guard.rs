//! Lazily populated table of per-key locks.

// self
use crate::_prelude::*;

/// Map from key to a shared lock, populated on checkout and pruned once unused.
#[derive(Debug)]
pub(crate) struct LockTable<K, L> {
	slots: Mutex<HashMap<K, Arc<L>>>,
}
impl<K, L> LockTable<K, L>
where
	K: Clone + Eq + Hash,
	L: Default,
{
	/// Returns the lock for `key`, creating it when no one else holds it.
	pub(crate) fn checkout(&self, key: K) -> LockSlot<'_, K, L> {
		let lock = self.slots.lock().entry(key.clone()).or_default().clone();

		LockSlot { table: self, key, lock }
	}

	/// Number of keys with at least one live slot.
	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.slots.lock().len()
	}

	fn release(&self, key: &K, lock: &Arc<L>) {
		let mut slots = self.slots.lock();

		// Clones are only made under the map lock, so the count cannot grow here.
		if Arc::strong_count(lock) == 2 && slots.get(key).is_some_and(|held| Arc::ptr_eq(held, lock)) {
			slots.remove(key);
		}
	}
}
impl<K, L> Default for LockTable<K, L> {
	fn default() -> Self {
		Self { slots: Mutex::new(HashMap::new()) }
	}
}

/// Checked-out lock; derefs to the lock itself and prunes the table entry on drop.
///
/// Guards obtained from the lock borrow the slot, so they are always released first.
pub(crate) struct LockSlot<'a, K, L>
where
	K: Clone + Eq + Hash,
	L: Default,
{
	table: &'a LockTable<K, L>,
	key: K,
	lock: Arc<L>,
}
impl<K, L> std::ops::Deref for LockSlot<'_, K, L>
where
	K: Clone + Eq + Hash,
	L: Default,
{
	type Target = L;

	fn deref(&self) -> &Self::Target {
		&self.lock
	}
}
impl<K, L> Drop for LockSlot<'_, K, L>
where
	K: Clone + Eq + Hash,
	L: Default,
{
	fn drop(&mut self) {
		self.table.release(&self.key, &self.lock);
	}
}
