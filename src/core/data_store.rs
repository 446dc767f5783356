use std::collections::BTreeMap;
use super::ring::{Id, KeyRange};

pub type Key = Id;
pub type Value = String;

pub trait KVStore {
	fn get(&self, key: Key) -> Option<Value>;
	fn put(&mut self, key: Key, value: Value);
	fn delete(&mut self, key: Key) -> bool;
}

/// Ordered key-value store of a single node.
/// Not synchronized itself; it lives inside the node state lock.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
	data: BTreeMap<Key, Value>
}

impl DataStore {
	pub fn new() -> Self {
		DataStore {
			data: BTreeMap::new()
		}
	}

	pub fn from_map(data: BTreeMap<Key, Value>) -> Self {
		DataStore { data }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn keys(&self) -> Vec<Key> {
		self.data.keys().copied().collect()
	}

	pub fn snapshot(&self) -> BTreeMap<Key, Value> {
		self.data.clone()
	}

	/**
	 * Remove and return all entries within the (inclusive, wrapping) range
	 */
	pub fn extract_range(&mut self, range: KeyRange) -> BTreeMap<Key, Value> {
		if range.start <= range.end {
			let mut extracted = self.data.split_off(&range.start);
			let mut rest = extracted.split_off(&(range.end + 1));
			self.data.append(&mut rest);
			extracted
		}
		else {
			// [start, MAX) and [0, end]
			let mut extracted = self.data.split_off(&range.start);
			let rest = self.data.split_off(&(range.end + 1));
			extracted.append(&mut self.data);
			self.data = rest;
			extracted
		}
	}

	/// Take all entries, leaving the store empty
	pub fn take_all(&mut self) -> BTreeMap<Key, Value> {
		std::mem::take(&mut self.data)
	}

	pub fn merge(&mut self, mut entries: BTreeMap<Key, Value>) {
		self.data.append(&mut entries);
	}
}

impl KVStore for DataStore {
	fn get(&self, key: Key) -> Option<Value> {
		self.data.get(&key).cloned()
	}

	fn put(&mut self, key: Key, value: Value) {
		self.data.insert(key, value);
	}

	fn delete(&mut self, key: Key) -> bool {
		self.data.remove(&key).is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store_with(keys: &[Key]) -> DataStore {
		let mut store = DataStore::new();
		for k in keys {
			store.put(*k, format!("v{}", k));
		}
		store
	}

	#[test]
	fn test_point_operations() {
		let mut store = DataStore::new();
		assert_eq!(store.get(3), None);
		store.put(3, "a".to_string());
		assert_eq!(store.get(3), Some("a".to_string()));
		store.put(3, "b".to_string());
		assert_eq!(store.get(3), Some("b".to_string()));
		assert!(store.delete(3));
		assert!(!store.delete(3));
		assert!(store.is_empty());
	}

	#[test]
	fn test_extract_plain_range() {
		let mut store = store_with(&[0, 1, 42, 500, 501, 1023]);
		let extracted = store.extract_range(KeyRange::new(1, 500));
		assert_eq!(extracted.keys().copied().collect::<Vec<_>>(), vec![1, 42, 500]);
		assert_eq!(extracted.get(&42), Some(&"v42".to_string()));
		assert_eq!(store.keys(), vec![0, 501, 1023]);
	}

	#[test]
	fn test_extract_up_to_max_key() {
		let mut store = store_with(&[0, 10, 1023]);
		let extracted = store.extract_range(KeyRange::new(5, 1023));
		assert_eq!(extracted.keys().copied().collect::<Vec<_>>(), vec![10, 1023]);
		assert_eq!(store.keys(), vec![0]);
	}

	#[test]
	fn test_extract_wrapping_range() {
		let mut store = store_with(&[0, 100, 200, 201, 899, 900, 1023]);
		let extracted = store.extract_range(KeyRange::new(900, 200));
		assert_eq!(extracted.keys().copied().collect::<Vec<_>>(), vec![0, 100, 200, 900, 1023]);
		assert_eq!(store.keys(), vec![201, 899]);
	}

	#[test]
	fn test_merge_and_take() {
		let mut store = store_with(&[1, 2]);
		let mut other = store_with(&[3]);
		store.merge(other.take_all());
		assert!(other.is_empty());
		assert_eq!(store.keys(), vec![1, 2, 3]);
		assert_eq!(store.take_all().len(), 3);
		assert!(store.is_empty());
	}
}
