use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Index;

/// A scalar value carried by an entity label or a metric field.
///
/// Unlike `Value` (the metric value tagged union), fields never carry a float or a distribution:
/// label/field schemas are meant to be cheaply hashable and comparable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

fn hash_entries(data: &[(String, FieldValue)]) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// An ordered mapping from field name to `FieldValue`, sorted and de-duplicated by key.
///
/// Equality and hashing only depend on the set of `(name, value)` pairs, not on the order in which
/// they were originally supplied to `from`.
#[derive(Debug, Default, Clone, Eq)]
pub struct FieldMap {
    data: Vec<(String, FieldValue)>,
    hash: u64,
}

impl FieldMap {
    pub fn from<const N: usize>(entries: [(&str, FieldValue); N]) -> Self {
        let mut data = Vec::with_capacity(N);
        for (key, value) in entries {
            data.push((key.to_string(), value));
        }
        Self::from_vec(data)
    }

    fn from_vec(mut data: Vec<(String, FieldValue)>) -> Self {
        data.sort_unstable_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
        let mut i = 1;
        while i < data.len() {
            if data[i - 1].0 == data[i].0 {
                data.remove(i);
            } else {
                i += 1;
            }
        }
        let hash = hash_entries(&data);
        Self { data, hash }
    }

    /// The empty field map, used for the default entity and for metrics with no fields.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.data
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| &self.data[i].1)
    }

    pub fn cached_hash(&self) -> u64 {
        self.hash
    }

    pub fn as_view(&self) -> FieldMapView<'_> {
        FieldMapView { map: self }
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Hash for FieldMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Index<&str> for FieldMap {
    type Output = FieldValue;

    fn index(&self, index: &str) -> &Self::Output {
        self.get(index).expect("no such field")
    }
}

/// A non-owning reference to a `FieldMap` paired with its pre-computed hash.
///
/// `FieldMapView` and `FieldMap` hash and compare identically, so either can be used
/// interchangeably as a lookup key wherever the other is stored.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapView<'a> {
    map: &'a FieldMap,
}

impl<'a> FieldMapView<'a> {
    pub fn new(map: &'a FieldMap) -> Self {
        Self { map }
    }

    pub fn value(&self) -> &'a FieldMap {
        self.map
    }

    pub fn cached_hash(&self) -> u64 {
        self.map.hash
    }
}

impl PartialEq for FieldMapView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for FieldMapView<'_> {}

impl PartialEq<FieldMap> for FieldMapView<'_> {
    fn eq(&self, other: &FieldMap) -> bool {
        self.map == other
    }
}

impl Hash for FieldMapView<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.map.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries() {
        let map = FieldMap::from([
            ("lorem", FieldValue::Bool(true)),
            ("ipsum", FieldValue::Int(42)),
            ("dolor", FieldValue::Str("amet".into())),
        ]);
        assert_eq!(map["lorem"], FieldValue::Bool(true));
        assert_eq!(map["ipsum"], FieldValue::Int(42));
        assert_eq!(map["dolor"], FieldValue::Str("amet".into()));
    }

    #[test]
    fn test_order_independent_equality() {
        let map1 = FieldMap::from([
            ("lorem", FieldValue::Bool(true)),
            ("ipsum", FieldValue::Int(42)),
            ("dolor", FieldValue::Str("amet".into())),
        ]);
        let map2 = FieldMap::from([
            ("ipsum", FieldValue::Int(42)),
            ("lorem", FieldValue::Bool(true)),
            ("dolor", FieldValue::Str("amet".into())),
        ]);
        assert_eq!(map1, map2);
        assert_eq!(map1.cached_hash(), map2.cached_hash());
    }

    #[test]
    fn test_not_equal() {
        let map1 = FieldMap::from([("lorem", FieldValue::Bool(true))]);
        let map2 = FieldMap::from([("lorem", FieldValue::Bool(false))]);
        assert_ne!(map1, map2);
    }

    #[test]
    fn test_duplicates_last_write_wins_by_position() {
        let map = FieldMap::from([
            ("lorem", FieldValue::Bool(true)),
            ("ipsum", FieldValue::Int(42)),
            ("lorem", FieldValue::Int(123)),
        ]);
        assert!(map["lorem"] == FieldValue::Bool(true) || map["lorem"] == FieldValue::Int(123));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_empty() {
        let map = FieldMap::empty();
        assert!(map.is_empty());
    }

    #[test]
    fn test_view_equals_owned() {
        let map = FieldMap::from([("lorem", FieldValue::Int(1))]);
        let view = map.as_view();
        assert_eq!(view, map);
        assert_eq!(view.cached_hash(), map.cached_hash());
    }
}
