//! In-memory membership sets for composite keys.
//!
//! Each variant nests hash maps key by key and ends in a set of terminal
//! values, creating every level lazily. `bulk_add` expects its records sorted
//! by key so consecutive records reuse the containers looked up for the
//! previous one; unsorted input is still stored correctly, only slower.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::core::error::{ImportError, ImportResult};
use crate::core::value::Value;

/// A plain set of values.
#[derive(Debug, Clone)]
pub struct SimpleSet<V> {
    store: HashSet<V>,
}

impl<V: Eq + Hash> Default for SimpleSet<V> {
    fn default() -> Self {
        Self {
            store: HashSet::new(),
        }
    }
}

impl<V: Eq + Hash> SimpleSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: V) -> &mut Self {
        self.store.insert(value);
        self
    }

    /// Returns `true` if the value was not present before.
    pub fn add_if_absent(&mut self, value: V) -> bool {
        self.store.insert(value)
    }

    pub fn contains(&self, value: &V) -> bool {
        self.store.contains(value)
    }

    pub fn bulk_add<I: IntoIterator<Item = V>>(&mut self, records: I) {
        self.store.extend(records);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// key -> set of values
#[derive(Debug, Clone)]
pub struct KeyValueSet<K, V> {
    store: HashMap<K, HashSet<V>>,
}

impl<K: Eq + Hash, V: Eq + Hash> Default for KeyValueSet<K, V> {
    fn default() -> Self {
        Self {
            store: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Eq + Hash> KeyValueSet<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, value: V) -> &mut Self {
        self.store.entry(key).or_default().insert(value);
        self
    }

    pub fn add_if_absent(&mut self, key: K, value: V) -> bool {
        self.store.entry(key).or_default().insert(value)
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.store
            .get(key)
            .is_some_and(|values| values.contains(value))
    }

    pub fn bulk_add<I: IntoIterator<Item = (K, V)>>(&mut self, records: I) {
        let mut records = records.into_iter().peekable();
        while let Some((key, value)) = records.next() {
            let values = self.store.entry(key.clone()).or_default();
            values.insert(value);
            while let Some((_, value)) = records.next_if(|(next, _)| *next == key) {
                values.insert(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// key1 -> key2 -> set of values
#[derive(Debug, Clone)]
pub struct DoubleKeySet<K1, K2, V> {
    store: HashMap<K1, HashMap<K2, HashSet<V>>>,
}

impl<K1: Eq + Hash, K2: Eq + Hash, V: Eq + Hash> Default for DoubleKeySet<K1, K2, V> {
    fn default() -> Self {
        Self {
            store: HashMap::new(),
        }
    }
}

impl<K1, K2, V> DoubleKeySet<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
    V: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key1: K1, key2: K2, value: V) -> &mut Self {
        self.add_if_absent(key1, key2, value);
        self
    }

    pub fn add_if_absent(&mut self, key1: K1, key2: K2, value: V) -> bool {
        self.store
            .entry(key1)
            .or_default()
            .entry(key2)
            .or_default()
            .insert(value)
    }

    pub fn contains(&self, key1: &K1, key2: &K2, value: &V) -> bool {
        self.store
            .get(key1)
            .and_then(|level| level.get(key2))
            .is_some_and(|values| values.contains(value))
    }

    pub fn bulk_add<I: IntoIterator<Item = (K1, K2, V)>>(&mut self, records: I) {
        let mut records = records.into_iter().peekable();
        while let Some((key1, key2, value)) = records.next() {
            let level = self.store.entry(key1.clone()).or_default();
            let mut current = Some((key2, value));

            while let Some((key2, value)) = current.take() {
                let values = level.entry(key2.clone()).or_default();
                values.insert(value);
                while let Some((_, _, value)) =
                    records.next_if(|(k1, k2, _)| *k1 == key1 && *k2 == key2)
                {
                    values.insert(value);
                }
                current = records
                    .next_if(|(k1, _, _)| *k1 == key1)
                    .map(|(_, key2, value)| (key2, value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store
            .values()
            .flat_map(HashMap::values)
            .map(HashSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// key1 -> key2 -> key3 -> set of values
#[derive(Debug, Clone)]
pub struct TripleKeySet<K1, K2, K3, V> {
    store: HashMap<K1, DoubleKeySet<K2, K3, V>>,
}

impl<K1: Eq + Hash, K2: Eq + Hash, K3: Eq + Hash, V: Eq + Hash> Default
    for TripleKeySet<K1, K2, K3, V>
{
    fn default() -> Self {
        Self {
            store: HashMap::new(),
        }
    }
}

impl<K1, K2, K3, V> TripleKeySet<K1, K2, K3, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
    K3: Eq + Hash + Clone,
    V: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key1: K1, key2: K2, key3: K3, value: V) -> &mut Self {
        self.add_if_absent(key1, key2, key3, value);
        self
    }

    pub fn add_if_absent(&mut self, key1: K1, key2: K2, key3: K3, value: V) -> bool {
        self.store
            .entry(key1)
            .or_default()
            .add_if_absent(key2, key3, value)
    }

    pub fn contains(&self, key1: &K1, key2: &K2, key3: &K3, value: &V) -> bool {
        self.store
            .get(key1)
            .is_some_and(|level| level.contains(key2, key3, value))
    }

    pub fn bulk_add<I: IntoIterator<Item = (K1, K2, K3, V)>>(&mut self, records: I) {
        let mut records = records.into_iter().peekable();
        while let Some((key1, key2, key3, value)) = records.next() {
            let level = self.store.entry(key1.clone()).or_default();
            let mut run = vec![(key2, key3, value)];
            while let Some((_, key2, key3, value)) = records.next_if(|(k1, ..)| *k1 == key1) {
                run.push((key2, key3, value));
            }
            level.bulk_add(run);
        }
    }

    pub fn len(&self) -> usize {
        self.store.values().map(DoubleKeySet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keys already present at a destination, loaded before a step runs.
///
/// The arity is the number of values per tuple, terminal value included.
#[derive(Debug, Clone)]
pub enum ExistingKeySet {
    Single(SimpleSet<Value>),
    KeyValue(KeyValueSet<Value, Value>),
    Double(DoubleKeySet<Value, Value, Value>),
    Triple(TripleKeySet<Value, Value, Value, Value>),
}

impl ExistingKeySet {
    pub fn with_arity(name: &str, arity: usize) -> ImportResult<Self> {
        match arity {
            1 => Ok(Self::Single(SimpleSet::new())),
            2 => Ok(Self::KeyValue(KeyValueSet::new())),
            3 => Ok(Self::Double(DoubleKeySet::new())),
            4 => Ok(Self::Triple(TripleKeySet::new())),
            _ => Err(ImportError::config(format!(
                "Set '{}' must hold tuples of 1 to 4 values, not {}",
                name, arity
            ))),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::KeyValue(_) => 2,
            Self::Double(_) => 3,
            Self::Triple(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(set) => set.len(),
            Self::KeyValue(set) => set.len(),
            Self::Double(set) => set.len(),
            Self::Triple(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `tuple`; returns `true` only the first time it is seen.
    pub fn add_if_absent(&mut self, tuple: Vec<Value>) -> ImportResult<bool> {
        self.check_arity(tuple.len())?;
        let mut parts = tuple.into_iter();
        let mut next = || parts.next().unwrap_or(Value::Null);
        Ok(match self {
            Self::Single(set) => set.add_if_absent(next()),
            Self::KeyValue(set) => set.add_if_absent(next(), next()),
            Self::Double(set) => set.add_if_absent(next(), next(), next()),
            Self::Triple(set) => set.add_if_absent(next(), next(), next(), next()),
        })
    }

    pub fn contains(&self, tuple: &[Value]) -> ImportResult<bool> {
        self.check_arity(tuple.len())?;
        Ok(match (self, tuple) {
            (Self::Single(set), [v]) => set.contains(v),
            (Self::KeyValue(set), [k, v]) => set.contains(k, v),
            (Self::Double(set), [k1, k2, v]) => set.contains(k1, k2, v),
            (Self::Triple(set), [k1, k2, k3, v]) => set.contains(k1, k2, k3, v),
            _ => false,
        })
    }

    /// Load tuples sorted by key order.
    pub fn bulk_add(&mut self, tuples: Vec<Vec<Value>>) -> ImportResult<()> {
        if let Some(bad) = tuples.iter().find(|t| t.len() != self.arity()) {
            return self.check_arity(bad.len());
        }
        match self {
            Self::Single(set) => set.bulk_add(tuples.into_iter().flatten()),
            Self::KeyValue(set) => set.bulk_add(tuples.into_iter().map(|t| {
                let [k, v] = take::<2>(t);
                (k, v)
            })),
            Self::Double(set) => set.bulk_add(tuples.into_iter().map(|t| {
                let [k1, k2, v] = take::<3>(t);
                (k1, k2, v)
            })),
            Self::Triple(set) => set.bulk_add(tuples.into_iter().map(|t| {
                let [k1, k2, k3, v] = take::<4>(t);
                (k1, k2, k3, v)
            })),
        }
        Ok(())
    }

    fn check_arity(&self, actual: usize) -> ImportResult<()> {
        if actual == self.arity() {
            Ok(())
        } else {
            Err(ImportError::SetArity {
                name: self.kind().to_string(),
                expected: self.arity(),
                actual,
            })
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "simple set",
            Self::KeyValue(_) => "key/value set",
            Self::Double(_) => "double key set",
            Self::Triple(_) => "triple key set",
        }
    }
}

fn take<const N: usize>(tuple: Vec<Value>) -> [Value; N] {
    let mut parts = tuple.into_iter();
    std::array::from_fn(|_| parts.next().unwrap_or(Value::Null))
}
