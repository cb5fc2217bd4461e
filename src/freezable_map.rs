use crate::error::{Error, Result};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use core::ops::Index;
use indexmap::map::{Iter, IterMut, Keys, Values};
use indexmap::IndexMap;
use std::collections::hash_map::{DefaultHasher, RandomState};
use tracing::{debug, trace};

/// An insertion-ordered map that toggles between an editable, unhashable
/// state (thawed) and a read-only, hashable state (frozen).
///
/// A fresh map is thawed. [`freeze`](Self::freeze) snapshots a hash of the
/// current contents and blocks every mutation until [`thaw`](Self::thaw)
/// discards it again. While frozen the map implements `Hash` consistently
/// with its content equality, so it can be used as a `HashMap` key or a
/// `HashSet` element.
#[derive(Clone)]
pub struct FreezableMap<K, V, S = RandomState> {
    entries: IndexMap<K, V, S>,
    frozen: bool,
    // Some iff frozen.
    hash: Option<u64>,
}

impl<K, V> FreezableMap<K, V>
where
    K: Eq + Hash,
{
    /// An empty, thawed map.
    pub fn new() -> Self {
        Self::from_entries(IndexMap::new())
    }
}

impl<K, V, S> Default for FreezableMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> FreezableMap<K, V, S> {
    fn from_entries(entries: IndexMap<K, V, S>) -> Self {
        Self {
            entries,
            frozen: false,
            hash: None,
        }
    }

    /// Number of pairs, frozen or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        self.entries.keys()
    }

    pub fn values(&self) -> Values<'_, K, V> {
        self.entries.values()
    }

    /// Pair at insertion position `i`.
    pub fn get_index(&self, i: usize) -> Option<(&K, &V)> {
        self.entries.get_index(i)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The hash cached by the last [`freeze`](Self::freeze).
    ///
    /// Fails with [`Error::Unhashable`] while thawed. This is what the `Hash`
    /// impl reports to hash-based collections.
    pub fn frozen_hash(&self) -> Result<u64> {
        if !self.frozen {
            return Err(Error::Unhashable);
        }
        self.hash.ok_or(Error::MissingHash)
    }

    /// Leave the frozen state and drop the cached hash. Idempotent.
    pub fn thaw(&mut self) -> &mut Self {
        if self.frozen {
            trace!(len = self.entries.len(), "thawed map");
        }
        self.frozen = false;
        self.hash = None;
        self
    }

    /// Consuming form of [`thaw`](Self::thaw).
    pub fn thawed(mut self) -> Self {
        self.thaw();
        self
    }

    // Every mutating method calls this before touching `entries`.
    fn ensure_thawed(&self) -> Result<()> {
        if self.frozen {
            debug!(len = self.entries.len(), "refused mutation of frozen map");
            return Err(Error::Frozen);
        }
        Ok(())
    }

    /// Remove every pair; refused while frozen.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_thawed()?;
        self.entries.clear();
        Ok(())
    }

    /// Mutable iteration over values; gated like any other mutation.
    pub fn iter_mut(&mut self) -> Result<IterMut<'_, K, V>> {
        self.ensure_thawed()?;
        Ok(self.entries.iter_mut())
    }
}

impl<K, V, S> FreezableMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// An empty, thawed map indexed with `hasher`.
    ///
    /// The index hasher only drives lookups; the frozen hash does not use it.
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_entries(IndexMap::with_hasher(hasher))
    }

    /// Like [`with_hasher`](Self::with_hasher), with room for `capacity` pairs.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::from_entries(IndexMap::with_capacity_and_hasher(capacity, hasher))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.entries.get(key)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.entries.get_key_value(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite `key`, returning the previous value.
    ///
    /// An overwritten key keeps its original position.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.ensure_thawed()?;
        Ok(self.entries.insert(key, value))
    }

    /// Remove `key` and return its value, or [`Error::KeyNotFound`].
    pub fn remove<Q>(&mut self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Result<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.ensure_thawed()?;
        self.entries
            .shift_remove_entry(key)
            .ok_or(Error::KeyNotFound)
    }

    /// Remove the most recently inserted pair; `Ok(None)` when empty.
    pub fn pop_last(&mut self) -> Result<Option<(K, V)>> {
        self.ensure_thawed()?;
        Ok(self.entries.pop())
    }

    /// Value for `key`, inserting `default()` first if it is missing.
    /// `default` never runs on a frozen map.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> Result<&mut V>
    where
        F: FnOnce() -> V,
    {
        self.ensure_thawed()?;
        Ok(self.entries.entry(key).or_insert_with(default))
    }

    /// Mutable access to a value. Writing through it changes the contents,
    /// so it is refused while frozen.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Result<Option<&mut V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.ensure_thawed()?;
        Ok(self.entries.get_mut(key))
    }

    /// Insert every pair from `pairs`, last write wins. On a frozen map the
    /// iterator is not consumed.
    pub fn update<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.ensure_thawed()?;
        for (k, v) in pairs {
            self.entries.insert(k, v);
        }
        Ok(())
    }

    pub fn retain<F>(&mut self, keep: F) -> Result<()>
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.ensure_thawed()?;
        self.entries.retain(keep);
        Ok(())
    }
}

impl<K, V, S> FreezableMap<K, V, S>
where
    K: Hash,
    V: Hash,
{
    /// Enter the frozen state and cache a hash of the current contents.
    ///
    /// Freezing an already frozen map keeps the cached hash: nothing can
    /// have changed in between.
    pub fn freeze(&mut self) -> &mut Self {
        if self.frozen && self.hash.is_some() {
            return self;
        }
        let hash = content_hash(self.entries.iter());
        self.hash = Some(hash);
        self.frozen = true;
        trace!(len = self.entries.len(), hash, "froze map");
        self
    }

    /// Consuming form of [`freeze`](Self::freeze).
    pub fn frozen(mut self) -> Self {
        self.freeze();
        self
    }
}

/// XOR of per-pair hashes, so the result ignores iteration order.
///
/// Pairs go through a fixed-key `DefaultHasher` rather than the map's own
/// `S`, so equal contents hash equally across maps and hasher types.
fn content_hash<'a, K, V, I>(pairs: I) -> u64
where
    K: Hash + 'a,
    V: Hash + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    pairs.fold(0, |acc, pair| {
        let mut h = DefaultHasher::new();
        pair.hash(&mut h);
        acc ^ h.finish()
    })
}

/// Only frozen maps hash. Hashing a thawed map panics with
/// [`Error::Unhashable`]; call [`frozen_hash`](FreezableMap::frozen_hash) to
/// check first.
impl<K, V, S> Hash for FreezableMap<K, V, S>
where
    K: Hash,
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.frozen_hash() {
            Ok(h) => state.write_u64(h),
            Err(e) => panic!("{e}"),
        }
    }
}

/// Content equality: same keys with equal values. Order, frozen state and
/// hasher type do not take part.
impl<K, V, S1, S2> PartialEq<FreezableMap<K, V, S2>> for FreezableMap<K, V, S1>
where
    K: Eq + Hash,
    V: PartialEq,
    S2: BuildHasher,
{
    fn eq(&self, other: &FreezableMap<K, V, S2>) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |ov| v == ov))
    }
}

impl<K, V, S> Eq for FreezableMap<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> fmt::Debug for FreezableMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreezableMap")
            .field("frozen", &self.frozen)
            .field("entries", &self.entries)
            .finish()
    }
}

impl<K, Q, V, S> Index<&Q> for FreezableMap<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if `key` is absent.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in FreezableMap")
    }
}

impl<K, V, S> FromIterator<(K, V)> for FreezableMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut entries = IndexMap::with_capacity_and_hasher(iter.size_hint().0, S::default());
        for (k, v) in iter {
            entries.insert(k, v);
        }
        Self::from_entries(entries)
    }
}

// Pinned to `RandomState` so `FreezableMap::from([..])` infers without
// annotations; other hashers go through `collect`.
impl<K, V, const N: usize> From<[(K, V); N]> for FreezableMap<K, V>
where
    K: Eq + Hash,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<'a, K, V, S> IntoIterator for &'a FreezableMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::hash::BuildHasherDefault;

    fn sample() -> FreezableMap<&'static str, i32> {
        FreezableMap::from([("a", 1), ("b", 2)])
    }

    #[test]
    fn starts_thawed_without_hash() {
        let m = sample();
        assert!(!m.is_frozen());
        assert_eq!(m.hash, None);
        assert_eq!(m.frozen_hash(), Err(Error::Unhashable));
    }

    /// Invariant: the cached hash is present exactly while frozen.
    #[test]
    fn hash_cached_iff_frozen() {
        let mut m = sample();
        m.freeze();
        assert!(m.is_frozen() && m.hash.is_some());
        m.thaw();
        assert!(!m.is_frozen() && m.hash.is_none());
        m.thaw();
        assert!(!m.is_frozen() && m.hash.is_none());
    }

    /// Invariant: a frozen flag without a cached hash is reported as the
    /// internal error, never as a caller-facing state violation.
    #[test]
    fn missing_hash_is_distinct_error() {
        let mut m = sample();
        m.frozen = true;
        let err = m.frozen_hash().unwrap_err();
        assert_eq!(err, Error::MissingHash);
        assert!(!err.is_state_violation());
        // Freezing repairs it from current contents.
        m.freeze();
        assert!(m.frozen_hash().is_ok());
    }

    #[test]
    fn refreeze_keeps_cached_hash() {
        let mut m = sample();
        let first = m.freeze().frozen_hash().unwrap();
        let second = m.freeze().frozen_hash().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn content_hash_of_empty_map_is_zero() {
        let m: FreezableMap<String, i32> = FreezableMap::new().frozen();
        assert_eq!(m.frozen_hash(), Ok(0));
    }

    /// Invariant: the content hash ignores the map's index hasher.
    #[test]
    fn hash_independent_of_index_hasher() {
        let a: FreezableMap<&str, i32> = sample().frozen();
        type Fixed = BuildHasherDefault<DefaultHasher>;
        let b: FreezableMap<&str, i32, Fixed> = [("b", 2), ("a", 1)]
            .into_iter()
            .collect::<FreezableMap<_, _, Fixed>>()
            .frozen();
        assert_eq!(a.frozen_hash(), b.frozen_hash());
        assert_eq!(a, b);
    }

    #[test]
    fn clone_carries_frozen_state() {
        let m = sample().frozen();
        let c = m.clone();
        assert!(c.is_frozen());
        assert_eq!(c.frozen_hash(), m.frozen_hash());
        let set: HashSet<_> = [m, c].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn debug_shows_state_and_entries() {
        let m = sample().frozen();
        assert_eq!(
            format!("{m:?}"),
            r#"FreezableMap { frozen: true, entries: {"a": 1, "b": 2} }"#
        );
    }

    #[test]
    fn iter_mut_is_gated() {
        let mut m = sample();
        for (_, v) in m.iter_mut().unwrap() {
            *v *= 2;
        }
        assert_eq!(m.values().copied().collect::<Vec<_>>(), [2, 4]);
        m.freeze();
        assert!(matches!(m.iter_mut(), Err(Error::Frozen)));
    }

    /// Invariant: a key whose `Eq` reads the map it is being looked up in
    /// does not panic; lookups only need `&self`.
    #[test]
    fn key_eq_may_read_the_map() {
        use std::cell::OnceCell;
        use std::rc::{Rc, Weak};

        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                0
            }
        }

        type Shared = FreezableMap<ReadingKey, i32, ConstBuildHasher>;
        struct ReadingKey {
            id: &'static str,
            map: OnceCell<Weak<Shared>>,
        }
        impl PartialEq for ReadingKey {
            fn eq(&self, other: &Self) -> bool {
                if self.id == other.id {
                    return true;
                }
                for k in [self, other] {
                    if let Some(m) = k.map.get().and_then(Weak::upgrade) {
                        let _ = m.contains_key(self.id);
                    }
                }
                false
            }
        }
        impl Eq for ReadingKey {}
        impl Hash for ReadingKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }
        impl Borrow<str> for ReadingKey {
            fn borrow(&self) -> &str {
                self.id
            }
        }

        let mut m: Shared = FreezableMap::with_hasher(ConstBuildHasher);
        let stored = ReadingKey {
            id: "a",
            map: OnceCell::new(),
        };
        m.insert(stored, 1).unwrap();
        let m = Rc::new(m);
        let query = ReadingKey {
            id: "b",
            map: OnceCell::new(),
        };
        let _ = query.map.set(Rc::downgrade(&m));
        assert_eq!(m.get(&query), None);
        assert!(!m.contains_key(&query));
        assert_eq!(m.get("a"), Some(&1));
    }

    #[test]
    fn shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FreezableMap<String, i32>>();
        assert_send_sync::<Error>();
    }
}
