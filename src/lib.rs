//! freezable-map: an insertion-ordered map that can be frozen for use as a
//! hash key and thawed again for editing.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one value that behaves as an ordinary editable map most of the
//!   time, yet can sit inside a `HashSet` or serve as a `HashMap` key once
//!   the caller declares it frozen.
//! - Layers:
//!   - `indexmap::IndexMap<K, V, S>`: structural map. Insertion order,
//!     hashed lookup, order-preserving removal.
//!   - FreezableMap<K, V, S>: public API. Owns an `IndexMap` plus a
//!     frozen flag and a cached content hash, and gates every mutation on
//!     the flag.
//!
//! States
//! - Thawed (initial): mutation allowed; hashing refused with
//!   `Error::Unhashable`.
//! - Frozen: mutation refused with `Error::Frozen`; `Hash` reports the hash
//!   cached at freeze time.
//! - `freeze()`/`thaw()` move between them at any time and are idempotent.
//! - A refused mutation changes nothing: the state check runs before any
//!   entry is touched.
//!
//! Hash and equality contract
//! - Equality compares contents only (keys and values), ignoring order,
//!   frozen state, and hasher type.
//! - The frozen hash is the XOR of per-pair hashes taken with a fixed-key
//!   `DefaultHasher`, so equal contents always produce equal hashes,
//!   whatever order they were inserted in.
//! - `std::hash::Hash` cannot fail, so hashing a thawed map panics with the
//!   `Error::Unhashable` message. `FreezableMap::frozen_hash` is the
//!   non-panicking check.
//! - While a map sits inside a hash collection only `&FreezableMap` is
//!   reachable, so it cannot be thawed or mutated there.
//!
//! Constraints
//! - Synchronous. Shared `&FreezableMap` reads are safe wherever `K`, `V`
//!   and `S` are `Sync`; mutation needs `&mut`, so a map shared across
//!   threads needs a lock around the freeze/mutate/hash sequence.
//! - Keys are immutable post-insert; overwriting a key keeps its original
//!   position and key object.
//! - Removal shifts later pairs down, so the remaining order is kept.
//! - Key `Eq`/`Hash` may read the map they live in; lookups only take
//!   `&self`.
//!
//! Notes and non-goals
//! - No structural sharing or copy-on-write between versions; `Clone`
//!   copies entries and frozen state.
//! - Public API surface is `FreezableMap`, its iterators (re-exported from
//!   `indexmap`) and `Error`.

mod error;
mod freezable_map;

// Public surface
pub use error::{Error, Result};
pub use freezable_map::FreezableMap;
pub use indexmap::map::{Iter, IterMut, Keys, Values};
