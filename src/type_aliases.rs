// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

/// Map implementation used for lookups where iteration order does not matter.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used for lookups where iteration order does not matter.
pub type Set<K> = rustc_hash::FxHashSet<K>;

/// Hasher shared by the ordered collections.
pub type FxBuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// Insertion ordered map, used wherever iteration order ends up in an artifact.
pub type OrderedMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;

/// Insertion ordered set.
pub type OrderedSet<K> = indexmap::IndexSet<K, FxBuildHasher>;

/// The chosen candidate of every package of a successful resolution.
pub type InstallCandidates = OrderedMap<String, crate::selector::Candidate>;
