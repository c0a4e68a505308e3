//! Derived "who references this element" indices.

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// What the cache knows about the referrers of one element.
///
/// An element without an entry is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Membership {
    /// Referrers seen through element puts. There may be more.
    Partial(FxHashSet<i64>),
    /// All referrers, trusted without refetching.
    Complete(FxHashSet<i64>),
}

impl Membership {
    pub(crate) fn ids(&self) -> &FxHashSet<i64> {
        match self {
            Membership::Partial(ids) | Membership::Complete(ids) => ids,
        }
    }

    fn ids_mut(&mut self) -> &mut FxHashSet<i64> {
        match self {
            Membership::Partial(ids) | Membership::Complete(ids) => ids,
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        matches!(self, Membership::Complete(_))
    }
}

/// Mapping from a referenced element to the ids of the ways or relations
/// referencing it. Keyed by node id for ways, by `ElementKey` for relations.
pub(crate) struct RelationshipIndex<K> {
    entries: FxHashMap<K, Membership>,
}

impl<K: Eq + Hash + Copy> RelationshipIndex<K> {
    pub(crate) fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&Membership> {
        self.entries.get(key)
    }

    /// Referrer ids if they are fully known.
    pub(crate) fn complete(&self, key: &K) -> Option<&FxHashSet<i64>> {
        self.entries
            .get(key)
            .filter(|membership| membership.is_complete())
            .map(Membership::ids)
    }

    /// All referrer ids seen so far, complete or not.
    pub(crate) fn referrers(&self, key: &K) -> impl Iterator<Item = i64> + '_ {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|membership| membership.ids().iter().copied())
    }

    /// Replace the entry with the complete set of referrers.
    pub(crate) fn set_complete(&mut self, key: K, ids: impl IntoIterator<Item = i64>) {
        self.entries
            .insert(key, Membership::Complete(ids.into_iter().collect()));
    }

    pub(crate) fn add_referrer(&mut self, key: K, id: i64) {
        self.entries
            .entry(key)
            .or_insert_with(|| Membership::Partial(FxHashSet::default()))
            .ids_mut()
            .insert(id);
    }

    /// Drop `id` from the entry of `key`. A partial entry left empty is
    /// forgotten, a complete one stays known-empty.
    pub(crate) fn remove_referrer(&mut self, key: &K, id: i64) {
        let Some(membership) = self.entries.get_mut(key) else {
            return;
        };
        membership.ids_mut().remove(&id);
        if !membership.is_complete() && membership.ids().is_empty() {
            self.entries.remove(key);
        }
    }

    /// Drop `id` from every entry. Used when the referrer's member list is
    /// not known.
    pub(crate) fn forget_referrer(&mut self, id: i64) {
        self.entries.retain(|_, membership| {
            membership.ids_mut().remove(&id);
            membership.is_complete() || !membership.ids().is_empty()
        });
    }

    /// Move referrer `id` from its `old` members to its `new` members.
    ///
    /// Members that were dropped lose `id`, every current member gains it.
    /// Complete entries stay complete; unknown members become partial.
    pub(crate) fn apply_diff(
        &mut self,
        id: i64,
        old: impl IntoIterator<Item = K>,
        new: impl IntoIterator<Item = K>,
    ) {
        let new: FxHashSet<K> = new.into_iter().collect();
        for key in old {
            if !new.contains(&key) {
                self.remove_referrer(&key, id);
            }
        }
        for key in new {
            self.add_referrer(key, id);
        }
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Membership> {
        self.entries.remove(key)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|key, _| keep(key));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
