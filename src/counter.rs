//! Dependency reference counting.
//!
//! Every owner (a sub-package) has a bucket mapping dependency names to how
//! many times the owner references them. [`Owner::Global`] mirrors the sum of
//! all real buckets so "is anyone still using X" is a single lookup. Transitive
//! views are computed on demand and never cached.

use std::collections::BTreeMap;

/// Bucket key. `Global` can never collide with a package name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Owner {
    Global,
    Package(String),
}

impl Owner {
    pub fn package(name: impl Into<String>) -> Self {
        Owner::Package(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCounter {
    buckets: BTreeMap<Owner, BTreeMap<String, usize>>,
}

impl Default for DependencyCounter {
    fn default() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(Owner::Global, BTreeMap::new());
        Self { buckets }
    }
}

impl DependencyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one reference from `owner` to each of `deps`.
    pub fn add<S: AsRef<str>>(&mut self, owner: &str, deps: &[S]) {
        for dep in deps {
            let dep = dep.as_ref();
            for key in [Owner::package(owner), Owner::Global] {
                *self
                    .buckets
                    .entry(key)
                    .or_default()
                    .entry(dep.to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Drop one reference from `owner` to each of `deps`.
    ///
    /// Names `owner` does not reference are ignored, so the global bucket is
    /// only touched for decrements that actually happened.
    pub fn remove<S: AsRef<str>>(&mut self, owner: &str, deps: &[S]) {
        let key = Owner::package(owner);
        for dep in deps {
            let dep = dep.as_ref();
            if Self::decrement(&mut self.buckets, &key, dep) {
                Self::decrement(&mut self.buckets, &Owner::Global, dep);
            }
        }
        if self.buckets.get(&key).is_some_and(BTreeMap::is_empty) {
            self.buckets.remove(&key);
        }
    }

    fn decrement(
        buckets: &mut BTreeMap<Owner, BTreeMap<String, usize>>,
        owner: &Owner,
        dep: &str,
    ) -> bool {
        let Some(bucket) = buckets.get_mut(owner) else {
            return false;
        };
        let Some(count) = bucket.get_mut(dep) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            bucket.remove(dep);
        }
        true
    }

    /// Direct count of `dep` in `owner`'s bucket.
    pub fn count(&self, owner: &Owner, dep: &str) -> usize {
        self.buckets
            .get(owner)
            .and_then(|bucket| bucket.get(dep))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.buckets.contains_key(&Owner::package(name))
    }

    /// Flatten everything reachable from `owner`.
    ///
    /// Direct counts are summed; a dependency that is itself a tracked owner is
    /// descended into unless it is already on the current path, which keeps
    /// traversal finite even when the recorded graph contains a cycle.
    pub fn generate_map(&self, owner: &Owner) -> BTreeMap<String, usize> {
        let mut flattened = BTreeMap::new();
        let initial_path = match owner {
            Owner::Global => Vec::new(),
            Owner::Package(name) => vec![name.clone()],
        };

        let mut pending = vec![(owner.clone(), initial_path)];
        while let Some((current, path)) = pending.pop() {
            let Some(bucket) = self.buckets.get(&current) else {
                continue;
            };
            for (dep, count) in bucket {
                *flattened.entry(dep.clone()).or_insert(0) += count;
                if self.is_tracked(dep) && !path.contains(dep) {
                    let mut next_path = path.clone();
                    next_path.push(dep.clone());
                    pending.push((Owner::package(dep.clone()), next_path));
                }
            }
        }
        flattened
    }

    pub fn is_depending_on(&self, dep: &str, owner: &Owner) -> bool {
        self.generate_map(owner).contains_key(dep)
    }
}
