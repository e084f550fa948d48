//! Deterministic allocation of counters to iterations.

use serde::Deserialize;

/// Identity of one scenario iteration, as assigned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterationIdentity {
    /// The lane (virtual user) running this iteration.
    pub vu: usize,
    /// The per-lane iteration counter.
    pub iter: u64,
}

/// A counter addressed by the target service, as `{namespace}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterRef {
    /// The counter's namespace.
    pub namespace: String,
    /// The counter's key within the namespace.
    pub key: String,
}

/// How counters are allocated to iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySpacePolicy {
    /// A small shared pool of counters per run. Stresses hit/get contention
    /// on few keys and exercises the already-exists create path.
    #[default]
    Narrow,
    /// One namespace per lane with a fresh key per iteration. Stresses
    /// create-heavy workloads; every iteration owns its counter exclusively.
    Wide,
}

/// Derives a [`CounterRef`] from an [`IterationIdentity`].
///
/// The mapping is a pure function of the identity and the configured policy
/// and size, so a given identity always addresses the same counter.
#[derive(Debug, Clone)]
pub struct KeySpace {
    policy: KeySpacePolicy,
    size: usize,
    prefix: String,
}

impl KeySpace {
    /// Creates a key space rooted at the given namespace prefix.
    pub fn new(policy: KeySpacePolicy, size: usize, prefix: impl Into<String>) -> Self {
        Self {
            policy,
            size: size.max(1),
            prefix: prefix.into(),
        }
    }

    /// Returns the counter this iteration operates on.
    pub fn allocate(&self, identity: IterationIdentity) -> CounterRef {
        match self.policy {
            KeySpacePolicy::Narrow => {
                let slot = (identity.vu as u64 * 100 + identity.iter) % self.size as u64;
                CounterRef {
                    namespace: self.prefix.clone(),
                    key: format!("counter-{slot}"),
                }
            }
            KeySpacePolicy::Wide => CounterRef {
                namespace: format!("{}-vu{}", self.prefix, identity.vu),
                key: format!("counter-{}", identity.iter),
            },
        }
    }

    /// Whether allocated counters are owned exclusively by their iteration.
    ///
    /// Under the narrow policy iterations share counters and may race at the
    /// remote service, so deterministic value checks are not possible.
    pub fn is_exclusive(&self) -> bool {
        self.policy == KeySpacePolicy::Wide
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn identities() -> impl Iterator<Item = IterationIdentity> {
        (0..7).flat_map(|vu| (0..50).map(move |iter| IterationIdentity { vu, iter }))
    }

    #[test]
    fn narrow_pool_is_bounded_by_the_configured_size() {
        let keyspace = KeySpace::new(KeySpacePolicy::Narrow, 10, "test");

        let refs: HashSet<_> = identities().map(|id| keyspace.allocate(id)).collect();
        assert!(refs.len() <= 10, "got {} distinct counters", refs.len());
        assert!(refs.iter().all(|r| r.namespace == "test"));
    }

    #[test]
    fn wide_policy_gives_each_lane_its_own_namespace() {
        let keyspace = KeySpace::new(KeySpacePolicy::Wide, 10, "test");

        let namespaces: HashSet<_> = identities()
            .map(|id| (id.vu, keyspace.allocate(id).namespace))
            .collect();
        // one namespace per lane, and no two lanes share one
        assert_eq!(namespaces.len(), 7);
        let distinct: HashSet<_> = namespaces.iter().map(|(_, ns)| ns).collect();
        assert_eq!(distinct.len(), 7);
    }

    #[test]
    fn allocation_is_reproducible() {
        for policy in [KeySpacePolicy::Narrow, KeySpacePolicy::Wide] {
            let keyspace = KeySpace::new(policy, 10, "test");
            for identity in identities() {
                assert_eq!(keyspace.allocate(identity), keyspace.allocate(identity));
            }
        }
    }

    #[test]
    fn narrow_key_derivation_matches_the_pool_formula() {
        let keyspace = KeySpace::new(KeySpacePolicy::Narrow, 10, "test");
        let counter = keyspace.allocate(IterationIdentity { vu: 3, iter: 7 });
        // (3 * 100 + 7) % 10 == 7
        assert_eq!(counter.key, "counter-7");
    }
}
