//! Read and write policies.

/// Strategy for resolving a read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Resolve from the cache only. Get fails with `NotFound` when the
    /// record is absent; Find/Count return empty/zero.
    ForceLocal,
    /// Fetch from the network only, writing the response through into
    /// the cache before delivering it.
    ForceNetwork,
    /// Deliver the cache result first, then the superseding network
    /// result as a second stage.
    #[default]
    LocalThenNetwork,
    /// Alias behavior of [`ReadPolicy::LocalThenNetwork`] for callers
    /// that want both results explicitly.
    Both,
}

impl ReadPolicy {
    /// Returns true if the policy reads the cache.
    #[must_use]
    pub fn uses_cache(&self) -> bool {
        !matches!(self, ReadPolicy::ForceNetwork)
    }

    /// Returns true if the policy issues a network fetch.
    #[must_use]
    pub fn uses_network(&self) -> bool {
        !matches!(self, ReadPolicy::ForceLocal)
    }

    /// Returns true if the policy delivers two staged results.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.uses_cache() && self.uses_network()
    }
}

/// Strategy for applying a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Mutate the cache, enqueue a pending operation, return. The
    /// network is never touched; a later Push replays the queue.
    ForceLocal,
    /// Attempt the network call only; on success write through into the
    /// cache and clear superseded pending operations.
    ForceNetwork,
    /// Perform the local path synchronously and return its result, then
    /// replay the pending entry as a background continuation whose
    /// outcome is observable only via queue and cache state.
    #[default]
    LocalThenNetwork,
}

impl WritePolicy {
    /// Returns true if the policy mutates the cache synchronously.
    #[must_use]
    pub fn writes_locally(&self) -> bool {
        !matches!(self, WritePolicy::ForceNetwork)
    }

    /// Returns true if the policy issues a network call.
    #[must_use]
    pub fn uses_network(&self) -> bool {
        !matches!(self, WritePolicy::ForceLocal)
    }

    /// Returns true if the network call runs as a background stage.
    #[must_use]
    pub fn is_background(&self) -> bool {
        matches!(self, WritePolicy::LocalThenNetwork)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_policy_capabilities() {
        assert!(ReadPolicy::ForceLocal.uses_cache());
        assert!(!ReadPolicy::ForceLocal.uses_network());

        assert!(!ReadPolicy::ForceNetwork.uses_cache());
        assert!(ReadPolicy::ForceNetwork.uses_network());
        assert!(!ReadPolicy::ForceNetwork.is_staged());

        assert!(ReadPolicy::LocalThenNetwork.is_staged());
        assert!(ReadPolicy::Both.is_staged());
    }

    #[test]
    fn write_policy_capabilities() {
        assert!(WritePolicy::ForceLocal.writes_locally());
        assert!(!WritePolicy::ForceLocal.uses_network());

        assert!(!WritePolicy::ForceNetwork.writes_locally());
        assert!(WritePolicy::ForceNetwork.uses_network());
        assert!(!WritePolicy::ForceNetwork.is_background());

        assert!(WritePolicy::LocalThenNetwork.writes_locally());
        assert!(WritePolicy::LocalThenNetwork.is_background());
    }

    #[test]
    fn defaults_are_local_then_network() {
        assert_eq!(ReadPolicy::default(), ReadPolicy::LocalThenNetwork);
        assert_eq!(WritePolicy::default(), WritePolicy::LocalThenNetwork);
    }
}
