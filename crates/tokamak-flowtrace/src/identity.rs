//! Dense internal state identifiers.

use rustc_hash::FxHashMap;

/// The host engine's opaque identifier for a symbolic state. Stable for the
/// life of a state but may be reused after death.
pub type HostStateId = i32;

/// A dense, non-zero internal identifier assigned by [`IdentityMap`].
/// `0` is reserved as "unset" and is never returned by either operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalStateId(u32);

impl InternalStateId {
    pub const UNSET: InternalStateId = InternalStateId(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// Reconstructs an id from its raw integer. Only meaningful for values
    /// this crate itself produced (e.g. decoding wire data it encoded).
    pub(crate) fn from_raw(raw: u32) -> Self {
        InternalStateId(raw)
    }
}

impl std::fmt::Display for InternalStateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assigns a dense [`InternalStateId`] to each [`HostStateId`] and renumbers
/// on fork/merge.
///
/// `next_id` starts at 0 and is pre-incremented, so the first id ever
/// issued is 1 — `InternalStateId::UNSET` (0) is never handed out.
pub struct IdentityMap {
    next_id: u32,
    mapping: FxHashMap<HostStateId, InternalStateId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            mapping: FxHashMap::default(),
        }
    }

    /// Return the current mapping for `host_id`, assigning a fresh id if
    /// none exists yet.
    pub fn get_or_assign(&mut self, host_id: HostStateId) -> InternalStateId {
        if let Some(&id) = self.mapping.get(&host_id) {
            return id;
        }
        self.allocate(host_id)
    }

    /// Unconditionally allocate a new id for `host_id`, overwriting any
    /// prior mapping. Used on fork/merge to renumber the continuing state.
    pub fn rename(&mut self, host_id: HostStateId) -> InternalStateId {
        self.allocate(host_id)
    }

    /// The id currently mapped to `host_id`, if any, without allocating.
    pub fn current(&self, host_id: HostStateId) -> Option<InternalStateId> {
        self.mapping.get(&host_id).copied()
    }

    fn allocate(&mut self, host_id: HostStateId) -> InternalStateId {
        self.next_id += 1;
        let id = InternalStateId(self.next_id);
        self.mapping.insert(host_id, id);
        id
    }
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}
