//! Configuration options for scopes.

use super::UserData;
use crate::gc::CollectorOptions;

/// Configuration options for a [`Scope`](super::Scope).
///
/// # Example
///
/// ```
/// use flipspace_core::scope::ScopeOptions;
///
/// let options = ScopeOptions {
///     ram_memory_size: 1024 * 1024,
///     ..ScopeOptions::default()
/// };
/// ```
#[derive(Clone)]
pub struct ScopeOptions {
    /// Capacity of each of the two arenas, in octets.
    ///
    /// Default: 64 KiB
    pub ram_memory_size: usize,

    /// Opaque host data reachable from every call.
    ///
    /// Default: None
    pub user_data: Option<UserData>,

    /// Whether each tick's result is compacted into the other arena.
    ///
    /// Turning this off publishes the result where the interpreter left it,
    /// in an arena that is reclaimed in the same tick. Only
    /// [`Scope::state_octets_unchecked`](super::Scope::state_octets_unchecked)
    /// can read such a state.
    ///
    /// Default: true
    pub compact: bool,

    /// Dump every published state through `tracing`.
    ///
    /// Default: false
    pub verbose: bool,

    /// Default: false
    pub predicting: bool,

    pub collector: CollectorOptions,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            ram_memory_size: 64 * 1024,
            user_data: None,
            compact: true,
            verbose: false,
            predicting: false,
            collector: CollectorOptions::default(),
        }
    }
}

impl core::fmt::Debug for ScopeOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScopeOptions")
            .field("ram_memory_size", &self.ram_memory_size)
            .field("user_data", &self.user_data.is_some())
            .field("compact", &self.compact)
            .field("verbose", &self.verbose)
            .field("predicting", &self.predicting)
            .field("collector", &self.collector)
            .finish()
    }
}
