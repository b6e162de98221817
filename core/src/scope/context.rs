use alloc::sync::Arc;
use core::any::Any;

use crate::String;
use crate::vm::MachineFlags;

/// Host data handed to every call of a scope.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// The part of a running program's context that outlives a single call:
/// which arena pair is active, the host's user data and the call flags.
///
/// A [`Machine`](crate::vm::Machine) is built from it for every call.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    active_slot: usize,
    user_data: Option<UserData>,
    debug_name: String,
    flags: MachineFlags,
}

impl ExecutionContext {
    pub fn new(user_data: Option<UserData>, debug_name: String, flags: MachineFlags) -> Self {
        Self {
            active_slot: 0,
            user_data,
            debug_name,
            flags,
        }
    }

    /// Points the context at the arena pair in `slot`.
    pub(crate) fn wire(&mut self, slot: usize) {
        self.active_slot = slot;
    }

    pub fn active_slot(&self) -> usize {
        self.active_slot
    }

    pub fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.user_data.as_deref()
    }

    pub(crate) fn shared_user_data(&self) -> Option<UserData> {
        self.user_data.clone()
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn flags(&self) -> MachineFlags {
        self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut MachineFlags {
        &mut self.flags
    }
}

impl core::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("active_slot", &self.active_slot)
            .field("user_data", &self.user_data.is_some())
            .field("debug_name", &self.debug_name)
            .field("flags", &self.flags)
            .finish()
    }
}
