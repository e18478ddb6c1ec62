//! Configuration for the bridge and the reference interpreter.

/// Bridge behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Fall back to case-insensitive member lookup when no exact match exists.
    pub case_insensitive_members: bool,
    /// Prefix of the registry names of per-type metatables.
    pub metatable_prefix: String,
    /// Stack slots reserved on top of the values a call pushes back.
    pub stack_reserve: usize,
    /// Let instance lookups fall back to static members.
    pub static_via_instance: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            case_insensitive_members: true,
            metatable_prefix: "hostbridge:".to_owned(),
            stack_reserve: 2,
            static_via_instance: true,
        }
    }
}

impl BridgeConfig {
    pub fn with_case_insensitive_members(mut self, enabled: bool) -> Self {
        self.case_insensitive_members = enabled;
        self
    }

    pub fn with_metatable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metatable_prefix = prefix.into();
        self
    }

    pub fn with_stack_reserve(mut self, slots: usize) -> Self {
        self.stack_reserve = slots;
        self
    }

    pub fn with_static_via_instance(mut self, enabled: bool) -> Self {
        self.static_via_instance = enabled;
        self
    }
}

/// Limits of the in-memory interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum number of stack slots across all frames.
    pub max_stack: usize,
    /// Maximum nesting of native calls.
    pub max_call_depth: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_stack: 8000,
            max_call_depth: 200,
        }
    }
}

impl StateConfig {
    pub fn with_max_stack(mut self, slots: usize) -> Self {
        self.max_stack = slots;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
