use council_common::MemoryConfig;

/// Resolve the effective memory configuration for a unit.
///
/// `runtime` beats `unit`, which beats `group`, which beats `global_default`.
pub fn resolve_memory(
    runtime: Option<&MemoryConfig>,
    unit: Option<&MemoryConfig>,
    group: Option<&MemoryConfig>,
    global_default: &MemoryConfig,
) -> MemoryConfig {
    *runtime.or(unit).or(group).unwrap_or(global_default)
}
