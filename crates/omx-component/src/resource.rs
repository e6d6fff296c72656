//! Resource manager seam

/// DSP load reported when asking for resources
pub const ENCODER_CPU_LOAD: u32 = 50;

/// Asynchronous notice from the resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceNotice {
    /// Resources were taken away; an executing component must drop to Idle
    Preempted,
    /// Resources became available again
    Acquired,
}

/// Grants DSP resources before the component binds the bridge
///
/// Both methods run on the dispatch thread with the component lock released,
/// so an implementation may call back into the component.
pub trait ResourceManager: Send + Sync {
    /// Returns false when the resources are not available
    fn request(&self, component: &str, cpu_load: u32) -> bool;

    fn release(&self, component: &str);
}
