//! Application callbacks invoked by the kernels.

/// Callbacks a kernel calls around its event loop.
///
/// `on_idle` runs whenever no active object is ready. On a bare-metal port
/// it is entered with interrupts masked and must unmask them, typically
/// together with a low-power wait. On host it runs after the critical
/// section has been released.
pub trait Hooks: Send + Sync {
    /// Called once, right before the kernel enters its loop
    fn on_startup(&self) {}

    /// Called when the ready-set is empty
    fn on_idle(&self) {
        core::hint::spin_loop();
    }

    /// Called once, after the kernel has left its loop
    fn on_cleanup(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {}
