//! External memory tracking and deferred destruction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bridge entry (engine thread)                               │
//! │  ├── Applies the pending external memory delta              │
//! │  └── Processes deferred handle destructions                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  DeferredDestructionQueue                                   │
//! │  ├── Thread-safe queue of handle resets                     │
//! │  ├── Filled when the last host reference drops              │
//! │  └── Atomic delta for memory reported off-thread            │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ExternalMemoryGuard (RAII, bound to a HostEntity)          │
//! │  ├── Adds its amount on creation, removes it on drop        │
//! │  └── Reaches the engine only while the handle is weak       │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  GcTraceable trait                                          │
//! │  └── external_memory_size() → usize                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod deferred_destruction;
mod external_memory;
mod traceable;

pub use deferred_destruction::{DeferredDestruction, DeferredDestructionQueue};
pub use external_memory::ExternalMemoryGuard;
pub use traceable::{GcTraceable, Tracked, tracked_guard};

#[cfg(test)]
mod tests;
