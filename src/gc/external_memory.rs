//! External memory tracking bound to a host entity.

use crate::entity::{HostEntity, WeakEntity};

/// RAII guard attributing `amount` bytes of host memory to an entity.
///
/// Creation adds the amount to the entity's external memory, drop subtracts
/// it. Whether the engine hears about it depends on the entity's handle mode
/// at the time of each adjustment. The guard does not keep the entity alive;
/// once the entity is gone its memory is settled and the guard does nothing.
///
/// # Example
///
/// ```ignore
/// struct Canvas {
///     pixels: Vec<u8>,
///     _guard: ExternalMemoryGuard,
/// }
///
/// impl Canvas {
///     fn new(owner: &HostEntity, size: usize) -> Self {
///         let pixels = vec![0u8; size];
///         let guard = ExternalMemoryGuard::new(owner, size as i64);
///         Self { pixels, _guard: guard }
///     }
///
///     fn resize(&mut self, new_size: usize) {
///         let old_size = self.pixels.len();
///         self.pixels.resize(new_size, 0);
///         self._guard.adjust((new_size as i64) - (old_size as i64));
///     }
/// }
/// ```
pub struct ExternalMemoryGuard {
    entity: WeakEntity,
    amount: i64,
}

impl ExternalMemoryGuard {
    pub fn new(entity: &HostEntity, amount: i64) -> Self {
        entity.adjust_external_memory(amount);

        Self {
            entity: entity.downgrade(),
            amount,
        }
    }

    /// Guard with zero initial amount; use `adjust()` or `set()` later.
    pub fn empty(entity: &HostEntity) -> Self {
        Self::new(entity, 0)
    }

    /// Positive delta = more memory allocated, negative = memory freed.
    pub fn adjust(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }

        self.amount += delta;
        if let Some(entity) = self.entity.upgrade() {
            entity.adjust_external_memory(delta);
        }
    }

    /// Set the tracked amount, applying the difference.
    pub fn set(&mut self, new_amount: i64) {
        self.adjust(new_amount - self.amount);
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

impl Drop for ExternalMemoryGuard {
    fn drop(&mut self) {
        if self.amount != 0
            && let Some(entity) = self.entity.upgrade()
        {
            entity.adjust_external_memory(-self.amount);
        }
    }
}

impl std::fmt::Debug for ExternalMemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalMemoryGuard")
            .field("amount", &self.amount)
            .field("entity", &self.entity)
            .finish()
    }
}
