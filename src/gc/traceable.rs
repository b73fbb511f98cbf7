//! GcTraceable trait for payloads that report their own size.

use super::ExternalMemoryGuard;
use crate::entity::HostEntity;

/// Types that can report how much host memory they hold.
///
/// # Example
///
/// ```ignore
/// #[derive(GcTraceable)]
/// struct ImageBuffer {
///     #[gc(track)]
///     pixels: Vec<u8>,
///     #[gc(track)]
///     metadata: String,
///     // Fields without #[gc(track)] are not counted
///     width: u32,
/// }
/// ```
pub trait GcTraceable {
    /// Size in bytes of heap memory owned by this value, excluding
    /// `size_of::<Self>()` and anything the script heap already counts.
    fn external_memory_size(&self) -> usize;
}

impl GcTraceable for Vec<u8> {
    fn external_memory_size(&self) -> usize {
        self.capacity()
    }
}

impl GcTraceable for String {
    fn external_memory_size(&self) -> usize {
        self.capacity()
    }
}

impl GcTraceable for bytes::Bytes {
    fn external_memory_size(&self) -> usize {
        // Backing storage may be shared; the visible length is what we own
        self.len()
    }
}

impl<T: GcTraceable> GcTraceable for Option<T> {
    fn external_memory_size(&self) -> usize {
        self.as_ref().map(|v| v.external_memory_size()).unwrap_or(0)
    }
}

impl<T: GcTraceable> GcTraceable for Box<T> {
    fn external_memory_size(&self) -> usize {
        std::mem::size_of::<T>() + (**self).external_memory_size()
    }
}

impl<T: GcTraceable> GcTraceable for std::sync::Arc<T> {
    fn external_memory_size(&self) -> usize {
        // Only the sole owner counts the payload
        if std::sync::Arc::strong_count(self) == 1 {
            std::mem::size_of::<T>() + (**self).external_memory_size()
        } else {
            0
        }
    }
}

impl<T: GcTraceable> GcTraceable for Vec<T> {
    fn external_memory_size(&self) -> usize {
        let base = self.capacity() * std::mem::size_of::<T>();
        let contents: usize = self.iter().map(|v| v.external_memory_size()).sum();
        base + contents
    }
}

/// Guard attributing `value`'s current size to `entity`.
pub fn tracked_guard<T: GcTraceable>(entity: &HostEntity, value: &T) -> ExternalMemoryGuard {
    ExternalMemoryGuard::new(entity, value.external_memory_size() as i64)
}

/// A payload whose size stays attributed to its owning entity.
///
/// ```ignore
/// let mut tracked = Tracked::new(&entity, vec![0u8; 1024]);
/// tracked.get_mut().resize(2048, 0);
/// tracked.update_size();
/// assert_eq!(entity.external_memory(), 2048);
/// ```
pub struct Tracked<T: GcTraceable> {
    value: T,
    guard: ExternalMemoryGuard,
}

impl<T: GcTraceable> Tracked<T> {
    pub fn new(entity: &HostEntity, value: T) -> Self {
        let guard = tracked_guard(entity, &value);
        Self { value, guard }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Call `update_size()` after mutating through this reference.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn update_size(&mut self) {
        self.guard.set(self.value.external_memory_size() as i64);
    }

    pub fn tracked_bytes(&self) -> i64 {
        self.guard.amount()
    }

    /// Consume and return the value; its size is no longer attributed.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: GcTraceable> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: GcTraceable + std::fmt::Debug> std::fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.value)
            .field("tracked_bytes", &self.guard.amount())
            .finish()
    }
}
