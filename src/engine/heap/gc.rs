//! Mark/sweep collection with resurrecting weak-handle finalizers.
//!
//! One pass:
//!
//! 1. mark from the global object, the intrinsics and every strong handle
//! 2. among weak handles with a pending finalizer whose target is unmarked,
//!    run the finalizers of targets not reachable from another such target
//! 3. repeat from 1 until no pending finalizer has an unmarked target
//! 4. clear weak handles that still point at unmarked targets
//! 5. sweep
//!
//! A finalizer may make its handle strong again, which keeps everything the
//! target refers to alive. Objects reachable from a pending target therefore
//! wait until that target's finalizer has run.

use std::collections::HashSet;

use super::{Heap, ObjectData, Property};
use crate::engine::{GcStats, ObjectRef, PersistentId, Value};

impl Heap {
    pub(super) fn collect(&mut self) -> GcStats {
        let mut finalized = 0;
        // At most one finalizer call per handle and pass
        let mut ran: HashSet<PersistentId> = HashSet::new();

        loop {
            self.mark_from_roots();

            let pending: Vec<(PersistentId, ObjectRef)> = self
                .persistents
                .iter()
                .filter(|(id, p)| p.weak && p.finalizer.is_some() && !ran.contains(*id))
                .filter_map(|(id, p)| p.target.map(|target| (*id, target)))
                .filter(|(_, target)| !self.is_marked(*target))
                .collect();

            if pending.is_empty() {
                break;
            }

            let referenced: Vec<ObjectRef> = pending
                .iter()
                .flat_map(|(_, target)| self.references(*target))
                .collect();
            self.mark(referenced);

            let mut ready: Vec<PersistentId> = pending
                .iter()
                .filter(|(_, target)| !self.is_marked(*target))
                .map(|(id, _)| *id)
                .collect();

            // Every pending target is held by another one: a cycle
            if ready.is_empty() {
                ready = pending.iter().map(|(id, _)| *id).collect();
            }

            for id in ready {
                ran.insert(id);
                let finalizer = self.persistents.get_mut(&id).and_then(|p| p.finalizer.take());
                if let Some(finalizer) = finalizer {
                    finalizer(self, id);
                    finalized += 1;
                }
            }
        }

        let mut cleared = Vec::new();
        for (id, persistent) in self.persistents.iter() {
            if persistent.weak && persistent.target.is_some_and(|t| !self.is_marked(t)) {
                cleared.push(*id);
            }
        }
        for id in cleared {
            if let Some(persistent) = self.persistents.get_mut(&id) {
                persistent.target = None;
                persistent.finalizer = None;
            }
        }

        let collected = self.sweep();

        tracing::trace!(
            "heap collected {} objects, {} finalizers, {} live",
            collected,
            finalized,
            self.live
        );

        GcStats { collected, finalized }
    }

    fn mark_from_roots(&mut self) {
        for slot in &mut self.slots {
            if let Some(object) = slot.object.as_mut() {
                object.marked = false;
            }
        }

        let roots = self.roots();
        self.mark(roots);
    }

    fn roots(&self) -> Vec<ObjectRef> {
        let mut roots = vec![
            self.global,
            self.intrinsics.object_prototype,
            self.intrinsics.function_prototype,
            self.intrinsics.array_prototype,
            self.intrinsics.error_prototype,
        ];

        roots.extend(
            self.persistents
                .values()
                .filter(|p| !p.weak)
                .filter_map(|p| p.target),
        );

        roots
    }

    fn is_marked(&self, object: ObjectRef) -> bool {
        self.object(object).is_some_and(|o| o.marked)
    }

    /// Objects `object` keeps alive: prototype, data property values, elements.
    fn references(&self, object: ObjectRef) -> Vec<ObjectRef> {
        let Some(target) = self.object(object) else {
            return Vec::new();
        };

        let mut references: Vec<ObjectRef> = target.prototype.into_iter().collect();

        for (_, property) in &target.properties {
            if let Property::Data {
                value: Value::Object(child),
                ..
            } = property
            {
                references.push(*child);
            }
        }

        if let ObjectData::Array(elements) = &target.data {
            references.extend(elements.iter().filter_map(Value::as_object));
        }

        references
    }

    fn mark(&mut self, mut stack: Vec<ObjectRef>) {
        while let Some(object) = stack.pop() {
            let Some(target) = self.object_mut(object) else {
                continue;
            };
            if target.marked {
                continue;
            }
            target.marked = true;

            stack.extend(self.references(object));
        }
    }

    fn sweep(&mut self) -> usize {
        let mut collected = 0;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let dead = slot.object.as_ref().is_some_and(|o| !o.marked);
            if dead {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                collected += 1;
            }
        }

        self.live -= collected;
        collected
    }
}
