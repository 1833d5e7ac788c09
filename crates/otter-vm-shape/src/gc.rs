//! Shape tracing and collection
//!
//! The heap reports which shapes its live objects use, prototype objects
//! included; the store keeps the rest alive through strong parent links and
//! the literal root cache. Transition edges, listener lists, instance roots,
//! the prototype-shape registry and inline-cache slots are weak and stop
//! upgrading once their target is swept.

use crate::key::ObjectId;
use crate::shape::{ShapeId, ShapeRecord};
use crate::store::ShapeStore;
use crate::transition::TransitionEdges;

/// Visitor for strong shape references
pub trait ShapeTracer {
    /// Mark a shape reachable
    fn mark_shape(&mut self, shape: ShapeId);
}

impl ShapeRecord {
    /// Trace the shapes this record keeps alive
    pub fn trace(&self, tracer: &mut dyn ShapeTracer) {
        if let Some(parent) = self.parent {
            tracer.mark_shape(parent);
        }
    }
}

struct MarkState {
    marked: Vec<bool>,
    worklist: Vec<ShapeId>,
}

impl ShapeTracer for MarkState {
    fn mark_shape(&mut self, shape: ShapeId) {
        if let Some(bit) = self.marked.get_mut(shape.index() as usize)
            && !*bit
        {
            *bit = true;
            self.worklist.push(shape);
        }
    }
}

impl ShapeStore {
    /// Sweep every shape not reachable from `roots` or the store's own roots.
    ///
    /// Returns the number of shapes freed. Handles to freed shapes stay
    /// distinguishable from later occupants of the same slot.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ShapeId>) -> usize {
        let mut state = MarkState {
            marked: vec![false; self.slot_count()],
            worklist: Vec::new(),
        };
        let store_roots: Vec<ShapeId> = self.literal_roots.values().copied().collect();
        for root in roots.into_iter().chain(store_roots) {
            if self.is_live(root) {
                state.mark_shape(root);
            }
        }
        while let Some(shape) = state.worklist.pop() {
            if let Some(record) = self.get(shape) {
                record.trace(&mut state);
            }
        }

        let swept = self.sweep(&state.marked);
        let mut released = 0;
        if swept > 0 {
            self.prune_weak_edges();
            released = self.prune_prototype_shapes();
        }
        let forgotten = self.deopt.prune();
        tracing::debug!(swept, released, forgotten, live = self.len(), "shape collection finished");
        swept
    }

    /// Forget prototype objects whose current shape was swept
    fn prune_prototype_shapes(&mut self) -> usize {
        let dead: Vec<ObjectId> = self
            .prototype_shapes
            .iter()
            .filter(|&(_, &shape)| !self.is_live(shape))
            .map(|(&object, _)| object)
            .collect();
        for object in &dead {
            self.prototype_shapes.remove(object);
        }
        dead.len()
    }

    /// Drop dead targets from transition tables and prototype bookkeeping
    fn prune_weak_edges(&mut self) {
        for id in self.live_ids() {
            let (dead_targets, dead_roots) = {
                let record = self.shape(id);
                let dead_targets = match &record.transitions {
                    TransitionEdges::Table(table) => table
                        .iter()
                        .filter(|(_, t)| !self.is_live(t.id()))
                        .map(|(k, _)| k.clone())
                        .collect(),
                    _ => Vec::new(),
                };
                let dead_roots: Vec<_> = record
                    .proto_details
                    .iter()
                    .flat_map(|d| d.instance_roots.iter())
                    .filter(|r| !self.is_live(r.id()))
                    .copied()
                    .collect();
                (dead_targets, dead_roots)
            };
            if dead_targets.is_empty() && dead_roots.is_empty() {
                continue;
            }
            let record = self.shape_mut(id);
            if let TransitionEdges::Table(table) = &mut record.transitions {
                for key in &dead_targets {
                    table.remove(key);
                }
            }
            if let Some(details) = record.proto_details.as_mut() {
                details.instance_roots.retain(|r| !dead_roots.contains(r));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::attributes::PropertyAttributes;
    use crate::dependency::{CompilationDependencies, FunctionId};
    use crate::key::{ObjectId, PropertyKey};
    use crate::prototype::ProtoRef;
    use crate::shape::ObjectKind;
    use crate::store::ShapeStore;
    use crate::transition::TransitionKey;

    #[test]
    fn test_unrooted_shapes_are_swept() {
        let mut store = ShapeStore::new();
        let root = store.create_root(ObjectKind::Plain, 16, 4);
        let a = store.add_property(root, PropertyKey::string("a"), PropertyAttributes::data());
        let b = store.add_property(a, PropertyKey::string("b"), PropertyAttributes::data());
        let c = store.add_property(root, PropertyKey::string("c"), PropertyAttributes::data());

        let swept = store.collect([b]);
        assert_eq!(swept, 1);
        assert!(store.is_live(root));
        assert!(store.is_live(a));
        assert!(store.is_live(b));
        assert!(!store.is_live(c));
        assert!(c.downgrade().upgrade(&store).is_none());

        let key = TransitionKey::property(PropertyKey::string("c"), PropertyAttributes::data());
        assert_eq!(store.lookup_transition(root, &key), None);
        let c2 = store.add_property(root, PropertyKey::string("c"), PropertyAttributes::data());
        assert_ne!(c2, c);
        assert_eq!(c2.index(), c.index());
    }

    #[test]
    fn test_prototype_shapes_follow_their_objects() {
        let mut store = ShapeStore::new();
        let p = store.create_root(ObjectKind::Plain, 16, 4);
        let o = store.create_root(ObjectKind::Plain, 16, 4);
        let t = store.set_prototype(o, Some(ProtoRef { object: ObjectId(1), shape: p }));
        let proto_shape = t.prototype_shape.unwrap();

        store.collect([proto_shape]);
        assert!(store.is_live(proto_shape));
        assert!(store.is_live(p));
        assert!(!store.is_live(t.shape));
        assert_eq!(store.prototype_shape(ObjectId(1)), Some(proto_shape));
        assert!(store.shape(proto_shape).proto_details.as_ref().unwrap().instance_roots.is_empty());

        store.collect(std::iter::empty());
        assert!(!store.is_live(proto_shape));
        assert!(store.prototype_shapes.is_empty());
        assert_eq!(store.prototype_shape(ObjectId(1)), None);
    }

    #[test]
    fn test_collection_forgets_superseded_invalidations() {
        let mut store = ShapeStore::new();
        let root = store.create_root(ObjectKind::Plain, 16, 4);
        let mut deps = CompilationDependencies::new(FunctionId(5));
        assert!(deps.depend_on_stability(&store, root));
        let old = deps.commit(&mut store).unwrap();
        store.add_property(root, PropertyKey::string("a"), PropertyAttributes::data());
        assert!(!store.is_code_valid(old));

        let fresh = CompilationDependencies::new(FunctionId(5)).commit(&mut store).unwrap();
        store.collect([root]);
        assert!(!store.is_code_valid(old));
        assert!(store.is_code_valid(fresh));
        assert!(format!("{:?}", store.deopt).contains("invalidated: 0"));
    }
}
