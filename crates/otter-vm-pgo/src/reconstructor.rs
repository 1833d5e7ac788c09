//! Shape Reconstructor
//!
//! Rebuilds the transition tree of a recorded root type in a live
//! [`ShapeStore`] so compiled code can be specialized before the program
//! allocated a single object of that type. Every shape built is recorded in
//! the Profile Type Store; a second request for the same root returns the
//! recorded shapes instead of building new ones.

use otter_vm_shape::store::object_size_for;
use otter_vm_shape::{ObjectId, ObjectKind, ProtoRef, ShapeFlags, ShapeId, ShapeStore};

use crate::context::CompilationContext;
use crate::layout::LayoutDescription;
use crate::profile_type::{ProfileType, ProfileTypeKind, ProfileTypeTuple};

/// What object a reconstructed root describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRole {
    /// Ordinary instances
    Plain,
    /// A prototype object; `class` unless it was installed by replacing a
    /// function expression's prototype
    Prototype {
        /// Prototype of a class
        class: bool,
    },
    /// A class constructor function
    Constructor,
    /// An object literal of `literal_length` properties
    ObjectLiteral {
        /// Properties in the literal
        literal_length: u32,
    },
}

impl RootRole {
    /// Role implied by a layout's root type
    pub fn for_layout(layout: &LayoutDescription) -> Self {
        match layout.root_type.kind {
            ProfileTypeKind::Prototype => Self::Prototype { class: true },
            ProfileTypeKind::PrototypeTransition => Self::Prototype { class: false },
            ProfileTypeKind::Constructor => Self::Constructor,
            ProfileTypeKind::ObjectLiteral => Self::ObjectLiteral {
                literal_length: layout.properties.len() as u32,
            },
            _ => Self::Plain,
        }
    }

    fn flags(self) -> ShapeFlags {
        match self {
            Self::Plain | Self::ObjectLiteral { .. } => ShapeFlags::empty(),
            Self::Prototype { class: true } => ShapeFlags::PROTOTYPE | ShapeFlags::CLASS_PROTOTYPE,
            Self::Prototype { class: false } => ShapeFlags::PROTOTYPE,
            Self::Constructor => ShapeFlags::CLASS_CONSTRUCTOR | ShapeFlags::CALLABLE,
        }
    }
}

/// Heap hook used to create the objects a class definition needs
pub trait ObjectAllocator {
    /// Allocate an object of `shape`
    fn allocate(&mut self, shape: ShapeId) -> ObjectId;
}

/// Builds shapes from recorded layouts
pub struct ShapeReconstructor<'a> {
    context: &'a CompilationContext,
}

impl<'a> ShapeReconstructor<'a> {
    /// Create a reconstructor reading from `context`
    pub fn new(context: &'a CompilationContext) -> Self {
        Self { context }
    }

    /// Most properties any shape of `layout`'s tree, or of a tree its
    /// instances transition into, will hold
    pub fn max_property_count(&self, layout: &LayoutDescription) -> u32 {
        let transitions = self
            .context
            .type_store()
            .find_all_transitions_by_base(layout.root_type);
        let profile = self.context.profile();
        transitions
            .into_iter()
            .filter_map(|t| profile.layout(t))
            .map(LayoutDescription::max_property_count)
            .fold(layout.max_property_count(), u32::max)
    }

    /// Rebuild `root_type`'s tree and return its root shape.
    ///
    /// `None` when nothing was recorded for the type or the tree would not
    /// fit in fast mode.
    pub fn reconstruct(&self, store: &mut ShapeStore, root_type: ProfileType, role: RootRole) -> Option<ShapeId> {
        self.reconstruct_with(store, root_type, role, None)
    }

    /// Rebuild every recorded layout with the role its root type implies
    pub fn reconstruct_all(&self, store: &mut ShapeStore) -> usize {
        let roots: Vec<_> = self
            .context
            .profile()
            .layouts
            .iter()
            .map(|layout| (layout.root_type, RootRole::for_layout(layout)))
            .collect();
        roots
            .into_iter()
            .filter(|&(root_type, role)| self.reconstruct(store, root_type, role).is_some())
            .count()
    }

    /// Rebuild a class: its prototype object first, then instances whose
    /// prototype is that object.
    ///
    /// A class recorded with a prototype but no instance layout gets an
    /// empty instance root over the prototype. Returns the instance root.
    pub fn reconstruct_definition(
        &self,
        store: &mut ShapeStore,
        allocator: &mut dyn ObjectAllocator,
        class_type: ProfileType,
    ) -> Option<ShapeId> {
        let type_store = self.context.type_store();
        let class_type = type_store.resolve(class_type);
        let prototype_type = self.context.profile().prototype_of(class_type);

        let prototype = prototype_type.and_then(|prototype_type| {
            let role = RootRole::Prototype {
                class: prototype_type.kind != ProfileTypeKind::PrototypeTransition,
            };
            let shape = self.reconstruct(store, prototype_type, role)?;
            let object = allocator.allocate(shape);
            Some((prototype_type, ProtoRef { object, shape }))
        });

        let has_layout = self.context.profile().layout(class_type).is_some();
        let instance = match prototype {
            _ if has_layout => {
                self.reconstruct_with(store, class_type, RootRole::Plain, prototype.map(|(_, p)| p))
            }
            Some((_, proto)) => {
                let root = store.create_root(ObjectKind::Plain, object_size_for(0), 0);
                let shape = store.set_prototype(root, Some(proto)).shape;
                tracing::debug!(%class_type, %shape, "synthesized instance root of prototype-only class");
                Some(type_store.record_shape(ProfileTypeTuple::root(class_type), shape, false))
            }
            None => {
                type_store.alias(class_type, class_type);
                None
            }
        };

        // Using the object as a prototype may have moved it to a copy.
        if let Some((prototype_type, proto)) = prototype
            && let Some(current) = store.prototype_shape(proto.object)
        {
            type_store.record_shape(ProfileTypeTuple::root(prototype_type), current, true);
        }
        instance
    }

    /// The object `owner` of the shape recorded for `tuple` is used as a
    /// prototype at runtime.
    ///
    /// The runtime prototype shape wins: it replaces the recorded shape, and
    /// code that assumed the recorded shape has no prototype instances is
    /// deoptimized.
    pub fn reconcile_prototype(
        &self,
        store: &mut ShapeStore,
        tuple: ProfileTypeTuple,
        owner: ObjectId,
    ) -> Option<ShapeId> {
        let type_store = self.context.type_store();
        let shape = type_store.query_shape(tuple).filter(|&s| store.is_live(s))?;
        let prototype = store.become_prototype(shape, owner);
        if prototype != shape {
            type_store.record_shape(tuple, prototype, true);
            tracing::debug!(%tuple, from = %shape, to = %prototype, "reconstructed shape became a prototype");
        }
        Some(prototype)
    }

    fn reconstruct_with(
        &self,
        store: &mut ShapeStore,
        root_type: ProfileType,
        role: RootRole,
        prototype: Option<ProtoRef>,
    ) -> Option<ShapeId> {
        let type_store = self.context.type_store();
        let root_type = type_store.resolve(root_type);
        let Some(layout) = self.context.profile().layout(root_type).cloned() else {
            type_store.alias(root_type, root_type);
            tracing::debug!(%root_type, "no layout recorded");
            return None;
        };

        if let Err(error) = layout.validate() {
            tracing::warn!(%root_type, %error, "skipping invalid layout");
            return None;
        }

        let config = self.context.config();
        let max = self.max_property_count(&layout);
        if max > config.max_fast_properties {
            return match role {
                RootRole::ObjectLiteral { literal_length }
                    if config.literal_cache && literal_length <= config.max_literal_cache_length =>
                {
                    Some(self.dictionary_literal(store, &layout))
                }
                _ => {
                    tracing::debug!(
                        %root_type,
                        max,
                        ceiling = config.max_fast_properties,
                        "layout exceeds fast-property ceiling"
                    );
                    None
                }
            };
        }

        let root_tuple = ProfileTypeTuple::root(root_type);
        let recorded = type_store.query_shape(root_tuple);
        let root = match recorded.filter(|&s| store.is_live(s)) {
            Some(root) => {
                self.materialize_children(store, &layout, root);
                root
            }
            None => {
                let mut root = self.allocate_root(store, &layout, role, max);
                if prototype.is_some() {
                    root = store.set_prototype(root, prototype).shape;
                }
                let root = type_store.record_shape(root_tuple, root, recorded.is_some());
                // Children hang off plain transitions; the root turns into a
                // prototype only once its tree is built.
                self.materialize_children(store, &layout, root);
                if role.flags().contains(ShapeFlags::PROTOTYPE) {
                    store.mark_prototype(root);
                }
                root
            }
        };
        Some(root)
    }

    fn allocate_root(&self, store: &mut ShapeStore, layout: &LayoutDescription, role: RootRole, max: u32) -> ShapeId {
        let inlined = max.max(layout.inlined_slots.min(self.context.config().max_fast_properties));
        let object_size = object_size_for(inlined).max(layout.object_size);
        let properties = layout
            .properties
            .iter()
            .map(|p| (p.key.to_property_key(), p.attributes()));

        if let RootRole::ObjectLiteral { literal_length } = role
            && self.context.config().literal_cache
            && let Some(mut shape) = store.literal_root(literal_length, inlined)
        {
            for (key, attributes) in properties {
                shape = store.add_property(shape, key, attributes);
            }
            return shape;
        }
        let roles = role.flags() - ShapeFlags::PROTOTYPE;
        store.create_root_with_layout(layout.kind, object_size, inlined, properties, roles)
    }

    /// Root of an over-long object literal kept in dictionary mode
    fn dictionary_literal(&self, store: &mut ShapeStore, layout: &LayoutDescription) -> ShapeId {
        let type_store = self.context.type_store();
        let root_tuple = ProfileTypeTuple::root(layout.root_type);
        let recorded = type_store.query_shape(root_tuple);
        if let Some(existing) = recorded.filter(|&s| store.is_live(s)) {
            return existing;
        }
        let base = store.create_root(layout.kind, layout.object_size, 0);
        let mut shape = store.transition_to_dictionary(base);
        for property in &layout.properties {
            shape = store.add_property(shape, property.key.to_property_key(), property.attributes());
        }
        tracing::debug!(root_type = %layout.root_type, %shape, "dictionary root for object literal");
        type_store.record_shape(root_tuple, shape, recorded.is_some())
    }

    /// Build every non-pruned node below `root` in node order
    fn materialize_children(&self, store: &mut ShapeStore, layout: &LayoutDescription, root: ShapeId) {
        let type_store = self.context.type_store();
        let mut nodes: Vec<Option<ShapeId>> = Vec::with_capacity(layout.node_count() as usize);
        nodes.push(Some(root));
        for (index, child) in layout.children.iter().enumerate() {
            let Some(child) = child else {
                nodes.push(None);
                continue;
            };
            let Some(&parent) = nodes.get(child.parent as usize) else {
                panic!(
                    "layout of {} links node {} to unbuilt parent {}",
                    layout.root_type,
                    index + 1,
                    child.parent
                );
            };
            // Below a pruned node.
            let Some(parent) = parent else {
                nodes.push(None);
                continue;
            };

            let tuple = ProfileTypeTuple::new(layout.root_type, child.profile_type);
            let recorded = type_store.query_shape(tuple);
            let shape = match recorded.filter(|&s| store.is_live(s)) {
                Some(shape) => shape,
                // A collected child of a finished prototype tree stays gone.
                None if store.shape(parent).is_prototype() => {
                    nodes.push(None);
                    continue;
                }
                None => {
                    let shape = store.add_property(
                        parent,
                        child.property.key.to_property_key(),
                        child.property.attributes(),
                    );
                    type_store.record_shape(tuple, shape, recorded.is_some())
                }
            };
            nodes.push(Some(shape));
        }
    }
}
