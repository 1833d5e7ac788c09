//! Bytecode Type Profiler
//!
//! Walks a method's instructions, reads the inline-cache slots the
//! interpreter filled and turns them into [`SiteFeedback`] keyed by bytecode
//! offset. Shapes are named through the context's
//! [`ProfileTypeStore`](crate::ProfileTypeStore) and the transition trees they
//! belong to are recorded into its profile as layouts.
//!
//! The profiler never fails: a slot it cannot make sense of is reported as
//! [`SiteFeedback::InsufficientProfile`], and malformed bytecode ends the scan
//! with whatever was collected so far.

use std::collections::BTreeMap;

use otter_vm_bytecode::{
    AbcId, ClassCell, HandlerInfo, HandlerKind, IcHandler, Instruction, IteratorKind, Method,
    MethodId, Opcode, OperandTypes, SlotId, SlotValue, TrackInfo,
};
use otter_vm_shape::{ElementsKind, ShapeId, ShapeStore, TransitionKey, WeakShape};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::context::CompilationContext;
use crate::layout::{LayoutDescription, LayoutProperty};
use crate::profile_type::{LocationRole, ProfileLocation, ProfileType, ProfileTypeKind, ProfileTypeTuple};
use crate::record::ProtoTransitionRecord;

// ==================== Feedback records ====================

/// Primitive-type hint attached to a feedback tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeHint {
    /// Ordinary object receiver
    #[default]
    None,
    /// String primitive receiver
    String,
    /// Number primitive receiver
    Number,
    /// Indexed element access
    Elements {
        /// Elements kind the access was cached for
        #[serde(with = "crate::tags::elements_kind")]
        kind: ElementsKind,
        /// Receiver is an array
        is_array: bool,
        /// Access went past the length
        out_of_bounds: bool,
    },
}

impl TypeHint {
    fn from_info(info: HandlerInfo) -> Self {
        match info.kind() {
            HandlerKind::String => Self::String,
            HandlerKind::Number => Self::Number,
            HandlerKind::Element => Self::Elements {
                kind: info.elements_kind(),
                is_array: info.is_array(),
                out_of_bounds: info.is_out_of_bounds(),
            },
            _ => Self::None,
        }
    }
}

/// One observed (receiver, holder, result) combination of a property site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTuple {
    /// Shape the receiver had
    pub receiver: ProfileTypeTuple,
    /// Shape of the object the property was found on
    pub holder: ProfileTypeTuple,
    /// Holder shape after the access (differs for adding stores)
    pub result: ProfileTypeTuple,
    /// Getter or setter invoked by the access
    pub accessor: Option<MethodId>,
    /// Primitive-type hint
    pub hint: TypeHint,
    /// Prototype shapes strictly between receiver and holder
    pub prototype_chain: Vec<ProfileTypeTuple>,
}

impl FeedbackTuple {
    /// Hit on the receiver itself
    pub fn own(receiver: ProfileTypeTuple, hint: TypeHint) -> Self {
        Self {
            receiver,
            holder: receiver,
            result: receiver,
            accessor: None,
            hint,
            prototype_chain: Vec::new(),
        }
    }

    /// The megamorphic tuple
    pub fn mega() -> Self {
        Self::own(ProfileTypeTuple::mega(), TypeHint::None)
    }

    /// Is this the megamorphic tuple
    pub fn is_mega(&self) -> bool {
        self.receiver.root.is_mega()
    }
}

/// Callee observed at a call or construction site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTarget {
    /// Bytecode method
    Method(MethodId),
    /// Runtime builtin by id
    Builtin(u32),
    /// Constructor with a statically known class type
    Construct(ProfileType),
    /// More than one callee
    Mega,
}

/// Root types produced by a definition or literal creation site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineSite {
    /// Type of the defined instances or literal
    pub profile_type: ProfileType,
    /// Type of the constructor function object (classes)
    pub constructor: Option<ProfileType>,
    /// Type of the prototype object (classes)
    pub prototype: Option<ProfileType>,
    /// Elements kind (array literals)
    #[serde(with = "crate::tags::elements_kind")]
    pub elements_kind: ElementsKind,
    /// Literal length
    pub length: u32,
}

impl DefineSite {
    /// Site defining `profile_type` only
    pub fn new(profile_type: ProfileType) -> Self {
        Self {
            profile_type,
            constructor: None,
            prototype: None,
            elements_kind: ElementsKind::Generic,
            length: 0,
        }
    }
}

/// Feedback of one bytecode site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteFeedback {
    /// Property access with one tuple per observed receiver shape
    Object(Vec<FeedbackTuple>),
    /// Too many receiver shapes; stands for a single mega tuple
    Mega,
    /// Call or construction site
    Call(CallTarget),
    /// Operator site
    Operands(OperandTypes),
    /// `GetIterator` site
    Iterator(IteratorKind),
    /// Class definition
    Define(DefineSite),
    /// Object or array literal creation
    Create(DefineSite),
    /// Nothing usable recorded
    InsufficientProfile,
}

impl SiteFeedback {
    /// Enough was recorded to speculate on
    pub fn is_sufficient(&self) -> bool {
        !matches!(self, Self::InsufficientProfile)
    }

    /// Property tuples; the mega marker yields one mega tuple
    pub fn tuples(&self) -> Vec<FeedbackTuple> {
        match self {
            Self::Object(tuples) => tuples.clone(),
            Self::Mega => vec![FeedbackTuple::mega()],
            _ => Vec::new(),
        }
    }
}

/// Feedback of one method, keyed by bytecode offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFeedback {
    /// Profiled method
    pub method: MethodId,
    /// Its compilation unit
    pub abc: AbcId,
    /// Site feedback by offset
    pub sites: BTreeMap<u32, SiteFeedback>,
}

impl MethodFeedback {
    /// Empty feedback for `method`
    pub fn new(method: MethodId, abc: AbcId) -> Self {
        Self {
            method,
            abc,
            sites: BTreeMap::new(),
        }
    }

    /// Feedback at `offset`
    pub fn site(&self, offset: u32) -> Option<&SiteFeedback> {
        self.sites.get(&offset)
    }

    /// Is there enough profile at `offset` to speculate
    pub fn has_enough_profile(&self, offset: u32) -> bool {
        self.site(offset).is_some_and(SiteFeedback::is_sufficient)
    }
}

// ==================== Profiler ====================

/// Profiler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilerState {
    /// Nothing scanned yet
    #[default]
    Idle,
    /// Walking a method
    Scanning,
    /// Last scan finished
    Done,
}

/// Turns inline-cache slots into feedback records
pub struct BytecodeTypeProfiler<'a> {
    context: &'a CompilationContext,
    state: ProfilerState,
    accessor_sites: FxHashMap<MethodId, Vec<ProfileLocation>>,
    pruned: FxHashSet<ShapeId>,
}

impl<'a> BytecodeTypeProfiler<'a> {
    /// Create a profiler recording into `context`
    pub fn new(context: &'a CompilationContext) -> Self {
        Self {
            context,
            state: ProfilerState::Idle,
            accessor_sites: FxHashMap::default(),
            pruned: FxHashSet::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> ProfilerState {
        self.state
    }

    /// Property sites that called `accessor`
    pub fn accessor_sites(&self, accessor: MethodId) -> &[ProfileLocation] {
        self.accessor_sites
            .get(&accessor)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Profile every site of `method`.
    ///
    /// The result is also stored in the context's profile, replacing earlier
    /// feedback of the same method.
    pub fn profile_method(&mut self, store: &ShapeStore, method: &Method) -> MethodFeedback {
        self.state = ProfilerState::Scanning;
        tracing::debug!(method = %method.id, name = method.display_name(), "profiling method");

        let mut feedback = MethodFeedback::new(method.id, method.abc);
        let mut visited = 0usize;
        for insn in method.instructions() {
            let insn = match insn {
                Ok(insn) => insn,
                Err(e) => {
                    tracing::warn!(method = %method.id, error = %e, "malformed bytecode, scan stopped");
                    break;
                }
            };
            visited += 1;
            let Some(slot) = insn.slot else {
                continue;
            };
            if let Some(site) = self.profile_site(store, method, &insn, slot) {
                feedback.sites.insert(insn.offset, site);
            }
        }

        self.context.profile_mut().record_method(feedback.clone());
        self.state = ProfilerState::Done;
        tracing::debug!(
            method = %method.id,
            visited,
            records = feedback.sites.len(),
            "profiled method"
        );
        feedback
    }

    fn profile_site(
        &mut self,
        store: &ShapeStore,
        method: &Method,
        insn: &Instruction<'_>,
        slot: SlotId,
    ) -> Option<SiteFeedback> {
        let opcode = insn.opcode;
        let location = ProfileLocation::new(method.id, insn.offset);
        if opcode.is_by_name() || opcode.is_by_value() {
            return Some(self.property_site(store, method, location, slot));
        }
        if opcode.is_operator() {
            let site = match read_slot(method, slot) {
                SlotValue::Int(bits) => u8::try_from(bits)
                    .map(|bits| SiteFeedback::Operands(OperandTypes::from_bits_truncate(bits)))
                    .unwrap_or(SiteFeedback::InsufficientProfile),
                _ => SiteFeedback::InsufficientProfile,
            };
            return Some(site);
        }
        if opcode.is_call() {
            return Some(call_site(read_slot(method, slot)));
        }
        let site = match opcode {
            Opcode::NewObjRange => self.construct_site(read_slot(method, slot)),
            Opcode::GetIterator => match read_slot(method, slot) {
                SlotValue::Int(tag) => u8::try_from(tag)
                    .ok()
                    .and_then(IteratorKind::from_u8)
                    .map_or(SiteFeedback::InsufficientProfile, SiteFeedback::Iterator),
                _ => SiteFeedback::InsufficientProfile,
            },
            Opcode::Instanceof => self.instanceof_site(store, method, slot),
            Opcode::DefineClass => match read_slot(method, slot) {
                SlotValue::ClassCell(cell) => self.define_class(store, method, location, &cell),
                _ => SiteFeedback::InsufficientProfile,
            },
            Opcode::CreateObjectWithBuffer
            | Opcode::CreateArrayWithBuffer
            | Opcode::CreateEmptyArray => match read_slot(method, slot) {
                SlotValue::TrackInfo(info) => {
                    let literal_index = insn.operand_u16(0).map(u32::from);
                    self.create_site(store, method, location, opcode, literal_index, &info)
                }
                _ => SiteFeedback::InsufficientProfile,
            },
            _ => return None,
        };
        Some(site)
    }

    // ==================== Property sites ====================

    fn property_site(
        &mut self,
        store: &ShapeStore,
        method: &Method,
        location: ProfileLocation,
        slot: SlotId,
    ) -> SiteFeedback {
        let (first, second) = read_pair(method, slot);
        let entries: Vec<(WeakShape, IcHandler)> = match (first, second) {
            (SlotValue::Undefined, _) => return SiteFeedback::InsufficientProfile,
            (SlotValue::Hole, _) | (SlotValue::Key(_), SlotValue::Hole) => return SiteFeedback::Mega,
            (SlotValue::Shape(shape), SlotValue::Handler(handler)) => vec![(shape, handler)],
            (SlotValue::Polymorphic(entries), SlotValue::Undefined)
            | (SlotValue::Key(_), SlotValue::Polymorphic(entries)) => entries
                .iter()
                .map(|entry| (entry.shape, entry.handler.clone()))
                .collect(),
            _ => {
                tracing::trace!(method = %method.id, offset = location.offset, "malformed property slot");
                return SiteFeedback::InsufficientProfile;
            }
        };
        if entries.len() > self.context.config().max_polymorphic_entries {
            return SiteFeedback::Mega;
        }

        let mut tuples = Vec::with_capacity(entries.len());
        for (shape, handler) in entries {
            if let Some(tuple) = self.handler_tuple(store, location, shape, &handler)
                && !tuples.contains(&tuple)
            {
                tuples.push(tuple);
            }
        }
        if tuples.is_empty() {
            SiteFeedback::InsufficientProfile
        } else {
            SiteFeedback::Object(tuples)
        }
    }

    fn handler_tuple(
        &mut self,
        store: &ShapeStore,
        location: ProfileLocation,
        receiver: WeakShape,
        handler: &IcHandler,
    ) -> Option<FeedbackTuple> {
        let receiver = receiver.upgrade(store)?;
        match handler {
            IcHandler::Field(info) | IcHandler::Element(info) => match info.kind() {
                HandlerKind::NonExist | HandlerKind::Dictionary => None,
                _ => {
                    let name = self.name_shape(store, receiver)?;
                    Some(FeedbackTuple::own(name, TypeHint::from_info(*info)))
                }
            },
            IcHandler::Transition { target, info } => self.transition_tuple(store, receiver, *target, *info),
            IcHandler::TransitionWithProto { target, marker, info } => {
                if marker.has_changed() {
                    tracing::debug!(offset = location.offset, "skipped transition with stale prototype chain");
                    return None;
                }
                if let Some(live) = target.upgrade(store) {
                    self.note_prototype_replacement(store, receiver, live);
                }
                self.transition_tuple(store, receiver, *target, *info)
            }
            IcHandler::Prototype {
                holder,
                marker,
                info,
                accessor,
            } => {
                if marker.has_changed() || info.kind() == HandlerKind::NonExist {
                    tracing::debug!(offset = location.offset, "skipped stale prototype handler");
                    return None;
                }
                let tuple = self.prototype_tuple(store, receiver, *holder, *accessor, *info)?;
                if let Some(accessor) = accessor {
                    let sites = self.accessor_sites.entry(*accessor).or_default();
                    if !sites.contains(&location) {
                        sites.push(location);
                    }
                }
                Some(tuple)
            }
            IcHandler::StoreAot { holder, info } => self.prototype_tuple(store, receiver, *holder, None, *info),
            IcHandler::Global | IcHandler::Invalid => None,
        }
    }

    fn transition_tuple(
        &mut self,
        store: &ShapeStore,
        receiver: ShapeId,
        target: WeakShape,
        info: HandlerInfo,
    ) -> Option<FeedbackTuple> {
        let target = target.upgrade(store)?;
        let receiver = self.name_shape(store, receiver)?;
        let result = self.name_shape(store, target)?;
        Some(FeedbackTuple {
            result,
            ..FeedbackTuple::own(receiver, TypeHint::from_info(info))
        })
    }

    /// Property found on `holder` up the receiver's prototype chain. The
    /// chain must still lead from `receiver` to `holder` through the current
    /// prototype shapes.
    fn prototype_tuple(
        &mut self,
        store: &ShapeStore,
        receiver: ShapeId,
        holder: WeakShape,
        accessor: Option<MethodId>,
        info: HandlerInfo,
    ) -> Option<FeedbackTuple> {
        let holder = holder.upgrade(store)?;
        let Some(chain) = store.prototype_chain(receiver, holder) else {
            tracing::debug!(%receiver, %holder, "skipped broken prototype chain");
            return None;
        };
        let receiver = self.name_shape(store, receiver)?;
        let holder = self.name_shape(store, holder)?;
        let between = chain.len().saturating_sub(1);
        let prototype_chain = chain
            .iter()
            .take(between)
            .skip(1)
            .filter_map(|&shape| self.name_shape(store, shape))
            .collect();
        Some(FeedbackTuple {
            receiver,
            holder,
            result: holder,
            accessor,
            hint: TypeHint::from_info(info),
            prototype_chain,
        })
    }

    // ==================== Other sites ====================

    fn construct_site(&self, slot: SlotValue) -> SiteFeedback {
        match slot {
            SlotValue::Function(callee) if callee.kind.is_constructor() => {
                let abc = self.context.abc();
                let target = if self.context.config().is_jit() {
                    ProfileType::new(abc, callee.method.0, ProfileTypeKind::Jit).with_jit()
                } else {
                    ProfileType::class(abc, callee.method)
                };
                SiteFeedback::Call(CallTarget::Construct(target))
            }
            other => call_site(other),
        }
    }

    fn instanceof_site(&mut self, store: &ShapeStore, method: &Method, slot: SlotId) -> SiteFeedback {
        match read_pair(method, slot) {
            (SlotValue::Hole, _) => SiteFeedback::Mega,
            (SlotValue::Shape(shape), SlotValue::Handler(_)) => {
                let Some(shape) = shape.upgrade(store) else {
                    return SiteFeedback::InsufficientProfile;
                };
                if self.overrides_has_instance(store, shape) {
                    tracing::debug!(%shape, "instanceof target overrides @@hasInstance");
                    return SiteFeedback::InsufficientProfile;
                }
                self.name_shape(store, shape)
                    .map_or(SiteFeedback::InsufficientProfile, |name| {
                        SiteFeedback::Object(vec![FeedbackTuple::own(name, TypeHint::None)])
                    })
            }
            _ => SiteFeedback::InsufficientProfile,
        }
    }

    /// Is `@@hasInstance` found on the chain before the function prototype
    fn overrides_has_instance(&self, store: &ShapeStore, shape: ShapeId) -> bool {
        let env = self.context.env();
        let function_prototype = env.function_prototype.and_then(|o| store.prototype_shape(o));
        let mut visited = FxHashSet::default();
        let mut current = Some(shape);
        while let Some(shape) = current {
            if Some(shape) == function_prototype || !visited.insert(shape) {
                return false;
            }
            let Some(record) = store.get(shape) else {
                return false;
            };
            if store.find_property(shape, &env.has_instance).is_some()
                || store.find_dictionary_property(shape, &env.has_instance).is_some()
            {
                return true;
            }
            current = record.prototype().and_then(|o| store.prototype_shape(o));
        }
        false
    }

    fn define_class(
        &mut self,
        store: &ShapeStore,
        method: &Method,
        location: ProfileLocation,
        cell: &ClassCell,
    ) -> SiteFeedback {
        let type_store = self.context.type_store();
        let class_type = ProfileType::class(method.abc, cell.constructor);
        type_store.record_location(location, class_type);
        let mut site = DefineSite::new(class_type);

        if let Some(shape) = cell.instance_shape.and_then(|w| w.upgrade(store)) {
            self.adopt_root(store, shape, class_type);
        }
        if let Some(shape) = cell.constructor_shape.and_then(|w| w.upgrade(store)) {
            let constructor = ProfileType::constructor(method.abc, cell.constructor);
            type_store.record_location(location.with_role(LocationRole::Constructor), constructor);
            self.adopt_root(store, shape, constructor);
            site.constructor = Some(constructor);
        }
        if let Some(shape) = cell.prototype_shape.and_then(|w| w.upgrade(store)) {
            let prototype = ProfileType::prototype(method.abc, cell.constructor);
            type_store.record_location(location.with_role(LocationRole::Prototype), prototype);
            self.adopt_root(store, shape, prototype);
            self.context.profile_mut().add_root_prototype(class_type, prototype);
            site.prototype = Some(prototype);
        }
        SiteFeedback::Define(site)
    }

    fn create_site(
        &mut self,
        store: &ShapeStore,
        method: &Method,
        location: ProfileLocation,
        opcode: Opcode,
        literal_index: Option<u32>,
        info: &TrackInfo,
    ) -> SiteFeedback {
        let type_store = self.context.type_store();
        let kind = match opcode {
            Opcode::CreateObjectWithBuffer => ProfileTypeKind::ObjectLiteral,
            _ => ProfileTypeKind::ArrayLiteral,
        };
        let literal_type = match type_store.root_type_by_location(location) {
            Some(existing) => existing,
            None => {
                let fresh = ProfileType::new(method.abc, type_store.allocate_trace_id(), kind);
                type_store.record_location(location, fresh);
                type_store.root_type_by_location(location).unwrap_or(fresh)
            }
        };
        if let Some(index) = literal_index {
            type_store.record_constpool_index(literal_type.id, index);
        }
        if kind == ProfileTypeKind::ArrayLiteral {
            type_store.record_elements_kind(literal_type, info.elements_kind);
        }
        if let Some(shape) = info.shape.and_then(|w| w.upgrade(store)) {
            self.adopt_root(store, shape, literal_type);
        }
        SiteFeedback::Create(DefineSite {
            elements_kind: info.elements_kind,
            length: info.length,
            ..DefineSite::new(literal_type)
        })
    }

    /// A store that moved `receiver` onto a shape with another prototype
    /// object is recorded once as a prototype transition of the receiver's
    /// root type.
    fn note_prototype_replacement(&mut self, store: &ShapeStore, receiver: ShapeId, target: ShapeId) {
        let type_store = self.context.type_store();
        let Some(prototype) = store.shape(target).prototype() else {
            return;
        };
        if store.shape(receiver).prototype() == Some(prototype) || type_store.name_of(target).is_some() {
            return;
        }
        let Some(prototype_shape) = store.prototype_shape(prototype) else {
            return;
        };
        let Some(base) = type_store.root_type_of(store, receiver) else {
            return;
        };
        self.record_prototype_transition(store, base, target, prototype_shape);
    }

    /// Record that instances of `base` were reshaped onto `instance_root`
    /// after their constructor's prototype was replaced by an object of
    /// `prototype_shape`.
    pub fn record_prototype_transition(
        &mut self,
        store: &ShapeStore,
        base: ProfileType,
        instance_root: ShapeId,
        prototype_shape: ShapeId,
    ) -> Option<ProtoTransitionRecord> {
        if !store.is_live(instance_root) || !store.is_live(prototype_shape) {
            return None;
        }
        let type_store = self.context.type_store();
        let id = type_store.allocate_trace_id();
        let record = ProtoTransitionRecord {
            base,
            transition: ProfileType::new(base.abc, id, ProfileTypeKind::Transition),
            prototype: ProfileType::new(base.abc, id, ProfileTypeKind::PrototypeTransition),
        };
        self.adopt_root(store, instance_root, record.transition);
        self.adopt_root(store, prototype_shape, record.prototype);
        type_store.record_transition(base, record.transition);
        {
            let mut profile = self.context.profile_mut();
            profile.add_root_prototype(record.transition, record.prototype);
            profile.add_proto_transition(record);
        }
        tracing::debug!(%base, transition = %record.transition, "recorded prototype transition");
        Some(record)
    }

    // ==================== Naming and layouts ====================

    /// Make `shape` the root of `root_type` unless it already has a name
    fn adopt_root(&mut self, store: &ShapeStore, shape: ShapeId, root_type: ProfileType) {
        let type_store = self.context.type_store();
        match type_store.name_of(shape) {
            Some(existing) if existing.root != root_type => {
                tracing::debug!(%shape, %existing, %root_type, "shape already named");
            }
            Some(_) => {}
            None => {
                type_store.record_shape(ProfileTypeTuple::root(root_type), shape, false);
            }
        }
        self.record_layout(store, shape);
    }

    /// Name `shape` within its tree and record the path to it
    fn name_shape(&mut self, store: &ShapeStore, shape: ShapeId) -> Option<ProfileTypeTuple> {
        let type_store = self.context.type_store();
        let root = type_store.root_type_of(store, shape)?;
        let name = type_store.get_or_insert_child(shape, root);
        self.record_layout(store, shape);
        Some(name)
    }

    fn record_layout(&mut self, store: &ShapeStore, shape: ShapeId) {
        let mut visited = FxHashSet::default();
        self.record_layout_from(store, shape, &mut visited);
    }

    /// Record the transition path from `shape`'s named root down to `shape`,
    /// then the layout of the root's prototype.
    fn record_layout_from(&mut self, store: &ShapeStore, shape: ShapeId, visited: &mut FxHashSet<ShapeId>) {
        if !visited.insert(shape) {
            return;
        }
        let context = self.context;
        let type_store = context.type_store();

        let mut path = Vec::new();
        let mut current = shape;
        let root_type = loop {
            if let Some(name) = type_store.name_of(current)
                && name.is_root()
            {
                break name.root;
            }
            path.push(current);
            match store.get(current).and_then(|r| r.parent()) {
                Some(parent) => current = parent,
                None => return,
            }
        };
        let root_shape = current;

        {
            let mut profile = context.profile_mut();
            if profile.layout(root_type).is_none() {
                let Some(layout) = LayoutDescription::from_root_shape(store, root_shape, root_type) else {
                    tracing::debug!(%root_shape, %root_type, "root layout cannot be recorded");
                    return;
                };
                profile.insert_layout(layout);
            }
            let Some(layout) = profile.layout_mut(root_type) else {
                return;
            };

            let mut parent_type = root_type;
            for &child in path.iter().rev() {
                let Some(TransitionKey::Property { key, .. }) =
                    store.get(child).and_then(|r| r.transition_key())
                else {
                    break;
                };
                let Some(entry) = store.find_property(child, key) else {
                    break;
                };
                let Some(property) = LayoutProperty::new(key, entry.attributes) else {
                    if self.pruned.insert(child)
                        && let Some(parent) = layout.find_node(parent_type)
                    {
                        layout.record_pruned(parent);
                    }
                    let child_type = type_store.get_or_insert_child(child, root_type).child;
                    type_store.record_symbol(child_type, key.clone());
                    break;
                };
                let child_type = type_store.get_or_insert_child(child, root_type).child;
                if layout.record_transition(parent_type, child_type, property).is_none() {
                    break;
                }
                parent_type = child_type;
            }
        }

        let prototype_shape = store
            .get(root_shape)
            .and_then(|r| r.prototype())
            .and_then(|object| store.prototype_shape(object));
        if let Some(prototype_shape) = prototype_shape
            && let Some(prototype_type) = type_store.root_type_of(store, prototype_shape)
        {
            context.profile_mut().add_root_prototype(root_type, prototype_type);
            self.record_layout_from(store, prototype_shape, visited);
        }
    }
}

fn call_site(slot: SlotValue) -> SiteFeedback {
    match slot {
        SlotValue::Function(callee) => SiteFeedback::Call(CallTarget::Method(callee.method)),
        SlotValue::BuiltinCallee(id) => SiteFeedback::Call(CallTarget::Builtin(id)),
        SlotValue::Hole => SiteFeedback::Call(CallTarget::Mega),
        _ => SiteFeedback::InsufficientProfile,
    }
}

fn read_slot(method: &Method, slot: SlotId) -> SlotValue {
    method
        .feedback
        .read(|slots| slots.get(slot.index()).cloned().unwrap_or_default())
}

fn read_pair(method: &Method, slot: SlotId) -> (SlotValue, SlotValue) {
    method.feedback.read(|slots| {
        let get = |index: usize| slots.get(index).cloned().unwrap_or_default();
        (get(slot.index()), get(slot.next().index()))
    })
}
