//! Profile in one shape store, reconstruct in another.

use std::sync::Barrier;

use otter_vm_bytecode::{
    AbcId, BytecodeBuilder, HandlerInfo, IcHandler, Method, MethodId, Opcode, SlotId,
};
use otter_vm_pgo::{
    CompilationContext, LayoutDescription, LayoutProperty, ObjectAllocator, PgoConfig,
    ProfileRecord, ProfileType, ProfileTypeKind, ProfileTypeTuple, RootRole, SiteFeedback,
};
use otter_vm_shape::{
    CompilationDependencies, DeoptReason, FunctionId, ObjectId, ObjectKind, PropertyAttributes,
    PropertyKey, Representation, ShapeFlags, ShapeId, ShapeStore, ShapeStoreConfig,
    SharedShapeStore,
};

const ABC: AbcId = AbcId(4);

fn prop(name: &str) -> LayoutProperty {
    LayoutProperty::new(&PropertyKey::string(name), PropertyAttributes::data()).unwrap()
}

fn layout(root_type: ProfileType, names: &[&str]) -> LayoutDescription {
    let mut layout = LayoutDescription::new(root_type, ObjectKind::Plain, 48, 4);
    layout.properties = names.iter().map(|n| prop(n)).collect();
    layout
}

fn context_with(layouts: Vec<LayoutDescription>, config: PgoConfig) -> CompilationContext {
    let mut profile = ProfileRecord::new(ABC);
    profile.merge_layouts(layouts);
    CompilationContext::new(ABC, config).with_profile(profile)
}

fn store_method(slot_count: usize) -> Method {
    let mut builder = BytecodeBuilder::new();
    let operands = vec![0; Opcode::StObjByName.operand_size()];
    builder.emit(Opcode::StObjByName, Some(SlotId(0)), &operands);
    Method::builder()
        .id(MethodId(30))
        .abc(ABC)
        .bytecode(builder.finish())
        .feedback_slots(slot_count)
        .build()
}

/// Hands out sequential object ids
#[derive(Default)]
struct Heap {
    next: u32,
    allocated: Vec<(ObjectId, ShapeId)>,
}

impl ObjectAllocator for Heap {
    fn allocate(&mut self, shape: ShapeId) -> ObjectId {
        self.next += 1;
        let object = ObjectId(self.next);
        self.allocated.push((object, shape));
        object
    }
}

#[test]
fn test_profiled_transition_is_rebuilt_in_fresh_store() {
    let class = ProfileType::class(ABC, MethodId(1));
    let (profile, result) = {
        let mut store = ShapeStore::new();
        let root = store.create_root(ObjectKind::Plain, 48, 4);
        let with_x = store.add_property(root, PropertyKey::string("x"), PropertyAttributes::data());
        let context = CompilationContext::new(ABC, PgoConfig::default());
        context.type_store().set_root_profile_type(root, class);

        let method = store_method(2);
        let handler = IcHandler::Transition {
            target: with_x.downgrade(),
            info: HandlerInfo::field(0, true, Representation::Tagged),
        };
        method
            .feedback
            .update_property_ic(SlotId(0), root.downgrade(), handler, 4)
            .unwrap();
        let feedback = context.profiler().profile_method(&store, &method);
        let Some(SiteFeedback::Object(tuples)) = feedback.site(0) else {
            panic!("expected object feedback, got {:?}", feedback.site(0));
        };
        let result = tuples[0].result;
        (context.into_profile(), result)
    };
    assert_eq!(profile.methods.len(), 1);

    let context = CompilationContext::new(ABC, PgoConfig::default()).with_profile(profile);
    let mut store = context.new_shape_store();
    let root = context
        .reconstructor()
        .reconstruct(&mut store, class, RootRole::Plain)
        .unwrap();

    let rebuilt = context.type_store().query_shape(result).unwrap();
    assert_eq!(store.shape(rebuilt).parent(), Some(root));
    let entry = store.find_property(rebuilt, &PropertyKey::string("x")).unwrap();
    assert_eq!(entry.offset, 0);
    assert!(store.find_property(root, &PropertyKey::string("x")).is_none());

    // Objects built at runtime reuse the reconstructed transition.
    let runtime = store.add_property(root, PropertyKey::string("x"), PropertyAttributes::data());
    assert_eq!(runtime, rebuilt);
}

#[test]
fn test_reconstruction_is_idempotent() {
    let class = ProfileType::class(ABC, MethodId(2));
    let mut recorded = layout(class, &["a", "b"]);
    recorded
        .record_transition(class, ProfileType::new(ABC, 1, ProfileTypeKind::Local), prop("c"))
        .unwrap();
    let context = context_with(vec![recorded], PgoConfig::default());
    let mut store = context.new_shape_store();
    let reconstructor = context.reconstructor();

    let first = reconstructor.reconstruct(&mut store, class, RootRole::Plain).unwrap();
    let shapes = store.len();
    let second = reconstructor.reconstruct(&mut store, class, RootRole::Plain).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.len(), shapes);
    assert_eq!(store.shape(first).property_count(), 2);
}

#[test]
fn test_fast_property_ceiling_rejects_layout() {
    let config = PgoConfig {
        max_fast_properties: 4,
        ..PgoConfig::default()
    };
    let class = ProfileType::class(ABC, MethodId(3));
    let literal = ProfileType::new(ABC, 9, ProfileTypeKind::ObjectLiteral);
    let names = ["a", "b", "c", "d", "e"];
    let context = context_with(vec![layout(class, &names), layout(literal, &names)], config);
    let mut store = context.new_shape_store();
    let reconstructor = context.reconstructor();

    assert!(reconstructor.reconstruct(&mut store, class, RootRole::Plain).is_none());
    assert!(context.type_store().query_shape(ProfileTypeTuple::root(class)).is_none());

    let role = RootRole::ObjectLiteral { literal_length: 5 };
    let dictionary = reconstructor.reconstruct(&mut store, literal, role).unwrap();
    assert!(store.shape(dictionary).is_dictionary());
    assert_eq!(store.shape(dictionary).dictionary_entries().count(), 5);
    assert_eq!(reconstructor.reconstruct(&mut store, literal, role), Some(dictionary));
}

#[test]
fn test_literal_cache_disabled_rejects_long_literal() {
    let config = PgoConfig {
        max_fast_properties: 2,
        literal_cache: false,
        ..PgoConfig::default()
    };
    let literal = ProfileType::new(ABC, 11, ProfileTypeKind::ObjectLiteral);
    let context = context_with(vec![layout(literal, &["a", "b", "c"])], config);
    let mut store = context.new_shape_store();
    let role = RootRole::ObjectLiteral { literal_length: 3 };
    assert!(context.reconstructor().reconstruct(&mut store, literal, role).is_none());
}

#[test]
fn test_constructor_used_as_prototype_wins_over_recorded_shape() {
    let constructor = ProfileType::constructor(ABC, MethodId(5));
    let context = context_with(vec![layout(constructor, &["length", "name"])], PgoConfig::default());
    let mut store = context.new_shape_store();
    let reconstructor = context.reconstructor();
    let tuple = ProfileTypeTuple::root(constructor);

    let recorded = reconstructor
        .reconstruct(&mut store, constructor, RootRole::Constructor)
        .unwrap();
    assert!(!store.shape(recorded).is_prototype());

    let mut deps = CompilationDependencies::new(FunctionId(1));
    assert!(deps.depend_on_not_prototype(&store, recorded));
    let code = deps.commit(&mut store).unwrap();

    // A derived class installs the constructor as its constructor's prototype.
    let prototype = reconstructor
        .reconcile_prototype(&mut store, tuple, ObjectId(77))
        .unwrap();
    assert_ne!(prototype, recorded);
    assert!(store.shape(prototype).is_prototype());
    assert!(store.shape(prototype).flags().contains(ShapeFlags::CLASS_CONSTRUCTOR));
    assert_eq!(context.type_store().query_shape(tuple), Some(prototype));

    assert!(!store.is_code_valid(code));
    let requests = store.take_deopt_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].reason, DeoptReason::BecamePrototype);

    let again = reconstructor.reconstruct(&mut store, constructor, RootRole::Constructor);
    assert_eq!(again, Some(prototype));
    assert_eq!(
        reconstructor.reconcile_prototype(&mut store, tuple, ObjectId(77)),
        Some(prototype)
    );
    assert_eq!(store.pending_deopt_count(), 0);
}

#[test]
fn test_class_definition_links_instances_to_prototype_object() {
    let class = ProfileType::class(ABC, MethodId(6));
    let proto = ProfileType::prototype(ABC, MethodId(6));
    let context = context_with(
        vec![layout(class, &["x"]), layout(proto, &["area"])],
        PgoConfig::default(),
    );
    context.profile_mut().add_root_prototype(class, proto);
    let mut store = context.new_shape_store();
    let mut heap = Heap::default();

    let instance = context
        .reconstructor()
        .reconstruct_definition(&mut store, &mut heap, class)
        .unwrap();
    assert_eq!(heap.allocated.len(), 1);
    let (object, _) = heap.allocated[0];
    assert_eq!(store.shape(instance).prototype(), Some(object));
    assert!(store.find_property(instance, &PropertyKey::string("x")).is_some());

    let proto_shape = context
        .type_store()
        .query_shape(ProfileTypeTuple::root(proto))
        .unwrap();
    assert_eq!(store.prototype_shape(object), Some(proto_shape));
    let flags = store.shape(proto_shape).flags();
    assert!(flags.contains(ShapeFlags::PROTOTYPE | ShapeFlags::CLASS_PROTOTYPE));
    assert!(store.find_property(proto_shape, &PropertyKey::string("area")).is_some());
}

#[test]
fn test_threads_agree_on_reconstructed_root() {
    let class = ProfileType::class(ABC, MethodId(8));
    let context = context_with(vec![layout(class, &["a", "b"])], PgoConfig::default());
    let shared = SharedShapeStore::new(ShapeStoreConfig::default());
    let barrier = Barrier::new(4);

    let roots: Vec<ShapeId> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let mut store = shared.lock();
                    context.reconstructor().reconstruct(&mut store, class, RootRole::Plain)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });
    assert!(roots.windows(2).all(|w| w[0] == w[1]));
    assert!(shared.lock().shape(roots[0]).is_shared());
}

#[test]
fn test_racing_record_shape_keeps_first_writer() {
    let context = CompilationContext::new(ABC, PgoConfig::default());
    let tuple = ProfileTypeTuple::root(ProfileType::class(ABC, MethodId(9)));
    let mut store = ShapeStore::new();
    let candidates: Vec<ShapeId> = (0..8)
        .map(|_| store.create_root(ObjectKind::Plain, 48, 4))
        .collect();
    let barrier = Barrier::new(candidates.len());

    let winners: Vec<ShapeId> = std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .iter()
            .map(|&shape| {
                let context = &context;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    context.type_store().record_shape(tuple, shape, false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let winner = context.type_store().query_shape(tuple).unwrap();
    assert!(winners.iter().all(|&w| w == winner));
    assert!(candidates.contains(&winner));
}
