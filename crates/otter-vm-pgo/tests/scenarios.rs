//! End-to-end scenarios across the shape store, feedback vectors and the
//! profiler.

use otter_vm_bytecode::{
    AbcId, BytecodeBuilder, HandlerInfo, IcHandler, IcState, Method, MethodId, Opcode, SlotId,
};
use otter_vm_pgo::{
    BytecodeTypeProfiler, CompilationContext, FeedbackTuple, PgoConfig, ProfileType,
    ProfileTypeTuple, SiteFeedback, TypeHint,
};
use otter_vm_shape::{
    CompilationDependencies, DeoptReason, FunctionId, ObjectId, ObjectKind, PropertyAttributes,
    PropertyKey, Representation, ShapeId, ShapeStore,
};

const ABC: AbcId = AbcId(1);

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

fn add(store: &mut ShapeStore, shape: ShapeId, name: &str) -> ShapeId {
    store.add_property(shape, key(name), PropertyAttributes::data())
}

fn load_site_method() -> Method {
    let mut builder = BytecodeBuilder::new();
    let operands = vec![0; Opcode::LdObjByName.operand_size()];
    builder.emit(Opcode::LdObjByName, Some(SlotId(0)), &operands);
    Method::builder()
        .id(MethodId(20))
        .abc(ABC)
        .bytecode(builder.finish())
        .feedback_slots(2)
        .build()
}

fn field_handler(offset: u32) -> IcHandler {
    IcHandler::Field(HandlerInfo::field(offset, true, Representation::Tagged))
}

/// Root shape named as instances of class `id`
fn named_root(store: &mut ShapeStore, context: &CompilationContext, id: u32) -> (ShapeId, ProfileType) {
    let root = store.create_root(ObjectKind::Plain, 48, 4);
    let class = ProfileType::class(ABC, MethodId(id));
    context.type_store().set_root_profile_type(root, class);
    (root, class)
}

#[test]
fn test_property_offsets_follow_insertion_order() {
    let mut store = ShapeStore::new();
    let root = store.create_root(ObjectKind::Plain, 48, 4);
    let xy = {
        let x = add(&mut store, root, "x");
        add(&mut store, x, "y")
    };
    let xyz = add(&mut store, xy, "z");

    let offsets: Vec<u32> = ["x", "y", "z"]
        .iter()
        .map(|name| store.find_property(xyz, &key(name)).map(|e| e.offset))
        .collect::<Option<_>>()
        .unwrap();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert!(store.find_property(xyz, &key("w")).is_none());
    assert!(store.find_property(xy, &key("z")).is_none());
    assert_eq!(store.shape(xyz).parent(), Some(xy));
}

#[test]
fn test_monomorphic_field_hit_is_one_own_tuple() {
    let mut store = ShapeStore::new();
    let context = CompilationContext::new(ABC, PgoConfig::default());
    let (root, class) = named_root(&mut store, &context, 1);
    let x = add(&mut store, root, "x");
    let xy = add(&mut store, x, "y");
    assert_eq!(store.find_property(xy, &key("y")).map(|e| e.offset), Some(1));

    let method = load_site_method();
    let state = method
        .feedback
        .update_property_ic(SlotId(0), xy.downgrade(), field_handler(1), 4)
        .unwrap();
    assert_eq!(state, IcState::Monomorphic);

    let feedback = BytecodeTypeProfiler::new(&context).profile_method(&store, &method);
    let receiver = context.type_store().name_of(xy).unwrap();
    assert_eq!(receiver.root, class);
    assert!(!receiver.is_root());
    assert_eq!(
        feedback.site(0).map(SiteFeedback::tuples),
        Some(vec![FeedbackTuple::own(receiver, TypeHint::None)])
    );
    assert!(feedback.has_enough_profile(0));
    assert_eq!(context.profile().method(MethodId(20)), Some(&feedback));
    assert_eq!(context.profile().layout(class).map(|l| l.node_count()), Some(3));
}

#[test]
fn test_polymorphic_site_goes_mega_past_limit() {
    let mut store = ShapeStore::new();
    let config = PgoConfig {
        max_polymorphic_entries: 2,
        ..PgoConfig::default()
    };
    let context = CompilationContext::new(ABC, config);
    let (a, class_a) = named_root(&mut store, &context, 1);
    let (b, class_b) = named_root(&mut store, &context, 2);
    let (c, _) = named_root(&mut store, &context, 3);

    let method = load_site_method();
    let limit = context.config().max_polymorphic_entries;
    method.feedback.update_property_ic(SlotId(0), a.downgrade(), field_handler(0), limit).unwrap();
    let state = method
        .feedback
        .update_property_ic(SlotId(0), b.downgrade(), field_handler(0), limit)
        .unwrap();
    assert_eq!(state, IcState::Polymorphic(2));

    let mut profiler = BytecodeTypeProfiler::new(&context);
    let feedback = profiler.profile_method(&store, &method);
    let tuples = feedback.site(0).map(SiteFeedback::tuples).unwrap();
    assert_eq!(tuples.len(), 2);
    assert!(tuples.contains(&FeedbackTuple::own(ProfileTypeTuple::root(class_a), TypeHint::None)));
    assert!(tuples.contains(&FeedbackTuple::own(ProfileTypeTuple::root(class_b), TypeHint::None)));

    let state = method
        .feedback
        .update_property_ic(SlotId(0), c.downgrade(), field_handler(0), limit)
        .unwrap();
    assert_eq!(state, IcState::Megamorphic);
    let feedback = profiler.profile_method(&store, &method);
    assert_eq!(feedback.site(0), Some(&SiteFeedback::Mega));
    assert_eq!(SiteFeedback::Mega.tuples(), vec![FeedbackTuple::mega()]);
}

#[test]
fn test_committed_code_deoptimizes_once() {
    let mut store = ShapeStore::new();
    let root = store.create_root(ObjectKind::Plain, 48, 4);
    let s1 = add(&mut store, root, "a");
    let other = store.create_root(ObjectKind::Plain, 48, 4);
    let s2 = add(&mut store, other, "b");

    let mut deps = CompilationDependencies::new(FunctionId(9));
    assert!(deps.depend_on_stability(&store, s1));
    assert!(deps.depend_on_not_prototype(&store, s2));
    let code = deps.commit(&mut store).unwrap();
    assert!(store.is_code_valid(code));

    let dictionary = store.transition_to_dictionary(s1);
    assert!(store.shape(dictionary).is_dictionary());
    assert!(!store.is_code_valid(code));
    let requests = store.take_deopt_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].code, code);
    assert_eq!(requests[0].reason, DeoptReason::ShapeUnstable);

    store.become_prototype(s2, ObjectId(4));
    assert_eq!(store.pending_deopt_count(), 0);
}

#[test]
fn test_recommit_after_deopt_listens_again() {
    let mut store = ShapeStore::new();
    let root = store.create_root(ObjectKind::Plain, 48, 4);
    let s1 = add(&mut store, root, "a");

    let mut deps = CompilationDependencies::new(FunctionId(3));
    assert!(deps.depend_on_not_prototype(&store, s1));
    let first = deps.commit(&mut store).unwrap();

    let mut deps = CompilationDependencies::new(FunctionId(3));
    assert!(deps.depend_on_not_prototype(&store, s1));
    let second = deps.commit(&mut store).unwrap();
    assert_ne!(first.generation, second.generation);
    assert!(!store.is_code_valid(first));

    store.become_prototype(s1, ObjectId(1));
    let requests = store.take_deopt_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].code, second);
    assert_eq!(requests[0].reason, DeoptReason::BecamePrototype);
}
