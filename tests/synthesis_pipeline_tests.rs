//! End-to-end tests of the synthesis front half: region selection, register
//! slots, specifications, rewritten calls, host source and shim.
//!
//! The oracle is the in-process dry run, so nothing external is started.

use bumpalo::Bump;
use vsynth::codegen::synthesized_sites;
use vsynth::ir::{ExprKind, StmtKind};
use vsynth::{BuildConfig, CompilationSession, Datatype, DryRunOracle, Kernel, LoopKind, Module};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn synthesized_module<'s, 'arena>(
    session: &'s CompilationSession<'arena>,
    dir: &std::path::Path,
    kernel: Kernel,
    oracle: &mut DryRunOracle,
) -> Module<'s, 'arena> {
    let mut module = Module::new(session, BuildConfig::default().with_tmpdir(dir));
    let function = kernel.build(module.ir_mut(), 4);
    module.add_function(function).unwrap();
    module.compile_to_source(Some(oracle)).unwrap();
    module
}

#[test]
fn test_vec_add_scenario() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let module = synthesized_module(&session, dir.path(), Kernel::VecAdd, &mut oracle);

    assert_eq!(module.requests().len(), 1);
    let request = &module.requests()[0];
    assert_eq!(request.slots.len(), 2);
    assert!(request.slots.iter().all(|slot| slot.is_load()));
    assert_eq!(request.lanes, 4);

    let sites = synthesized_sites(module.ir(), module.functions());
    assert_eq!(sites.len(), 1);
    match &module.ir().expr(sites[0].data).kind {
        ExprKind::Call { args, .. } => assert_eq!(args.len(), 2),
        other => panic!("expected call, got {:?}", other),
    }

    let shim = module.shim().expect("vec-add must produce a shim");
    assert_eq!(shim.wrappers.len(), 1);
    assert_eq!(shim.wrappers[0].arity(), 3);
    assert!(module.paths().shim().exists());
    assert_eq!(session.stats().rewrites, 1);
}

#[test]
fn test_slot_order_agrees_across_outputs() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let module = synthesized_module(&session, dir.path(), Kernel::ScaAdd, &mut oracle);
    let library = module.library_name();

    let request = &module.requests()[0];
    let slot_exprs: Vec<_> = request.slots.iter().map(|slot| slot.expr).collect();
    assert!(request.slots[0].is_load());
    assert!(!request.slots[1].is_load());

    // Specification: slot i is reg_i.
    assert!(request.spec.contains("(define-symbolic reg_0_bitvector (bitvector 128))"));
    assert!(request.spec.contains("(define-symbolic reg_1_bitvector (bitvector 32))"));
    assert!(request.spec.contains("(hash-set! id-map reg_1 1)"));
    assert!(request.spec.contains("(vec-add reg_0 (x4 reg_1))"));

    // Rewritten call: argument i is slot i.
    let sites = synthesized_sites(module.ir(), module.functions());
    let ExprKind::Call { args, .. } = &module.ir().expr(sites[0].data).kind else {
        panic!("expected a synthesized call");
    };
    assert_eq!(args, &slot_exprs);

    // Shim: parameter i + 1 is slot i.
    let wrapper = &module.shim().unwrap().wrappers[0];
    let operands: Vec<_> = wrapper.params.iter().map(|p| p.operand).collect();
    assert_eq!(operands, slot_exprs);
    assert!(wrapper.params[0].by_pointer);
    assert!(!wrapper.params[1].by_pointer);

    // Host call site passes the same operands in the same order.
    let call = format!("shim_hydride_node_{}_0(&out[i], &a[i], k);", library);
    assert!(module.source().contains(&call), "missing `{}` in\n{}", call, module.source());
}

#[test]
fn test_repeated_load_shares_one_slot() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let mut module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));

    let function = {
        let ir = module.ir_mut();
        let a = ir.ptr_var("a", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let n = ir.param("n", Datatype::Int32);
        let first = ir.load(a, i);
        let second = ir.load(a, i);
        let doubled = ir.add(first, second);
        let store = ir.store(out, i, doubled);
        let zero = ir.literal_int(0, Datatype::Int32);
        let one = ir.literal_int(1, Datatype::Int32);
        let body = ir.for_loop(i, zero, n, one, store, LoopKind::Vectorized, 8);
        ir.function("double", body, vec![a, n], vec![out])
    };
    module.add_function(function).unwrap();
    module.compile_to_source(Some(&mut oracle)).unwrap();

    let request = &module.requests()[0];
    assert_eq!(request.slots.len(), 1);
    assert!(request.spec.contains("(vec-add reg_0 reg_0)"));
    assert!(request.spec.contains("(bitvector 256)"));
    let wrapper = &module.shim().unwrap().wrappers[0];
    assert_eq!(wrapper.arity(), 2);
}

#[test]
fn test_constant_operand_is_broadcast_not_slotted() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let module = synthesized_module(&session, dir.path(), Kernel::VecAddConst, &mut oracle);

    let request = &module.requests()[0];
    assert_eq!(request.slots.len(), 1);
    assert!(request.spec.contains("(vec-add reg_0 (x4 (int-imm (bv 3 32) #t)))"));
}

#[test]
fn test_only_inner_loop_of_2d_kernel_is_vectorized() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let module = synthesized_module(&session, dir.path(), Kernel::VecAdd2d, &mut oracle);

    assert_eq!(module.requests().len(), 1);
    let source = module.source();
    assert!(source.contains("for (int32_t i = 0; i < m; i += 1) {"));
    assert!(source.contains("for (int32_t j = 0; j < n; j += 4) {"));
}

#[test]
fn test_float_reduction_is_not_synthesized() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let module = synthesized_module(&session, dir.path(), Kernel::Reduction, &mut oracle);

    assert!(module.requests().is_empty());
    assert!(oracle.specs.is_empty());
    assert!(!module.mutated());
    assert!(module.shim().is_none());
    assert!(module.source().contains("sum = (sum + a[(i) + __lane]);"));
}

#[test]
fn test_second_pass_is_a_no_op() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let mut module = synthesized_module(&session, dir.path(), Kernel::VecAdd, &mut oracle);

    let before: Vec<_> = module.functions().to_vec();
    let source = module.source().to_string();
    module.compile_to_source(Some(&mut oracle)).unwrap();

    assert_eq!(module.functions(), &before[..]);
    assert_eq!(module.requests().len(), 1);
    assert_eq!(module.source(), source);
    assert!(module.mutated());
}

#[test]
fn test_serial_loops_leave_ir_untouched() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = DryRunOracle::default();
    let mut module = Module::new(&session, BuildConfig::default().with_tmpdir(dir.path()));

    let function = {
        let ir = module.ir_mut();
        let a = ir.ptr_var("a", Datatype::Int32);
        let out = ir.ptr_var("out", Datatype::Int32);
        let i = ir.var("i", Datatype::Int32);
        let n = ir.param("n", Datatype::Int32);
        let la = ir.load(a, i);
        let neg = ir.neg(la);
        let store = ir.store(out, i, neg);
        let zero = ir.literal_int(0, Datatype::Int32);
        let one = ir.literal_int(1, Datatype::Int32);
        let body = ir.for_loop(i, zero, n, one, store, LoopKind::Serial, 0);
        ir.function("negate", body, vec![a, n], vec![out])
    };
    module.add_function(function).unwrap();
    module.compile_to_source(Some(&mut oracle)).unwrap();

    assert_eq!(module.functions(), &[function]);
    assert!(oracle.specs.is_empty());
    match module.ir().stmt(function) {
        StmtKind::Function { name, .. } => assert_eq!(name, "negate"),
        other => panic!("expected function, got {:?}", other),
    }
}
