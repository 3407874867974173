//! Integration tests running the builder-chain pass through the scheduler.

use builderfold::{prelude::*, Result};

fn sb() -> TypeRef {
    TypeRef::new("StringBuilder")
}

/// `return new StringBuilder().append(piece).toString()`
fn greeting(piece: &str) -> SsaFunction {
    let append = MethodRef::instance(sb(), "append", vec![SsaType::string()], SsaType::Void);
    let to_string = MethodRef::instance(sb(), "toString", vec![], SsaType::string());
    SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(MethodRef::constructor(sb(), vec![]), &[v]);
            let x = b.const_str(piece);
            b.callvirt_void(append, &[v, x]);
            let s = b.callvirt(to_string, &[v]);
            b.ret_val(s);
        });
    })
}

fn run(ctx: &CompilerContext) -> Result<usize> {
    let mut scheduler = PassScheduler::from_config(&ctx.config);
    scheduler.add_pass(Box::new(BuilderChainPass::new()));
    scheduler.run_pipeline(ctx)
}

#[test]
fn test_pipeline_optimizes_every_method() -> Result<()> {
    let ctx = CompilerContext::new();
    for id in 0..16 {
        ctx.add_method(MethodId::new(id), greeting(&format!("hello {id}")));
    }

    let iterations = run(&ctx)?;
    assert_eq!(iterations, 2);
    assert_eq!(ctx.events.count(EventKind::ConstantFolded), 16);
    assert_eq!(ctx.events.count(EventKind::BuilderRemoved), 16);
    assert!(!ctx.events.has(EventKind::Error));

    for id in 0..16 {
        assert!(ctx.was_processed(MethodId::new(id)));
        ctx.with_method(MethodId::new(id), |ssa| {
            assert!(ssa
                .iter_instructions()
                .all(|(_, _, instr)| !matches!(instr.op(), SsaOp::NewObj { .. })));
        })?;
    }

    let stats = ctx.events.stats();
    assert_eq!(stats.methods_changed, 16);
    assert_eq!(stats.constants_folded, 16);
    Ok(())
}

#[test]
fn test_disabled_config_changes_nothing() -> Result<()> {
    let ctx = CompilerContext::with_config(OptimizerConfig::disabled());
    ctx.add_method(MethodId::new(1), greeting("x"));

    assert_eq!(run(&ctx)?, 1);
    assert!(ctx.events.is_empty());
    assert!(!ctx.was_processed(MethodId::new(1)));
    Ok(())
}

#[test]
fn test_debug_methods_are_skipped() -> Result<()> {
    let debug = MethodId::new(1);
    let release = MethodId::new(2);
    let ctx = CompilerContext::with_config(OptimizerConfig::default().with_debug_method(debug));
    ctx.add_method(debug, greeting("x"));
    ctx.add_method(release, greeting("y"));

    run(&ctx)?;
    assert!(!ctx.was_processed(debug));
    assert!(ctx.was_processed(release));
    let allocations = ctx.with_method(debug, |ssa| {
        ssa.iter_instructions()
            .filter(|(_, _, instr)| matches!(instr.op(), SsaOp::NewObj { .. }))
            .count()
    })?;
    assert_eq!(allocations, 1);
    Ok(())
}

#[test]
fn test_zero_rounds_reported_as_error_event() -> Result<()> {
    let ctx = CompilerContext::with_config(OptimizerConfig::default().with_munching_rounds(0));
    ctx.add_method(MethodId::new(1), greeting("x"));

    run(&ctx)?;
    assert_eq!(ctx.events.count(EventKind::Error), 1);
    assert!(!ctx.was_processed(MethodId::new(1)));
    Ok(())
}
