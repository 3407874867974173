//! Integration tests for the builder-chain optimization.
//!
//! Each test builds a small function around a `StringBuilder` chain, runs the
//! optimizer, and checks what is left of the chain. Counts are reported as
//! `(inits, appends, materializations)` remaining.

use builderfold::{
    analysis::ssa::{FieldRef, SsaBlockBuilder},
    prelude::*,
    Result,
};

fn sb() -> TypeRef {
    TypeRef::new("StringBuilder")
}

fn init() -> MethodRef {
    MethodRef::constructor(sb(), vec![])
}

fn init_capacity() -> MethodRef {
    MethodRef::constructor(sb(), vec![SsaType::I32])
}

fn append_string() -> MethodRef {
    MethodRef::instance(sb(), "append", vec![SsaType::string()], SsaType::class("StringBuilder"))
}

fn append_int() -> MethodRef {
    MethodRef::instance(sb(), "append", vec![SsaType::I32], SsaType::class("StringBuilder"))
}

fn append_object() -> MethodRef {
    MethodRef::instance(sb(), "append", vec![SsaType::object()], SsaType::class("StringBuilder"))
}

fn to_string() -> MethodRef {
    MethodRef::instance(sb(), "toString", vec![], SsaType::string())
}

fn length() -> MethodRef {
    MethodRef::instance(sb(), "length", vec![], SsaType::I32)
}

fn unknown_string() -> MethodRef {
    MethodRef::static_method(TypeRef::new("Helper"), "unknown", vec![], SsaType::string())
}

fn holder_field() -> FieldRef {
    FieldRef::new(TypeRef::new("Holder"), "builder", SsaType::class("StringBuilder"))
}

/// `(inits, appends, materializations)` left in `ssa`.
fn chain_counts(ssa: &SsaFunction) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for (_, _, instr) in ssa.iter_instructions() {
        let Some((method, _)) = instr.op().as_invoke() else {
            continue;
        };
        if !method.holder.is("StringBuilder") {
            continue;
        }
        match &*method.name {
            "<init>" => counts.0 += 1,
            "append" => counts.1 += 1,
            "toString" => counts.2 += 1,
            _ => {}
        }
    }
    counts
}

fn allocations(ssa: &SsaFunction) -> usize {
    ssa.iter_instructions()
        .filter(|(_, _, instr)| matches!(instr.op(), SsaOp::NewObj { .. }))
        .count()
}

fn string_constants(ssa: &SsaFunction) -> Vec<String> {
    ssa.iter_instructions()
        .filter_map(|(_, _, instr)| match instr.op() {
            SsaOp::Const { value, .. } => value.as_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

/// Value returned by the single `return` of `ssa`.
fn returned(ssa: &SsaFunction) -> Option<SsaVarId> {
    ssa.iter_instructions().find_map(|(_, _, instr)| match instr.op() {
        SsaOp::Return { value } => *value,
        _ => None,
    })
}

fn constant_of(ssa: &SsaFunction, value: SsaVarId) -> Option<String> {
    ssa.iter_instructions().find_map(|(_, _, instr)| match instr.op() {
        SsaOp::Const { dest, value: c } if *dest == value => c.as_str().map(str::to_string),
        _ => None,
    })
}

fn optimize(ssa: &mut SsaFunction) -> Result<bool> {
    let changed = BuilderChainOptimizer::new().optimize(ssa)?;
    ssa.verify()?;
    Ok(changed)
}

#[test]
fn test_straight_line_folds_to_constant() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            let y = b.const_str("y");
            b.callvirt_void(append_string(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    assert_eq!(allocations(&ssa), 0);
    let result = returned(&ssa).expect("returns a value");
    assert_eq!(constant_of(&ssa, result).as_deref(), Some("xy"));
    Ok(())
}

#[test]
fn test_mixed_constants_render_like_their_overloads() -> Result<()> {
    let append_char = MethodRef::instance(sb(), "append", vec![SsaType::Char], SsaType::Void);
    let append_bool = MethodRef::instance(sb(), "append", vec![SsaType::Bool], SsaType::Void);
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let a = b.const_i32(-7);
            b.callvirt_void(append_int(), &[v, a]);
            let c = b.const_char('c');
            b.callvirt_void(append_char, &[v, c]);
            let t = b.const_bool(true);
            b.callvirt_void(append_bool, &[v, t]);
            let n = b.const_null();
            b.callvirt_void(append_object(), &[v, n]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    let result = returned(&ssa).expect("returns a value");
    assert_eq!(constant_of(&ssa, result).as_deref(), Some("-7ctruenull"));
    Ok(())
}

#[test]
fn test_escaped_builder_is_kept() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            b.store_static(holder_field(), v);
            let y = b.const_str("y");
            b.callvirt_void(append_string(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    assert_eq!(allocations(&ssa), 1);
    Ok(())
}

#[test]
fn test_unknown_argument_is_kept() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let u = b.call(unknown_string(), &[]);
            b.callvirt_void(append_string(), &[v, u]);
            let y = b.const_str("y");
            b.callvirt_void(append_string(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(!optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    Ok(())
}

#[test]
fn test_trailing_constant_appends_still_merge() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let u = b.call(unknown_string(), &[]);
            b.callvirt_void(append_string(), &[v, u]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            let y = b.const_str("y");
            b.callvirt_void(append_string(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    assert!(string_constants(&ssa).contains(&"xy".to_string()));
    Ok(())
}

#[test]
fn test_different_content_on_branches_is_not_folded() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let cond = f.arg(0);
        let mut v = SsaVarId::new(0);
        f.block(0, |b| {
            v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            b.branch(cond, 1, 2);
        });
        f.block(1, |b| {
            let x = b.const_str("a");
            b.callvirt_void(append_string(), &[v, x]);
            b.jump(3);
        });
        f.block(2, |b| {
            let x = b.const_str("b");
            b.callvirt_void(append_string(), &[v, x]);
            b.jump(3);
        });
        f.block(3, |b| {
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    Ok(())
}

#[test]
fn test_unused_diamond_is_removed() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let cond = f.arg(0);
        let mut v = SsaVarId::new(0);
        f.block(0, |b| {
            v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            b.branch(cond, 1, 2);
        });
        f.block(1, |b| {
            let x = b.const_str("a");
            b.callvirt_void(append_string(), &[v, x]);
            b.jump(3);
        });
        f.block(2, |b| {
            let x = b.const_str("b");
            b.callvirt_void(append_string(), &[v, x]);
            b.jump(3);
        });
        f.block(3, |b| b.ret());
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    assert_eq!(allocations(&ssa), 0);
    Ok(())
}

#[test]
fn test_unmaterialized_builder_is_removed() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            b.ret();
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    assert_eq!(allocations(&ssa), 0);
    Ok(())
}

#[test]
fn test_empty_builder_folds_to_empty_string() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            let capacity = b.const_i32(16);
            b.call_void(init_capacity(), &[v, capacity]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    let result = returned(&ssa).expect("returns a value");
    assert_eq!(constant_of(&ssa, result).as_deref(), Some(""));
    Ok(())
}

#[test]
fn test_append_in_loop_is_kept() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let cond = f.arg(0);
        let mut v = SsaVarId::new(0);
        f.block(0, |b| {
            v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            b.jump(1);
        });
        f.block(1, |b| b.branch(cond, 2, 3));
        f.block(2, |b| {
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            b.jump(1);
        });
        f.block(3, |b| {
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 1, 1));
    assert!(!string_constants(&ssa).iter().any(|s| s.is_empty()));
    Ok(())
}

#[test]
fn test_builder_inside_loop_body_folds_per_iteration() -> Result<()> {
    let consume = MethodRef::static_method(
        TypeRef::new("Helper"),
        "consume",
        vec![SsaType::string()],
        SsaType::Void,
    );
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let cond = f.arg(0);
        f.block(0, |b| b.jump(1));
        f.block(1, |b| b.branch(cond, 2, 3));
        f.block(2, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            let s = b.callvirt(to_string(), &[v]);
            b.call_void(consume.clone(), &[s]);
            b.jump(1);
        });
        f.block(3, |b| b.ret());
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    assert_eq!(allocations(&ssa), 0);
    Ok(())
}

#[test]
fn test_builder_flowing_into_phi_is_kept() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let cond = f.arg(0);
        let mut left = SsaVarId::new(0);
        let mut right = SsaVarId::new(0);
        f.block(0, |b| b.branch(cond, 1, 2));
        f.block(1, |b| {
            left = b.new_obj(&sb());
            b.call_void(init(), &[left]);
            let x = b.const_str("a");
            b.callvirt_void(append_string(), &[left, x]);
            b.jump(3);
        });
        f.block(2, |b| {
            right = b.new_obj(&sb());
            b.call_void(init(), &[right]);
            let x = b.const_str("b");
            b.callvirt_void(append_string(), &[right, x]);
            b.jump(3);
        });
        f.block(3, |b| {
            let merged = b.phi(&[(1, left), (2, right)]);
            let s = b.callvirt(to_string(), &[merged]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (2, 2, 1));
    assert_eq!(allocations(&ssa), 2);
    Ok(())
}

#[test]
fn test_capacity_inspection_blocks_init_fold() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("a");
            b.callvirt_void(append_string(), &[v, x]);
            let _ = b.callvirt(length(), &[v]);
            let y = b.const_str("b");
            b.callvirt_void(append_string(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    Ok(())
}

#[test]
fn test_unknown_builder_method_is_kept() -> Result<()> {
    let reverse = MethodRef::instance(sb(), "reverse", vec![], SsaType::class("StringBuilder"));
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("ab");
            b.callvirt_void(append_string(), &[v, x]);
            b.callvirt_void(reverse, &[v]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    optimize(&mut ssa)?;
    let (inits, _, materializations) = chain_counts(&ssa);
    assert_eq!((inits, materializations), (1, 1));
    assert_eq!(allocations(&ssa), 1);
    assert!(ssa.iter_instructions().any(|(_, _, instr)| instr
        .op()
        .as_invoke()
        .is_some_and(|(method, _)| method.is("StringBuilder", "reverse"))));
    Ok(())
}

#[test]
fn test_embedded_builder_folds() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let inner = b.new_obj(&sb());
            b.call_void(init(), &[inner]);
            let x = b.const_str("in");
            b.callvirt_void(append_string(), &[inner, x]);
            let outer = b.new_obj(&sb());
            b.call_void(init(), &[outer]);
            let y = b.const_str("out:");
            b.callvirt_void(append_string(), &[outer, y]);
            b.callvirt_void(append_object(), &[outer, inner]);
            let s = b.callvirt(to_string(), &[outer]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    assert_eq!(allocations(&ssa), 0);
    let result = returned(&ssa).expect("returns a value");
    assert_eq!(constant_of(&ssa, result).as_deref(), Some("out:in"));
    Ok(())
}

#[test]
fn test_single_string_becomes_existing_value() -> Result<()> {
    let string_init = MethodRef::constructor(sb(), vec![SsaType::string()]);
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let u = b.call(unknown_string(), &[]);
            let nn = b.assume(u);
            let v = b.new_obj(&sb());
            b.call_void(string_init, &[v, nn]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    let result = returned(&ssa).expect("returns a value");
    assert!(matches!(
        ssa.iter_instructions()
            .find(|(_, _, instr)| instr.def() == Some(result))
            .map(|(_, _, instr)| instr.op().clone()),
        Some(SsaOp::Assume { .. })
    ));
    Ok(())
}

#[test]
fn test_two_pieces_become_concat() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let u = b.call(unknown_string(), &[]);
            let nn = b.assume(u);
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            b.callvirt_void(append_string(), &[v, nn]);
            let x = b.const_str("!");
            b.callvirt_void(append_string(), &[v, x]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(optimize(&mut ssa)?);
    assert_eq!(chain_counts(&ssa), (0, 0, 0));
    let concats = ssa
        .iter_instructions()
        .filter(|(_, _, instr)| {
            instr
                .op()
                .as_invoke()
                .is_some_and(|(method, _)| method.is("String", "concat"))
        })
        .count();
    assert_eq!(concats, 1);
    Ok(())
}

#[test]
fn test_identity_sensitive_result_is_kept() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            let s = b.callvirt(to_string(), &[v]);
            let same = b.ceq(s, x);
            b.ret_val(same);
        });
    });

    optimize(&mut ssa)?;
    let (_, _, materializations) = chain_counts(&ssa);
    assert_eq!(materializations, 1);
    Ok(())
}

#[test]
fn test_constants_in_guarded_block_go_to_entry() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
        let _ = f.arg(0);
        f.block(0, |b| b.jump(1));
        f.block(1, |b| {
            b.handler(2);
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_i32(4);
            b.callvirt_void(append_int(), &[v, x]);
            let y = b.const_i32(2);
            b.callvirt_void(append_int(), &[v, y]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
        f.block(2, |b| b.ret());
    });

    assert!(optimize(&mut ssa)?);
    let entry = ssa.block(0).expect("entry block");
    assert!(matches!(
        entry.instruction(0).map(SsaInstruction::op),
        Some(SsaOp::Argument { .. })
    ));
    let result = returned(&ssa).expect("returns a value");
    assert!(entry
        .instructions()
        .iter()
        .any(|instr| instr.def() == Some(result) && matches!(instr.op(), SsaOp::Const { .. })));
    assert_eq!(constant_of(&ssa, result).as_deref(), Some("42"));
    Ok(())
}

fn helper_call() -> MethodRef {
    MethodRef::static_method(TypeRef::new("Helper"), "foo", vec![], SsaType::Void)
}

/// `sb = new; try { sb.append("a"); Helper.foo(); sb.append("b") } catch { handler }`
fn guarded_appends(handler: impl FnOnce(&mut SsaBlockBuilder<'_>, SsaVarId)) -> SsaFunction {
    SsaFunctionBuilder::new(0).build_with(|f| {
        let mut v = SsaVarId::new(0);
        f.block(0, |b| {
            v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            b.jump(1);
        });
        f.block(1, |b| {
            b.handler(2);
            let a = b.const_str("a");
            b.callvirt_void(append_string(), &[v, a]);
            b.call_void(helper_call(), &[]);
            let x = b.const_str("b");
            b.callvirt_void(append_string(), &[v, x]);
            b.ret();
        });
        f.block(2, |b| handler(b, v));
    })
}

#[test]
fn test_handler_materialize_sees_partial_chain() -> Result<()> {
    // Helper.foo() may throw after "a" was appended but before "b"
    let mut ssa = guarded_appends(|b, v| {
        let s = b.callvirt(to_string(), &[v]);
        b.ret_val(s);
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 2, 1));
    assert_eq!(allocations(&ssa), 1);
    let constants = string_constants(&ssa);
    assert!(!constants.iter().any(|c| c == "ab"));
    assert!(constants.iter().any(|c| c == "a"));
    assert!(constants.iter().any(|c| c == "b"));
    Ok(())
}

#[test]
fn test_handler_append_keeps_partial_chain() -> Result<()> {
    let mut ssa = guarded_appends(|b, v| {
        let c = b.const_str("c");
        b.callvirt_void(append_string(), &[v, c]);
        let s = b.callvirt(to_string(), &[v]);
        b.ret_val(s);
    });

    optimize(&mut ssa)?;
    assert_eq!(chain_counts(&ssa), (1, 3, 1));
    let constants = string_constants(&ssa);
    for folded in ["ab", "ac", "bc", "abc"] {
        assert!(!constants.iter().any(|c| c == folded), "folded {folded}");
    }
    Ok(())
}

#[test]
fn test_optimization_is_idempotent() -> Result<()> {
    let build = || {
        SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
            let cond = f.arg(0);
            let mut v = SsaVarId::new(0);
            f.block(0, |b| {
                v = b.new_obj(&sb());
                b.call_void(init(), &[v]);
                let x = b.const_str("a");
                b.callvirt_void(append_string(), &[v, x]);
                let u = b.call(unknown_string(), &[]);
                b.callvirt_void(append_string(), &[v, u]);
                b.branch(cond, 1, 2);
            });
            f.block(1, |b| {
                let s = b.callvirt(to_string(), &[v]);
                b.ret_val(s);
            });
            f.block(2, |b| b.ret());
        })
    };

    let mut ssa = build();
    optimize(&mut ssa)?;
    let once = format!("{ssa:?}");
    assert!(!optimize(&mut ssa)?);
    assert_eq!(format!("{ssa:?}"), once);
    Ok(())
}

#[test]
fn test_single_round_still_folds_chain() -> Result<()> {
    let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
        f.block(0, |b| {
            let v = b.new_obj(&sb());
            b.call_void(init(), &[v]);
            let x = b.const_str("x");
            b.callvirt_void(append_string(), &[v, x]);
            let s = b.callvirt(to_string(), &[v]);
            b.ret_val(s);
        });
    });

    assert!(BuilderChainOptimizer::new().with_rounds(1).optimize(&mut ssa)?);
    let result = returned(&ssa).expect("returns a value");
    assert_eq!(constant_of(&ssa, result).as_deref(), Some("x"));
    Ok(())
}
