//! Integration tests for the full wiring pipeline
//!
//! Exercises the whole stack: class declaration → template compilation
//! and memoization → tree-wide matchmaking → instantiation → triggering
//! and data flow.

use std::sync::Arc;

use serde_json::{json, Value};
use waggle::{
    BoundPlugin, CallArgs, CardinalityPolicy, HiveClass, HiveError, Identifier, RuntimeInstance,
};

/// Honors `RUST_LOG` so compile/resolve/instantiate spans show up when
/// a failing test needs them. `try_init` tolerates the per-test calls.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_test_writer()
        .try_init();
}

fn ident(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

/// Child class exporting one plugin under `identifier` that echoes its
/// payload tagged with `tag`.
fn plugin_hive(name: &'static str, identifier: &'static str, tag: &'static str) -> HiveClass {
    HiveClass::new(name).builder("build", move |ctx| {
        let plug = ctx.plugin(
            ident(identifier),
            CardinalityPolicy::MultipleOptional,
            true,
            move |_, payload| Ok(json!({ "tag": tag, "payload": payload })),
        );
        ctx.external("plug", plug)
    })
}

// ═══════════════════════════════════════════════════════════════
// Template memoization
// ═══════════════════════════════════════════════════════════════

#[test]
fn equal_args_share_one_template_across_parents() {
    init_tracing();
    let kid = HiveClass::new("kid").builder("build", |ctx| {
        let attr = ctx.attribute(Identifier::untyped(), json!(0));
        ctx.external("value", attr)
    });

    let kid_a = kid.clone();
    let parent_a = HiveClass::new("parent_a").builder("build", move |ctx| {
        let nested = ctx.hive(&kid_a, CallArgs::new())?;
        ctx.external("kid", nested)
    });
    let kid_b = kid.clone();
    let parent_b = HiveClass::new("parent_b").builder("build", move |ctx| {
        let nested = ctx.hive(&kid_b, CallArgs::new())?;
        ctx.external("kid", nested)
    });

    let a = parent_a.instantiate(CallArgs::new()).unwrap();
    let b = parent_b.instantiate(CallArgs::new()).unwrap();

    // Same class + value-equal args → one template identity, even when
    // embedded by unrelated parents
    assert!(Arc::ptr_eq(
        a.child("kid").unwrap().template(),
        b.child("kid").unwrap().template(),
    ));
    assert!(!Arc::ptr_eq(a.template(), b.template()));
}

#[test]
fn declarator_less_hive_still_memoizes_and_isolates_state() {
    init_tracing();
    let class = HiveClass::new("tally").builder("build", |ctx| {
        ctx.state("tally", 0..=0, |_, _| Ok(json!({ "n": 0 })))?;
        let n = ctx.property("tally", "n", Identifier::untyped());
        ctx.external("n", n)
    });

    let a = class.instantiate(CallArgs::new()).unwrap();
    let b = class.instantiate(CallArgs::new()).unwrap();
    assert!(Arc::ptr_eq(a.template(), b.template()));

    a.set("n", json!(12)).unwrap();
    assert_eq!(a.state("tally").unwrap(), json!({ "n": 12 }));
    assert_eq!(b.state("tally").unwrap(), json!({ "n": 0 }));
}

// ═══════════════════════════════════════════════════════════════
// Matchmaking
// ═══════════════════════════════════════════════════════════════

fn socketed_root(
    name: &'static str,
    policy: CardinalityPolicy,
    plugin_children: Vec<HiveClass>,
    socket_first: bool,
) -> HiveClass {
    HiveClass::new(name).builder("build", move |ctx| {
        let declare_socket = |ctx: &mut waggle::BuildCtx| {
            let sock = ctx.socket(ident("svc"), policy, true);
            ctx.external("sock", sock)
        };
        if socket_first {
            declare_socket(ctx)?;
        }
        for (i, child) in plugin_children.iter().enumerate() {
            let nested = ctx.hive(child, CallArgs::new())?;
            ctx.external(&format!("child_{i}"), nested)?;
        }
        if !socket_first {
            declare_socket(ctx)?;
        }
        Ok(())
    })
}

#[test]
fn matchmaking_is_declaration_order_independent() {
    init_tracing();
    for socket_first in [true, false] {
        let name: &'static str = if socket_first {
            "order_sock_first"
        } else {
            "order_plug_first"
        };
        let root = socketed_root(
            name,
            CardinalityPolicy::SingleRequired,
            vec![plugin_hive("echoer", "svc.echo", "echo")],
            socket_first,
        );

        let inst = root.instantiate(CallArgs::new()).unwrap();
        let bindings = inst.bindings("sock").unwrap();
        assert_eq!(bindings.len(), 1, "socket_first={socket_first}");
        assert_eq!(
            bindings[0].call(json!("hi")).unwrap(),
            json!({ "tag": "echo", "payload": "hi" }),
        );
    }
}

#[test]
fn sibling_subtrees_do_not_cross_match() {
    init_tracing();
    let with_socket = HiveClass::new("wants_svc").builder("build", |ctx| {
        let sock = ctx.socket(ident("svc"), CardinalityPolicy::SingleOptional, true);
        ctx.external("sock", sock)
    });
    let with_plugin = plugin_hive("offers_svc", "svc.echo", "echo");

    let root = HiveClass::new("siblings").builder("build", move |ctx| {
        let a = ctx.hive(&with_plugin, CallArgs::new())?;
        ctx.external("offers", a)?;
        let b = ctx.hive(&with_socket, CallArgs::new())?;
        ctx.external("wants", b)
    });

    // Registries pass down by copy: a sibling's plugin is invisible
    let inst = root.instantiate(CallArgs::new()).unwrap();
    let wants = inst.child("wants").unwrap();
    assert!(wants.bindings("sock").unwrap().is_empty());
}

#[test]
fn isolated_children_opt_out_of_matchmaking() {
    init_tracing();
    let offers = plugin_hive("offers_svc_iso", "svc.echo", "echo");

    let root = HiveClass::new("walled").builder("build", move |ctx| {
        let sock = ctx.socket(ident("svc"), CardinalityPolicy::MultipleOptional, true);
        ctx.external("sock", sock)?;
        let child = ctx.hive_isolated(&offers, CallArgs::new())?;
        ctx.external("walled_off", child)
    });

    let inst = root.instantiate(CallArgs::new()).unwrap();
    assert!(inst.bindings("sock").unwrap().is_empty());
}

#[test]
fn ancestor_socket_reaches_grandchild_plugin() {
    init_tracing();
    let grandchild = plugin_hive("leaf", "svc.deep", "deep");
    let middle = HiveClass::new("middle").builder("build", move |ctx| {
        let nested = ctx.hive(&grandchild, CallArgs::new())?;
        ctx.external("leaf", nested)
    });

    let root = HiveClass::new("deep_root").builder("build", move |ctx| {
        let wired = ctx.attribute(Identifier::untyped(), json!(false));
        ctx.external("wired", wired)?;
        let sock = ctx.socket_with(
            ident("svc"),
            CardinalityPolicy::SingleRequired,
            true,
            |inst: &RuntimeInstance, _plug: &BoundPlugin| inst.set("wired", json!(true)),
        );
        ctx.external("sock", sock)?;
        let nested = ctx.hive(&middle, CallArgs::new())?;
        ctx.external("mid", nested)
    });

    let inst = root.instantiate(CallArgs::new()).unwrap();

    // The receiver ran at delivery time
    assert_eq!(inst.get("wired").unwrap(), json!(true));

    let bindings = inst.bindings("sock").unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(
        bindings[0].call(json!(1)).unwrap(),
        json!({ "tag": "deep", "payload": 1 }),
    );
    // The binding's owner is the grandchild instance, not the root
    let leaf = inst.child("mid").unwrap().child("leaf").unwrap();
    assert_eq!(bindings[0].owner().id(), leaf.id());
}

// ═══════════════════════════════════════════════════════════════
// Cardinality policies
// ═══════════════════════════════════════════════════════════════

#[test]
fn single_required_needs_exactly_one_plugin() {
    init_tracing();
    let zero = socketed_root("req_zero", CardinalityPolicy::SingleRequired, vec![], true);
    let err = zero.instantiate(CallArgs::new()).unwrap_err();
    assert!(matches!(
        err,
        HiveError::PolicyUnderSubscribed {
            realized: 0,
            min: 1,
            ..
        }
    ));

    let one = socketed_root(
        "req_one",
        CardinalityPolicy::SingleRequired,
        vec![plugin_hive("only", "svc.a", "a")],
        true,
    );
    assert!(one.instantiate(CallArgs::new()).is_ok());

    let two = socketed_root(
        "req_two",
        CardinalityPolicy::SingleRequired,
        vec![
            plugin_hive("first", "svc.a", "a"),
            plugin_hive("second", "svc.b", "b"),
        ],
        true,
    );
    let err = two.instantiate(CallArgs::new()).unwrap_err();
    assert!(matches!(
        err,
        HiveError::PolicyOverSubscribed {
            realized: 1,
            max: 1,
            ..
        }
    ));
}

#[test]
fn multiple_optional_takes_all_comers() {
    init_tracing();
    let root = socketed_root(
        "open_house",
        CardinalityPolicy::MultipleOptional,
        vec![
            plugin_hive("p1", "svc.a", "a"),
            plugin_hive("p2", "svc.b", "b"),
            plugin_hive("p3", "svc.c", "c"),
        ],
        false,
    );

    let inst = root.instantiate(CallArgs::new()).unwrap();
    let tags: Vec<Value> = inst
        .bindings("sock")
        .unwrap()
        .iter()
        .map(|b| b.call(json!(null)).unwrap()["tag"].clone())
        .collect();
    assert_eq!(tags, vec![json!("a"), json!("b"), json!("c")]);
}

// ═══════════════════════════════════════════════════════════════
// Trigger ordering
// ═══════════════════════════════════════════════════════════════

fn appender(ctx: &mut waggle::BuildCtx, tag: &'static str) -> waggle::BeeRef {
    ctx.triggerable(move |inst| {
        let mut log = inst.get("log")?;
        if let Some(entries) = log.as_array_mut() {
            entries.push(json!(tag));
        }
        inst.set("log", log)
    })
}

#[test]
fn pre_edges_complete_before_any_normal_edge() {
    init_tracing();
    let class = HiveClass::new("ordered").builder("build", |ctx| {
        let log = ctx.attribute(Identifier::untyped(), json!([]));
        ctx.external("log", log)?;

        let src = ctx.trigger_func(|_| Ok(()));
        let n1 = appender(ctx, "n1");
        let p1 = appender(ctx, "p1");
        let n2 = appender(ctx, "n2");
        let p2 = appender(ctx, "p2");

        // Interleaved declarations; pre edges must still all run first
        ctx.trigger(src, n1)?;
        ctx.pretrigger(src, p1)?;
        ctx.trigger(src, n2)?;
        ctx.pretrigger(src, p2)?;

        let entry = ctx.entry(src)?;
        ctx.external("go", entry)
    });

    let inst = class.instantiate(CallArgs::new()).unwrap();
    inst.fire("go").unwrap();
    assert_eq!(inst.get("log").unwrap(), json!(["p1", "p2", "n1", "n2"]));
}

#[test]
fn triggers_cross_into_a_nested_hive() {
    init_tracing();
    let inner = HiveClass::new("inner").builder("build", |ctx| {
        let log = ctx.attribute(Identifier::untyped(), json!([]));
        ctx.external("log", log)?;
        let noisy = appender(ctx, "inner_ran");
        let entry = ctx.entry(noisy)?;
        ctx.external("go", entry)
    });

    let outer = HiveClass::new("outer").builder("build", move |ctx| {
        let nested = ctx.hive(&inner, CallArgs::new())?;
        ctx.external("kid", nested)?;
        let src = ctx.trigger_func(|_| Ok(()));
        // Implicit wire: the child has exactly one external trigger target
        ctx.trigger(src, nested)?;
        let entry = ctx.entry(src)?;
        ctx.external("go", entry)
    });

    let inst = outer.instantiate(CallArgs::new()).unwrap();
    inst.fire("go").unwrap();
    let kid = inst.child("kid").unwrap();
    assert_eq!(kid.get("log").unwrap(), json!(["inner_ran"]));
}

#[test]
fn push_escapes_a_nested_hive_through_its_output() {
    init_tracing();
    let producer = HiveClass::new("producer").builder("build", |ctx| {
        let store = ctx.attribute(Identifier::untyped(), json!(0));
        let po = ctx.push_out(store)?;
        let out = ctx.output(po)?;
        ctx.external("out", out)
    });

    let parent = HiveClass::new("consumer").builder("build", move |ctx| {
        let nested = ctx.hive(&producer, CallArgs::new())?;
        ctx.external("kid", nested)?;
        let dst_store = ctx.attribute(Identifier::untyped(), json!(0));
        let dst = ctx.push_in(dst_store)?;
        ctx.external("dst", dst)?;
        // Implicit wire: the child's one connect source is the output
        ctx.connect(nested, dst)
    });

    let inst = parent.instantiate(CallArgs::new()).unwrap();
    let kid = inst.child("kid").unwrap();
    assert_eq!(inst.get("dst").unwrap(), json!(0));

    // Writing the child's output pushes across the nesting boundary
    kid.set("out", json!(7)).unwrap();
    assert_eq!(inst.get("dst").unwrap(), json!(7));
    assert_eq!(kid.get("out").unwrap(), json!(7));
}

#[test]
fn pull_crosses_into_a_nested_hive_through_its_antenna() {
    init_tracing();
    let reader = HiveClass::new("reader").builder("build", |ctx| {
        let store = ctx.attribute(Identifier::untyped(), json!(null));
        let pull = ctx.pull_in(store)?;
        let inp = ctx.antenna(pull)?;
        ctx.external("inp", inp)
    });

    let parent = HiveClass::new("holder").builder("build", move |ctx| {
        let src = ctx.attribute(Identifier::untyped(), json!("fresh"));
        ctx.external("src", src)?;
        let upstream = ctx.pull_out(src)?;
        let nested = ctx.hive(&reader, CallArgs::new())?;
        ctx.external("kid", nested)?;
        ctx.connect(upstream, nested)
    });

    let inst = parent.instantiate(CallArgs::new()).unwrap();
    let kid = inst.child("kid").unwrap();

    // Lazy read follows the edge up into the parent's source slot
    assert_eq!(kid.get("inp").unwrap(), json!("fresh"));
    inst.set("src", json!("rewritten")).unwrap();
    assert_eq!(kid.get("inp").unwrap(), json!("rewritten"));
}

#[test]
fn push_climbs_two_levels_of_output_re_export() {
    init_tracing();
    let leaf = HiveClass::new("deep_producer").builder("build", |ctx| {
        let store = ctx.attribute(Identifier::untyped(), json!(0));
        let po = ctx.push_out(store)?;
        let out = ctx.output(po)?;
        ctx.external("out", out)
    });

    let middle = HiveClass::new("relay").builder("build", move |ctx| {
        let nested = ctx.hive(&leaf, CallArgs::new())?;
        ctx.external("leaf", nested)?;
        let relay = ctx.output(nested)?;
        ctx.external("up", relay)
    });

    let root = HiveClass::new("sink").builder("build", move |ctx| {
        let nested = ctx.hive(&middle, CallArgs::new())?;
        ctx.external("mid", nested)?;
        let dst_store = ctx.attribute(Identifier::untyped(), json!(0));
        let dst = ctx.push_in(dst_store)?;
        ctx.external("dst", dst)?;
        ctx.connect(nested, dst)
    });

    let inst = root.instantiate(CallArgs::new()).unwrap();
    let grandkid = inst.child("mid").unwrap().child("leaf").unwrap();

    grandkid.set("out", json!(99)).unwrap();
    assert_eq!(inst.get("dst").unwrap(), json!(99));
}

// ═══════════════════════════════════════════════════════════════
// Wiring diagnostics
// ═══════════════════════════════════════════════════════════════

#[test]
fn implicit_wire_needs_exactly_one_candidate() {
    init_tracing();
    let silent = HiveClass::new("silent").builder("build", |ctx| {
        let attr = ctx.attribute(Identifier::untyped(), json!(0));
        ctx.external("value", attr)
    });

    let parent = HiveClass::new("impatient").builder("build", move |ctx| {
        let nested = ctx.hive(&silent, CallArgs::new())?;
        let src = ctx.trigger_func(|_| Ok(()));
        // The child exports no trigger target at all
        ctx.trigger(src, nested)
    });

    let err = parent.compile(CallArgs::new()).unwrap_err();
    match err {
        HiveError::Builder { source, .. } => {
            assert!(matches!(
                *source,
                HiveError::AmbiguousWire { candidates: 0, .. }
            ));
        }
        other => panic!("expected Builder, got {other:?}"),
    }
}
