//! Integration Tests for Graph Evaluation
//!
//! These tests build graphs through the public API and verify closure,
//! memoized evaluation, invalidation, hooks, views and sub-graphs together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trellis_core::{
    ClosureError, DType, DataDescriptor, Graph, GraphConfig, GraphError, GraphState, HookStage,
    MissingInputPolicy, NodeId, NodeSpec, TypePolicy,
};

/// A single-input node that copies its input and counts invocations.
fn relay(graph: &mut Graph, name: &str, counter: &Arc<AtomicUsize>) -> NodeId {
    let counter = counter.clone();
    graph
        .add_node(
            NodeSpec::new()
                .name(name)
                .input("x")
                .output("result")
                .type_policy(TypePolicy::PassThrough)
                .transform(move |args, out| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    out.output(0)?.copy_from_slice(args.input(0));
                    Ok(())
                }),
        )
        .unwrap()
}

/// A growing sum node that counts invocations.
fn counted_sum(graph: &mut Graph, name: &str, counter: &Arc<AtomicUsize>) -> NodeId {
    let counter = counter.clone();
    graph
        .add_node(
            NodeSpec::new()
                .name(name)
                .output("result")
                .type_policy(TypePolicy::IdenticalShape)
                .input_policy(MissingInputPolicy::AddOne)
                .transform(move |args, out| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let buffer = out.output(0)?;
                    buffer.fill(0.0);
                    for input in args.iter() {
                        for (acc, v) in buffer.iter_mut().zip(input) {
                            *acc += v;
                        }
                    }
                    Ok(())
                }),
        )
        .unwrap()
}

struct Diamond {
    graph: Graph,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    d: NodeId,
    calls_b: Arc<AtomicUsize>,
    calls_c: Arc<AtomicUsize>,
    calls_d: Arc<AtomicUsize>,
}

/// A -> B, A -> C, (B, C) -> D.
fn diamond() -> Diamond {
    let mut graph = Graph::new();
    let calls_b = Arc::new(AtomicUsize::new(0));
    let calls_c = Arc::new(AtomicUsize::new(0));
    let calls_d = Arc::new(AtomicUsize::new(0));

    let a = graph.add_array("a", &[1.0, 2.0, 3.0]).unwrap();
    let b = relay(&mut graph, "b", &calls_b);
    let c = relay(&mut graph, "c", &calls_c);
    let d = counted_sum(&mut graph, "d", &calls_d);
    graph.connect(a, b).unwrap();
    graph.connect(a, c).unwrap();
    graph.connect_many([b, c], d).unwrap();
    graph.close().unwrap();

    Diamond {
        graph,
        a,
        b,
        c,
        d,
        calls_b,
        calls_c,
        calls_d,
    }
}

/// Test the documented end-to-end example: a three-way sum times a fourth
/// source.
#[test]
fn sum_then_product_end_to_end() {
    let mut graph = Graph::new();
    let sources: Vec<NodeId> = (1..=4)
        .map(|i| graph.add_array(format!("n{i}"), &[0.0, 1.0, 2.0]).unwrap())
        .collect();

    let sum = graph.add_kind("sum", Some("sum")).unwrap();
    graph.connect_many(sources[..3].iter().copied(), sum).unwrap();
    let product = graph.add_kind("product", Some("product")).unwrap();
    graph.connect(sum, product).unwrap();
    graph.connect(sources[3], product).unwrap();

    graph.close().unwrap();
    assert_eq!(graph.state(), GraphState::Closed);
    assert_eq!(graph.read_node(product).unwrap(), &[0.0, 3.0, 12.0]);
}

/// Test that shared ancestors of a diamond evaluate once per pass.
#[test]
fn diamond_evaluates_shared_ancestor_once() {
    let mut dia = diamond();

    assert_eq!(dia.graph.read_node(dia.d).unwrap(), &[2.0, 4.0, 6.0]);
    assert_eq!(dia.graph.node(dia.a).unwrap().call_count(), 1);
    assert_eq!(dia.calls_b.load(Ordering::SeqCst), 1);
    assert_eq!(dia.calls_c.load(Ordering::SeqCst), 1);
    assert_eq!(dia.calls_d.load(Ordering::SeqCst), 1);
}

/// Test that repeated clean reads never re-run a transform.
#[test]
fn clean_reads_are_cached() {
    let mut dia = diamond();
    for _ in 0..5 {
        dia.graph.read_node(dia.d).unwrap();
    }
    assert_eq!(dia.calls_d.load(Ordering::SeqCst), 1);
    assert_eq!(dia.graph.node(dia.d).unwrap().call_count(), 1);
}

/// Test that pushing into the source re-runs each downstream node exactly
/// once.
#[test]
fn push_invalidates_every_descendant_once() {
    let mut dia = diamond();
    dia.graph.read_node(dia.d).unwrap();

    dia.graph.push(dia.a, &[10.0, 20.0, 30.0]).unwrap();
    for node in [dia.a, dia.b, dia.c, dia.d] {
        assert!(dia.graph.node(node).unwrap().is_tainted());
    }

    assert_eq!(dia.graph.read_node(dia.d).unwrap(), &[20.0, 40.0, 60.0]);
    assert_eq!(dia.calls_b.load(Ordering::SeqCst), 2);
    assert_eq!(dia.calls_c.load(Ordering::SeqCst), 2);
    assert_eq!(dia.calls_d.load(Ordering::SeqCst), 2);
    assert_eq!(dia.graph.node(dia.a).unwrap().call_count(), 2);
}

/// Test that reading an intermediate node leaves unrelated branches tainted.
#[test]
fn partial_read_only_cleans_ancestors() {
    let mut dia = diamond();
    dia.graph.read_node(dia.b).unwrap();

    assert!(!dia.graph.node(dia.b).unwrap().is_tainted());
    assert!(dia.graph.node(dia.c).unwrap().is_tainted());
    assert!(dia.graph.node(dia.d).unwrap().is_tainted());
    assert_eq!(dia.calls_c.load(Ordering::SeqCst), 0);
}

/// Test that explicit taint of a middle node leaves its parent clean.
#[test]
fn explicit_taint_propagates_downstream_only() {
    let mut dia = diamond();
    dia.graph.read_node(dia.d).unwrap();

    dia.graph.taint(dia.b).unwrap();
    assert!(!dia.graph.node(dia.a).unwrap().is_tainted());
    assert!(!dia.graph.node(dia.c).unwrap().is_tainted());
    assert!(dia.graph.node(dia.d).unwrap().is_tainted());

    dia.graph.read_node(dia.d).unwrap();
    assert_eq!(dia.calls_b.load(Ordering::SeqCst), 2);
    assert_eq!(dia.calls_c.load(Ordering::SeqCst), 1);
    assert_eq!(dia.calls_d.load(Ordering::SeqCst), 2);
}

/// Test arity handling: a growing node accepts every producer in order, a
/// fixed-arity node refuses the extra one.
#[test]
fn arity_policies() {
    let mut graph = Graph::new();
    let producers: Vec<NodeId> = ["p", "q", "r", "s"]
        .iter()
        .map(|name| graph.add_array(*name, &[1.0]).unwrap())
        .collect();

    let growing = graph.add_kind("sum", None).unwrap();
    let bound = graph
        .connect_many(producers[..3].iter().copied(), growing)
        .unwrap();
    let parents: Vec<_> = bound
        .iter()
        .map(|input| {
            let output = graph.input_port(*input).unwrap().parent().unwrap();
            graph.output_port(output).unwrap().node()
        })
        .collect();
    assert_eq!(parents, producers[..3].to_vec());

    let fixed = graph
        .add_node(NodeSpec::new().inputs(["x", "y", "z"]).output("result"))
        .unwrap();
    graph
        .connect_many(producers[..3].iter().copied(), fixed)
        .unwrap();
    let err = graph.connect(producers[3], fixed).unwrap_err();
    assert!(matches!(err, GraphError::Connection { .. }));
    assert!(err.is_recoverable());
    assert_eq!(graph.state(), GraphState::Open);
}

/// Test that a length-3 output bound next to a length-4 sibling fails
/// closure and leaves the graph open.
#[test]
fn shape_mismatch_fails_close() {
    let mut graph = Graph::new();
    let long = graph.add_array("long", &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let short = graph.add_array("short", &[1.0, 2.0, 3.0]).unwrap();
    let sum = graph.add_kind("sum", Some("sum")).unwrap();
    graph.connect(long, sum).unwrap();
    graph.connect(short, sum).unwrap();

    match graph.close().unwrap_err() {
        GraphError::TypeCheck {
            node,
            port,
            expected,
            actual,
        } => {
            assert_eq!(node, "sum");
            assert_eq!(port, "input_1");
            assert_eq!(expected, "float64[4]");
            assert_eq!(actual, "float64[3]");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(graph.state(), GraphState::Open);
    assert!(matches!(graph.read_node(sum), Err(GraphError::NotClosed { .. })));
}

/// Test that broadcasting nodes combine shapes at closure.
#[test]
fn broadcast_policy_derives_combined_shape() {
    let mut graph = Graph::new();
    let column = graph
        .add_source(
            "column",
            DataDescriptor::new(DType::Float64, [3, 1]),
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();
    let row = graph.add_array("row", &[10.0, 20.0]).unwrap();
    let outer = graph
        .add_node(
            NodeSpec::new()
                .inputs(["lhs", "rhs"])
                .output("result")
                .type_policy(TypePolicy::Broadcast),
        )
        .unwrap();
    graph.connect(column, outer).unwrap();
    graph.connect(row, outer).unwrap();
    graph.close().unwrap();

    let out = graph.output(outer, "result").unwrap();
    assert_eq!(
        graph.descriptor(out).unwrap().map(|dd| dd.shape.to_vec()),
        Some(vec![3, 2])
    );
    assert_eq!(graph.read(out).unwrap().len(), 6);
}

/// Test that a cyclic topology is rejected at closure and nothing else.
#[test]
fn cycles_fail_close_with_closure_error() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let x = graph.add_kind("sum", Some("x")).unwrap();
    let y = graph.add_kind("sum", Some("y")).unwrap();
    graph.connect(a, x).unwrap();
    graph.connect(x, y).unwrap();
    graph.connect(y, x).unwrap();

    let err = graph.close().unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err, GraphError::Closure(ClosureError::Cycle { .. })));
    assert_eq!(graph.state(), GraphState::Open);
}

/// Test that a closed graph refuses structural changes.
#[test]
fn closed_graph_rejects_changes() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let sum = graph.add_kind("sum", None).unwrap();
    graph.connect(a, sum).unwrap();
    graph.close().unwrap();

    assert!(matches!(graph.connect(a, sum), Err(GraphError::GraphClosed { .. })));
    assert!(matches!(
        graph.add_array("late", &[1.0]),
        Err(GraphError::GraphClosed { .. })
    ));
    assert!(matches!(graph.close(), Err(GraphError::GraphClosed { .. })));
}

/// Test that connect hooks fire producer first and a veto undoes the link.
#[test]
fn connect_hooks_order_and_veto() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let sum = graph.add_kind("sum", Some("sum")).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    for node in [a, sum] {
        let log = log.clone();
        graph.hooks_mut().on_connect(node, move |event| {
            log.lock().unwrap().push(format!("{}:{:?}", event.node_name, event.role));
            Ok(())
        });
    }
    graph.connect(a, sum).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:Producer".to_string(), "sum:Consumer".to_string()]
    );

    let guarded = graph.add_kind("sum", Some("guarded")).unwrap();
    graph
        .hooks_mut()
        .on_connect(guarded, |_| Err("guarded accepts nothing".into()));
    let err = graph.connect(a, guarded).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Hook { ref node, stage: HookStage::OnConnect, .. } if node == "guarded"
    ));
    assert_eq!(graph.node(guarded).unwrap().input_count(), 0);
}

/// Test that a pre-eval rejection aborts the read without running the
/// transform, and post-eval hooks see fresh outputs.
#[test]
fn eval_hooks_guard_and_observe() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
    let b = relay(&mut graph, "b", &calls);
    graph.connect(a, b).unwrap();

    let armed = Arc::new(AtomicUsize::new(1));
    let gate = armed.clone();
    graph.hooks_mut().pre_eval(b, move |_| {
        if gate.load(Ordering::SeqCst) > 0 {
            Err("not ready".into())
        } else {
            Ok(())
        }
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    graph.hooks_mut().post_eval(b, move |event| {
        let values = event.outputs.get(0).unwrap_or_default();
        sink.lock().unwrap().extend_from_slice(values);
        Ok(())
    });
    graph.close().unwrap();

    let err = graph.read_node(b).unwrap_err();
    assert!(matches!(err, GraphError::Hook { stage: HookStage::PreEval, .. }));
    assert!(err.is_recoverable());
    assert!(graph.node(b).unwrap().is_tainted());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    armed.store(0, Ordering::SeqCst);
    assert_eq!(graph.read_node(b).unwrap(), &[1.0, 2.0]);
    assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0]);
}

/// Test that hooks run in registration order, pre-eval before the transform
/// and post-eval after it.
#[test]
fn eval_hooks_run_in_stage_and_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let trace = log.clone();
    let b = graph
        .add_node(
            NodeSpec::new()
                .name("b")
                .input("x")
                .output("result")
                .transform(move |args, out| {
                    trace.lock().unwrap().push("transform");
                    out.output(0)?.copy_from_slice(args.input(0));
                    Ok(())
                }),
        )
        .unwrap();
    graph.connect(a, b).unwrap();

    for label in ["pre 1", "pre 2"] {
        let log = log.clone();
        graph.hooks_mut().pre_eval(b, move |_| {
            log.lock().unwrap().push(label);
            Ok(())
        });
    }
    for label in ["post 1", "post 2"] {
        let log = log.clone();
        graph.hooks_mut().post_eval(b, move |_| {
            log.lock().unwrap().push(label);
            Ok(())
        });
    }
    graph.close().unwrap();

    graph.read_node(b).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["pre 1", "pre 2", "transform", "post 1", "post 2"]
    );
}

/// Test that owned buffers are allocated once at closure and rewritten in
/// place on every later evaluation.
#[test]
fn buffers_are_reused_across_evaluations() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0, 3.0]).unwrap();
    let b = relay(&mut graph, "b", &calls);
    graph.connect(a, b).unwrap();
    graph.close().unwrap();
    let buffers = graph.buffer_count();

    let (ptr, len) = {
        let data = graph.read_node(b).unwrap();
        (data.as_ptr(), data.len())
    };
    for round in 1..=3 {
        let value = round as f64;
        graph.push(a, &[value, value, value]).unwrap();
        let data = graph.read_node(b).unwrap();
        assert_eq!(data, &[value, value, value]);
        assert_eq!(data.as_ptr(), ptr);
        assert_eq!(data.len(), len);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(graph.buffer_count(), buffers);
}

/// Test that a view keeps pointing at its parent's storage across
/// re-evaluation.
#[test]
fn view_storage_is_stable_across_pushes() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
    let view = graph.add_kind("view", Some("view")).unwrap();
    graph.connect(a, view).unwrap();
    graph.close().unwrap();

    let source_ptr = graph.read_node(a).unwrap().as_ptr();
    let (ptr, len) = {
        let data = graph.read_node(view).unwrap();
        (data.as_ptr(), data.len())
    };
    assert_eq!(ptr, source_ptr);

    graph.push(a, &[7.0, 8.0]).unwrap();
    let data = graph.read_node(view).unwrap();
    assert_eq!(data, &[7.0, 8.0]);
    assert_eq!(data.as_ptr(), ptr);
    assert_eq!(data.len(), len);
}

/// Test that a parent's oversized allocation is hidden from the built-in
/// kinds, which only see the descriptor's elements.
#[test]
fn padded_parent_feeds_builtin_kinds() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
    let padded = graph
        .add_node(
            NodeSpec::new()
                .name("padded")
                .input("x")
                .output("result")
                .size_fn(|dd| dd.size() * 2)
                .transform(|args, out| {
                    let buffer = out.output(0)?;
                    let (head, tail) = buffer.split_at_mut(args.input(0).len());
                    head.copy_from_slice(args.input(0));
                    tail.fill(-1.0);
                    Ok(())
                }),
        )
        .unwrap();
    graph.connect(a, padded).unwrap();

    let sum = graph.add_kind("sum", Some("sum")).unwrap();
    graph.connect_many([padded, a], sum).unwrap();
    let copy = graph.add_kind("copy", Some("copy")).unwrap();
    graph.connect(padded, copy).unwrap();
    graph.close().unwrap();

    assert_eq!(graph.read_node(padded).unwrap(), &[1.0, 2.0, -1.0, -1.0]);
    assert_eq!(graph.read_node(sum).unwrap(), &[2.0, 4.0]);
    assert_eq!(graph.read_node(copy).unwrap(), &[1.0, 2.0]);
}

/// Test that a view output shares its parent's buffer instead of copying.
#[test]
fn view_aliases_parent_buffer() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0, 3.0]).unwrap();
    let view = graph.add_kind("view", Some("view")).unwrap();
    graph.connect(a, view).unwrap();
    graph.close().unwrap();

    let source_out = graph.output(a, "result").unwrap();
    let view_out = graph.output(view, "result").unwrap();
    assert_eq!(
        graph.output_port(source_out).unwrap().buffer(),
        graph.output_port(view_out).unwrap().buffer()
    );
    assert!(graph.output_port(view_out).unwrap().is_view());
    assert_eq!(graph.buffer_count(), 1);

    assert_eq!(graph.read(view_out).unwrap(), &[1.0, 2.0, 3.0]);
    graph.push(a, &[4.0, 5.0, 6.0]).unwrap();
    assert_eq!(graph.read(view_out).unwrap(), &[4.0, 5.0, 6.0]);
}

/// Test the paired-output kind and scalar reduction together.
#[test]
fn copy_and_total_kinds() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
    let b = graph.add_array("b", &[3.0, 4.0, 5.0]).unwrap();
    let copy = graph.add_kind("copy", Some("copy")).unwrap();
    graph.connect(a, copy).unwrap();
    graph.connect(b, copy).unwrap();
    let total = graph.add_kind("total", Some("total")).unwrap();
    graph.connect(copy, total).unwrap();
    graph.connect(copy, total).unwrap();
    graph.close().unwrap();

    let second = graph.output_at(copy, 1).unwrap();
    assert_eq!(graph.read(second).unwrap(), &[3.0, 4.0, 5.0]);
    assert_eq!(graph.read_node(total).unwrap(), &[15.0]);
}

/// Test that a transform failure is fatal, keeps its source and leaves the
/// rest of the pass intact.
#[test]
fn evaluation_failure_keeps_source_error() {
    #[derive(Debug)]
    struct Overflow;
    impl std::fmt::Display for Overflow {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "overflow")
        }
    }
    impl std::error::Error for Overflow {}

    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let bad = graph
        .add_node(
            NodeSpec::new()
                .name("bad")
                .input("x")
                .output("result")
                .transform(|_, _| Err(Overflow.into())),
        )
        .unwrap();
    graph.connect(a, bad).unwrap();
    graph.close().unwrap();

    let err = graph.read_node(bad).unwrap_err();
    assert_eq!(err.node(), Some("bad"));
    assert!(!err.is_recoverable());
    let source = err.into_source().unwrap();
    assert!(source.downcast_ref::<Overflow>().is_some());
    assert_eq!(graph.state(), GraphState::Closed);
    assert!(!graph.node(a).unwrap().is_tainted());
}

/// Test that closing a sub-graph closes nested and shared groups once and
/// leaves everything else open.
#[test]
fn subgraphs_close_depth_first_once() {
    let mut graph = Graph::new();
    let a = graph.add_array("a", &[1.0]).unwrap();
    let b = graph.add_kind("sum", Some("b")).unwrap();
    let c = graph.add_kind("sum", Some("c")).unwrap();
    let outside = graph.add_kind("sum", Some("outside")).unwrap();
    graph.connect(a, b).unwrap();
    graph.connect(b, c).unwrap();
    graph.connect(a, outside).unwrap();

    let shared = graph.add_subgraph("shared");
    let left = graph.add_subgraph("left");
    let right = graph.add_subgraph("right");
    let top = graph.add_subgraph("top");
    graph.add_to_subgraph(shared, b).unwrap();
    graph.add_to_subgraph(right, c).unwrap();
    graph.nest_subgraph(left, shared).unwrap();
    graph.nest_subgraph(right, shared).unwrap();
    graph.nest_subgraph(top, left).unwrap();
    graph.nest_subgraph(top, right).unwrap();
    assert!(graph.nest_subgraph(shared, top).is_err());

    graph.close_subgraph(top).unwrap();
    for sg in [shared, left, right, top] {
        assert!(graph.subgraph(sg).unwrap().is_closed());
    }
    assert!(graph.node(a).unwrap().is_closed(), "ancestors close with members");
    assert!(graph.node(c).unwrap().is_closed());
    assert!(!graph.node(outside).unwrap().is_closed());
    assert_eq!(graph.state(), GraphState::Open);

    assert_eq!(graph.read_node(c).unwrap(), &[1.0]);
    graph.close_subgraph(top).unwrap();
    assert!(matches!(graph.connect(a, c), Err(GraphError::GraphClosed { .. })));

    graph.close().unwrap();
    assert!(graph.node(outside).unwrap().is_closed());
    assert_eq!(graph.read_node(c).unwrap(), &[1.0]);
}

/// Test that the snapshot reflects aliasing, taint state and call counts.
#[test]
fn snapshot_exports_graph_state() {
    let mut graph = Graph::with_config(GraphConfig::default().with_name("pipeline"));
    let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
    let view = graph.add_kind("view", Some("view")).unwrap();
    graph.connect(a, view).unwrap();
    graph.close().unwrap();
    graph.read_node(view).unwrap();

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.name, "pipeline");
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!(snapshot.nodes[0].calls, 1);
    assert_eq!(snapshot.nodes[0].outputs[0].buffer, snapshot.nodes[1].outputs[0].buffer);

    let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(value["nodes"][1]["kind"], "view");
    assert_eq!(value["nodes"][1]["state"], "clean");
    assert_eq!(value["nodes"][1]["invalid"], false);
    assert_eq!(value["edges"][0]["input"], "input");
}

/// Test that the configured default policy and naming apply to new nodes.
#[test]
fn config_drives_default_policy() {
    let config = GraphConfig::from_json(
        r#"{ "name": "cfg", "default_input_policy": "add_one", "input_prefix": "in" }"#,
    )
    .unwrap();
    let mut graph = Graph::with_config(config);
    let a = graph.add_array("a", &[1.0]).unwrap();
    let node = graph.add_node(NodeSpec::new().output("result")).unwrap();
    graph.connect(a, node).unwrap();
    graph.connect(a, node).unwrap();

    let keys: Vec<_> = graph.node(node).unwrap().inputs().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, vec!["in_0", "in_1"]);
    assert_eq!(graph.name(), "cfg");
}
