use serde_json::{json, Value};
use ugenflow::{
    AudioSettings, Compiled, Compiler, EngineContext, Environment, Error, Rate, SynthOptions,
    UGenGraph,
};

fn settings(block_size: usize, chans: usize) -> AudioSettings {
    AudioSettings {
        block_size,
        chans,
        ..AudioSettings::default()
    }
}

/// Compile a def without an output wrapper and put it in a fresh graph
fn compile_into_graph(ctx: &EngineContext, def: &Value) -> (UGenGraph, ugenflow::NodeId) {
    let mut graph = UGenGraph::new();
    let compiled = Compiler::new(ctx).compile(def, graph.arena_mut()).unwrap();
    let Compiled::One(root) = compiled else {
        panic!("expected a single root");
    };
    graph.insert_tree(0, root);
    (graph, root)
}

fn names(graph: &UGenGraph) -> Vec<String> {
    graph
        .nodes()
        .filter_map(|(_, slot)| slot.name.clone())
        .collect()
}

#[test]
fn test_bare_numbers_become_constant_values() {
    let ctx = EngineContext::new(settings(16, 1));
    for n in [0.0, 0.75, -3.5, 440.0] {
        let (graph, root) = compile_into_graph(&ctx, &json!(n));
        let slot = graph.slot(root).unwrap();
        assert_eq!(slot.type_name, "value");
        assert_eq!(slot.rate, Rate::Constant);
        assert_eq!(slot.model_field("value"), Some(n));
    }
}

#[test]
fn test_audio_synth_is_wrapped_in_expanded_out() {
    let mut env = Environment::new(settings(32, 2));
    let id = env
        .add_synth(&json!({ "ugen": "sin", "freq": 440 }), SynthOptions::default())
        .unwrap();
    env.gen();

    let synth = env.synth(id).unwrap();
    let graph = synth.graph();
    let out = graph.slot(synth.out_node()).unwrap();
    assert_eq!(out.type_name, "out");

    let expand = out.inputs.get("expand").unwrap().node_ids()[0];
    assert_eq!(graph.slot(expand).unwrap().model_field("value"), Some(2.0));
    let bus = out.inputs.get("bus").unwrap().node_ids()[0];
    assert_eq!(graph.slot(bus).unwrap().model_field("value"), Some(0.0));

    let (_, sin) = graph
        .nodes()
        .find(|(_, slot)| slot.type_name == "sin")
        .unwrap();
    let left = env.bus(0).unwrap();
    let right = env.bus(1).unwrap();
    assert_eq!(left, sin.output.first());
    assert_eq!(left, right);
    assert!(left.iter().any(|&s| s != 0.0));
}

#[test]
fn test_nested_def_is_ordered_inputs_first() {
    let ctx = EngineContext::new(settings(8, 1));
    let (graph, _) = compile_into_graph(
        &ctx,
        &json!({
            "id": "a", "ugen": "sum",
            "sources": { "id": "b", "ugen": "sum", "sources": { "id": "c", "ugen": "whiteNoise" } }
        }),
    );
    assert_eq!(names(&graph), vec!["c", "b", "a"]);
    assert_eq!(graph.len(), 3);
}

#[test]
fn test_remove_tree_takes_whole_subtree() {
    let ctx = EngineContext::new(settings(8, 1));
    let (mut graph, root) = compile_into_graph(
        &ctx,
        &json!({
            "id": "a", "ugen": "sum",
            "sources": { "id": "b", "ugen": "sum", "sources": { "id": "c", "ugen": "whiteNoise" } }
        }),
    );
    let before = graph.len();
    graph.remove_tree(root);
    assert_eq!(before - graph.len(), 3);
    assert!(graph.is_empty());
    assert!(graph.named("b").is_none());
}

#[test]
fn test_control_rate_synth_gets_value_out() {
    let mut env = Environment::new(settings(16, 2));
    let id = env
        .add_synth(
            &json!({ "id": "lfo", "ugen": "sin", "rate": "kr", "freq": 5 }),
            SynthOptions::default(),
        )
        .unwrap();
    env.gen();

    let synth = env.synth(id).unwrap();
    let out = synth.graph().slot(synth.out_node()).unwrap();
    assert_eq!(out.type_name, "valueOut");
    assert_eq!(out.rate, Rate::Control);
    assert!(env.output().iter().all(|bus| bus.iter().all(|&s| s == 0.0)));
}

#[test]
fn test_explicit_out_is_not_wrapped() {
    let env = Environment::new(settings(16, 2));
    let synth = env
        .compile_synth(
            &json!({ "id": "main", "ugen": "out", "bus": 1, "sources": { "ugen": "whiteNoise" } }),
            &SynthOptions::default(),
        )
        .unwrap();
    let outs = synth
        .nodes()
        .filter(|(_, slot)| slot.type_name == "out")
        .count();
    assert_eq!(outs, 1);
    assert_eq!(synth.graph().slot(synth.out_node()).unwrap().name.as_deref(), Some("main"));
}

#[test]
fn test_array_def_compiles_each_channel() {
    let ctx = EngineContext::new(settings(8, 2));
    let mut graph = UGenGraph::new();
    let compiled = Compiler::new(&ctx)
        .compile(&json!([0.1, { "ugen": "whiteNoise" }, 0.3]), graph.arena_mut())
        .unwrap();
    assert!(matches!(compiled, Compiled::Many(_)));
    assert_eq!(compiled.ids().len(), 3);
}

#[test]
fn test_rate_aliases() {
    let ctx = EngineContext::new(settings(8, 1));
    for (token, rate) in [
        ("ar", Rate::Audio),
        ("kr", Rate::Control),
        ("dr", Rate::Demand),
        ("audio", Rate::Audio),
    ] {
        let (graph, root) = compile_into_graph(&ctx, &json!({ "ugen": "whiteNoise", "rate": token }));
        assert_eq!(graph.slot(root).unwrap().rate, rate, "token {}", token);
    }
}

#[test]
fn test_structural_errors() {
    let env = Environment::new(settings(8, 1));
    let options = SynthOptions::default();

    assert!(matches!(
        env.compile_synth(&json!({ "ugen": "wobble" }), &options),
        Err(Error::UnknownUGen(name)) if name == "wobble"
    ));
    assert!(matches!(
        env.compile_synth(&json!({ "freq": 3 }), &options),
        Err(Error::MissingUGenType(_))
    ));
    assert!(matches!(
        env.compile_synth(&json!({ "ugen": "sin", "rate": "xr" }), &options),
        Err(Error::UnknownRate(_))
    ));
    assert!(matches!(
        env.compile_synth(&json!({ "ugen": "sin", "freq": { "ugen": "nope" } }), &options),
        Err(Error::UnknownUGen(_))
    ));
}

#[test]
fn test_demand_override_spares_constants() {
    let env = Environment::new(settings(8, 1));
    let synth = env
        .compile_synth(
            &json!({ "ugen": "sequence", "list": [1, 2], "freq": 4 }),
            &SynthOptions {
                rate: Some(Rate::Demand),
                ..Default::default()
            },
        )
        .unwrap();

    for (_, slot) in synth.nodes() {
        if slot.type_name == "value" {
            assert_eq!(slot.rate, Rate::Constant);
        } else {
            assert_eq!(slot.rate, Rate::Demand, "{}", slot.type_name);
        }
    }
    assert!(!synth.is_clocked());
}
