use serde_json::json;
use ugenflow::ugen::{GenContext, UGenOutput};
use ugenflow::{
    AudioSettings, Environment, Error, PathPolicy, PathValue, Rate, Registry, Synth, SynthOptions,
    UGenDefaults, UGenGraph, UnitGen,
};

/// Holds its output at zero
struct Silence;

impl UnitGen for Silence {
    fn gen(&mut self, _ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        for s in out.first_mut().iter_mut().take(num_samps) {
            *s = 0.0;
        }
        out.value = 0.0;
    }
}

fn env() -> Environment {
    let mut registry = Registry::with_builtins();
    registry.register("pulse", UGenDefaults::new(Rate::Audio), |_| Ok(Box::new(Silence)));
    Environment::with_registry(
        AudioSettings {
            block_size: 16,
            chans: 1,
            ..AudioSettings::default()
        },
        registry,
    )
}

fn assert_topological(graph: &UGenGraph) {
    let list = graph.list();
    for (id, slot) in graph.nodes() {
        let idx = list.index_of(id).unwrap();
        for input in slot.inputs.node_ids() {
            let input_idx = list.index_of(input).expect("input missing from list");
            assert!(input_idx < idx, "{} feeds {} from a later index", input_idx, idx);
        }
    }
    assert_eq!(graph.arena().len(), graph.len(), "arena and list disagree");
}

fn index_of(synth: &Synth, name: &str) -> Option<usize> {
    let graph = synth.graph();
    graph.named(name).and_then(|id| graph.list().index_of(id))
}

#[test]
fn test_replace_input_subtree() {
    let mut env = env();
    let id = env
        .add_synth(
            &json!({ "id": "osc", "ugen": "sin", "freq": { "id": "lfo", "ugen": "sin", "freq": 2 } }),
            SynthOptions::default(),
        )
        .unwrap();
    let synth = env.synth_mut(id).unwrap();

    synth
        .set("osc.freq", json!({ "id": "ramp", "ugen": "line", "start": 100, "end": 200 }))
        .unwrap();

    assert!(synth.graph().named("lfo").is_none());
    assert!(synth.graph().named("ramp").is_some());
    assert!(index_of(synth, "ramp") < index_of(synth, "osc"));
    assert_topological(synth.graph());
}

#[test]
fn test_swap_keeps_reattached_input_in_place() {
    let mut env = env();
    let id = env
        .add_synth(
            &json!({
                "id": "osc", "ugen": "sin",
                "freq": { "id": "mod", "ugen": "sin", "freq": 3 },
                "phase": { "id": "ph", "ugen": "line" }
            }),
            SynthOptions::default(),
        )
        .unwrap();
    let synth = env.synth_mut(id).unwrap();
    let modulator = synth.graph().named("mod").unwrap();
    let mod_idx = index_of(synth, "mod");
    let phase_idx = index_of(synth, "ph");

    synth
        .swap(
            "osc",
            &json!({
                "id": "osc", "ugen": "pulse",
                "freq": 99,
                "width": { "id": "w", "ugen": "line" }
            }),
            Some(&["freq"]),
        )
        .unwrap();

    let graph = synth.graph();
    assert_eq!(graph.named("mod"), Some(modulator));
    assert_eq!(index_of(synth, "mod"), mod_idx);
    assert!(graph.named("ph").is_none());
    assert_eq!(index_of(synth, "w"), phase_idx);

    let osc = graph.named("osc").unwrap();
    assert_eq!(graph.slot(osc).unwrap().type_name, "pulse");
    assert_eq!(synth.get("osc.freq").unwrap(), Some(PathValue::Node(modulator)));
    assert_topological(graph);
}

#[test]
fn test_swap_without_reattach_inherits_everything() {
    let mut env = env();
    let id = env
        .add_synth(
            &json!({
                "id": "osc", "ugen": "sin",
                "freq": { "id": "mod", "ugen": "sin", "freq": 3, "mul": 10, "add": 400 }
            }),
            SynthOptions::default(),
        )
        .unwrap();
    let synth = env.synth_mut(id).unwrap();
    let before = synth.graph().len();

    synth
        .swap("osc", &json!({ "id": "osc", "ugen": "lfSaw", "freq": 10 }), None)
        .unwrap();

    assert_eq!(synth.graph().len(), before);
    assert!(synth.graph().named("mod").is_some());
    assert_eq!(synth.get_value("osc.freq.freq").unwrap(), Some(3.0));
    assert_topological(synth.graph());

    // The swapped node keeps feeding the output
    env.gen();
    assert!(env.bus(0).unwrap().iter().any(|&s| s != 0.0));
}

#[test]
fn test_set_then_render_uses_new_value() {
    let mut env = env();
    let id = env
        .add_synth(
            &json!({ "id": "level", "ugen": "out", "sources": 0.25 }),
            SynthOptions::default(),
        )
        .unwrap();
    env.gen();
    assert!(env.bus(0).unwrap().iter().all(|&s| s == 0.25));

    env.synth_mut(id)
        .unwrap()
        .set("level.sources", json!(0.5))
        .unwrap();
    env.gen();
    assert!(env.bus(0).unwrap().iter().all(|&s| s == 0.5));
}

#[test]
fn test_path_policy() {
    let mut hard = env();
    let id = hard
        .add_synth(&json!({ "id": "osc", "ugen": "sin" }), SynthOptions::default())
        .unwrap();
    assert!(matches!(
        hard.synth_mut(id).unwrap().set("osc.nothing.here", json!(1)),
        Err(Error::PathNotFound(_))
    ));

    let mut soft = Environment::new(AudioSettings {
        path_policy: PathPolicy::Soft,
        ..AudioSettings::default()
    });
    let id = soft
        .add_synth(&json!({ "id": "osc", "ugen": "sin" }), SynthOptions::default())
        .unwrap();
    let synth = soft.synth_mut(id).unwrap();
    synth.set("ghost.freq", json!(1)).unwrap();
    assert_eq!(synth.get_value("ghost.freq").unwrap(), None);
    assert_eq!(synth.get_value("osc.freq").unwrap(), Some(440.0));
}

#[test]
fn test_demand_synth_is_not_clocked() {
    let mut env = env();
    let id = env
        .add_synth(
            &json!({ "id": "seq", "ugen": "sequence", "list": [5, 6, 7] }),
            SynthOptions {
                rate: Some(Rate::Demand),
                ..Default::default()
            },
        )
        .unwrap();

    for _ in 0..4 {
        env.gen();
    }
    let synth = env.synth_mut(id).unwrap();
    assert_eq!(synth.get_value("seq.model.index").unwrap(), Some(0.0));
    assert_eq!(synth.pull(), 5.0);
    assert_eq!(synth.pull(), 6.0);
    assert_eq!(synth.pull(), 7.0);
    assert_eq!(synth.pull(), 5.0);
}

fn eight_hz_env() -> Environment {
    Environment::new(AudioSettings {
        sample_rate: 8.0,
        block_size: 8,
        chans: 1,
        ..AudioSettings::default()
    })
}

/// Audio-rate ramp producing `start + i * (end - start) / 8` for one second at 8 Hz
fn ramp(start: f64, end: f64) -> serde_json::Value {
    json!({ "ugen": "line", "rate": "audio", "start": start, "end": end, "duration": 1 })
}

fn block(env: &mut Environment) -> Vec<f32> {
    env.gen();
    env.bus(0).unwrap().to_vec()
}

#[test]
fn test_mul_add_follows_operand_rates() {
    let source: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let mul_ar: Vec<f32> = (1..=8).map(|i| i as f32).collect();
    let add_ar: Vec<f32> = (0..8).map(|i| i as f32 * 10.0).collect();

    let cases = [
        (json!(2), json!(0.5), vec![2.0; 8], vec![0.5; 8]),
        (ramp(1.0, 9.0), json!(0.5), mul_ar.clone(), vec![0.5; 8]),
        (json!(2), ramp(0.0, 80.0), vec![2.0; 8], add_ar.clone()),
        (ramp(1.0, 9.0), ramp(0.0, 80.0), mul_ar, add_ar),
    ];

    for (mul, add, mul_values, add_values) in cases {
        let mut env = eight_hz_env();
        let mut def = ramp(0.0, 8.0);
        def["mul"] = mul.clone();
        def["add"] = add.clone();
        env.add_synth(&def, SynthOptions::default()).unwrap();

        let expected: Vec<f32> = (0..8)
            .map(|i| source[i] * mul_values[i] + add_values[i])
            .collect();
        assert_eq!(block(&mut env), expected, "mul {} add {}", mul, add);
    }
}

#[test]
fn test_set_switches_mul_add_rate() {
    let mut env = eight_hz_env();
    let id = env
        .add_synth(
            &json!({
                "id": "src", "ugen": "line", "rate": "audio",
                "start": 0, "end": 16, "duration": 2,
                "mul": 2, "add": 0.5
            }),
            SynthOptions::default(),
        )
        .unwrap();

    let expected: Vec<f32> = (0..8).map(|i| i as f32 * 2.0 + 0.5).collect();
    assert_eq!(block(&mut env), expected);

    env.synth_mut(id).unwrap().set("src.mul", ramp(1.0, 9.0)).unwrap();
    let expected: Vec<f32> = (0..8)
        .map(|i| (8 + i) as f32 * (1 + i) as f32 + 0.5)
        .collect();
    assert_eq!(block(&mut env), expected);

    // Source holds at 16 and the mul ramp at 8 from here on
    env.synth_mut(id).unwrap().set("src.add", ramp(0.0, 80.0)).unwrap();
    let expected: Vec<f32> = (0..8).map(|i| 128.0 + i as f32 * 10.0).collect();
    assert_eq!(block(&mut env), expected);

    env.synth_mut(id).unwrap().set("src.mul", json!(3)).unwrap();
    assert_eq!(block(&mut env), vec![16.0 * 3.0 + 80.0; 8]);
}
