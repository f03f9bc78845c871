//! Synths - named scopes around one compiled output subtree
//!
//! A synth owns its unit generator graph and exposes path-addressed get/set
//! over it. Clocked synths are driven by the environment's block loop;
//! demand-rate synths produce a value each time they are pulled.

use crate::compiler::{Compiler, EngineContext};
use crate::config::PathPolicy;
use crate::error::{Error, Result};
use crate::graph::{PathValue, UGenGraph};
use crate::rate::Rate;
use crate::ugen::{NodeId, UGenSlot};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub struct Synth {
    name: Option<String>,
    rate_override: Option<Rate>,
    graph: UGenGraph,
    out: NodeId,
    ctx: EngineContext,
}

impl Synth {
    /// Compile `def` into a new synth.
    ///
    /// An unclocked `rate` (demand, scheduled) forces every non-constant
    /// node of the synth to that rate. Clocked rates leave each node's own
    /// rate alone.
    pub fn new(def: &Value, ctx: EngineContext, name: Option<String>, rate: Option<Rate>) -> Result<Self> {
        let rate_override = rate.filter(|r| !r.is_clocked());
        let mut graph = UGenGraph::new();
        let out = Compiler::new(&ctx)
            .with_rate_override(rate_override)
            .compile_synth_def(def, graph.arena_mut())?;
        graph.insert_tree(0, out);

        debug!(name = ?name, nodes = graph.len(), "synth compiled");
        Ok(Self {
            name,
            rate_override,
            graph,
            out,
            ctx,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rate of the output node
    pub fn rate(&self) -> Rate {
        self.graph
            .slot(self.out)
            .map_or(Rate::Control, |slot| slot.rate)
    }

    /// Driven by the block clock
    pub fn is_clocked(&self) -> bool {
        self.rate().is_clocked()
    }

    pub fn graph(&self) -> &UGenGraph {
        &self.graph
    }

    pub fn out_node(&self) -> NodeId {
        self.out
    }

    /// Instances in evaluation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &UGenSlot)> {
        self.graph.nodes()
    }

    /// Current value of the output node
    pub fn value(&self) -> f32 {
        self.graph.slot(self.out).map_or(0.0, |slot| slot.output.value)
    }

    /// Apply the path policy to a lookup failure
    fn soften<T>(&self, result: Result<T>, path: &str) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(Error::PathNotFound(_)) if self.ctx.settings.path_policy == PathPolicy::Soft => {
                warn!(path, synth = ?self.name, "path not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, path: &str) -> Result<Option<PathValue>> {
        self.soften(self.graph.get(path), path)
    }

    /// Scalar at `path`: a node's current value, a model field or a number
    pub fn get_value(&self, path: &str) -> Result<Option<f64>> {
        Ok(self.soften(self.graph.get_value(path), path)?.flatten())
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let compiler = Compiler::new(&self.ctx).with_rate_override(self.rate_override);
        let result = self.graph.set(path, &value, &compiler);
        self.refresh_out();
        self.soften(result, path).map(|_| ())
    }

    /// Apply several assignments in order
    pub fn set_many(&mut self, values: &Map<String, Value>) -> Result<()> {
        for (path, value) in values {
            self.set(path, value.clone())?;
        }
        Ok(())
    }

    /// Swap the node at `path` for a new one, keeping the inputs named in
    /// `reattach` (all of its inputs when `None`)
    pub fn swap(&mut self, path: &str, def: &Value, reattach: Option<&[&str]>) -> Result<()> {
        let compiler = Compiler::new(&self.ctx).with_rate_override(self.rate_override);
        let result = self.graph.swap(path, def, reattach, &compiler);
        if let Ok(new) = &result {
            debug!(path, node = ?new, "swapped node");
        }
        self.refresh_out();
        self.soften(result, path).map(|_| ())
    }

    /// The root always sits at the tail of the list
    fn refresh_out(&mut self) {
        if self.graph.slot(self.out).is_none() {
            if let Some(&last) = self.graph.list().nodes().last() {
                self.out = last;
            }
        }
    }

    /// Generate one block of the clocked nodes
    pub fn gen(&mut self, buses: &mut [Vec<f32>]) {
        let EngineContext {
            settings, buffers, ..
        } = &self.ctx;
        self.graph.gen(buses, buffers, settings, true);
    }

    /// Produce one sample from every node and return the output value
    pub fn pull(&mut self) -> f32 {
        let EngineContext {
            settings, buffers, ..
        } = &self.ctx;
        self.graph.gen(&mut [], buffers, settings, false);
        self.value()
    }
}

impl std::fmt::Debug for Synth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synth")
            .field("name", &self.name)
            .field("rate", &self.rate())
            .field("nodes", &self.graph.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioSettings;
    use serde_json::json;

    fn context(policy: PathPolicy) -> EngineContext {
        EngineContext::new(AudioSettings {
            block_size: 8,
            chans: 1,
            path_policy: policy,
            ..AudioSettings::default()
        })
    }

    #[test]
    fn test_hard_policy_errors_on_missing_path() {
        let mut synth = Synth::new(
            &json!({ "id": "osc", "ugen": "sin" }),
            context(PathPolicy::Hard),
            None,
            None,
        )
        .unwrap();
        assert!(matches!(synth.get("osc.width"), Err(Error::PathNotFound(_))));
        assert!(matches!(
            synth.set("nobody.freq", json!(1)),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn test_soft_policy_ignores_missing_path() {
        let mut synth = Synth::new(
            &json!({ "id": "osc", "ugen": "sin" }),
            context(PathPolicy::Soft),
            None,
            None,
        )
        .unwrap();
        assert_eq!(synth.get("osc.width").unwrap(), None);
        assert_eq!(synth.get_value("nobody").unwrap(), None);
        synth.set("nobody.freq", json!(1)).unwrap();
        // Structural errors are never softened
        assert!(synth.set("osc.freq", json!({ "ugen": "wobble" })).is_err());
    }

    #[test]
    fn test_demand_synth_steps_per_pull() {
        let mut synth = Synth::new(
            &json!({ "ugen": "sequence", "list": [1, 2, 3], "loop": 0 }),
            context(PathPolicy::Hard),
            None,
            Some(Rate::Demand),
        )
        .unwrap();
        assert!(!synth.is_clocked());

        let pulled: Vec<f32> = (0..5).map(|_| synth.pull()).collect();
        assert_eq!(pulled, vec![1.0, 2.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_set_many() {
        let mut synth = Synth::new(
            &json!({ "id": "osc", "ugen": "sin" }),
            context(PathPolicy::Hard),
            None,
            None,
        )
        .unwrap();
        let values = json!({ "osc.freq": 110, "osc.phase": 1 });
        synth.set_many(values.as_object().unwrap()).unwrap();
        assert_eq!(synth.get_value("osc.freq").unwrap(), Some(110.0));
        assert_eq!(synth.get_value("osc.phase").unwrap(), Some(1.0));
    }

    #[test]
    fn test_replacing_root_keeps_output() {
        let mut synth = Synth::new(
            &json!({ "id": "main", "ugen": "out", "sources": 0.5 }),
            context(PathPolicy::Hard),
            None,
            None,
        )
        .unwrap();
        synth
            .set("main", json!({ "id": "main", "ugen": "out", "sources": 0.25 }))
            .unwrap();

        let mut buses = vec![vec![0.0; 8]; 4];
        synth.gen(&mut buses);
        assert!(buses[0].iter().all(|&s| s == 0.25));
        assert_eq!(synth.value(), 0.25);
    }
}
