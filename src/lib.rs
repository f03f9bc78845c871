//! # ugenflow - unit generator graph engine
//!
//! ugenflow compiles declarative JSON unit generator definitions into live
//! graphs of signal processing nodes and renders them block by block onto a
//! set of shared buses. Running graphs can be patched while they play: any
//! input, model field or option is reachable through a dotted path, and whole
//! subtrees can be swapped without dropping the inputs they were fed by.
//!
//! ## Core pieces
//!
//! - **Rates**: audio, control, scalar, demand and scheduled evaluation
//! - **Compiler**: JSON defs to arena nodes, with registry defaults merged in
//! - **Node lists**: dependency-ordered evaluation with subtree insert, remove and swap
//! - **Synths**: named scopes with path get/set and demand-rate pulls
//! - **Environment**: bus pool, synth ordering and the block clock
//! - **Scheduler**: deterministic timed changes and events
//!
//! ## Quick Start
//!
//! ```rust
//! use ugenflow::{AudioSettings, Environment, SynthOptions};
//! use serde_json::json;
//!
//! let mut env = Environment::new(AudioSettings::default());
//! let id = env
//!     .add_synth(
//!         &json!({ "id": "osc", "ugen": "sinOsc", "freq": 220, "mul": 0.5 }),
//!         SynthOptions::default(),
//!     )
//!     .unwrap();
//!
//! let frames = env.render(1024);
//! assert_eq!(frames[0].len(), 1024);
//!
//! // Retune while running
//! env.synth_mut(id).unwrap().set("osc.freq", json!(330)).unwrap();
//! ```

pub mod buffer;
pub mod compiler;
pub mod config;
pub mod def;
pub mod environment;
pub mod error;
pub mod graph;
pub mod interpolate;
pub mod mul_add;
pub mod node_list;
pub mod nodes;
pub mod path;
pub mod rate;
pub mod registry;
pub mod scheduler;
pub mod synth;
pub mod ugen;

pub use buffer::{BufferDesc, BufferRef, BufferSource, BufferStatus, BufferTable};
pub use compiler::{Compiled, Compiler, EngineContext};
pub use config::{AudioSettings, PathPolicy};
pub use def::UnitGenDef;
pub use environment::{AddTo, BusKind, Environment, SynthId, SynthOptions};
pub use error::{Error, Result};
pub use graph::{PathValue, UGenGraph};
pub use node_list::NodeList;
pub use rate::Rate;
pub use registry::{Registry, UGenBuild, UGenDefaults};
pub use scheduler::{Action, Beats, ChangeSpec, Milliseconds, Scheduler, Seconds, TimeConverter};
pub use synth::Synth;
pub use ugen::{Capability, NodeId, UnitGen};
