//! Swarmed, shared-memory and distributed state-space exploration for
//! on-the-fly model checking.
//!
//! The system under verification is a [`KripkeCube`]; the property, when
//! an algorithm needs one, is an [`Automaton`]. A [`ModelChecker`] built
//! from an [`McConfig`] runs the selected [`McAlgorithm`] over a pool of
//! worker threads and folds their statistics into an [`McReport`].

pub mod automaton;
pub mod bloom;
pub mod config;
pub mod dfs;
pub mod distributed;
pub mod dst;
pub mod engine;
pub mod error;
pub mod kripke;
pub mod observability;
pub mod product;
pub mod report;
pub mod rng;
pub mod store;
pub mod unionfind;

#[cfg(test)]
mod stateright;

pub use automaton::{AccMark, Acceptance, AcceptanceShape, Automaton, Cube, TwaCube};
pub use config::{DistributedConfig, DistributedMode, McAlgorithm, McConfig};
pub use distributed::{run_distributed, run_distributed_with, DistributedReport};
pub use engine::ModelChecker;
pub use error::{McError, McResult};
pub use kripke::{ExplicitKripke, KripkeCube, SuccCursor, SwarmedKripke};
pub use observability::{init_tracing, LogConfig, LogFormat};
pub use report::{McReport, McStatus, Verdict, WorkerStats};
