//! Stage abstraction shared by the derivation steps.

pub mod stage;

pub use stage::{run_stage, PureStage, Stage};
