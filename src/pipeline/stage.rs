//! Pipeline stage abstractions for the derivation run.
//!
//! Every derivation step is a `Stage`: a named transformation from one
//! input to one output. Pure steps (window building, rollup) are plain
//! functions wrapped in [`PureStage`]; steps that consult external
//! collaborators implement the trait directly.

use std::marker::PhantomData;

use crate::observability::{set_phase, RunPhase};

/// A pipeline stage that transforms data.
///
/// ```rust,ignore
/// let stage = PureStage::new("build windows", build_windows);
/// let windows = run_stage(&stage, RunPhase::WindowBuilding, deployments)?;
/// ```
pub trait Stage {
    type Input;
    type Output;
    type Error;

    /// Execute this stage with the given input.
    fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;

    /// Stage name for logging.
    fn name(&self) -> &str;
}

/// A stage that performs no I/O and cannot fail.
pub struct PureStage<F, I, O> {
    name: String,
    func: F,
    _phantom: PhantomData<(I, O)>,
}

impl<F, I, O> PureStage<F, I, O>
where
    F: Fn(I) -> O,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, I, O> Stage for PureStage<F, I, O>
where
    F: Fn(I) -> O,
{
    type Input = I;
    type Output = O;
    type Error = std::convert::Infallible;

    fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        Ok((self.func)(input))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Execute `stage` under `phase`, logging entry and completion.
pub fn run_stage<S: Stage>(
    stage: &S,
    phase: RunPhase,
    input: S::Input,
) -> Result<S::Output, S::Error> {
    let _phase = set_phase(phase);
    let span = tracing::info_span!("stage", name = stage.name(), %phase);
    let _entered = span.enter();
    let started = std::time::Instant::now();
    tracing::debug!("Stage started");
    let output = stage.execute(input)?;
    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Stage finished");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::get_current_context;

    #[test]
    fn test_pure_stage_execution() {
        let stage = PureStage::new("Double", |x: i32| x * 2);
        assert_eq!(stage.execute(21).unwrap(), 42);
        assert_eq!(stage.name(), "Double");
    }

    struct PhaseProbe;

    impl Stage for PhaseProbe {
        type Input = ();
        type Output = Option<RunPhase>;
        type Error = String;

        fn execute(&self, _input: ()) -> Result<Self::Output, Self::Error> {
            Ok(get_current_context().phase)
        }

        fn name(&self) -> &str {
            "probe"
        }
    }

    #[test]
    fn test_run_stage_sets_phase_for_duration() {
        crate::observability::reset_context();
        let seen = run_stage(&PhaseProbe, RunPhase::DailyRollup, ()).unwrap();
        assert_eq!(seen, Some(RunPhase::DailyRollup));
        assert!(get_current_context().phase.is_none());
    }
}
