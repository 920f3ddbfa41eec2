//! Continuation engine — decides whether a session keeps iterating.
//!
//! Every model turn starts in EVALUATING. The engine moves to CONTINUE only
//! when the response explicitly asks for it and neither the per-task bound
//! nor the global ceiling has been reached; everything else ends in
//! TERMINATE. Hitting the ceiling is reported as a loop limit.

use serde::{Deserialize, Serialize};
use swarmline_core::ContinuationDecision;

/// Default global iteration ceiling per drive.
pub const DEFAULT_CEILING: u32 = 50;

pub const CEILING_REASON: &str = "iteration ceiling reached";
pub const TASK_BOUND_REASON: &str = "task iteration bound reached";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    #[default]
    Evaluating,
    Continue,
    Terminate,
}

/// The engine's ruling on one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue { reason: String },
    Terminate { reason: String },
    /// The global ceiling forced termination
    LoopLimit { iterations: u32 },
}

impl Verdict {
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Continue { reason } | Self::Terminate { reason } => reason,
            Self::LoopLimit { .. } => CEILING_REASON,
        }
    }

    /// The effective decision, as recorded on the session.
    pub fn decision(&self) -> ContinuationDecision {
        match self {
            Self::Continue { reason } => ContinuationDecision::continue_with(reason.clone()),
            Self::Terminate { reason } => ContinuationDecision::terminate(reason.clone()),
            Self::LoopLimit { .. } => ContinuationDecision::terminate(CEILING_REASON),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.is_continue() {
            EngineState::Continue
        } else {
            EngineState::Terminate
        }
    }
}

/// Per-drive state machine.
#[derive(Debug, Clone)]
pub struct ContinuationEngine {
    ceiling: u32,
    task_bound: Option<u32>,
    iterations: u32,
    state: EngineState,
}

impl ContinuationEngine {
    /// A `ceiling` of zero is treated as one.
    pub fn new(ceiling: u32, task_bound: Option<u32>) -> Self {
        Self {
            ceiling: ceiling.max(1),
            task_bound,
            iterations: 0,
            state: EngineState::Evaluating,
        }
    }

    /// Start evaluating a new model turn. Returns the 1-based iteration number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iterations += 1;
        self.state = EngineState::Evaluating;
        self.iterations
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn task_bound(&self) -> Option<u32> {
        self.task_bound
    }

    /// Rule on the decision attached to the last response.
    ///
    /// `forced` makes the engine continue even though the model asked to
    /// stop; the bounds still apply.
    pub fn evaluate(&mut self, decision: &ContinuationDecision, forced: Option<&str>) -> Verdict {
        let verdict = if !decision.wants_continue() && forced.is_none() {
            Verdict::Terminate {
                reason: decision.reason.clone(),
            }
        } else if self.iterations >= self.ceiling {
            Verdict::LoopLimit {
                iterations: self.iterations,
            }
        } else if let Some(bound) = self.task_bound
            && self.iterations >= bound
        {
            Verdict::Terminate {
                reason: TASK_BOUND_REASON.into(),
            }
        } else {
            let reason = match forced {
                Some(reason) if !decision.wants_continue() => reason.to_string(),
                _ => decision.reason.clone(),
            };
            Verdict::Continue { reason }
        };

        self.state = verdict.state();
        verdict
    }
}

impl Default for ContinuationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_evaluating() {
        let mut engine = ContinuationEngine::default();
        assert_eq!(engine.state(), EngineState::Evaluating);
        assert_eq!(engine.begin_iteration(), 1);
        assert_eq!(engine.state(), EngineState::Evaluating);
    }

    #[test]
    fn explicit_continue_continues() {
        let mut engine = ContinuationEngine::default();
        engine.begin_iteration();
        let verdict = engine.evaluate(&ContinuationDecision::continue_with("step 1 of 3"), None);
        assert_eq!(
            verdict,
            Verdict::Continue {
                reason: "step 1 of 3".into()
            }
        );
        assert_eq!(engine.state(), EngineState::Continue);
    }

    #[test]
    fn missing_signal_terminates() {
        let mut engine = ContinuationEngine::default();
        engine.begin_iteration();
        let verdict = engine.evaluate(&ContinuationDecision::default(), None);
        assert_eq!(verdict.reason(), swarmline_core::NO_CONTINUATION_SIGNAL);
        assert_eq!(engine.state(), EngineState::Terminate);
    }

    #[test]
    fn ceiling_forces_loop_limit() {
        let mut engine = ContinuationEngine::new(3, None);
        let always = ContinuationDecision::continue_with("more");
        let mut verdicts = Vec::new();
        for _ in 0..3 {
            engine.begin_iteration();
            verdicts.push(engine.evaluate(&always, None));
        }
        assert!(verdicts[0].is_continue());
        assert!(verdicts[1].is_continue());
        assert_eq!(verdicts[2], Verdict::LoopLimit { iterations: 3 });
        assert_eq!(verdicts[2].decision().reason, CEILING_REASON);
    }

    #[test]
    fn task_bound_terminates_without_loop_limit() {
        let mut engine = ContinuationEngine::new(50, Some(2));
        let always = ContinuationDecision::continue_with("more");
        engine.begin_iteration();
        assert!(engine.evaluate(&always, None).is_continue());
        engine.begin_iteration();
        assert_eq!(
            engine.evaluate(&always, None),
            Verdict::Terminate {
                reason: TASK_BOUND_REASON.into()
            }
        );
    }

    #[test]
    fn forced_continue_respects_bounds() {
        let mut engine = ContinuationEngine::new(2, None);
        let stop = ContinuationDecision::terminate("done");
        engine.begin_iteration();
        let verdict = engine.evaluate(&stop, Some("deferred tool calls pending"));
        assert_eq!(verdict.reason(), "deferred tool calls pending");
        engine.begin_iteration();
        assert!(matches!(
            engine.evaluate(&stop, Some("deferred tool calls pending")),
            Verdict::LoopLimit { .. }
        ));
    }

    #[test]
    fn zero_ceiling_is_clamped() {
        assert_eq!(ContinuationEngine::new(0, None).ceiling(), 1);
    }
}
