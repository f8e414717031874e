use crate::check::{render, search_failure, CheckRequest, CheckResult, Checker};
use crate::config::PropertyType;
use crate::csdr::csdr;
use crate::lts::Builder;
use crate::reachability::{reachability, Verdict, ViolationKind};
use crate::types::{Counterexample, CounterexampleType, ReasonKind, Status};
use tracing::warn;

/// Deadlock and goal checks. Uses context-switch-bounded search when the
/// request carries a bound, plain reachability otherwise.
#[derive(Debug, Default)]
pub struct SafetyChecker;

impl<B> Checker<B> for SafetyChecker
where
    B: Builder + Clone + Send + Sync,
{
    fn check(&self, request: &CheckRequest, input: &B) -> CheckResult {
        if request.property == PropertyType::Liveness {
            return CheckResult::new(request, Status::Error).with_reason(
                ReasonKind::InvalidInput,
                "liveness is checked by the liveness checker",
            );
        }

        let mut config = request.config.clone();
        config.property = request.property;
        let outcome = match config.context_switch_bound {
            Some(bound) => csdr(input, &config, bound),
            None => {
                if config.por {
                    warn!("partial-order reduction needs a context-switch bound; searching without it");
                }
                reachability(input, &config)
            }
        };
        let report = match outcome {
            Ok(report) => report,
            Err(err) => return search_failure(request, &err),
        };

        let result = match report.verdict {
            Verdict::Holds => CheckResult::new(request, Status::Pass),
            Verdict::NoStates => CheckResult::new(request, Status::Error)
                .with_reason(ReasonKind::NoInitialStates, "no initial states"),
            Verdict::BoundExhausted => CheckResult::new(request, Status::Inconclusive).with_reason(
                ReasonKind::BoundReached,
                format!(
                    "states beyond {} context switches were not explored",
                    config.context_switch_bound.unwrap_or_default()
                ),
            ),
            Verdict::Violated(witness) => {
                let (kind, tag) = match witness.kind {
                    ViolationKind::Deadlock => (CounterexampleType::Deadlock, "deadlock"),
                    ViolationKind::Goal => (CounterexampleType::Trace, "goal"),
                    ViolationKind::ErrorEdge => (CounterexampleType::Trace, "error"),
                };
                let mut result = CheckResult::new(request, Status::Fail);
                result.counterexample = Some(Counterexample {
                    kind,
                    states: render(&witness.trace),
                    cycle_start: None,
                    tags: vec![tag.to_string()],
                });
                result
            }
        };
        result.with_stats(report.stored, report.stats)
    }
}
