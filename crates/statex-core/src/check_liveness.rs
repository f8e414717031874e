use crate::check::{render, search_failure, CheckRequest, CheckResult, Checker};
use crate::lts::Builder;
use crate::ndfs::{nested_dfs, LivenessVerdict};
use crate::types::{Counterexample, CounterexampleType, ReasonKind, Status};

/// Accepting-cycle check by nested DFS.
#[derive(Debug, Default)]
pub struct LivenessChecker;

impl<B> Checker<B> for LivenessChecker
where
    B: Builder + Clone,
{
    fn check(&self, request: &CheckRequest, input: &B) -> CheckResult {
        let report = match nested_dfs(input, &request.config) {
            Ok(report) => report,
            Err(err) => return search_failure(request, &err),
        };
        let result = match report.verdict {
            LivenessVerdict::Holds => CheckResult::new(request, Status::Pass),
            LivenessVerdict::NoStates => CheckResult::new(request, Status::Error)
                .with_reason(ReasonKind::NoInitialStates, "no initial states"),
            LivenessVerdict::Violated(lasso) => {
                let mut result = CheckResult::new(request, Status::Fail);
                result.counterexample = Some(Counterexample {
                    kind: CounterexampleType::Lasso,
                    states: render(lasso.path()),
                    cycle_start: Some(lasso.cycle_start()),
                    tags: vec!["accepting_cycle".to_string(), format!("goal={:?}", lasso.goal)],
                });
                result
            }
        };
        result.with_stats(report.stored, report.stats)
    }
}
