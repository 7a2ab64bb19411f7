//! Validation-driven repair of generated artifacts.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Validating --no errors--------------------------> Done
//! Validating --errors, rounds left, repairable----> Repairing --> Validating
//! Validating --errors, otherwise------------------> FailedReport
//! ```
//!
//! Every repair round reads an immutable snapshot of the artifact set and
//! produces a new set; only artifacts named in the report are replaced.
//! `FailedReport` is not an error: the best-effort artifact set is returned
//! together with the remaining diagnostics.

use std::time::Duration;

use crate::artifacts::{ArtifactSet, ValidationReport, COLLECT_SENTINEL};
use crate::error::Result;
use crate::generator::extract::{extract_code_block, BlockLang};
use crate::generator::layers::with_trailing_newline;
use crate::generator::validator::ArtifactValidator;
use crate::llm::{call_with_timeout, LanguageModel};
use crate::prompts::{PromptKind, PromptSet};

/// Where the loop currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    Validating,
    Repairing(ValidationReport),
    Done,
    FailedReport(ValidationReport),
}

/// Terminal state of a finished loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStatus {
    Done,
    FailedReport,
}

/// What a finished loop hands back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub artifacts: ArtifactSet,
    /// Diagnostics still open; empty when `status` is `Done`
    pub report: ValidationReport,
    pub status: RepairStatus,
    /// Repair rounds executed
    pub rounds: usize,
    /// Validation passes executed
    pub validations: usize,
}

impl RepairOutcome {
    pub fn is_clean(&self) -> bool {
        self.status == RepairStatus::Done
    }
}

/// Bounded validate/repair cycle over one artifact set
pub struct RepairLoop<'a> {
    model: &'a dyn LanguageModel,
    validator: &'a dyn ArtifactValidator,
    prompts: &'a PromptSet,
    timeout: Duration,
    max_rounds: usize,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        validator: &'a dyn ArtifactValidator,
        prompts: &'a PromptSet,
        timeout: Duration,
        max_rounds: usize,
    ) -> Self {
        Self {
            model,
            validator,
            prompts,
            timeout,
            max_rounds,
        }
    }

    /// Validate `artifacts` and repair them until the report is empty.
    ///
    /// `max_rounds` is an upper limit, not a guaranteed count. The loop ends
    /// with [`RepairStatus::FailedReport`] as soon as the report names no
    /// artifact a model call could fix, i.e. only [`COLLECT_SENTINEL`] or
    /// paths missing from the set, even if rounds are left.
    pub async fn run(&self, artifacts: ArtifactSet) -> Result<RepairOutcome> {
        let mut current = artifacts;
        let mut rounds = 0;
        let mut validations = 0;
        let mut state = RepairState::Validating;

        loop {
            state = match state {
                RepairState::Validating => {
                    let report = self.validator.validate(&current).await;
                    validations += 1;
                    self.next_state(report, &current, rounds)
                }
                RepairState::Repairing(report) => {
                    rounds += 1;
                    log::info!(
                        "Repair round {}/{}: {} artifact(s) to fix",
                        rounds,
                        self.max_rounds,
                        report.len()
                    );
                    current = self.repair_round(&current, &report).await?;
                    RepairState::Validating
                }
                RepairState::Done => {
                    return Ok(RepairOutcome {
                        artifacts: current,
                        report: ValidationReport::new(),
                        status: RepairStatus::Done,
                        rounds,
                        validations,
                    });
                }
                RepairState::FailedReport(report) => {
                    for (path, diagnostic) in report.iter() {
                        log::warn!(
                            "Still failing after {} repair round(s): {}\n{}",
                            rounds,
                            path,
                            diagnostic
                        );
                    }
                    return Ok(RepairOutcome {
                        artifacts: current,
                        report,
                        status: RepairStatus::FailedReport,
                        rounds,
                        validations,
                    });
                }
            };
        }
    }

    fn next_state(
        &self,
        report: ValidationReport,
        current: &ArtifactSet,
        rounds: usize,
    ) -> RepairState {
        if report.is_empty() {
            RepairState::Done
        } else if rounds >= self.max_rounds {
            RepairState::FailedReport(report)
        } else if !report.paths().any(|p| is_repairable(p, current)) {
            log::warn!("No repairable artifact in the validation report");
            RepairState::FailedReport(report)
        } else {
            RepairState::Repairing(report)
        }
    }

    /// One model call per reported artifact; returns the repaired set
    pub async fn repair_round(
        &self,
        artifacts: &ArtifactSet,
        report: &ValidationReport,
    ) -> Result<ArtifactSet> {
        let mut next = artifacts.clone();
        let system = self.prompts.get(PromptKind::Repair);

        for (path, diagnostic) in report.iter() {
            let Some(content) = artifacts.get(path).filter(|_| path != COLLECT_SENTINEL) else {
                continue;
            };
            let lang = BlockLang::for_path(path);
            let user = format!(
                "File: {path}\n\nDiagnostic:\n{diagnostic}\n\nCurrent content:\n```{tag}\n{content}\n```\n",
                path = path,
                diagnostic = diagnostic,
                tag = lang.tag(),
                content = content.trim_end(),
            );

            log::debug!("Repairing {}", path);
            let response = call_with_timeout(self.model, self.timeout, system, &user).await?;
            let fixed = extract_code_block(&response, lang);
            if fixed.is_empty() {
                log::warn!(
                    "Repair of {} returned no content, keeping previous version",
                    path
                );
                continue;
            }
            next.insert(path, with_trailing_newline(fixed));
        }
        Ok(next)
    }
}

fn is_repairable(path: &str, artifacts: &ArtifactSet) -> bool {
    path != COLLECT_SENTINEL && artifacts.contains(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every pass for a fixed path
    struct AlwaysFailing {
        path: &'static str,
        passes: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactValidator for AlwaysFailing {
        async fn validate(&self, _artifacts: &ArtifactSet) -> ValidationReport {
            self.passes.fetch_add(1, Ordering::SeqCst);
            [(self.path, "SyntaxError: invalid syntax (line 1)")]
                .into_iter()
                .collect()
        }
    }

    /// Fails while `bad.py` still contains `broken`
    struct ContentCheck;

    #[async_trait]
    impl ArtifactValidator for ContentCheck {
        async fn validate(&self, artifacts: &ArtifactSet) -> ValidationReport {
            match artifacts.get("bad.py") {
                Some(content) if content.contains("broken") => {
                    [("bad.py", "SyntaxError: broken (line 1)")].into_iter().collect()
                }
                _ => ValidationReport::new(),
            }
        }
    }

    fn artifacts() -> ArtifactSet {
        [("bad.py", "broken(\n"), ("good.py", "x = 1\n")]
            .into_iter()
            .collect()
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_clean_first_pass_makes_no_calls() -> Result<()> {
        let model = ScriptedModel::default();
        let clean = crate::generator::validator::Validator::syntax_only();
        let prompts = PromptSet::embedded();

        let outcome = RepairLoop::new(&model, &clean, &prompts, timeout(), 2)
            .run([("good.py", "x = 1\n")].into_iter().collect())
            .await?;
        assert_eq!(outcome.status, RepairStatus::Done);
        assert_eq!(outcome.validations, 1);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_bounded_retry_returns_best_effort_set() -> Result<()> {
        let model = ScriptedModel::new(["```python\nstill(\n```", "```python\nstill(\n```"]);
        let validator = AlwaysFailing {
            path: "bad.py",
            passes: AtomicUsize::new(0),
        };
        let prompts = PromptSet::embedded();

        let outcome = RepairLoop::new(&model, &validator, &prompts, timeout(), 2)
            .run(artifacts())
            .await?;

        assert_eq!(outcome.status, RepairStatus::FailedReport);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.validations, 3);
        assert_eq!(validator.passes.load(Ordering::SeqCst), 3);
        assert_eq!(model.call_count(), 2);
        assert!(outcome.report.contains("bad.py"));
        assert_eq!(outcome.artifacts.len(), 2);
        assert_eq!(outcome.artifacts.get("bad.py"), Some("still(\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_repair_replaces_only_reported_file() -> Result<()> {
        let model = ScriptedModel::new(["Fixed:\n```python\nfixed()\n```"]);
        let prompts = PromptSet::embedded();
        let original = artifacts();

        let outcome = RepairLoop::new(&model, &ContentCheck, &prompts, timeout(), 2)
            .run(original.clone())
            .await?;

        assert!(outcome.is_clean());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.validations, 2);
        assert_eq!(outcome.artifacts.get("bad.py"), Some("fixed()\n"));
        assert_eq!(outcome.artifacts.get("good.py"), original.get("good.py"));
        assert_eq!(original.get("bad.py"), Some("broken(\n"));

        let call = &model.calls()[0];
        assert_eq!(call.system, prompts.get(PromptKind::Repair));
        assert!(call.user.contains("SyntaxError: broken (line 1)"));
        assert!(call.user.contains("broken("));
        Ok(())
    }

    #[tokio::test]
    async fn test_sentinel_only_report_is_not_repaired() -> Result<()> {
        let model = ScriptedModel::default();
        let validator = AlwaysFailing {
            path: COLLECT_SENTINEL,
            passes: AtomicUsize::new(0),
        };
        let prompts = PromptSet::embedded();

        let outcome = RepairLoop::new(&model, &validator, &prompts, timeout(), 2)
            .run(artifacts())
            .await?;
        assert_eq!(outcome.status, RepairStatus::FailedReport);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(model.call_count(), 0);
        assert!(outcome.report.contains(COLLECT_SENTINEL));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_path_report_stops_before_max_rounds() -> Result<()> {
        let model = ScriptedModel::default();
        let validator = AlwaysFailing {
            path: "api/missing_api.py",
            passes: AtomicUsize::new(0),
        };
        let prompts = PromptSet::embedded();

        let outcome = RepairLoop::new(&model, &validator, &prompts, timeout(), 5)
            .run(artifacts())
            .await?;
        assert_eq!(outcome.status, RepairStatus::FailedReport);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.validations, 1);
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_repair_round_skips_unknown_paths_and_sentinel() -> Result<()> {
        let model = ScriptedModel::new(["```yaml\na: 2\n```"]);
        let prompts = PromptSet::embedded();
        let repair = RepairLoop::new(&model, &ContentCheck, &prompts, timeout(), 2);

        let set: ArtifactSet = [("data/users.yaml", "a: [\n")].into_iter().collect();
        let report: ValidationReport = [
            ("data/users.yaml", "YAMLError: bad"),
            ("gone.py", "SyntaxError"),
            (COLLECT_SENTINEL, "collect failed"),
        ]
        .into_iter()
        .collect();

        let next = repair.repair_round(&set, &report).await?;
        assert_eq!(model.call_count(), 1);
        assert!(model.calls()[0].user.contains("```yaml\na: [\n```"));
        assert_eq!(next.get("data/users.yaml"), Some("a: 2\n"));
        assert!(!next.contains("gone.py"));
        assert_eq!(set.get("data/users.yaml"), Some("a: [\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_repair_keeps_previous_content() -> Result<()> {
        let model = ScriptedModel::new(["```python\n```"]);
        let prompts = PromptSet::embedded();
        let repair = RepairLoop::new(&model, &ContentCheck, &prompts, timeout(), 1);

        let report: ValidationReport = [("bad.py", "SyntaxError")].into_iter().collect();
        let next = repair.repair_round(&artifacts(), &report).await?;
        assert_eq!(next.get("bad.py"), Some("broken(\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_rounds_reports_immediately() -> Result<()> {
        let model = ScriptedModel::default();
        let prompts = PromptSet::embedded();
        let outcome = RepairLoop::new(&model, &ContentCheck, &prompts, timeout(), 0)
            .run(artifacts())
            .await?;
        assert_eq!(outcome.status, RepairStatus::FailedReport);
        assert_eq!(outcome.validations, 1);
        assert_eq!(model.call_count(), 0);
        Ok(())
    }
}
