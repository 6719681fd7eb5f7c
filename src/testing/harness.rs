//! Runs scenarios one after another and aggregates their reports

use crate::runner::CommandRunner;

use super::report::HarnessReport;
use super::scenario::{CancelSignal, RunObserver, RunOptions, Scenario};

/// Sequential scenario executor
///
/// Scenarios never overlap: each one owns the external system from its setup
/// to its teardown.
pub struct Harness<R> {
    runner: R,
    options: RunOptions,
}

impl<R: CommandRunner> Harness<R> {
    pub fn new(runner: R, options: RunOptions) -> Self {
        Self { runner, options }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every scenario in order
    ///
    /// Once `cancel` fires, the in-flight scenario is torn down and the
    /// remaining ones are skipped.
    pub async fn run(
        &self,
        scenarios: &[Scenario],
        cancel: &CancelSignal,
        observer: &mut dyn RunObserver,
    ) -> HarnessReport {
        let mut reports = Vec::with_capacity(scenarios.len());
        let mut skipped = Vec::new();

        for scenario in scenarios {
            if cancel.is_cancelled() {
                tracing::info!(scenario = %scenario.name, "Skipping scenario after interrupt");
                skipped.push(scenario.name.clone());
                continue;
            }
            let report = scenario
                .run(&self.runner, &self.options, cancel, observer)
                .await;
            reports.push(report);
        }

        let interrupted = cancel.is_cancelled() || reports.iter().any(|r| r.interrupted);
        HarnessReport::new(reports, skipped, interrupted)
    }
}
