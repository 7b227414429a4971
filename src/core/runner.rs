use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::core::config::StepSelection;
use crate::core::copy::CopyEngine;
use crate::core::error::{ImportError, ImportResult};
use crate::core::registry::{ExecutionPlan, StepRegistry};
use crate::core::step::{StepReport, StepState};

/// Reports of every step that ran, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<StepReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_inserted(&self) -> u64 {
        self.reports.iter().map(|r| r.inserted).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.reports.iter().map(|r| r.skipped).sum()
    }

    pub fn report(&self, name: &str) -> Option<&StepReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}

type StepObserver = Box<dyn Fn(&StepReport) + Send + Sync>;

/// Runs the registered steps of one phase sequentially, in dependency order.
pub struct PipelineRunner {
    engine: CopyEngine,
    selection: StepSelection,
    observer: Option<StepObserver>,
}

impl PipelineRunner {
    pub fn new(engine: CopyEngine) -> Self {
        Self {
            engine,
            selection: StepSelection::default(),
            observer: None,
        }
    }

    pub fn with_selection(mut self, selection: StepSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Called after each step, whether it succeeded or failed.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StepReport) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Plan and check the registry without running anything.
    pub async fn preflight(&self, registry: &StepRegistry) -> ImportResult<ExecutionPlan> {
        let plan = registry.plan()?;
        for (step, mapping_type) in &plan.external {
            if self.engine.mappings().count(*mapping_type).await? == 0 {
                return Err(ImportError::UnknownDependency {
                    step: step.to_string(),
                    mapping_type: *mapping_type,
                });
            }
            info!(
                "Step '{}' uses {} mapped by an earlier run",
                step, mapping_type
            );
        }
        Ok(plan)
    }

    /// Run every selected step. Stops at the first failing step.
    pub async fn run(&self, mut registry: StepRegistry) -> ImportResult<RunSummary> {
        registry.retain(|name| self.selection.includes(name));
        let plan = self.preflight(&registry).await?;
        info!(
            "Running {} step(s): {}",
            plan.order.len(),
            plan.order.iter().map(|d| d.name).collect::<Vec<_>>().join(", ")
        );

        let started = Instant::now();
        let mut summary = RunSummary::default();
        for mut step in registry.into_ordered(&plan) {
            let mut report = StepReport::new(step.descriptor().name);
            let result = self.engine.run(step.as_mut(), &mut report).await;
            if let Some(observer) = &self.observer {
                observer(&report);
            }
            summary.reports.push(report);

            if let Err(e) = result {
                error!("{}", e);
                return Err(e);
            }
        }
        summary.elapsed = started.elapsed();

        let done = summary
            .reports
            .iter()
            .filter(|r| r.state == StepState::Done)
            .count();
        info!(
            "Completed {} step(s): {} rows inserted, {} skipped in {:.2?}",
            done,
            summary.total_inserted(),
            summary.total_skipped(),
            summary.elapsed
        );
        Ok(summary)
    }
}
