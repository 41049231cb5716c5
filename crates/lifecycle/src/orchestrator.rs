//! Lifecycle orchestration - precheck, apply and check each step, destroy, verify absence
//!
//! Once anything has been applied, teardown and destroy verification run
//! no matter how the step sequence ended.

use crate::accessor::LiveStateAccessor;
use crate::apply::{Applier, RegistryApplier};
use crate::check::{Check, compose};
use crate::destroy::DestroyVerifier;
use crate::error::{CheckFailure, DestroyError, DestroyFailure, Error, Result};
use crate::provider::ProviderContext;
use crate::types::{Configuration, RecordedState};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Environment readiness check run before anything is created
pub type PreCheck = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Predicate over recorded state run after teardown
pub type DestroyCheck = Arc<
    dyn Fn(&RecordedState, &ProviderContext) -> std::result::Result<(), DestroyFailure>
        + Send
        + Sync,
>;

/// One apply-then-verify step
#[derive(Clone, Debug)]
pub struct TestStep {
    pub config: Configuration,
    pub checks: Vec<Check>,
    /// Permit resources to come back with a different ID than the previous step
    pub allow_replacement: bool,
}

impl TestStep {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            checks: Vec::new(),
            allow_replacement: false,
        }
    }

    /// Add a check; checks run in the order they are added
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn allow_replacement(mut self) -> Self {
        self.allow_replacement = true;
        self
    }
}

/// A full lifecycle test over one or more steps
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub precheck: Option<PreCheck>,
    pub steps: Vec<TestStep>,
    /// Defaults to [`DestroyVerifier::verify_destroyed`]
    pub destroy_check: Option<DestroyCheck>,
}

impl TestCase {
    pub fn builder(name: impl Into<String>) -> TestCaseBuilder {
        TestCaseBuilder {
            case: TestCase {
                name: name.into(),
                precheck: None,
                steps: Vec::new(),
                destroy_check: None,
            },
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("precheck", &self.precheck.is_some())
            .field("steps", &self.steps)
            .field("destroy_check", &self.destroy_check.is_some())
            .finish()
    }
}

/// Builder for [`TestCase`]
pub struct TestCaseBuilder {
    case: TestCase,
}

impl TestCaseBuilder {
    pub fn precheck<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.case.precheck = Some(Arc::new(f));
        self
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.case.steps.push(step);
        self
    }

    /// Replace the default destroy verification
    pub fn destroy_check<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordedState, &ProviderContext) -> std::result::Result<(), DestroyFailure>
            + Send
            + Sync
            + 'static,
    {
        self.case.destroy_check = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> TestCase {
        self.case
    }
}

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    PreChecking,
    Applying(usize),
    Checking(usize),
    Destroying,
    VerifyingDestroyed,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::PreChecking => write!(f, "prechecking"),
            Self::Applying(i) => write!(f, "applying step {}", i + 1),
            Self::Checking(i) => write!(f, "checking step {}", i + 1),
            Self::Destroying => write!(f, "destroying"),
            Self::VerifyingDestroyed => write!(f, "verifying destroyed"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    /// Cancelled; teardown ran if anything had been applied
    Aborted { reason: String },
    /// Environment not ready; nothing was created
    PreconditionFailed { reason: String },
    /// A step's configuration could not be applied (0-indexed step)
    ApplyFailed { step: usize, error: String },
    /// A step's check did not hold (0-indexed step)
    CheckFailed { step: usize, failure: CheckFailure },
    /// Resources survived teardown, or absence could not be confirmed
    DestroyVerificationFailed { failure: DestroyFailure },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Short category label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Aborted { .. } => "aborted",
            Self::PreconditionFailed { .. } => "precondition failed",
            Self::ApplyFailed { .. } => "apply failed",
            Self::CheckFailed { .. } => "check failed",
            Self::DestroyVerificationFailed { .. } => "destroy verification failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
            Self::PreconditionFailed { reason } => write!(f, "precondition failed: {reason}"),
            Self::ApplyFailed { step, error } => {
                write!(f, "apply failed at step {}: {error}", step + 1)
            }
            Self::CheckFailed { step, failure } => {
                write!(f, "check failed at step {}: {failure}", step + 1)
            }
            Self::DestroyVerificationFailed { failure } => {
                write!(f, "destroy verification failed: {failure}")
            }
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub case: String,
    pub outcome: Outcome,
    /// Teardown's own failure, reported alongside the outcome
    pub teardown_error: Option<DestroyError>,
    /// Destroy verification failure when the outcome already names another failure
    pub secondary: Option<DestroyFailure>,
    /// Phases entered, in order
    pub phases: Vec<Phase>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Passed with a clean teardown
    pub fn is_success(&self) -> bool {
        self.outcome.is_passed() && self.teardown_error.is_none()
    }
}

/// Receives phase transitions as they happen
pub trait LifecycleObserver {
    fn on_phase(&mut self, case: &str, phase: Phase);
}

/// No-op observer
pub struct NoObserver;

impl LifecycleObserver for NoObserver {
    fn on_phase(&mut self, _case: &str, _phase: Phase) {}
}

/// Cooperative cancellation shared between a runner and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs test cases against a shared provider context
#[derive(Clone)]
pub struct Harness {
    ctx: Arc<ProviderContext>,
    applier: Arc<dyn Applier>,
}

impl Harness {
    /// Harness applying through the context's kind registry
    pub fn new(ctx: Arc<ProviderContext>) -> Self {
        let applier = Arc::new(RegistryApplier::new(ctx.clone()));
        Self { ctx, applier }
    }

    /// Harness with a custom apply component
    pub fn with_applier(ctx: Arc<ProviderContext>, applier: Arc<dyn Applier>) -> Self {
        Self { ctx, applier }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    /// Run one case to completion
    pub fn run(&self, case: &TestCase) -> RunReport {
        self.run_with(case, &mut NoObserver, &CancelFlag::new())
    }

    /// Run one case, announcing phases and honoring cancellation
    pub fn run_with(
        &self,
        case: &TestCase,
        observer: &mut dyn LifecycleObserver,
        cancel: &CancelFlag,
    ) -> RunReport {
        let started = Instant::now();
        log::info!("running {}", case.name);

        let mut run = Run {
            case: case.name.clone(),
            phases: Vec::new(),
            observer,
        };
        run.enter(Phase::Init);

        let early = if cancel.is_cancelled() {
            Some(Outcome::Aborted {
                reason: "cancelled before any resource was created".to_string(),
            })
        } else {
            self.precheck(case, &mut run).err()
        };
        if let Some(outcome) = early {
            run.enter(Phase::Failed);
            return run.finish(outcome, None, None, started);
        }

        let mut created = RecordedState::new();
        let mut applied_any = false;
        let primary = self.run_steps(case, &mut run, cancel, &mut created, &mut applied_any);

        if !applied_any {
            // Cancelled before the first apply: nothing to tear down
            let outcome = primary.unwrap_or(Outcome::Passed);
            run.enter(if outcome.is_passed() {
                Phase::Done
            } else {
                Phase::Failed
            });
            return run.finish(outcome, None, None, started);
        }

        run.enter(Phase::Destroying);
        let teardown_error = self.applier.destroy_all(&created).err();
        if let Some(e) = &teardown_error {
            log::warn!("{}: teardown incomplete: {e}", case.name);
        }

        run.enter(Phase::VerifyingDestroyed);
        let verification = match &case.destroy_check {
            Some(check) => check(&created, &self.ctx),
            None => DestroyVerifier::new(&self.ctx).verify_destroyed(&created),
        };

        let (outcome, secondary) = match (primary, verification) {
            (Some(outcome), Ok(())) => (outcome, None),
            (Some(outcome), Err(failure)) => (outcome, Some(failure)),
            (None, Ok(())) => (Outcome::Passed, None),
            (None, Err(failure)) => (Outcome::DestroyVerificationFailed { failure }, None),
        };

        run.enter(if outcome.is_passed() {
            Phase::Done
        } else {
            Phase::Failed
        });
        run.finish(outcome, teardown_error, secondary, started)
    }

    fn precheck(&self, case: &TestCase, run: &mut Run<'_>) -> std::result::Result<(), Outcome> {
        let Some(precheck) = &case.precheck else {
            return Ok(());
        };
        run.enter(Phase::PreChecking);
        precheck().map_err(|e| Outcome::PreconditionFailed {
            reason: format!("{e:#}"),
        })
    }

    /// Apply and check each step in order; returns the first failure
    fn run_steps(
        &self,
        case: &TestCase,
        run: &mut Run<'_>,
        cancel: &CancelFlag,
        created: &mut RecordedState,
        applied_any: &mut bool,
    ) -> Option<Outcome> {
        let live = LiveStateAccessor::new(&self.ctx);
        let mut state = RecordedState::new();

        for (i, step) in case.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Some(Outcome::Aborted {
                    reason: format!("cancelled before step {}", i + 1),
                });
            }

            run.enter(Phase::Applying(i));
            *applied_any = true;

            let next = match self.applier.apply(&step.config, &state) {
                Ok(next) => next,
                Err(e) => {
                    track_created(created, &e.partial);
                    return Some(Outcome::ApplyFailed {
                        step: i,
                        error: e.to_string(),
                    });
                }
            };
            track_created(created, &next);

            if let Err(error) = verify_recorded(step, &state, &next) {
                return Some(Outcome::ApplyFailed { step: i, error });
            }
            state = next;

            run.enter(Phase::Checking(i));
            if let Err(failure) = compose(step.checks.iter().cloned()).evaluate(&state, &live) {
                return Some(Outcome::CheckFailed { step: i, failure });
            }
        }

        None
    }

    /// Run independent cases in parallel, reports in input order
    pub fn run_all(&self, cases: &[TestCase], jobs: usize) -> Result<Vec<RunReport>> {
        if jobs <= 1 || cases.len() <= 1 {
            return Ok(cases.iter().map(|case| self.run(case)).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create thread pool: {e}")))?;

        Ok(pool.install(|| cases.par_iter().map(|case| self.run(case)).collect()))
    }
}

/// Fold a step's records into everything created so far
///
/// When an address comes back with a different ID, the earlier record stays
/// tracked under `<address>#<old id>` so teardown and destroy verification
/// still reach the resource it names.
fn track_created(created: &mut RecordedState, next: &RecordedState) {
    for (address, record) in next.iter() {
        if let Some(old) = created.remove(address) {
            if old.id != record.id {
                log::debug!("{address}: id {} replaced by {}", old.id, record.id);
                created.insert(format!("{address}#{}", old.id), old);
            }
        }
        created.insert(address.clone(), record.clone());
    }
}

/// Every declared resource is recorded with an ID, and kept its ID
/// unless the step allows replacement
fn verify_recorded(
    step: &TestStep,
    prior: &RecordedState,
    next: &RecordedState,
) -> std::result::Result<(), String> {
    for decl in &step.config.resources {
        let address = decl.address();
        let record = next
            .get(&address)
            .ok_or_else(|| format!("{address} missing from state after apply"))?;

        if record.id.is_empty() {
            return Err(format!("{address} recorded without an id"));
        }

        if step.allow_replacement {
            continue;
        }
        if let Some(before) = prior.get(&address) {
            if before.id != record.id {
                return Err(format!(
                    "{address} was replaced: id {} became {}",
                    before.id, record.id
                ));
            }
        }
    }
    Ok(())
}

/// Per-run bookkeeping of phases
struct Run<'a> {
    case: String,
    phases: Vec<Phase>,
    observer: &'a mut dyn LifecycleObserver,
}

impl Run<'_> {
    fn enter(&mut self, phase: Phase) {
        log::debug!("{}: {phase}", self.case);
        self.phases.push(phase);
        self.observer.on_phase(&self.case, phase);
    }

    fn finish(
        self,
        outcome: Outcome,
        teardown_error: Option<DestroyError>,
        secondary: Option<DestroyFailure>,
        started: Instant,
    ) -> RunReport {
        log::info!("{}: {outcome}", self.case);
        RunReport {
            case: self.case,
            outcome,
            teardown_error,
            secondary,
            phases: self.phases,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}
