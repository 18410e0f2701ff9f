use stride_core::{Observer, StepState};
use stride_steppers::{Context, TimeStepper, TimeStepperSystem};

use crate::{
    Action, ConfigError, Error, Event, ExecutionerConfig, Solution, Solve, Status, StepRecord,
};

/// Drives a time stepper and a solver from the start time to the end time.
///
/// Each step follows the same sequence:
///
/// 1. Decide whether to keep going (end time, steady state, step limit,
///    failed solve).
/// 2. Advance the clock after a converged step, or reject the failed one.
/// 3. Ask the stepper for the next step size.
/// 4. Constrain it, solve, and report the outcome back to the stepper.
/// 5. Record the step and emit an [`Event`] to the observer.
#[derive(Debug, Clone)]
pub struct Transient {
    config: ExecutionerConfig,
    initial: StepState,
}

impl Transient {
    /// Creates an executioner from validated parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the parameters are inconsistent.
    pub fn new(config: ExecutionerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let initial = config.initial_state()?;
        Ok(Self { config, initial })
    }

    #[must_use]
    pub fn config(&self) -> &ExecutionerConfig {
        &self.config
    }

    /// Runs the transient with the final stepper of `system`.
    ///
    /// # Observer
    ///
    /// The observer receives an [`Event`] for the initial state and after
    /// every solve attempt, and may return [`Action::StopEarly`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stepper cannot produce a valid step (including a
    /// failed solve at `dtmin` when `error_on_dtmin` is set) or the solver fails.
    pub fn run<S, Obs>(
        &self,
        system: &mut TimeStepperSystem,
        solver: &mut S,
        mut observer: Obs,
    ) -> Result<Solution, Error>
    where
        S: Solve,
        Obs: Observer<Event, Action>,
    {
        let mut run = Run {
            config: &self.config,
            stepper: system.final_stepper_mut(),
            solver,
            state: self.initial.clone(),
            converged: true,
            history: Vec::new(),
            previous_solution: Vec::new(),
            solution_change: None,
        };

        run.pre_execute()?;
        let initial = Event {
            step: 0,
            time: run.state.time,
            dt: run.state.dt,
            converged: true,
            at_sync_point: false,
        };
        if let Some(Action::StopEarly) = observer.observe(&initial) {
            return Ok(run.finish(Status::StoppedByObserver));
        }

        let status = loop {
            if let Some(status) = run.keep_going() {
                break status;
            }
            run.increment_or_reject()?;
            run.compute_dt()?;
            run.take_step()?;

            let event = run.end_step();
            if let Some(Action::StopEarly) = observer.observe(&event) {
                break Status::StoppedByObserver;
            }
        };

        Ok(run.finish(status))
    }

    /// Runs the transient without observation.
    ///
    /// This is a convenience wrapper around [`Transient::run`] that discards events.
    ///
    /// # Errors
    ///
    /// Returns an error if the stepper or the solver fails.
    pub fn run_unobserved<S: Solve>(
        &self,
        system: &mut TimeStepperSystem,
        solver: &mut S,
    ) -> Result<Solution, Error> {
        self.run(system, solver, ())
    }
}

/// The mutable state of one run.
struct Run<'a, S> {
    config: &'a ExecutionerConfig,
    stepper: &'a mut TimeStepper,
    solver: &'a mut S,
    state: StepState,
    converged: bool,
    history: Vec<StepRecord>,
    previous_solution: Vec<f64>,
    solution_change: Option<f64>,
}

impl<S: Solve> Run<'_, S> {
    fn pre_execute(&mut self) -> Result<(), Error> {
        let mut ctx = Context::new(&mut self.state, self.solver.values());
        self.stepper.init(&mut ctx)?;
        self.stepper.pre_execute(&mut ctx)?;

        self.state.step = 0;
        self.state.dt = 0.0;
        self.state.time = self.state.start_time;
        self.state.time_old = self.state.start_time;

        self.stepper
            .compute_step(&mut Context::new(&mut self.state, self.solver.values()))?;
        self.state.dt = self.stepper.current_dt();
        log::debug!(
            "[{}] initial dt {} at time {}",
            self.stepper.name(),
            self.state.dt,
            self.state.time
        );
        Ok(())
    }

    fn keep_going(&self) -> Option<Status> {
        let state = &self.state;
        if self.converged {
            if state.repeat_step {
                return None;
            }
            if state.time >= state.end_time
                || (state.time - state.end_time).abs() <= state.timestep_tolerance
            {
                return Some(Status::Complete);
            }
            if self.at_steady_state() {
                log::info!("steady-state solution achieved at time {}", state.time);
                return Some(Status::SteadyState);
            }
            if state.step >= self.config.num_steps {
                return Some(Status::StepLimit);
            }
            None
        } else if self.config.abort_on_solve_fail {
            log::warn!("aborting as solve did not converge and abort_on_solve_fail is set");
            Some(Status::SolveFailed)
        } else if !self.config.error_on_dtmin && state.dt <= state.dt_min {
            log::warn!("aborting as timestep {} already at or below dtmin", state.dt);
            Some(Status::AtMinimumDt)
        } else {
            None
        }
    }

    fn increment_or_reject(&mut self) -> Result<(), Error> {
        if self.converged {
            if !self.state.repeat_step {
                self.state.time_old = self.state.time;
                self.state.step += 1;
            }
        } else {
            self.stepper
                .reject_step(&mut Context::new(&mut self.state, self.solver.values()))?;
            self.solver.restore();
            self.state.time = self.state.time_old;
        }
        Ok(())
    }

    fn compute_dt(&mut self) -> Result<(), Error> {
        self.stepper
            .compute_step(&mut Context::new(&mut self.state, self.solver.values()))?;
        Ok(())
    }

    /// The stepper's dt after the stepper's own constraints.
    fn constrained_dt(&mut self) -> Result<f64, Error> {
        let mut dt = if self.state.step > self.config.n_startup_steps {
            self.stepper.current_dt()
        } else {
            log::debug!(
                "step {} within {} startup steps, keeping dt {}",
                self.state.step,
                self.config.n_startup_steps,
                self.state.dt
            );
            self.state.dt
        };
        self.state.unconstrained_dt = dt;

        let at_sync_point = self
            .stepper
            .constrain_step(&mut Context::new(&mut self.state, self.solver.values()), &mut dt)?;
        self.state.at_sync_point = at_sync_point;
        Ok(dt)
    }

    fn take_step(&mut self) -> Result<(), Error> {
        if self.converged {
            self.state.dt_old = self.state.dt;
        }
        self.state.dt = self.constrained_dt()?;
        self.state.time = self.state.time_old + self.state.dt;

        let report = self.solver.solve(&self.state).map_err(Error::solver)?;
        self.state.iterations = report.iterations;
        self.state.repeat_step = report.repeat_step;

        let mut ctx = Context::new(&mut self.state, self.solver.values());
        self.stepper.step(&mut ctx, &report)?;
        self.converged = self.stepper.converged();
        if !self.converged {
            log::info!(
                "solve at time {} with dt {} did not converge",
                ctx.state.time,
                ctx.state.dt
            );
            return Ok(());
        }
        if !ctx.state.repeat_step {
            self.stepper.accept_step(&mut ctx)?;
            if self.config.steady_state_detection {
                self.track_solution_change(&report.solution);
            }
        }
        Ok(())
    }

    fn at_steady_state(&self) -> bool {
        let config = self.config;
        config.steady_state_detection
            && self.state.time > config.steady_state_start_time
            && self
                .solution_change
                .is_some_and(|change| change < config.steady_state_tolerance)
    }

    /// Records how much an accepted solution differs from the previous one.
    fn track_solution_change(&mut self, solution: &[f64]) {
        self.solution_change = relative_change(&self.previous_solution, solution).map(|change| {
            if self.config.normalize_solution_diff_norm_by_dt {
                change / self.state.dt
            } else {
                change
            }
        });
        log::debug!("relative solution change: {:?}", self.solution_change);
        self.previous_solution.clear();
        self.previous_solution.extend_from_slice(solution);
    }

    fn end_step(&mut self) -> Event {
        let state = &mut self.state;
        state.time = state.time_old + state.dt;
        if self.converged {
            if state.repeat_step {
                state.time = state.time_old;
            } else {
                self.history.push(StepRecord {
                    step: state.step,
                    time: state.time,
                    dt: state.dt,
                    at_sync_point: state.at_sync_point,
                });
                if state.verbose {
                    log::info!("step {} time {} dt {}", state.step, state.time, state.dt);
                } else {
                    log::debug!("step {} time {} dt {}", state.step, state.time, state.dt);
                }
            }
        }
        Event {
            step: state.step,
            time: state.time,
            dt: state.dt,
            converged: self.converged,
            at_sync_point: state.at_sync_point,
        }
    }

    fn finish(self, status: Status) -> Solution {
        let Run {
            stepper,
            solver,
            mut state,
            converged,
            history,
            ..
        } = self;
        if !converged {
            solver.restore();
            state.time = state.time_old;
        }
        log::debug!(
            "run finished with {status:?} after {} steps at time {}",
            history.len(),
            state.time
        );
        Solution {
            status,
            history,
            failures: stepper.num_failures(),
            state,
        }
    }
}

/// The 2-norm of `new - old` relative to the 2-norm of `new`.
///
/// `None` when there is nothing to compare against.
fn relative_change(old: &[f64], new: &[f64]) -> Option<f64> {
    if old.is_empty() || old.len() != new.len() {
        return None;
    }
    let difference = old
        .iter()
        .zip(new)
        .map(|(a, b)| (b - a).powi(2))
        .sum::<f64>()
        .sqrt();
    let norm = new.iter().map(|u| u * u).sum::<f64>().sqrt();
    Some(if norm > 0.0 { difference / norm } else { difference })
}
