//! Steppers that replay a fixed list of times.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stride_core::SolveReport;

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of a literal time sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSequenceParams {
    /// Strictly ascending times to land on.
    pub time_sequence: Vec<f64>,

    /// Keep stepping with the last gap after the last time instead of jumping to the end.
    #[serde(default)]
    pub use_last_dt_after_last_t: bool,
}

/// Parameters of a time sequence read from a column of a CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvTimeSequenceParams {
    pub file_name: PathBuf,

    /// Header name of the time column.
    #[serde(default)]
    pub column_name: Option<String>,

    /// Zero-based index of the time column; the first column if neither is given.
    #[serde(default)]
    pub column_index: Option<usize>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default = "default_header")]
    pub header: bool,

    #[serde(default)]
    pub use_last_dt_after_last_t: bool,
}

fn default_delimiter() -> char {
    ','
}

fn default_header() -> bool {
    true
}

/// The persisted position of a time sequence, used to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceCheckpoint {
    pub times: Vec<f64>,
    pub index: usize,
}

/// Steps exactly onto each time of a strictly ascending sequence.
#[derive(Debug, Clone)]
pub struct TimeSequenceStepper {
    input: Vec<f64>,
    use_last_dt_after_last_t: bool,
    sequence: Vec<f64>,
    index: usize,
    resume_from: Option<SequenceCheckpoint>,
}

impl TimeSequenceStepper {
    /// Creates a stepper for the given times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the times are not finite and strictly ascending.
    pub fn new(name: &str, times: Vec<f64>, use_last_dt_after_last_t: bool) -> Result<Self, Error> {
        if let Some(bad) = times.iter().find(|t| !t.is_finite()) {
            return Err(Error::invalid(name, format!("time sequence contains {bad}")));
        }
        if let Some(i) = times.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(Error::invalid(
                name,
                format!(
                    "time sequence must be strictly ascending: {} is followed by {}",
                    times[i],
                    times[i + 1]
                ),
            ));
        }
        Ok(Self {
            input: times,
            use_last_dt_after_last_t,
            sequence: Vec::new(),
            index: 0,
            resume_from: None,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the times are not strictly ascending.
    pub fn from_params(name: &str, params: &TimeSequenceParams) -> Result<Self, Error> {
        Self::new(
            name,
            params.time_sequence.clone(),
            params.use_last_dt_after_last_t,
        )
    }

    /// Reads the sequence from a CSV column.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the column is missing or
    /// not numeric, or the times are not strictly ascending.
    pub fn from_csv(name: &str, params: &CsvTimeSequenceParams) -> Result<Self, Error> {
        let times = read_column(params)?;
        Self::new(name, times, params.use_last_dt_after_last_t)
    }

    /// The sequence in effect, including the start and end times and any inserted cutback points.
    #[must_use]
    pub fn sequence(&self) -> &[f64] {
        &self.sequence
    }

    /// Index of the sequence entry the run is currently at.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Captures the sequence and position for a later restart.
    #[must_use]
    pub fn checkpoint(&self) -> SequenceCheckpoint {
        SequenceCheckpoint {
            times: self.sequence.clone(),
            index: self.index,
        }
    }

    /// Resumes from a checkpoint when the stepper is next initialized.
    ///
    /// Entries after the saved index may differ from the checkpoint; entries up
    /// to it must match.
    pub fn resume_from(&mut self, checkpoint: SequenceCheckpoint) {
        self.resume_from = Some(checkpoint);
    }

    /// The first sequence time after `time`.
    #[must_use]
    pub fn next_time_after(&self, time: f64, tolerance: f64) -> Option<f64> {
        self.sequence.iter().copied().find(|&t| t > time + tolerance)
    }

    /// Moves the index to the last entry at or before `time`.
    pub(crate) fn sync_to(&mut self, time: f64, tolerance: f64) {
        let passed = self.sequence.partition_point(|&t| t <= time + tolerance);
        self.index = passed.saturating_sub(1);
    }

    fn setup(&mut self, start: f64, end: f64) {
        let mut sequence = vec![start];
        sequence.extend(self.input.iter().copied().filter(|&t| t > start && t < end));

        if self.use_last_dt_after_last_t
            && let [.., before, last] = sequence[..]
            && last > before
        {
            let gap = last - before;
            let mut next = last + gap;
            while next < end {
                sequence.push(next);
                next += gap;
            }
        }

        sequence.push(end);
        self.sequence = sequence;
        self.index = 0;
    }

    fn gap(&self, core: &StepperCore, time: f64) -> Result<f64, Error> {
        match (self.sequence.get(self.index), self.sequence.get(self.index + 1)) {
            (Some(current), Some(next)) => Ok(next - current),
            _ => Err(Error::SequenceExhausted {
                stepper: core.name().to_owned(),
                time,
            }),
        }
    }
}

fn read_column(params: &CsvTimeSequenceParams) -> Result<Vec<f64>, Error> {
    let path = params.file_name.as_path();
    let column_error = |reason: String| Error::SequenceColumn {
        path: path.to_owned(),
        reason,
    };
    let file_error = |source| Error::SequenceFile {
        path: path.to_owned(),
        source,
    };

    let delimiter = u8::try_from(params.delimiter)
        .map_err(|_| column_error(format!("delimiter {:?} is not a single byte", params.delimiter)))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(params.header)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(file_error)?;

    let column = match (&params.column_name, params.column_index) {
        (Some(_), Some(_)) => {
            return Err(column_error(
                "column_name and column_index cannot both be given".to_owned(),
            ));
        }
        (Some(column_name), None) => {
            if !params.header {
                return Err(column_error("column_name requires a header row".to_owned()));
            }
            let headers = reader.headers().map_err(file_error)?;
            headers
                .iter()
                .position(|h| h == column_name)
                .ok_or_else(|| column_error(format!("no column named '{column_name}'")))?
        }
        (None, index) => index.unwrap_or(0),
    };

    let mut times = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(file_error)?;
        let field = record
            .get(column)
            .ok_or_else(|| column_error(format!("row {row} has no column {column}")))?;
        let time = field
            .parse::<f64>()
            .map_err(|error| column_error(format!("row {row}: '{field}' is not a number ({error})")))?;
        times.push(time);
    }
    Ok(times)
}

impl Rule for TimeSequenceStepper {
    fn init(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.setup(ctx.state.start_time, ctx.state.end_time);

        let Some(checkpoint) = self.resume_from.take() else {
            return Ok(());
        };
        let tolerance = ctx.state.timestep_tolerance;
        for index in 0..=checkpoint.index {
            let expected = checkpoint.times.get(index).copied().unwrap_or(f64::NAN);
            let found = self.sequence.get(index).copied().unwrap_or(f64::NAN);
            if !((expected - found).abs() <= tolerance) {
                return Err(Error::SequenceMismatch {
                    index,
                    expected,
                    found,
                });
            }
        }
        self.index = checkpoint.index;
        diag!(
            ctx.state,
            "[{}] resuming time sequence at entry {} (time {})",
            core.name(),
            self.index,
            self.sequence[self.index]
        );
        Ok(())
    }

    fn compute_initial_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.compute_dt(core, ctx)
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.gap(core, ctx.state.time)
    }

    fn compute_failed_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let state = &*ctx.state;
        let gap = self.gap(core, state.time)?;
        if gap <= state.dt_min {
            return Err(Error::AtMinimumDt {
                dt: gap,
                dt_min: state.dt_min,
            });
        }

        let dt = (core.cutback_factor_at_failure() * gap).max(state.dt_min);
        let inserted = self.sequence[self.index] + dt;
        self.sequence.insert(self.index + 1, inserted);
        diag!(
            state,
            "[{}] solve failed, inserting time {inserted} into the sequence",
            core.name()
        );
        self.gap(core, state.time)
    }

    fn verdict(
        &mut self,
        _core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        let repeat = report.repeat_step || ctx.state.repeat_step;
        if report.converged && !repeat {
            self.index += 1;
        }
        Ok(report.converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use approx::assert_relative_eq;
    use stride_core::StepState;

    fn core() -> StepperCore {
        StepperCore::for_tests("sequence")
    }

    fn initialized(times: Vec<f64>, start: f64, end: f64) -> TimeSequenceStepper {
        let mut stepper = TimeSequenceStepper::new("sequence", times, false).unwrap();
        let mut state = StepState::new(start, end, 1e-6, 100.0);
        stepper
            .init(&core(), &mut Context::new(&mut state, &()))
            .unwrap();
        stepper
    }

    #[test]
    fn setup_bounds_the_sequence_by_start_and_end() {
        let stepper = initialized(vec![-1.0, 0.5, 1.0, 2.0, 7.0], 0.0, 3.0);
        assert_eq!(stepper.sequence(), [0.0, 0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_unordered_times() {
        assert!(TimeSequenceStepper::new("s", vec![0.0, 2.0, 1.0], false).is_err());
        assert!(TimeSequenceStepper::new("s", vec![0.0, 1.0, 1.0], false).is_err());
    }

    #[test]
    fn steps_through_gaps_and_advances_on_convergence() {
        let mut stepper = initialized(vec![1.0, 3.0], 0.0, 4.0);
        let mut state = StepState::new(0.0, 4.0, 1e-6, 100.0);
        let mut ctx = Context::new(&mut state, &());

        assert_relative_eq!(stepper.compute_dt(&core(), &mut ctx).unwrap(), 1.0);
        stepper
            .verdict(&core(), &mut ctx, &SolveReport::converged(1, 1))
            .unwrap();
        assert_relative_eq!(stepper.compute_dt(&core(), &mut ctx).unwrap(), 2.0);

        stepper
            .verdict(&core(), &mut ctx, &SolveReport::failed())
            .unwrap();
        assert_eq!(stepper.index(), 1);

        let repeat = SolveReport {
            repeat_step: true,
            ..SolveReport::converged(1, 1)
        };
        stepper.verdict(&core(), &mut ctx, &repeat).unwrap();
        assert_eq!(stepper.index(), 1);
    }

    #[test]
    fn failed_dt_splices_a_midpoint() {
        let mut stepper = initialized(vec![], 0.0, 10.0);
        let mut state = StepState::new(0.0, 10.0, 1e-6, 100.0);
        let mut ctx = Context::new(&mut state, &());

        let failed = stepper.compute_failed_dt(&core(), &mut ctx).unwrap();
        assert_relative_eq!(failed, 5.0);
        assert_eq!(stepper.sequence(), [0.0, 5.0, 10.0]);
        assert_relative_eq!(stepper.compute_dt(&core(), &mut ctx).unwrap(), 5.0);
    }

    #[test]
    fn failed_dt_at_dt_min_is_fatal() {
        let mut stepper = initialized(vec![1e-6], 0.0, 1.0);
        let mut state = StepState::new(0.0, 1.0, 1e-6, 100.0);
        let result = stepper.compute_failed_dt(&core(), &mut Context::new(&mut state, &()));
        assert!(matches!(result, Err(Error::AtMinimumDt { .. })));
    }

    #[test]
    fn exhausted_sequence_is_an_error() {
        let mut stepper = initialized(vec![], 0.0, 1.0);
        let mut state = StepState::new(0.0, 1.0, 1e-6, 100.0);
        let mut ctx = Context::new(&mut state, &());
        stepper
            .verdict(&core(), &mut ctx, &SolveReport::converged(1, 1))
            .unwrap();
        assert!(matches!(
            stepper.compute_dt(&core(), &mut ctx),
            Err(Error::SequenceExhausted { .. })
        ));
    }

    #[test]
    fn extends_with_last_gap() {
        let mut stepper = TimeSequenceStepper::new("s", vec![1.0, 1.5], true).unwrap();
        let mut state = StepState::new(0.0, 2.8, 1e-6, 100.0);
        stepper
            .init(&core(), &mut Context::new(&mut state, &()))
            .unwrap();
        assert_eq!(stepper.sequence(), [0.0, 1.0, 1.5, 2.0, 2.5, 2.8]);
    }

    #[test]
    fn resumes_when_prefix_matches() {
        let mut stepper = initialized(vec![1.0, 2.0], 0.0, 4.0);
        let mut state = StepState::new(0.0, 4.0, 1e-6, 100.0);
        stepper
            .verdict(
                &core(),
                &mut Context::new(&mut state, &()),
                &SolveReport::converged(1, 1),
            )
            .unwrap();
        let checkpoint = stepper.checkpoint();

        let mut extended = TimeSequenceStepper::new("s", vec![1.0, 3.0], false).unwrap();
        extended.resume_from(checkpoint.clone());
        extended
            .init(&core(), &mut Context::new(&mut state, &()))
            .unwrap();
        assert_eq!(extended.index(), 1);
        assert_eq!(extended.sequence(), [0.0, 1.0, 3.0, 4.0]);

        let mut changed = TimeSequenceStepper::new("s", vec![1.5, 3.0], false).unwrap();
        changed.resume_from(checkpoint);
        let result = changed.init(&core(), &mut Context::new(&mut state, &()));
        assert!(matches!(result, Err(Error::SequenceMismatch { index: 1, .. })));
    }

    #[test]
    fn next_time_and_sync() {
        let mut stepper = initialized(vec![1.0, 2.0], 0.0, 4.0);
        assert_eq!(stepper.next_time_after(1.0, 1e-12), Some(2.0));
        assert_eq!(stepper.next_time_after(4.0, 1e-12), None);

        stepper.sync_to(2.5, 1e-12);
        assert_eq!(stepper.index(), 2);
    }

    #[test]
    fn reads_named_csv_column() {
        let dir = std::env::temp_dir().join("stride-sequence-named");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("times.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "step, time").unwrap();
        writeln!(file, "1, 0.5").unwrap();
        writeln!(file, "2, 1.25").unwrap();
        drop(file);

        let params = CsvTimeSequenceParams {
            file_name: path.clone(),
            column_name: Some("time".into()),
            column_index: None,
            delimiter: ',',
            header: true,
            use_last_dt_after_last_t: false,
        };
        let stepper = TimeSequenceStepper::from_csv("csv", &params).unwrap();
        assert_eq!(stepper.input, [0.5, 1.25]);

        let by_index = CsvTimeSequenceParams {
            column_name: None,
            column_index: Some(1),
            ..params.clone()
        };
        let stepper = TimeSequenceStepper::from_csv("csv", &by_index).unwrap();
        assert_eq!(stepper.input, [0.5, 1.25]);

        let missing = CsvTimeSequenceParams {
            column_name: Some("missing".into()),
            ..params
        };
        assert!(matches!(
            TimeSequenceStepper::from_csv("csv", &missing),
            Err(Error::SequenceColumn { .. })
        ));
    }

    #[test]
    fn missing_csv_file_is_an_error() {
        let params = CsvTimeSequenceParams {
            file_name: PathBuf::from("/nonexistent/stride/times.csv"),
            column_name: None,
            column_index: None,
            delimiter: ',',
            header: false,
            use_last_dt_after_last_t: false,
        };
        assert!(matches!(
            TimeSequenceStepper::from_csv("csv", &params),
            Err(Error::SequenceFile { .. })
        ));
    }
}
