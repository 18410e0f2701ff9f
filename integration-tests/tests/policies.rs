use std::path::PathBuf;

use approx::assert_relative_eq;
use integration_tests::DecaySolver;
use stride_steppers::{
    Ab2Params, CsvTimeSequenceParams, LogConstantParams, PolicyParams, PostprocessorParams,
    StepperConfig, TimeSequenceParams, TimeStepperSystem,
};
use stride_transient::{Event, ExecutionerConfig, Status, Transient};

fn system(params: PolicyParams) -> TimeStepperSystem {
    TimeStepperSystem::from_stepper_config("stepper", &StepperConfig::from(params))
        .expect("stepper should build")
}

fn transient(start_time: f64, end_time: f64) -> Transient {
    Transient::new(ExecutionerConfig {
        start_time,
        end_time,
        dt_min: 1e-6,
        ..ExecutionerConfig::default()
    })
    .expect("executioner should build")
}

fn times(solution: &stride_transient::Solution) -> Vec<f64> {
    solution.history.iter().map(|record| record.time).collect()
}

#[test]
fn csv_sequence_is_followed_exactly() {
    let file_name: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "data", "output_times.csv"]
        .iter()
        .collect();
    let mut system = system(PolicyParams::CsvTimeSequence(CsvTimeSequenceParams {
        file_name,
        column_name: Some("time".into()),
        column_index: None,
        delimiter: ',',
        header: true,
        use_last_dt_after_last_t: false,
    }));

    let solution = transient(0.0, 2.0)
        .run_unobserved(&mut system, &mut DecaySolver::new(1.0, 1.0, 10))
        .unwrap();

    assert_eq!(solution.status, Status::Complete);
    assert_eq!(times(&solution), [0.25, 1.0, 1.75, 2.0]);
}

#[test]
fn sequence_continues_with_the_last_gap() {
    let mut system = system(PolicyParams::TimeSequence(TimeSequenceParams {
        time_sequence: vec![0.0, 0.5, 0.75],
        use_last_dt_after_last_t: true,
    }));

    let solution = transient(0.0, 1.6)
        .run_unobserved(&mut system, &mut DecaySolver::new(1.0, 1.0, 10))
        .unwrap();

    let times = times(&solution);
    let expected = [0.5, 0.75, 1.0, 1.25, 1.5, 1.6];
    assert_eq!(times.len(), expected.len());
    for (time, expected) in times.iter().zip(expected) {
        assert_relative_eq!(*time, expected, epsilon = 1e-12);
    }
}

#[test]
fn failed_sequence_step_is_split() {
    let mut system = system(PolicyParams::TimeSequence(TimeSequenceParams {
        time_sequence: vec![1.0, 2.0],
        use_last_dt_after_last_t: false,
    }));

    // Steps above 0.6 fail; the first gap of 1.0 is split at the cutback point.
    let solution = transient(0.0, 2.0)
        .run_unobserved(&mut system, &mut DecaySolver::new(1.0, 0.1, 6))
        .unwrap();

    assert_eq!(solution.status, Status::Complete);
    assert!(solution.failures > 0);
    let times = times(&solution);
    assert_relative_eq!(times[0], 0.5);
    assert!(times.iter().any(|&t| (t - 1.0).abs() < 1e-12));
    assert_relative_eq!(solution.final_time(), 2.0);
}

#[test]
fn postprocessor_drives_the_step() {
    let mut system = system(PolicyParams::Postprocessor(PostprocessorParams {
        postprocessor: "u".into(),
        dt: Some(0.1),
        scale: 0.5,
        offset: 0.0,
    }));

    let solution = transient(0.0, 2.0)
        .run_unobserved(&mut system, &mut DecaySolver::new(1.0, 1.0, 10))
        .unwrap();

    assert_eq!(solution.status, Status::Complete);
    let dts: Vec<f64> = solution.history.iter().map(|record| record.dt).collect();
    assert_relative_eq!(dts[0], 0.1);
    assert_relative_eq!(dts[1], 0.5 / 1.1, epsilon = 1e-12);
    assert!(dts[1..].windows(2).all(|pair| pair[1] <= pair[0]));
}

#[test]
fn log_constant_spacing() {
    let mut system = system(PolicyParams::LogConstant(LogConstantParams {
        first_dt: 0.1,
        log_dt: 0.1,
        growth_factor: 2.0,
    }));

    let solution = transient(1.0, 10.0)
        .run_unobserved(&mut system, &mut DecaySolver::new(0.1, 10.0, 10))
        .unwrap();

    let times = times(&solution);
    assert_relative_eq!(times[0], 1.1);
    // Growth from the first dt is capped at a factor of 2.
    assert_relative_eq!(times[1], 1.3, epsilon = 1e-12);
    let ratio = 10f64.powf(0.1);
    for pair in times[1..times.len() - 1].windows(2) {
        assert_relative_eq!(pair[1] / pair[0], ratio, epsilon = 1e-9);
    }
    assert_relative_eq!(solution.final_time(), 10.0);
}

#[test]
fn ab2_adapts_to_a_smooth_solution() {
    let mut system = system(PolicyParams::Ab2PredictorCorrector(Ab2Params {
        dt: 0.05,
        e_tol: 1e-3,
        e_max: 1.0,
        max_increase: 1.5,
        steps_between_increase: 1,
        start_adapting: 2,
        scaling_parameter: 0.8,
    }));

    let mut events = Vec::new();
    let solution = transient(0.0, 2.0)
        .run(
            &mut system,
            &mut DecaySolver::new(1.0, 10.0, 10),
            |event: &Event| {
                events.push(*event);
                None
            },
        )
        .unwrap();

    assert_eq!(solution.status, Status::Complete);
    assert_relative_eq!(solution.final_time(), 2.0, epsilon = 1e-9);
    let dts: Vec<f64> = solution.history.iter().map(|record| record.dt).collect();
    assert_relative_eq!(dts[0], 0.05);
    assert_relative_eq!(dts[1], 0.05);
    assert!(dts.iter().any(|&dt| dt > 0.05));
    assert_eq!(events.len(), solution.history.len() + solution.failures + 1);
}
