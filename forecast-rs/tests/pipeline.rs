//! End-to-end runs with stub predictors.

use ash_forecast::{
    BatchForecaster, FeatureConfig, ForecastConfig, ForecastError, ModelBundle, Predictor,
    RecordPolicy,
};
use ndarray::ArrayView2;
use std::sync::{Arc, Mutex};

/// Always predicts the same value.
struct Constant(f64);

impl Predictor for Constant {
    fn predict(&self, features: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
        Ok(vec![self.0; features.nrows()])
    }
}

/// Records the shape of every batch it receives.
struct Recording {
    shapes: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl Predictor for Recording {
    fn predict(&self, features: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
        self.shapes.lock().unwrap().push(features.dim());
        Ok(features.column(0).to_vec())
    }
}

fn stub_bundle() -> ModelBundle {
    // Inserted out of order on purpose.
    ModelBundle::new(vec![
        ("b".to_string(), Box::new(Constant(1.0)) as Box<dyn Predictor>),
        ("a".to_string(), Box::new(Constant(2.0)) as Box<dyn Predictor>),
    ])
    .unwrap()
}

fn history_literal(len: usize, value: i64) -> String {
    let values: Vec<String> = (0..len).map(|_| value.to_string()).collect();
    format!("\"[{}]\"", values.join(", "))
}

fn run(bundle: &ModelBundle, config: &ForecastConfig, input: &str) -> ash_forecast::Result<String> {
    let forecaster = BatchForecaster::new(bundle, config)?;
    let mut out = Vec::new();
    forecaster.run(input.as_bytes(), &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn test_sorted_targets_with_default_layout() {
    let bundle = stub_bundle();
    let history = history_literal(20160, 3);
    let input = format!(
        "datetime,history\n2023-01-02 10:00:00,{h}\n2023-01-02 10:01:00,{h}\n",
        h = history
    );

    let output = run(&bundle, &ForecastConfig::default(), &input).unwrap();

    assert_eq!(
        output,
        "datetime,target_a,target_b\n\
         2023-01-02 10:00:00,2.0,1.0\n\
         2023-01-02 10:01:00,2.0,1.0\n"
    );
}

#[test]
fn test_row_count_and_order() {
    let bundle = stub_bundle();
    let config = ForecastConfig {
        features: FeatureConfig {
            shifts: vec![3, 5],
            windows: vec![3, 5],
            ..FeatureConfig::default()
        },
        ..ForecastConfig::default()
    };

    let timestamps = [
        "2023-03-01 23:59:59",
        "2023-01-01 00:00:00",
        "2023-02-15 12:30:00",
        "2023-02-15 12:29:00",
    ];
    let mut input = String::from("legend\n");
    for ts in &timestamps {
        input.push_str(&format!("{},[1, 2, 3, 4, 5]\n", ts));
    }

    let output = run(&bundle, &config, &input).unwrap();
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines.len(), timestamps.len() + 1);
    for (line, ts) in lines[1..].iter().zip(timestamps.iter()) {
        assert_eq!(line.split(',').next().unwrap(), *ts);
    }
}

#[test]
fn test_each_model_sees_whole_batch() {
    let shapes_a = Arc::new(Mutex::new(Vec::new()));
    let shapes_b = Arc::new(Mutex::new(Vec::new()));
    let bundle = ModelBundle::new(vec![
        (
            "x".to_string(),
            Box::new(Recording {
                shapes: shapes_a.clone(),
            }) as Box<dyn Predictor>,
        ),
        (
            "y".to_string(),
            Box::new(Recording {
                shapes: shapes_b.clone(),
            }) as Box<dyn Predictor>,
        ),
    ])
    .unwrap();

    // alpha 1 leaves the history untouched, so sums are exact
    let mut config = ForecastConfig {
        features: FeatureConfig {
            shifts: vec![3],
            windows: vec![3],
            ..FeatureConfig::default()
        },
        ..ForecastConfig::default()
    };
    config.smoothing.alpha = 1.0;

    let mut input = String::from("header\n");
    for i in 0..25 {
        input.push_str(&format!("2023-01-02 00:{i:02}:00,[{i}, {i}, {i}]\n"));
    }

    let output = run(&bundle, &config, &input).unwrap();

    assert_eq!(*shapes_a.lock().unwrap(), vec![(25, 13)]);
    assert_eq!(*shapes_b.lock().unwrap(), vec![(25, 13)]);

    // First feature is the last-3 sum of a constant history.
    let last = output.lines().last().unwrap();
    assert_eq!(last, "2023-01-02 00:24:00,72.0,72.0");
}

#[test]
fn test_short_history_fails_fast() {
    let bundle = stub_bundle();
    let input = format!(
        "header\n2023-01-02 10:00:00,{}\n2023-01-02 10:01:00,{}\n",
        history_literal(20160, 1),
        history_literal(20159, 1)
    );

    let err = run(&bundle, &ForecastConfig::default(), &input).unwrap_err();
    match err {
        ForecastError::Record { line, cause } => {
            assert_eq!(line, 3);
            assert!(matches!(
                *cause,
                ForecastError::InsufficientHistory {
                    len: 20159,
                    required: 20160
                }
            ));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_malformed_record_fails_fast() {
    let bundle = stub_bundle();
    let config = ForecastConfig {
        features: FeatureConfig {
            shifts: vec![3],
            windows: vec![3],
            ..FeatureConfig::default()
        },
        ..ForecastConfig::default()
    };
    let input = "header\n2023-01-02 10:00:00,[1, 2, 3]\n02/01/2023 10:01,[1, 2, 3]\n";

    let err = run(&bundle, &config, input).unwrap_err();
    assert!(matches!(err, ForecastError::Parse { line: 3, .. }));
    assert!(err.to_string().contains("02/01/2023 10:01"));
}

#[test]
fn test_skip_policy_keeps_rows_aligned() {
    let bundle = stub_bundle();
    let mut config = ForecastConfig {
        features: FeatureConfig {
            shifts: vec![3],
            windows: vec![3],
            ..FeatureConfig::default()
        },
        ..ForecastConfig::default()
    };
    config.records.policy = RecordPolicy::Skip;

    let input = "header\n\
                 2023-01-02 10:00:00,[1, 2, 3]\n\
                 2023-01-02 10:01:00,[1, 2]\n\
                 2023-01-02 10:02:00,[1, 2, 3]\n";

    let output = run(&bundle, &config, input).unwrap();
    assert_eq!(
        output,
        "datetime,target_a,target_b\n\
         2023-01-02 10:00:00,2.0,1.0\n\
         2023-01-02 10:02:00,2.0,1.0\n"
    );
}

#[test]
fn test_empty_input_writes_header() {
    let bundle = stub_bundle();
    let output = run(&bundle, &ForecastConfig::default(), "").unwrap();
    assert_eq!(output, "datetime,target_a,target_b\n");
}
