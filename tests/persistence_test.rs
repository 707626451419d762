use std::fs;

use labelflow::data::{columns, Dataset, Record, TextFileSource};
use labelflow::trainers::{LogisticRegression, MaximumEntropy, TrainerStep};
use labelflow::transforms::{FeaturizeText, MapKeyToValue, MapValueToKey};
use labelflow::{FittedChain, ModelError, Predictor, RuntimeConfig, TransformChain};
use ndarray::array;

fn sentiment_model() -> FittedChain {
    let rows = vec![
        Record::new().with("text", "great phone").with("label", true),
        Record::new().with("text", "love the battery").with("label", true),
        Record::new().with("text", "terrible screen").with("label", false),
        Record::new().with("text", "hate the case").with("label", false),
    ];
    let data = Dataset::new(TextFileSource::schema(), rows).unwrap();
    TransformChain::builder(TextFileSource::schema())
        .append(FeaturizeText::new(columns::FEATURES, columns::TEXT))
        .unwrap()
        .append(TrainerStep::new(
            LogisticRegression::default(),
            columns::LABEL,
            columns::FEATURES,
        ))
        .unwrap()
        .build()
        .unwrap()
        .fit(&data)
        .unwrap()
}

fn scores(model: &FittedChain, data: &Dataset) -> Vec<f32> {
    Predictor::new(model)
        .predict(data)
        .unwrap()
        .map(|p| p.unwrap().top_score())
        .collect()
}

#[test]
fn test_saved_chain_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sentiment.json");

    let model = sentiment_model();
    model.save(&path).unwrap();
    let loaded = FittedChain::load(&path, &RuntimeConfig::default()).unwrap();
    assert_eq!(loaded.step_names(), model.step_names());

    let batch = Dataset::from_records(vec![
        Record::new().with("text", "great battery"),
        Record::new().with("text", "terrible case"),
        Record::new().with("text", "unrelated words"),
    ])
    .unwrap();
    for (a, b) in scores(&model, &batch).iter().zip(scores(&loaded, &batch)) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_multiclass_chain_keeps_vocabulary() {
    let rows = vec![
        Record::new().with("features", array![1.0f32, 0.0]).with("label", "left"),
        Record::new().with("features", array![0.0f32, 1.0]).with("label", "right"),
    ];
    let data = Dataset::from_records(rows).unwrap();
    let model = TransformChain::builder(data.schema().clone())
        .append(MapValueToKey::new("label", "label").as_label())
        .unwrap()
        .append(TrainerStep::new(MaximumEntropy::default(), "label", "features"))
        .unwrap()
        .append(MapKeyToValue::new("prediction", columns::PREDICTED_LABEL))
        .unwrap()
        .build()
        .unwrap()
        .fit(&data)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("directions.json");
    model.save(&path).unwrap();
    let loaded = FittedChain::load(&path, &RuntimeConfig::default()).unwrap();

    let batch = Dataset::from_records(vec![Record::new().with("features", array![0.0f32, 5.0])]).unwrap();
    let result = Predictor::new(&loaded).predict(&batch).unwrap().next().unwrap().unwrap();
    assert_eq!(result.predicted_text().as_deref(), Some("right"));
    assert_eq!(
        result.record.get("prediction").and_then(|v| v.as_text()),
        Some("right")
    );
}

#[test]
fn test_corrupt_archive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let err = FittedChain::load(&path, &RuntimeConfig::default()).unwrap_err();
    assert!(matches!(err, ModelError::Serialization(_)));

    let missing = dir.path().join("missing.json");
    let err = FittedChain::load(&missing, &RuntimeConfig::default()).unwrap_err();
    assert!(matches!(err, ModelError::Io(_)));
}
