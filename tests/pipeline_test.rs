use labelflow::data::{columns, Column, ColumnKind, Dataset, Record, Schema, TextFileSource, Value};
use labelflow::trainers::{LogisticRegression, MaximumEntropy, TrainerStep};
use labelflow::transforms::{FeaturizeText, MapKeyToValue, MapValueToKey, NormalizeLpNorm};
use labelflow::{evaluate, PipelineError, Predictor, TransformChain};
use ndarray::array;

fn reviews() -> Dataset {
    let rows = [
        ("I love this phone", true),
        ("great sound and great battery", true),
        ("works great, love it", true),
        ("excellent value", true),
        ("terrible screen", false),
        ("I hate the case", false),
        ("broke after a week, terrible", false),
        ("awful battery", false),
    ]
    .iter()
    .map(|&(text, label)| Record::new().with("text", text).with("label", label))
    .collect();
    Dataset::new(TextFileSource::schema(), rows).unwrap()
}

fn sentiment_chain() -> TransformChain {
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
}

#[test]
fn test_append_rejects_missing_column() {
    let err = TransformChain::builder(TextFileSource::schema())
        .append(TrainerStep::new(LogisticRegression::default(), "label", "features"))
        .unwrap_err();
    match err {
        PipelineError::SchemaMismatch { step, column, .. } => {
            assert_eq!(step, "LogisticRegression");
            assert_eq!(column, "features");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_append_rejects_wrong_kind() {
    let err = TransformChain::builder(TextFileSource::schema())
        .append(FeaturizeText::new("features", "label"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { ref column, .. } if column == "label"));
}

#[test]
fn test_build_rejects_empty_chain() {
    let result = TransformChain::builder(TextFileSource::schema()).build();
    assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
}

#[test]
fn test_fit_rejects_empty_training_set() {
    let empty = Dataset::new(TextFileSource::schema(), vec![]).unwrap();
    let err = sentiment_chain().fit(&empty).unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
}

#[test]
fn test_apply_is_repeatable_and_leaves_input_alone() {
    let data = reviews();
    let model = sentiment_chain().fit(&data).unwrap();

    let first = model.apply(&data).unwrap();
    let second = model.apply(&data).unwrap();
    assert_eq!(first.rows(), second.rows());
    assert_eq!(data.schema(), &TextFileSource::schema());
    assert!(data.rows().iter().all(|r| !r.contains(columns::FEATURES)));
    assert!(first.schema().contains(columns::PROBABILITY));
}

#[test]
fn test_sentiment_fits_training_data() {
    let data = reviews();
    let model = sentiment_chain().fit(&data).unwrap();
    let metrics = evaluate(&model, &data, columns::LABEL, columns::PREDICTED_LABEL).unwrap();
    let binary = metrics.as_binary().unwrap();
    assert_eq!(binary.accuracy, 1.0);
    assert_eq!(binary.auc, Some(1.0));
    assert!(metrics.log_loss().is_finite());
}

#[test]
fn test_predict_unlabeled_sentences() {
    let model = sentiment_chain().fit(&reviews()).unwrap();
    let batch = Dataset::from_records(vec![
        Record::new().with("text", "I love it"),
        Record::new().with("text", "terrible, I hate it"),
    ])
    .unwrap();

    let results = Predictor::new(&model)
        .predict(&batch)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].predicted_label, Value::Bool(true));
    assert_eq!(results[1].predicted_label, Value::Bool(false));
    assert!(results[0].top_score() > 0.5);
    assert!(results[1].top_score() < 0.5);
}

fn animals() -> (Schema, Dataset) {
    let schema = Schema::new(vec![
        Column::new("features", ColumnKind::Vector),
        Column::new("label", ColumnKind::Text),
    ]);
    let rows = vec![
        Record::new().with("features", array![1.0f32, 0.0, 0.0]).with("label", "dog"),
        Record::new().with("features", array![0.9f32, 0.1, 0.0]).with("label", "dog"),
        Record::new().with("features", array![0.0f32, 1.0, 0.0]).with("label", "cat"),
        Record::new().with("features", array![0.1f32, 0.9, 0.0]).with("label", "cat"),
        Record::new().with("features", array![0.0f32, 0.0, 1.0]).with("label", "bird"),
        Record::new().with("features", array![0.0f32, 0.1, 0.9]).with("label", "bird"),
    ];
    let data = Dataset::new(schema.clone(), rows).unwrap();
    (schema, data)
}

fn animal_chain(schema: Schema) -> TransformChain {
    TransformChain::builder(schema)
        .append(MapValueToKey::new("label", "label").as_label())
        .unwrap()
        .append(NormalizeLpNorm::new("features", "features"))
        .unwrap()
        .append(TrainerStep::new(MaximumEntropy::default(), "label", "features"))
        .unwrap()
        .append(MapKeyToValue::new("prediction", columns::PREDICTED_LABEL))
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_multiclass_chain_skips_label_step_on_unlabeled_data() {
    let (schema, data) = animals();
    let model = animal_chain(schema).fit(&data).unwrap();

    let unlabeled = Dataset::from_records(vec![
        Record::new().with("features", array![0.0f32, 0.0, 2.0]),
        Record::new().with("features", array![3.0f32, 0.0, 0.0]),
    ])
    .unwrap();
    let results = Predictor::new(&model)
        .predict(&unlabeled)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(results[0].predicted_text().as_deref(), Some("bird"));
    assert_eq!(
        results[1].record.get("prediction").and_then(|v| v.as_text()),
        Some("dog")
    );
    match &results[0].score {
        labelflow::Score::Multiclass(scores) => assert_eq!(scores.len(), 3),
        other => panic!("unexpected score {:?}", other),
    }
}

#[test]
fn test_multiclass_metrics_follow_vocabulary() {
    let (schema, data) = animals();
    let model = animal_chain(schema).fit(&data).unwrap();
    let metrics = evaluate(&model, &data, "label", columns::PREDICTED_LABEL).unwrap();
    let multiclass = metrics.as_multiclass().unwrap();
    assert_eq!(multiclass.class_names, vec!["bird", "cat", "dog"]);
    assert_eq!(multiclass.per_class_log_loss.len(), 3);
    assert_eq!(multiclass.micro_accuracy, 1.0);
    assert!(multiclass.log_loss_reduction > 0.0);
}

#[test]
fn test_feature_step_without_input_fails_at_apply() {
    let model = sentiment_chain().fit(&reviews()).unwrap();
    let wrong = Dataset::from_records(vec![Record::new().with("comment", "hello")]).unwrap();
    let err = model.apply(&wrong).unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { ref column, .. } if column == "text"));
}
