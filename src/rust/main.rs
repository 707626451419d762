use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use labelflow::data::{columns, Dataset, ImageFolderSource, Record, TextFileSource};
use labelflow::evaluate::{evaluate, evaluate_scored};
use labelflow::trainers::{LogisticRegression, MaximumEntropy, TrainerStep};
use labelflow::transforms::{
    ExtractPixels, FeaturizeText, LoadImages, MapKeyToValue, MapValueToKey, OnnxScorerConfig,
    ResizeImages, ScoreOnnxModel,
};
use labelflow::{
    FittedChain, ImageSettings, ModelStore, PipelineContext, Predictor, TrainerOptions,
    TransformChain,
};

const DEFAULT_SENTENCES: [&str; 3] = [
    "This was a horrible meal",
    "I hate this",
    "I love this spaghetti",
];
const IMAGE_INPUT: &str = "input";
const PREDICTION: &str = "prediction";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Seed for every random decision of the run
    #[arg(long, global = true, default_value_t = labelflow::context::DEFAULT_SEED)]
    seed: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train and evaluate a binary sentiment classifier on a TSV file
    Sentiment(SentimentArgs),
    /// Classify images with a pretrained network as the feature extractor
    #[command(subcommand)]
    Images(ImagesCommand),
}

#[derive(Args)]
struct SentimentArgs {
    /// Headerless `text<TAB>0|1` file
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Save the fitted chain to this archive
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long, default_value_t = TrainerOptions::default().epochs)]
    epochs: usize,

    /// Sentences to classify after evaluation
    sentences: Vec<String>,
}

#[derive(Subcommand)]
enum ImagesCommand {
    /// Fit on a `<root>/<label>/*.jpg` tree and save the model
    Train(TrainArgs),
    /// Load a saved model and report predictions and metrics on a tree
    Validate(ValidateArgs),
    /// Train, then validate
    Run {
        #[command(flatten)]
        train: TrainArgs,
        #[arg(long)]
        validate: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long)]
    train: PathBuf,

    /// ONNX network used as the feature extractor
    #[arg(long)]
    network: PathBuf,

    #[arg(long, default_value = "input")]
    input_tensor: String,

    #[arg(long, default_value = "softmax2_pre_activation")]
    output_tensor: String,

    /// Archive path; defaults to the model store
    #[arg(long)]
    model: Option<PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long)]
    validate: PathBuf,

    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<()> {
    labelflow::init_logger();
    let cli = Cli::parse();
    let ctx = PipelineContext::new(cli.seed);

    match cli.command {
        Command::Sentiment(args) => run_sentiment(&ctx, args),
        Command::Images(ImagesCommand::Train(args)) => {
            train_images(&ctx, &args)?;
            Ok(())
        }
        Command::Images(ImagesCommand::Validate(args)) => {
            let model = resolve_model_path(args.model)?;
            validate_images(&ctx, &args.validate, &model)
        }
        Command::Images(ImagesCommand::Run { train, validate }) => {
            let model = train_images(&ctx, &train)?;
            validate_images(&ctx, &validate, &model)
        }
    }
}

fn resolve_model_path(model: Option<PathBuf>) -> Result<PathBuf> {
    match model {
        Some(path) => Ok(path),
        None => {
            let store = ModelStore::new_default().context("Failed to open the model store")?;
            Ok(store.model_path("images"))
        }
    }
}

fn run_sentiment(ctx: &PipelineContext, args: SentimentArgs) -> Result<()> {
    let source = TextFileSource::new(&args.data);
    let data = source.load()?;
    let split = ctx.train_test_split(&data, args.test_fraction)?;
    info!(
        "Loaded {} rows: {} for training, {} for testing",
        data.len(),
        split.train.len(),
        split.test.len()
    );

    let options = TrainerOptions {
        epochs: args.epochs,
        ..Default::default()
    };
    let chain = TransformChain::builder(TextFileSource::schema())
        .append(FeaturizeText::new(columns::FEATURES, columns::TEXT))?
        .append(TrainerStep::new(
            LogisticRegression::new(options),
            columns::LABEL,
            columns::FEATURES,
        ))?
        .build()?;

    println!("=============== Create and Train the Model ===============");
    let model = chain.fit(&split.train)?;
    println!("=============== End of training ===============");
    println!();

    println!("=============== Evaluating Model accuracy with Test data ===============");
    if split.test.is_empty() {
        println!("Test set is empty, skipping evaluation");
    } else {
        let metrics = evaluate(&model, &split.test, columns::LABEL, columns::PREDICTED_LABEL)?;
        println!();
        println!("{}", metrics);
    }
    println!("=============== End of model evaluation ===============");

    if let Some(path) = &args.model {
        model.save(path)?;
        println!("Saved model to \"{}\"", path.display());
    }

    let sentences: Vec<String> = if args.sentences.is_empty() {
        DEFAULT_SENTENCES.iter().map(|s| s.to_string()).collect()
    } else {
        args.sentences
    };
    let batch = Dataset::from_records(
        sentences
            .iter()
            .map(|s| Record::new().with(columns::TEXT, s.as_str()))
            .collect(),
    )?;

    println!();
    println!("=============== Predictions ===============");
    for prediction in Predictor::new(&model).predict(&batch)? {
        let prediction = prediction?;
        let text = prediction
            .record
            .get(columns::TEXT)
            .and_then(|v| v.as_text())
            .unwrap_or_default();
        let positive = prediction.predicted_label.as_bool().unwrap_or(false);
        println!(
            "Sentiment: {} | Prediction: {} | Probability: {} ",
            text,
            if positive { "Positive" } else { "Negative" },
            prediction.top_score()
        );
    }
    println!("=============== End of predictions ===============");
    Ok(())
}

fn image_chain(ctx: &PipelineContext, args: &TrainArgs) -> Result<TransformChain> {
    let settings = ImageSettings::default();
    let scorer = ScoreOnnxModel::new(
        OnnxScorerConfig {
            model_path: args.network.clone(),
            input_column: IMAGE_INPUT.to_string(),
            output_column: columns::FEATURES.to_string(),
            input_tensor: args.input_tensor.clone(),
            output_tensor: args.output_tensor.clone(),
            input_shape: settings.input_shape(),
        },
        ctx.runtime(),
    )
    .with_context(|| format!("Failed to load network {:?}", args.network))?;

    let chain = TransformChain::builder(ImageFolderSource::schema())
        .append(MapValueToKey::new(columns::LABEL, columns::LABEL).as_label())?
        .append(LoadImages::new(IMAGE_INPUT, columns::LOCATION))?
        .append(ResizeImages::from_settings(IMAGE_INPUT, IMAGE_INPUT, &settings)?)?
        .append(ExtractPixels::from_settings(IMAGE_INPUT, IMAGE_INPUT, &settings))?
        .append(scorer)?
        .append(TrainerStep::new(
            MaximumEntropy::default(),
            columns::LABEL,
            columns::FEATURES,
        ))?
        .append(MapKeyToValue::new(PREDICTION, columns::PREDICTED_LABEL))?
        .build()?;
    Ok(chain)
}

fn train_images(ctx: &PipelineContext, args: &TrainArgs) -> Result<PathBuf> {
    let start = Instant::now();

    let data = ImageFolderSource::new(&args.train).load()?;
    if data.is_empty() {
        bail!("No .jpg images found under {:?}", args.train);
    }
    let chain = image_chain(ctx, args)?;
    let model = chain.fit(&data)?;

    let model_path = resolve_model_path(args.model.clone())?;
    model.save(&model_path)?;

    println!("Took to train {}s", start.elapsed().as_secs_f64());
    println!("Saved model to \"{}\"", model_path.display());
    Ok(model_path)
}

fn validate_images(ctx: &PipelineContext, folder: &Path, model_path: &Path) -> Result<()> {
    let model = FittedChain::load(model_path, ctx.runtime())
        .with_context(|| format!("Failed to load model {:?}", model_path))?;
    let data = ImageFolderSource::new(folder).load()?;

    let predictions = Predictor::new(&model).predict(&data)?;
    let schema = predictions.output_schema().clone();
    let mut scored = Vec::with_capacity(data.len());
    for prediction in predictions {
        let prediction = prediction?;
        let location = prediction
            .record
            .get(columns::LOCATION)
            .and_then(|v| v.as_text())
            .unwrap_or_default();
        let label = prediction
            .record
            .get(PREDICTION)
            .and_then(|v| v.as_text().map(str::to_string))
            .or_else(|| prediction.predicted_text())
            .unwrap_or_default();
        println!("{}, {}, {}", location, label, prediction.top_score());
        scored.push(prediction.record);
    }

    let scored = Dataset::new(schema, scored)?;
    match evaluate_scored(&scored, columns::LABEL, columns::PREDICTED_LABEL) {
        Ok(metrics) => println!("{}", metrics),
        Err(labelflow::PipelineError::InsufficientData(reason)) => {
            println!("No metrics: {}", reason)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
