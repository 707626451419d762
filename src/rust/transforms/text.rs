use std::collections::BTreeMap;
use std::iter;

use log::{debug, info};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{
    NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer,
};

use crate::data::{Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};
use crate::utils::normalize_vector;

const START_MARKER: char = '\u{2}';
const END_MARKER: char = '\u{3}';

/// Settings for [`FeaturizeText`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFeaturizerOptions {
    /// Longest word n-gram; 0 disables word features
    pub word_ngram_length: usize,
    /// Character n-gram length; 0 disables character features
    pub char_ngram_length: usize,
    pub lowercase: bool,
    /// Keep only the most frequent terms when set
    pub max_terms: Option<usize>,
}

impl Default for TextFeaturizerOptions {
    fn default() -> Self {
        Self {
            word_ngram_length: 2,
            char_ngram_length: 3,
            lowercase: true,
            max_terms: None,
        }
    }
}

/// Turns a text column into a normalized bag of word and character n-grams.
///
/// Text is cleaned and split with a Bert-style normalizer and pre-tokenizer.
/// The term vocabulary is learned from the training data; terms never seen
/// while fitting are ignored at apply time.
#[derive(Debug, Clone)]
pub struct FeaturizeText {
    output: String,
    input: String,
    options: TextFeaturizerOptions,
}

impl FeaturizeText {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
            options: TextFeaturizerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TextFeaturizerOptions) -> Self {
        self.options = options;
        self
    }
}

impl Transform for FeaturizeText {
    fn name(&self) -> &str {
        "FeaturizeText"
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Text)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn fit(&self, data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        if self.options.word_ngram_length == 0 && self.options.char_ngram_length == 0 {
            return Err(PipelineError::InvalidArgument(
                "FeaturizeText needs word or character n-grams enabled".into(),
            ));
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for value in data.column(&self.input)? {
            let text = match value {
                Value::Text(s) => s,
                Value::Missing => continue,
                other => return Err(wrong_kind(self.name(), &self.input, ColumnKind::Text, other)),
            };
            for term in extract_terms(text, &self.options)? {
                *counts.entry(term).or_insert(0) += 1;
            }
        }

        let mut vocabulary: Vec<String> = match self.options.max_terms {
            Some(max) if counts.len() > max => {
                let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                ranked.truncate(max);
                ranked.into_iter().map(|(term, _)| term).collect()
            }
            _ => counts.into_keys().collect(),
        };
        vocabulary.sort();

        if vocabulary.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "No terms found in column '{}'",
                self.input
            )));
        }
        info!("Text vocabulary for '{}': {} terms", self.input, vocabulary.len());

        Ok(Box::new(FittedTextFeaturizer {
            output: self.output.clone(),
            input: self.input.clone(),
            options: self.options.clone(),
            vocabulary,
        }))
    }
}

/// Fitted [`FeaturizeText`] with its frozen, sorted vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedTextFeaturizer {
    output: String,
    input: String,
    options: TextFeaturizerOptions,
    vocabulary: Vec<String>,
}

impl FittedTextFeaturizer {
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Featurizes a single piece of text.
    pub fn featurize(&self, text: &str) -> Result<Array1<f32>, PipelineError> {
        let mut features = Array1::<f32>::zeros(self.vocabulary.len());
        for term in extract_terms(text, &self.options)? {
            if let Ok(i) = self.vocabulary.binary_search(&term) {
                features[i] += 1.0;
            }
        }
        Ok(normalize_vector(&features))
    }
}

impl FittedTransform for FittedTextFeaturizer {
    fn name(&self) -> &str {
        "FeaturizeText"
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Text)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let features = match field(self.name(), record, &self.input)? {
            Value::Text(s) => self.featurize(s)?,
            Value::Missing => Array1::zeros(self.vocabulary.len()),
            other => return Err(wrong_kind(self.name(), &self.input, ColumnKind::Text, other)),
        };
        Ok(vec![(self.output.clone(), Value::Vector(features))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::FeaturizeText(self.clone()))
    }
}

/// Splits `text` into prefixed word n-gram (`w:`) and character n-gram (`c:`)
/// terms.
fn extract_terms(text: &str, options: &TextFeaturizerOptions) -> Result<Vec<String>, PipelineError> {
    let mut normalized = NormalizedString::from(text);
    BertNormalizer::new(true, true, None, options.lowercase)
        .normalize(&mut normalized)
        .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
    let normalized = normalized.get().to_string();

    let mut pretokenized = PreTokenizedString::from(normalized.as_str());
    BertPreTokenizer
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
    let words: Vec<String> = pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(word, _, _)| word.to_string())
        .collect();

    let mut terms = Vec::new();
    for n in 1..=options.word_ngram_length {
        for window in words.windows(n) {
            terms.push(format!("w:{}", window.join(" ")));
        }
    }

    let n = options.char_ngram_length;
    if n > 0 {
        let chars: Vec<char> = iter::once(START_MARKER)
            .chain(normalized.chars())
            .chain(iter::once(END_MARKER))
            .collect();
        for window in chars.windows(n) {
            let mut term = String::with_capacity(2 + n * 4);
            term.push_str("c:");
            term.extend(window.iter());
            terms.push(term);
        }
    }

    debug!("Extracted {} terms from {} words", terms.len(), words.len());
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Dataset {
        Dataset::from_records(texts.iter().map(|t| Record::new().with("text", *t)).collect())
            .unwrap()
    }

    #[test]
    fn test_terms_are_lowercased_and_split_on_punctuation() {
        let terms = extract_terms("Great, PRODUCT!", &TextFeaturizerOptions::default()).unwrap();
        assert!(terms.contains(&"w:great".to_string()));
        assert!(terms.contains(&"w:product".to_string()));
        assert!(terms.contains(&"w:,".to_string()));
        assert!(terms.contains(&"c:gre".to_string()));
    }

    #[test]
    fn test_word_bigrams() {
        let options = TextFeaturizerOptions {
            char_ngram_length: 0,
            ..Default::default()
        };
        let terms = extract_terms("not good", &options).unwrap();
        assert_eq!(terms, vec!["w:not", "w:good", "w:not good"]);
    }

    #[test]
    fn test_features_are_unit_length() {
        let step = FeaturizeText::new("features", "text");
        let fitted = step.fit(&corpus(&["great product", "terrible"])).unwrap();
        let out = fitted.apply(&Record::new().with("text", "great")).unwrap();
        let v = out[0].1.as_vector().unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_terms_yield_zero_vector() {
        let options = TextFeaturizerOptions {
            char_ngram_length: 0,
            ..Default::default()
        };
        let fitted = FeaturizeText::new("features", "text")
            .with_options(options)
            .fit(&corpus(&["alpha beta"]))
            .unwrap();
        let out = fitted.apply(&Record::new().with("text", "gamma")).unwrap();
        assert!(out[0].1.as_vector().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_max_terms_caps_vocabulary() {
        let options = TextFeaturizerOptions {
            char_ngram_length: 0,
            word_ngram_length: 1,
            max_terms: Some(1),
            ..Default::default()
        };
        let step = FeaturizeText::new("features", "text").with_options(options);
        let fitted = step.fit(&corpus(&["a b", "a c", "a"])).unwrap();
        match fitted.state().unwrap() {
            StepState::FeaturizeText(f) => assert_eq!(f.vocabulary(), &["w:a".to_string()]),
            other => panic!("unexpected state {:?}", other),
        }
    }
}
