//! Records, schemas, datasets and the sources that produce them.

mod dataset;
mod source;
mod split;
mod value;

pub use dataset::Dataset;
pub use source::{ImageFolderSource, ImageRecords, TextFileSource, TextRecords};
pub use split::{train_test_split, Split};
pub use value::{Column, ColumnKind, Record, Schema, Value};

/// Column names shared by the sources, transforms and trainers.
pub mod columns {
    pub const TEXT: &str = "text";
    pub const LOCATION: &str = "location";
    pub const LABEL: &str = "label";
    pub const FEATURES: &str = "features";
    pub const PREDICTED_LABEL: &str = "predicted_label";
    pub const SCORE: &str = "score";
    pub const PROBABILITY: &str = "probability";
}
