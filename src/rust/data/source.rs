use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::vec;

use log::{debug, info};

use super::columns::{LABEL, LOCATION, TEXT};
use super::dataset::Dataset;
use super::value::{Column, ColumnKind, Record, Schema};
use crate::pipeline::PipelineError;

/// Reads labeled images from a `<root>/<label>/*.jpg` directory tree.
///
/// Every immediate subdirectory of the root is a label; every `.jpg` file in
/// it becomes one `{location, label}` record. Directories and files are
/// visited in name order so repeated loads yield the same sequence.
#[derive(Debug, Clone)]
pub struct ImageFolderSource {
    root: PathBuf,
}

impl ImageFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema() -> Schema {
        Schema::new(vec![
            Column::new(LOCATION, ColumnKind::Text),
            Column::new(LABEL, ColumnKind::Text),
        ])
    }

    /// Returns a lazy iterator over the records of the tree.
    ///
    /// # Errors
    /// - `Io` if the root directory cannot be listed
    pub fn records(&self) -> Result<ImageRecords, PipelineError> {
        let mut label_dirs = Vec::new();
        for entry in read_dir_sorted(&self.root)? {
            if entry.is_dir() {
                let label = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                label_dirs.push((label, entry));
            }
        }
        debug!("Found {} label folders under {:?}", label_dirs.len(), self.root);

        Ok(ImageRecords {
            label_dirs: label_dirs.into(),
            label: String::new(),
            files: Vec::new().into_iter(),
        })
    }

    /// Loads the whole tree into a dataset. No partial dataset is returned if
    /// any directory fails to read.
    pub fn load(&self) -> Result<Dataset, PipelineError> {
        let rows = self.records()?.collect::<Result<Vec<_>, _>>()?;
        info!("Loaded {} images from {:?}", rows.len(), self.root);
        Ok(Dataset::from_parts(Self::schema(), rows))
    }
}

/// Lazy walk over an image folder tree.
#[derive(Debug)]
pub struct ImageRecords {
    label_dirs: VecDeque<(String, PathBuf)>,
    label: String,
    files: vec::IntoIter<PathBuf>,
}

impl Iterator for ImageRecords {
    type Item = Result<Record, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.files.next() {
                let location = match fs::canonicalize(&file) {
                    Ok(path) => path,
                    Err(e) => return Some(Err(PipelineError::io(file, e))),
                };
                return Some(Ok(Record::new()
                    .with(LOCATION, location.to_string_lossy().into_owned())
                    .with(LABEL, self.label.clone())));
            }

            let (label, dir) = self.label_dirs.pop_front()?;
            let files = match read_dir_sorted(&dir) {
                Ok(entries) => entries.into_iter().filter(|p| is_jpeg(p)).collect::<Vec<_>>(),
                Err(e) => return Some(Err(e)),
            };
            self.label = label;
            self.files = files.into_iter();
        }
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| PipelineError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::io(dir, e))?;
    entries.sort();
    Ok(entries)
}

fn is_jpeg(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jpg"))
            .unwrap_or(false)
}

/// Reads `{text, label}` records from a headerless delimited text file.
///
/// Column 0 holds the text and column 1 the boolean label (`1`, `0`,
/// `true` or `false`). Blank lines are skipped.
#[derive(Debug, Clone)]
pub struct TextFileSource {
    path: PathBuf,
    delimiter: char,
}

impl TextFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: '\t',
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema() -> Schema {
        Schema::new(vec![
            Column::new(TEXT, ColumnKind::Text),
            Column::new(LABEL, ColumnKind::Bool),
        ])
    }

    /// Opens the file and returns a lazy iterator over its records. Each call
    /// reopens the file, so the sequence can be restarted.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    pub fn records(&self) -> Result<TextRecords, PipelineError> {
        let file = File::open(&self.path).map_err(|e| PipelineError::io(&self.path, e))?;
        Ok(TextRecords {
            path: self.path.clone(),
            delimiter: self.delimiter,
            lines: BufReader::new(file).lines(),
            line: 0,
        })
    }

    pub fn load(&self) -> Result<Dataset, PipelineError> {
        let rows = self.records()?.collect::<Result<Vec<_>, _>>()?;
        info!("Loaded {} rows from {:?}", rows.len(), self.path);
        Ok(Dataset::from_parts(Self::schema(), rows))
    }
}

/// Lazy line-by-line reader behind [`TextFileSource::records`].
#[derive(Debug)]
pub struct TextRecords {
    path: PathBuf,
    delimiter: char,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl TextRecords {
    fn parse(&self, raw: &str) -> Result<Record, PipelineError> {
        let mut columns = raw.split(self.delimiter);
        let text = columns.next().unwrap_or_default();
        let label = columns.next().ok_or_else(|| self.parse_error("missing label column"))?;
        let label = parse_label(label.trim())
            .ok_or_else(|| self.parse_error(&format!("invalid label '{}'", label.trim())))?;
        Ok(Record::new().with(TEXT, text).with(LABEL, label))
    }

    fn parse_error(&self, message: &str) -> PipelineError {
        PipelineError::Parse {
            path: self.path.clone(),
            line: self.line,
            message: message.to_string(),
        }
    }
}

impl Iterator for TextRecords {
    type Item = Result<Record, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(PipelineError::io(&self.path, e))),
            };
            self.line += 1;
            let raw = raw.trim_end_matches('\r');
            if raw.trim().is_empty() {
                continue;
            }
            return Some(self.parse(raw));
        }
    }
}

fn parse_label(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_forms() {
        assert_eq!(parse_label("1"), Some(true));
        assert_eq!(parse_label("FALSE"), Some(false));
        assert_eq!(parse_label("maybe"), None);
    }

    #[test]
    fn test_missing_root_fails_immediately() {
        let source = ImageFolderSource::new("/definitely/not/here");
        assert!(matches!(source.records(), Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_missing_text_file_fails_immediately() {
        let source = TextFileSource::new("/definitely/not/here.tsv");
        assert!(matches!(source.load(), Err(PipelineError::Io { .. })));
    }
}
