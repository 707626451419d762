use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageError, RgbImage};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::ImageSettings;
use crate::data::{Column, ColumnKind, Dataset, Record, Value};
use crate::pipeline::{
    field, wrong_kind, FittedTransform, Input, PipelineError, StepState, Transform,
};

const LOAD_IMAGES: &str = "LoadImages";
const RESIZE_IMAGES: &str = "ResizeImages";
const EXTRACT_PIXELS: &str = "ExtractPixels";

/// Decodes the image file named by a text column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadImages {
    output: String,
    input: String,
    image_folder: Option<PathBuf>,
}

impl LoadImages {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
            image_folder: None,
        }
    }

    /// Resolves relative locations against `folder`.
    pub fn with_image_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.image_folder = Some(folder.into());
        self
    }

    fn load(&self, location: &str) -> Result<RgbImage, PipelineError> {
        let path = match &self.image_folder {
            Some(folder) => folder.join(location),
            None => PathBuf::from(location),
        };
        let img = image::open(&path).map_err(|e| match e {
            ImageError::IoError(source) => PipelineError::io(&path, source),
            other => PipelineError::Image(other),
        })?;
        Ok(img.to_rgb8())
    }
}

impl Transform for LoadImages {
    fn name(&self) -> &str {
        LOAD_IMAGES
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Text)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Image)]
    }

    fn fit(&self, _data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(Box::new(self.clone()))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

impl FittedTransform for LoadImages {
    fn name(&self) -> &str {
        LOAD_IMAGES
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Text)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Image)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let img = match field(LOAD_IMAGES, record, &self.input)? {
            Value::Text(location) => self.load(location)?,
            other => return Err(wrong_kind(LOAD_IMAGES, &self.input, ColumnKind::Text, other)),
        };
        Ok(vec![(self.output.clone(), Value::Image(Arc::new(img)))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::LoadImages(self.clone()))
    }
}

/// Resizes an image column to a fixed width and height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeImages {
    output: String,
    input: String,
    width: u32,
    height: u32,
}

impl ResizeImages {
    /// # Errors
    /// - `InvalidArgument` if either dimension is zero
    pub fn new(
        output: impl Into<String>,
        input: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "Image size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            output: output.into(),
            input: input.into(),
            width,
            height,
        })
    }

    pub fn from_settings(
        output: impl Into<String>,
        input: impl Into<String>,
        settings: &ImageSettings,
    ) -> Result<Self, PipelineError> {
        Self::new(output, input, settings.width, settings.height)
    }
}

impl Transform for ResizeImages {
    fn name(&self) -> &str {
        RESIZE_IMAGES
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Image)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Image)]
    }

    fn fit(&self, _data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(Box::new(self.clone()))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

impl FittedTransform for ResizeImages {
    fn name(&self) -> &str {
        RESIZE_IMAGES
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Image)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Image)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let resized = match field(RESIZE_IMAGES, record, &self.input)? {
            Value::Image(img) if img.dimensions() == (self.width, self.height) => Arc::clone(img),
            Value::Image(img) => Arc::new(imageops::resize(
                &**img,
                self.width,
                self.height,
                FilterType::Triangle,
            )),
            other => return Err(wrong_kind(RESIZE_IMAGES, &self.input, ColumnKind::Image, other)),
        };
        Ok(vec![(self.output.clone(), Value::Image(resized))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::ResizeImages(self.clone()))
    }
}

/// Flattens an image column into `(pixel - offset) * scale` floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractPixels {
    output: String,
    input: String,
    offset: f32,
    scale: f32,
    channels_last: bool,
}

impl ExtractPixels {
    pub fn new(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            input: input.into(),
            offset: 0.0,
            scale: 1.0,
            channels_last: true,
        }
    }

    pub fn from_settings(
        output: impl Into<String>,
        input: impl Into<String>,
        settings: &ImageSettings,
    ) -> Self {
        Self::new(output, input)
            .with_offset(settings.offset)
            .with_scale(settings.scale)
            .channels_last(settings.channels_last)
    }

    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Interleave channels per pixel (`HWC`) instead of planar (`CHW`).
    pub fn channels_last(mut self, interleave: bool) -> Self {
        self.channels_last = interleave;
        self
    }

    fn extract(&self, img: &RgbImage) -> Array1<f32> {
        let convert = |v: u8| (v as f32 - self.offset) * self.scale;
        let n = (img.width() * img.height()) as usize;
        let mut out = Vec::with_capacity(n * 3);
        if self.channels_last {
            for pixel in img.pixels() {
                out.extend(pixel.0.iter().map(|&v| convert(v)));
            }
        } else {
            for channel in 0..3 {
                out.extend(img.pixels().map(|p| convert(p.0[channel])));
            }
        }
        Array1::from(out)
    }
}

impl Transform for ExtractPixels {
    fn name(&self) -> &str {
        EXTRACT_PIXELS
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::feature(&self.input, ColumnKind::Image)]
    }

    fn outputs(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn fit(&self, _data: &Dataset) -> Result<Box<dyn FittedTransform>, PipelineError> {
        Ok(Box::new(self.clone()))
    }

    fn learns_from_data(&self) -> bool {
        false
    }
}

impl FittedTransform for ExtractPixels {
    fn name(&self) -> &str {
        EXTRACT_PIXELS
    }

    fn inputs(&self) -> Vec<Column> {
        vec![Column::new(&self.input, ColumnKind::Image)]
    }

    fn output_columns(&self) -> Vec<Column> {
        vec![Column::new(&self.output, ColumnKind::Vector)]
    }

    fn apply(&self, record: &Record) -> Result<Vec<(String, Value)>, PipelineError> {
        let pixels = match field(EXTRACT_PIXELS, record, &self.input)? {
            Value::Image(img) => self.extract(img),
            other => return Err(wrong_kind(EXTRACT_PIXELS, &self.input, ColumnKind::Image, other)),
        };
        Ok(vec![(self.output.clone(), Value::Vector(pixels))])
    }

    fn state(&self) -> Result<StepState, PipelineError> {
        Ok(StepState::ExtractPixels(self.clone()))
    }
}
