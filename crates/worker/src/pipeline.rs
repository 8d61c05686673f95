//! CPU-bound half of a job: decode, classify, select, annotate, encode
//!
//! Runs synchronously on a blocking thread; every failure comes back as a
//! per-job error.

use crate::annotate::annotate;
use crate::classifier::{select, Classifier};
use crate::engine::ImageTensor;
use crate::job::ClassifiedImage;
use cocoserve_common::{CocoError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

/// JPEG quality of annotated output
pub const JPEG_QUALITY: u8 = 80;

/// Decode compressed image bytes into an RGB pixel buffer
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).map_err(|e| CocoError::decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Encode an RGB pixel buffer as JPEG
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| CocoError::encode(e.to_string()))?;
    Ok(out)
}

/// Run the full per-image pipeline
pub fn process(bytes: &[u8], classifier: &Classifier, threshold: f32) -> Result<ClassifiedImage> {
    let mut image = decode(bytes)?;
    let (width, height) = image.dimensions();

    let detections = classifier.classify(&ImageTensor::from_rgb(&image))?;
    let kept = select(&detections, threshold);
    let labels = annotate(&mut image, kept, classifier.labels());

    let jpeg = encode_jpeg(&image)?;
    debug!(
        width,
        height,
        detections = detections.len(),
        drawn = labels.len(),
        "Annotated image"
    );

    Ok(ClassifiedImage {
        jpeg,
        width,
        height,
        labels,
    })
}
