//! Inference engine seam
//!
//! The detection model itself is an external collaborator. This module defines
//! the narrow contract the classifier consumes (`run(tensor) -> outputs`), the
//! input tensor layout, and the memory-mapped model file handed to a backend
//! at startup.

use cocoserve_common::{CocoError, EngineConcurrency, Result};
use image::RgbImage;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::info;

/// `uint8` image tensor of shape `[1, height, width, 3]`
#[derive(Debug, Clone)]
pub struct ImageTensor {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ImageTensor {
    /// Build the engine input from a decoded RGB buffer
    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().clone(),
        }
    }

    /// Tensor dimensions, batch first
    pub fn shape(&self) -> [u64; 4] {
        [1, self.height as u64, self.width as u64, 3]
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major HWC pixel data
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Raw outputs of one detection-graph invocation
///
/// Boxes are `[ymin, xmin, ymax, xmax]` in normalized coordinates and the
/// first `count` entries of every vector are valid, sorted by descending score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub boxes: Vec<[f32; 4]>,
    pub scores: Vec<f32>,
    pub classes: Vec<f32>,
    pub count: usize,
}

/// A loaded detection model
///
/// Implementations must tolerate `run` being called from several workers at
/// once; engines that cannot should be wrapped in [`Serialized`].
pub trait InferenceEngine: Send + Sync {
    /// Run the model on one image
    fn run(&self, input: &ImageTensor) -> Result<EngineOutput>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "engine"
    }
}

/// Serializes every call into a non-thread-safe engine
pub struct Serialized<E> {
    inner: Mutex<E>,
}

impl<E> Serialized<E> {
    pub fn new(engine: E) -> Self {
        Self {
            inner: Mutex::new(engine),
        }
    }
}

impl<E: InferenceEngine> InferenceEngine for Serialized<E> {
    fn run(&self, input: &ImageTensor) -> Result<EngineOutput> {
        self.inner.lock().run(input)
    }

    fn name(&self) -> &str {
        "serialized"
    }
}

impl InferenceEngine for Box<dyn InferenceEngine> {
    fn run(&self, input: &ImageTensor) -> Result<EngineOutput> {
        (**self).run(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Apply the configured sharing policy to a loaded engine
pub fn with_concurrency(
    engine: Box<dyn InferenceEngine>,
    policy: EngineConcurrency,
) -> Box<dyn InferenceEngine> {
    match policy {
        EngineConcurrency::Shared => engine,
        EngineConcurrency::Serialized => Box::new(Serialized::new(engine)),
    }
}

/// Memory-mapped serialized model
pub struct ModelFile {
    path: PathBuf,
    mmap: Mmap,
}

impl ModelFile {
    /// Map a model file; missing or empty files are fatal startup errors
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path)
            .map_err(|e| CocoError::model(format!("Failed to open {}: {}", path.display(), e)))?;

        let len = file
            .metadata()
            .map_err(|e| CocoError::model(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();
        if len == 0 {
            return Err(CocoError::model(format!("{} is empty", path.display())));
        }

        // The mapping is read-only and the file is not modified while serving.
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| CocoError::model(format!("Failed to mmap {}: {}", path.display(), e)))?
        };

        info!(path = %path.display(), bytes = mmap.len(), "Mapped model file");

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Deref for ModelFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

/// Build the engine compiled into this binary from a mapped model
#[cfg(feature = "tensorflow")]
pub fn load_engine(model: &ModelFile) -> Result<Box<dyn InferenceEngine>> {
    let engine = crate::tensorflow::FrozenGraphEngine::import(model)?;
    Ok(Box::new(engine))
}

/// Build the engine compiled into this binary from a mapped model
#[cfg(not(feature = "tensorflow"))]
pub fn load_engine(model: &ModelFile) -> Result<Box<dyn InferenceEngine>> {
    Err(CocoError::model(format!(
        "cannot load {}: built without an inference backend (enable the `tensorflow` feature)",
        model.path().display()
    )))
}
