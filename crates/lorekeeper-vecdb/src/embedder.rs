//! # Visual embedder
//!
//! Multi-vector embeddings of page images and text queries in one space.
//! [`ColPaliEmbedder`] runs ColPali (PaliGemma 3B at 448px) with candle,
//! loading weights from a local model directory.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::colpali;
use candle_transformers::models::paligemma;
use image::DynamicImage;
use image::imageops::FilterType;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use lorekeeper_core::layout;

use crate::error::{Result, VecDbError};
use crate::scoring::MultiVector;

/// Environment variable naming the model directory.
pub const MODEL_DIR_ENV: &str = "LOREKEEPER_MODEL_DIR";

/// Dimensionality of ColPali's projected embeddings.
pub const COLPALI_VECTOR_SIZE: usize = 128;

/// Input resolution of PaliGemma 3B 448.
pub const COLPALI_IMAGE_SIZE: u32 = 448;

/// Text paired with every page image; ColPali ignores its content.
const IMAGE_PROMPT: &str = "Describe the image.";

/// Something that turns page images and queries into multi-vectors.
pub trait VisualEmbedder {
    /// One multi-vector per image, in input order.
    fn embed_images(&mut self, images: &[DynamicImage]) -> Result<Vec<MultiVector>>;

    fn embed_query(&mut self, text: &str) -> Result<MultiVector>;

    /// Length of every row this embedder produces.
    fn vector_size(&self) -> usize;

    /// Collection the embeddings are stored in. Differs per model, so
    /// switching models never mixes embedding spaces.
    fn collection_name(&self) -> &str;
}

/// Where and how to load the ColPali model.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Directory holding `*.safetensors` and `tokenizer.json`.
    pub model_dir: PathBuf,
    pub collection_name: String,
    /// Run on the CPU even when CUDA is available.
    pub force_cpu: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            collection_name: "page_images_colpali".to_string(),
            force_cpu: false,
        }
    }
}

impl EmbedderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn with_force_cpu(mut self, force_cpu: bool) -> Self {
        self.force_cpu = force_cpu;
        self
    }
}

/// `$LOREKEEPER_MODEL_DIR`, else `<data dir>/lorekeeper/models/colpali`.
pub fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lorekeeper")
        .join("models")
        .join("colpali")
}

fn require_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(VecDbError::ModelNotFound { path })
    }
}

/// Resizes to the model's square input and scales pixels to `[-1, 1]`,
/// channels first.
fn image_tensor(image: &DynamicImage, size: u32) -> Result<Tensor> {
    let resized = image.resize_to_fill(size, size, FilterType::Triangle).to_rgb8();
    let side = size as usize;
    let tensor = Tensor::from_vec(resized.into_raw(), (side, side, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2. / 255., -1.)?;
    Ok(tensor)
}

fn to_multi_vectors(embeddings: &Tensor) -> Result<Vec<MultiVector>> {
    Ok(embeddings
        .to_dtype(DType::F32)?
        .to_device(&Device::Cpu)?
        .to_vec3::<f32>()?)
}

/// ColPali page and query embedder.
pub struct ColPaliEmbedder {
    model: colpali::Model,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    collection_name: String,
}

impl ColPaliEmbedder {
    /// Loads the tokenizer and every safetensors shard in the model directory.
    pub fn load(config: EmbedderConfig) -> Result<Self> {
        let dir = &config.model_dir;
        if !dir.is_dir() {
            return Err(VecDbError::ModelNotFound { path: dir.clone() });
        }

        let tokenizer_path = require_file(dir.join("tokenizer.json"))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| VecDbError::Tokenizer(e.to_string()))?;

        let weights = layout::list_files_with_extension(dir, "safetensors")?;
        if weights.is_empty() {
            return Err(VecDbError::ModelNotFound {
                path: dir.join("*.safetensors"),
            });
        }

        let device = if config.force_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0)?
        };
        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };
        info!(
            model_dir = %dir.display(),
            shards = weights.len(),
            cuda = device.is_cuda(),
            "Loading ColPali model"
        );

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, &device) }?;
        let model = colpali::Model::new(&paligemma::Config::paligemma_3b_448(), vb)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            dtype,
            collection_name: config.collection_name,
        })
    }

    fn token_ids(&self, texts: &[&str]) -> Result<Tensor> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| VecDbError::Tokenizer(e.to_string()))?;
        let rows = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::stack(&rows, 0)?)
    }
}

impl VisualEmbedder for ColPaliEmbedder {
    fn embed_images(&mut self, images: &[DynamicImage]) -> Result<Vec<MultiVector>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let pixels = images
            .iter()
            .map(|img| image_tensor(img, COLPALI_IMAGE_SIZE))
            .collect::<Result<Vec<_>>>()?;
        let pixels = Tensor::stack(&pixels, 0)?
            .to_device(&self.device)?
            .to_dtype(self.dtype)?;
        let prompts = vec![IMAGE_PROMPT; images.len()];
        let input_ids = self.token_ids(&prompts)?;

        let embeddings = self.model.forward_images(&pixels, &input_ids)?;
        debug!(images = images.len(), shape = ?embeddings.shape(), "Embedded page images");
        to_multi_vectors(&embeddings)
    }

    fn embed_query(&mut self, text: &str) -> Result<MultiVector> {
        let input_ids = self.token_ids(&[text])?;
        let embeddings = self.model.forward_text(&input_ids)?;
        to_multi_vectors(&embeddings)?
            .pop()
            .ok_or_else(|| VecDbError::Candle("empty query embedding".into()))
    }

    fn vector_size(&self) -> usize {
        COLPALI_VECTOR_SIZE
    }

    fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

/// Path the model is expected at, for error messages.
pub fn describe_model_dir(dir: &Path) -> String {
    format!("{} (set {MODEL_DIR_ENV} or pass --model-dir)", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn image_tensor_is_channels_first_in_unit_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 10, Rgb([255, 0, 128])));
        let tensor = image_tensor(&img, 8).unwrap();
        assert_eq!(tensor.dims(), &[3, 8, 8]);

        let values = tensor.to_vec3::<f32>().unwrap();
        assert!((values[0][0][0] - 1.0).abs() < 1e-6);
        assert!((values[1][4][4] + 1.0).abs() < 1e-6);
        assert!(values[2][7][7].abs() < 0.01);
    }

    #[test]
    fn load_reports_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbedderConfig::new().with_model_dir(dir.path().join("absent"));
        assert!(matches!(ColPaliEmbedder::load(config), Err(VecDbError::ModelNotFound { .. })));

        let config = EmbedderConfig::new().with_model_dir(dir.path());
        match ColPaliEmbedder::load(config) {
            Err(VecDbError::ModelNotFound { path }) => assert!(path.ends_with("tokenizer.json")),
            other => panic!("expected a missing tokenizer, got {:?}", other.err()),
        }
    }

    #[test]
    fn config_builder() {
        let config = EmbedderConfig::new()
            .with_model_dir("/models/colpali-v1.2")
            .with_collection_name("pages_v1_2")
            .with_force_cpu(true);
        assert_eq!(config.model_dir, PathBuf::from("/models/colpali-v1.2"));
        assert_eq!(config.collection_name, "pages_v1_2");
        assert!(config.force_cpu);
    }
}
