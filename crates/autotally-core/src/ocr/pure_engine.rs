//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{OcrBackend, OcrResult, TextBox};

const DET_MODEL: &str = "det.onnx";
const REC_MODEL: &str = "latin_rec.onnx";
const DICTIONARY: &str = "latin_dict.txt";

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
pub struct PureOcrEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
    keep_unk: bool,
}

impl PureOcrEngine {
    /// Create an engine from model files in a directory.
    pub fn from_dir(model_dir: &Path, config: &OcrConfig) -> Result<Self, OcrError> {
        let det_path = model_dir.join(DET_MODEL);
        let rec_path = model_dir.join(REC_MODEL);
        let dict_path = model_dir.join(DICTIONARY);

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine,
            keep_unk: config.keep_unk,
        })
    }
}

impl OcrBackend for PureOcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        let boxes = results
            .iter()
            .map(|r| TextBox {
                bbox: polygon_to_bbox(&r.bounding_box),
                text: if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                },
                confidence: r.confidence,
            })
            .collect();

        Ok(OcrResult::from_boxes(
            boxes,
            (width, height),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Build the OCR backend described by `config`.
///
/// Returns `None` when OCR is disabled or the model files are missing; the
/// pipeline then falls back to sending page images.
pub fn create_engine_from_dir(config: &OcrConfig) -> Option<Arc<dyn OcrBackend>> {
    if !config.enabled {
        return None;
    }

    let dir = &config.model_dir;
    let missing: Vec<_> = [DET_MODEL, REC_MODEL, DICTIONARY]
        .into_iter()
        .filter(|name| !dir.join(name).is_file())
        .collect();
    if !missing.is_empty() {
        warn!(
            "OCR disabled: {} missing from {}",
            missing.join(", "),
            dir.display()
        );
        return None;
    }

    match PureOcrEngine::from_dir(dir, config) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            warn!("OCR disabled: {}", e);
            None
        }
    }
}

/// Convert a `Polygon<f64>` to our `[f32; 8]` bbox format.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 8] {
    let mut bbox = [0.0f32; 8];
    for (i, coord) in polygon.exterior().coords().take(4).enumerate() {
        bbox[i * 2] = coord.x as f32;
        bbox[i * 2 + 1] = coord.y as f32;
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_models_disable_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrConfig {
            enabled: true,
            model_dir: dir.path().to_path_buf(),
            keep_unk: false,
        };
        assert!(create_engine_from_dir(&config).is_none());
    }

    #[test]
    fn test_disabled_ocr() {
        let config = OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        };
        assert!(create_engine_from_dir(&config).is_none());
    }
}
