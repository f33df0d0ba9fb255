use crate::{
    model_service::{ModelError, ModelService},
    prediction::Prediction,
    preprocessing::{transform_image, PreprocessError},
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("preprocessing task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    pub async fn predict(&self, image_data: Vec<u8>) -> Result<Prediction, InferenceError> {
        let input = tokio::task::spawn_blocking(move || transform_image(&image_data))
            .await
            .map_err(|e| InferenceError::Task(e.to_string()))??;

        let scores = self.model_service.predict(input).await?;
        let prediction = Prediction::from_scores(&scores)?;

        tracing::debug!(
            "Prediction: top_class={}, scores={:?}",
            prediction.top_class().label(),
            scores
        );

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::TumorClass;
    use async_trait::async_trait;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use ndarray::{Array, Ix4};
    use std::io::Cursor;

    #[derive(Clone)]
    struct MockModelService {}

    #[async_trait]
    impl ModelService for MockModelService {
        async fn predict(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
            assert_eq!(input.shape(), &[1, 299, 299, 3]);
            Ok(vec![0.05, 0.1, 0.8, 0.05])
        }
    }

    /// Scores depend on the pixel content so repeated runs are comparable.
    #[derive(Clone)]
    struct MeanColorModelService {}

    #[async_trait]
    impl ModelService for MeanColorModelService {
        async fn predict(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
            let mean = input.mean().unwrap_or(0.0);
            Ok(vec![mean / 2.0, mean / 2.0, (1.0 - mean) / 2.0, (1.0 - mean) / 2.0])
        }
    }

    #[derive(Clone)]
    struct BrokenModelService {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl ModelService for BrokenModelService {
        async fn predict(&self, _input: Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
            if self.scores.is_empty() {
                return Err(ModelError::Runtime("session exploded".to_string()));
            }
            Ok(self.scores.clone())
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 200])
        });
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[tokio::test]
    async fn test_predict() -> Result<(), Box<dyn std::error::Error>> {
        let inference_service = InferenceService::new(MockModelService {});

        let prediction = inference_service.predict(png_bytes(120, 80)).await?;

        assert_eq!(prediction.top_class(), TumorClass::NoTumor);
        assert_eq!(prediction.iter().count(), 4);
        assert!(prediction.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));

        Ok(())
    }

    #[tokio::test]
    async fn test_predict_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let inference_service = InferenceService::new(MeanColorModelService {});
        let image_data = png_bytes(512, 512);

        let first = inference_service.predict(image_data.clone()).await?;
        let second = inference_service.predict(image_data).await?;

        assert_eq!(first, second);

        Ok(())
    }

    #[tokio::test]
    async fn test_predict_rejects_non_image_bytes() {
        let inference_service = InferenceService::new(MockModelService {});

        let err = inference_service
            .predict(b"%PDF-1.4 not an image".to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Preprocess(_)));
        assert!(err.to_string().contains("decode"));
    }

    #[tokio::test]
    async fn test_predict_surfaces_model_failure() {
        let inference_service = InferenceService::new(BrokenModelService { scores: vec![] });

        let err = inference_service
            .predict(png_bytes(10, 10))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "inference failed: session exploded");
    }

    #[tokio::test]
    async fn test_predict_rejects_wrong_output_length() {
        let inference_service = InferenceService::new(BrokenModelService {
            scores: vec![0.2, 0.3, 0.5],
        });

        let err = inference_service
            .predict(png_bytes(10, 10))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InferenceError::Model(ModelError::OutputShape { .. })
        ));
    }
}
