use async_trait::async_trait;
use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("inference failed: {0}")]
    Runtime(String),
    #[error("model returned {actual} scores, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
    #[error("model returned an invalid probability for {label}: {value}")]
    InvalidProbability { label: &'static str, value: f32 },
    #[error("inference task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    /// Runs a `(1, 299, 299, 3)` batch through the classifier and returns its scores.
    async fn predict(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ModelError>;
}
