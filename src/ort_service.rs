use crate::{
    config::{ModelConfig, Validatable},
    model_service::{ModelError, ModelService},
};
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

impl From<ort::Error> for ModelError {
    fn from(err: ort::Error) -> Self {
        ModelError::Runtime(err.to_string())
    }
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: Arc<str>,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(session)
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let output_name = resolve_output_name(&sessions[0], model_config.output_name.as_deref())?;

        tracing::info!(
            "Created {} ONNX sessions for {:?}, reading output {}",
            num_instances,
            model_config.get_path(),
            output_name
        );

        Ok(Self {
            sessions: Arc::new(
                sessions
                    .into_iter()
                    .map(|session| Arc::new(Mutex::new(session)))
                    .collect(),
            ),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: output_name.into(),
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Runtime(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (_, data) = outputs[self.output_name.as_ref()].try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

fn resolve_output_name(session: &Session, configured: Option<&str>) -> Result<String, ModelError> {
    let available: Vec<&str> = session
        .outputs
        .iter()
        .map(|output| output.name.as_str())
        .collect();

    match configured {
        Some(name) if available.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(ModelError::Runtime(format!(
            "model has no output named {}, available outputs: {:?}",
            name, available
        ))),
        None => available
            .first()
            .map(|name| name.to_string())
            .ok_or_else(|| ModelError::Runtime("model declares no outputs".to_string())),
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, input: Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.run_inference(&input))
            .await
            .map_err(|e| ModelError::Task(e.to_string()))?
    }
}
