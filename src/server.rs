use crate::{
    config::{Config, ServerConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};

#[derive(Clone)]
pub struct SharedState<M: ModelService> {
    pub inference_service: InferenceService<M>,
    pub metrics: Arc<Metrics>,
    pub expose_error_details: bool,
}

pub fn build_router<M: ModelService>(
    model_service: M,
    metrics: Arc<Metrics>,
    server_config: &ServerConfig,
) -> Router {
    let app_state = SharedState {
        inference_service: InferenceService::new(model_service),
        metrics,
        expose_error_details: server_config.expose_error_details,
    };

    api_routes()
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
    metrics: Arc<Metrics>,
}

impl HttpServer {
    pub async fn new(model_service: impl ModelService, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new()?);
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router =
            build_router(model_service, metrics.clone(), &config.server).layer(metrics_layer);

        let listener = TcpListener::bind(&addr).await?;

        Ok(Self {
            router,
            listener,
            metrics,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Prediction service listening on {}", self.listener.local_addr()?);

        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown")
        };

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.metrics.shutdown();

        Ok(())
    }
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let ort_model_service = OrtModelService::new(&config.model)?;

    let server = HttpServer::new(ort_model_service, &config).await?;
    server.run().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
