//! Service lifecycle: bind, load, ready, liveness, shutdown
//!
//! The listener is bound before the model is loaded so `/health` can report
//! `starting` while the artifact is read. A failed load stops the server and
//! surfaces as [`ServeError::Load`]; nothing retries it.

use lead_scoring_core::{Classifier, ModelLoadError, ModelWrapper, LEAD_SCHEMA};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::error::ServeError;
use crate::handler::{create_router, AppState};
use crate::metrics::ScoringMetricsRegistry;
use crate::state::LoadedModel;

/// Load the artifact on the blocking pool and establish the canary score
pub async fn load_model(config: &ServiceConfig) -> Result<LoadedModel, ModelLoadError> {
    let path = config.model_path.clone();
    let expected_sha256 = config.model_sha256.clone();
    let start = Instant::now();

    let wrapper = tokio::task::spawn_blocking(move || {
        ModelWrapper::load(&path, &LEAD_SCHEMA, expected_sha256.as_deref())
    })
    .await
    .map_err(|e| ModelLoadError::corrupt(format!("model load task failed: {}", e)))??;

    let info = wrapper.info().clone();
    let classifier: Arc<dyn Classifier> = Arc::new(wrapper);
    let model = LoadedModel::new(classifier, info, &LEAD_SCHEMA)
        .map_err(|e| ModelLoadError::corrupt(format!("reference record failed to score: {}", e)))?;

    tracing::info!(
        model_version = %model.info.model_version,
        canary = model.canary(),
        duration_ms = %start.elapsed().as_millis(),
        "Model ready"
    );

    Ok(model)
}

/// Periodically re-score the reference record; divergence is terminal
pub fn spawn_liveness(
    state: Arc<AppState>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }

            let checked = Arc::clone(&state);
            let outcome =
                tokio::task::spawn_blocking(move || checked.health.check_liveness(checked.schema))
                    .await;

            match outcome {
                Ok(Ok(())) => {
                    state.metrics.scoring().record_liveness(true);
                    tracing::debug!("Liveness check passed");
                }
                Ok(Err(failure)) => {
                    state.metrics.scoring().record_liveness(false);
                    state.mark_unhealthy(&failure.to_string());
                    break;
                }
                Err(e) => {
                    state.metrics.scoring().record_liveness(false);
                    state.mark_unhealthy(&format!("liveness task failed: {}", e));
                    break;
                }
            }
        }
    })
}

/// Run the prediction service until SIGINT/SIGTERM or a fatal error
pub async fn serve(config: ServiceConfig) -> Result<(), ServeError> {
    serve_with_shutdown(config, shutdown_signal()).await
}

/// Run the prediction service until `shutdown` resolves or a fatal error
pub async fn serve_with_shutdown<F>(config: ServiceConfig, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()>,
{
    config.validate()?;
    let addr = config.bind_addr()?;

    let metrics = Arc::new(ScoringMetricsRegistry::new()?);
    let state = Arc::new(AppState::new(
        &LEAD_SCHEMA,
        config.decision_threshold()?,
        config.max_batch_size,
        metrics,
    ));
    let router = create_router(Arc::clone(&state), config.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    tracing::info!(
        addr = %addr,
        model_path = %config.model_path.display(),
        threshold = config.threshold,
        "Listening; loading model"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut server = {
        let mut stop = stop_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                })
                .await
        })
    };

    tokio::pin!(shutdown);

    let loaded = tokio::select! {
        loaded = load_model(&config) => loaded,
        _ = &mut shutdown => {
            tracing::info!("Shutdown requested during model load");
            let _ = stop_tx.send(true);
            return join_server(server).await;
        }
    };

    let model = match loaded {
        Ok(model) => model,
        Err(err) => {
            tracing::error!(error = %err, code = err.code(), "Model load failed");
            let _ = stop_tx.send(true);
            join_server(server).await?;
            return Err(ServeError::Load(err));
        }
    };

    state
        .install_model(model)
        .map_err(|e| ServeError::Task(e.to_string()))?;

    let liveness = config
        .liveness_interval()
        .map(|interval| spawn_liveness(Arc::clone(&state), interval, stop_rx.clone()));

    let finished = tokio::select! {
        _ = &mut shutdown => None,
        result = &mut server => Some(result),
    };

    let _ = stop_tx.send(true);
    if let Some(handle) = liveness {
        let _ = handle.await;
    }

    match finished {
        Some(result) => flatten(result),
        None => {
            tracing::info!("Shutdown signal received, draining connections");
            join_server(server).await
        }
    }
}

type ServerHandle = JoinHandle<std::io::Result<()>>;

async fn join_server(server: ServerHandle) -> Result<(), ServeError> {
    flatten(server.await)
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServeError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServeError::Server(e)),
        Err(e) => Err(ServeError::Task(e.to_string())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
