use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use color_eyre::eyre::Context;
use hyper::Method;
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    utils::state::AppState,
    web::handlers::{
        activate::{activation_front_door, complete_claim, send_sign_in_link},
        batches::{batch_counts, create_batch, render_batch, render_token},
        payment::{checkout, payment_return},
    },
};

async fn welcome() -> impl IntoResponse {
    "Sign Activation Server"
}

#[derive(Serialize)]
struct HealthCheckResponse {
    status: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthCheckResponse {
        status: "OK".to_string(),
    })
}

pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn new(config: &Config, state: AppState) -> color_eyre::Result<Self> {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_origin(Any)
            .allow_headers(Any);

        let router = Router::new()
            .route("/", get(welcome))
            .route("/health", get(health_check))
            .route("/activate/{token}", get(activation_front_door))
            .route("/activate/{token}/link", post(send_sign_in_link))
            .route("/activate/{token}/complete", post(complete_claim))
            .route("/payment/checkout", post(checkout))
            .route("/payment/return", get(payment_return))
            .route("/batches", post(create_batch))
            .route("/batches/{batch_id}/render", post(render_batch))
            .route("/batches/{batch_id}/counts", get(batch_counts))
            .route("/tokens/{token}/render", post(render_token))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CatchPanicLayer::new())
                    .layer(cors),
            )
            .with_state(state);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> color_eyre::Result<()> {
        tracing::info!("listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .await
            .wrap_err("Failed to start HTTP server")?;
        Ok(())
    }
}
