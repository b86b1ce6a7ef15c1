//! HTTP API gateway for chatgate.
//!
//! Exposes the OpenAI-compatible chat-completions endpoint, tool listing,
//! per-user capability-server management and a health check.
//!
//! Built on Axum; every request runs through the shared
//! [`CompletionPipeline`].

pub mod api_v1;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use chatgate_capabilities::{CapabilityClient, ServerDirectory};
use chatgate_config::AppConfig;
use chatgate_pipeline::{AuthCache, CompletionPipeline, PipelineSettings};
use chatgate_providers::{HttpIdentity, OpenAiCompatUpstream};
use chatgate_store::SqliteStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub pipeline: Arc<CompletionPipeline>,
}

pub type SharedState = Arc<GatewayState>;

/// Startup failures: bad config, unreachable database, bind errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Request body size limit
/// - Permissive CORS
/// - `Cache-Control: no-cache` on every response
/// - HTTP trace logging
pub fn build_router(state: SharedState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire every collaborator named in `config` onto `client`.
///
/// The client's connection pool is shared by the identity service, the
/// capability servers and the upstream.
pub async fn build_state(
    config: &AppConfig,
    client: reqwest::Client,
) -> Result<SharedState, BoxError> {
    let identity = HttpIdentity::new(config.identity_url()?, client.clone());
    let auth = AuthCache::new(
        Arc::new(identity),
        Duration::from_secs(config.identity.cache_ttl_secs),
    );

    let tools = Arc::new(chatgate_tools::default_registry()?);

    let store = SqliteStore::new(&config.storage.database_url).await?;
    let directory = ServerDirectory::new(Arc::new(store), &config.capabilities.default_servers);
    let capabilities = CapabilityClient::new(
        client.clone(),
        Duration::from_secs(config.capabilities.timeout_secs),
    );

    let upstream = OpenAiCompatUpstream::new(config.upstream_url()?, client)
        .with_timeout(Duration::from_secs(config.upstream.timeout_secs));

    info!(
        tools = tools.len(),
        default_servers = directory.defaults().len(),
        token_budget = config.context.token_budget,
        "Gateway state ready"
    );

    let pipeline = CompletionPipeline::new(
        auth,
        tools,
        directory,
        capabilities,
        Arc::new(upstream),
        PipelineSettings::from(config),
    );
    Ok(Arc::new(GatewayState {
        pipeline: Arc::new(pipeline),
    }))
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// In-flight requests finish before this returns; the shared HTTP client
/// is dropped last, closing its pool.
pub async fn serve(
    listener: TcpListener,
    config: &AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let client = chatgate_providers::shared_client()?;
    let state = build_state(config, client.clone()).await?;
    let app = build_router(state, config.gateway.body_limit_bytes);

    info!(addr = %listener.local_addr()?, "chatgate gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    drop(client);
    info!("Gateway stopped, HTTP client pool closed");
    Ok(())
}

/// Bind `gateway.host:gateway.port` and serve until `shutdown` resolves.
pub async fn start(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, &config, shutdown).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chatgate_core::error::{AuthError, UpstreamError};
    use chatgate_core::upstream::UpstreamStream;
    use chatgate_core::{AuthItem, ChatPost, IdentityProvider, Upstream, UpstreamReply};
    use chatgate_store::InMemoryStore;
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub const TOKEN: &str = "Bearer good-token";

    /// Accepts `good-token`, rejects everything else.
    pub struct StaticIdentity;

    #[async_trait]
    impl IdentityProvider for StaticIdentity {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, authorization: &str) -> Result<Option<AuthItem>, AuthError> {
            Ok((authorization == TOKEN).then(|| AuthItem {
                api_key: "good-token".into(),
                scope: "chat".into(),
                user_id: 7,
                user_email: "dev@example.com".into(),
                created_at: "2025-01-01T00:00:00Z".into(),
            }))
        }
    }

    /// Replies with a fixed status and body chunks; records what it was sent.
    ///
    /// With `hold_open` the stream never ends after its chunks, like an
    /// upstream still generating. `released` flips once the stream is dropped.
    pub struct ScriptedUpstream {
        pub status: u16,
        pub content_type: &'static str,
        pub chunks: Vec<&'static str>,
        pub unreachable: bool,
        pub hold_open: bool,
        pub released: Arc<AtomicBool>,
        pub seen: Mutex<Vec<ChatPost>>,
    }

    struct ReleaseGuard(Arc<AtomicBool>);

    impl Drop for ReleaseGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl ScriptedUpstream {
        pub fn ok(chunks: Vec<&'static str>, content_type: &'static str) -> Self {
            Self {
                status: 200,
                content_type,
                chunks,
                unreachable: false,
                hold_open: false,
                released: Arc::new(AtomicBool::new(false)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &ChatPost,
            _authorization: Option<&str>,
        ) -> Result<UpstreamReply, UpstreamError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.unreachable {
                return Err(UpstreamError::Network("connection refused".into()));
            }
            Ok(UpstreamReply {
                status: self.status,
                content_type: Some(self.content_type.into()),
                body: Bytes::from(self.chunks.concat()),
            })
        }

        async fn stream(
            &self,
            request: &ChatPost,
            _authorization: Option<&str>,
        ) -> Result<UpstreamStream, UpstreamError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.unreachable {
                return Err(UpstreamError::Network("connection refused".into()));
            }
            let chunks: Vec<Result<Bytes, UpstreamError>> = self
                .chunks
                .iter()
                .map(|&c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            let tail: futures::stream::BoxStream<'static, Result<Bytes, UpstreamError>> = if self.hold_open {
                futures::stream::pending().boxed()
            } else {
                futures::stream::empty().boxed()
            };
            let guard = ReleaseGuard(self.released.clone());
            let body = futures::stream::iter(chunks).chain(tail).map(move |chunk| {
                let _held = &guard;
                chunk
            });
            Ok(UpstreamStream {
                status: self.status,
                content_type: Some(self.content_type.into()),
                body: Box::pin(body),
            })
        }
    }

    pub fn state_with(upstream: Arc<ScriptedUpstream>) -> SharedState {
        let auth = AuthCache::new(Arc::new(StaticIdentity), Duration::from_secs(360));
        let tools = Arc::new(chatgate_tools::default_registry().unwrap());
        let directory = ServerDirectory::new(Arc::new(InMemoryStore::new()), &[]);
        let capabilities = CapabilityClient::new(reqwest::Client::new(), Duration::from_secs(5));
        let pipeline = CompletionPipeline::new(
            auth,
            tools,
            directory,
            capabilities,
            upstream,
            PipelineSettings::default(),
        );
        Arc::new(GatewayState {
            pipeline: Arc::new(pipeline),
        })
    }

    pub fn test_state() -> SharedState {
        state_with(Arc::new(ScriptedUpstream::ok(
            vec![r#"{"id":"chatcmpl-1","object":"chat.completion","choices":[]}"#],
            "application/json",
        )))
    }
}
