use crate::config::{ConfigSet, Configuration, ServiceEndpoint};
use crate::engine::EngineFactory;
use crate::Result;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::serve::Listener;
use axum::{Router, routing::get};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

/// Route prefix under which the output directory is served.
pub const OUTPUTS_ROUTE: &str = "/outputs";
const DEBUG_CONFIG_ROUTE: &str = "/_debug/config";

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Replaces the host of `server.url` when set.
    pub bind_host: Option<String>,
    /// Interactive debugging surface; off for detached processes.
    pub debug: bool,
}

/// Everything one listener generation needs, built before anything binds.
pub struct Prepared {
    pub endpoint: ServiceEndpoint,
    pub config: Configuration,
    pub app: Router,
}

impl Prepared {
    pub fn new(
        factory: &dyn EngineFactory,
        config_set: &ConfigSet,
        options: &ServerOptions,
    ) -> Result<Self> {
        let config = config_set.load()?;
        let endpoint = ServiceEndpoint::resolve(&config, options.bind_host.as_deref())?;
        let engine = factory.build(&config)?;
        let app = app(engine, &config, &endpoint, options.debug);
        Ok(Self {
            endpoint,
            config,
            app,
        })
    }
}

/// Engine router behind the output directory and, in debug mode, the
/// debugging routes. Anything not claimed here falls through to the engine.
pub fn app(
    engine: Router,
    config: &Configuration,
    endpoint: &ServiceEndpoint,
    debug: bool,
) -> Router {
    let mut app = Router::new().nest_service(OUTPUTS_ROUTE, ServeDir::new(&endpoint.output_dir));
    if debug {
        let config = Arc::new(config.clone());
        app = app.route(DEBUG_CONFIG_ROUTE, get(debug_config).with_state(config));
    }
    let app = app.fallback_service(engine);
    if debug {
        app.layer(middleware::from_fn(log_server_errors))
    } else {
        app
    }
}

async fn debug_config(State(config): State<Arc<Configuration>>) -> Response {
    match serde_json::to_value(config.table()) {
        Ok(value) => Json(value).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn log_server_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    if response.status().is_server_error() {
        error!("{method} {uri} -> {}", response.status());
    }
    response
}

/// A bound socket that outlives a single `axum::serve` call, so a reload
/// that keeps the address can hand the same socket to the next generation.
#[derive(Clone)]
struct SharedListener {
    inner: Arc<TcpListener>,
    addr: String,
}

impl SharedListener {
    async fn bind(endpoint: &ServiceEndpoint) -> Result<Self> {
        let addr = endpoint.addr();
        let inner = TcpListener::bind(&addr)
            .await
            .map_err(|e| miette::miette!("Failed to bind server to {}: {}", addr, e))?;
        Ok(Self {
            inner: Arc::new(inner),
            addr,
        })
    }
}

impl Listener for SharedListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok(conn) => return conn,
                Err(e) if is_connection_error(&e) => continue,
                Err(e) => {
                    error!("accept error on {}: {e}", self.addr);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
    )
}

/// Serves until `shutdown` is cancelled. Each reload generation rebuilds
/// the configuration, engine and listener from scratch. The next listener
/// is bound before the current one stops, so a reload that fails at any
/// step leaves the current generation serving.
pub async fn run(
    factory: Arc<dyn EngineFactory>,
    config_set: ConfigSet,
    options: ServerOptions,
    initial: Prepared,
    mut reload: watch::Receiver<u64>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut current = initial;
    let mut listener = SharedListener::bind(&current.endpoint).await?;
    loop {
        info!(
            "listening on http://{} (outputs from {})",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| listener.addr.clone()),
            current.endpoint.output_dir.display()
        );

        let stop = shutdown.child_token();
        let serve = axum::serve(listener.clone(), current.app.clone()).with_graceful_shutdown({
            let stop = stop.clone();
            async move { stop.cancelled().await }
        });
        let mut serve = std::pin::pin!(serve.into_future());

        loop {
            tokio::select! {
                res = &mut serve => {
                    res.map_err(|e| miette::miette!("Server error: {}", e))?;
                    return Ok(());
                }
                changed = reload.changed() => {
                    if changed.is_err() {
                        // watchdog is gone; keep serving until shutdown
                        return serve.await.map_err(|e| miette::miette!("Server error: {}", e));
                    }
                    match next_generation(factory.as_ref(), &config_set, &options, &listener).await {
                        Ok((next, next_listener)) => {
                            info!("configuration reloaded, restarting listener");
                            stop.cancel();
                            serve.await.map_err(|e| miette::miette!("Server error: {}", e))?;
                            current = next;
                            listener = next_listener;
                            break;
                        }
                        Err(e) => error!("reload failed, keeping current configuration: {e:?}"),
                    }
                }
            }
        }
        if shutdown.is_cancelled() {
            return Ok(());
        }
    }
}

async fn next_generation(
    factory: &dyn EngineFactory,
    config_set: &ConfigSet,
    options: &ServerOptions,
    listener: &SharedListener,
) -> Result<(Prepared, SharedListener)> {
    let next = Prepared::new(factory, config_set, options)?;
    let next_listener = if next.endpoint.addr() == listener.addr {
        listener.clone()
    } else {
        SharedListener::bind(&next.endpoint).await?
    };
    Ok((next, next_listener))
}
