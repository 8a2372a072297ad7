//! Boundary to the request-processing engine.
//!
//! The supervisor only needs something that turns a merged `Configuration`
//! into a router it can serve from many threads at once. `DemoEngine` is the
//! engine the `emu` binary ships with: it publishes a capabilities document
//! at the path of `server.url` and describes its registered processes.

use crate::Result;
use crate::config::Configuration;
use crate::error::SupervisorError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::{Router, routing::get};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

pub trait EngineFactory: Send + Sync + 'static {
    fn build(&self, config: &Configuration) -> Result<Router>;
}

impl<F> EngineFactory for F
where
    F: Fn(&Configuration) -> Result<Router> + Send + Sync + 'static,
{
    fn build(&self, config: &Configuration) -> Result<Router> {
        self(config)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessDescription {
    pub identifier: &'static str,
    pub title: &'static str,
    pub version: &'static str,
    #[serde(rename = "abstract")]
    pub abstract_: &'static str,
}

/// Processes registered with the demo engine.
pub const PROCESSES: &[ProcessDescription] = &[ProcessDescription {
    identifier: "ncmeta",
    title: "Show NetCDF Metadata",
    version: "4",
    abstract_: "Returns metadata of a NetCDF file or OpenDAP resource.",
}];

#[derive(Debug, Serialize)]
struct Capabilities {
    title: String,
    #[serde(rename = "abstract")]
    abstract_: String,
    url: String,
    output_url: Option<String>,
    processes: &'static [ProcessDescription],
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DemoEngine;

impl EngineFactory for DemoEngine {
    fn build(&self, config: &Configuration) -> Result<Router> {
        let url = config.server_url();
        let path = Url::parse(url)
            .map_err(|e| SupervisorError::ConfigurationResolution {
                reason: format!("invalid server url {url:?}: {e}"),
            })?
            .path()
            .trim_end_matches('/')
            .to_string();
        if let Some(segment) = path
            .split('/')
            .find(|segment| segment.starts_with(':') || segment.starts_with('*'))
        {
            return Err(SupervisorError::ConfigurationResolution {
                reason: format!(
                    "server url {url:?} has a path segment {segment:?} that cannot be routed"
                ),
            }
            .into());
        }
        let capabilities = Arc::new(Capabilities {
            title: config
                .get_str("metadata", "identification_title")
                .unwrap_or("Emu")
                .to_string(),
            abstract_: config
                .get_str("metadata", "identification_abstract")
                .unwrap_or_default()
                .to_string(),
            url: url.to_string(),
            output_url: config.output_url().map(str::to_string),
            processes: PROCESSES,
        });
        let root = if path.is_empty() { "/" } else { path.as_str() };
        debug!("engine serving capabilities at {root}");
        Ok(Router::new()
            .route(root, get(capabilities_handler))
            .route(
                &format!("{path}/processes/{{id}}"),
                get(describe_process),
            )
            .with_state(capabilities))
    }
}

async fn capabilities_handler(State(capabilities): State<Arc<Capabilities>>) -> Response {
    Json(&*capabilities).into_response()
}

async fn describe_process(Path(id): Path<String>) -> Response {
    match PROCESSES.iter().find(|p| p.identifier == id) {
        Some(process) => Json(process).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown process: {id}")).into_response(),
    }
}
