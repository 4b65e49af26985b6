//! pdfpress server
//!
//! A small HTTP service for PDF manipulation. Provides REST API endpoints
//! for:
//!
//! - Merging multiple PDFs into one document
//! - Compressing a PDF via Ghostscript, with fallback strategies
//! - Liveness checks
//!
//! The prebuilt web frontend is served from a conventional build directory
//! when present; otherwise every non-API route answers with a backend-only
//! notice. All request artifacts live in a shared scratch workspace that is
//! swept for stale files at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer, ExposeHeaders};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdfpress_core::{workspace, Ghostscript, ToolRunner, Workspace};

mod api;
mod error;

use api::{handle_compress, handle_health, handle_merge, serve_frontend};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Conventional frontend build locations, first existing wins.
const STATIC_ROOT_CANDIDATES: &[&str] = &["frontend_build", "frontend/dist", "static"];

/// Command-line arguments for the pdfpress server
#[derive(Parser, Debug)]
#[command(name = "pdfpress-server")]
#[command(about = "PDF merge and compression server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Scratch directory for request artifacts (system temp dir when omitted)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Frontend build directory (conventional locations probed when omitted)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Ghostscript binary name or path
    #[arg(long, default_value = "gs")]
    gs_binary: PathBuf,

    /// Ceiling on a single compression attempt, in seconds
    #[arg(long, default_value = "60")]
    tool_timeout_secs: u64,

    /// Reduction percentage below which a success is only warned about
    #[arg(long, default_value = "5.0")]
    min_reduction: f64,

    /// Allowed CORS origin (repeatable); any origin when omitted
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Scratch directory for request artifacts
    pub workspace: Workspace,
    /// External compression tool
    pub tool: Arc<dyn ToolRunner>,
    /// Resolved frontend build directory, if any
    pub static_root: Option<PathBuf>,
    /// Ceiling on one tool invocation
    pub tool_timeout: Duration,
    /// Reduction threshold below which a success is only warned about
    pub min_reduction_pct: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfpress server on {}:{}", args.host, args.port);

    // Workspace must exist, and stale artifacts are reaped, before any
    // handler runs.
    let root = args
        .workspace
        .unwrap_or_else(|| std::env::temp_dir().join("pdfpress_uploads"));
    let workspace = Workspace::create(&root)?;
    let reaped = workspace.sweep(workspace::DEFAULT_MAX_AGE);
    info!(
        "Workspace ready at {} ({} stale artifacts reaped)",
        root.display(),
        reaped
    );

    let static_root = resolve_static_root(args.static_dir);
    match &static_root {
        Some(dir) => info!("Serving frontend from {}", dir.display()),
        None => warn!("Frontend build not found, running in backend-only mode"),
    }

    let tool = Ghostscript::new(args.gs_binary);
    if !tool.is_available() {
        warn!("Ghostscript is not on the search path; compression requests will fail until it is installed");
    }

    let state = AppState {
        workspace,
        tool: Arc::new(tool),
        static_root,
        tool_timeout: Duration::from_secs(args.tool_timeout_secs),
        min_reduction_pct: args.min_reduction,
    };

    // Build router
    let app = build_router(state, cors_layer(&args.cors_origins));

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  - POST /api/pdf/merge");
    info!("  - POST /api/pdf/compress");
    info!("  - GET  /api/health");

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/pdf/merge", post(handle_merge))
        .route("/api/pdf/compress", post(handle_compress))
        // SPA-style catch-all for the frontend
        .fallback(serve_frontend)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Permissive CORS by default, restricted to an allow-list when configured.
/// The attachment and size-metadata headers are exposed so browser scripts
/// can read them.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let exposed = vec![
        header::CONTENT_DISPOSITION,
        HeaderName::from_static(api::HEADER_ORIGINAL_SIZE),
        HeaderName::from_static(api::HEADER_COMPRESSED_SIZE),
        HeaderName::from_static(api::HEADER_REDUCTION),
        HeaderName::from_static(api::HEADER_QUALITY),
    ];

    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(ExposeHeaders::list(exposed));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Resolve the frontend build directory: explicit flag first, then the
/// conventional locations relative to the working directory.
fn resolve_static_root(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return dir.is_dir().then_some(dir);
    }
    STATIC_ROOT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.is_dir())
}
