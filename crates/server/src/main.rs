mod api;
mod config;
mod media;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use api::api_router;
use catalog::{BuildOptions, Catalog, MediaUrls};
use config::{config_path_from_env, load_or_create_config, resolve_path, validate};
use engine::RecollDb;
use parking_lot::RwLock;
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    validate(&config)?;

    let confdir = resolve_path(&config_path, &config.confdir);
    let media_roots: Vec<PathBuf> = config.media_dirs.iter().map(PathBuf::from).collect();
    let urls = MediaUrls::new(&config.advertised_host(), "media");
    let opts = BuildOptions {
        topdirs: config.media_dirs.clone(),
        urls,
        merge: config.merge_policy()?,
        resolve_art: true,
    };
    let backend = RecollDb::new(&confdir);
    let catalog = Catalog::new(Box::new(backend), confdir, opts);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        catalog: catalog.clone(),
        config: Arc::new(RwLock::new(config)),
        media_roots,
    };

    // First index/rebuild cycle; requests meanwhile get the transient
    // placeholder.
    catalog.start_update();

    let app = api_router(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
