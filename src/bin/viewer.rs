//! Viewer Binary - polls a running server and plays back one source.
//!
//! Playback is simulated: each clip is held for its duration and optionally
//! written to `VIEWER_OUT_DIR`.

use cliprelay::adapters::local::HttpClipSource;
use cliprelay::application::viewer::ViewerSession;
use cliprelay::config::ViewerConfig;
use cliprelay::domain::poller::LocalClip;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(config) = ViewerConfig::from_env() else {
        eprintln!("VIEWER_TOKEN must be set");
        std::process::exit(1);
    };

    let source = match HttpClipSource::new(&config.server) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to create HTTP client: {:?}", e);
            std::process::exit(1);
        }
    };

    let out_dir = config.out_dir.as_ref().map(PathBuf::from);
    if let Some(dir) = &out_dir {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            eprintln!("Failed to create {}: {:?}", dir.display(), e);
            std::process::exit(1);
        }
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal.cancel();
    });

    tracing::info!(server = %config.server, source = %config.token, "Viewer started");
    let mut session = ViewerSession::new(source, config.token.clone(), config.poller);
    let token = config.token.clone();

    session
        .run(
            move |clip: &LocalClip| {
                tracing::info!(
                    source = %token,
                    clip = clip.clip_number,
                    bytes = clip.payload.len(),
                    duration = clip.duration,
                    "Playing clip"
                );
                if let Some(dir) = &out_dir {
                    let path = dir.join(format!("{}_{:06}.mp4", token, clip.clip_number));
                    let payload = clip.payload.clone();
                    tokio::spawn(async move {
                        if let Err(e) = tokio::fs::write(&path, payload).await {
                            tracing::warn!(path = %path.display(), error = %e, "Failed to write clip");
                        }
                    });
                }
            },
            shutdown,
        )
        .await;

    tracing::info!(
        dropped = session.poller().dropped(),
        "Viewer stopped"
    );
}
