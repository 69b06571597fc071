use std::{net::SocketAddr, sync::Arc};

use huddle::{
    config::Config,
    huddle_route,
    identity::{Directory, SeedUser},
    state::AppStateBuilder,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // Dev-mode identity: seed users from the environment until a real
    // provider is wired in behind the resolver traits.
    let directory = Arc::new(Directory::new());
    if let Ok(raw) = std::env::var("HUDDLE_SEED_USERS") {
        match serde_json::from_str::<Vec<SeedUser>>(&raw) {
            Ok(seeds) => {
                for seed in seeds {
                    directory.register(seed);
                }
            }
            Err(e) => {
                tracing::error!("failed to parse HUDDLE_SEED_USERS: {e}");
                return;
            }
        }
    }

    let state = match AppStateBuilder::new()
        .with_config(config.clone())
        .with_identity_resolver(directory.clone())
        .with_profile_resolver(directory)
        .build()
        .await
    {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("failed to build app state: {e}");
            return;
        }
    };

    let app = huddle_route(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap();

    tracing::info!("huddle listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
