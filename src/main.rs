/// Atlas Account - multi-tenant game account service
///
/// Handles account registration, login, credential binding, deletion
/// lifecycle and real-name verification across sharded storage.

mod account;
mod api;
mod cache;
mod captcha;
mod codes;
mod config;
mod context;
mod error;
mod jobs;
mod limit;
mod mailer;
mod server;
mod shard;
mod tenant;
mod token;
mod uid;
mod validation;

use config::ServerConfig;
use context::AppContext;
use error::AtlasResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AtlasResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_account=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Print banner
    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ___   __  __
   /   | / /_/ /___ ______
  / /| |/ __/ / __ `/ ___/
 / ___ / /_/ / /_/ (__  )
/_/  |_\__/_/\__,_/____/

        Atlas Account Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
