use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::info;

use tg_relaybot::cms::{GalleryStore, SanityClient};
use tg_relaybot::config;
use tg_relaybot::db;
use tg_relaybot::dispatch::BatchConfig;
use tg_relaybot::handlers::Relay;
use tg_relaybot::moderation::{ModerationPolicy, Moderator};
use tg_relaybot::server::{self, AppState, Secrets};
use tg_relaybot::site::{PageInvalidator, SiteClient};
use tg_relaybot::submission::{SubmissionPipeline, UploadLimits};
use tg_relaybot::telegram::{Messaging, TelegramGateway};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/relaybot.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let messaging: Arc<dyn Messaging> = Arc::new(TelegramGateway::new(bot));
    let store: Arc<dyn GalleryStore> = Arc::new(SanityClient::from_config(&cfg.sanity)?);
    let invalidator: Arc<dyn PageInvalidator> = Arc::new(SiteClient::from_config(&cfg.site));

    let policy = ModerationPolicy::from_config(&cfg.telegram);
    let moderator = Moderator::new(
        Arc::clone(&store),
        Arc::clone(&messaging),
        Arc::clone(&invalidator),
        policy.clone(),
    );
    let pipeline = SubmissionPipeline::new(
        pool.clone(),
        Arc::clone(&store),
        Arc::clone(&messaging),
        Arc::clone(&invalidator),
        policy.clone(),
        UploadLimits::from_app(&cfg.app),
        PathBuf::from(&cfg.app.data_dir).join("uploads"),
    );

    let relay = Arc::new(Relay {
        db: pool,
        messaging,
        store,
        invalidator,
        moderator,
        pipeline,
        policy,
        batch: BatchConfig::from_app(&cfg.app),
    });
    let state = AppState {
        relay,
        secrets: Arc::new(Secrets::from_config(&cfg)),
    };

    info!("starting notification relay");
    server::serve(state, &cfg.http.bind_addr).await
}
