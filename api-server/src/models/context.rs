use getset::Getters;
use log::info;
use media_fetch_client::resolver::yt_dlp::YtDlp;
use media_fetch_client::resolver::SharedResolver;
use media_fetch_client::sweeper::Sweeper;
use media_fetch_client::MediaClient;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::config::Config;

#[derive(Getters)]
pub struct Context {
    #[get = "pub"]
    media_client: MediaClient,
    #[get = "pub"]
    config: Config,
    sweeper: Mutex<Option<Sweeper>>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(YtDlp::new(config.yt_dlp_path().clone(), config.format().clone()));
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: Config, resolver: SharedResolver) -> Self {
        let fetch_config = config.fetch_config();
        info!(
            "Initialized MediaClient (max duration: {}s, cache TTL: {}s, max entries: {}, cooldown: {}s)",
            config.max_duration_seconds(),
            config.cache_ttl_seconds(),
            config.cache_max_entries(),
            config.download_cooldown_seconds()
        );

        Self {
            media_client: MediaClient::with_resolver(fetch_config, resolver),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub async fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(self.media_client.start_sweeper());
        }
    }

    pub async fn stop_sweeper(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            info!("Stopping cache sweeper");
            sweeper.stop().await;
        }
    }
}

pub type ContextPointer = Arc<Context>;
