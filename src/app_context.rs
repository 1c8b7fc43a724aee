//! Composition root: every shared handle the runtime needs, built once in `main`.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

use crate::{
    availability::{AvailabilityGate, AvailabilityProbe},
    booru::{
        danbooru::{DanbooruEndpoint, UreqTransport},
        SearchTransport,
    },
    config::Config,
    config_persistence::default_durable_cache_path,
    count_aggregator::CountAggregator,
    db_manager::DbManager,
    gallery_manager::{GalleryManager, GallerySettings},
    image_pipeline::{HttpImageProbe, ImageProbe},
    image_resolver::ImageResolver,
    kv_cache::{CacheScope, KeyValueCache, StorageError, StorageMedium},
    protocol::{Artist, Message},
    query_client::QueryClient,
};

const BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) config: Config,
    pub(crate) gate: AvailabilityGate,
    pub(crate) session_cache: KeyValueCache,
    pub(crate) durable_cache: KeyValueCache,
    pub(crate) transport: Arc<dyn SearchTransport>,
    pub(crate) query_client: Arc<QueryClient>,
    pub(crate) image_resolver: Arc<ImageResolver>,
    pub(crate) count_aggregator: Arc<CountAggregator>,
    pub(crate) bus_sender: broadcast::Sender<Message>,
}

impl AppContext {
    /// Opens the durable cache and the HTTP clients described by `config`.
    pub(crate) fn from_config(config: Config) -> Result<Self, StorageError> {
        let durable_path = config
            .cache
            .durable_path
            .clone()
            .unwrap_or_else(default_durable_cache_path);
        info!("Opening durable cache at {}", durable_path.display());
        let durable_medium = Arc::new(DbManager::new(&durable_path)?);
        let transport = Arc::new(UreqTransport::new(&config.api));
        let probe = Arc::new(HttpImageProbe::new(&config.api));
        Ok(Self::with_parts(config, durable_medium, transport, probe))
    }

    /// Wires the components over explicit collaborators.
    pub(crate) fn with_parts(
        config: Config,
        durable_medium: Arc<dyn StorageMedium>,
        transport: Arc<dyn SearchTransport>,
        probe: Arc<dyn ImageProbe>,
    ) -> Self {
        let gate = AvailabilityGate::new();
        let session_cache = KeyValueCache::session(config.cache.session_quota_bytes);
        let durable_cache = KeyValueCache::new(CacheScope::Durable, durable_medium);
        let query_client = Arc::new(
            QueryClient::new(
                gate.clone(),
                session_cache.clone(),
                transport.clone(),
                DanbooruEndpoint::from_config(&config.api),
            )
            .with_rate_limit(
                config.api.max_requests_per_second,
                Duration::from_millis(config.api.rate_limit_wait_ms),
            ),
        );
        let image_resolver = Arc::new(ImageResolver::new(
            durable_cache.clone(),
            query_client.clone(),
            probe,
        ));
        let count_aggregator = Arc::new(CountAggregator::new(query_client.clone()));
        let (bus_sender, _) = broadcast::channel(BUS_CAPACITY);

        Self {
            config,
            gate,
            session_cache,
            durable_cache,
            transport,
            query_client,
            image_resolver,
            count_aggregator,
            bus_sender,
        }
    }

    pub(crate) fn availability_probe(&self) -> AvailabilityProbe {
        AvailabilityProbe::new(
            DanbooruEndpoint::from_config(&self.config.api),
            self.transport.clone(),
        )
    }

    pub(crate) fn gallery_settings(&self) -> GallerySettings {
        GallerySettings {
            batch_size: self.config.batch.size,
            batch_delay: Duration::from_millis(self.config.batch.delay_ms),
            items_per_page: self.config.gallery.items_per_page,
        }
    }

    /// Builds a gallery worker subscribed to the bus.
    pub(crate) fn gallery_manager(&self, artists: Vec<Artist>) -> GalleryManager {
        GalleryManager::new(
            self.bus_sender.subscribe(),
            self.bus_sender.clone(),
            artists,
            self.image_resolver.clone(),
            self.count_aggregator.clone(),
            self.gallery_settings(),
        )
    }

    /// Empties both cache tiers.
    pub(crate) fn clear_caches(&self) -> bool {
        let session_cleared = self.session_cache.clear();
        let durable_cleared = self.durable_cache.clear();
        session_cleared && durable_cleared
    }
}
