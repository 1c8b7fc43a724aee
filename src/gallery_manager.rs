//! Gallery runtime worker.
//!
//! Owns the loaded artist list and turns page, image and count requests from
//! the bus into batched resolver calls, publishing each outcome as it lands.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::batch_scheduler::run_batched;
use crate::count_aggregator::CountAggregator;
use crate::gallery::{page_title, paginate};
use crate::image_resolver::ImageResolver;
use crate::protocol::{Artist, GalleryMessage, GalleryQuery, Message};

/// Batching and paging knobs taken from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GallerySettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub items_per_page: usize,
}

fn emit(bus_producer: &Sender<Message>, message: GalleryMessage) {
    let _ = bus_producer.send(Message::Gallery(message));
}

/// Executes gallery requests received over the event bus.
pub struct GalleryManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    artists: Vec<Artist>,
    image_resolver: Arc<ImageResolver>,
    count_aggregator: Arc<CountAggregator>,
    settings: GallerySettings,
}

impl GalleryManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        artists: Vec<Artist>,
        image_resolver: Arc<ImageResolver>,
        count_aggregator: Arc<CountAggregator>,
        settings: GallerySettings,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            artists,
            image_resolver,
            count_aggregator,
            settings,
        }
    }

    fn emit(&self, message: GalleryMessage) {
        emit(&self.bus_producer, message);
    }

    fn show_page(&self, query: &GalleryQuery) {
        let page = paginate(&self.artists, query, self.settings.items_per_page);
        let artists: Vec<Artist> = page.artists.into_iter().cloned().collect();
        info!(
            "Showing page {} with {} artist(s), {} more match(es)",
            page.page + 1,
            artists.len(),
            page.remaining
        );
        self.emit(GalleryMessage::PageRendered {
            title: page_title(&query.active_tags, &query.name_filter),
            artists: artists.clone(),
            page: page.page,
            remaining: page.remaining,
            total_matches: page.total_matches,
        });
        if artists.is_empty() {
            return;
        }
        self.resolve_images(&artists, false);
        self.request_counts(&artists, &query.active_tags);
    }

    fn resolve_images(&self, artists: &[Artist], force_reload: bool) {
        let resolver = &self.image_resolver;
        let bus_producer = &self.bus_producer;
        let outcomes = run_batched(
            artists,
            self.settings.batch_size,
            self.settings.batch_delay,
            |artist| {
                let outcome = resolver.resolve_image(artist, force_reload);
                emit(
                    bus_producer,
                    GalleryMessage::ImageResolved {
                        artist_name: artist.artist_name.clone(),
                        outcome: outcome.clone(),
                    },
                );
                Ok::<_, Infallible>(outcome)
            },
        )
        .unwrap_or_else(|never| match never {});
        debug!("Resolved {} image(s)", outcomes.len());
        self.emit(GalleryMessage::ImagesBatchFinished {
            resolved: outcomes.len(),
        });
    }

    fn request_counts(&self, artists: &[Artist], active_tags: &[String]) {
        let aggregator = &self.count_aggregator;
        let bus_producer = &self.bus_producer;
        let counted = run_batched(
            artists,
            self.settings.batch_size,
            self.settings.batch_delay,
            |artist| {
                let counts = aggregator.counts_for(&artist.artist_name, active_tags);
                emit(
                    bus_producer,
                    GalleryMessage::CountsUpdated {
                        artist_name: artist.artist_name.clone(),
                        counts,
                    },
                );
                Ok::<_, Infallible>(counts)
            },
        )
        .unwrap_or_else(|never| match never {});
        self.emit(GalleryMessage::CountsBatchFinished {
            counted: counted.len(),
        });
    }

    /// Starts the blocking event loop.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Gallery(GalleryMessage::ShowPage(query))) => {
                    self.show_page(&query);
                }
                Ok(Message::Gallery(GalleryMessage::ResolveImages {
                    artists,
                    force_reload,
                })) => {
                    self.resolve_images(&artists, force_reload);
                }
                Ok(Message::Gallery(GalleryMessage::RequestCounts {
                    artists,
                    active_tags,
                })) => {
                    self.request_counts(&artists, &active_tags);
                }
                Ok(Message::Gallery(GalleryMessage::Shutdown)) => {
                    debug!("GalleryManager shutting down");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "GalleryManager lagged on control bus, skipped {} message(s)",
                        skipped
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
