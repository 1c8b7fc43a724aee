//! Line-oriented view layer that renders gallery notifications.

use std::collections::HashMap;
use std::io::{self, Write};

use log::{debug, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::count_aggregator::format_counts_label;
use crate::gallery::{artist_label, display_name};
use crate::protocol::{Artist, GalleryMessage, ImageOutcome, Message};

/// Which notifications end a [`TerminalView::run_until`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewGoal {
    /// A rendered page plus its image and count batches.
    PageComplete,
    /// One image batch.
    ImagesFinished,
    /// One count batch.
    CountsFinished,
}

#[derive(Debug, Default)]
struct Progress {
    page_seen: bool,
    empty_page: bool,
    images_done: bool,
    counts_done: bool,
    worker_stopped: bool,
}

/// Prints gallery notifications received over the bus.
pub struct TerminalView<W: Write> {
    bus_consumer: Receiver<Message>,
    out: W,
    filters_active: bool,
    result_limit: u32,
    artists: HashMap<String, Artist>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(bus_consumer: Receiver<Message>, out: W, result_limit: u32) -> Self {
        Self {
            bus_consumer,
            out,
            filters_active: false,
            result_limit,
            artists: HashMap::new(),
        }
    }

    /// Whether counts are shown as `[filtered/total]`.
    pub fn set_filters_active(&mut self, filters_active: bool) {
        self.filters_active = filters_active;
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn label_for(&self, artist_name: &str) -> String {
        self.artists
            .get(artist_name)
            .map(artist_label)
            .unwrap_or_else(|| display_name(artist_name))
    }

    fn render(&mut self, message: &GalleryMessage, progress: &mut Progress) -> io::Result<()> {
        match message {
            GalleryMessage::PageRendered {
                title,
                artists,
                page,
                remaining,
                total_matches,
            } => {
                progress.page_seen = true;
                writeln!(self.out, "== {title} ==")?;
                if artists.is_empty() {
                    progress.empty_page = true;
                    writeln!(self.out, "No artists found matching your criteria.")?;
                    return Ok(());
                }
                writeln!(
                    self.out,
                    "Page {} ({} of {} artist(s))",
                    page + 1,
                    artists.len(),
                    total_matches
                )?;
                for artist in artists {
                    self.artists
                        .insert(artist.artist_name.clone(), artist.clone());
                }
                if *remaining > 0 {
                    writeln!(self.out, "Load more: {remaining} remaining")?;
                }
            }
            GalleryMessage::ImageResolved {
                artist_name,
                outcome,
            } => {
                let label = self.label_for(artist_name);
                match outcome {
                    ImageOutcome::Display { url } => writeln!(self.out, "{label}: {url}")?,
                    ImageOutcome::NoEntries { message } => {
                        writeln!(self.out, "{label}: {message}")?
                    }
                }
            }
            GalleryMessage::CountsUpdated {
                artist_name,
                counts,
            } => {
                let label = self.label_for(artist_name);
                writeln!(
                    self.out,
                    "{label} {}",
                    format_counts_label(*counts, self.filters_active, self.result_limit)
                )?;
            }
            GalleryMessage::ImagesBatchFinished { resolved } => {
                debug!("Image batch finished ({} resolved)", resolved);
                progress.images_done = true;
            }
            GalleryMessage::CountsBatchFinished { counted } => {
                debug!("Count batch finished ({} counted)", counted);
                progress.counts_done = true;
            }
            GalleryMessage::DataLoadFailed(reason) => {
                writeln!(self.out, "Failed to load required data files: {reason}")?;
            }
            GalleryMessage::WorkerStopped(reason) => {
                progress.worker_stopped = true;
                writeln!(self.out, "Gallery worker stopped: {reason}")?;
            }
            GalleryMessage::ShowPage(_)
            | GalleryMessage::ResolveImages { .. }
            | GalleryMessage::RequestCounts { .. }
            | GalleryMessage::Shutdown => {}
        }
        Ok(())
    }

    fn goal_reached(goal: ViewGoal, progress: &Progress) -> bool {
        if progress.worker_stopped {
            return true;
        }
        match goal {
            ViewGoal::PageComplete => {
                progress.page_seen
                    && (progress.empty_page || (progress.images_done && progress.counts_done))
            }
            ViewGoal::ImagesFinished => progress.images_done,
            ViewGoal::CountsFinished => progress.counts_done,
        }
    }

    /// Renders whatever is already queued without blocking.
    pub fn render_pending(&mut self) -> io::Result<()> {
        let mut progress = Progress::default();
        while let Ok(Message::Gallery(message)) = self.bus_consumer.try_recv() {
            self.render(&message, &mut progress)?;
        }
        self.out.flush()
    }

    /// Renders notifications until `goal` is met or the bus closes.
    pub fn run_until(&mut self, goal: ViewGoal) -> io::Result<()> {
        let mut progress = Progress::default();
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Gallery(message)) => {
                    self.render(&message, &mut progress)?;
                    if Self::goal_reached(goal, &progress) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("TerminalView lagged on bus, skipped {} message(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        self.out.flush()
    }
}
