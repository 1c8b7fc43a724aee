mod app_bootstrap;
mod app_context;
mod availability;
mod batch_scheduler;
mod booru;
mod config;
mod config_persistence;
mod count_aggregator;
mod db_manager;
mod gallery;
mod gallery_manager;
mod image_pipeline;
mod image_resolver;
mod kv_cache;
mod protocol;
mod query_client;
mod static_data;
mod terminal_view;

use std::{io, path::PathBuf};

use clap::Parser;
use log::{debug, info, warn};

use app_bootstrap::services::spawn_background_services;
use app_context::AppContext;
use config_persistence::{default_config_path, load_config_file};
use gallery::{pick_taunt, random_background, search_tags, ActiveTags, CopiedArtists};
use protocol::{Artist, GalleryMessage, GalleryQuery, Message};
use static_data::load_static_data;
use terminal_view::{TerminalView, ViewGoal};

/// Browse artists and their representative images from the command line.
#[derive(Debug, Parser)]
#[command(name = "kexplorer", version, about)]
struct Cli {
    /// Config file to use instead of the per-user default.
    #[arg(long, env = "KEXPLORER_CONFIG")]
    config: Option<PathBuf>,

    /// Only show artists carrying this tag. Repeatable; naming a tag again turns it off.
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Case-insensitive artist name filter.
    #[arg(long, value_name = "TEXT", default_value = "")]
    name: String,

    /// One-based page number.
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Re-resolve one artist's image, ignoring the durable cache.
    #[arg(long, value_name = "ARTIST")]
    reload: Option<String>,

    /// Print total and filtered post counts for one artist.
    #[arg(long, value_name = "ARTIST")]
    counts: Option<String>,

    /// Print the search text for an artist and list everything copied so far. Repeatable.
    #[arg(long = "copy", value_name = "ARTIST")]
    copy: Vec<String>,

    /// Empty the session and durable caches before doing anything else.
    #[arg(long)]
    clear_cache: bool,

    /// List catalog tags containing TEXT, then exit.
    #[arg(long, value_name = "TEXT")]
    tag_search: Option<String>,
}

fn init_logging() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn print_copied_artists(cli: &Cli, artists: &[Artist]) {
    let mut copied = CopiedArtists::default();
    for artist_name in &cli.copy {
        println!("Copied: {}", copied.copy(artist_name));
    }
    if copied.is_empty() {
        return;
    }
    println!("Copied artists ({}):", copied.len());
    for entry in copied.entries(artists) {
        match entry.thumbnail_url {
            Some(thumbnail_url) => println!(
                "  {} <{}> [{}] {}",
                entry.label, entry.artist_name, thumbnail_url, entry.tooltip
            ),
            None => println!("  {} <{}> {}", entry.label, entry.artist_name, entry.tooltip),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    let config_file = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config_file(&config_file);
    log::set_max_level(config.logging.level.as_filter());
    debug!("Loaded config from {}", config_file.display());

    let ctx = AppContext::from_config(config)?;
    if cli.clear_cache {
        if ctx.clear_caches() {
            info!("Cleared session and durable caches");
        } else {
            warn!("Some cache entries could not be cleared");
        }
    }

    let result_limit = ctx.query_client.endpoint().result_limit();
    let mut view = TerminalView::new(ctx.bus_sender.subscribe(), io::stdout(), result_limit);

    let data = match load_static_data(&ctx.config.gallery.data_dir) {
        Ok(data) => data,
        Err(err) => {
            let _ = ctx
                .bus_sender
                .send(Message::Gallery(GalleryMessage::DataLoadFailed(err.to_string())));
            view.render_pending()?;
            return Err(err.into());
        }
    };

    if let Some(search) = &cli.tag_search {
        let catalog = data.tag_catalog();
        let matches = search_tags(&catalog, search);
        if matches.is_empty() {
            println!("No tags found.");
        }
        for tag in matches {
            match data.tag_tooltips.get(tag) {
                Some(tooltip) => println!("{} - {}", tag.replace('_', " "), tooltip),
                None => println!("{}", tag.replace('_', " ")),
            }
        }
        return Ok(());
    }

    if ctx.config.api.startup_health_check {
        ctx.availability_probe().check(&ctx.gate);
    }

    let active_tags = ActiveTags::from_tags(&cli.tags);
    let mut rng = rand::thread_rng();
    for tag in active_tags.as_slice() {
        if let Some(taunt) = pick_taunt(&data, Some(tag), &mut rng) {
            println!("{} {}", tag.replace('_', " "), taunt);
        }
    }
    if let Some(background) = random_background(&data.artists, &mut rng) {
        debug!("Background image: {}", background);
    }

    let worker = spawn_background_services(&ctx, data.artists.clone())?;
    view.set_filters_active(!active_tags.is_empty());

    let command = if let Some(artist_name) = &cli.reload {
        let artist = data
            .artists
            .iter()
            .find(|artist| &artist.artist_name == artist_name)
            .cloned()
            .unwrap_or_else(|| Artist::named(artist_name));
        (
            GalleryMessage::ResolveImages {
                artists: vec![artist],
                force_reload: true,
            },
            ViewGoal::ImagesFinished,
        )
    } else if let Some(artist_name) = &cli.counts {
        (
            GalleryMessage::RequestCounts {
                artists: vec![Artist::named(artist_name)],
                active_tags: active_tags.as_slice().to_vec(),
            },
            ViewGoal::CountsFinished,
        )
    } else {
        (
            GalleryMessage::ShowPage(GalleryQuery {
                name_filter: cli.name.trim().to_string(),
                active_tags: active_tags.as_slice().to_vec(),
                page: cli.page.saturating_sub(1),
            }),
            ViewGoal::PageComplete,
        )
    };
    let (request, goal) = command;
    let _ = ctx.bus_sender.send(Message::Gallery(request));
    view.run_until(goal)?;

    print_copied_artists(&cli, &data.artists);

    let _ = ctx.bus_sender.send(Message::Gallery(GalleryMessage::Shutdown));
    if worker.join().is_err() {
        warn!("Gallery worker exited abnormally");
    }
    info!("Application exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn test_cli_collects_repeated_tags_and_defaults() {
        let cli = Cli::try_parse_from([
            "kexplorer",
            "--tag",
            "solo",
            "--tag",
            "smile",
            "--name",
            "foo",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.tags, vec!["solo", "smile"]);
        assert_eq!(cli.name, "foo");
        assert_eq!(cli.page, 1);
        assert!(!cli.clear_cache);
        assert_eq!(cli.reload, None);
    }

    #[test]
    fn test_cli_parses_single_artist_actions() {
        let cli = Cli::try_parse_from([
            "kexplorer",
            "--reload",
            "foo_bar",
            "--copy",
            "foo_bar",
            "--clear-cache",
            "--tag-search",
            "bim",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.reload.as_deref(), Some("foo_bar"));
        assert_eq!(cli.copy, vec!["foo_bar"]);
        assert!(cli.clear_cache);
        assert_eq!(cli.tag_search.as_deref(), Some("bim"));
    }
}
