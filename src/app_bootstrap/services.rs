use std::{any::Any, thread};

use log::error;
use tokio::sync::broadcast::Sender;

use crate::{
    app_context::AppContext,
    protocol::{Artist, GalleryMessage, Message},
};

pub(crate) fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

/// Runs `worker`, announcing a panic on the bus so waiting views can stop.
fn run_guarded(bus_producer: &Sender<Message>, worker: impl FnOnce()) {
    let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(worker));
    if let Err(payload) = run_result {
        let reason = panic_payload_to_string(payload.as_ref());
        error!("GalleryManager thread terminated due to panic: {}", reason);
        let _ = bus_producer.send(Message::Gallery(GalleryMessage::WorkerStopped(reason)));
    }
}

/// Starts the gallery worker on its own named thread.
pub(crate) fn spawn_background_services(
    ctx: &AppContext,
    artists: Vec<Artist>,
) -> std::io::Result<thread::JoinHandle<()>> {
    let mut gallery_manager = ctx.gallery_manager(artists);
    let bus_producer = ctx.bus_sender.clone();
    thread::Builder::new()
        .name("gallery-manager".to_string())
        .spawn(move || {
            run_guarded(&bus_producer, || gallery_manager.run());
        })
}
