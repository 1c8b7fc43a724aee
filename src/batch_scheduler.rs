//! Chunked, throttled fan-out over an ordered work list.

use std::thread;
use std::time::Duration;

use log::debug;

/// Runs `work` over `items` in chunks of `batch_size`, pausing `delay`
/// between chunks. Results keep input order.
///
/// Items of one chunk run concurrently and the whole chunk settles before the
/// run either continues or fails. The error returned is the one from the
/// lowest failing index of that chunk; later chunks never start.
pub fn run_batched<T, R, E, F>(
    items: &[T],
    batch_size: usize,
    delay: Duration,
    work: F,
) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    let batch_size = batch_size.max(1);
    let chunk_count = items.len().div_ceil(batch_size);
    let mut results = Vec::with_capacity(items.len());
    for (chunk_index, chunk) in items.chunks(batch_size).enumerate() {
        debug!(
            "Running batch {}/{} ({} items)",
            chunk_index + 1,
            chunk_count,
            chunk.len()
        );
        for result in run_chunk(chunk, &work) {
            results.push(result?);
        }
        if chunk_index + 1 < chunk_count && !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    Ok(results)
}

fn run_chunk<T, R, E, F>(chunk: &[T], work: &F) -> Vec<Result<R, E>>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    thread::scope(|scope| {
        let handles: Vec<_> = chunk
            .iter()
            .map(|item| scope.spawn(move || work(item)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
