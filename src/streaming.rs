//! Async front-ends for the synchronous [`Selector`].
//!
//! The selector itself never blocks on anything but its source, so the async
//! adapters run it on a blocking worker, bridge the async reader into
//! `std::io::Read`, and hand items back over a bounded channel. Dropping the
//! receiving side stops the worker at its next send.

use std::io;

use async_stream::stream;
use bytes::Bytes;
use futures_core::stream::Stream;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::debug;

use crate::error::StreamError;
use crate::path::{PathExpression, PathKey};
use crate::selector::Selector;

pub type SelectedItem = Result<(PathKey, Value), StreamError>;

pub const CHANNEL_CAPACITY: usize = 64;

/// Spawn a blocking task that selects from an `AsyncRead` and sends every
/// item, including a terminal error, through the returned receiver.
///
/// Must be called from within a tokio runtime.
pub fn select_from_async_read<R>(reader: R, path: PathExpression) -> mpsc::Receiver<SelectedItem>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let bridge = SyncIoBridge::new(reader);
    tokio::task::spawn_blocking(move || {
        debug!(target: "streamdecode::streaming", %path, "spawned blocking selector");
        let mut selector = Selector::new(bridge, path);
        for item in selector.by_ref() {
            if tx.blocking_send(item).is_err() {
                debug!(target: "streamdecode::streaming", "receiver dropped, stopping selector");
                return;
            }
        }
        debug!(target: "streamdecode::streaming", items = selector.items_yielded(), state = ?selector.state(), "selector finished");
    });
    rx
}

/// Stream variant (no channel exposed) of [`select_from_async_read`].
pub fn select_stream<R>(reader: R, path: PathExpression) -> impl Stream<Item = SelectedItem>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut rx = select_from_async_read(reader, path);
    stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    }
}

/// Select from a stream of byte chunks, such as an HTTP response body.
pub fn select_from_bytes<S, E>(byte_stream: S, path: PathExpression) -> impl Stream<Item = SelectedItem>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: Into<io::Error> + Send + 'static,
{
    select_stream(StreamReader::new(byte_stream), path)
}
