use std::io::{self, Cursor};

use bytes::Bytes;
use futures_util::{pin_mut, stream, StreamExt};
use serde_json::json;
use streamdecode::streaming::{select_from_async_read, select_from_bytes, select_stream};
use streamdecode::{PathExpression, PathKey, StreamError};

const DOC: &str = r#"{"items": [{"id": 1}, {"id": 2}, {"id": 3}], "done": true}"#;

#[tokio::test]
async fn test_select_stream_over_async_reader() {
    let reader = Cursor::new(DOC.as_bytes().to_vec());
    let items = select_stream(reader, "/items/*".parse().unwrap());
    pin_mut!(items);

    let mut ids = Vec::new();
    while let Some(item) = items.next().await {
        let (key, value) = item.unwrap();
        ids.push((key, value["id"].clone()));
    }
    assert_eq!(
        ids,
        vec![(PathKey::Index(0), json!(1)), (PathKey::Index(1), json!(2)), (PathKey::Index(2), json!(3))]
    );
}

#[tokio::test]
async fn test_receiver_delivers_terminal_error() {
    let reader = Cursor::new(b"[1, 2, ]".to_vec());
    let mut rx = select_from_async_read(reader, PathExpression::default());

    assert_eq!(rx.recv().await.unwrap().unwrap().1, json!(1));
    assert_eq!(rx.recv().await.unwrap().unwrap().1, json!(2));
    assert!(matches!(rx.recv().await, Some(Err(StreamError::Structural { offset: 7, .. }))));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_dropping_receiver_stops_worker() {
    let mut doc = String::from("[");
    for i in 0..10_000 {
        if i > 0 {
            doc.push(',');
        }
        doc.push_str(&i.to_string());
    }
    doc.push(']');

    let mut rx = select_from_async_read(Cursor::new(doc.into_bytes()), PathExpression::default());
    assert_eq!(rx.recv().await.unwrap().unwrap().1, json!(0));
    drop(rx);
}

#[tokio::test]
async fn test_select_from_chunked_bytes() {
    // chunk boundaries fall inside a key, a multi-byte character, and a number
    let chunks = vec![
        Ok::<_, io::Error>(Bytes::from_static(b"{\"ite")),
        Ok(Bytes::from_static(b"ms\": [\"caf\xc3")),
        Ok(Bytes::from_static(b"\xa9\", 12")),
        Ok(Bytes::from_static(b"34.5]}")),
    ];
    let items = select_from_bytes(stream::iter(chunks), "/items/*".parse().unwrap());
    let collected: Vec<_> = items.collect().await;
    let values: Vec<_> = collected.into_iter().map(|item| item.unwrap().1).collect();
    assert_eq!(values, vec![json!("caf\u{e9}"), json!(1234.5)]);
}

#[tokio::test]
async fn test_byte_stream_errors_surface_as_source_read() {
    let chunks = vec![
        Ok(Bytes::from_static(b"[1, 2, ")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
    ];
    let items = select_from_bytes(stream::iter(chunks), PathExpression::default());
    let collected: Vec<_> = items.collect().await;

    assert_eq!(collected.len(), 3);
    assert!(collected[0].is_ok());
    assert!(collected[1].is_ok());
    match &collected[2] {
        Err(StreamError::SourceRead(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected a source read error, got {other:?}"),
    }
}
