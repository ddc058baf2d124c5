//! Tests against a real socket through the `reqwest` client.

use placesync_engine::{
    Completion, HttpClient, HttpRequest, Method, ReqwestClient, RetryConfig, SaveFilter, SyncConfig,
    SyncEngine,
};
use placesync_model::Record;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accepts connections, counts `POST`s, and answers each one only after `delay`.
fn slow_server(delay: Duration) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/places", listener.local_addr().unwrap());
    let posts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posts);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while head.len() < 4 {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                if head.starts_with(b"POST") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(delay);
                let _ = stream.write_all(
                    b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
                );
            });
        }
    });

    (url, posts)
}

#[test]
fn read_timeout_is_not_retryable() {
    let (url, posts) = slow_server(Duration::from_millis(800));
    let client = ReqwestClient::new(Duration::from_millis(200)).unwrap();

    let err = client
        .execute(&HttpRequest::new(Method::Post, url).body(b"{}".to_vec()))
        .unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(posts.load(Ordering::SeqCst), 1);
}

#[test]
fn timed_out_create_is_sent_once() {
    let (url, posts) = slow_server(Duration::from_millis(800));
    let config = SyncConfig::new(url, "k")
        .with_timeout(Duration::from_millis(200))
        .with_retry(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        );
    let client = ReqwestClient::new(config.timeout).unwrap();
    let engine = SyncEngine::new(config, client).unwrap();

    let summary = engine
        .save(vec![Record::default()], SaveFilter::all(), &|_: Completion| {})
        .unwrap();

    assert_eq!(summary.abandoned, 1);
    assert_eq!(posts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.stats().retries, 0);
}
