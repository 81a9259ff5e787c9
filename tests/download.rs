//! Download coordinator behavior against a local HTTP server.

use std::io::{Read as _, Write as _};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use reqwest::Client;

use chromium_fleet::{spawn_download, DownloadEvent, DownloadOutcome, ErrorKind};

struct TestServer {
    addr: SocketAddr,
}

fn drain_request(stream: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    let mut seen = Vec::new();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// Serve one request with the given status line and full body.
fn serve_once(status_line: &'static str, body: Vec<u8>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            drain_request(&mut stream);
            let header = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    TestServer { addr }
}

/// Serve one request dripping 8 KiB pieces until the client hangs up.
fn serve_slow() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            drain_request(&mut stream);
            let piece = [0u8; 8 * 1024];
            let pieces = 2000;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                piece.len() * pieces
            );
            if stream.write_all(header.as_bytes()).is_err() {
                return;
            }
            for _ in 0..pieces {
                if stream.write_all(&piece).is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
    });
    TestServer { addr }
}

#[tokio::test]
async fn download_completes_and_reports_progress() {
    let body = vec![0xA5u8; 64 * 1024];
    let server = serve_once("HTTP/1.1 200 OK", body.clone());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.zip");

    let mut task = spawn_download(
        Client::new(),
        format!("http://{}/file.zip", server.addr),
        dest.clone(),
    );
    let outcome = task.join.await.unwrap();
    assert!(outcome.is_completed());

    let mut finished = 0;
    let mut last_progress = 0;
    while let Some(event) = task.events.recv().await {
        match event {
            DownloadEvent::Progress { percent } => {
                assert!(percent >= last_progress, "progress went backwards");
                last_progress = percent;
            }
            DownloadEvent::Finished { outcome } => {
                finished += 1;
                assert_eq!(outcome, DownloadOutcome::Completed);
            }
            DownloadEvent::Status { .. } => {}
        }
    }
    assert_eq!(finished, 1);
    assert_eq!(last_progress, 100);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn cancelled_download_removes_the_partial_file() {
    let server = serve_slow();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.zip");

    let mut task = spawn_download(
        Client::new(),
        format!("http://{}/file.zip", server.addr),
        dest.clone(),
    );

    // Wait until bytes are actually flowing, then cancel.
    loop {
        match task.events.recv().await {
            Some(DownloadEvent::Progress { .. }) => break,
            Some(_) => {}
            None => panic!("event stream ended before any progress"),
        }
    }
    task.handle.cancel();

    let outcome = task.join.await.unwrap();
    assert_eq!(outcome, DownloadOutcome::Cancelled);
    assert!(!dest.exists());

    let mut finished = 0;
    while let Some(event) = task.events.recv().await {
        if let DownloadEvent::Finished { outcome } = event {
            finished += 1;
            assert_eq!(outcome, DownloadOutcome::Cancelled);
        }
    }
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn http_error_status_is_a_network_failure() {
    let server = serve_once("HTTP/1.1 404 Not Found", b"gone".to_vec());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.zip");

    let task = spawn_download(
        Client::new(),
        format!("http://{}/file.zip", server.addr),
        dest.clone(),
    );
    match task.join.await.unwrap() {
        DownloadOutcome::Failed { kind, message } => {
            assert_eq!(kind, ErrorKind::Network);
            assert!(message.contains("404"), "unexpected message: {message}");
        }
        other => panic!("expected a network failure, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn unwritable_destination_is_an_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    // The parent of the destination is a file, so creating it must fail.
    let dest = blocker.join("archive.zip");

    let task = spawn_download(
        Client::new(),
        "http://127.0.0.1:9/file.zip".to_string(),
        dest,
    );
    match task.join.await.unwrap() {
        DownloadOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Io),
        other => panic!("expected an io failure, got {other:?}"),
    }
}
