//! Integration tests for a line endpoint against a loopback TCP peer.
//!
//! Each test binds a listener on an ephemeral port, so nothing external is
//! needed.

use parking_lot::Mutex;
use setu_io::{Channel, Error, EventPacket, LineEndpoint, Message, SessionConfig};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn config_for(listener: &TcpListener) -> SessionConfig {
    SessionConfig {
        poll_interval: 0.1,
        ..SessionConfig::with_address(listener.local_addr().unwrap().to_string())
    }
}

fn record(endpoint: &LineEndpoint, channel: Channel) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    endpoint.subscribe(
        "recorder",
        move |pkt: &EventPacket<Message>| {
            seen_clone.lock().push(pkt.payload.to_string());
            Ok(())
        },
        channel,
        None,
    );
    seen
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn open_with_peer(listener: &TcpListener, endpoint: &LineEndpoint) -> TcpStream {
    endpoint.open(&config_for(listener)).unwrap();
    let (peer, _) = listener.accept().unwrap();
    peer
}

#[test]
fn test_ping_pong_scenario() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = LineEndpoint::new(config_for(&listener)).unwrap();
    let tx = record(&endpoint, Channel::Tx);
    let rx = record(&endpoint, Channel::Rx);
    let mut peer = open_with_peer(&listener, &endpoint);

    endpoint.send("ping").unwrap();
    let mut line = String::new();
    BufReader::new(peer.try_clone().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line, "ping\r\n");
    assert!(wait_until(|| tx.lock().len() == 1));
    assert_eq!(tx.lock()[0], "ping");

    peer.write_all(b"pong\n").unwrap();
    assert!(wait_until(|| rx.lock().len() == 1));
    assert_eq!(rx.lock()[0], "pong\n");

    let start = Instant::now();
    endpoint.close();
    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(!endpoint.is_running());
    assert!(endpoint.stage_health().iter().all(|s| !s.alive));
    assert!(endpoint.stage_health().iter().all(|s| s.failure.is_none()));
}

#[test]
fn test_sends_arrive_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = LineEndpoint::new(config_for(&listener)).unwrap();
    let tx = record(&endpoint, Channel::Tx);
    let peer = open_with_peer(&listener, &endpoint);

    let expected: Vec<String> = (0..50).map(|i| format!("line {}", i)).collect();
    for line in &expected {
        endpoint.send(line.as_str()).unwrap();
    }

    let mut reader = BufReader::new(peer);
    for line in &expected {
        let mut got = String::new();
        reader.read_line(&mut got).unwrap();
        assert_eq!(got, format!("{}\r\n", line));
    }
    assert!(wait_until(|| tx.lock().len() == expected.len()));
    assert_eq!(*tx.lock(), expected);
    endpoint.close();
}

#[test]
fn test_split_terminator_flushes_once() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = LineEndpoint::new(config_for(&listener)).unwrap();
    let rx = record(&endpoint, Channel::Rx);
    let mut peer = open_with_peer(&listener, &endpoint);

    peer.write_all(b"abc\r").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(rx.lock().is_empty());
    peer.write_all(b"\n").unwrap();
    assert!(wait_until(|| !rx.lock().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*rx.lock(), vec!["abc\r\n"]);
    endpoint.close();
}

#[test]
fn test_open_refused_starts_no_stages() {
    // Bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = SessionConfig::with_address(format!("127.0.0.1:{}", port));
    let endpoint = LineEndpoint::new(config.clone()).unwrap();

    let err = endpoint.open(&config).unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "{err}");
    assert!(!endpoint.is_running());
    assert!(endpoint.stage_health().iter().all(|s| !s.alive));
    endpoint.close();
}

#[test]
fn test_malformed_address_is_config_error() {
    let config = SessionConfig::with_address("no-port-here");
    let endpoint = LineEndpoint::new(config.clone()).unwrap();
    assert!(matches!(endpoint.open(&config), Err(Error::Config(_))));
}

#[test]
fn test_peer_disconnect_ends_reader_only() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = LineEndpoint::new(config_for(&listener)).unwrap();
    let peer = open_with_peer(&listener, &endpoint);
    drop(peer);

    assert!(wait_until(|| !endpoint.stage_health()[0].alive));
    let health = endpoint.stage_health();
    assert!(health[0].failure.is_some());
    assert!(health[1].alive);
    assert!(endpoint.is_running());
    endpoint.close();
}

#[test]
fn test_failing_rx_callback_is_observable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = LineEndpoint::new(config_for(&listener)).unwrap();
    endpoint.subscribe("faulty", |_| Err("bad subscriber".into()), Channel::Rx, None);
    let tx = record(&endpoint, Channel::Tx);
    let mut peer = open_with_peer(&listener, &endpoint);

    peer.write_all(b"boom\n").unwrap();
    assert!(wait_until(|| !endpoint.stage_health()[1].alive));
    let failure = endpoint.stage_health()[1].failure.clone().unwrap();
    assert!(failure.contains("faulty"), "{failure}");

    endpoint.send("still here").unwrap();
    assert!(wait_until(|| tx.lock().len() == 1));
    assert!(endpoint.stage_health()[2].alive);
    endpoint.close();
}

#[test]
fn test_beacon_until_close() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = Arc::new(LineEndpoint::new(config_for(&listener)).unwrap());
    let peer = open_with_peer(&listener, &endpoint);

    let closer = Arc::clone(&endpoint);
    let reader = thread::spawn(move || {
        let mut reader = BufReader::new(peer);
        let mut lines = Vec::new();
        for _ in 0..3 {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            lines.push(line);
        }
        closer.close();
        lines
    });

    let sent = endpoint.beacon(20.0, "hello").unwrap();
    let lines = reader.join().unwrap();
    assert!(sent >= 3);
    assert!(lines.iter().all(|l| l == "hello\r\n"));
}
