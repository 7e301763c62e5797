// Integration smoke test for the relay server.
//
// Starts a relay on localhost and connects clients over real TCP: some are
// `CanvasClient`s, some are raw sockets using the protocol crate's framing
// directly (for sending bytes a well-behaved client never would). Exercises
// fan-out, history replay for late joiners, clear, abrupt disconnects, and
// malformed frames.

use std::io::{self, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use canvas_protocol::framing::{decode, send, write_frame};
use canvas_protocol::message::Message;
use canvas_relay::client::CanvasClient;
use canvas_relay::server::{RelayConfig, RelayHandle, start_relay};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing else is coming.
const QUIET_PERIOD: Duration = Duration::from_millis(150);

fn start_local_relay(max_history: Option<usize>) -> (RelayHandle, SocketAddr) {
    let config = RelayConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0, // OS picks a free port
        max_history,
    };
    start_relay(config).unwrap()
}

fn red_line() -> Message {
    Message::draw((0, 0), (10, 10), "red", 2)
}

fn join_notice() -> Message {
    Message::notice("New user joined from 127.0.0.1")
}

/// Helper: receive the next message or fail the test.
fn next(client: &CanvasClient) -> Message {
    client
        .recv_timeout(RECV_TIMEOUT)
        .expect("no message from relay within timeout")
}

/// Helper: assert that nothing arrives for a short while.
fn assert_quiet(client: &CanvasClient) {
    if let Some(msg) = client.recv_timeout(QUIET_PERIOD) {
        panic!("expected no message, got {msg:?}");
    }
}

/// Connect and wait for our own join notice, so the relay has finished
/// registering us before the test moves on.
fn join(addr: SocketAddr) -> CanvasClient {
    let client = CanvasClient::connect(addr).unwrap();
    // The notice names the address the relay accepted us from.
    let seen_as = Message::notice(format!("New user joined from {}", client.local_addr().ip()));
    assert_eq!(next(&client), seen_as);
    assert_eq!(seen_as, join_notice());
    client
}

/// Like `join`, but each client in `others` must see the join notice too.
fn join_observed(addr: SocketAddr, others: &[&CanvasClient]) -> CanvasClient {
    let client = join(addr);
    for other in others {
        assert_eq!(next(other), join_notice());
    }
    client
}

/// A raw socket speaking the framing directly.
struct RawPeer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl RawPeer {
    fn join(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut peer = Self {
            reader,
            writer: stream,
        };
        assert_eq!(peer.recv(), join_notice());
        peer
    }

    fn recv(&mut self) -> Message {
        decode(&mut self.reader).unwrap()
    }

    fn send_raw(&mut self, payload: &[u8]) {
        write_frame(&mut self.writer, payload).unwrap();
    }

    fn send(&mut self, msg: &Message) {
        send(&mut self.writer, msg).unwrap();
    }
}

#[test]
fn join_draw_replay_clear_scenario() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    let c = join_observed(addr, &[&a, &b]);

    a.send(&red_line()).unwrap();
    assert_eq!(next(&b), red_line());
    assert_eq!(next(&c), red_line());
    assert_quiet(&a);

    // D's replay is exactly the one stroke.
    let d = join_observed(addr, &[&a, &b, &c]);
    assert_eq!(next(&d), red_line());
    assert_quiet(&d);

    a.send_clear().unwrap();
    for peer in [&b, &c, &d] {
        assert_eq!(next(peer), Message::Clear);
    }
    assert_quiet(&a);

    // E joins after the clear: empty replay.
    let e = join_observed(addr, &[&a, &b, &c, &d]);
    assert_quiet(&e);

    handle.stop();
}

#[test]
fn draw_reaches_every_other_participant() {
    let (handle, addr) = start_local_relay(None);

    let mut clients: Vec<CanvasClient> = Vec::new();
    for _ in 0..6 {
        let others: Vec<&CanvasClient> = clients.iter().collect();
        let client = join_observed(addr, &others);
        clients.push(client);
    }

    let stroke = Message::draw((-4, 17), (300, 200), "#123456", 9);
    clients[3].send(&stroke).unwrap();
    for (i, client) in clients.iter().enumerate() {
        if i == 3 {
            assert_quiet(client);
        } else {
            assert_eq!(next(client), stroke);
        }
    }

    handle.stop();
}

#[test]
fn late_joiner_gets_history_before_new_traffic() {
    let (handle, addr) = start_local_relay(None);

    let mut painter = join(addr);
    let watcher = join_observed(addr, &[&painter]);
    let strokes: Vec<Message> = (0..25)
        .map(|n| Message::draw((n, 0), (n, n * 2), "green", 1))
        .collect();
    for stroke in &strokes {
        painter.send(stroke).unwrap();
    }
    // Once the watcher has all strokes, the relay has recorded them.
    for stroke in &strokes {
        assert_eq!(&next(&watcher), stroke);
    }

    let late = join_observed(addr, &[&painter, &watcher]);
    let after = Message::draw((99, 99), (100, 100), "green", 1);
    painter.send(&after).unwrap();

    for stroke in &strokes {
        assert_eq!(&next(&late), stroke);
    }
    assert_eq!(next(&late), after);

    handle.stop();
}

#[test]
fn notices_are_not_replayed() {
    let (handle, addr) = start_local_relay(None);

    let a = join(addr);
    let _b = join_observed(addr, &[&a]);
    let c = join_observed(addr, &[&a]);
    assert_quiet(&c);

    handle.stop();
}

#[test]
fn abrupt_disconnect_does_not_affect_others() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    let victim = RawPeer::join(addr);
    assert_eq!(next(&a), join_notice());
    assert_eq!(next(&b), join_notice());

    victim.writer.shutdown(Shutdown::Both).unwrap();
    drop(victim);

    // Keep drawing across the disconnect; every stroke still reaches B.
    for n in 0..20 {
        a.send_draw((n, n), (n + 1, n + 1), "black", 2).unwrap();
    }
    for n in 0..20 {
        assert_eq!(next(&b), Message::draw((n, n), (n + 1, n + 1), "black", 2));
    }

    // The relay keeps serving: a newcomer still joins and replays.
    let late = join_observed(addr, &[&a, &b]);
    for n in 0..20 {
        assert_eq!(next(&late), Message::draw((n, n), (n + 1, n + 1), "black", 2));
    }

    handle.stop();
}

#[test]
fn malformed_frames_are_dropped_without_disconnecting() {
    let (handle, addr) = start_local_relay(None);

    let a = join(addr);
    let mut sloppy = RawPeer::join(addr);
    assert_eq!(next(&a), join_notice());

    sloppy.send_raw(b"this is not json");
    sloppy.send_raw(br#"{"type":"draw","x1":1,"y1":2}"#);
    sloppy.send_raw(br#"{"type":"erase"}"#);
    sloppy.send_raw(&[0xff, 0xfe, 0xfd]);
    sloppy.send_raw(b"");
    sloppy.send(&red_line());

    // Only the valid stroke gets through, and the sender is still connected.
    assert_eq!(next(&a), red_line());
    assert_quiet(&a);

    // History holds only the valid stroke.
    let late = join_observed(addr, &[&a]);
    assert_eq!(sloppy.recv(), join_notice());
    assert_eq!(next(&late), red_line());
    assert_quiet(&late);

    handle.stop();
}

#[test]
fn oversized_length_prefix_is_skipped() {
    let (handle, addr) = start_local_relay(None);

    let a = join(addr);
    let mut sloppy = RawPeer::join(addr);
    assert_eq!(next(&a), join_notice());

    // A prefix just above the limit, followed by that many junk bytes.
    let len = canvas_protocol::MAX_FRAME_SIZE + 1;
    sloppy.writer.write_all(&len.to_be_bytes()).unwrap();
    let junk = vec![b'x'; 64 * 1024];
    let mut remaining = len as usize;
    while remaining > 0 {
        let chunk = remaining.min(junk.len());
        sloppy.writer.write_all(&junk[..chunk]).unwrap();
        remaining -= chunk;
    }
    sloppy.send(&Message::Clear);

    assert_eq!(next(&a), Message::Clear);

    handle.stop();
}

#[test]
fn client_sent_notices_are_not_relayed() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    a.send(&Message::notice("I am the server now")).unwrap();
    a.send(&red_line()).unwrap();

    assert_eq!(next(&b), red_line());
    assert_quiet(&b);

    handle.stop();
}

#[test]
fn history_cap_limits_replay() {
    let (handle, addr) = start_local_relay(Some(3));

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    for n in 0..5 {
        a.send_draw((n, 0), (n, 1), "red", 1).unwrap();
    }
    for _ in 0..5 {
        next(&b);
    }

    let late = join_observed(addr, &[&a, &b]);
    for n in 2..5 {
        assert_eq!(next(&late), Message::draw((n, 0), (n, 1), "red", 1));
    }
    assert_quiet(&late);

    handle.stop();
}

#[test]
fn stop_closes_client_connections() {
    let (handle, addr) = start_local_relay(None);

    let mut raw = RawPeer::join(addr);
    handle.stop();

    assert!(matches!(
        decode(&mut raw.reader),
        Err(canvas_protocol::FrameError::PeerClosed)
    ));
}

#[test]
fn departed_client_is_not_a_target() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    b.disconnect();

    // Whether or not the relay has processed B's departure yet, the
    // remaining participants are unaffected.
    let c = join_observed(addr, &[&a]);
    a.send(&red_line()).unwrap();
    assert_eq!(next(&c), red_line());

    handle.stop();
}

#[test]
fn poll_drains_a_burst_in_order() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    let b = join_observed(addr, &[&a]);
    assert!(b.poll().is_empty());

    let burst: Vec<_> = (0..50)
        .map(|n| Message::draw((n, 0), (n, 10), "purple", 1))
        .collect();
    for stroke in &burst {
        a.send(stroke).unwrap();
    }

    let mut received = Vec::new();
    let deadline = Instant::now() + RECV_TIMEOUT;
    while received.len() < burst.len() {
        assert!(Instant::now() < deadline, "only {} strokes arrived", received.len());
        received.extend(b.poll());
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(received, burst);
    assert!(a.poll().is_empty());

    handle.stop();
}

#[test]
fn stop_closes_a_peer_that_stopped_reading() {
    let (handle, addr) = start_local_relay(None);

    let mut a = join(addr);
    // B never reads, so its socket buffers fill and the relay's writer for
    // it blocks mid-frame.
    let stalled = RawPeer::join(addr);
    assert_eq!(next(&a), join_notice());
    let wide = "x".repeat(8 << 20);
    for _ in 0..2 {
        a.send(&Message::draw((0, 0), (1, 1), wide.as_str(), 1)).unwrap();
    }
    thread::sleep(Duration::from_millis(200));

    handle.stop();

    // The relay shut the socket down: B drains what was in flight and then
    // sees the end of the stream rather than waiting forever.
    let mut reader = stalled.reader;
    match io::copy(&mut reader, &mut io::sink()) {
        Ok(_) => {}
        Err(e) => assert!(
            !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            "stalled peer was never closed: {e}"
        ),
    }
}
