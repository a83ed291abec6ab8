//! End-to-end tests against in-process fake servers on ephemeral ports:
//! UDP query exchanges (including the challenge handshake and split
//! responses) and RCON auth + command execution over real sockets.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use srcquery::codec::query::INITIAL_CHALLENGE;
use srcquery::codec::rcon::{FrameBuffer, RconPacket, TYPE_AUTH, TYPE_EXEC_COMMAND};
use srcquery::{ClientConfig, QueryClient, QueryError, RconError};

fn test_client() -> QueryClient {
    QueryClient::with_config(ClientConfig {
        read_timeout: Duration::from_secs(2),
        worker_pool_size: 2,
        ..ClientConfig::default()
    })
    .expect("client start")
}

fn info_response() -> Vec<u8> {
    let mut d = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x49, 0x11];
    d.extend_from_slice(b"Test\0");
    d.extend_from_slice(b"cs\0");
    d.extend_from_slice(b"de_dust2\0");
    d.extend_from_slice(b"csgo\0");
    d.extend_from_slice(&730u16.to_le_bytes());
    d.extend_from_slice(&[2, 16, 0, b'd', b'l', 0, 1]);
    d.extend_from_slice(b"1.38.7.9\0");
    d
}

fn players_response() -> Vec<u8> {
    let mut d = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x44, 0x02, 0x00];
    d.extend_from_slice(b"Alice\0");
    d.extend_from_slice(&5i32.to_le_bytes());
    d.extend_from_slice(&4.0f32.to_le_bytes());
    d.push(0x01);
    d.extend_from_slice(b"Bob\0");
    d.extend_from_slice(&2i32.to_le_bytes());
    d.extend_from_slice(&60.0f32.to_le_bytes());
    d
}

/// Fake query server answering `responses` datagrams, then exiting.
fn spawn_udp_server(
    exchanges: usize,
    respond: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("server bind");
    let addr = socket.local_addr().expect("server addr");
    thread::spawn(move || {
        let mut buf = [0u8; 2048];
        for _ in 0..exchanges {
            let Ok((len, peer)) = socket.recv_from(&mut buf) else {
                return;
            };
            for datagram in respond(&buf[..len]) {
                let _ = socket.send_to(&datagram, peer);
            }
        }
    });
    addr
}

#[test]
fn info_round_trip() {
    let addr = spawn_udp_server(1, |request| {
        assert_eq!(request[4], 0x54);
        vec![info_response()]
    });

    let client = test_client();
    let info = client.query_info(addr).expect("dispatch").wait().expect("info");
    assert_eq!(info.protocol, 0x11);
    assert_eq!(info.name, "Test");
    assert_eq!(info.map, "de_dust2");
    assert_eq!(info.players, 2);
    assert_eq!(info.max_players, 16);
}

#[test]
fn players_with_challenge_handshake() {
    let addr = spawn_udp_server(2, |request| {
        assert_eq!(request[4], 0x55);
        let challenge: [u8; 4] = request[5..9].try_into().expect("challenge bytes");
        if challenge == INITIAL_CHALLENGE.to_le_bytes() {
            // Token DE AD BE EF; the client must echo it as EF BE AD DE.
            vec![vec![0xFF, 0xFF, 0xFF, 0xFF, 0x41, 0xDE, 0xAD, 0xBE, 0xEF]]
        } else {
            assert_eq!(challenge, [0xEF, 0xBE, 0xAD, 0xDE]);
            vec![players_response()]
        }
    });

    let client = test_client();
    let players = client
        .query_players(addr)
        .expect("dispatch")
        .wait()
        .expect("players");
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].name, "Alice");
    assert_eq!(players[1].name, "Bob");
}

#[test]
fn split_response_reassembles() {
    let addr = spawn_udp_server(1, |_| {
        let whole = players_response();
        let chunk = whole.len().div_ceil(3);
        // Fragments sent out of order: {1, 2, 0}.
        let mut frags: Vec<Vec<u8>> = whole
            .chunks(chunk)
            .enumerate()
            .map(|(n, body)| {
                let mut frag = vec![0xFE, 0xFF, 0xFF, 0xFF];
                frag.extend_from_slice(&9u32.to_le_bytes());
                frag.push(3);
                frag.push(n as u8);
                frag.extend_from_slice(&(chunk as u16).to_le_bytes());
                frag.extend_from_slice(body);
                frag
            })
            .collect();
        frags.rotate_left(1);
        frags
    });

    let client = test_client();
    let players = client
        .query_players(addr)
        .expect("dispatch")
        .wait()
        .expect("players");
    assert_eq!(players.len(), 2);
}

#[test]
fn silent_server_times_out_after_retries() {
    // Bound but never read from; the client must give up on schedule.
    let socket = UdpSocket::bind("127.0.0.1:0").expect("server bind");
    let addr = socket.local_addr().expect("server addr");

    let client = QueryClient::with_config(ClientConfig {
        read_timeout: Duration::from_millis(200),
        max_retries: 1,
        backoff_initial: Duration::from_millis(50),
        worker_pool_size: 1,
        ..ClientConfig::default()
    })
    .expect("client start");

    let started = std::time::Instant::now();
    let result = client.query_info(addr).expect("dispatch").wait();
    assert!(matches!(result, Err(QueryError::Timeout)));
    // Send at 0 and ~50ms, then one full deadline: ~250ms total.
    assert!(started.elapsed() >= Duration::from_millis(230));
    drop(socket);
}

/// Minimal RCON server: accepts one connection, grants `password`, and
/// answers every command with two output frames, an empty frame, and the
/// terminator pad.
fn spawn_rcon_server(password: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("server bind");
    let addr = listener.local_addr().expect("server addr");
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        serve_rcon(stream, password);
    });
    addr
}

fn serve_rcon(mut stream: TcpStream, password: &str) {
    let mut frames = FrameBuffer::new(4096);
    let mut buf = [0u8; 1024];
    loop {
        let Ok(n) = stream.read(&mut buf) else { return };
        if n == 0 {
            return;
        }
        frames.extend(&buf[..n]);
        while let Ok(Some(frame)) = frames.next_frame() {
            let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            let packet_type = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
            let body = &frame[8..frame.len() - 2];

            let replies: Vec<RconPacket> = if packet_type == TYPE_AUTH {
                let verdict = if body == password.as_bytes() { id } else { -1 };
                vec![
                    RconPacket::sentinel(id), // empty RESPONSE_VALUE echo
                    RconPacket {
                        id: verdict,
                        packet_type: TYPE_EXEC_COMMAND, // AUTH_RESPONSE shares the value
                        body: Vec::new(),
                    },
                ]
            } else if packet_type == TYPE_EXEC_COMMAND {
                vec![
                    RconPacket {
                        id,
                        packet_type: 0,
                        body: b"hostname: Test\n".to_vec(),
                    },
                    RconPacket {
                        id,
                        packet_type: 0,
                        body: b"players: 3\n".to_vec(),
                    },
                ]
            } else {
                // The sentinel itself: answer with the empty/pad pair.
                vec![
                    RconPacket::sentinel(id),
                    RconPacket {
                        id,
                        packet_type: 0,
                        body: b"\x00\x01\x00\x00".to_vec(),
                    },
                ]
            };

            for reply in replies {
                if stream.write_all(&reply.encode()).is_err() {
                    return;
                }
            }
        }
    }
}

#[test]
fn rcon_authenticate_and_execute() {
    let addr = spawn_rcon_server("hunter2");
    let client = test_client();

    let granted = client
        .rcon_authenticate(addr, "hunter2")
        .expect("dispatch")
        .wait()
        .expect("auth");
    assert!(granted);

    let output = client
        .rcon_execute(addr, "status")
        .expect("dispatch")
        .wait()
        .expect("exec");
    assert_eq!(output, "hostname: Test\nplayers: 3\n");
}

#[test]
fn rcon_rejection_blocks_commands() {
    let addr = spawn_rcon_server("hunter2");
    let client = test_client();

    let granted = client
        .rcon_authenticate(addr, "wrong")
        .expect("dispatch")
        .wait()
        .expect("auth");
    assert!(!granted);

    let err = client.rcon_execute(addr, "status").unwrap_err();
    assert!(matches!(
        err,
        QueryError::Rcon(RconError::NotAuthenticated)
    ));
}

#[test]
fn execute_without_session_fails_fast() {
    let client = test_client();
    let addr: SocketAddr = "127.0.0.1:1".parse().expect("addr");
    let err = client.rcon_execute(addr, "status").unwrap_err();
    assert!(matches!(
        err,
        QueryError::Rcon(RconError::NotAuthenticated)
    ));
}
