//! Integration tests for the chat relay
//!
//! These tests run a real server on loopback and talk to it over TCP, both
//! with hand-driven sockets and with the client library.

use client::{Client, ClientState};
use server::{Server, ShutdownHandle};
use shared::codec;
use shared::config::DEFAULT_MAX_FRAME_LEN;
use shared::Message;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that the envelope layout matches the documented wire format
    #[test]
    fn envelope_layout() {
        let message = Message::chat("hello");
        let payload = message.to_payload().unwrap();
        let frame = codec::encode(&message).unwrap();

        assert_eq!(frame.len(), 4 + payload.len());
        assert_eq!(
            u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize,
            payload.len()
        );
        assert_eq!(&frame[4..], payload.as_slice());
    }

    /// Tests the goodbye envelope is a bare zero-length prefix
    #[test]
    fn goodbye_envelope_is_empty() {
        assert_eq!(codec::encode(&Message::Disconnect).unwrap(), vec![0, 0, 0, 0]);
    }

    /// Tests round-trips for assorted string payloads
    #[tokio::test]
    async fn string_payload_roundtrip() {
        let samples = [
            "",
            "hello",
            "NAME: not actually a handshake",
            "tabs\tand\nnewlines\r\n",
            "\u{0}\u{1}\u{7f}",
            "日本語のテキスト",
        ];

        for text in samples {
            let frame = codec::encode(&Message::chat(text)).unwrap();
            let mut reader = frame.as_slice();
            let decoded = codec::decode(&mut reader, DEFAULT_MAX_FRAME_LEN)
                .await
                .unwrap();
            assert_eq!(decoded, Some(Message::chat(text)), "payload {:?}", text);
        }
    }

    /// Tests that bincode payload corruption surfaces as a decode error
    #[test]
    fn malformed_payload_handling() {
        let valid = Message::Handshake {
            name: "alice".to_string(),
        }
        .to_payload()
        .unwrap();

        let truncated = &valid[..valid.len() - 2];
        assert!(Message::from_payload(truncated).is_err());

        let mut corrupted = valid.clone();
        corrupted[0] = 0xFF;
        assert!(Message::from_payload(&corrupted).is_err());

        let raw: Result<Message, _> = bincode::deserialize(&[]);
        assert!(raw.is_err(), "bincode alone cannot decode an empty payload");
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod relay_tests {
    use super::*;

    /// Tests the documented alice/bob conversation end to end
    #[tokio::test]
    async fn alice_and_bob_scenario() {
        let (addr, handle, server) = start_server().await;

        let mut alice = join(addr, "alice").await;
        let mut bob = join(addr, "bob").await;

        say(&mut alice, "hello").await;
        wait_for(&mut bob, "[alice@127.0.0.1]>> hello").await;

        drop(bob);
        wait_for(&mut alice, "[SERVER]: bob@127.0.0.1 has left. Count = 1.").await;

        stop(handle, server).await;
    }

    /// Tests that each client only hears about clients joining after it
    #[tokio::test]
    async fn join_accounting() {
        let (addr, handle, server) = start_server().await;
        let names = ["n1", "n2", "n3", "n4"];

        let mut clients = Vec::new();
        for name in names {
            clients.push(join(addr, name).await);
        }

        // A marker line after the joins bounds what each client has seen
        say(&mut clients[0], "marker").await;

        for (i, client) in clients.iter_mut().enumerate() {
            let seen = read_until(client, "[n1@127.0.0.1]>> marker").await;
            let expected: Vec<String> = (i + 1..names.len())
                .map(|j| {
                    format!(
                        "[SERVER]: {}@127.0.0.1 has joined. Count = {}.",
                        names[j],
                        j + 1
                    )
                })
                .collect();
            assert_eq!(seen, expected, "notices seen by {}", names[i]);
        }

        stop(handle, server).await;
    }

    /// Tests that an abrupt disconnect produces exactly one leave notice
    #[tokio::test]
    async fn leave_accounting() {
        let (addr, handle, server) = start_server().await;

        let mut a = join(addr, "a").await;
        let mut b = join(addr, "b").await;
        let c = join(addr, "c").await;

        drop(c);
        wait_for(&mut a, "[SERVER]: c@127.0.0.1 has left. Count = 2.").await;

        say(&mut b, "after").await;
        let seen_by_a = read_until(&mut a, "[b@127.0.0.1]>> after").await;
        let seen_by_b = read_until(&mut b, "[b@127.0.0.1]>> after").await;

        assert!(seen_by_a.is_empty(), "extra lines: {:?}", seen_by_a);
        assert_eq!(
            seen_by_b,
            vec![
                "[SERVER]: c@127.0.0.1 has joined. Count = 3.".to_string(),
                "[SERVER]: c@127.0.0.1 has left. Count = 2.".to_string(),
            ]
        );

        stop(handle, server).await;
    }

    /// Tests a frame trickled in over several TCP writes is relayed intact
    #[tokio::test]
    async fn partial_frame_delivery() {
        let (addr, handle, server) = start_server().await;

        let mut alice = join(addr, "alice").await;
        let mut bob = join(addr, "bob").await;
        wait_for(&mut alice, "[SERVER]: bob@127.0.0.1 has joined. Count = 2.").await;

        let frame = codec::encode(&Message::chat("slow and steady")).unwrap();
        for chunk in frame.chunks(2) {
            bob.write_all(chunk).await.unwrap();
            bob.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        wait_for(&mut alice, "[bob@127.0.0.1]>> slow and steady").await;

        stop(handle, server).await;
    }

    /// Tests a client that overshoots the frame limit is dropped alone
    #[tokio::test]
    async fn oversized_frame_drops_only_sender() {
        let mut server = Server::new("127.0.0.1:0", 64).await.unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(async move { server.run(tokio::io::empty()).await.unwrap() });

        let mut alice = join(addr, "alice").await;
        let mut mallory = join(addr, "mallory").await;
        wait_for(&mut alice, "[SERVER]: mallory@127.0.0.1 has joined. Count = 2.").await;

        say(&mut mallory, &"x".repeat(500)).await;
        wait_for(&mut alice, "[SERVER]: mallory@127.0.0.1 has left. Count = 1.").await;

        handle.shutdown();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    /// Tests two library clients chatting through the server
    #[tokio::test]
    async fn library_clients_chat() {
        let (addr, handle, server) = start_server().await;
        let addr = addr.to_string();

        let mut alice = Client::connect(&addr, "alice", DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        let mut bob = Client::connect(&addr, "bob", DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        assert_eq!(bob.host(), "127.0.0.1");

        let (alice_in, mut alice_keys) = tokio::io::duplex(256);
        let (alice_out, _alice_screen) = tokio::io::duplex(4096);
        let (bob_in, _bob_keys) = tokio::io::duplex(256);
        let (bob_out, bob_screen) = tokio::io::duplex(4096);

        let alice_handle = alice.shutdown_handle();
        let alice_task = tokio::spawn(async move {
            alice.run(alice_in, alice_out).await.unwrap();
            alice.state()
        });
        let bob_handle = bob.shutdown_handle();
        let bob_task = tokio::spawn(async move {
            bob.run(bob_in, bob_out).await.unwrap();
            bob.state()
        });

        alice_keys.write_all(b"hi bob\n").await.unwrap();

        let mut bob_lines = BufReader::new(bob_screen).lines();
        let line = timeout(WAIT, bob_lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("[alice@127.0.0.1]>> hi bob"));

        alice_handle.shutdown();
        assert_eq!(
            timeout(WAIT, alice_task).await.unwrap().unwrap(),
            ClientState::ShuttingDown
        );

        let line = timeout(WAIT, bob_lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            line.as_deref(),
            Some("[SERVER]: alice@127.0.0.1 has left. Count = 1.")
        );

        // Server going away ends the remaining session on its own
        stop(handle, server).await;
        assert_eq!(
            timeout(WAIT, bob_task).await.unwrap().unwrap(),
            ClientState::ShuttingDown
        );
        bob_handle.shutdown();
    }
}

// HELPER FUNCTIONS

async fn start_server() -> (SocketAddr, ShutdownHandle, JoinHandle<()>) {
    let mut server = Server::new("127.0.0.1:0", DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    let addr = server.local_addr();
    let handle = server.shutdown_handle();
    let task = tokio::spawn(async move { server.run(tokio::io::empty()).await.unwrap() });
    (addr, handle, task)
}

async fn stop(handle: ShutdownHandle, server: JoinHandle<()>) {
    handle.shutdown();
    timeout(WAIT, server).await.unwrap().unwrap();
}

/// Connects and completes the handshake, returning the raw socket
async fn join(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let hello = Message::Handshake {
        name: name.to_string(),
    };
    codec::write_message(&mut stream, &hello).await.unwrap();

    match next_message(&mut stream).await {
        Some(Message::HandshakeAck { host }) => assert_eq!(host, "127.0.0.1"),
        other => panic!("Expected handshake ack, got {:?}", other),
    }
    stream
}

async fn say(stream: &mut TcpStream, text: &str) {
    codec::write_message(stream, &Message::chat(text))
        .await
        .unwrap();
}

async fn next_message(stream: &mut TcpStream) -> Option<Message> {
    timeout(WAIT, codec::decode(stream, DEFAULT_MAX_FRAME_LEN))
        .await
        .expect("timed out waiting for server")
        .unwrap()
}

/// Collects chat lines until `stop` arrives; `stop` itself is not included
async fn read_until(stream: &mut TcpStream, stop: &str) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        match next_message(stream).await {
            Some(Message::Chat { text }) if text == stop => return seen,
            Some(Message::Chat { text }) => seen.push(text),
            other => panic!("Expected {:?}, got {:?}", stop, other),
        }
    }
}

async fn wait_for(stream: &mut TcpStream, line: &str) {
    read_until(stream, line).await;
}
