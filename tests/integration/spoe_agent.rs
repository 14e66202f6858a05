//! SPOE agent over TCP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use spoe_auth::config::SpoeSettings;
use spoe_auth::shutdown::ShutdownCoordinator;
use spoe_auth::spoe::frame::{read_kv_list, read_name, write_kv, FLAG_FIN};
use spoe_auth::spoe::{
    spoe_gate, write_frame, Agent, Disconnect, DisconnectStatus, Frame, FrameType,
    Message, NotifyHandler, TypedData,
};

use crate::support::{valid_claims, TestSigner};

const AGENT_MAX_FRAME: u32 = 8192;

struct TestAgent {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestAgent {
    async fn start(signer: &TestSigner, admin: Option<&str>) -> Self {
        let settings = SpoeSettings::default();
        let gate = spoe_gate(signer.verifier(), admin.map(str::to_string), &settings);
        let agent = Agent::new(NotifyHandler::new(gate, &settings), AGENT_MAX_FRAME);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut coordinator = ShutdownCoordinator::new();
            agent
                .serve(listener, &mut coordinator, async {
                    let _ = stopped.await;
                })
                .await;
            coordinator.shutdown(Duration::from_secs(2)).await;
        });

        Self {
            addr,
            stop: Some(stop),
            task,
        }
    }

    async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

fn hello_frame(versions: &str, max_frame_size: u32, healthcheck: bool) -> Frame {
    let mut payload = BytesMut::new();
    write_kv(&mut payload, "supported-versions", &TypedData::from(versions));
    write_kv(&mut payload, "max-frame-size", &TypedData::Uint32(max_frame_size));
    write_kv(&mut payload, "capabilities", &TypedData::from("pipelining,async"));
    if healthcheck {
        write_kv(&mut payload, "healthcheck", &TypedData::Bool(true));
    }
    write_kv(&mut payload, "engine-id", &TypedData::from("test-engine"));
    Frame::new(FrameType::HaproxyHello, 0, 0, payload.freeze())
}

fn notify_frame(stream_id: u64, frame_id: u64, messages: &[Message]) -> Frame {
    let mut payload = BytesMut::new();
    for message in messages {
        message.encode(&mut payload);
    }
    Frame::new(FrameType::Notify, stream_id, frame_id, payload.freeze())
}

/// Reads exactly one frame the way HAProxy would; `None` on a closed
/// connection.
async fn next_frame(stream: &mut TcpStream) -> Option<Frame> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut prefix = [0u8; 4];
        match stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
            Err(e) => panic!("read failed: {e}"),
        }
        let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
        stream.read_exact(&mut body).await.unwrap();
        Some(Frame::decode(Bytes::from(body)).unwrap())
    })
    .await
    .unwrap()
}

/// Performs the handshake and returns the AGENT-HELLO fields.
async fn handshake(stream: &mut TcpStream, max_frame_size: u32) -> HashMap<String, TypedData> {
    write_frame(stream, hello_frame("2.0", max_frame_size, false)).await.unwrap();
    let reply = next_frame(stream).await.unwrap();
    assert_eq!(reply.frame_type, FrameType::AgentHello);
    read_kv_list(&mut reply.payload.clone()).unwrap().into_iter().collect()
}

/// SET-VAR actions of an ACK keyed by variable name; all must be in
/// transaction scope.
fn set_vars(ack: &Frame) -> HashMap<String, TypedData> {
    assert_eq!(ack.frame_type, FrameType::Ack);
    let mut buf: Bytes = ack.payload.clone();
    let mut vars = HashMap::new();
    while buf.has_remaining() {
        assert_eq!(buf.get_u8(), 1, "SET-VAR");
        assert_eq!(buf.get_u8(), 3, "nb-args");
        assert_eq!(buf.get_u8(), 2, "transaction scope");
        let name = read_name(&mut buf).unwrap();
        let value = TypedData::decode(&mut buf).unwrap();
        vars.insert(name, value);
    }
    vars
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

async fn expect_disconnect(stream: &mut TcpStream, status: DisconnectStatus) {
    let frame = next_frame(stream).await.unwrap();
    assert_eq!(frame.frame_type, FrameType::AgentDisconnect);
    assert_eq!(Disconnect::decode(frame.payload).unwrap().status, status);
    assert!(next_frame(stream).await.is_none(), "connection should close");
}

#[tokio::test]
async fn handshake_negotiates_frame_size_and_capabilities() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    let fields = handshake(&mut stream, 16380).await;
    assert_eq!(fields["version"], TypedData::from("2.0"));
    assert_eq!(fields["max-frame-size"], TypedData::Uint32(AGENT_MAX_FRAME));
    assert_eq!(fields["capabilities"], TypedData::from("pipelining"));

    let mut small = agent.connect().await;
    let fields = handshake(&mut small, 1024).await;
    assert_eq!(fields["max-frame-size"], TypedData::Uint32(1024));

    agent.stop().await;
}

#[tokio::test]
async fn healthcheck_closes_after_hello() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    write_frame(&mut stream, hello_frame("2.0", 16380, true)).await.unwrap();
    assert_eq!(next_frame(&mut stream).await.unwrap().frame_type, FrameType::AgentHello);
    assert!(next_frame(&mut stream).await.is_none());

    agent.stop().await;
}

#[tokio::test]
async fn unsupported_version_is_refused() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    write_frame(&mut stream, hello_frame("1.0", 16380, false)).await.unwrap();
    expect_disconnect(&mut stream, DisconnectStatus::BadVersion).await;

    agent.stop().await;
}

#[tokio::test]
async fn notify_with_valid_token_sets_user_id() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;
    let token = signer.sign(&valid_claims("alice"));

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;
    let message = Message::new("verify")
        .with_arg("auth", bearer(&token))
        .with_arg("method", "GET")
        .with_arg("path", "/")
        .with_arg("host", "portal");
    write_frame(&mut stream, notify_frame(7, 1, &[message])).await.unwrap();

    let ack = next_frame(&mut stream).await.unwrap();
    assert_eq!((ack.stream_id, ack.frame_id), (7, 1));
    assert_eq!(ack.flags & FLAG_FIN, FLAG_FIN);
    let vars = set_vars(&ack);
    assert_eq!(vars["auth_ok"], TypedData::Bool(true));
    assert_eq!(vars["user_id"], TypedData::from("alice"));
    assert_eq!(vars["reason"], TypedData::from("ok"));

    agent.stop().await;
}

#[tokio::test]
async fn unknown_message_name() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;
    write_frame(&mut stream, notify_frame(1, 1, &[Message::new("other")])).await.unwrap();

    let vars = set_vars(&next_frame(&mut stream).await.unwrap());
    assert_eq!(vars["auth_ok"], TypedData::Bool(false));
    assert_eq!(vars["reason"], TypedData::from("message_not_found"));
    assert!(!vars.contains_key("user_id"));

    agent.stop().await;
}

#[tokio::test]
async fn pipelined_notifies_are_answered_in_order() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, Some("admin")).await;
    let token = signer.sign(&valid_claims("bob"));

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;

    let mut batch = BytesMut::new();
    notify_frame(1, 1, &[Message::new("verify").with_arg("auth", bearer(&token))]).encode(&mut batch);
    notify_frame(2, 1, &[Message::new("verify")]).encode(&mut batch);
    notify_frame(3, 1, &[Message::new("verify").with_arg("api_key", "admin")]).encode(&mut batch);
    stream.write_all(&batch).await.unwrap();

    let expected = [(1, "ok"), (2, "missing_token"), (3, "bypass_api_key")];
    for (stream_id, reason) in expected {
        let ack = next_frame(&mut stream).await.unwrap();
        assert_eq!(ack.stream_id, stream_id);
        assert_eq!(set_vars(&ack)["reason"], TypedData::from(reason));
    }

    agent.stop().await;
}

#[tokio::test]
async fn undecodable_notify_is_answered_and_connection_survives() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;

    // message name claims 10 bytes, only 3 follow
    let broken = Frame::new(FrameType::Notify, 4, 2, Bytes::from_static(&[10, b'v', b'e', b'r']));
    write_frame(&mut stream, broken).await.unwrap();
    let ack = next_frame(&mut stream).await.unwrap();
    assert_eq!((ack.stream_id, ack.frame_id), (4, 2));
    let vars = set_vars(&ack);
    assert_eq!(vars["auth_ok"], TypedData::Bool(false));
    assert_eq!(vars["reason"], TypedData::from("invalid_message"));

    write_frame(&mut stream, notify_frame(5, 1, &[Message::new("verify")])).await.unwrap();
    let vars = set_vars(&next_frame(&mut stream).await.unwrap());
    assert_eq!(vars["reason"], TypedData::from("missing_token"));

    agent.stop().await;
}

#[tokio::test]
async fn fragmented_notify_is_refused() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;
    let mut fragment = notify_frame(1, 1, &[Message::new("verify")]);
    fragment.flags = 0;
    write_frame(&mut stream, fragment).await.unwrap();

    expect_disconnect(&mut stream, DisconnectStatus::FragmentationNotSupported).await;
    agent.stop().await;
}

#[tokio::test]
async fn oversize_frame_is_refused() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    let fields = handshake(&mut stream, 256).await;
    assert_eq!(fields["max-frame-size"], TypedData::Uint32(256));

    // only the length prefix; the agent refuses before reading a body
    stream.write_all(&400u32.to_be_bytes()).await.unwrap();
    expect_disconnect(&mut stream, DisconnectStatus::TooBig).await;

    agent.stop().await;
}

#[tokio::test]
async fn haproxy_disconnect_is_acknowledged() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;
    let mut goodbye = Disconnect::new(DisconnectStatus::Normal).into_frame();
    goodbye.frame_type = FrameType::HaproxyDisconnect;
    write_frame(&mut stream, goodbye).await.unwrap();

    expect_disconnect(&mut stream, DisconnectStatus::Normal).await;
    agent.stop().await;
}

#[tokio::test]
async fn shutdown_disconnects_idle_connections() {
    let signer = TestSigner::generate();
    let agent = TestAgent::start(&signer, None).await;

    let mut stream = agent.connect().await;
    handshake(&mut stream, 16380).await;
    agent.stop().await;

    expect_disconnect(&mut stream, DisconnectStatus::Normal).await;
}
