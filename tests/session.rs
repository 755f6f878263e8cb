/// End-to-end protocol scenarios against an in-process server.
///
/// Each test binds an ephemeral port, spawns the accept loop, and drives it
/// through plain IRC clients over real TCP: registration, nick collisions,
/// channel limits and invites, keys, locked topics, kicks and cleanup.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use tarn::irc::server::serve;

const PASSWORD: &str = "secret";
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a server on an ephemeral port. The returned sender keeps the
/// shutdown channel alive for the duration of the test.
async fn start_server() -> (u16, watch::Sender<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        serve(listener, PASSWORD.into(), shutdown_rx).await.unwrap();
    });
    (port, shutdown_tx)
}

/// A minimal IRC client for driving the server.
struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read, writer) = stream.into_split();
        TestClient {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Read lines until one contains the marker. Returns everything read,
    /// the matching line last.
    async fn read_until(&mut self, marker: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        loop {
            let line = timeout(READ_TIMEOUT, self.lines.next_line())
                .await
                .unwrap_or_else(|_| panic!("timeout waiting for {marker:?}, saw {seen:#?}"))
                .unwrap()
                .unwrap_or_else(|| panic!("connection closed waiting for {marker:?}, saw {seen:#?}"));
            seen.push(line);
            if seen.last().unwrap().contains(marker) {
                return seen;
            }
        }
    }

    /// PASS/NICK/USER handshake, consuming the welcome numerics.
    async fn register(&mut self, nick: &str) -> Vec<String> {
        self.send(&format!("PASS {PASSWORD}")).await;
        self.send(&format!("NICK {nick}")).await;
        self.send(&format!("USER {nick} 0 * :{nick}")).await;
        self.read_until(" 004 ").await
    }

    /// Join a channel, consuming the greeting up to end-of-names.
    async fn join(&mut self, channel: &str) {
        self.send(&format!("JOIN {channel}")).await;
        self.read_until(" 366 ").await;
    }
}

#[tokio::test]
async fn registration_happy_path() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;

    let welcome = alice.register("alice").await;
    for code in ["001", "002", "003", "004"] {
        assert!(
            welcome.iter().any(|l| l.contains(&format!(" {code} alice"))),
            "missing {code} in {welcome:#?}"
        );
    }
}

#[tokio::test]
async fn nick_collision_rejected() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;

    let mut imposter = TestClient::connect(port).await;
    imposter.send(&format!("PASS {PASSWORD}")).await;
    imposter.send("NICK alice").await;
    let lines = imposter.read_until("433").await;
    assert!(
        lines
            .last()
            .unwrap()
            .contains("433 * alice :Nickname is already in use"),
        "unexpected reply: {lines:#?}"
    );
}

#[tokio::test]
async fn channel_limit_blocks_until_invited() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    alice.join("#room").await;
    alice.send("MODE #room +l 1").await;
    alice.read_until("MODE #room +l").await;

    let mut bob = TestClient::connect(port).await;
    bob.register("bob").await;
    bob.send("JOIN #room").await;
    let lines = bob.read_until("471").await;
    assert!(
        lines
            .last()
            .unwrap()
            .contains("471 bob #room :Cannot join channel (+l)"),
        "unexpected reply: {lines:#?}"
    );

    alice.send("INVITE bob #room").await;
    alice.read_until(" 341 ").await;
    bob.read_until("INVITE bob").await;

    // Invited clients bypass the user limit.
    bob.join("#room").await;
    let lines = alice.read_until("JOIN").await;
    assert!(lines.last().unwrap().starts_with(":bob!"));
}

#[tokio::test]
async fn channel_key_required() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    alice.join("#vault").await;
    alice.send("MODE #vault +k hunter2").await;
    alice.read_until("MODE #vault +k").await;

    let mut carol = TestClient::connect(port).await;
    carol.register("carol").await;
    carol.send("JOIN #vault hunter2").await;
    carol.read_until(" 366 ").await;

    let mut dave = TestClient::connect(port).await;
    dave.register("dave").await;
    dave.send("JOIN #vault wrong").await;
    let lines = dave.read_until("475").await;
    assert!(
        lines
            .last()
            .unwrap()
            .contains("475 dave #vault :Cannot join channel (+k)"),
        "unexpected reply: {lines:#?}"
    );
}

#[tokio::test]
async fn locked_topic_needs_operator() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    alice.join("#talk").await;

    let mut bob = TestClient::connect(port).await;
    bob.register("bob").await;
    bob.join("#talk").await;

    // Channels start topic-locked; bob holds no ops.
    bob.send("TOPIC #talk :hi").await;
    let lines = bob.read_until("482").await;
    assert!(lines.last().unwrap().contains("You're not channel operator"));

    alice.send("TOPIC #talk :all about tarns").await;
    let lines = bob.read_until("TOPIC #talk").await;
    assert!(lines.last().unwrap().ends_with(":all about tarns"));
}

#[tokio::test]
async fn kick_and_channel_cleanup() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    alice.join("#pit").await;

    let mut bob = TestClient::connect(port).await;
    bob.register("bob").await;
    bob.join("#pit").await;

    alice.send("KICK #pit bob :bye").await;
    let lines = bob.read_until("KICK #pit bob").await;
    assert!(lines.last().unwrap().ends_with(":bye"));
    alice.read_until("KICK #pit bob").await;

    alice.send("KICK #pit alice :self").await;
    let lines = alice.read_until("482").await;
    assert!(lines.last().unwrap().contains("You can't kick yourself"));

    // Parting the last member destroys the channel.
    alice.send("PART #pit").await;
    alice.read_until("PART #pit").await;
    alice.send("MODE #pit").await;
    let lines = alice.read_until("403").await;
    assert!(lines.last().unwrap().contains("403 alice #pit :No such channel"));
}

#[tokio::test]
async fn private_messages_relay_between_clients() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    let mut bob = TestClient::connect(port).await;
    bob.register("bob").await;

    alice.send("PRIVMSG bob :are you there?").await;
    let lines = bob.read_until("PRIVMSG bob").await;
    let last = lines.last().unwrap();
    assert!(last.starts_with(":alice!"));
    assert!(last.ends_with(":are you there?"));
}

#[tokio::test]
async fn quit_is_announced_to_channel() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;
    alice.join("#room").await;

    let mut bob = TestClient::connect(port).await;
    bob.register("bob").await;
    bob.join("#room").await;
    alice.read_until(":bob!").await;

    bob.send("QUIT :gone fishing").await;
    let lines = alice.read_until("QUIT").await;
    assert!(lines.last().unwrap().ends_with(":Quit: gone fishing"));
}

#[tokio::test]
async fn partial_lines_are_reassembled() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;

    // Registration split across arbitrary write boundaries.
    alice.send(&format!("PASS {PASSWORD}")).await;
    alice.writer.write_all(b"NICK al").await.unwrap();
    alice.writer.flush().await.unwrap();
    alice.writer.write_all(b"ice\r\nUSER alice 0 * ").await.unwrap();
    alice.writer.write_all(b":Alice A\r\n").await.unwrap();
    alice.read_until(" 004 ").await;
}

#[tokio::test]
async fn ping_gets_pong() {
    let (port, _guard) = start_server().await;
    let mut alice = TestClient::connect(port).await;
    alice.register("alice").await;

    alice.send("PING token123").await;
    let lines = alice.read_until("PONG").await;
    assert!(lines.last().unwrap().contains("PONG token123"));
}
