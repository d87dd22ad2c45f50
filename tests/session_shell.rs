use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mudcore::config::ServerConfig;
use mudcore::mud::{GameContext, MudStore, MudStoreBuilder, ScriptedRolls};
use mudcore::server::{MudServer, SessionHub};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mod common;

async fn read_until(lines: &mut Lines<BufReader<OwnedReadHalf>>, wanted: &str) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out waiting for server")
            .expect("read line")
            .unwrap_or_else(|| panic!("connection closed before {:?}; saw {:?}", wanted, seen));
        let done = line == wanted;
        seen.push(line);
        if done {
            return seen;
        }
    }
}

struct Running {
    ctx: Arc<GameContext>,
    hub: Arc<SessionHub>,
    store: Arc<MudStore>,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    serving: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl Running {
    async fn connect(&self) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        let (rd, wr) = stream.into_split();
        (BufReader::new(rd).lines(), wr)
    }

    async fn stop(self) {
        self.shutdown.send(true).expect("signal");
        self.serving.await.expect("join").expect("server result");
    }
}

async fn serve() -> Running {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        MudStoreBuilder::new(dir.path())
            .without_world_seed()
            .open()
            .expect("store"),
    );
    let hub = Arc::new(SessionHub::new());
    let ctx = Arc::new(GameContext::new(
        Arc::new(common::test_world()),
        store.clone(),
        hub.clone(),
        Box::new(ScriptedRolls::new([])),
        common::quiet_rules(),
    ));
    ctx.spawn_creature("arena", "rat", Instant::now()).expect("spawn");

    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        max_sessions: 4,
        welcome: "Welcome to the test realm.".to_string(),
    };
    let server = MudServer::bind(ctx.clone(), hub.clone(), config).await.expect("bind");
    let addr = server.local_addr().expect("addr");
    let (shutdown, shutdown_rx) = watch::channel(false);
    let serving = tokio::spawn(server.run(shutdown_rx));
    Running {
        ctx,
        hub,
        store,
        addr,
        shutdown,
        serving,
        _dir: dir,
    }
}

#[tokio::test]
async fn a_player_can_log_in_fight_and_quit() {
    let running = serve().await;
    let (mut lines, mut wr) = running.connect().await;

    read_until(&mut lines, "Welcome to the test realm.").await;
    wr.write_all(b"ada fighter\r\n").await.expect("login");
    read_until(&mut lines, "This is a place of peace.").await;

    wr.write_all(b"attack rat\n").await.expect("refused attack");
    read_until(&mut lines, "No fighting is allowed here.").await;

    wr.write_all(b"go arena\n").await.expect("walk");
    let view = read_until(&mut lines, "A rat (fresh)").await;
    assert!(view.contains(&"The Arena".to_string()));

    wr.write_all(b"attack rat\n").await.expect("swing");
    read_until(&mut lines, "You attack a rat!").await;
    read_until(&mut lines, "You hit a rat for 2 damage.").await;
    read_until(&mut lines, "A rat is healthy.").await;

    wr.write_all(b"score\n").await.expect("score");
    read_until(&mut lines, "Ada, level 1 Fighter").await;

    wr.write_all(b"quit\n").await.expect("quit");
    read_until(&mut lines, "Farewell.").await;
    let closed = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("close");
    assert!(matches!(closed, Ok(None)));

    assert_eq!(running.hub.connected(), 0);
    assert!(running.ctx.world().location_of("ada").is_none());
    let saved = running.store.get_character("ada").expect("saved on quit");
    assert_eq!(saved.current_room, "arena");

    running.stop().await;
}

#[tokio::test]
async fn garbled_input_logs_the_character_out() {
    let running = serve().await;
    let (mut lines, mut wr) = running.connect().await;
    read_until(&mut lines, "Welcome to the test realm.").await;
    wr.write_all(b"ada fighter\r\n").await.expect("login");
    read_until(&mut lines, "This is a place of peace.").await;
    wr.write_all(b"go arena\n").await.expect("walk");
    read_until(&mut lines, "A rat (fresh)").await;
    assert_eq!(running.ctx.world().location_of("ada").as_deref(), Some("arena"));

    // not UTF-8: the reader fails instead of seeing a clean EOF
    wr.write_all(b"\xff\xfe\r\n").await.expect("garbage");
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => continue,
                other => return other,
            }
        }
    })
    .await
    .expect("session should close");
    assert!(matches!(closed, Ok(None)));
    drop(wr);

    assert_eq!(running.hub.connected(), 0);
    assert!(running.ctx.world().location_of("ada").is_none());
    let saved = running.store.get_character("ada").expect("saved on disconnect");
    assert_eq!(saved.current_room, "arena");

    // the name is free again
    let (mut lines, mut wr) = running.connect().await;
    read_until(&mut lines, "Welcome to the test realm.").await;
    wr.write_all(b"ada\n").await.expect("login again");
    let view = read_until(&mut lines, "A rat (fresh)").await;
    assert!(!view.contains(&"That character is already playing.".to_string()));
    assert_eq!(running.ctx.world().location_of("ada").as_deref(), Some("arena"));
    wr.write_all(b"quit\n").await.expect("quit");
    read_until(&mut lines, "Farewell.").await;

    running.stop().await;
}
