//! One connected player: name prompt, then a read-eval loop over text commands.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::logutil::escape_log;
use crate::mud::combat::AttackMode;
use crate::mud::errors::MudError;
use crate::mud::game::GameContext;
use crate::mud::profile;
use crate::mud::types::{CharacterClass, WeaponKind, WeaponStats};
use crate::server::SessionHub;

/// Damage range of the basic attack spell.
pub const BOLT: WeaponStats = WeaponStats {
    min_damage: 2,
    max_damage: 8,
    to_hit: 0,
    kind: WeaponKind::Magic,
};

const HELP_TEXT: &str = "Commands: look, score, who, go <room>, attack <target>, \
backstab|block|circle|feint|hit|kill|lunge|parry|strike|thrust <target>, \
cast <target>, stop, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Look,
    Score,
    Who,
    Help,
    Stop,
    Quit,
    Go(String),
    Attack { profile: String, target: Option<String> },
    Cast { target: Option<String> },
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let verb = verb.to_ascii_lowercase();
    let target = (!rest.is_empty()).then(|| rest.to_string());
    match verb.as_str() {
        "" => Command::Empty,
        "l" | "look" => Command::Look,
        "sc" | "score" => Command::Score,
        "who" => Command::Who,
        "help" | "?" => Command::Help,
        "stop" => Command::Stop,
        "quit" | "exit" => Command::Quit,
        "go" if target.is_some() => Command::Go(rest.to_ascii_lowercase()),
        "cast" => Command::Cast { target },
        v if profile::is_profile_verb(v) && v != "spell" => Command::Attack {
            profile: v.to_string(),
            target,
        },
        _ => Command::Unknown(verb),
    }
}

/// Parse `<name> [class]` from the login prompt.
pub fn parse_login(line: &str) -> Option<(String, CharacterClass)> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    if !(2..=16).contains(&name.len()) || !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let class = match words.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("fighter") => CharacterClass::Fighter,
        Some("thief") => CharacterClass::Thief,
        Some("mage") => CharacterClass::Mage,
        Some("cleric") => CharacterClass::Cleric,
        Some("paladin") => CharacterClass::Paladin,
        Some("ranger") => CharacterClass::Ranger,
        Some(_) => return None,
    };
    let mut display = name.to_ascii_lowercase();
    if let Some(first) = display.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Some((display, class))
}

async fn blocking<T, F>(ctx: &Arc<GameContext>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&GameContext) -> T + Send + 'static,
{
    let ctx = ctx.clone();
    Ok(tokio::task::spawn_blocking(move || f(&ctx)).await?)
}

type LineReader = Lines<BufReader<OwnedReadHalf>>;

/// Next input line. Read failures (a reset socket, bytes that are not UTF-8)
/// end the session the same way a clean disconnect does.
async fn next_input(lines: &mut LineReader, session: Uuid) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(e) => {
            debug!("Session {}: read failed: {}", session, e);
            None
        }
    }
}

pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<GameContext>,
    hub: Arc<SessionHub>,
    welcome: String,
) -> Result<()> {
    let session = Uuid::new_v4();
    debug!("Session {} connected from {}", session, peer);
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if wr.write_all(text.as_bytes()).await.is_err() || wr.write_all(b"\r\n").await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(welcome);
    let _ = tx.send("Name and class (e.g. \"Ada fighter\"):".to_string());

    let (name, class) = loop {
        let Some(line) = next_input(&mut lines, session).await else {
            writer.abort();
            return Ok(());
        };
        match parse_login(&line) {
            Some(login) => break login,
            None => {
                let _ = tx.send("Names are 2-16 letters; classes are fighter, thief, mage, cleric, paladin or ranger.".to_string());
            }
        }
    };
    let key = name.to_ascii_lowercase();
    if !hub.register(&key, tx.clone()) {
        let _ = tx.send("That character is already playing.".to_string());
        drop(tx);
        let _ = writer.await;
        return Ok(());
    }

    if let Err(e) = play(&ctx, session, &name, class, &key, &mut lines, &tx).await {
        warn!("Session {}: {} dropped: {}", session, key, e);
    }

    // Runs on every exit from play so the character never lingers in a room.
    hub.unregister(&key);
    let logout_key = key.clone();
    match blocking(&ctx, move |ctx| ctx.logout(&logout_key)).await {
        Ok(Ok(())) | Ok(Err(MudError::NotFound(_))) => {}
        Ok(Err(e)) => warn!("Session {}: logout save failed for {}: {}", session, key, e),
        Err(e) => warn!("Session {}: logout for {} did not run: {}", session, key, e),
    }
    info!("Session {} closed ({})", session, key);
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Log the character in and run its command loop until quit or disconnect.
async fn play(
    ctx: &Arc<GameContext>,
    session: Uuid,
    name: &str,
    class: CharacterClass,
    key: &str,
    lines: &mut LineReader,
    tx: &mpsc::UnboundedSender<String>,
) -> Result<()> {
    let login_name = name.to_string();
    match blocking(ctx, move |ctx| ctx.login(&login_name, class, Instant::now())).await? {
        Ok(room_id) => info!("Session {}: {} logged in to {}", session, escape_log(name), room_id),
        Err(e) => {
            warn!("Session {}: login failed for {}: {}", session, escape_log(name), e);
            let _ = tx.send("The world is unavailable right now.".to_string());
            return Ok(());
        }
    }
    let look_key = key.to_string();
    if let Ok(view) = blocking(ctx, move |ctx| ctx.look(&look_key)).await? {
        let _ = tx.send(view);
    }

    while let Some(line) = next_input(lines, session).await {
        let command = parse_command(&line);
        debug!("Session {} <{}> {}", session, key, escape_log(&line));
        if command == Command::Quit {
            let _ = tx.send("Farewell.".to_string());
            break;
        }
        let who = key.to_string();
        let reply = blocking(ctx, move |ctx| dispatch(ctx, &who, command)).await?;
        if let Some(reply) = reply {
            let _ = tx.send(reply);
        }
    }
    Ok(())
}

/// Run one command. Narration reaches the player through the hub; the return
/// value is any direct reply.
pub fn dispatch(ctx: &GameContext, name: &str, command: Command) -> Option<String> {
    let now = Instant::now();
    match command {
        Command::Empty => None,
        Command::Look => Some(ctx.look(name).unwrap_or_else(|e| e.to_string())),
        Command::Score => Some(ctx.score(name).unwrap_or_else(|e| e.to_string())),
        Command::Who => Some(format!("Online: {}", ctx.world().online_characters().join(", "))),
        Command::Help => Some(HELP_TEXT.to_string()),
        Command::Stop => ctx.disengage(name, now).err().map(|e| e.to_string()),
        Command::Quit => None,
        Command::Go(room) => match ctx.move_character(name, &room) {
            Ok(()) => Some(ctx.look(name).unwrap_or_else(|e| e.to_string())),
            Err(_) => Some("You can't go there.".to_string()),
        },
        Command::Attack { profile, target } => ctx
            .attack(name, target.as_deref(), &profile, AttackMode::Weapon, now)
            .err()
            .map(|e| e.to_string()),
        Command::Cast { target } => ctx
            .attack(name, target.as_deref(), "spell", AttackMode::Spell(BOLT), now)
            .err()
            .map(|e| e.to_string()),
        Command::Unknown(verb) => Some(format!("Unknown command '{}'. Type help.", verb)),
    }
}
