//! Line-oriented TCP front end.
//!
//! Each connection gets its own task. Game calls are synchronous and run on the
//! blocking pool; narration flows back through [`SessionHub`], which is the
//! [`Messenger`] the game context was built with.

pub mod session;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::config::ServerConfig;
use crate::mud::game::GameContext;
use crate::mud::messaging::Messenger;

pub use session::{dispatch, parse_command, parse_login, Command};

/// Outbound queues for every logged-in character, keyed by lowercase name.
#[derive(Debug, Default)]
pub struct SessionHub {
    outboxes: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for a session. False if another live session holds it.
    pub fn register(&self, name: &str, outbox: mpsc::UnboundedSender<String>) -> bool {
        let mut guard = self.outboxes.lock().unwrap_or_else(PoisonError::into_inner);
        let key = name.to_ascii_lowercase();
        if guard.get(&key).map_or(false, |existing| !existing.is_closed()) {
            return false;
        }
        guard.insert(key, outbox);
        true
    }

    pub fn unregister(&self, name: &str) {
        self.outboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name.to_ascii_lowercase());
    }

    pub fn connected(&self) -> usize {
        self.outboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Messenger for SessionHub {
    fn send_to_one(&self, character: &str, text: &str) {
        let guard = self.outboxes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outbox) = guard.get(&character.to_ascii_lowercase()) {
            let _ = outbox.send(text.to_string());
        }
    }

    fn send_to_all(&self, text: &str) {
        let guard = self.outboxes.lock().unwrap_or_else(PoisonError::into_inner);
        for outbox in guard.values() {
            let _ = outbox.send(text.to_string());
        }
    }
}

pub struct MudServer {
    listener: TcpListener,
    ctx: Arc<GameContext>,
    hub: Arc<SessionHub>,
    config: ServerConfig,
    active: Arc<AtomicUsize>,
}

impl MudServer {
    pub async fn bind(ctx: Arc<GameContext>, hub: Arc<SessionHub>, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        Ok(Self {
            listener,
            ctx,
            hub,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    if self.active.load(Ordering::Relaxed) >= self.config.max_sessions {
                        warn!("Refusing {}: session limit {} reached", peer, self.config.max_sessions);
                        drop(stream);
                        continue;
                    }
                    self.active.fetch_add(1, Ordering::Relaxed);
                    let ctx = self.ctx.clone();
                    let hub = self.hub.clone();
                    let active = self.active.clone();
                    let welcome = self.config.welcome.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session::handle_connection(stream, peer, ctx, hub, welcome).await {
                            warn!("Session from {} ended with error: {}", peer, e);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Server stopping; {} session(s) open", self.hub.connected());
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_refuses_duplicate_live_names() {
        let hub = SessionHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(hub.register("Ada", tx));
        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(!hub.register("ada", tx2));
        hub.send_to_one("ADA", "hello");
        assert_eq!(rx.try_recv().ok().as_deref(), Some("hello"));
        hub.unregister("ada");
        assert_eq!(hub.connected(), 0);
    }

    #[test]
    fn closed_sessions_can_be_replaced() {
        let hub = SessionHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(hub.register("bram", tx));
        drop(rx);
        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(hub.register("bram", tx2));
    }
}
