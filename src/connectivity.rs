//! Connectivity manager: network link acquisition plus application session
//! acquisition, with bounded-timeout polling.
//!
//! Both layers are consumed as capability traits so per-platform
//! implementations are selected at construction time; the manager itself
//! never branches on the board. Acquisition may stall the calling cycle for
//! up to its timeout, which callers treat as an accepted bounded wait, and
//! every poll iteration sleeps so the runtime's other housekeeping keeps
//! running.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::replay::ChannelPublisher;

/// Poll cadence while waiting for the link to come up.
const LINK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pause between session open attempts.
const SESSION_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// State of the underlying network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

/// Network link capability (WiFi or equivalent).
///
/// `connect` starts an acquisition attempt; completion is observed by polling
/// `status`. `signal_strength` reports 0 while the link is down.
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    fn status(&self) -> LinkStatus;
    fn signal_strength(&self) -> i32;
    async fn connect(&mut self, ssid: &str, credential: &str);
    async fn disconnect(&mut self);
}

/// Application session capability layered on the link (MQTT or equivalent).
#[allow(async_fn_in_trait)]
pub trait Session {
    fn is_open(&self) -> bool;
    async fn open(&mut self) -> bool;
    async fn close(&mut self);
    async fn keepalive(&mut self);
    async fn publish(&mut self, topic: &str, value: f32) -> bool;
}

/// Owns the link and session capabilities and gates backlog replay.
///
/// Session state is transient by design: it is re-validated every time it is
/// needed and never trusted across a publish failure.
pub struct Connectivity<L, S> {
    pub(crate) link: L,
    pub(crate) session: S,
    ssid: String,
    credential: String,
    topic_prefix: String,
    link_timeout: Duration,
    session_timeout: Duration,
}

impl<L: NetworkLink, S: Session> Connectivity<L, S> {
    pub fn new(link: L, session: S, config: &Config) -> Self {
        Self {
            link,
            session,
            ssid: config.wifi_ssid.clone(),
            credential: config.wifi_credential.clone(),
            topic_prefix: config.topic_prefix(),
            link_timeout: config.link_timeout,
            session_timeout: config.session_timeout,
        }
    }

    /// Acquire the network link, waiting at most the configured timeout.
    ///
    /// Idempotent no-op when the link is already up. Otherwise forces a
    /// disconnect/reconnect cycle and polls until up or timed out; a timeout
    /// is an ordinary `false`, never an error.
    pub async fn ensure_link(&mut self) -> bool {
        if self.link.status() == LinkStatus::Up {
            return true;
        }

        info!(ssid = %self.ssid, "link down, reconnecting");
        self.link.disconnect().await;
        self.link.connect(&self.ssid, &self.credential).await;

        let started = Instant::now();
        while self.link.status() != LinkStatus::Up {
            if started.elapsed() >= self.link_timeout {
                warn!(
                    timeout_secs = self.link_timeout.as_secs(),
                    "link acquisition timed out"
                );
                return false;
            }
            sleep(LINK_POLL_INTERVAL).await;
        }

        info!(
            signal_strength = self.link.signal_strength(),
            "link acquired"
        );
        true
    }

    /// Open the application session, waiting at most the configured timeout.
    ///
    /// Fails fast when the link is down. One open attempt per retry round; a
    /// failed attempt is followed by an explicit close so no half-open
    /// session leaks into the next round.
    pub async fn ensure_session(&mut self) -> bool {
        if self.link.status() != LinkStatus::Up {
            return false;
        }
        if self.session.is_open() {
            return true;
        }

        let started = Instant::now();
        loop {
            debug!("opening session");
            if self.session.open().await {
                info!("session open");
                return true;
            }

            // Tear down whatever half-open state the failed attempt left.
            self.session.close().await;

            if started.elapsed() >= self.session_timeout {
                warn!(
                    timeout_secs = self.session_timeout.as_secs(),
                    "session acquisition timed out"
                );
                return false;
            }
            sleep(SESSION_RETRY_INTERVAL).await;
        }
    }

    /// Acquire link and session together; replay is gated on this.
    pub async fn ensure(&mut self) -> bool {
        self.ensure_link().await && self.ensure_session().await
    }

    /// Signal strength of the current link, 0 when down.
    pub fn signal_strength(&self) -> i32 {
        match self.link.status() {
            LinkStatus::Up => self.link.signal_strength(),
            LinkStatus::Down => 0,
        }
    }

    /// Service the session keepalive; called once per scheduler turn.
    pub async fn service(&mut self) {
        if self.session.is_open() {
            self.session.keepalive().await;
        }
    }
}

/// The connectivity manager is itself the publish capability handed to the
/// replay engine: a channel index maps to `<prefix><index + 1>`.
impl<L: NetworkLink, S: Session> ChannelPublisher for Connectivity<L, S> {
    async fn publish_channel(&mut self, channel: usize, value: f32) -> bool {
        let topic = format!("{}{}", self.topic_prefix, channel + 1);
        self.session.publish(&topic, value).await
    }

    async fn keepalive(&mut self) {
        self.service().await;
    }
}
