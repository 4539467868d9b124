//! Relay sessions: one origin tap shared by many clients through a
//! [`RingBuffer`], with idle-timeout teardown once the last client
//! leaves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::ring_buffer::RingBuffer;
use crate::config::RelayConfig;
use crate::daemon::DaemonRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::{EncodingProfile, RelaySessionDescriptor, RelaySessionKey};

struct ClientHandle {
    user_agent: String,
    remote_addr: String,
    joined_at: DateTime<Utc>,
}

pub struct RelaySession {
    pub id: Uuid,
    pub key: RelaySessionKey,
    pub origin_url: String,
    pub buffer: Arc<RingBuffer>,
    pub created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    clients: RwLock<HashMap<Uuid, ClientHandle>>,
    cancel: CancellationToken,
}

impl RelaySession {
    pub fn descriptor(&self) -> RelaySessionDescriptor {
        RelaySessionDescriptor {
            session_id: self.id,
            channel_id: self.key.channel_id,
            origin_url: self.origin_url.clone(),
            created_at: self.created_at,
            last_activity: *self.last_activity.read().unwrap(),
            client_count: self.clients.read().unwrap().len(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    fn touch(&self) {
        *self.last_activity.write().unwrap() = Utc::now();
    }
}

/// Manages the set of live relay sessions, keyed by (channel, profile).
pub struct RelayManager {
    config: RelayConfig,
    daemon_registry: Arc<DaemonRegistry>,
    http: reqwest::Client,
    sessions: RwLock<HashMap<RelaySessionKey, Arc<RelaySession>>>,
}

impl RelayManager {
    pub fn new(config: RelayConfig, daemon_registry: Arc<DaemonRegistry>) -> Self {
        Self { config, daemon_registry, http: reqwest::Client::new(), sessions: RwLock::new(HashMap::new()) }
    }

    pub fn get_session(&self, key: &RelaySessionKey) -> Option<Arc<RelaySession>> {
        self.sessions.read().unwrap().get(key).cloned()
    }

    /// Returns the existing session for `key`, or opens a fresh one: a
    /// transcode profile must resolve to an available daemon before the
    /// session is created.
    pub async fn get_or_create_session(
        self: &Arc<Self>,
        key: RelaySessionKey,
        origin_url: String,
        profile: Option<EncodingProfile>,
    ) -> AppResult<Arc<RelaySession>> {
        if let Some(session) = self.get_session(&key) {
            return Ok(session);
        }

        if let Some(profile) = &profile {
            if self.daemon_registry.get_with_capability(&profile.encoder).is_empty() {
                return Err(AppError::no_daemons_available());
            }
        }

        let buffer = Arc::new(RingBuffer::new(self.config.ring_buffer_bytes));
        let session = Arc::new(RelaySession {
            id: Uuid::new_v4(),
            key: key.clone(),
            origin_url: origin_url.clone(),
            buffer,
            created_at: Utc::now(),
            last_activity: RwLock::new(Utc::now()),
            clients: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });

        // Double-checked insert: another caller may have created the
        // same (channel, profile) session while we were resolving the
        // daemon above.
        {
            let mut guard = self.sessions.write().unwrap();
            if let Some(existing) = guard.get(&key) {
                return Ok(existing.clone());
            }
            guard.insert(key, session.clone());
        }

        self.spawn_producer(session.clone());
        Ok(session)
    }

    fn spawn_producer(self: &Arc<Self>, session: Arc<RelaySession>) {
        let http = self.http.clone();
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = run_producer(http, session.clone()).await {
                warn!(session_id = %session.id, error = %err, "relay producer exited with error");
            }
            session.buffer.close();
            manager.sessions.write().unwrap().remove(&session.key);
        });
    }

    pub fn add_client(&self, key: &RelaySessionKey, user_agent: String, remote_addr: String) -> AppResult<(Uuid, Arc<RelaySession>, u64)> {
        let session = self.get_session(key).ok_or_else(|| AppError::not_found("relay session", key.channel_id))?;
        let client_id = Uuid::new_v4();
        session.clients.write().unwrap().insert(client_id, ClientHandle { user_agent, remote_addr, joined_at: Utc::now() });
        session.touch();
        let cursor = session.buffer.tail_cursor();
        Ok((client_id, session, cursor))
    }

    /// Drops the client's cursor; once the session has no clients left,
    /// schedules idle teardown rather than closing immediately — a new
    /// client may arrive within the idle window.
    pub fn remove_client(self: &Arc<Self>, key: &RelaySessionKey, client_id: Uuid) {
        let Some(session) = self.get_session(key) else { return };
        session.clients.write().unwrap().remove(&client_id);
        session.touch();
        if session.client_count() == 0 {
            self.schedule_idle_teardown(key.clone(), session);
        }
    }

    fn schedule_idle_teardown(self: &Arc<Self>, key: RelaySessionKey, session: Arc<RelaySession>) {
        let manager = self.clone();
        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if session.client_count() > 0 {
                return;
            }
            info!(session_id = %session.id, "idle timeout elapsed, tearing down relay session");
            manager.close_session(&key);
        });
    }

    pub fn close_session(&self, key: &RelaySessionKey) {
        if let Some(session) = self.sessions.write().unwrap().remove(key) {
            session.cancel.cancel();
            session.buffer.close();
        }
    }

    pub fn list_sessions(&self) -> Vec<RelaySessionDescriptor> {
        self.sessions.read().unwrap().values().map(|s| s.descriptor()).collect()
    }
}

async fn run_producer(http: reqwest::Client, session: Arc<RelaySession>) -> AppResult<()> {
    let response = http.get(&session.origin_url).send().await?;
    let mut stream = response.bytes_stream();
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => {
                info!(session_id = %session.id, "relay session closed");
                return Ok(());
            }
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => session.buffer.write(&bytes),
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(()),
                }
            }
        }
    }
}
