// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser login sessions and their single-use anti-forgery state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::tenant::TenantId;

/// How long a logged-in session stays valid.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct PendingState {
    value: String,
    issued: Instant,
}

#[derive(Debug)]
struct Session {
    pending: Option<PendingState>,
    tenant: Option<TenantId>,
    touched: Instant,
}

/// Session table keyed by the opaque session cookie value.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    state_ttl: Duration,
}

impl SessionStore {
    pub fn new(state_ttl: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), state_ttl }
    }

    /// Fresh opaque session id for the cookie.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Bind a pending anti-forgery state to `session_id`, replacing any
    /// earlier pending attempt.
    pub async fn set_pending(&self, session_id: &str, state: String) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_owned()).or_insert_with(|| Session {
            pending: None,
            tenant: None,
            touched: now,
        });
        session.pending = Some(PendingState { value: state, issued: now });
        session.touched = now;
    }

    /// Remove and return the pending state for `session_id`.
    ///
    /// The state is consumed even when it has expired; expired states
    /// return `None`.
    pub async fn take_pending(&self, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        let pending = sessions.get_mut(session_id)?.pending.take()?;
        if pending.issued.elapsed() >= self.state_ttl {
            return None;
        }
        Some(pending.value)
    }

    /// Finish a login: drop `session_id` and bind `tenant` to a fresh session
    /// id, which is returned for the new cookie. A session id chosen before
    /// login never carries the tenant.
    pub async fn log_in(&self, session_id: &str, tenant: TenantId) -> String {
        let fresh = Self::new_session_id();
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
        sessions.insert(
            fresh.clone(),
            Session { pending: None, tenant: Some(tenant), touched: Instant::now() },
        );
        fresh
    }

    /// Tenant bound to a still-valid session.
    pub async fn tenant(&self, session_id: &str) -> Option<TenantId> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(session_id)?;
        if session.touched.elapsed() >= SESSION_LIFETIME {
            return None;
        }
        session.tenant.clone()
    }

    /// Drop expired pending states and sessions with nothing left in them.
    /// Returns the number of sessions removed.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let state_ttl = self.state_ttl;
        sessions.retain(|_, session| {
            if session.pending.as_ref().is_some_and(|p| p.issued.elapsed() >= state_ttl) {
                session.pending = None;
            }
            let logged_in = session.tenant.is_some() && session.touched.elapsed() < SESSION_LIFETIME;
            logged_in || session.pending.is_some()
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Purge on a fixed interval until `shutdown` fires.
    pub fn spawn_purge(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = self.purge_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "purged expired login sessions");
                        }
                    }
                }
            }
        })
    }
}

/// Generate an unpredictable anti-forgery state (32 random bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two secrets without short-circuiting on the first difference.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
