//! Process-scoped SSH connection registry
//!
//! Every `SshTransport` in the process shares one pool of authenticated
//! sessions keyed by `user@host:port`. Two runners pointed at the same
//! endpoint reuse the same session, and [`close_all`] disconnects all of them,
//! including sessions still in use by other runners.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use russh::{Disconnect, client};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::ssh::SshClientHandler;

pub(crate) type Session = Arc<client::Handle<SshClientHandler>>;

/// One endpoint's session; locked while that endpoint connects
type Slot = Arc<Mutex<Option<Session>>>;

static CONNECTIONS: LazyLock<Mutex<HashMap<String, Slot>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

async fn slot(endpoint: &str) -> Slot {
    let mut connections = CONNECTIONS.lock().await;
    Arc::clone(connections.entry(endpoint.to_string()).or_default())
}

/// Return the pooled session for `endpoint`, connecting if needed
///
/// Concurrent first use of one endpoint yields a single session. Other
/// endpoints connect independently.
pub(crate) async fn get_or_connect<F, Fut>(endpoint: &str, connect: F) -> Result<Session, CommandError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<client::Handle<SshClientHandler>, CommandError>>,
{
    let slot = slot(endpoint).await;
    let mut pooled = slot.lock().await;

    if let Some(session) = pooled.as_ref() {
        if !session.is_closed() {
            return Ok(Arc::clone(session));
        }
        debug!(endpoint, "dropping closed SSH session");
        *pooled = None;
    }

    let session = Arc::new(connect().await?);
    *pooled = Some(Arc::clone(&session));
    Ok(session)
}

/// Forget a session after a protocol failure so the next call reconnects
pub(crate) async fn evict(endpoint: &str) {
    let slot = CONNECTIONS.lock().await.get(endpoint).cloned();
    if let Some(slot) = slot {
        slot.lock().await.take();
    }
}

/// Number of pooled sessions
pub async fn connection_count() -> usize {
    let slots: Vec<Slot> = CONNECTIONS.lock().await.values().cloned().collect();
    let mut count = 0;
    for slot in slots {
        if slot.lock().await.is_some() {
            count += 1;
        }
    }
    count
}

/// Disconnect every pooled SSH session in the process
///
/// Safe to call with nothing connected and safe to call repeatedly.
/// Disconnect failures are logged, never returned. Returns the number of
/// sessions that were pooled.
pub async fn close_all() -> usize {
    let slots: Vec<(String, Slot)> = CONNECTIONS.lock().await.drain().collect();
    let mut count = 0;

    for (endpoint, slot) in slots {
        let Some(session) = slot.lock().await.take() else {
            continue;
        };
        count += 1;
        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(endpoint = %endpoint, error = %e, "error while disconnecting SSH session");
        }
    }

    if count > 0 {
        info!(count, "closed all SSH connections");
    }
    count
}
