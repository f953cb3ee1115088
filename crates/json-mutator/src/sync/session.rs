//! A running reconciliation session for one document.
//!
//! Two tasks per session. The reconciler owns the [`SyncDocument`] and is the
//! only place it is touched: it serializes local submissions, submission
//! results and confirmed remote mutations. The transport submits staged
//! transactions to the authority one at a time, in staging order, retrying
//! while the authority is unavailable, and reports each outcome back to the
//! reconciler.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::authority::Authority;
use super::document::{RemoteMutation, SyncDocument, SyncEvent, SyncState};
use super::retry::{retry, RetryConfig};
use crate::config::SessionConfig;
use crate::error::{PatchError, SessionError, SubmitError};
use crate::keys::{KeyGenerator, RandomKeys};
use crate::mutation::{Mutation, Transaction};
use crate::patch::{Applier, Patch};

/// What the reconciler last published.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub head: Option<Value>,
    pub edge: Option<Value>,
    pub state: SyncState,
    pub pending: usize,
    pub submitted: usize,
}

impl DocumentSnapshot {
    fn of<K: KeyGenerator>(doc: &SyncDocument<K>) -> Self {
        Self {
            head: doc.head().cloned(),
            edge: doc.edge().cloned(),
            state: doc.state(),
            pending: doc.pending_ids().len(),
            submitted: doc.submitted_ids().len(),
        }
    }
}

enum Command {
    Submit {
        transaction: Transaction,
        resp: oneshot::Sender<Result<String, PatchError>>,
    },
    Submitted {
        transaction_id: String,
        result: Result<String, SubmitError>,
    },
    Shutdown,
}

/// Client side of a session.
pub struct SessionHandle {
    document_id: String,
    identity: String,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<DocumentSnapshot>,
    events: broadcast::Sender<SyncEvent>,
    reconciler: JoinHandle<()>,
    transport: JoinHandle<()>,
}

impl SessionHandle {
    /// Checks out `document_id` from `authority` and starts reconciling it.
    pub async fn open(
        document_id: impl Into<String>,
        config: SessionConfig,
        authority: Arc<dyn Authority>,
    ) -> Result<Self, SubmitError> {
        let document_id = document_id.into();
        let mut keys = RandomKeys::new(&config.keys);
        let identity = config
            .identity
            .clone()
            .unwrap_or_else(|| format!("session-{}", keys.next_key()));

        let checkout = retry("checkout", &config.retry, SubmitError::is_retryable, || {
            authority.checkout(&document_id)
        })
        .await?;

        let mut doc = SyncDocument::new(document_id.clone(), identity.clone(), Applier::new(keys));
        doc.reset(checkout.document);

        let (commands, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(DocumentSnapshot::of(&doc));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        info!(document = %document_id, identity = %identity, "session opened");

        let reconciler = tokio::spawn(reconcile(
            doc,
            Arc::clone(&authority),
            command_rx,
            checkout.events,
            outgoing,
            snapshot_tx,
            events.clone(),
        ));
        let transport = tokio::spawn(transport(
            authority,
            identity.clone(),
            config.retry,
            outgoing_rx,
            commands.clone(),
        ));

        Ok(Self {
            document_id,
            identity,
            commands,
            snapshot,
            events,
            reconciler,
            transport,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Applies `patches` optimistically and queues them for submission.
    /// Returns the transaction id once [`SessionHandle::edge`] reflects it.
    pub async fn submit(&self, patches: Vec<Patch>) -> Result<String, SessionError> {
        let tx = Transaction::new(vec![Mutation::patch(self.document_id.clone(), patches)]);
        self.submit_transaction(tx).await
    }

    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<String, SessionError> {
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit { transaction, resp })
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.snapshot.borrow().clone()
    }

    /// The optimistic document.
    pub fn edge(&self) -> Option<Value> {
        self.snapshot.borrow().edge.clone()
    }

    pub fn watch(&self) -> watch::Receiver<DocumentSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Waits until the published state equals `state`.
    pub async fn wait_for_state(&self, state: SyncState) -> Result<DocumentSnapshot, SessionError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Stops both tasks. Unconfirmed transactions are dropped, and a
    /// submission still being retried is abandoned.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        drop(self.commands);
        let _ = self.reconciler.await;
        self.transport.abort();
        let _ = self.transport.await;
        info!(document = %self.document_id, "session closed");
    }
}

async fn reconcile<K: KeyGenerator>(
    mut doc: SyncDocument<K>,
    authority: Arc<dyn Authority>,
    mut commands: mpsc::Receiver<Command>,
    mut remote: broadcast::Receiver<RemoteMutation>,
    outgoing: mpsc::UnboundedSender<Transaction>,
    snapshot: watch::Sender<DocumentSnapshot>,
    events: broadcast::Sender<SyncEvent>,
) {
    let mut listening = true;
    loop {
        // Answered once the staged EDGE is published.
        let mut reply = None;
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Submit { transaction, resp }) => {
                    let result = doc.stage(transaction);
                    if let Some(staged) = result.as_ref().ok().and_then(|id| doc.pending_transaction(id)) {
                        if outgoing.send(staged.clone()).is_err() {
                            warn!(document = %doc.id(), "transport stopped");
                        }
                    }
                    reply = Some((resp, result));
                }
                Some(Command::Submitted { transaction_id, result }) => match result {
                    Ok(rev) => {
                        debug!(document = %doc.id(), transaction = %transaction_id, %rev, "submitted");
                        doc.submission_succeeded(&transaction_id);
                    }
                    Err(err) => {
                        warn!(document = %doc.id(), transaction = %transaction_id, error = %err, "submission failed");
                        doc.submission_failed(&transaction_id);
                    }
                },
                Some(Command::Shutdown) | None => break,
            },
            mutation = remote.recv(), if listening => match mutation {
                Ok(mutation) => doc.arrive(mutation),
                Err(RecvError::Lagged(missed)) => {
                    warn!(document = %doc.id(), missed, "missed remote mutations, reloading");
                    listening |= reload(&mut doc, authority.as_ref(), &mut remote).await;
                }
                Err(RecvError::Closed) => {
                    warn!(document = %doc.id(), "authority stopped publishing");
                    listening = false;
                }
            },
        }

        if doc.needs_reload() {
            // Retried after the next message if the checkout fails.
            listening |= reload(&mut doc, authority.as_ref(), &mut remote).await;
        }
        for event in doc.drain_events() {
            // No subscribers is fine.
            let _ = events.send(event);
        }
        snapshot.send_replace(DocumentSnapshot::of(&doc));
        if let Some((resp, result)) = reply {
            let _ = resp.send(result);
        }
    }
    debug!(document = %doc.id(), "reconciler stopped");
}

/// Checks the document out again and swaps in the new subscription.
/// Returns false if the checkout failed.
async fn reload<K: KeyGenerator>(
    doc: &mut SyncDocument<K>,
    authority: &dyn Authority,
    remote: &mut broadcast::Receiver<RemoteMutation>,
) -> bool {
    match authority.checkout(doc.id()).await {
        Ok(checkout) => {
            *remote = checkout.events;
            doc.reload(checkout.document);
            true
        }
        Err(err) => {
            warn!(document = %doc.id(), error = %err, "reload failed");
            false
        }
    }
}

async fn transport(
    authority: Arc<dyn Authority>,
    identity: String,
    config: RetryConfig,
    mut outgoing: mpsc::UnboundedReceiver<Transaction>,
    commands: mpsc::Sender<Command>,
) {
    while let Some(tx) = outgoing.recv().await {
        let transaction_id = tx.id.clone().unwrap_or_default();
        let result = retry("submit", &config, SubmitError::is_retryable, || {
            authority.submit(&identity, tx.clone())
        })
        .await;
        let report = Command::Submitted {
            transaction_id,
            result,
        };
        if commands.send(report).await.is_err() {
            break;
        }
    }
}
