//! The remote side: sequences transactions and publishes confirmed mutations.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::document::RemoteMutation;
use crate::error::SubmitError;
use crate::keys::{KeyGenerator, RandomKeys};
use crate::mutation::{apply_transaction, document_rev, Documents, Transaction};
use crate::patch::Applier;

/// A document and a subscription that starts exactly after it.
#[derive(Debug)]
pub struct Checkout {
    pub document: Option<Value>,
    pub events: broadcast::Receiver<RemoteMutation>,
}

/// Source of truth for document revisions.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Loads a document and subscribes to every mutation confirmed after it.
    async fn checkout(&self, id: &str) -> Result<Checkout, SubmitError>;

    /// Applies a transaction atomically. Returns the resulting revision.
    async fn submit(&self, origin: &str, tx: Transaction) -> Result<String, SubmitError>;
}

struct State {
    documents: Documents,
    applier: Applier<RandomKeys>,
    failures: VecDeque<SubmitError>,
    sequence: u64,
}

/// An in-process authority. Transactions are applied in arrival order.
pub struct MemoryAuthority {
    state: Mutex<State>,
    events: broadcast::Sender<RemoteMutation>,
}

impl MemoryAuthority {
    pub fn new(capacity: usize) -> Self {
        Self::with_documents(capacity, Documents::new())
    }

    pub fn with_documents(capacity: usize, documents: Documents) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(State {
                documents,
                applier: Applier::default(),
                failures: VecDeque::new(),
                sequence: 0,
            }),
            events,
        }
    }

    pub async fn document(&self, id: &str) -> Option<Value> {
        self.state.lock().await.documents.get(id).cloned()
    }

    /// Makes the next submission fail with `err` without applying it.
    pub async fn fail_next(&self, err: SubmitError) {
        self.state.lock().await.failures.push_back(err);
    }

    /// Subscribes to every confirmed mutation, for all documents.
    pub fn listen(&self) -> broadcast::Receiver<RemoteMutation> {
        self.events.subscribe()
    }
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Authority for MemoryAuthority {
    async fn checkout(&self, id: &str) -> Result<Checkout, SubmitError> {
        // Subscribing under the lock: no confirmation can slip in between.
        let state = self.state.lock().await;
        Ok(Checkout {
            document: state.documents.get(id).cloned(),
            events: self.events.subscribe(),
        })
    }

    async fn submit(&self, origin: &str, mut tx: Transaction) -> Result<String, SubmitError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.failures.pop_front() {
            debug!(origin, error = %err, "injected failure");
            return Err(err);
        }

        state.sequence += 1;
        let sequence = state.sequence;
        let rev = match &tx.id {
            Some(id) => id.clone(),
            None => format!("{sequence}-{}", state.applier.keys_mut().next_key()),
        };
        tx.id = Some(rev.clone());

        let State {
            documents, applier, ..
        } = &mut *state;
        let next = apply_transaction(applier, documents, &tx).map_err(SubmitError::Rejected)?;

        for id in tx.document_ids() {
            let mutation = RemoteMutation {
                transaction_id: rev.clone(),
                document_id: id.to_string(),
                origin: Some(origin.to_string()),
                previous_rev: documents.get(id).and_then(document_rev).map(str::to_string),
                result_rev: rev.clone(),
                mutations: tx.for_document(id),
                document: next.get(id).cloned(),
            };
            // No subscribers is fine.
            let _ = self.events.send(mutation);
        }
        info!(origin, transaction = %rev, documents = ?tx.document_ids(), "transaction committed");
        *documents = next;
        Ok(rev)
    }
}
