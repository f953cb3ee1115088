//! Optimistic document state reconciled against a remote authority.
//!
//! Two versions of the document are tracked. HEAD follows the mutations the
//! authority has confirmed, in revision order. EDGE is HEAD with every local
//! transaction not yet seen in the confirmed stream applied on top; it is
//! what an editor shows.
//!
//! Local transactions move through two queues: `pending` (staged, submission
//! not yet acknowledged) and `submitted` (acknowledged, echo not yet seen).
//! Remote mutations wait in `incoming` until their `previous_rev` matches
//! HEAD. When confirmations arrive in an order EDGE did not predict, EDGE is
//! recomputed from HEAD and a rebase event is emitted if it changed.
//!
//! A session that loses track of the confirmed stream reloads HEAD from a
//! fresh checkout. Local transactions survive a reload; acknowledged ones are
//! already part of the checkout and are dropped.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::PatchError;
use crate::keys::{KeyGenerator, RandomKeys};
use crate::mutation::{
    apply_to_document, document_rev, normalize_transaction_keys, Mutation, Transaction,
};
use crate::patch::Applier;

/// A transaction as confirmed by the authority, restricted to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMutation {
    pub transaction_id: String,
    pub document_id: String,
    /// Identity of the session that submitted the transaction.
    pub origin: Option<String>,
    /// Revision the document had before; `None` if it did not exist.
    pub previous_rev: Option<String>,
    pub result_rev: String,
    pub mutations: Vec<Mutation>,
    /// Canonical document after the transaction; `None` if it was deleted.
    pub document: Option<Value>,
}

/// Whether a change was authored by this session or someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn of(author: Option<&str>, identity: &str) -> Self {
        if author == Some(identity) {
            Origin::Local
        } else {
            Origin::Remote
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Never loaded.
    Unknown,
    /// EDGE equals HEAD and nothing is in flight.
    Synced,
    /// Local transactions or remote mutations are unresolved.
    Diverged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// EDGE moved in the expected way: a local transaction was staged, or a
    /// remote one arrived while nothing local was in flight.
    Mutation {
        origin: Origin,
        transaction_id: String,
        document: Option<Value>,
    },
    /// A confirmed mutation was applied to HEAD. `origin` tells an echo of
    /// our own submission from someone else's edit.
    Remote {
        origin: Origin,
        transaction_id: String,
        head: Option<Value>,
    },
    /// EDGE changed because the confirmed order differed from the predicted
    /// one, or a local transaction failed.
    Rebase {
        document: Option<Value>,
        pending: Vec<String>,
    },
    Consistency {
        consistent: bool,
    },
}

/// Reconciliation state for one document.
#[derive(Debug)]
pub struct SyncDocument<K = RandomKeys> {
    id: String,
    identity: String,
    applier: Applier<K>,
    loaded: bool,
    head: Option<Value>,
    edge: Option<Value>,
    incoming: Vec<RemoteMutation>,
    submitted: VecDeque<Transaction>,
    pending: VecDeque<Transaction>,
    /// Pending at the last reload; the checkout may already contain them.
    unconfirmed: HashSet<String>,
    stale: bool,
    consistent: bool,
    events: Vec<SyncEvent>,
}

impl<K: KeyGenerator> SyncDocument<K> {
    pub fn new(id: impl Into<String>, identity: impl Into<String>, applier: Applier<K>) -> Self {
        Self {
            id: id.into(),
            identity: identity.into(),
            applier,
            loaded: false,
            head: None,
            edge: None,
            incoming: Vec::new(),
            submitted: VecDeque::new(),
            pending: VecDeque::new(),
            unconfirmed: HashSet::new(),
            stale: false,
            consistent: true,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn head(&self) -> Option<&Value> {
        self.head.as_ref()
    }

    pub fn edge(&self) -> Option<&Value> {
        self.edge.as_ref()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().filter_map(|tx| tx.id.clone()).collect()
    }

    /// The staged form of a pending transaction, as it should be submitted.
    pub fn pending_transaction(&self, tx_id: &str) -> Option<&Transaction> {
        self.pending.iter().find(|tx| tx.id.as_deref() == Some(tx_id))
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.submitted.iter().filter_map(|tx| tx.id.clone()).collect()
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    pub fn state(&self) -> SyncState {
        match (self.loaded, self.consistent) {
            (false, _) => SyncState::Unknown,
            (true, true) => SyncState::Synced,
            (true, false) => SyncState::Diverged,
        }
    }

    /// True when HEAD may be missing an echo and should be checked out again.
    pub fn needs_reload(&self) -> bool {
        self.stale
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    /// Starts over from a freshly loaded document, dropping all queues.
    pub fn reset(&mut self, doc: Option<Value>) {
        debug!(document = %self.id, rev = ?doc.as_ref().and_then(document_rev), "reset");
        self.loaded = true;
        self.incoming.clear();
        self.submitted.clear();
        self.pending.clear();
        self.unconfirmed.clear();
        self.stale = false;
        self.head = doc.clone();
        self.edge = doc;
        self.update_consistency();
    }

    /// Replaces HEAD with a fresh checkout while keeping local work.
    ///
    /// Buffered remote mutations are dropped. Acknowledged transactions were
    /// committed before the checkout and are dropped as well. Pending ones
    /// stay queued, except those up to a transaction whose id is the checkout's
    /// revision. EDGE is then rebuilt on the new HEAD.
    pub fn reload(&mut self, doc: Option<Value>) {
        let rev = doc.as_ref().and_then(document_rev).map(str::to_string);
        debug!(
            document = %self.id,
            rev = ?rev,
            pending = self.pending.len(),
            submitted = self.submitted.len(),
            "reload"
        );
        self.loaded = true;
        self.incoming.clear();
        self.submitted.clear();
        if let Some(idx) = rev
            .as_deref()
            .and_then(|rev| self.pending.iter().position(|tx| tx.id.as_deref() == Some(rev)))
        {
            self.pending.drain(..=idx);
        }
        self.unconfirmed = self.pending.iter().filter_map(|tx| tx.id.clone()).collect();
        self.stale = false;
        self.head = doc;
        self.rebase();
        self.update_consistency();
    }

    /// Applies a local transaction to EDGE and queues it for submission.
    ///
    /// A transaction without an id is given a fresh one, and new array items
    /// in it are keyed. Returns the id. A transaction that does not apply to
    /// EDGE is rejected and not queued.
    pub fn stage(&mut self, mut tx: Transaction) -> Result<String, PatchError> {
        let tx_id = match &tx.id {
            Some(id) => id.clone(),
            None => {
                let id = self.applier.keys_mut().next_key();
                tx.id = Some(id.clone());
                id
            }
        };
        normalize_transaction_keys(&mut self.applier, &mut tx);
        let edge = apply_to_document(&mut self.applier, &self.id, self.edge.as_ref(), &tx)?;
        debug!(document = %self.id, transaction = %tx_id, "staged (pushed to pending)");
        self.edge = edge;
        self.pending.push_back(tx);
        self.events.push(SyncEvent::Mutation {
            origin: Origin::Local,
            transaction_id: tx_id.clone(),
            document: self.edge.clone(),
        });
        self.update_consistency();
        Ok(tx_id)
    }

    /// A confirmed mutation arrived from the authority.
    pub fn arrive(&mut self, mutation: RemoteMutation) {
        if mutation.document_id != self.id {
            return;
        }
        trace!(
            document = %self.id,
            transaction = %mutation.transaction_id,
            previous = ?mutation.previous_rev,
            "incoming"
        );
        self.incoming.push(mutation);
        self.consider_incoming();
        self.update_consistency();
    }

    /// The authority accepted a pending transaction.
    pub fn submission_succeeded(&mut self, tx_id: &str) {
        let Some(idx) = self.pending.iter().position(|tx| tx.id.as_deref() == Some(tx_id)) else {
            // Its echo has already been consumed.
            return;
        };
        if let Some(tx) = self.pending.remove(idx) {
            self.submitted.push_back(tx);
        }
        if idx > 0 {
            debug!(document = %self.id, transaction = %tx_id, "submitted out of order");
            self.rebase();
        }
        if self.unconfirmed.remove(tx_id) {
            // Committed around the last reload, so its echo may never come.
            debug!(document = %self.id, transaction = %tx_id, "acknowledged across a reload");
            self.stale = true;
        }
        self.update_consistency();
    }

    /// The authority refused a pending transaction; EDGE drops its effect.
    pub fn submission_failed(&mut self, tx_id: &str) {
        warn!(document = %self.id, transaction = %tx_id, "submission failed, reverting");
        self.pending.retain(|tx| tx.id.as_deref() != Some(tx_id));
        self.unconfirmed.remove(tx_id);
        self.rebase();
        self.update_consistency();
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn head_rev(&self) -> Option<&str> {
        self.head.as_ref().and_then(document_rev)
    }

    /// Applies every incoming mutation that follows HEAD, in revision order.
    fn consider_incoming(&mut self) {
        let current = self.head_rev().map(str::to_string);
        // A second delivery of what HEAD already reflects.
        self.incoming
            .retain(|m| current.is_none() || Some(m.result_rev.as_str()) != current.as_deref());

        let mut must_rebase = false;
        loop {
            let head_rev = self.head_rev();
            let Some(idx) = self
                .incoming
                .iter()
                .position(|m| m.previous_rev.as_deref() == head_rev)
            else {
                break;
            };
            let mutation = self.incoming.remove(idx);
            must_rebase |= self.apply_incoming(mutation);
        }

        if !self.incoming.is_empty() {
            debug!(
                document = %self.id,
                waiting = ?self.incoming.iter().map(|m| &m.transaction_id).collect::<Vec<_>>(),
                "unable to apply incoming mutations yet"
            );
        }
        if must_rebase {
            self.rebase();
        }
    }

    /// Moves HEAD to the canonical result of `mutation`. Returns true if EDGE
    /// must be recomputed.
    fn apply_incoming(&mut self, mutation: RemoteMutation) -> bool {
        debug!(
            document = %self.id,
            transaction = %mutation.transaction_id,
            from = ?mutation.previous_rev,
            to = %mutation.result_rev,
            "applying confirmed mutation"
        );
        let origin = Origin::of(mutation.origin.as_deref(), &self.identity);
        self.head = mutation.document;
        self.events.push(SyncEvent::Remote {
            origin,
            transaction_id: mutation.transaction_id.clone(),
            head: self.head.clone(),
        });

        if !self.submitted.is_empty() || !self.pending.is_empty() {
            return self.consume_unresolved(&mutation.transaction_id);
        }
        self.edge = self.head.clone();
        self.events.push(SyncEvent::Mutation {
            origin,
            transaction_id: mutation.transaction_id,
            document: self.edge.clone(),
        });
        false
    }

    /// Drops a confirmed transaction from the local queues. No rebase is
    /// needed when it was the next one EDGE expected.
    fn consume_unresolved(&mut self, tx_id: &str) -> bool {
        self.unconfirmed.remove(tx_id);
        let is = |tx: Option<&Transaction>| tx.and_then(|tx| tx.id.as_deref()) == Some(tx_id);
        if !self.submitted.is_empty() {
            if is(self.submitted.front()) {
                trace!(transaction = %tx_id, "consumed from submitted");
                self.submitted.pop_front();
                return false;
            }
        } else if is(self.pending.front()) {
            trace!(transaction = %tx_id, "consumed from pending");
            self.pending.pop_front();
            return false;
        }
        debug!(
            document = %self.id,
            transaction = %tx_id,
            pending = self.pending.len(),
            submitted = self.submitted.len(),
            "confirmation out of predicted order"
        );
        self.submitted.retain(|tx| tx.id.as_deref() != Some(tx_id));
        self.pending.retain(|tx| tx.id.as_deref() != Some(tx_id));
        true
    }

    /// Recomputes EDGE as HEAD plus every unresolved local transaction.
    fn rebase(&mut self) {
        let mut edge = self.head.clone();
        for tx in self.submitted.iter().chain(self.pending.iter()) {
            match apply_to_document(&mut self.applier, &self.id, edge.as_ref(), tx) {
                Ok(next) => edge = next,
                Err(err) => warn!(
                    document = %self.id,
                    transaction = ?tx.id,
                    error = %err,
                    "local transaction no longer applies"
                ),
            }
        }
        let changed = !same_content(self.edge.as_ref(), edge.as_ref());
        self.edge = edge;
        if changed {
            debug!(document = %self.id, "rebased");
            self.events.push(SyncEvent::Rebase {
                document: self.edge.clone(),
                pending: self.pending_ids(),
            });
        }
    }

    fn update_consistency(&mut self) {
        let consistent =
            self.pending.is_empty() && self.submitted.is_empty() && self.incoming.is_empty();
        if consistent != self.consistent {
            debug!(document = %self.id, consistent, "consistency changed");
            self.consistent = consistent;
            self.events.push(SyncEvent::Consistency { consistent });
        }
    }
}

/// Equality that ignores `_rev`.
fn same_content(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            a.len() - usize::from(a.contains_key("_rev")) == b.len() - usize::from(b.contains_key("_rev"))
                && a.iter()
                    .filter(|(k, _)| k.as_str() != "_rev")
                    .all(|(k, v)| b.get(k) == Some(v))
        }
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Patch;
    use json_mutator_path::Path;
    use serde_json::json;

    fn doc() -> SyncDocument<impl FnMut() -> String> {
        let mut n = 0;
        SyncDocument::new(
            "doc",
            "me",
            Applier::new(move || {
                n += 1;
                format!("k{n}")
            }),
        )
    }

    fn set(id: &str, field: &str, value: Value) -> Transaction {
        Transaction::new(vec![Mutation::patch(
            "doc",
            vec![Patch::set(Path::parse(field).unwrap(), value)],
        )])
        .with_id(id)
    }

    fn remote(tx: &str, origin: &str, prev: &str, document: Value) -> RemoteMutation {
        RemoteMutation {
            transaction_id: tx.into(),
            document_id: "doc".into(),
            origin: Some(origin.into()),
            previous_rev: Some(prev.into()),
            result_rev: tx.into(),
            mutations: vec![],
            document: Some(document),
        }
    }

    #[test]
    fn unknown_until_loaded() {
        let mut d = doc();
        assert_eq!(d.state(), SyncState::Unknown);
        d.reset(Some(json!({"_id": "doc", "_rev": "r0"})));
        assert_eq!(d.state(), SyncState::Synced);
    }

    #[test]
    fn staging_diverges_and_echo_resyncs() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "a": 1})));
        d.stage(set("t1", "a", json!(2))).unwrap();
        assert_eq!(d.state(), SyncState::Diverged);
        assert_eq!(d.edge().unwrap()["a"], json!(2));

        d.submission_succeeded("t1");
        assert_eq!(d.submitted_ids(), vec!["t1"]);
        d.arrive(remote("t1", "me", "r0", json!({"_id": "doc", "_rev": "t1", "a": 2})));
        assert_eq!(d.state(), SyncState::Synced);

        let events = d.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::Remote { origin: Origin::Local, transaction_id, .. } if transaction_id == "t1"
        )));
        assert!(!events.iter().any(|e| matches!(e, SyncEvent::Rebase { .. })));
    }

    #[test]
    fn remote_edit_to_another_field_keeps_local_edit() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "a": 1, "b": 1})));
        d.stage(set("t1", "a", json!(2))).unwrap();
        d.arrive(remote("x1", "other", "r0", json!({"_id": "doc", "_rev": "x1", "a": 1, "b": 5})));

        let edge = d.edge().unwrap();
        assert_eq!(edge["a"], json!(2));
        assert_eq!(edge["b"], json!(5));
        assert_eq!(d.head().unwrap()["a"], json!(1));
        assert!(d
            .drain_events()
            .iter()
            .any(|e| matches!(e, SyncEvent::Rebase { .. })));
    }

    #[test]
    fn out_of_order_arrivals_are_buffered() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "n": 0})));
        d.arrive(remote("r2", "other", "r1", json!({"_id": "doc", "_rev": "r2", "n": 2})));
        assert_eq!(d.incoming_len(), 1);
        assert_eq!(d.state(), SyncState::Diverged);
        d.arrive(remote("r1", "other", "r0", json!({"_id": "doc", "_rev": "r1", "n": 1})));
        assert_eq!(d.incoming_len(), 0);
        assert_eq!(d.head().unwrap()["n"], json!(2));
        assert_eq!(d.edge().unwrap()["n"], json!(2));
        assert_eq!(d.state(), SyncState::Synced);
    }

    #[test]
    fn failed_submission_reverts_edge() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "a": 1})));
        d.stage(set("t1", "a", json!(2))).unwrap();
        d.submission_failed("t1");
        assert_eq!(d.edge().unwrap()["a"], json!(1));
        assert_eq!(d.state(), SyncState::Synced);
    }

    #[test]
    fn staging_an_inapplicable_transaction_is_an_error() {
        let mut d = doc();
        d.reset(None);
        let err = d.stage(set("t1", "a", json!(1))).unwrap_err();
        assert_eq!(err, PatchError::DocumentNotFound("doc".into()));
        assert!(d.pending_ids().is_empty());
    }

    #[test]
    fn stage_assigns_missing_ids() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc"})));
        let tx = Transaction::new(vec![Mutation::patch("doc", vec![])]);
        assert_eq!(d.stage(tx).unwrap(), "k1");
        assert_eq!(d.pending_ids(), vec!["k1"]);
    }

    #[test]
    fn reload_keeps_local_edits_in_flight() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "a": 1, "b": 0})));
        d.stage(set("t1", "a", json!(2))).unwrap();
        d.arrive(remote("x9", "other", "x8", json!({"_id": "doc", "_rev": "x9"})));
        d.drain_events();

        d.reload(Some(json!({"_id": "doc", "_rev": "x2", "a": 1, "b": 20})));
        assert_eq!(d.head().unwrap()["b"], json!(20));
        assert_eq!(d.edge().unwrap()["a"], json!(2));
        assert_eq!(d.edge().unwrap()["b"], json!(20));
        assert_eq!(d.pending_ids(), vec!["t1"]);
        assert_eq!(d.incoming_len(), 0);
        assert_eq!(d.state(), SyncState::Diverged);
        assert!(d
            .drain_events()
            .iter()
            .any(|e| matches!(e, SyncEvent::Rebase { .. })));

        d.submission_succeeded("t1");
        assert!(d.needs_reload());
        d.reload(Some(json!({"_id": "doc", "_rev": "t1", "a": 2, "b": 20})));
        assert!(!d.needs_reload());
        assert_eq!(d.state(), SyncState::Synced);
        assert_eq!(d.edge(), d.head());
    }

    #[test]
    fn reload_drops_what_the_checkout_contains() {
        let mut d = doc();
        d.reset(Some(json!({"_id": "doc", "_rev": "r0", "n": 0})));
        d.stage(set("t1", "a", json!(1))).unwrap();
        d.stage(set("t2", "b", json!(1))).unwrap();
        d.stage(set("t3", "c", json!(1))).unwrap();
        d.submission_succeeded("t1");

        d.reload(Some(json!({"_id": "doc", "_rev": "t2", "n": 0, "a": 1, "b": 1})));
        assert!(d.submitted_ids().is_empty());
        assert_eq!(d.pending_ids(), vec!["t3"]);
        assert_eq!(d.edge().unwrap()["c"], json!(1));

        // Its echo comes through the new subscription; no further reload.
        let confirmed = json!({"_id": "doc", "_rev": "t3", "n": 0, "a": 1, "b": 1, "c": 1});
        d.arrive(remote("t3", "me", "t2", confirmed));
        d.submission_succeeded("t3");
        assert!(!d.needs_reload());
        assert_eq!(d.state(), SyncState::Synced);
    }

    #[test]
    fn rebase_ignores_revision_changes() {
        assert!(same_content(
            Some(&json!({"_rev": "a", "x": 1})),
            Some(&json!({"x": 1, "_rev": "b"}))
        ));
        assert!(!same_content(Some(&json!({"x": 1})), Some(&json!({"x": 2}))));
        assert!(!same_content(Some(&json!({"x": 1})), None));
    }
}
