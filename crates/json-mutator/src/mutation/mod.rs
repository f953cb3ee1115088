//! Document mutations and transactions.

pub mod types;
pub mod apply;
pub mod codec;

pub use types::{document_id, document_rev, Documents, Mutation, Transaction};
pub use apply::{apply_mutation, apply_to_document, apply_transaction, normalize_transaction_keys};
pub use codec::{mutation_from_json, mutation_to_json, transaction_from_json, transaction_to_json};
