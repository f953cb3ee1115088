//! Patch operations and the value kinds they dispatch on.

use json_mutator_path::Path;
use serde_json::{Number, Value};

use crate::insert::InsertPosition;

// ── Patch ─────────────────────────────────────────────────────────────────

/// A single document patch.
///
/// Paths may be ambiguous; the patch then applies to every location they
/// match. For the array operations (`Insert`, `Upsert`, `Truncate`) the last
/// path segment is the locator inside the array addressed by the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Set {
        path: Path,
        value: Value,
    },
    SetIfMissing {
        path: Path,
        value: Value,
    },
    Unset {
        path: Path,
    },
    Inc {
        path: Path,
        amount: Number,
    },
    Dec {
        path: Path,
        amount: Number,
    },
    DiffMatchPatch {
        path: Path,
        patch: String,
    },
    Insert {
        path: Path,
        position: InsertPosition,
        items: Vec<Value>,
    },
    Upsert {
        path: Path,
        position: InsertPosition,
        items: Vec<Value>,
    },
    Truncate {
        path: Path,
    },
    Move {
        path: Path,
        from: usize,
        to: usize,
    },
}

impl Patch {
    pub fn set(path: Path, value: Value) -> Self {
        Patch::Set { path, value }
    }

    pub fn set_if_missing(path: Path, value: Value) -> Self {
        Patch::SetIfMissing { path, value }
    }

    pub fn unset(path: Path) -> Self {
        Patch::Unset { path }
    }

    pub fn inc(path: Path, amount: impl Into<Number>) -> Self {
        Patch::Inc {
            path,
            amount: amount.into(),
        }
    }

    pub fn dec(path: Path, amount: impl Into<Number>) -> Self {
        Patch::Dec {
            path,
            amount: amount.into(),
        }
    }

    pub fn diff_match_patch(path: Path, patch: impl Into<String>) -> Self {
        Patch::DiffMatchPatch {
            path,
            patch: patch.into(),
        }
    }

    pub fn insert(path: Path, position: InsertPosition, items: Vec<Value>) -> Self {
        Patch::Insert {
            path,
            position,
            items,
        }
    }

    pub fn replace(path: Path, items: Vec<Value>) -> Self {
        Patch::Insert {
            path,
            position: InsertPosition::Replace,
            items,
        }
    }

    /// Wire name of the operation.
    pub fn op_name(&self) -> &'static str {
        match self {
            Patch::Set { .. } => "set",
            Patch::SetIfMissing { .. } => "setIfMissing",
            Patch::Unset { .. } => "unset",
            Patch::Inc { .. } => "inc",
            Patch::Dec { .. } => "dec",
            Patch::DiffMatchPatch { .. } => "diffMatchPatch",
            Patch::Insert {
                position: InsertPosition::Replace,
                ..
            } => "replace",
            Patch::Insert { .. } => "insert",
            Patch::Upsert { .. } => "upsert",
            Patch::Truncate { .. } => "truncate",
            Patch::Move { .. } => "move",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Patch::Set { path, .. }
            | Patch::SetIfMissing { path, .. }
            | Patch::Unset { path }
            | Patch::Inc { path, .. }
            | Patch::Dec { path, .. }
            | Patch::DiffMatchPatch { path, .. }
            | Patch::Insert { path, .. }
            | Patch::Upsert { path, .. }
            | Patch::Truncate { path }
            | Patch::Move { path, .. } => path,
        }
    }

    /// Whether the patch can introduce or relocate array elements.
    pub fn moves_items(&self) -> bool {
        !matches!(
            self,
            Patch::DiffMatchPatch { .. }
                | Patch::Inc { .. }
                | Patch::Dec { .. }
                | Patch::Unset { .. }
                | Patch::Truncate { .. }
        )
    }
}

// ── Value kind ────────────────────────────────────────────────────────────

/// Runtime kind of the value found at a patch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Missing,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => ValueKind::Missing,
            Some(Value::Null) => ValueKind::Null,
            Some(Value::Bool(_)) => ValueKind::Boolean,
            Some(Value::Number(_)) => ValueKind::Number,
            Some(Value::String(_)) => ValueKind::String,
            Some(Value::Array(_)) => ValueKind::Array,
            Some(Value::Object(_)) => ValueKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Missing => "missing",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }

    /// Scalars: everything that is neither a container nor missing.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueKind::Null | ValueKind::Boolean | ValueKind::Number | ValueKind::String
        )
    }
}
