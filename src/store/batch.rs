//! Atomic write batches.

use super::{DocPath, Document};

/// How an operation treats the document already at its path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Replace the whole document, creating it if absent
    Set,
    /// Merge the given fields into the document, creating it if absent
    Merge,
    /// Merge the given fields into an existing document; fails the batch if absent
    Update,
    /// Remove the document; no-op if absent
    Delete,
}

/// One operation of a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub path: DocPath,
    pub kind: WriteKind,
    pub data: Document,
    /// Fields the store fills with the commit's server timestamp
    pub stamps: Vec<&'static str>,
}

impl WriteOp {
    /// Have the store stamp `fields` with the commit time
    pub fn stamp(&mut self, fields: &[&'static str]) -> &mut Self {
        self.stamps.extend_from_slice(fields);
        self
    }
}

/// Ordered set of operations committed all-or-nothing
///
/// Operations apply in insertion order, so a later operation on the same path
/// sees the effect of an earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, data: Document) -> &mut WriteOp {
        self.push(path, WriteKind::Set, data)
    }

    pub fn merge(&mut self, path: DocPath, data: Document) -> &mut WriteOp {
        self.push(path, WriteKind::Merge, data)
    }

    pub fn update(&mut self, path: DocPath, data: Document) -> &mut WriteOp {
        self.push(path, WriteKind::Update, data)
    }

    pub fn delete(&mut self, path: DocPath) {
        self.push(path, WriteKind::Delete, Document::new());
    }

    fn push(&mut self, path: DocPath, kind: WriteKind, data: Document) -> &mut WriteOp {
        self.ops.push(WriteOp {
            path,
            kind,
            data,
            stamps: Vec::new(),
        });
        let last = self.ops.len() - 1;
        &mut self.ops[last]
    }

    /// Append every operation of `other`
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// What a successful commit applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitReceipt {
    /// Operations applied
    pub ops: usize,
    /// Server time used for stamped fields, epoch milliseconds
    pub commit_time_ms: i64,
}

impl CommitReceipt {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_records_ops_in_order() {
        let mut batch = WriteBatch::new();
        batch
            .set(DocPath::new("tickets", "t1"), Document::new())
            .stamp(&["createdAt", "updatedAt"]);
        batch.delete(DocPath::new("appointments", "t1__s1"));
        batch.update(DocPath::new("tickets", "t1"), Document::new());

        let kinds: Vec<WriteKind> = batch.ops().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![WriteKind::Set, WriteKind::Delete, WriteKind::Update]);
        assert_eq!(batch.ops()[0].stamps, vec!["createdAt", "updatedAt"]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_extend_appends() {
        let mut a = WriteBatch::new();
        a.delete(DocPath::new("x", "1"));
        let mut b = WriteBatch::new();
        b.delete(DocPath::new("x", "2"));
        b.delete(DocPath::new("x", "3"));
        a.extend(b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.ops()[2].path.id(), "3");
        assert!(WriteBatch::new().is_empty());
    }
}
