//! Derives the state of a transaction group from its immutable records.
//!
//! A group is a root transaction (AUTH, CHARGE, DEBIT, CREDIT, or a
//! verification-class STORAGE / PRE_NOTE) plus every CAPTURE, VOID, ACH_VOID
//! and REFUND below it. [`compute_state`] is pure and total: it never fails,
//! and its output does not depend on the order of its input. Inconsistencies
//! are reported through [`GroupState::anomalies`] rather than errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::transaction::{Transaction, TransactionStatus, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootStatus {
    Authorized,
    Charged,
    Captured,
    Voided,
    PartiallyRefunded,
    Refunded,
    Credited,
    Verified,
    Pending,
    Declined,
    Failed,
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    MissingRoot,
    MultipleRoots {
        root_ids: Vec<Uuid>,
    },
    InvalidRoot {
        transaction_id: Uuid,
        transaction_type: TransactionType,
    },
    Orphan {
        transaction_id: Uuid,
    },
    UnexpectedChild {
        transaction_id: Uuid,
        parent_id: Uuid,
        transaction_type: TransactionType,
    },
    CaptureExceedsAuthorization {
        transaction_id: Uuid,
        amount_cents: i64,
        remaining_cents: i64,
    },
    RefundExceedsBase {
        transaction_id: Uuid,
        parent_id: Uuid,
        amount_cents: i64,
        remaining_cents: i64,
    },
    VoidAfterSettlement {
        transaction_id: Uuid,
    },
}

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupState {
    pub root_id: Option<Uuid>,
    pub root_type: Option<TransactionType>,
    pub root_status: RootStatus,
    pub authorized_amount_cents: i64,
    pub captured_amount_cents: i64,
    pub refunded_amount_cents: i64,
    /// Pending or indeterminate captures/refunds. Held against the remaining
    /// amounts, never counted as captured or refunded.
    pub held_amount_cents: i64,
    pub voided_at: Option<DateTime<Utc>>,
    pub capturable_remaining_cents: i64,
    pub refundable_remaining_cents: i64,
    /// Refundable remainder per refundable parent: the CHARGE/DEBIT root or
    /// each approved CAPTURE.
    pub refundable_by_node: BTreeMap<Uuid, i64>,
    /// Number of records in the group. Used as the optimistic write token.
    pub version: i64,
    pub anomalies: Vec<Anomaly>,
}

impl GroupState {
    fn rootless(version: i64, anomalies: Vec<Anomaly>) -> Self {
        Self {
            root_id: None,
            root_type: None,
            root_status: RootStatus::Failed,
            authorized_amount_cents: 0,
            captured_amount_cents: 0,
            refunded_amount_cents: 0,
            held_amount_cents: 0,
            voided_at: None,
            capturable_remaining_cents: 0,
            refundable_remaining_cents: 0,
            refundable_by_node: BTreeMap::new(),
            version,
            anomalies,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }

    /// True once any capture or refund exists that is approved or whose
    /// outcome is still unknown.
    pub fn has_settlement_activity(&self) -> bool {
        self.captured_amount_cents > 0
            || self.refunded_amount_cents > 0
            || self.held_amount_cents > 0
    }

    pub fn refundable_for(&self, node_id: Uuid) -> i64 {
        self.refundable_by_node.get(&node_id).copied().unwrap_or(0)
    }
}

/// Arena over one group's records: sorted by `(created_at, id)`, duplicate
/// ids dropped, with a parent → children index.
pub(crate) struct TransactionTree<'a> {
    nodes: Vec<&'a Transaction>,
    children: HashMap<Uuid, Vec<usize>>,
    roots: Vec<usize>,
}

impl<'a> TransactionTree<'a> {
    pub fn build(records: &'a [Transaction]) -> Self {
        let mut sorted: Vec<&Transaction> = records.iter().collect();
        sorted.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let mut seen = HashSet::with_capacity(sorted.len());
        let nodes: Vec<&Transaction> = sorted.into_iter().filter(|tx| seen.insert(tx.id)).collect();

        let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (i, tx) in nodes.iter().enumerate() {
            match tx.parent_transaction_id {
                None => roots.push(i),
                Some(parent) => children.entry(parent).or_default().push(i),
            }
        }

        Self {
            nodes,
            children,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn children_of(&self, id: Uuid) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| self.nodes[i])
    }

    fn reachable_from(&self, root: Uuid) -> HashSet<Uuid> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.children_of(id).map(|child| child.id));
        }
        seen
    }
}

#[derive(Default)]
struct Walk {
    captured: i64,
    refunded: i64,
    held_captures: i64,
    held_refunds: i64,
    void_held: bool,
    voided_at: Option<DateTime<Utc>>,
    void_id: Option<Uuid>,
    refundable_by_node: BTreeMap<Uuid, i64>,
    anomalies: Vec<Anomaly>,
}

impl Walk {
    fn unexpected(&mut self, tx: &Transaction, parent: &Transaction) {
        self.anomalies.push(Anomaly::UnexpectedChild {
            transaction_id: tx.id,
            parent_id: parent.id,
            transaction_type: tx.transaction_type,
        });
    }

    fn record_void(&mut self, tx: &Transaction) {
        match tx.status {
            TransactionStatus::Approved => {
                if self.voided_at.is_none() {
                    self.voided_at = Some(tx.created_at);
                    self.void_id = Some(tx.id);
                }
            }
            s if s.is_unsettled() => self.void_held = true,
            _ => {}
        }
    }

    /// Refunds below a refundable parent, bounded by that parent's amount.
    /// Children of other types are left to the caller.
    fn walk_refunds(&mut self, tree: &TransactionTree<'_>, parent: &Transaction) {
        let mut refunded_here = 0;
        let mut held_here = 0;
        for child in tree
            .children_of(parent.id)
            .filter(|c| c.transaction_type == TransactionType::Refund)
        {
            self.reject_children(tree, child);
            match child.status {
                TransactionStatus::Approved => {
                    let remaining = parent.amount_cents - refunded_here;
                    if child.amount_cents > remaining {
                        self.anomalies.push(Anomaly::RefundExceedsBase {
                            transaction_id: child.id,
                            parent_id: parent.id,
                            amount_cents: child.amount_cents,
                            remaining_cents: remaining,
                        });
                    }
                    refunded_here += child.amount_cents;
                }
                s if s.is_unsettled() => held_here += child.amount_cents,
                _ => {}
            }
        }
        self.refunded += refunded_here;
        self.held_refunds += held_here;
        self.refundable_by_node.insert(
            parent.id,
            (parent.amount_cents - refunded_here - held_here).max(0),
        );
    }

    fn reject_children(&mut self, tree: &TransactionTree<'_>, parent: &Transaction) {
        for child in tree.children_of(parent.id) {
            self.unexpected(child, parent);
        }
    }
}

/// Computes the state of the group formed by `records`.
pub fn compute_state(records: &[Transaction]) -> GroupState {
    let tree = TransactionTree::build(records);
    let version = tree.len() as i64;

    let root = match tree.roots.as_slice() {
        [] => return GroupState::rootless(version, vec![Anomaly::MissingRoot]),
        [only] => tree.nodes[*only],
        many => {
            let root_ids = many.iter().map(|&i| tree.nodes[i].id).collect();
            return GroupState::rootless(version, vec![Anomaly::MultipleRoots { root_ids }]);
        }
    };

    let mut walk = Walk::default();

    let reachable = tree.reachable_from(root.id);
    for tx in &tree.nodes {
        if !reachable.contains(&tx.id) {
            walk.anomalies.push(Anomaly::Orphan {
                transaction_id: tx.id,
            });
        }
    }

    let mut state = GroupState {
        root_id: Some(root.id),
        root_type: Some(root.transaction_type),
        authorized_amount_cents: root.amount_cents,
        ..GroupState::rootless(version, Vec::new())
    };

    if !root.is_approved() {
        walk.reject_children(&tree, root);
        state.root_status = match root.status {
            TransactionStatus::Pending => RootStatus::Pending,
            TransactionStatus::Declined => RootStatus::Declined,
            TransactionStatus::Indeterminate => RootStatus::Indeterminate,
            _ => RootStatus::Failed,
        };
        state.anomalies = walk.anomalies;
        return state;
    }

    match root.transaction_type {
        TransactionType::Auth => {
            for child in tree.children_of(root.id) {
                match child.transaction_type {
                    TransactionType::Capture => match child.status {
                        TransactionStatus::Approved => {
                            let remaining = root.amount_cents - walk.captured;
                            if child.amount_cents > remaining {
                                walk.anomalies.push(Anomaly::CaptureExceedsAuthorization {
                                    transaction_id: child.id,
                                    amount_cents: child.amount_cents,
                                    remaining_cents: remaining,
                                });
                            }
                            walk.captured += child.amount_cents;
                            for grandchild in tree.children_of(child.id) {
                                if grandchild.transaction_type != TransactionType::Refund {
                                    walk.unexpected(grandchild, child);
                                }
                            }
                            walk.walk_refunds(&tree, child);
                        }
                        s => {
                            if s.is_unsettled() {
                                walk.held_captures += child.amount_cents;
                            }
                            walk.reject_children(&tree, child);
                        }
                    },
                    TransactionType::Void => {
                        walk.reject_children(&tree, child);
                        walk.record_void(child);
                    }
                    _ => walk.unexpected(child, root),
                }
            }
            state.capturable_remaining_cents =
                (root.amount_cents - walk.captured - walk.held_captures).max(0);
            state.refundable_remaining_cents =
                (walk.captured - walk.refunded - walk.held_refunds).max(0);
            state.root_status = settled_status(walk.captured, walk.refunded)
                .unwrap_or(if walk.captured > 0 {
                    RootStatus::Captured
                } else {
                    RootStatus::Authorized
                });
        }
        TransactionType::Charge | TransactionType::Debit => {
            let void_type = if root.transaction_type == TransactionType::Charge {
                TransactionType::Void
            } else {
                TransactionType::AchVoid
            };
            for child in tree.children_of(root.id) {
                if child.transaction_type == void_type {
                    walk.reject_children(&tree, child);
                    walk.record_void(child);
                } else if child.transaction_type != TransactionType::Refund {
                    walk.unexpected(child, root);
                }
            }
            walk.walk_refunds(&tree, root);
            state.refundable_remaining_cents =
                (root.amount_cents - walk.refunded - walk.held_refunds).max(0);
            state.root_status = settled_status(root.amount_cents, walk.refunded)
                .unwrap_or(RootStatus::Charged);
        }
        TransactionType::Credit => {
            for child in tree.children_of(root.id) {
                if child.transaction_type == TransactionType::AchVoid {
                    walk.reject_children(&tree, child);
                    walk.record_void(child);
                } else {
                    walk.unexpected(child, root);
                }
            }
            state.root_status = RootStatus::Credited;
        }
        TransactionType::Storage | TransactionType::PreNote => {
            walk.reject_children(&tree, root);
            state.root_status = RootStatus::Verified;
        }
        other => {
            walk.anomalies.push(Anomaly::InvalidRoot {
                transaction_id: root.id,
                transaction_type: other,
            });
            walk.reject_children(&tree, root);
            state.root_status = RootStatus::Failed;
        }
    }

    state.captured_amount_cents = walk.captured;
    state.refunded_amount_cents = walk.refunded;
    state.held_amount_cents = walk.held_captures + walk.held_refunds;
    state.refundable_by_node = walk.refundable_by_node;

    if let Some(voided_at) = walk.voided_at {
        if walk.captured > 0 || walk.refunded > 0 {
            if let Some(void_id) = walk.void_id {
                walk.anomalies.push(Anomaly::VoidAfterSettlement {
                    transaction_id: void_id,
                });
            }
        }
        state.voided_at = Some(voided_at);
        state.root_status = RootStatus::Voided;
    }
    if walk.voided_at.is_some() || walk.void_held {
        state.capturable_remaining_cents = 0;
        state.refundable_remaining_cents = 0;
        for remaining in state.refundable_by_node.values_mut() {
            *remaining = 0;
        }
    }

    state.anomalies = walk.anomalies;
    state
}

fn settled_status(base: i64, refunded: i64) -> Option<RootStatus> {
    if refunded <= 0 {
        None
    } else if refunded >= base {
        Some(RootStatus::Refunded)
    } else {
        Some(RootStatus::PartiallyRefunded)
    }
}
