use crate::{
    ast::ExpressionNode,
    catalog::ProxyId,
    error::ExpressionError,
    matches::{MatchLookup, OrganizationId},
};
use itertools::Itertools;
use std::{collections::HashMap, hash::Hash};

/// One proxy leaf's outcome within an evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafOutcome {
    pub proxy: ProxyId,
    /// The stored effective value, `None` when no match fact exists for the
    /// (organization, proxy) pair.
    pub stored: Option<bool>,
}

impl LeafOutcome {
    /// The value the leaf evaluated to. Missing data reads as "not found".
    #[inline]
    pub fn effective(&self) -> bool {
        self.stored.unwrap_or(false)
    }
}

/// The outcome of evaluating an expression tree for one organization.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub value: bool,
    /// The distinct proxy leaves that evaluated `true` and made the root
    /// `true`, in first-seen order. Empty whenever the root is `false`.
    pub contributing: Vec<ProxyId>,
    /// Every leaf visited, with the stored value it saw. Audit trail for
    /// callers that need to explain the outcome.
    pub leaves: Vec<LeafOutcome>,
}

impl Evaluation {
    /// Whether any leaf had a match fact at all. A tree with no data for the
    /// organization still evaluates (to `false`), but reporting layers render
    /// it as unknown rather than as a definite `0`.
    pub fn has_data(&self) -> bool {
        self.leaves.iter().any(|leaf| leaf.stored.is_some())
    }
}

/// Evaluate an expression tree for one organization against a match lookup.
///
/// A `proxy` leaf reads the effective match value, coercing a missing fact to
/// `false`. An `AND` is true iff every child is true; an `OR` iff at least
/// one is. Every child is evaluated, so the leaf audit trail is complete even
/// when the outcome is already decided.
///
/// Contribution follows the node values: a true `OR` contributes the union of
/// its true children's contributions, a true `AND` the union of all its
/// children's, and a false node contributes nothing.
pub fn evaluate(
    tree: &ExpressionNode,
    organization: OrganizationId,
    matches: &impl MatchLookup,
) -> Result<Evaluation, ExpressionError> {
    let mut leaves = Vec::new();
    let (value, contributing) = evaluate_node(tree, organization, matches, &mut leaves)?;

    Ok(Evaluation {
        value,
        contributing: contributing.into_iter().unique().collect(),
        leaves: leaves
            .into_iter()
            .unique_by(|leaf: &LeafOutcome| leaf.proxy)
            .collect(),
    })
}

fn evaluate_node(
    node: &ExpressionNode,
    organization: OrganizationId,
    matches: &impl MatchLookup,
    leaves: &mut Vec<LeafOutcome>,
) -> Result<(bool, Vec<ProxyId>), ExpressionError> {
    match node {
        ExpressionNode::Proxy { id } => {
            let stored = matches.effective(organization, *id);
            let value = stored.unwrap_or(false);
            leaves.push(LeafOutcome { proxy: *id, stored });
            Ok((value, if value { vec![*id] } else { Vec::new() }))
        }
        ExpressionNode::And { children } => {
            if children.is_empty() {
                return Err(ExpressionError::EmptyChildren);
            }
            let mut value = true;
            let mut contributing = Vec::new();
            for child in children {
                let (child_value, child_contributing) =
                    evaluate_node(child, organization, matches, leaves)?;
                value &= child_value;
                contributing.extend(child_contributing);
            }
            Ok((value, if value { contributing } else { Vec::new() }))
        }
        ExpressionNode::Or { children } => {
            if children.is_empty() {
                return Err(ExpressionError::EmptyChildren);
            }
            let mut value = false;
            let mut contributing = Vec::new();
            for child in children {
                let (child_value, child_contributing) =
                    evaluate_node(child, organization, matches, leaves)?;
                value |= child_value;
                contributing.extend(child_contributing);
            }
            Ok((value, contributing))
        }
    }
}

/// Memoizes evaluations per (condition key, organization) for the lifetime of
/// one batch, e.g. a truth-table export over many organizations.
///
/// Matches are re-read on the first evaluation of each pair within the batch,
/// so corrections applied between batches are always picked up; there is no
/// cross-batch cache to invalidate.
pub struct EvaluationBatch<'a, K, L> {
    matches: &'a L,
    memo: HashMap<(K, OrganizationId), Result<Evaluation, ExpressionError>>,
}

impl<'a, K, L> EvaluationBatch<'a, K, L>
where
    K: Clone + Eq + Hash,
    L: MatchLookup,
{
    pub fn new(matches: &'a L) -> Self {
        Self {
            matches,
            memo: HashMap::new(),
        }
    }

    /// Evaluate `tree` for `organization`, reusing the memoized outcome when
    /// the same (key, organization) pair was already evaluated in this batch.
    /// The key identifies the tree; callers use their condition identifier.
    pub fn evaluate(
        &mut self,
        key: K,
        tree: &ExpressionNode,
        organization: OrganizationId,
    ) -> Result<Evaluation, ExpressionError> {
        if let Some(memoized) = self.memo.get(&(key.clone(), organization)) {
            return memoized.clone();
        }

        let outcome = evaluate(tree, organization, self.matches);
        self.memo.insert((key, organization), outcome.clone());
        outcome
    }

    #[inline]
    pub fn evaluated_pairs(&self) -> usize {
        self.memo.len()
    }
}
