use crate::{catalog::ProxyId, error::ExpressionError};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The persisted representation of a logical condition.
///
/// Serializes to the nested-object form consumed by the rest of the system:
///
/// ```text
/// { "type": "proxy", "id": 1 }
/// { "type": "AND", "children": [ ... ] }
/// { "type": "OR",  "children": [ ... ] }
/// ```
///
/// Trees are built fresh by the parser or by [`ExpressionNode::and`] /
/// [`ExpressionNode::or`] and never mutated afterwards, so they are finite
/// and acyclic by construction. Child order is preserved across
/// serialization round-trips.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpressionNode {
    #[serde(rename = "proxy")]
    Proxy { id: ProxyId },
    #[serde(rename = "AND")]
    And { children: Vec<ExpressionNode> },
    #[serde(rename = "OR")]
    Or { children: Vec<ExpressionNode> },
}

impl ExpressionNode {
    #[inline]
    pub fn proxy(id: ProxyId) -> Self {
        Self::Proxy { id }
    }

    /// Build an AND node. Empty children are invalid and rejected here,
    /// not at evaluation time.
    pub fn and(children: Vec<ExpressionNode>) -> Result<Self, ExpressionError> {
        if children.is_empty() {
            return Err(ExpressionError::EmptyChildren);
        }
        Ok(Self::And { children })
    }

    /// Build an OR node. Empty children are invalid and rejected here.
    pub fn or(children: Vec<ExpressionNode>) -> Result<Self, ExpressionError> {
        if children.is_empty() {
            return Err(ExpressionError::EmptyChildren);
        }
        Ok(Self::Or { children })
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Proxy { .. } => 1,
            Self::And { children } | Self::Or { children } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Check the structural invariants: no empty AND/OR children anywhere,
    /// depth within the cap. Trees coming out of the parser already hold
    /// these; deserialized trees from pre-existing data may not.
    pub fn validate(&self, max_depth: usize) -> Result<(), ExpressionError> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(ExpressionError::DepthExceeded {
                depth,
                max: max_depth,
            });
        }
        self.check_children()
    }

    fn check_children(&self) -> Result<(), ExpressionError> {
        match self {
            Self::Proxy { .. } => Ok(()),
            Self::And { children } | Self::Or { children } => {
                if children.is_empty() {
                    return Err(ExpressionError::EmptyChildren);
                }
                children.iter().try_for_each(Self::check_children)
            }
        }
    }

    /// Collapse single-child AND/OR wrappers so that repeated wrapping can
    /// never accumulate depth. Same-operator nesting introduced by explicit
    /// parentheses is preserved. Normalization is idempotent.
    pub fn normalize(self) -> Self {
        match self {
            Self::Proxy { id } => Self::Proxy { id },
            Self::And { children } => Self::unwrap_single(
                children.into_iter().map(Self::normalize).collect(),
                |children| Self::And { children },
            ),
            Self::Or { children } => Self::unwrap_single(
                children.into_iter().map(Self::normalize).collect(),
                |children| Self::Or { children },
            ),
        }
    }

    fn unwrap_single(
        mut children: Vec<ExpressionNode>,
        rebuild: impl FnOnce(Vec<ExpressionNode>) -> ExpressionNode,
    ) -> ExpressionNode {
        if children.len() == 1 {
            children.swap_remove(0)
        } else {
            rebuild(children)
        }
    }

    /// The distinct proxy ids referenced by the tree, in first-seen order.
    pub fn proxy_ids(&self) -> Vec<ProxyId> {
        let mut ids = Vec::new();
        self.collect_proxy_ids(&mut ids);
        ids.into_iter().unique().collect()
    }

    fn collect_proxy_ids(&self, ids: &mut Vec<ProxyId>) {
        match self {
            Self::Proxy { id } => ids.push(*id),
            Self::And { children } | Self::Or { children } => {
                for child in children {
                    child.collect_proxy_ids(ids);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ast::{and, or, proxy};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn serialize_a_proxy_leaf_to_the_wire_form() {
        let tree = proxy!(1);

        let actual = serde_json::to_value(&tree).unwrap();

        assert_eq!(json!({"type": "proxy", "id": 1}), actual);
    }

    #[test]
    fn serialize_a_nested_tree_to_the_wire_form() {
        let tree = or!(proxy!(1), proxy!(2), and!(proxy!(3), proxy!(4)));

        let actual = serde_json::to_value(&tree).unwrap();

        assert_eq!(
            json!({
                "type": "OR",
                "children": [
                    {"type": "proxy", "id": 1},
                    {"type": "proxy", "id": 2},
                    {
                        "type": "AND",
                        "children": [
                            {"type": "proxy", "id": 3},
                            {"type": "proxy", "id": 4},
                        ],
                    },
                ],
            }),
            actual
        );
    }

    #[test]
    fn deserialize_the_wire_form() {
        let document = r#"{"type":"OR","children":[{"type":"proxy","id":1},{"type":"AND","children":[{"type":"proxy","id":2},{"type":"proxy","id":3}]}]}"#;

        let actual: ExpressionNode = serde_json::from_str(document).unwrap();

        assert_eq!(or!(proxy!(1), and!(proxy!(2), proxy!(3))), actual);
    }

    #[test]
    fn return_an_error_on_an_unrecognized_node_tag() {
        let document = r#"{"type":"NOT","children":[{"type":"proxy","id":1}]}"#;

        let actual = serde_json::from_str::<ExpressionNode>(document);

        assert!(actual.is_err());
    }

    #[test]
    fn return_an_error_when_building_an_and_without_children() {
        assert_eq!(
            Err(ExpressionError::EmptyChildren),
            ExpressionNode::and(vec![])
        );
    }

    #[test]
    fn return_an_error_when_building_an_or_without_children() {
        assert_eq!(
            Err(ExpressionError::EmptyChildren),
            ExpressionNode::or(vec![])
        );
    }

    #[test]
    fn can_compute_the_depth() {
        assert_eq!(1, proxy!(1).depth());
        assert_eq!(2, and!(proxy!(1), proxy!(2)).depth());
        assert_eq!(3, or!(proxy!(1), and!(proxy!(2), proxy!(3))).depth());
    }

    #[test]
    fn validate_accepts_a_well_formed_tree() {
        let tree = or!(proxy!(1), and!(proxy!(2), proxy!(3)));

        assert!(tree.validate(20).is_ok());
    }

    #[test]
    fn validate_rejects_a_tree_that_exceeds_the_depth_cap() {
        let mut tree = proxy!(1);
        for _ in 0..25 {
            tree = and!(tree, proxy!(1));
        }

        let actual = tree.validate(20);

        assert!(matches!(
            actual,
            Err(ExpressionError::DepthExceeded { max: 20, .. })
        ));
    }

    #[test]
    fn validate_rejects_nested_empty_children() {
        let tree = ExpressionNode::Or {
            children: vec![proxy!(1), ExpressionNode::And { children: vec![] }],
        };

        assert_eq!(Err(ExpressionError::EmptyChildren), tree.validate(20));
    }

    #[test]
    fn normalize_collapses_single_child_wrappers() {
        let tree = ExpressionNode::Or {
            children: vec![ExpressionNode::And {
                children: vec![proxy!(1)],
            }],
        };

        assert_eq!(proxy!(1), tree.normalize());
    }

    #[test]
    fn normalize_preserves_parenthesized_same_operator_nesting() {
        let tree = or!(or!(proxy!(1), proxy!(2)), proxy!(3));

        assert_eq!(or!(or!(proxy!(1), proxy!(2)), proxy!(3)), tree.normalize());
    }

    #[test]
    fn normalization_is_idempotent() {
        let tree = or!(proxy!(1), and!(proxy!(2), proxy!(3)));

        let once = tree.clone().normalize();
        let twice = once.clone().normalize();

        assert_eq!(once, twice);
    }

    #[test]
    fn proxy_ids_are_distinct_and_in_first_seen_order() {
        let tree = or!(proxy!(2), and!(proxy!(1), proxy!(2)), proxy!(3));

        assert_eq!(
            vec![ProxyId(2), ProxyId(1), ProxyId(3)],
            tree.proxy_ids()
        );
    }

    fn arbitrary_tree() -> impl Strategy<Value = ExpressionNode> {
        let leaf = (0u64..64).prop_map(|id| ExpressionNode::Proxy { id: ProxyId(id) });
        leaf.prop_recursive(4, 48, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 1..4)
                    .prop_map(|children| ExpressionNode::And { children }),
                proptest::collection::vec(inner, 1..4)
                    .prop_map(|children| ExpressionNode::Or { children }),
            ]
        })
    }

    proptest! {
        #[test]
        fn round_trip_through_json_for_any_valid_tree(tree in arbitrary_tree()) {
            let serialized = serde_json::to_string(&tree).unwrap();
            let deserialized: ExpressionNode = serde_json::from_str(&serialized).unwrap();
            prop_assert_eq!(tree, deserialized);
        }

        #[test]
        fn normalization_never_changes_the_evaluated_leaves(tree in arbitrary_tree()) {
            let normalized = tree.clone().normalize();
            prop_assert_eq!(tree.proxy_ids(), normalized.proxy_ids());
        }
    }
}
