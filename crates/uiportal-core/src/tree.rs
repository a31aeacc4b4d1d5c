//! Element snapshot model and tree serialization.
//!
//! The UI-accessibility provider hands the daemon a forest of live
//! [`ElementNode`]s on every query. [`serialize_forest`] converts that forest
//! into [`ElementSnapshot`]s: a pure, depth-first pre-order walk that
//! preserves child order exactly and assigns each node a stable overlay
//! index. Snapshots are created fresh per query and carry no identity across
//! calls.

use serde::{Deserialize, Serialize};

use crate::error::PortalError;
use crate::geometry::Rect;

/// Default bound on recursion depth for [`serialize_forest`].
///
/// Real device hierarchies rarely exceed a few dozen levels; the bound exists
/// to turn a misbehaving provider into a [`PortalError::tree_too_deep`]
/// instead of a stack overflow.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A node in the live UI tree, as delivered by the accessibility provider.
///
/// Consumed, not owned: the serializer reads it once per query and never
/// holds on to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(default)]
    pub resource_id: Option<String>,
    pub class_name: String,
    #[serde(default)]
    pub text: String,
    pub bounds: Rect,
    /// Index pre-assigned by the overlay registry when this element was last
    /// visualized. Absent for nodes that have never been drawn.
    #[serde(default)]
    pub overlay_index: Option<i32>,
    #[serde(default)]
    pub children: Vec<ElementNode>,
}

/// One serialized element, including its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub index: i32,
    /// Never null: a node with no identifier serializes as an empty string.
    pub resource_id: String,
    pub class_name: String,
    pub text: String,
    pub bounds: Rect,
    pub children: Vec<ElementSnapshot>,
}

/// The element currently holding input focus, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusedElement {
    pub text: String,
    pub class_name: String,
    pub resource_id: String,
}

/// Device and focus state, as delivered by the accessibility provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneState {
    #[serde(rename = "currentApp")]
    pub app_name: String,
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "keyboardVisible")]
    pub keyboard_visible: bool,
    #[serde(rename = "focusedElement", skip_serializing_if = "Option::is_none")]
    pub focused_element: Option<FocusedElement>,
}

/// Serialize a forest of element nodes, preserving traversal order.
///
/// Indices are assigned by a single counter shared across the whole forest,
/// in pre-order (parent before children, children in original order). A node
/// carrying a pre-assigned `overlay_index` keeps it, and the counter jumps
/// past it so later auto-assigned indices never collide with it.
///
/// Fails with [`PortalError::tree_too_deep`] if any path exceeds `max_depth`
/// levels; otherwise this never fails and never mutates its input.
pub fn serialize_forest(
    roots: &[ElementNode],
    max_depth: usize,
) -> Result<Vec<ElementSnapshot>, PortalError> {
    let mut counter = 0i32;
    roots
        .iter()
        .map(|root| serialize_node(root, 0, max_depth, &mut counter))
        .collect()
}

fn serialize_node(
    node: &ElementNode,
    depth: usize,
    max_depth: usize,
    counter: &mut i32,
) -> Result<ElementSnapshot, PortalError> {
    if depth >= max_depth {
        return Err(PortalError::tree_too_deep(max_depth));
    }

    let index = match node.overlay_index {
        Some(pre_assigned) => {
            *counter = (*counter).max(pre_assigned + 1);
            pre_assigned
        }
        None => {
            let index = *counter;
            *counter += 1;
            index
        }
    };

    let children = node
        .children
        .iter()
        .map(|child| serialize_node(child, depth + 1, max_depth, counter))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ElementSnapshot {
        index,
        resource_id: node.resource_id.clone().unwrap_or_default(),
        class_name: node.class_name.clone(),
        text: node.text.clone(),
        bounds: node.bounds,
        children,
    })
}

/// Walk serialized snapshots in pre-order, calling `visit(snapshot, depth)`
/// for each node. Used to feed the overlay registry in the same order the
/// serializer emitted indices.
pub fn visit_snapshots<F>(roots: &[ElementSnapshot], visit: &mut F)
where
    F: FnMut(&ElementSnapshot, usize),
{
    fn walk<F>(node: &ElementSnapshot, depth: usize, visit: &mut F)
    where
        F: FnMut(&ElementSnapshot, usize),
    {
        visit(node, depth);
        for child in &node.children {
            walk(child, depth + 1, visit);
        }
    }

    for root in roots {
        walk(root, 0, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn leaf(name: &str) -> ElementNode {
        ElementNode {
            resource_id: Some(format!("com.example:id/{}", name)),
            class_name: "android.widget.TextView".to_string(),
            text: name.to_string(),
            bounds: Rect::new(0, 0, 100, 40),
            overlay_index: None,
            children: Vec::new(),
        }
    }

    fn parent(name: &str, children: Vec<ElementNode>) -> ElementNode {
        ElementNode {
            children,
            ..leaf(name)
        }
    }

    fn collect_indices(snapshots: &[ElementSnapshot]) -> Vec<i32> {
        let mut indices = Vec::new();
        visit_snapshots(snapshots, &mut |snap, _| indices.push(snap.index));
        indices
    }

    #[test]
    fn preserves_child_order_and_count() {
        let forest = vec![parent(
            "root",
            vec![leaf("first"), leaf("second"), leaf("third")],
        )];
        let out = serialize_forest(&forest, DEFAULT_MAX_DEPTH).unwrap();

        assert_eq!(out.len(), 1);
        let texts: Vec<&str> = out[0].children.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[test]
    fn indices_follow_preorder_traversal() {
        let forest = vec![
            parent("a", vec![leaf("a1"), parent("a2", vec![leaf("a2x")])]),
            leaf("b"),
        ];
        let out = serialize_forest(&forest, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(collect_indices(&out), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn indices_are_unique_across_one_snapshot() {
        let forest = vec![parent(
            "root",
            (0..20).map(|i| leaf(&format!("n{}", i))).collect(),
        )];
        let out = serialize_forest(&forest, DEFAULT_MAX_DEPTH).unwrap();

        let mut indices = collect_indices(&out);
        let total = indices.len();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), total);
    }

    #[test]
    fn pre_assigned_overlay_index_is_kept() {
        let mut second = leaf("second");
        second.overlay_index = Some(7);
        let forest = vec![leaf("first"), second, leaf("third")];

        let out = serialize_forest(&forest, DEFAULT_MAX_DEPTH).unwrap();
        // Auto counter resumes past the explicit index, keeping uniqueness.
        assert_eq!(collect_indices(&out), [0, 7, 8]);
    }

    #[test]
    fn missing_resource_id_becomes_empty_string() {
        let mut node = leaf("anon");
        node.resource_id = None;
        let out = serialize_forest(&[node], DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(out[0].resource_id, "");

        let json = serde_json::to_string(&out[0]).unwrap();
        assert!(json.contains("\"resourceId\":\"\""));
        assert!(!json.contains("null"));
    }

    #[test]
    fn depth_bound_trips_tree_too_deep() {
        let mut node = leaf("bottom");
        for i in 0..10 {
            node = parent(&format!("level{}", i), vec![node]);
        }

        let err = serialize_forest(&[node.clone()], 5).unwrap_err();
        assert_eq!(err.code, ErrorCode::TreeTooDeep);

        // A generous bound accepts the same tree.
        assert!(serialize_forest(&[node], DEFAULT_MAX_DEPTH).is_ok());
    }

    #[test]
    fn snapshot_serializes_original_wire_keys() {
        let out = serialize_forest(&[leaf("ok")], DEFAULT_MAX_DEPTH).unwrap();
        let json = serde_json::to_string(&out[0]).unwrap();
        for key in ["\"index\"", "\"resourceId\"", "\"className\"", "\"text\"", "\"bounds\"", "\"children\""] {
            assert!(json.contains(key), "missing {} in {}", key, json);
        }
    }

    #[test]
    fn phone_state_serializes_original_wire_keys() {
        let state = PhoneState {
            app_name: "Settings".to_string(),
            package_name: "com.android.settings".to_string(),
            keyboard_visible: true,
            focused_element: Some(FocusedElement {
                text: "hello".to_string(),
                class_name: "android.widget.EditText".to_string(),
                resource_id: "com.android.settings:id/search".to_string(),
            }),
        };
        let json = serde_json::to_string(&state).unwrap();
        for key in ["\"currentApp\"", "\"packageName\"", "\"keyboardVisible\"", "\"focusedElement\""] {
            assert!(json.contains(key), "missing {} in {}", key, json);
        }
    }
}
