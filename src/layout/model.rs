//! Component D — Layout Model (§4.D).
//!
//! The tagged-variant tree named in §3, lowered from [`crate::layout::grammar::ParseNode`],
//! plus the traversal/diff/UI-lowering helpers built on top of it. Grounded on
//! `original_source/terminatorlib/tmux/layout.py`'s `Pane`/`Vertical`/`Horizontal`
//! classes and its `get_all_panes`/`get_pane_parent`/`convert_to_terminator_layout`
//! functions — renamed to this crate's vocabulary (`Window`/`Notebook`/`VPaned`/
//! `HPaned`/`Terminal`, as in §4.D).

use std::collections::{BTreeMap, HashSet};

use crate::ids::PaneId;
use crate::layout::grammar::ParseNode;

/// The layout tree (§3: "Layout node (`Pane`/`Horizontal`/`Vertical`)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutNode {
    Pane {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        pane_id: PaneId,
    },
    Horizontal {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        children: Vec<LayoutNode>,
    },
    Vertical {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        children: Vec<LayoutNode>,
    },
}

impl LayoutNode {
    fn children(&self) -> &[LayoutNode] {
        match self {
            Self::Pane { .. } => &[],
            Self::Horizontal { children, .. } | Self::Vertical { children, .. } => children,
        }
    }

    fn pane_id(&self) -> Option<&PaneId> {
        match self {
            Self::Pane { pane_id, .. } => Some(pane_id),
            _ => None,
        }
    }
}

/// Lower a parsed tree into the [`LayoutNode`] tree. §4.D: "straightforward
/// mapping" — pane numeric ids become `%N`-formatted [`PaneId`]s.
pub fn from_parse_node(node: &ParseNode) -> LayoutNode {
    match node {
        ParseNode::Pane { width, height, x, y, pane_id } => LayoutNode::Pane {
            width: *width,
            height: *height,
            x: *x,
            y: *y,
            pane_id: PaneId::new(format!("%{pane_id}")),
        },
        ParseNode::Horizontal { width, height, x, y, children } => LayoutNode::Horizontal {
            width: *width,
            height: *height,
            x: *x,
            y: *y,
            children: children.iter().map(from_parse_node).collect(),
        },
        ParseNode::Vertical { width, height, x, y, children } => LayoutNode::Vertical {
            width: *width,
            height: *height,
            x: *x,
            y: *y,
            children: children.iter().map(from_parse_node).collect(),
        },
    }
}

/// Unordered set of every pane reachable from `tree`, hashed by pane_id (§4.D).
pub fn all_panes(tree: &LayoutNode) -> HashSet<PaneId> {
    let mut panes = HashSet::new();
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        match node.pane_id() {
            Some(pane_id) => {
                panes.insert(pane_id.clone());
            }
            None => stack.extend(node.children()),
        }
    }
    panes
}

/// The split node whose direct children include the pane with id `pane_id`,
/// or `None` if `pane_id` is the tree root or absent (§4.D).
pub fn parent_of<'a>(pane_id: &PaneId, tree: &'a LayoutNode) -> Option<&'a LayoutNode> {
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        if matches!(node, LayoutNode::Horizontal { .. } | LayoutNode::Vertical { .. }) {
            if node.children().iter().any(|child| child.pane_id() == Some(pane_id)) {
                return Some(node);
            }
            stack.extend(node.children());
        }
    }
    None
}

/// The index of the pane with id `pane_id` among `parent`'s children, if any.
pub fn index_of<'a>(pane_id: &PaneId, parent: &'a LayoutNode) -> Option<usize> {
    parent.children().iter().position(|child| child.pane_id() == Some(pane_id))
}

/// `(added, removed)` pane ids between two trees of the same window, compared
/// by pane_id (§4.D, §8 invariant 3 — diff minimality).
pub fn diff(old_tree: &LayoutNode, new_tree: &LayoutNode) -> (HashSet<PaneId>, HashSet<PaneId>) {
    let old_panes = all_panes(old_tree);
    let new_panes = all_panes(new_tree);
    let added = new_panes.difference(&old_panes).cloned().collect();
    let removed = old_panes.difference(&new_panes).cloned().collect();
    (added, removed)
}

/// One entry of the lowered UI layout map (§4.D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNode {
    Window {
        parent: String,
        tmux_size: Option<(u32, u32)>,
    },
    Notebook {
        parent: String,
    },
    VPaned {
        parent: String,
        order: u32,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    },
    HPaned {
        parent: String,
        order: u32,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    },
    Terminal {
        parent: String,
        order: u32,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        pane_id: PaneId,
    },
}

/// Lower one or more window layout trees to the host's widget-description
/// map (§4.D). Keys are generated names (`window0`, `notebook0`, `pane0`,
/// `pane1`, ..., `terminal<suffix>`) each carrying its parent's name.
///
/// When `windows.len() > 1` a `Notebook` is inserted directly under the
/// `Window`; when a split container has exactly one child, that child is
/// promoted in the child's place rather than wrapping it in an empty pane.
pub fn convert_to_ui_layout(
    windows: &[LayoutNode],
    total_cols: Option<u32>,
    total_rows: Option<u32>,
) -> BTreeMap<String, UiNode> {
    if windows.is_empty() {
        return BTreeMap::new();
    }

    let mut result = BTreeMap::new();
    let window_name = "window0".to_string();
    result.insert(
        window_name.clone(),
        UiNode::Window {
            parent: String::new(),
            tmux_size: match (total_cols, total_rows) {
                (Some(c), Some(r)) => Some((c, r)),
                _ => None,
            },
        },
    );

    let mut parent_name = window_name;
    if windows.len() > 1 {
        let notebook_name = "notebook0".to_string();
        result.insert(notebook_name.clone(), UiNode::Notebook { parent: parent_name });
        parent_name = notebook_name;
    }

    let mut pane_index = 0usize;
    let mut order = 0u32;
    for window in windows {
        convert_node(&mut result, &parent_name, window, &mut pane_index, &mut order);
    }
    result
}

fn convert_node(
    result: &mut BTreeMap<String, UiNode>,
    parent_name: &str,
    node: &LayoutNode,
    pane_index: &mut usize,
    order: &mut u32,
) {
    match node {
        LayoutNode::Pane { width, height, x, y, pane_id } => {
            let name = format!("terminal{}", pane_id.as_str().trim_start_matches('%'));
            result.insert(
                name,
                UiNode::Terminal {
                    parent: parent_name.to_string(),
                    order: *order,
                    width: *width,
                    height: *height,
                    x: *x,
                    y: *y,
                    pane_id: pane_id.clone(),
                },
            );
            *order += 1;
        }
        LayoutNode::Vertical { children, .. } => {
            convert_container(result, parent_name, node_geometry(node), children, true, pane_index, order);
        }
        LayoutNode::Horizontal { children, .. } => {
            convert_container(result, parent_name, node_geometry(node), children, false, pane_index, order);
        }
    }
}

fn node_geometry(node: &LayoutNode) -> (u32, u32, u32, u32) {
    match node {
        LayoutNode::Pane { width, height, x, y, .. }
        | LayoutNode::Horizontal { width, height, x, y, .. }
        | LayoutNode::Vertical { width, height, x, y, .. } => (*width, *height, *x, *y),
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_container(
    result: &mut BTreeMap<String, UiNode>,
    parent_name: &str,
    geometry: (u32, u32, u32, u32),
    children: &[LayoutNode],
    vertical: bool,
    pane_index: &mut usize,
    order: &mut u32,
) {
    if children.len() == 1 {
        convert_node(result, parent_name, &children[0], pane_index, order);
        return;
    }

    let (width, height, x, y) = geometry;
    let pane_name = format!("pane{pane_index}");
    *pane_index += 1;
    let this_order = *order;
    *order += 1;
    result.insert(
        pane_name.clone(),
        if vertical {
            UiNode::VPaned { parent: parent_name.to_string(), order: this_order, width, height, x, y }
        } else {
            UiNode::HPaned { parent: parent_name.to_string(), order: this_order, width, height, x, y }
        },
    );

    convert_node(result, &pane_name, &children[0], pane_index, order);
    convert_remaining(result, &pane_name, &children[1..], vertical, pane_index, order);
}

fn convert_remaining(
    result: &mut BTreeMap<String, UiNode>,
    parent_name: &str,
    remaining: &[LayoutNode],
    vertical: bool,
    pane_index: &mut usize,
    order: &mut u32,
) {
    match remaining.len() {
        0 => {}
        1 => convert_node(result, parent_name, &remaining[0], pane_index, order),
        _ => {
            // Geometry of a synthetic intermediate pane is irrelevant to hosts;
            // reuse the first remaining child's box as a stand-in, matching
            // the original's reliance on the widget toolkit to resize panes.
            let geometry = node_geometry(&remaining[0]);
            convert_container(result, parent_name, geometry, remaining, vertical, pane_index, order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::grammar;
    use pretty_assertions::assert_eq;

    fn tree_from(layout: &str) -> LayoutNode {
        let parsed = grammar::parse(layout).unwrap();
        from_parse_node(&parsed[0])
    }

    #[test]
    fn all_panes_collects_every_leaf() {
        let tree = tree_from(
            "13e1,124x26,0,0[124x6,0,0,1,124x6,0,7{62x6,0,7,5,61x6,63,7,6},124x12,0,14{62x12,0,14,3,61x12,63,14,4}]",
        );
        let panes = all_panes(&tree);
        let expected: HashSet<PaneId> = ["%1", "%5", "%6", "%3", "%4"]
            .into_iter()
            .map(PaneId::new)
            .collect();
        assert_eq!(panes, expected);
    }

    #[test]
    fn diff_is_empty_for_identical_trees() {
        let tree = tree_from("0000,80x24,0,0,3");
        let (added, removed) = diff(&tree, &tree);
        assert!(added.is_empty() && removed.is_empty());
    }

    #[test]
    fn diff_detects_single_split() {
        let old = tree_from("0000,80x24,0,0[40x24,0,0,1,39x24,41,0,2]");
        let new = tree_from("0000,80x24,0,0[40x24,0,0,1,39x24,41,0{19x24,41,0,2,19x24,61,0,7}]");
        let (added, removed) = diff(&old, &new);
        assert_eq!(added, HashSet::from([PaneId::new("%7")]));
        assert!(removed.is_empty());
    }

    #[test]
    fn diff_detects_single_close() {
        let old = tree_from("0000,80x24,0,0[40x24,0,0,1,39x24,41,0,2]");
        let new = tree_from("0000,80x24,0,0,1");
        let (added, removed) = diff(&old, &new);
        assert!(added.is_empty());
        assert_eq!(removed, HashSet::from([PaneId::new("%2")]));
    }

    #[test]
    fn parent_of_finds_enclosing_split() {
        let tree = tree_from("0000,80x24,0,0[40x24,0,0,1,39x24,41,0,2]");
        let parent = parent_of(&PaneId::new("%2"), &tree).unwrap();
        assert!(matches!(parent, LayoutNode::Vertical { .. }));
        assert_eq!(index_of(&PaneId::new("%2"), parent), Some(1));
    }

    #[test]
    fn convert_single_window_single_pane_has_no_notebook() {
        let tree = tree_from("0000,80x24,0,0,3");
        let ui = convert_to_ui_layout(&[tree], Some(80), Some(24));
        assert!(matches!(ui.get("window0"), Some(UiNode::Window { .. })));
        assert!(!ui.contains_key("notebook0"));
        assert!(matches!(ui.get("terminal3"), Some(UiNode::Terminal { .. })));
    }

    #[test]
    fn convert_multiple_windows_inserts_notebook() {
        let a = tree_from("0000,80x24,0,0,1");
        let b = tree_from("0000,80x24,0,0,2");
        let ui = convert_to_ui_layout(&[a, b], None, None);
        assert!(matches!(ui.get("notebook0"), Some(UiNode::Notebook { .. })));
        match ui.get("notebook0").unwrap() {
            UiNode::Notebook { parent } => assert_eq!(parent, "window0"),
            other => panic!("expected Notebook, got {other:?}"),
        }
    }

    #[test]
    fn convert_to_ui_layout_on_empty_input_returns_empty_map() {
        assert!(convert_to_ui_layout(&[], None, None).is_empty());
    }

    #[test]
    fn convert_promotes_single_child_container() {
        // A container with a single child is promoted in place rather than
        // wrapped in an empty split pane.
        let tree = tree_from("0000,80x24,0,0{80x24,0,0,9}");
        let ui = convert_to_ui_layout(&[tree], None, None);
        assert!(!ui.keys().any(|k| k.starts_with("pane")));
        match ui.get("terminal9").unwrap() {
            UiNode::Terminal { parent, .. } => assert_eq!(parent, "window0"),
            other => panic!("expected Terminal, got {other:?}"),
        }
    }
}
