//! Selection engine: click/ctrl-click selection, area (marquee) selection,
//! the synthetic multi-select group, and persistent group/ungroup.
//!
//! Selection lives in each node's `ui` flags. Every operation returns a new
//! tree with `is_ancestor_selected`/`show_outline` recomputed.

use crate::hit::nodes_within;
use crate::transform::{fit_group, refit_containers};
use dc_core::geometry::{Bounds, Point};
use dc_core::id::NodeId;
use dc_core::model::{
    Diagram, DiagramKind, Transform, ancestors_of, find_parent, get_by_id, map_recursive,
};
use dc_core::registry;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("grouping needs at least two selected items, found {0}")]
    NotEnoughSelected(usize),
    #[error("no selected group to ungroup")]
    NoGroupSelected,
    #[error("group kind is not registered")]
    GroupUnavailable,
}

fn selectable(d: &Diagram) -> bool {
    registry::capabilities(d.kind).selectable
}

fn set_selected(d: &Diagram, selected: bool) -> Diagram {
    let mut next = d.clone();
    next.ui.is_selected = selected;
    next
}

// ─── Queries ─────────────────────────────────────────────────────────────

/// Selected nodes in tree order, skipping anything inside a selected node.
pub fn selected_ids(items: &[Diagram]) -> Vec<NodeId> {
    fn visit(items: &[Diagram], out: &mut Vec<NodeId>) {
        for item in items {
            if item.ui.is_selected {
                out.push(item.id);
            } else {
                visit(item.children(), out);
            }
        }
    }
    let mut out = Vec::new();
    visit(items, &mut out);
    out
}

/// Recompute the ancestor/outline cues from the selection flags.
/// Under multi-select every selected node also shows its outline, since
/// the handles belong to the synthetic group.
pub fn refresh_outline_flags(items: &[Diagram]) -> Vec<Diagram> {
    fn visit(items: &[Diagram], ancestor_selected: bool, multi: bool) -> Vec<Diagram> {
        items
            .iter()
            .map(|item| {
                let mut next = item.clone();
                next.ui.is_ancestor_selected = ancestor_selected;
                next.ui.show_outline = ancestor_selected || (multi && item.ui.is_selected);
                next.items = item
                    .items
                    .as_ref()
                    .map(|c| visit(c, ancestor_selected || item.ui.is_selected, multi));
                next
            })
            .collect()
    }
    let multi = selected_ids(items).len() >= 2;
    visit(items, false, multi)
}

// ─── Click selection ─────────────────────────────────────────────────────

/// Select `id`. Without the multi-select modifier every other node is
/// deselected; with it, only `id` toggles.
pub fn select(items: &[Diagram], id: NodeId, multi: bool) -> Vec<Diagram> {
    match get_by_id(items, id) {
        Some(target) if selectable(target) => {}
        _ => {
            log::debug!("{id} is not selectable");
            return items.to_vec();
        }
    }
    let next = map_recursive(items, &mut |d| {
        if d.id == id {
            set_selected(d, if multi { !d.ui.is_selected } else { true })
        } else if multi {
            d.clone()
        } else {
            set_selected(d, false)
        }
    });
    refresh_outline_flags(&next)
}

pub fn clear_selection(items: &[Diagram]) -> Vec<Diagram> {
    let next = map_recursive(items, &mut |d| set_selected(d, false));
    refresh_outline_flags(&next)
}

/// Select every selectable top-level node.
pub fn select_all(items: &[Diagram]) -> Vec<Diagram> {
    let next: Vec<Diagram> = items
        .iter()
        .map(|item| {
            let mut top = set_selected(item, selectable(item));
            top.items = item
                .items
                .as_ref()
                .map(|c| map_recursive(c, &mut |d| set_selected(d, false)));
            top
        })
        .collect();
    refresh_outline_flags(&next)
}

// ─── Multi-select group ──────────────────────────────────────────────────

/// The synthetic group enclosing the current selection, or `None` when
/// fewer than two nodes are selected. Its members are copies; the tree
/// stays the source of truth.
pub fn build_multi_select_group(items: &[Diagram]) -> Option<Diagram> {
    let members: Vec<Diagram> = selected_ids(items)
        .into_iter()
        .filter_map(|id| get_by_id(items, id).cloned())
        .collect();
    if members.len() < 2 {
        return None;
    }
    let points: Vec<Point> = members.iter().flat_map(Diagram::outline_points).collect();
    let b = Bounds::enclosing(&points)?;
    let mut group = Diagram::new(NodeId::multi_select_group(), DiagramKind::Group, b.x, b.y);
    group.transform = Some(Transform::new(b.width, b.height));
    group.items = Some(members);
    group.ui.is_selected = true;
    Some(group)
}

// ─── Group / ungroup ─────────────────────────────────────────────────────

fn insert_group(items: &[Diagram], anchor: NodeId, members: &HashSet<NodeId>, group: &Diagram) -> Vec<Diagram> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if item.id == anchor {
            out.push(group.clone());
        }
        if members.contains(&item.id) {
            continue;
        }
        let mut next = item.clone();
        next.items = item
            .items
            .as_ref()
            .map(|c| insert_group(c, anchor, members, group));
        out.push(next);
    }
    out
}

pub(crate) fn drop_empty_groups(items: &[Diagram], candidates: &HashSet<NodeId>) -> Vec<Diagram> {
    items
        .iter()
        .filter(|d| !(candidates.contains(&d.id) && d.kind == DiagramKind::Group && d.children().is_empty()))
        .map(|d| {
            let mut next = d.clone();
            next.items = d.items.as_ref().map(|c| drop_empty_groups(c, candidates));
            next
        })
        .collect()
}

/// Turn the current multi-selection into a persistent group. The group goes
/// to the top level, just before the top-level item holding the first
/// selected node. Emptied containers are removed and every affected
/// container is refit.
pub fn group_selected(items: &[Diagram]) -> Result<Vec<Diagram>, SelectionError> {
    let ids = selected_ids(items);
    if ids.len() < 2 {
        return Err(SelectionError::NotEnoughSelected(ids.len()));
    }
    let members: HashSet<NodeId> = ids.iter().copied().collect();
    let former_parents: HashSet<NodeId> = ids
        .iter()
        .filter_map(|id| find_parent(items, *id).map(|p| p.id))
        .collect();

    let mut group = registry::create(DiagramKind::Group, 0.0, 0.0).ok_or(SelectionError::GroupUnavailable)?;
    group.items = Some(
        ids.iter()
            .filter_map(|id| get_by_id(items, *id))
            .map(|d| set_selected(d, false))
            .collect(),
    );
    let mut group = fit_group(&group);
    group.ui.is_selected = true;
    log::debug!("grouping {} items into {}", ids.len(), group.id);

    let anchor = ancestors_of(items, ids[0]).last().copied().unwrap_or(ids[0]);
    let tree = insert_group(items, anchor, &members, &group);
    let tree = drop_empty_groups(&tree, &former_parents);
    let containers: HashSet<NodeId> = former_parents
        .into_iter()
        .filter(|id| get_by_id(&tree, *id).is_some())
        .collect();
    Ok(refresh_outline_flags(&refit_containers(&tree, &containers)))
}

fn splice_out(items: &[Diagram], groups: &HashSet<NodeId>) -> Vec<Diagram> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if groups.contains(&item.id) {
            out.extend(item.children().iter().map(|c| set_selected(c, true)));
            continue;
        }
        let mut next = item.clone();
        next.items = item.items.as_ref().map(|c| splice_out(c, groups));
        out.push(next);
    }
    out
}

/// Dissolve every selected group into its parent at the group's position.
/// Children already hold absolute geometry, so they stay where they are;
/// they come out selected.
pub fn ungroup_selected(items: &[Diagram]) -> Result<Vec<Diagram>, SelectionError> {
    let groups: HashSet<NodeId> = selected_ids(items)
        .into_iter()
        .filter(|id| get_by_id(items, *id).is_some_and(|d| d.kind == DiagramKind::Group))
        .collect();
    if groups.is_empty() {
        return Err(SelectionError::NoGroupSelected);
    }
    let parents: HashSet<NodeId> = groups
        .iter()
        .filter_map(|id| find_parent(items, *id).map(|p| p.id))
        .collect();
    log::debug!("ungrouping {} groups", groups.len());

    let tree = splice_out(items, &groups);
    Ok(refresh_outline_flags(&refit_containers(&tree, &parents)))
}

// ─── Area selection ──────────────────────────────────────────────────────

/// Marquee drag in canvas coordinates. An `additive` marquee (ctrl held)
/// adds to the selection instead of replacing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaSelection {
    pub start: Point,
    pub end: Point,
    pub additive: bool,
}

impl AreaSelection {
    pub fn new(start: Point, additive: bool) -> Self {
        Self {
            start,
            end: start,
            additive,
        }
    }

    pub fn marquee(&self) -> Bounds {
        Bounds::from_corners(self.start, self.end)
    }
}

/// Outline every selectable node that lies fully inside `marquee`.
pub fn outline_contained(items: &[Diagram], marquee: &Bounds) -> Vec<Diagram> {
    let inside: HashSet<NodeId> = nodes_within(items, marquee).into_iter().collect();
    map_recursive(items, &mut |d| {
        let mut next = d.clone();
        next.ui.show_outline = selectable(d) && inside.contains(&d.id);
        next
    })
}

/// Drop the flag from anything nested under a selected node.
fn deselect_nested(items: &[Diagram], ancestor_selected: bool) -> Vec<Diagram> {
    items
        .iter()
        .map(|item| {
            let mut next = item.clone();
            if ancestor_selected {
                next.ui.is_selected = false;
            }
            let below = ancestor_selected || item.ui.is_selected;
            next.items = item.items.as_ref().map(|c| deselect_nested(c, below));
            next
        })
        .collect()
}

fn promote_groups(items: &[Diagram]) -> Vec<Diagram> {
    items
        .iter()
        .map(|item| {
            let mut next = item.clone();
            let Some(children) = item.items.as_ref() else {
                return next;
            };
            let children = promote_groups(children);
            let mut candidates = children.iter().filter(|c| selectable(c)).peekable();
            let all_selected = candidates.peek().is_some() && candidates.all(|c| c.ui.is_selected);
            if item.kind == DiagramKind::Group && all_selected {
                next.ui.is_selected = true;
                next.items = Some(children.iter().map(|c| set_selected(c, false)).collect());
            } else {
                next.items = Some(children);
            }
            next
        })
        .collect()
}

/// Release the marquee: outlined nodes become the selection (joining the
/// previous one when `area.additive`), then groups whose children all ended
/// up selected are selected in their place, innermost first.
pub fn finish_area_selection(items: &[Diagram], area: &AreaSelection) -> Vec<Diagram> {
    let marked = map_recursive(items, &mut |d| {
        let outlined = d.ui.show_outline && selectable(d);
        let mut next = set_selected(d, outlined || (area.additive && d.ui.is_selected));
        next.ui.show_outline = false;
        next
    });
    refresh_outline_flags(&deselect_nested(&promote_groups(&marked), false))
}
