//! Dimension Model ([C2]): elements, their parent/child hierarchy, and
//! the derived topology metrics the aggregation path depends on.

use crate::element::{Element, ElementKind};
use crate::error::{Error, Result};
use crate::key::ElementId;
use crate::weighted_set::WeightedSet;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::OnceLock;

/// A raw element as read off disk, before hierarchy resolution.
///
/// `database.rs` builds these from `[ELEMENTS DIMENSION <id>]` rows and
/// hands the whole batch to [`Dimension::build`].
#[derive(Debug, Clone)]
pub struct RawElement {
    pub id: ElementId,
    pub name: String,
    pub position: u32,
    pub kind: ElementKind,
    pub parents: Vec<ElementId>,
    pub children: Vec<(ElementId, f64)>,
}

#[derive(Debug, Clone)]
struct Topology {
    order: Vec<ElementId>,
    max_depth: u32,
}

/// An OLAP dimension: a named, hierarchical set of elements.
#[derive(Debug, Clone)]
pub struct Dimension {
    id: ElementId,
    name: String,
    elements: Vec<Element>,
    by_id: FxHashMap<ElementId, usize>,
    by_name: FxHashMap<String, usize>,
    by_position: FxHashMap<u32, usize>,
    children: FxHashMap<ElementId, Vec<(ElementId, f64)>>,
    parents: FxHashMap<ElementId, Vec<ElementId>>,
    roots: Vec<(ElementId, f64)>,
    topo: OnceLock<Topology>,
}

impl Dimension {
    /// Resolves a batch of raw elements into a dimension, computing
    /// topological order and per-element `level`/`depth`/`indent` eagerly.
    pub fn build(id: ElementId, name: impl Into<String>, raw: Vec<RawElement>) -> Result<Self> {
        let mut by_id = FxHashMap::default();
        let mut by_name = FxHashMap::default();
        let mut by_position = FxHashMap::default();
        let mut elements = Vec::with_capacity(raw.len());
        let mut children = FxHashMap::default();
        let mut parents = FxHashMap::default();

        for r in &raw {
            let idx = elements.len();
            by_id.insert(r.id, idx);
            by_name.insert(r.name.to_lowercase(), idx);
            by_position.insert(r.position, idx);
            elements.push(Element {
                id: r.id,
                name: r.name.clone(),
                position: r.position,
                kind: r.kind,
                level: 0,
                depth: 0,
                indent: 0,
            });
        }

        for r in &raw {
            let valid_children: Vec<(ElementId, f64)> = r
                .children
                .iter()
                .filter(|(cid, _)| {
                    let known = by_id.contains_key(cid);
                    if !known {
                        log::warn!("element {} references unknown child {cid}, skipping", r.id);
                    }
                    known
                })
                .copied()
                .collect();
            let valid_parents: Vec<ElementId> = r
                .parents
                .iter()
                .filter(|pid| {
                    let known = by_id.contains_key(pid);
                    if !known {
                        log::warn!("element {} references unknown parent {pid}, skipping", r.id);
                    }
                    known
                })
                .copied()
                .collect();
            children.insert(r.id, valid_children);
            parents.insert(r.id, valid_parents);
        }

        // A declared kind that contradicts the resolved child list is
        // corrected, not propagated: non-empty children force
        // `Consolidated`, an empty child list forces `Base`.
        for r in &raw {
            let idx = by_id[&r.id];
            let has_children = children.get(&r.id).is_some_and(|c| !c.is_empty());
            elements[idx].kind = if has_children {
                ElementKind::Consolidated
            } else {
                ElementKind::Base
            };
        }

        let roots: Vec<(ElementId, f64)> = raw
            .iter()
            .filter(|r| parents.get(&r.id).is_none_or(Vec::is_empty))
            .map(|r| (r.id, 1.0))
            .collect();

        let mut dim = Self {
            id,
            name: name.into(),
            elements,
            by_id,
            by_name,
            by_position,
            children,
            parents,
            roots,
            topo: OnceLock::new(),
        };

        dim.compute_topology()?;
        Ok(dim)
    }

    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// All elements ordered by their on-disk position.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn lookup_by_id(&self, id: ElementId) -> Option<&Element> {
        self.by_id.get(&id).map(|&idx| &self.elements[idx])
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Element> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&idx| &self.elements[idx])
    }

    pub fn lookup_by_position(&self, position: u32) -> Option<&Element> {
        self.by_position.get(&position).map(|&idx| &self.elements[idx])
    }

    /// Ordered `(child, edge-weight)` pairs. `parent == None` returns the
    /// dimension's roots (elements with no parents).
    pub fn children(&self, parent: Option<ElementId>) -> &[(ElementId, f64)] {
        match parent {
            None => &self.roots,
            Some(id) => self.children.get(&id).map_or(&[], Vec::as_slice),
        }
    }

    /// Ordered parent ids of `child`.
    pub fn parents(&self, child: ElementId) -> &[ElementId] {
        self.parents.get(&child).map_or(&[], Vec::as_slice)
    }

    /// Resolves an element to its weighted set of base descendants.
    ///
    /// A base element expands to the singleton `{self: 1.0}`. A
    /// consolidated element folds in each child's own expansion, scaled
    /// by that child's edge weight, and sums contributions sharing a base
    /// id. This subsumes the single-level case (a consolidated element
    /// whose children are all base: each child's expansion is its own
    /// singleton, so the edge weight passes through unscaled).
    pub fn expand_base(&self, id: ElementId) -> Result<WeightedSet> {
        let element = self
            .lookup_by_id(id)
            .ok_or_else(|| Error::Internal(format!("element {id} not found while expanding")))?;

        if element.is_base() {
            return Ok(WeightedSet::singleton(id));
        }

        let mut result = WeightedSet::new();
        for &(child_id, edge_weight) in self.children(Some(id)) {
            let child_expansion = self.expand_base(child_id)?;
            for (base_id, w) in child_expansion.iter() {
                if !self
                    .lookup_by_id(base_id)
                    .is_some_and(Element::is_base)
                {
                    return Err(Error::Internal(format!(
                        "consolidated element {base_id} in base expansion of {id}"
                    )));
                }
                result.fast_add(base_id, edge_weight * w);
            }
        }
        result.consolidate();
        Ok(result)
    }

    /// Deque of elements where every parent precedes every child.
    pub fn topo_order(&self) -> &[ElementId] {
        &self.topo.get().expect("computed in build").order
    }

    pub fn max_depth(&self) -> u32 {
        self.topo.get().expect("computed in build").max_depth
    }

    /// Kahn's algorithm over the parent/child graph, cycle-checked; then
    /// a reverse pass (leaves up) computes `level`, followed by a forward
    /// pass (roots down) computing `depth` and `indent`.
    fn compute_topology(&mut self) -> Result<()> {
        let mut indegree: FxHashMap<ElementId, usize> = FxHashMap::default();
        for e in &self.elements {
            indegree.insert(e.id, self.parents(e.id).len());
        }

        let mut queue: VecDeque<ElementId> = indegree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.elements.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &(child_id, _) in self.children(Some(id)) {
                let deg = indegree.get_mut(&child_id).expect("known element");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(child_id);
                }
            }
        }

        if order.len() != self.elements.len() {
            return Err(Error::Internal(format!(
                "dimension {} contains a cyclic hierarchy",
                self.name
            )));
        }

        let mut level: FxHashMap<ElementId, u32> = FxHashMap::default();
        for &id in order.iter().rev() {
            let lvl = self
                .children(Some(id))
                .iter()
                .map(|&(cid, _)| level.get(&cid).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            level.insert(id, lvl);
        }

        let mut depth: FxHashMap<ElementId, u32> = FxHashMap::default();
        let mut indent: FxHashMap<ElementId, u32> = FxHashMap::default();
        let mut max_depth = 0u32;
        for &id in &order {
            let d = self
                .parents(id)
                .iter()
                .map(|pid| depth.get(pid).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
            max_depth = max_depth.max(d);

            let ind = self
                .parents(id)
                .iter()
                .map(|pid| indent.get(pid).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            indent.insert(id, ind);
        }

        for e in &mut self.elements {
            e.level = level.get(&e.id).copied().unwrap_or(0);
            e.depth = depth.get(&e.id).copied().unwrap_or(0);
            e.indent = indent.get(&e.id).copied().unwrap_or(0);
        }

        self.topo
            .set(Topology { order, max_depth })
            .map_err(|_| Error::Internal("topology computed twice".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn base(id: ElementId, name: &str, pos: u32, parents: Vec<ElementId>) -> RawElement {
        RawElement {
            id,
            name: name.to_owned(),
            position: pos,
            kind: ElementKind::Base,
            parents,
            children: vec![],
        }
    }

    fn consolidated(
        id: ElementId,
        name: &str,
        pos: u32,
        parents: Vec<ElementId>,
        children: Vec<(ElementId, f64)>,
    ) -> RawElement {
        RawElement {
            id,
            name: name.to_owned(),
            position: pos,
            kind: ElementKind::Consolidated,
            parents,
            children,
        }
    }

    /// b0, b1, c0(-> b0:1.0, b1:2.0) — matches the worked example's `x` dimension shape.
    fn two_level() -> Dimension {
        let raw = vec![
            base(0, "b0", 0, vec![2]),
            base(1, "b1", 1, vec![2]),
            consolidated(2, "c0", 2, vec![], vec![(0, 1.0), (1, 2.0)]),
        ];
        Dimension::build(1, "x", raw).unwrap()
    }

    #[test]
    fn lookup_by_id_name_and_position() {
        let dim = two_level();
        assert_eq!(dim.lookup_by_id(0).unwrap().name, "b0");
        assert_eq!(dim.lookup_by_name("B0").unwrap().id, 0);
        assert_eq!(dim.lookup_by_position(2).unwrap().id, 2);
        assert!(dim.lookup_by_id(99).is_none());
    }

    #[test]
    fn declared_kind_contradicting_children_is_reconciled() {
        // c0 is declared Base but carries children: the child list wins.
        // b0 is declared Consolidated but carries none: also corrected.
        let raw = vec![
            RawElement {
                id: 0,
                name: "b0".into(),
                position: 0,
                kind: ElementKind::Consolidated,
                parents: vec![],
                children: vec![],
            },
            RawElement {
                id: 1,
                name: "b1".into(),
                position: 1,
                kind: ElementKind::Base,
                parents: vec![2],
                children: vec![],
            },
            RawElement {
                id: 2,
                name: "c0".into(),
                position: 2,
                kind: ElementKind::Base,
                parents: vec![],
                children: vec![(1, 1.0)],
            },
        ];
        let dim = Dimension::build(1, "x", raw).unwrap();

        assert_eq!(dim.lookup_by_id(0).unwrap().kind, ElementKind::Base);
        assert_eq!(dim.lookup_by_id(2).unwrap().kind, ElementKind::Consolidated);
        assert_eq!(dim.expand_base(2).unwrap().iter().collect::<Vec<_>>(), vec![(1, 1.0)]);
    }

    #[test]
    fn children_of_none_returns_roots() {
        let dim = two_level();
        assert_eq!(dim.children(None), &[(2, 1.0)]);
        assert_eq!(dim.children(Some(2)), &[(0, 1.0), (1, 2.0)]);
    }

    #[test]
    fn expand_base_of_base_element_is_singleton() {
        let dim = two_level();
        let set = dim.expand_base(0).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 1.0)]);
    }

    #[test]
    fn expand_base_of_level_one_consolidated_uses_edge_weights() {
        let dim = two_level();
        let set = dim.expand_base(2).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 1.0), (1, 2.0)]);
    }

    #[test]
    fn expand_base_scales_recursively_through_multiple_levels() {
        // top(-> c0: 3.0), c0(-> b0: 1.0, b1: 2.0)
        let raw = vec![
            base(0, "b0", 0, vec![2]),
            base(1, "b1", 1, vec![2]),
            consolidated(2, "c0", 2, vec![3], vec![(0, 1.0), (1, 2.0)]),
            consolidated(3, "top", 3, vec![], vec![(2, 3.0)]),
        ];
        let dim = Dimension::build(1, "x", raw).unwrap();
        let set = dim.expand_base(3).unwrap();
        // b0: 3.0 * 1.0 = 3.0, b1: 3.0 * 2.0 = 6.0
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 3.0), (1, 6.0)]);
    }

    #[test]
    fn expand_base_sums_shared_descendants_across_multiple_paths() {
        // top has two children that both roll up to b0, with different weights.
        let raw = vec![
            base(0, "b0", 0, vec![1, 2]),
            consolidated(1, "left", 1, vec![3], vec![(0, 2.0)]),
            consolidated(2, "right", 2, vec![3], vec![(0, 5.0)]),
            consolidated(3, "top", 3, vec![], vec![(1, 1.0), (2, 1.0)]),
        ];
        let dim = Dimension::build(1, "x", raw).unwrap();
        let set = dim.expand_base(3).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(0, 7.0)]);
    }

    #[test]
    fn cyclic_hierarchy_is_an_internal_error() {
        let raw = vec![
            consolidated(0, "a", 0, vec![1], vec![(1, 1.0)]),
            consolidated(1, "b", 1, vec![0], vec![(0, 1.0)]),
        ];
        let err = Dimension::build(1, "x", raw).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn topo_order_respects_parent_before_child() {
        let dim = two_level();
        let order = dim.topo_order();
        let pos_of = |id: ElementId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos_of(2) < pos_of(0));
        assert!(pos_of(2) < pos_of(1));
    }

    #[test]
    fn level_depth_and_max_depth_are_derived_correctly() {
        let dim = two_level();
        assert_eq!(dim.lookup_by_id(0).unwrap().level, 0);
        assert_eq!(dim.lookup_by_id(2).unwrap().level, 1);
        assert_eq!(dim.lookup_by_id(2).unwrap().depth, 0);
        assert_eq!(dim.lookup_by_id(0).unwrap().depth, 1);
        assert_eq!(dim.max_depth(), 1);
    }

    #[test]
    fn unknown_parent_and_child_references_are_silently_dropped() {
        let raw = vec![base(0, "b0", 0, vec![999])];
        let dim = Dimension::build(1, "x", raw).unwrap();
        assert_eq!(dim.parents(0), &[] as &[ElementId]);
        assert_eq!(dim.children(None), &[(0, 1.0)]);
    }
}
