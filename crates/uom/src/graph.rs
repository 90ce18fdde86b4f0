//! Per-type conversion graph and bounded path search.
//!
//! Units are nodes; every traversable direction of a stored conversion is an
//! edge. Adjacency lists are built once per registry snapshot and pre-sorted,
//! so a search never has to break ties at query time:
//!
//! - between two adjacent units only the best edge is kept: an edge walked in
//!   its stored direction beats an inverse, and a later conversion (higher id)
//!   beats an earlier one;
//! - neighbours are ordered by lower-cased unit code, then id.
//!
//! Breadth-first search therefore returns a shortest path, and among shortest
//! paths the one whose intermediate codes sort first.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::model::{Conversion, ConversionId, Unit, UnitId};

/// One traversal step along a stored conversion.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Edge {
    pub conversion_id: ConversionId,
    pub from: UnitId,
    pub to: UnitId,
    /// `true` when walked source → target.
    pub forward: bool,
}

impl Edge {
    fn rank(&self) -> (bool, ConversionId) {
        (self.forward, self.conversion_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversionGraph {
    adjacency: BTreeMap<UnitId, Vec<Edge>>,
}

impl ConversionGraph {
    /// Build a graph from conversions whose endpoints are all in `units`.
    pub fn build<'a>(
        conversions: impl IntoIterator<Item = &'a Conversion>,
        units: &BTreeMap<UnitId, Unit>,
    ) -> Self {
        let mut best: BTreeMap<(UnitId, UnitId), Edge> = BTreeMap::new();

        let mut offer = |edge: Edge| {
            best.entry((edge.from, edge.to))
                .and_modify(|current| {
                    if edge.rank() > current.rank() {
                        *current = edge;
                    }
                })
                .or_insert(edge);
        };

        for c in conversions {
            if c.direction.allows_forward() {
                offer(Edge {
                    conversion_id: c.id,
                    from: c.source_unit_id,
                    to: c.target_unit_id,
                    forward: true,
                });
            }
            if c.direction.allows_backward() {
                offer(Edge {
                    conversion_id: c.id,
                    from: c.target_unit_id,
                    to: c.source_unit_id,
                    forward: false,
                });
            }
        }

        let mut adjacency: BTreeMap<UnitId, Vec<Edge>> = BTreeMap::new();
        for ((from, _), edge) in best {
            adjacency.entry(from).or_default().push(edge);
        }

        let sort_key = |id: UnitId| {
            let code = units.get(&id).map(|u| u.code.to_lowercase()).unwrap_or_default();
            (code, id)
        };
        for edges in adjacency.values_mut() {
            edges.sort_by_key(|e| sort_key(e.to));
        }

        Self { adjacency }
    }

    /// Outgoing edges of `unit`, in search order.
    pub fn neighbours(&self, unit: UnitId) -> &[Edge] {
        self.adjacency.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Shortest path of at most `max_hops` edges from `from` to `to`.
    ///
    /// Returns `Some(vec![])` when `from == to`. Visited units are never
    /// re-entered, so cyclic conversion data cannot make the search loop.
    pub fn find_path(&self, from: UnitId, to: UnitId, max_hops: usize) -> Option<Vec<Edge>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut visited: HashSet<UnitId> = HashSet::from([from]);
        let mut queue: VecDeque<(UnitId, Vec<Edge>)> = VecDeque::from([(from, Vec::new())]);

        while let Some((unit, path)) = queue.pop_front() {
            if path.len() >= max_hops {
                continue;
            }
            for edge in self.neighbours(unit) {
                if edge.to == to {
                    let mut found = path.clone();
                    found.push(*edge);
                    return Some(found);
                }
            }
            for edge in self.neighbours(unit) {
                if visited.insert(edge.to) {
                    let mut next = path.clone();
                    next.push(*edge);
                    queue.push_back((edge.to, next));
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, UnitTypeId};
    use rust_decimal::Decimal;

    fn unit(id: i64, code: &str) -> Unit {
        Unit {
            id: UnitId(id),
            code: code.to_string(),
            name: code.to_string(),
            type_id: UnitTypeId(1),
            symbol: None,
            is_base: false,
            metadata: None,
        }
    }

    fn conv(id: i64, source: i64, target: i64, direction: Direction) -> Conversion {
        Conversion {
            id: ConversionId(id),
            source_unit_id: UnitId(source),
            target_unit_id: UnitId(target),
            factor: Decimal::TWO,
            offset: Decimal::ZERO,
            direction,
            is_linear: true,
        }
    }

    fn units(codes: &[(i64, &str)]) -> BTreeMap<UnitId, Unit> {
        codes.iter().map(|(id, code)| (UnitId(*id), unit(*id, code))).collect()
    }

    #[test]
    fn one_way_edges_only_traverse_their_direction() {
        let units = units(&[(1, "A"), (2, "B")]);
        let to_target = [conv(1, 1, 2, Direction::ToTarget)];
        let graph = ConversionGraph::build(&to_target, &units);
        assert!(graph.find_path(UnitId(1), UnitId(2), 2).is_some());
        assert!(graph.find_path(UnitId(2), UnitId(1), 2).is_none());

        let from_target = [conv(1, 1, 2, Direction::FromTarget)];
        let graph = ConversionGraph::build(&from_target, &units);
        let path = graph.find_path(UnitId(2), UnitId(1), 2).unwrap();
        assert_eq!(path.len(), 1);
        assert!(!path[0].forward);
        assert!(graph.find_path(UnitId(1), UnitId(2), 2).is_none());
    }

    #[test]
    fn direct_edge_prefers_stored_direction_then_latest() {
        let units = units(&[(1, "A"), (2, "B")]);
        let conversions = [
            conv(1, 2, 1, Direction::Both),
            conv(2, 1, 2, Direction::Both),
            conv(3, 1, 2, Direction::Both),
        ];
        let graph = ConversionGraph::build(&conversions, &units);
        let path = graph.find_path(UnitId(1), UnitId(2), 2).unwrap();
        assert_eq!(path, vec![Edge {
            conversion_id: ConversionId(3),
            from: UnitId(1),
            to: UnitId(2),
            forward: true,
        }]);
    }

    #[test]
    fn two_hop_tie_break_picks_smallest_intermediate_code() {
        // A-Z-B and A-M-B both exist; M sorts first.
        let units = units(&[(1, "A"), (2, "B"), (3, "Z"), (4, "M")]);
        let conversions = [
            conv(1, 1, 3, Direction::Both),
            conv(2, 3, 2, Direction::Both),
            conv(3, 1, 4, Direction::Both),
            conv(4, 4, 2, Direction::Both),
        ];
        let graph = ConversionGraph::build(&conversions, &units);
        let path = graph.find_path(UnitId(1), UnitId(2), 2).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].to, UnitId(4));
    }

    #[test]
    fn cycles_terminate_without_a_path() {
        // A -> B -> C -> A, D disconnected.
        let units = units(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]);
        let conversions = [
            conv(1, 1, 2, Direction::ToTarget),
            conv(2, 2, 3, Direction::ToTarget),
            conv(3, 3, 1, Direction::ToTarget),
        ];
        let graph = ConversionGraph::build(&conversions, &units);
        assert!(graph.find_path(UnitId(1), UnitId(4), usize::MAX).is_none());
        assert_eq!(graph.find_path(UnitId(1), UnitId(3), 2).unwrap().len(), 2);
    }

    #[test]
    fn hop_limit_is_respected() {
        let units = units(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]);
        let conversions = [
            conv(1, 1, 2, Direction::Both),
            conv(2, 2, 3, Direction::Both),
            conv(3, 3, 4, Direction::Both),
        ];
        let graph = ConversionGraph::build(&conversions, &units);
        assert!(graph.find_path(UnitId(1), UnitId(4), 2).is_none());
        assert_eq!(graph.find_path(UnitId(1), UnitId(4), 3).unwrap().len(), 3);
    }
}
