//! Join graph resolution.
//!
//! Relations are nodes and every declared join is one undirected edge, so a
//! join can be walked from either side. Resolution runs a breadth-first
//! search from the root relation and keeps the union of the shortest paths
//! to every required relation. Neighbours are expanded in join declaration
//! order, which makes the chosen plan stable for an unchanged model.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::error::{EntityKind, Result, SemgraphError};
use crate::model::{Cardinality, Join, JoinTerm, Relation};

/// Whether a step walks its join from left to right or backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// How ties between equally short paths are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    /// Prefer the path through the earliest declared join.
    #[default]
    TieBreak,
    /// Report more than one shortest path as an error.
    Strict,
}

/// One hop of a join plan.
#[derive(Debug, Clone)]
pub struct JoinStep<'m> {
    pub from_relation: String,
    pub to_relation: String,
    pub join: &'m Join,
    pub direction: Direction,
}

impl JoinStep<'_> {
    /// Cardinality from `from_relation` to `to_relation`.
    pub fn cardinality(&self) -> Cardinality {
        match self.direction {
            Direction::Forward => self.join.cardinality,
            Direction::Reverse => self.join.cardinality.reversed(),
        }
    }

    /// Join term with `from_relation` on the left-hand side.
    pub fn join_term(&self) -> JoinTerm {
        match self.direction {
            Direction::Forward => self.join.join_term,
            Direction::Reverse => self.join.join_term.flipped(),
        }
    }
}

/// Root relation plus the ordered joins that connect the required relations.
#[derive(Debug, Clone)]
pub struct JoinPlan<'m> {
    pub root: String,
    pub steps: Vec<JoinStep<'m>>,
}

impl JoinPlan<'_> {
    /// Root first, then every joined relation in step order.
    pub fn relations(&self) -> Vec<&str> {
        std::iter::once(self.root.as_str())
            .chain(self.steps.iter().map(|s| s.to_relation.as_str()))
            .collect()
    }

    /// Whether every edge in the plan preserves row counts on both sides.
    pub fn all_one_to_one(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.join.cardinality == Cardinality::OneToOne)
    }

    /// Whether walking the plan from the root can repeat rows.
    pub fn has_fanout(&self) -> bool {
        self.steps.iter().any(|s| s.cardinality().fans_out())
    }

    /// Relations whose rows repeat root rows, keyed to the index of the first
    /// fan-out step on their path from the root.
    pub fn fanout_branches(&self) -> HashMap<&str, usize> {
        let mut branches: HashMap<&str, usize> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            let head = match branches.get(step.from_relation.as_str()) {
                Some(head) => Some(*head),
                None => step.cardinality().fans_out().then_some(index),
            };
            if let Some(head) = head {
                branches.insert(step.to_relation.as_str(), head);
            }
        }
        branches
    }
}

struct Search {
    parent: HashMap<NodeIndex, (NodeIndex, usize)>,
    distance: HashMap<NodeIndex, usize>,
    paths: HashMap<NodeIndex, usize>,
    order: Vec<NodeIndex>,
}

#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    graph: UnGraph<String, usize>,
    nodes: HashMap<String, NodeIndex>,
}

impl JoinGraph {
    /// Build the graph; joins are expected to reference known relations.
    pub fn build(relations: &[Relation], joins: &[Join]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes = HashMap::new();
        for relation in relations {
            let idx = graph.add_node(relation.key.clone());
            nodes.insert(relation.key.clone(), idx);
        }
        for (position, join) in joins.iter().enumerate() {
            if let (Some(left), Some(right)) = (
                nodes.get(&join.left_relation_key),
                nodes.get(&join.right_relation_key),
            ) {
                graph.add_edge(*left, *right, position);
            }
        }
        Self { graph, nodes }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn node(&self, relation_key: &str) -> Result<NodeIndex> {
        self.nodes
            .get(relation_key)
            .copied()
            .ok_or_else(|| SemgraphError::unknown(EntityKind::Relation, relation_key))
    }

    /// Incident edges as (join position, neighbour), earliest join first.
    fn neighbours(&self, node: NodeIndex) -> Vec<(usize, NodeIndex)> {
        let mut out: Vec<(usize, NodeIndex)> = self
            .graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                (*edge.weight(), other)
            })
            .collect();
        out.sort_by_key(|(position, other)| (*position, other.index()));
        out
    }

    fn search(&self, root: NodeIndex) -> Search {
        let mut search = Search {
            parent: HashMap::new(),
            distance: HashMap::from([(root, 0)]),
            paths: HashMap::from([(root, 1)]),
            order: vec![root],
        };
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            let depth = search.distance[&current];
            let current_paths = search.paths[&current];
            for (position, next) in self.neighbours(current) {
                match search.distance.get(&next).copied() {
                    None => {
                        search.distance.insert(next, depth + 1);
                        search.paths.insert(next, current_paths);
                        search.parent.insert(next, (current, position));
                        search.order.push(next);
                        queue.push_back(next);
                    }
                    Some(d) if d == depth + 1 => {
                        let count = search.paths.entry(next).or_insert(0);
                        *count = count.saturating_add(current_paths);
                    }
                    Some(_) => {}
                }
            }
        }
        search
    }

    /// Number of distinct shortest paths between two relations (0 when disconnected).
    pub fn shortest_path_count(&self, from: &str, to: &str) -> Result<usize> {
        let from = self.node(from)?;
        let to = self.node(to)?;
        Ok(self.search(from).paths.get(&to).copied().unwrap_or(0))
    }

    /// Connect `required` (root first) with the fewest joins.
    pub fn resolve<'m>(
        &self,
        joins: &'m [Join],
        required: &[&str],
        mode: PathMode,
    ) -> Result<JoinPlan<'m>> {
        let mut seen = HashSet::new();
        let required: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| seen.insert(*key))
            .collect();
        let Some(root_key) = required.first().copied() else {
            return Err(SemgraphError::InvalidRequest(
                "join resolution needs at least one relation".to_string(),
            ));
        };

        let root = self.node(root_key)?;
        let targets = required
            .iter()
            .map(|key| self.node(key).map(|idx| (*key, idx)))
            .collect::<Result<Vec<_>>>()?;

        let search = self.search(root);

        let disconnected: Vec<&str> = targets
            .iter()
            .filter(|(_, idx)| !search.distance.contains_key(idx))
            .map(|(key, _)| *key)
            .collect();
        if !disconnected.is_empty() {
            let mut relations = vec![root_key.to_string()];
            relations.extend(disconnected.iter().map(|k| k.to_string()));
            return Err(SemgraphError::NoJoinPath { relations });
        }

        if mode == PathMode::Strict {
            for (key, idx) in &targets {
                let paths = search.paths.get(idx).copied().unwrap_or(0);
                if paths > 1 {
                    return Err(SemgraphError::AmbiguousJoinPath {
                        root: root_key.to_string(),
                        relation: key.to_string(),
                        paths,
                    });
                }
            }
        }

        let mut needed: HashSet<NodeIndex> = HashSet::new();
        for (_, idx) in &targets {
            let mut current = *idx;
            while let Some((parent, _)) = search.parent.get(&current) {
                if !needed.insert(current) {
                    break;
                }
                current = *parent;
            }
        }

        let mut steps = Vec::with_capacity(needed.len());
        for node in &search.order {
            if !needed.contains(node) {
                continue;
            }
            let Some((parent, position)) = search.parent.get(node) else {
                continue;
            };
            let join = &joins[*position];
            let from_relation = self.graph[*parent].clone();
            let direction = if join.left_relation_key == from_relation {
                Direction::Forward
            } else {
                Direction::Reverse
            };
            steps.push(JoinStep {
                from_relation,
                to_relation: self.graph[*node].clone(),
                join,
                direction,
            });
        }

        let plan = JoinPlan {
            root: root_key.to_string(),
            steps,
        };
        tracing::debug!(
            root = %plan.root,
            relations = ?plan.relations(),
            "resolved join plan"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JoinTerm;

    fn rel(name: &str) -> Relation {
        Relation::table("", name, &[])
    }

    fn join(key: &str, left: &str, right: &str, cardinality: Cardinality) -> Join {
        Join::new(
            key,
            left,
            right,
            format!("{left}.id = {right}.id"),
            cardinality,
            JoinTerm::Left,
        )
    }

    #[test]
    fn reverse_steps_flip_cardinality_and_term() {
        let relations = vec![rel("orders"), rel("customers")];
        let joins = vec![join("oc", "orders", "customers", Cardinality::ManyToOne)];
        let graph = JoinGraph::build(&relations, &joins);

        let plan = graph
            .resolve(&joins, &["customers", "orders"], PathMode::TieBreak)
            .unwrap();
        assert_eq!(plan.root, "customers");
        let step = &plan.steps[0];
        assert_eq!(step.direction, Direction::Reverse);
        assert_eq!(step.cardinality(), Cardinality::OneToMany);
        assert_eq!(step.join_term(), JoinTerm::Right);
        assert!(plan.has_fanout());
        assert!(!plan.all_one_to_one());
    }

    #[test]
    fn intermediate_relation_is_a_pass_through_hop() {
        let relations = vec![rel("orders"), rel("customers"), rel("regions")];
        let joins = vec![
            join("oc", "orders", "customers", Cardinality::ManyToOne),
            join("cr", "customers", "regions", Cardinality::ManyToOne),
        ];
        let graph = JoinGraph::build(&relations, &joins);
        let plan = graph
            .resolve(&joins, &["orders", "regions"], PathMode::TieBreak)
            .unwrap();
        assert_eq!(plan.relations(), vec!["orders", "customers", "regions"]);
    }

    #[test]
    fn fanout_branches_follow_the_first_one_to_many_step() {
        let relations = vec![rel("customers"), rel("regions"), rel("orders"), rel("refunds")];
        let joins = vec![
            join("oc", "orders", "customers", Cardinality::ManyToOne),
            join("cr", "customers", "regions", Cardinality::ManyToOne),
            join("ro", "refunds", "orders", Cardinality::ManyToOne),
        ];
        let graph = JoinGraph::build(&relations, &joins);
        let plan = graph
            .resolve(&joins, &["customers", "regions", "refunds"], PathMode::TieBreak)
            .unwrap();
        assert_eq!(plan.relations(), vec!["customers", "orders", "regions", "refunds"]);

        let branches = plan.fanout_branches();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches["orders"], 0);
        // refunds -> orders is many-to-one, but orders already repeats customers.
        assert_eq!(branches["refunds"], 0);
        assert!(!branches.contains_key("regions"));
    }

    #[test]
    fn diamond_counts_two_shortest_paths() {
        let relations = vec![rel("a"), rel("b"), rel("c"), rel("d")];
        let joins = vec![
            join("ab", "a", "b", Cardinality::OneToOne),
            join("ac", "a", "c", Cardinality::OneToOne),
            join("bd", "b", "d", Cardinality::OneToOne),
            join("cd", "c", "d", Cardinality::OneToOne),
        ];
        let graph = JoinGraph::build(&relations, &joins);
        assert_eq!(graph.shortest_path_count("a", "d").unwrap(), 2);

        let plan = graph
            .resolve(&joins, &["a", "d"], PathMode::TieBreak)
            .unwrap();
        assert_eq!(plan.relations(), vec!["a", "b", "d"]);

        let err = graph
            .resolve(&joins, &["a", "d"], PathMode::Strict)
            .unwrap_err();
        assert!(matches!(err, SemgraphError::AmbiguousJoinPath { paths: 2, .. }));
    }

    #[test]
    fn disconnected_relations_are_named() {
        let relations = vec![rel("orders"), rel("inventory")];
        let graph = JoinGraph::build(&relations, &[]);
        match graph.resolve(&[], &["orders", "inventory"], PathMode::TieBreak) {
            Err(SemgraphError::NoJoinPath { relations }) => {
                assert_eq!(relations, vec!["orders", "inventory"]);
            }
            other => panic!("expected NoJoinPath, got {other:?}"),
        }
    }
}
