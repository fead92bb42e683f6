//! Dependency tracking for formula calculation
//!
//! Edges run from what a formula reads to the formula cell. A range reference
//! is one edge from a shared aggregate range node, whatever the size of the
//! range. Membership is geometric: a changed cell finds the range nodes that
//! cover it through a per-sheet column index.

use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellKey, CellRange};

/// Something a formula cell reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Precedent {
    Cell(CellKey),
    Range { sheet: usize, range: CellRange },
    /// A defined name, tracked so the cell can be re-registered when the
    /// name changes. The name's target is registered separately.
    Name(String),
}

impl Precedent {
    /// Range precedent; a single-cell range becomes a cell precedent
    pub fn range(sheet: usize, range: CellRange) -> Self {
        let range = range.relative();
        if range.is_single_cell() {
            Precedent::Cell(CellKey::from_address(sheet, range.start))
        } else {
            Precedent::Range { sheet, range }
        }
    }

    pub fn name(name: &str) -> Self {
        Precedent::Name(name.to_lowercase())
    }
}

/// Handle of an aggregate range node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeId(usize);

/// A graph node with outgoing edges to formula cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Cell(CellKey),
    Range(RangeId),
}

#[derive(Debug)]
struct RangeNode {
    sheet: usize,
    range: CellRange,
    /// Formulas referencing exactly this range
    refcount: usize,
}

/// One step of a recalculation schedule
///
/// Nothing in a level depends on anything else in the same level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    /// Acyclic formula cells, sorted
    pub cells: Vec<CellKey>,
    /// Strongly connected components, each sorted
    pub cycles: Vec<Vec<CellKey>>,
}

/// Evaluation order for a set of changed cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub levels: Vec<Level>,
    /// Every cyclic component in the schedule
    pub cycles: Vec<Vec<CellKey>>,
}

impl Schedule {
    /// Number of formula cells scheduled
    pub fn len(&self) -> usize {
        self.levels
            .iter()
            .map(|level| level.cells.len() + level.cycles.iter().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Every scheduled cell in evaluation order
    pub fn cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.levels
            .iter()
            .flat_map(|level| level.cells.iter().chain(level.cycles.iter().flatten()).copied())
    }
}

/// Dependency graph for formula cells
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Formula cell → what it reads
    precedents: AHashMap<CellKey, AHashSet<Precedent>>,
    /// Node → formula cells that read it
    dependents: AHashMap<Node, AHashSet<CellKey>>,
    /// Lowercased name → formula cells that use it
    names: AHashMap<String, AHashSet<CellKey>>,
    ranges: Vec<Option<RangeNode>>,
    free_ranges: Vec<usize>,
    range_ids: AHashMap<(usize, CellRange), RangeId>,
    /// (sheet, column) → range nodes covering that column
    column_index: AHashMap<(usize, u16), AHashSet<RangeId>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the precedents of a formula cell
    ///
    /// Only the symmetric difference between the old and the new set is
    /// touched. A formula without references is still recorded.
    pub fn register_or_update(&mut self, cell: CellKey, precedents: &[Precedent]) {
        let new: AHashSet<Precedent> = precedents.iter().cloned().collect();
        let old = self.precedents.remove(&cell).unwrap_or_default();

        for precedent in old.difference(&new) {
            self.detach(cell, precedent);
        }
        for precedent in new.difference(&old) {
            self.attach(cell, precedent);
        }

        self.precedents.insert(cell, new);
    }

    /// Forget a formula cell's precedents, e.g. when it becomes a literal
    ///
    /// Edges from the cell to its own dependents stay.
    pub fn remove(&mut self, cell: CellKey) {
        if let Some(old) = self.precedents.remove(&cell) {
            for precedent in &old {
                self.detach(cell, precedent);
            }
        }
    }

    fn attach(&mut self, cell: CellKey, precedent: &Precedent) {
        match precedent {
            Precedent::Cell(key) => {
                self.dependents.entry(Node::Cell(*key)).or_default().insert(cell);
            }
            Precedent::Range { sheet, range } => {
                let id = self.acquire_range(*sheet, *range);
                self.dependents.entry(Node::Range(id)).or_default().insert(cell);
            }
            Precedent::Name(name) => {
                self.names.entry(name.clone()).or_default().insert(cell);
            }
        }
    }

    fn detach(&mut self, cell: CellKey, precedent: &Precedent) {
        match precedent {
            Precedent::Cell(key) => self.unlink(Node::Cell(*key), cell),
            Precedent::Range { sheet, range } => {
                if let Some(&id) = self.range_ids.get(&(*sheet, *range)) {
                    self.unlink(Node::Range(id), cell);
                    self.release_range(id);
                }
            }
            Precedent::Name(name) => {
                if let Some(cells) = self.names.get_mut(name) {
                    cells.remove(&cell);
                    if cells.is_empty() {
                        self.names.remove(name);
                    }
                }
            }
        }
    }

    fn unlink(&mut self, node: Node, cell: CellKey) {
        if let Some(cells) = self.dependents.get_mut(&node) {
            cells.remove(&cell);
            if cells.is_empty() {
                self.dependents.remove(&node);
            }
        }
    }

    fn acquire_range(&mut self, sheet: usize, range: CellRange) -> RangeId {
        if let Some(&id) = self.range_ids.get(&(sheet, range)) {
            if let Some(node) = self.ranges[id.0].as_mut() {
                node.refcount += 1;
            }
            return id;
        }

        let node = RangeNode {
            sheet,
            range,
            refcount: 1,
        };
        let id = match self.free_ranges.pop() {
            Some(slot) => {
                self.ranges[slot] = Some(node);
                RangeId(slot)
            }
            None => {
                self.ranges.push(Some(node));
                RangeId(self.ranges.len() - 1)
            }
        };

        self.range_ids.insert((sheet, range), id);
        for col in range.start.col..=range.end.col {
            self.column_index.entry((sheet, col)).or_default().insert(id);
        }
        id
    }

    fn release_range(&mut self, id: RangeId) {
        let Some(node) = self.ranges[id.0].as_mut() else {
            return;
        };
        node.refcount -= 1;
        if node.refcount > 0 {
            return;
        }

        let (sheet, range) = (node.sheet, node.range);
        self.ranges[id.0] = None;
        self.free_ranges.push(id.0);
        self.range_ids.remove(&(sheet, range));
        self.dependents.remove(&Node::Range(id));
        for col in range.start.col..=range.end.col {
            if let Some(ids) = self.column_index.get_mut(&(sheet, col)) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.column_index.remove(&(sheet, col));
                }
            }
        }
    }

    /// Whether `cell` is a registered formula cell
    pub fn contains(&self, cell: CellKey) -> bool {
        self.precedents.contains_key(&cell)
    }

    /// Registered formula cells, unordered
    pub fn formula_cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.precedents.keys().copied()
    }

    /// Get what the given formula cell reads
    pub fn precedents(&self, cell: CellKey) -> impl Iterator<Item = &Precedent> + '_ {
        self.precedents.get(&cell).into_iter().flatten()
    }

    /// Formula cells that read `cell`, directly or through a range, sorted
    pub fn dependents(&self, cell: CellKey) -> Vec<CellKey> {
        let mut result: Vec<CellKey> = self
            .dependents
            .get(&Node::Cell(cell))
            .into_iter()
            .flatten()
            .copied()
            .collect();

        if let Some(ids) = self.column_index.get(&(cell.sheet, cell.col)) {
            for id in ids {
                let covers = self.ranges[id.0]
                    .as_ref()
                    .is_some_and(|node| node.range.contains(cell.row, cell.col));
                if covers {
                    if let Some(cells) = self.dependents.get(&Node::Range(*id)) {
                        result.extend(cells.iter().copied());
                    }
                }
            }
        }

        result.sort_unstable();
        result.dedup();
        result
    }

    /// Formula cells that use the defined name, sorted
    pub fn name_dependents(&self, name: &str) -> Vec<CellKey> {
        let mut cells: Vec<CellKey> = self
            .names
            .get(&name.to_lowercase())
            .into_iter()
            .flatten()
            .copied()
            .collect();
        cells.sort_unstable();
        cells
    }

    /// Number of live aggregate range nodes
    pub fn range_node_count(&self) -> usize {
        self.range_ids.len()
    }

    /// Number of stored edges, counting a range reference once
    pub fn edge_count(&self) -> usize {
        self.dependents.values().map(|cells| cells.len()).sum()
    }

    /// Order the formula cells affected by `changed`
    ///
    /// Affected cells are the changed formula cells plus everything reachable
    /// from any changed cell through dependent edges.
    pub fn compute_order(&self, changed: &[CellKey]) -> Schedule {
        let mut seen: AHashSet<CellKey> = AHashSet::new();
        let mut queue: Vec<CellKey> = Vec::new();
        for &cell in changed {
            if seen.insert(cell) {
                queue.push(cell);
            }
        }
        while let Some(cell) = queue.pop() {
            for dependent in self.dependents(cell) {
                if seen.insert(dependent) {
                    queue.push(dependent);
                }
            }
        }

        let mut nodes: Vec<CellKey> = seen.into_iter().filter(|cell| self.contains(*cell)).collect();
        nodes.sort_unstable();
        self.schedule(&nodes)
    }

    /// Strongly connected components of the whole graph that form cycles
    pub fn detect_cycles(&self) -> Vec<Vec<CellKey>> {
        let mut nodes: Vec<CellKey> = self.formula_cells().collect();
        nodes.sort_unstable();
        self.schedule(&nodes).cycles
    }

    /// Adjacency among `nodes` (sorted), as indices
    fn adjacency(&self, nodes: &[CellKey]) -> Vec<Vec<usize>> {
        let position: AHashMap<CellKey, usize> =
            nodes.iter().enumerate().map(|(i, cell)| (*cell, i)).collect();
        nodes
            .iter()
            .map(|cell| {
                self.dependents(*cell)
                    .into_iter()
                    .filter_map(|dependent| position.get(&dependent).copied())
                    .collect()
            })
            .collect()
    }

    /// Levels over the condensation of the subgraph induced by `nodes`
    fn schedule(&self, nodes: &[CellKey]) -> Schedule {
        let adjacency = self.adjacency(nodes);
        let components = strongly_connected(&adjacency);

        let mut component_of = vec![0; nodes.len()];
        for (c, members) in components.iter().enumerate() {
            for &v in members {
                component_of[v] = c;
            }
        }

        // Condensation edges and in-degrees
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        for (v, targets) in adjacency.iter().enumerate() {
            for &w in targets {
                let (cv, cw) = (component_of[v], component_of[w]);
                if cv != cw {
                    successors[cv].push(cw);
                }
            }
        }
        for targets in &mut successors {
            targets.sort_unstable();
            targets.dedup();
            for &t in targets.iter() {
                in_degree[t] += 1;
            }
        }

        let members: Vec<Vec<CellKey>> = components
            .iter()
            .map(|component| {
                let mut cells: Vec<CellKey> = component.iter().map(|&v| nodes[v]).collect();
                cells.sort_unstable();
                cells
            })
            .collect();
        let cyclic: Vec<bool> = components
            .iter()
            .map(|component| component.len() > 1 || adjacency[component[0]].contains(&component[0]))
            .collect();

        let mut schedule = Schedule::default();
        let mut frontier: Vec<usize> = (0..components.len()).filter(|&c| in_degree[c] == 0).collect();
        while !frontier.is_empty() {
            // Ties break by the smallest key of each component
            frontier.sort_unstable_by_key(|&c| members[c][0]);

            let mut level = Level::default();
            let mut next = Vec::new();
            for &c in &frontier {
                if cyclic[c] {
                    level.cycles.push(members[c].clone());
                    schedule.cycles.push(members[c].clone());
                } else {
                    level.cells.push(members[c][0]);
                }
                for &s in &successors[c] {
                    in_degree[s] -= 1;
                    if in_degree[s] == 0 {
                        next.push(s);
                    }
                }
            }

            schedule.levels.push(level);
            frontier = next;
        }

        schedule.cycles.sort_unstable();
        schedule
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Tarjan's algorithm without recursion; components come out in reverse
/// topological order
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = counter;
        lowlink[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = work.last_mut() {
            let v = frame.0;
            if frame.1 < adjacency[v].len() {
                let w = adjacency[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = counter;
                    lowlink[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
