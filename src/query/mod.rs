//! Composable set-algebra queries over archetype masks.
//!
//! A query is a tree of [`Node`]s, each carrying an operation (AND, OR,
//! NOT), a component set, and child nodes. Evaluation never touches rows:
//! a node builds a mask from its component set and compares it against an
//! archetype's mask, pruning whole tables at once. Cursors then iterate
//! only the archetypes that matched.
//!
//! Builders accept [`QueryItem`]s — a single component, a component list,
//! or a sub-tree — so malformed inputs are unrepresentable.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut query = Query::new();
//! let armed = query.and([weapon.into(), ammo.into()]);
//! let node = query.or([armed.into(), QueryItem::from(shield)]);
//! ```

pub mod cursor;

use crate::component::{ComponentMask, ComponentType};
use crate::storage::{Archetype, Storage};

/// The logical operation of a query node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Matches archetypes containing every listed component, and all
    /// children.
    And,
    /// Matches archetypes containing any listed component, or any child.
    Or,
    /// Matches archetypes containing none of the listed components, and no
    /// matching children.
    Not,
}

/// One input to a query builder.
pub enum QueryItem {
    /// A single component.
    Component(ComponentType),
    /// A list of components, contributed as one set.
    Components(Vec<ComponentType>),
    /// A sub-query, attached as a child node.
    Node(Node),
}

impl From<ComponentType> for QueryItem {
    fn from(component: ComponentType) -> Self {
        QueryItem::Component(component)
    }
}

impl<T: Default + 'static> From<crate::component::Component<T>> for QueryItem {
    fn from(component: crate::component::Component<T>) -> Self {
        QueryItem::Component(component.erased())
    }
}

impl From<Vec<ComponentType>> for QueryItem {
    fn from(components: Vec<ComponentType>) -> Self {
        QueryItem::Components(components)
    }
}

impl From<Node> for QueryItem {
    fn from(node: Node) -> Self {
        QueryItem::Node(node)
    }
}

/// A node in a query tree.
#[derive(Clone)]
pub struct Node {
    op: QueryOp,
    components: Vec<ComponentType>,
    children: Vec<Node>,
}

impl Node {
    fn from_items(op: QueryOp, items: impl IntoIterator<Item = QueryItem>) -> Self {
        let mut components = Vec::new();
        let mut children = Vec::new();
        for item in items {
            match item {
                QueryItem::Component(component) => components.push(component),
                QueryItem::Components(list) => components.extend(list),
                QueryItem::Node(node) => children.push(node),
            }
        }
        Self {
            op,
            components,
            children,
        }
    }

    /// The node's operation.
    pub fn op(&self) -> QueryOp {
        self.op
    }

    /// Evaluate this node against one archetype.
    ///
    /// The node's components are registered in the storage's schema as a
    /// side effect, exactly as every archetype-creating path registers
    /// them. A component whose registration fails (bit pool exhausted and
    /// never assigned) can exist in no archetype and contributes
    /// accordingly.
    pub fn evaluate(&self, archetype: &Archetype, storage: &Storage) -> bool {
        let mut node_mask = ComponentMask::new();
        for &component in &self.components {
            match storage.schema().register(component) {
                Ok(bit) => node_mask.mark(bit),
                Err(_) => {
                    if self.op == QueryOp::And {
                        return false;
                    }
                }
            }
        }

        let archetype_mask = archetype.mask();
        match self.op {
            QueryOp::And => {
                if !archetype_mask.contains_all(&node_mask) {
                    return false;
                }
                self.children
                    .iter()
                    .all(|child| child.evaluate(archetype, storage))
            }
            QueryOp::Or => {
                if archetype_mask.contains_any(&node_mask) {
                    return true;
                }
                self.children
                    .iter()
                    .any(|child| child.evaluate(archetype, storage))
            }
            QueryOp::Not => {
                if self.children.is_empty() {
                    return archetype_mask.contains_none(&node_mask);
                }
                if !self.components.is_empty() && !archetype_mask.contains_none(&node_mask) {
                    return false;
                }
                self.children
                    .iter()
                    .all(|child| !child.evaluate(archetype, storage))
            }
        }
    }
}

/// A query with a root node built through [`and`](Query::and),
/// [`or`](Query::or), and [`not`](Query::not).
///
/// The first node built becomes the root; later builder calls produce
/// detached nodes for composing into larger trees. An unrooted query
/// matches nothing.
#[derive(Default)]
pub struct Query {
    root: Option<Node>,
}

impl Query {
    /// Create an empty, unrooted query.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Build an AND node over the given items.
    pub fn and(&mut self, items: impl IntoIterator<Item = QueryItem>) -> Node {
        self.build(QueryOp::And, items)
    }

    /// Build an OR node over the given items.
    pub fn or(&mut self, items: impl IntoIterator<Item = QueryItem>) -> Node {
        self.build(QueryOp::Or, items)
    }

    /// Build a NOT node over the given items.
    pub fn not(&mut self, items: impl IntoIterator<Item = QueryItem>) -> Node {
        self.build(QueryOp::Not, items)
    }

    fn build(&mut self, op: QueryOp, items: impl IntoIterator<Item = QueryItem>) -> Node {
        let node = Node::from_items(op, items);
        if self.root.is_none() {
            self.root = Some(node.clone());
        }
        node
    }

    /// The root node, if one was built.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Evaluate the root against one archetype. Unrooted queries evaluate
    /// to false.
    pub fn evaluate(&self, archetype: &Archetype, storage: &Storage) -> bool {
        match &self.root {
            Some(root) => root.evaluate(archetype, storage),
            None => false,
        }
    }
}
