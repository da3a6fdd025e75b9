use std::collections::HashMap;
use std::fmt;

use crate::{Shape, ShapeIndex};

/// One value of type `T` for every node of a shape.
///
/// Nodes live in a flat arena in pre-order, and a precomputed
/// index-to-position map resolves every lookup without walking the shape.
/// Asking for an index that is not a node of the shape is a caller bug and
/// panics; use [`ShapeTree::get`] to probe.
#[derive(Clone, PartialEq)]
pub struct ShapeTree<T> {
    shape: Shape,
    nodes: Vec<Node<T>>,
    positions: HashMap<ShapeIndex, usize>,
    /// Arena positions with children before parents, siblings ascending.
    post_order: Vec<usize>,
}

#[derive(Clone, PartialEq)]
struct Node<T> {
    index: ShapeIndex,
    is_leaf: bool,
    value: T,
}

impl<T> ShapeTree<T> {
    /// Build a tree over `shape`, computing each node's value from its index
    /// and subshape. `f` is called in pre-order.
    pub fn from_fn<F>(shape: &Shape, mut f: F) -> Self
    where
        F: FnMut(&ShapeIndex, &Shape) -> T,
    {
        let mut nodes = Vec::with_capacity(shape.subshape_count());
        shape.for_each_subshape(|subshape, index| {
            nodes.push(Node {
                index: index.clone(),
                is_leaf: subshape.tuple_shapes().is_empty(),
                value: f(index, subshape),
            });
        });

        let positions = nodes
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.index.clone(), pos))
            .collect();

        let mut post_order = Vec::with_capacity(nodes.len());
        let mut next = 0;
        collect_post_order(shape, &mut next, &mut post_order);

        Self {
            shape: shape.clone(),
            nodes,
            positions,
            post_order,
        }
    }

    /// The shape whose topology this tree mirrors.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of nodes (leaves and tuples).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, index: &ShapeIndex) -> bool {
        self.positions.contains_key(index)
    }

    pub fn get(&self, index: &ShapeIndex) -> Option<&T> {
        let pos = *self.positions.get(index)?;
        Some(&self.nodes[pos].value)
    }

    pub fn get_mut(&mut self, index: &ShapeIndex) -> Option<&mut T> {
        let pos = *self.positions.get(index)?;
        Some(&mut self.nodes[pos].value)
    }

    /// Value at `index`. Panics if `index` is not a node of the shape.
    pub fn element(&self, index: &ShapeIndex) -> &T {
        &self.nodes[self.position(index)].value
    }

    /// Mutable value at `index`. Panics if `index` is not a node of the shape.
    pub fn element_mut(&mut self, index: &ShapeIndex) -> &mut T {
        let pos = self.position(index);
        &mut self.nodes[pos].value
    }

    /// Whether `index` addresses a node with no children.
    pub fn is_leaf(&self, index: &ShapeIndex) -> bool {
        self.nodes[self.position(index)].is_leaf
    }

    fn position(&self, index: &ShapeIndex) -> usize {
        match self.positions.get(index) {
            Some(&pos) => pos,
            None => panic!(
                "shape index {index} is not a node of shape {}",
                self.shape
            ),
        }
    }

    /// Nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (&ShapeIndex, &T)> + '_ {
        self.nodes.iter().map(|node| (&node.index, &node.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ShapeIndex, &mut T)> + '_ {
        self.nodes.iter_mut().map(|node| (&node.index, &mut node.value))
    }

    /// Nodes with every child visited before its parent.
    pub fn post_order(&self) -> impl Iterator<Item = (&ShapeIndex, &T)> + '_ {
        self.post_order.iter().map(|&pos| {
            let node = &self.nodes[pos];
            (&node.index, &node.value)
        })
    }

    /// Leaf nodes in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = (&ShapeIndex, &T)> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.is_leaf)
            .map(|node| (&node.index, &node.value))
    }

    pub fn for_each_element<F>(&self, mut f: F)
    where
        F: FnMut(&ShapeIndex, &T),
    {
        for node in &self.nodes {
            f(&node.index, &node.value);
        }
    }

    pub fn for_each_element_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&ShapeIndex, &mut T),
    {
        for node in &mut self.nodes {
            f(&node.index, &mut node.value);
        }
    }
}

impl<T: Default> ShapeTree<T> {
    /// Tree over `shape` with every value defaulted.
    pub fn new(shape: &Shape) -> Self {
        Self::from_fn(shape, |_, _| T::default())
    }
}

impl<T: Clone> ShapeTree<T> {
    /// Tree over `shape` with every node set to `value`.
    pub fn with_value(shape: &Shape, value: T) -> Self {
        Self::from_fn(shape, |_, _| value.clone())
    }

    /// Copy of the subtree rooted at `index`, re-rooted so that `index`
    /// becomes `{}`. Panics if `index` is not a node of the shape.
    pub fn sub_tree(&self, index: &ShapeIndex) -> ShapeTree<T> {
        let subshape = match self.shape.subshape(index) {
            Some(subshape) => subshape,
            None => panic!(
                "shape index {index} is not a node of shape {}",
                self.shape
            ),
        };
        ShapeTree::from_fn(subshape, |relative, _| {
            self.element(&index.concat(relative)).clone()
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for ShapeTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

fn collect_post_order(shape: &Shape, next: &mut usize, out: &mut Vec<usize>) {
    let pos = *next;
    *next += 1;
    for element in shape.tuple_shapes() {
        collect_post_order(element, next, out);
    }
    out.push(pos);
}
