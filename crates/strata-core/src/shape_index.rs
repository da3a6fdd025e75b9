use smallvec::SmallVec;
use std::fmt;
use std::ops::Index;

/// Path of child selectors from the root of a shape to one of its nodes.
///
/// The empty index is the root. Most shapes nest only a few tuples deep, so
/// selectors are stored inline for up to 4 levels.
///
/// An index is not tied to any shape; use [`crate::Shape::is_valid_index`]
/// to check it against one.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeIndex {
    path: SmallVec<[usize; 4]>,
}

impl ShapeIndex {
    /// The root index.
    pub fn new() -> Self {
        Self {
            path: SmallVec::new(),
        }
    }

    pub fn from_slice(path: &[usize]) -> Self {
        Self {
            path: SmallVec::from_slice(path),
        }
    }

    /// Number of selectors (depth of the addressed node).
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Whether this is the root index.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.path
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.path.iter()
    }

    /// Descend into child `i` in place.
    pub fn push(&mut self, i: usize) {
        self.path.push(i);
    }

    /// Ascend one level in place, returning the removed selector.
    pub fn pop(&mut self) -> Option<usize> {
        self.path.pop()
    }

    /// Index of child `i` of this node.
    pub fn child(&self, i: usize) -> ShapeIndex {
        let mut child = self.clone();
        child.push(i);
        child
    }

    /// Index of the parent node, or `None` for the root.
    pub fn parent(&self) -> Option<ShapeIndex> {
        if self.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.pop();
        Some(parent)
    }

    /// Append every selector of `suffix` to this path.
    pub fn concat(&self, suffix: &ShapeIndex) -> ShapeIndex {
        let mut path = self.path.clone();
        path.extend_from_slice(&suffix.path);
        ShapeIndex { path }
    }

    /// Whether `prefix` addresses this node or one of its ancestors.
    pub fn starts_with(&self, prefix: &ShapeIndex) -> bool {
        self.path.starts_with(&prefix.path)
    }

    /// Whether this index addresses `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &ShapeIndex) -> bool {
        other.starts_with(self)
    }

    /// Strip `prefix` from the front, if it is one.
    pub fn strip_prefix(&self, prefix: &ShapeIndex) -> Option<ShapeIndex> {
        self.path
            .strip_prefix(prefix.path.as_slice())
            .map(ShapeIndex::from_slice)
    }
}

impl Index<usize> for ShapeIndex {
    type Output = usize;

    fn index(&self, level: usize) -> &usize {
        &self.path[level]
    }
}

impl<'a> IntoIterator for &'a ShapeIndex {
    type Item = &'a usize;
    type IntoIter = std::slice::Iter<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.path.iter()
    }
}

impl fmt::Debug for ShapeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeIndex({self})")
    }
}

impl fmt::Display for ShapeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, selector) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{selector}")?;
        }
        write!(f, "}}")
    }
}

impl From<&[usize]> for ShapeIndex {
    fn from(path: &[usize]) -> Self {
        ShapeIndex::from_slice(path)
    }
}

impl From<Vec<usize>> for ShapeIndex {
    fn from(path: Vec<usize>) -> Self {
        ShapeIndex {
            path: SmallVec::from_vec(path),
        }
    }
}

impl FromIterator<usize> for ShapeIndex {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        ShapeIndex {
            path: iter.into_iter().collect(),
        }
    }
}

macro_rules! impl_shape_index_from_array {
    ($($n:expr),*) => {
        $(
            impl From<[usize; $n]> for ShapeIndex {
                fn from(path: [usize; $n]) -> Self {
                    ShapeIndex::from_slice(&path)
                }
            }
        )*
    };
}

impl_shape_index_from_array!(0, 1, 2, 3, 4, 5, 6);
