use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::{DType, Result, ShapeIndex, StrataError};

/// Width of a device pointer in the tuple-table representation.
pub const DEFAULT_POINTER_SIZE: usize = 8;

/// Dense array of a single element type, with stack-allocated storage for
/// up to 4 dimensions.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    dtype: DType,
    dims: SmallVec<[usize; 4]>,
}

impl ArrayShape {
    pub fn new(dtype: DType, dims: &[usize]) -> Self {
        Self {
            dtype,
            dims: SmallVec::from_slice(dims),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements, or `None` if the count overflows `usize`.
    pub fn numel(&self) -> Option<usize> {
        // an empty product is 1, which is a scalar
        self.dims.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Bytes needed to hold every element of this array.
    ///
    /// Fails with [`StrataError::InvalidShape`] when the size does not fit
    /// in `usize`.
    pub fn byte_size(&self) -> Result<usize> {
        self.numel()
            .and_then(|n| self.dtype.storage_bytes(n))
            .ok_or_else(|| StrataError::InvalidShape(format!("byte size of {self} overflows usize")))
    }
}

impl fmt::Debug for ArrayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayShape({self})")
    }
}

impl fmt::Display for ArrayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Logical type of a value handed to or produced by a device computation:
/// either a dense array or a tuple of nested shapes.
///
/// Shapes are immutable values; every node of the tree (arrays and tuples
/// alike) is addressable by a [`ShapeIndex`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Array(ArrayShape),
    Tuple(Vec<Shape>),
}

impl Shape {
    pub fn array(dtype: DType, dims: &[usize]) -> Self {
        Shape::Array(ArrayShape::new(dtype, dims))
    }

    /// Zero-dimensional array.
    pub fn scalar(dtype: DType) -> Self {
        Shape::array(dtype, &[])
    }

    pub fn tuple(elements: Vec<Shape>) -> Self {
        Shape::Tuple(elements)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Shape::Array(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Shape::Tuple(_))
    }

    pub fn is_empty_tuple(&self) -> bool {
        matches!(self, Shape::Tuple(elements) if elements.is_empty())
    }

    pub fn as_array(&self) -> Option<&ArrayShape> {
        match self {
            Shape::Array(array) => Some(array),
            Shape::Tuple(_) => None,
        }
    }

    /// Element shapes of a tuple; empty for arrays.
    pub fn tuple_shapes(&self) -> &[Shape] {
        match self {
            Shape::Array(_) => &[],
            Shape::Tuple(elements) => elements,
        }
    }

    pub fn tuple_count(&self) -> usize {
        self.tuple_shapes().len()
    }

    /// The node addressed by `index`, or `None` if the path leaves the tree.
    pub fn subshape(&self, index: &ShapeIndex) -> Option<&Shape> {
        let mut current = self;
        for &i in index {
            current = current.tuple_shapes().get(i)?;
        }
        Some(current)
    }

    pub fn is_valid_index(&self, index: &ShapeIndex) -> bool {
        self.subshape(index).is_some()
    }

    /// Bytes a device buffer for this node needs: the dense data of an
    /// array, or a table of `pointer_size`-byte element pointers for a tuple.
    pub fn byte_size(&self, pointer_size: usize) -> Result<usize> {
        match self {
            Shape::Array(array) => array.byte_size(),
            Shape::Tuple(elements) => pointer_size.checked_mul(elements.len()).ok_or_else(|| {
                StrataError::InvalidShape(format!("pointer table of {self} overflows usize"))
            }),
        }
    }

    /// Visit every node in pre-order (parent before children, children in
    /// ascending selector order).
    pub fn for_each_subshape<F>(&self, mut f: F)
    where
        F: FnMut(&Shape, &ShapeIndex),
    {
        let mut index = ShapeIndex::new();
        self.visit_pre_order(&mut index, &mut f);
    }

    fn visit_pre_order<F>(&self, index: &mut ShapeIndex, f: &mut F)
    where
        F: FnMut(&Shape, &ShapeIndex),
    {
        f(self, index);
        for (i, element) in self.tuple_shapes().iter().enumerate() {
            index.push(i);
            element.visit_pre_order(index, f);
            index.pop();
        }
    }

    /// Number of nodes, counting the root and every tuple.
    pub fn subshape_count(&self) -> usize {
        1 + self
            .tuple_shapes()
            .iter()
            .map(Shape::subshape_count)
            .sum::<usize>()
    }

    /// Number of nodes with no children (arrays and empty tuples).
    pub fn leaf_count(&self) -> usize {
        match self {
            Shape::Array(_) => 1,
            Shape::Tuple(elements) if elements.is_empty() => 1,
            Shape::Tuple(elements) => elements.iter().map(Shape::leaf_count).sum(),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({self})")
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Array(array) => write!(f, "{array}"),
            Shape::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<ArrayShape> for Shape {
    fn from(array: ArrayShape) -> Self {
        Shape::Array(array)
    }
}

impl FromStr for Shape {
    type Err = StrataError;

    /// Parse the text form produced by `Display`, e.g. `(f32[4], (u8[2,3]))`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parser = ShapeParser { input: s, pos: 0 };
        let shape = parser.parse_shape()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(shape)
    }
}

struct ShapeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ShapeParser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn error(&self, msg: &str) -> StrataError {
        StrataError::ParseShape(format!("{msg} at offset {} in '{}'", self.pos, self.input))
    }

    fn parse_shape(&mut self) -> Result<Shape> {
        match self.peek() {
            Some('(') => self.parse_tuple(),
            Some(_) => self.parse_array(),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_tuple(&mut self) -> Result<Shape> {
        self.expect('(')?;
        let mut elements = Vec::new();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Shape::Tuple(elements));
        }
        loop {
            elements.push(self.parse_shape()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(Shape::Tuple(elements));
                }
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Shape> {
        self.skip_whitespace();
        let name_len = self
            .rest()
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(self.rest().len());
        if name_len == 0 {
            return Err(self.error("expected element type"));
        }
        let dtype: DType = self.rest()[..name_len].parse()?;
        self.pos += name_len;

        self.expect('[')?;
        let mut dims = SmallVec::<[usize; 4]>::new();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(Shape::Array(ArrayShape { dtype, dims }));
        }
        loop {
            self.skip_whitespace();
            let digits = self
                .rest()
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(self.rest().len());
            if digits == 0 {
                return Err(self.error("expected dimension"));
            }
            let dim = self.rest()[..digits]
                .parse::<usize>()
                .map_err(|e| self.error(&format!("bad dimension: {e}")))?;
            self.pos += digits;
            dims.push(dim);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(Shape::Array(ArrayShape { dtype, dims }));
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Shape {
        Shape::tuple(vec![
            Shape::array(DType::F32, &[4]),
            Shape::array(DType::F32, &[8]),
        ])
    }

    #[test]
    fn test_array_shape() {
        let s = ArrayShape::new(DType::F32, &[2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), Some(24));
        assert_eq!(s.dim(2), Some(4));
        assert_eq!(s.dim(3), None);
        assert_eq!(s.byte_size(), Ok(96));
    }

    #[test]
    fn test_oversized_array_is_invalid() {
        let s = Shape::array(DType::U8, &[usize::MAX, 2]);
        assert_eq!(s.as_array().unwrap().numel(), None);
        assert!(matches!(
            s.byte_size(DEFAULT_POINTER_SIZE),
            Err(StrataError::InvalidShape(_))
        ));

        // element count fits, byte count does not
        let wide = Shape::array(DType::C128, &[usize::MAX / 2]);
        assert!(matches!(
            wide.byte_size(DEFAULT_POINTER_SIZE),
            Err(StrataError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_scalar() {
        let s = Shape::scalar(DType::S64);
        assert!(s.is_array());
        assert!(s.as_array().unwrap().is_scalar());
        assert_eq!(s.as_array().unwrap().numel(), Some(1));
        assert_eq!(s.byte_size(DEFAULT_POINTER_SIZE), Ok(8));
    }

    #[test]
    fn test_zero_element_array() {
        let s = Shape::array(DType::F32, &[0, 5]);
        assert_eq!(s.byte_size(DEFAULT_POINTER_SIZE), Ok(0));
    }

    #[test]
    fn test_tuple_byte_size_counts_pointers() {
        assert_eq!(pair().byte_size(8), Ok(16));
        assert_eq!(pair().byte_size(4), Ok(8));
        assert_eq!(Shape::tuple(vec![]).byte_size(8), Ok(0));
    }

    #[test]
    fn test_subshape() {
        let nested = Shape::tuple(vec![Shape::array(DType::U8, &[2]), pair()]);
        assert_eq!(nested.subshape(&ShapeIndex::new()), Some(&nested));
        assert_eq!(nested.subshape(&[1].into()), Some(&pair()));
        assert_eq!(
            nested.subshape(&[1, 1].into()),
            Some(&Shape::array(DType::F32, &[8]))
        );
        assert_eq!(nested.subshape(&[2].into()), None);
        assert_eq!(nested.subshape(&[0, 0].into()), None);
        assert!(!nested.is_valid_index(&[1, 2].into()));
    }

    #[test]
    fn test_pre_order_visit() {
        let nested = Shape::tuple(vec![pair(), Shape::scalar(DType::Pred)]);
        let mut seen = Vec::new();
        nested.for_each_subshape(|_, index| seen.push(index.clone()));
        let expected: Vec<ShapeIndex> = vec![
            ShapeIndex::new(),
            [0].into(),
            [0, 0].into(),
            [0, 1].into(),
            [1].into(),
        ];
        assert_eq!(seen, expected);
        assert_eq!(nested.subshape_count(), 5);
        assert_eq!(nested.leaf_count(), 3);
    }

    #[test]
    fn test_empty_tuple_is_leaf() {
        let s = Shape::tuple(vec![Shape::tuple(vec![])]);
        assert_eq!(s.leaf_count(), 1);
        assert_eq!(s.subshape_count(), 2);
        assert!(s.subshape(&[0].into()).unwrap().is_empty_tuple());
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::array(DType::F32, &[2, 3]).to_string(), "f32[2,3]");
        assert_eq!(Shape::scalar(DType::S32).to_string(), "s32[]");
        assert_eq!(pair().to_string(), "(f32[4], f32[8])");
        assert_eq!(Shape::tuple(vec![]).to_string(), "()");
    }

    #[test]
    fn test_parse() {
        let parsed: Shape = " ( f32[4] , (u8[2, 3], pred[]), ()) ".parse().unwrap();
        let expected = Shape::tuple(vec![
            Shape::array(DType::F32, &[4]),
            Shape::tuple(vec![
                Shape::array(DType::U8, &[2, 3]),
                Shape::scalar(DType::Pred),
            ]),
            Shape::tuple(vec![]),
        ]);
        assert_eq!(parsed, expected);
        assert_eq!(expected.to_string().parse::<Shape>().unwrap(), expected);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "f32", "f32[4", "q8[1]", "(f32[1]", "f32[1] x", "f32[a]", "(,)"] {
            assert!(
                matches!(bad.parse::<Shape>(), Err(StrataError::ParseShape(_))),
                "expected parse failure for {bad:?}"
            );
        }
    }
}
