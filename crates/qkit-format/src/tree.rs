//! In-memory model of a file: groups, datasets and their attributes.
//!
//! The store keeps the whole hierarchy in memory and serializes it with
//! [`crate::file_writer::serialize`] on every flush.

use crate::attribute::AttrValue;
use crate::error::FormatError;

/// Element type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    F64,
    /// Fixed-length UTF-8 text.
    Text,
}

impl ElementType {
    pub fn name(self) -> &'static str {
        match self {
            ElementType::F32 => "float32",
            ElementType::F64 => "float64",
            ElementType::Text => "text",
        }
    }
}

/// Dense row-major element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum DataBuffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
    Text(Vec<String>),
}

impl DataBuffer {
    /// A buffer of `len` fill values (NaN or empty text).
    pub fn filled(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::F32 => DataBuffer::F32(vec![f32::NAN; len]),
            ElementType::F64 => DataBuffer::F64(vec![f64::NAN; len]),
            ElementType::Text => DataBuffer::Text(vec![String::new(); len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            DataBuffer::F32(_) => ElementType::F32,
            DataBuffer::F64(_) => ElementType::F64,
            DataBuffer::Text(_) => ElementType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataBuffer::F32(v) => v.len(),
            DataBuffer::F64(v) => v.len(),
            DataBuffer::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Attributes in insertion order. Setting an existing name replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resizable dataset held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetNode {
    pub data: DataBuffer,
    pub shape: Vec<u64>,
    /// `None` means the maximum equals the current shape.
    pub max_shape: Option<Vec<u64>>,
    /// `None` stores the data contiguously.
    pub chunks: Option<Vec<u64>>,
    pub attrs: Attributes,
}

fn element_count(shape: &[u64]) -> usize {
    shape.iter().map(|&d| d as usize).product()
}

impl DatasetNode {
    /// A dataset of `shape` holding fill values.
    pub fn new(
        element_type: ElementType,
        shape: &[u64],
        max_shape: Option<&[u64]>,
        chunks: Option<&[u64]>,
    ) -> Self {
        Self {
            data: DataBuffer::filled(element_type, element_count(shape)),
            shape: shape.to_vec(),
            max_shape: max_shape.map(<[u64]>::to_vec),
            chunks: chunks.map(<[u64]>::to_vec),
            attrs: Attributes::new(),
        }
    }

    /// A rank-0 dataset with one fill element, stored contiguously.
    pub fn scalar(element_type: ElementType) -> Self {
        Self::new(element_type, &[], None, None)
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Change the extent. Elements keep their multi-index; new positions
    /// take the fill value.
    pub fn resize(&mut self, new_shape: &[u64]) -> Result<(), FormatError> {
        if new_shape.len() != self.shape.len() {
            return Err(FormatError::RankMismatch {
                expected: self.shape.len(),
                actual: new_shape.len(),
            });
        }
        let max = self.max_shape.as_deref().unwrap_or(&self.shape);
        for (axis, (&req, &m)) in new_shape.iter().zip(max).enumerate() {
            if req > m {
                return Err(FormatError::ExceedsMaxShape {
                    axis,
                    requested: req,
                    max: m,
                });
            }
        }
        if new_shape == self.shape.as_slice() {
            return Ok(());
        }
        if new_shape[1..] == self.shape[1..] {
            // only the outer axis changes: row-major order is kept in place
            let count = element_count(new_shape);
            match &mut self.data {
                DataBuffer::F32(v) => v.resize(count, f32::NAN),
                DataBuffer::F64(v) => v.resize(count, f64::NAN),
                DataBuffer::Text(v) => v.resize(count, String::new()),
            }
            self.shape = new_shape.to_vec();
            return Ok(());
        }
        self.data = match &self.data {
            DataBuffer::F32(v) => DataBuffer::F32(reshape(v, &self.shape, new_shape, f32::NAN)),
            DataBuffer::F64(v) => DataBuffer::F64(reshape(v, &self.shape, new_shape, f64::NAN)),
            DataBuffer::Text(v) => DataBuffer::Text(reshape(v, &self.shape, new_shape, String::new())),
        };
        self.shape = new_shape.to_vec();
        Ok(())
    }

    /// Overwrite elements starting at linear index `start`.
    pub fn write_f64(&mut self, start: usize, values: &[f64]) -> Result<(), FormatError> {
        let len = self.data.len();
        let end = start + values.len();
        if end > len {
            return Err(FormatError::IndexOutOfBounds { end, len });
        }
        match &mut self.data {
            DataBuffer::F32(buf) => {
                for (dst, &v) in buf[start..end].iter_mut().zip(values) {
                    *dst = v as f32;
                }
            }
            DataBuffer::F64(buf) => buf[start..end].copy_from_slice(values),
            DataBuffer::Text(_) => {
                return Err(FormatError::TypeMismatch {
                    expected: "text",
                    actual: "numeric",
                })
            }
        }
        Ok(())
    }

    /// Overwrite text elements starting at linear index `start`.
    pub fn write_text(&mut self, start: usize, values: &[String]) -> Result<(), FormatError> {
        let len = self.data.len();
        let end = start + values.len();
        if end > len {
            return Err(FormatError::IndexOutOfBounds { end, len });
        }
        match &mut self.data {
            DataBuffer::Text(buf) => {
                buf[start..end].clone_from_slice(values);
                Ok(())
            }
            other => Err(FormatError::TypeMismatch {
                expected: other.element_type().name(),
                actual: "text",
            }),
        }
    }

    /// All elements widened to `f64`.
    pub fn to_f64(&self) -> Result<Vec<f64>, FormatError> {
        match &self.data {
            DataBuffer::F32(v) => Ok(v.iter().map(|&x| f64::from(x)).collect()),
            DataBuffer::F64(v) => Ok(v.clone()),
            DataBuffer::Text(_) => Err(FormatError::TypeMismatch {
                expected: "text",
                actual: "numeric",
            }),
        }
    }

    pub fn to_text(&self) -> Result<Vec<String>, FormatError> {
        match &self.data {
            DataBuffer::Text(v) => Ok(v.clone()),
            other => Err(FormatError::TypeMismatch {
                expected: other.element_type().name(),
                actual: "text",
            }),
        }
    }
}

fn reshape<T: Clone>(old: &[T], old_shape: &[u64], new_shape: &[u64], fill: T) -> Vec<T> {
    let mut out = vec![fill; element_count(new_shape)];
    let rank = new_shape.len();
    if rank == 0 || out.is_empty() || old.is_empty() {
        return out;
    }
    let common: Vec<usize> = old_shape
        .iter()
        .zip(new_shape)
        .map(|(&a, &b)| a.min(b) as usize)
        .collect();
    let run = common[rank - 1];
    let rows: usize = common[..rank - 1].iter().product();
    let old_inner = old_shape[rank - 1] as usize;
    let new_inner = new_shape[rank - 1] as usize;

    for row in 0..rows {
        let mut rest = row;
        let mut src = 0usize;
        let mut dst = 0usize;
        let mut old_stride = old_inner;
        let mut new_stride = new_inner;
        for d in (0..rank - 1).rev() {
            let idx = rest % common[d];
            rest /= common[d];
            src += idx * old_stride;
            dst += idx * new_stride;
            old_stride *= old_shape[d] as usize;
            new_stride *= new_shape[d] as usize;
        }
        out[dst..dst + run].clone_from_slice(&old[src..src + run]);
    }
    out
}

/// A group: attributes plus named children in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupNode {
    pub attrs: Attributes,
    children: Vec<(String, Node)>,
}

/// A group or a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(GroupNode),
    Dataset(DatasetNode),
}

impl Node {
    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            Node::Group(g) => Some(g),
            Node::Dataset(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        match self {
            Node::Group(g) => Some(g),
            Node::Dataset(_) => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&DatasetNode> {
        match self {
            Node::Dataset(d) => Some(d),
            Node::Group(_) => None,
        }
    }

    pub fn as_dataset_mut(&mut self) -> Option<&mut DatasetNode> {
        match self {
            Node::Dataset(d) => Some(d),
            Node::Group(_) => None,
        }
    }

    pub fn attrs(&self) -> &Attributes {
        match self {
            Node::Group(g) => &g.attrs,
            Node::Dataset(d) => &d.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Group(g) => &mut g.attrs,
            Node::Dataset(d) => &mut d.attrs,
        }
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

impl GroupNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    /// Add or replace the child `name`.
    pub fn insert(&mut self, name: &str, node: Node) -> Result<(), FormatError> {
        if name.is_empty() || name.contains('/') || name == "." {
            return Err(FormatError::InvalidName(name.to_string()));
        }
        match self.get_mut(name) {
            Some(slot) => *slot = node,
            None => self.children.push((name.to_string(), node)),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let idx = self.children.iter().position(|(n, _)| n == name)?;
        Some(self.children.remove(idx).1)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(n, node)| (n.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Look up a `/`-separated path relative to this group.
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        let mut parts = components(path);
        let first = parts.next()?;
        parts.try_fold(self.get(first)?, |node, part| node.as_group()?.get(part))
    }

    pub fn resolve_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut parts = components(path);
        let first = parts.next()?;
        parts.try_fold(self.get_mut(first)?, |node, part| {
            node.as_group_mut()?.get_mut(part)
        })
    }

    /// The group at `path`, creating missing groups along the way.
    pub fn require_group(&mut self, path: &str) -> Result<&mut GroupNode, FormatError> {
        let mut group = self;
        for part in components(path) {
            if group.get(part).is_none() {
                group.insert(part, Node::Group(GroupNode::new()))?;
            }
            group = group
                .get_mut(part)
                .and_then(Node::as_group_mut)
                .ok_or_else(|| FormatError::InvalidName(part.to_string()))?;
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_replace_in_place() {
        let mut attrs = Attributes::new();
        attrs.set("a", 1i64);
        attrs.set("b", "x");
        attrs.set("a", 2i64);
        let names: Vec<&str> = attrs.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(attrs.get("a"), Some(&AttrValue::I64(2)));
        assert_eq!(attrs.remove("b"), Some(AttrValue::String("x".into())));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn resize_keeps_multi_index() {
        let unl = [u64::MAX, u64::MAX];
        let mut ds = DatasetNode::new(ElementType::F64, &[2, 2], Some(&unl), Some(&[5, 2]));
        ds.write_f64(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        ds.resize(&[3, 3]).unwrap();
        let v = ds.to_f64().unwrap();
        assert_eq!(&v[0..2], &[1.0, 2.0]);
        assert!(v[2].is_nan());
        assert_eq!(&v[3..5], &[3.0, 4.0]);
        assert!(v[5..].iter().all(|x| x.is_nan()));

        ds.resize(&[3, 1]).unwrap();
        let v = ds.to_f64().unwrap();
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 3.0);
        assert!(v[2].is_nan());
    }

    #[test]
    fn outer_axis_grows_and_shrinks_in_place() {
        let unl = [u64::MAX, u64::MAX];
        let mut ds = DatasetNode::new(ElementType::F32, &[1, 2], Some(&unl), Some(&[5, 2]));
        ds.write_f64(0, &[1.0, 2.0]).unwrap();
        ds.resize(&[3, 2]).unwrap();
        let v = ds.to_f64().unwrap();
        assert_eq!(v.len(), 6);
        assert_eq!(&v[..2], &[1.0, 2.0]);
        assert!(v[2..].iter().all(|x| x.is_nan()));

        ds.write_f64(4, &[5.0, 6.0]).unwrap();
        ds.resize(&[2, 2]).unwrap();
        assert_eq!(ds.shape, vec![2, 2]);
        assert_eq!(ds.to_f64().unwrap().len(), 4);

        let mut text = DatasetNode::new(ElementType::Text, &[0], Some(&[u64::MAX]), Some(&[64]));
        text.resize(&[2]).unwrap();
        assert_eq!(text.to_text().unwrap(), vec![String::new(), String::new()]);
    }

    #[test]
    fn resize_box_middle_axis() {
        let unl = [u64::MAX; 3];
        let mut ds = DatasetNode::new(ElementType::F32, &[2, 1, 2], Some(&unl), Some(&[5, 5, 2]));
        ds.write_f64(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        ds.resize(&[2, 2, 2]).unwrap();
        let v = ds.to_f64().unwrap();
        assert_eq!(&v[0..2], &[1.0, 2.0]);
        assert_eq!(&v[4..6], &[3.0, 4.0]);
        assert!(v[2].is_nan() && v[7].is_nan());
    }

    #[test]
    fn resize_limits() {
        let mut ds = DatasetNode::new(ElementType::F64, &[2], Some(&[3]), Some(&[4]));
        assert!(ds.resize(&[3]).is_ok());
        assert_eq!(
            ds.resize(&[4]),
            Err(FormatError::ExceedsMaxShape {
                axis: 0,
                requested: 4,
                max: 3
            })
        );
        assert_eq!(
            ds.resize(&[1, 1]),
            Err(FormatError::RankMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn text_and_numbers_do_not_mix() {
        let mut ds = DatasetNode::new(ElementType::Text, &[1], None, None);
        assert!(ds.write_text(0, &["hello".into()]).is_ok());
        assert!(matches!(
            ds.write_f64(0, &[1.0]),
            Err(FormatError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ds.write_text(1, &["x".into()]),
            Err(FormatError::IndexOutOfBounds { end: 2, len: 1 })
        ));
    }

    #[test]
    fn paths_resolve_and_create() {
        let mut root = GroupNode::new();
        root.require_group("/entry/data0").unwrap();
        let ds = DatasetNode::new(ElementType::F64, &[0], Some(&[u64::MAX]), Some(&[1024]));
        root.require_group("entry/data0")
            .unwrap()
            .insert("freq", Node::Dataset(ds))
            .unwrap();
        assert!(root.resolve("/entry/data0/freq").and_then(Node::as_dataset).is_some());
        assert!(root.resolve("/entry/missing").is_none());
        assert!(root.resolve("/entry/data0/freq/deeper").is_none());
        assert!(root.resolve_mut("entry").is_some());
    }

    #[test]
    fn dataset_blocks_group_creation() {
        let mut root = GroupNode::new();
        root.insert("x", Node::Dataset(DatasetNode::scalar(ElementType::F32)))
            .unwrap();
        assert!(root.require_group("x/y").is_err());
        assert!(root.insert("a/b", Node::Group(GroupNode::new())).is_err());
    }
}
