//! One open measurement file.
//!
//! The whole file is held in memory as a [`GroupNode`] tree. Every write
//! mutates the tree and then serializes a fresh file image, so the bytes on
//! disk always form a complete, readable HDF5 file. Only the pages that
//! differ from the previous image are written back.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use qkit_format::file_reader;
use qkit_format::file_writer;
use qkit_format::superblock::{Superblock, FLAG_SWMR_WRITE, FLAG_WRITE_ACCESS};
use qkit_format::{AttrValue, Attributes, DatasetNode, ElementType, FormatError, GroupNode, Node, UNLIMITED};
use tracing::{debug, info, warn};

use crate::append;
use crate::error::{Error, Result};
use crate::types::{AppendOptions, DsType, Folder, Payload};

/// Rows per chunk along the growing axes of matrices and boxes.
const ROW_CHUNK: u64 = 5;
const VECTOR_CHUNK: u64 = 1024;
const TEXT_CHUNK: u64 = 64;
/// Granularity of the comparison between successive file images.
const PAGE: usize = 4096;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, no writes.
    Read,
    /// Existing file, reads and writes.
    ReadWrite,
    /// Create, or truncate an existing file.
    Create,
    /// Reads and writes, creating the file if it is missing.
    Append,
}

impl OpenMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Parameters of a new dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub name: String,
    /// Expected length of one trace, used for chunking only.
    pub tracelength: u64,
    pub ds_type: DsType,
    pub folder: Folder,
    /// 1, 2 or 3.
    pub dim: u8,
    pub element_type: ElementType,
    /// Extra attributes written after `name`, `ds_type` and `fill`.
    pub meta: Vec<(String, AttrValue)>,
}

impl DatasetSpec {
    /// Defaults derived from `ds_type`: its natural rank, `Text` for text
    /// datasets and `F32` otherwise.
    pub fn new(name: impl Into<String>, ds_type: DsType, folder: Folder) -> Self {
        Self {
            name: name.into(),
            tracelength: 0,
            ds_type,
            folder,
            dim: ds_type.dim(),
            element_type: if ds_type == DsType::Txt {
                ElementType::Text
            } else {
                ElementType::F32
            },
            meta: Vec::new(),
        }
    }

    pub fn tracelength(mut self, tracelength: u64) -> Self {
        self.tracelength = tracelength;
        self
    }

    pub fn dim(mut self, dim: u8) -> Self {
        self.dim = dim;
        self
    }

    pub fn element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn meta(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.meta.push((name.into(), value.into()));
        self
    }

    fn build(&self) -> Result<DatasetNode> {
        let trace = self.tracelength.max(1);
        let chunks: Vec<u64> = match self.dim {
            1 if self.element_type == ElementType::Text => vec![TEXT_CHUNK],
            1 => vec![VECTOR_CHUNK],
            2 => vec![ROW_CHUNK, trace],
            3 => vec![ROW_CHUNK, ROW_CHUNK, trace],
            other => return Err(Error::InvalidDimension(other)),
        };
        let rank = chunks.len();
        let mut node = DatasetNode::new(
            self.element_type,
            &vec![0; rank],
            Some(&vec![UNLIMITED; rank]),
            Some(&chunks),
        );
        node.attrs.set("name", self.name.as_str());
        node.attrs.set("ds_type", self.ds_type.code());
        node.attrs.set(append::FILL_ATTR, vec![0i64, 0, 0]);
        for (key, value) in &self.meta {
            node.attrs.set(key, value.clone());
        }
        Ok(node)
    }
}

fn lock(file: &File, path: &Path, exclusive: bool) -> Result<()> {
    let attempt = if exclusive {
        file.try_lock()
    } else {
        file.try_lock_shared()
    };
    match attempt {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(Error::Locked {
            path: path.to_path_buf(),
        }),
        Err(TryLockError::Error(e)) => Err(Error::Io(e)),
    }
}

/// Byte ranges of `new` that differ from `old`, page aligned, with adjacent
/// pages merged into one range.
fn dirty_ranges(old: &[u8], new: &[u8]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for start in (0..new.len()).step_by(PAGE) {
        let end = (start + PAGE).min(new.len());
        if old.get(start..end) == Some(&new[start..end]) {
            continue;
        }
        match ranges.last_mut() {
            Some(last) if last.end == start => last.end = end,
            _ => ranges.push(start..end),
        }
    }
    ranges
}

fn load(file: &mut File) -> Result<Option<(Superblock, GroupNode)>> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(file_reader::parse(&bytes)?))
}

/// An open file and its in-memory tree.
#[derive(Debug)]
pub struct H5File {
    path: PathBuf,
    /// `None` once closed. Dropping it releases the lock.
    file: Option<File>,
    writable: bool,
    swmr: bool,
    /// The base layout was created by this handle.
    newfile: bool,
    root: GroupNode,
    /// The image last written to disk; empty until the first flush.
    image: Vec<u8>,
    /// Bytes the last flush actually wrote.
    flushed_bytes: usize,
}

impl H5File {
    /// Open `path`. Writers lock the file exclusively; plain readers take a
    /// shared lock and refuse files that still advertise a writer. SWMR
    /// readers skip both checks.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, swmr: bool) -> Result<H5File> {
        let path = path.as_ref().to_path_buf();
        let handle = if mode.is_writable() {
            Self::open_writer(path, mode, swmr)?
        } else {
            Self::open_reader(path, swmr)?
        };
        info!(
            path = %handle.path.display(),
            ?mode,
            swmr,
            new = handle.newfile,
            "opened file"
        );
        Ok(handle)
    }

    fn open_reader(path: PathBuf, swmr: bool) -> Result<H5File> {
        let mut file = File::open(&path)?;
        if !swmr {
            lock(&file, &path, false)?;
        }
        let (sb, root) = load(&mut file)?.ok_or(FormatError::SignatureNotFound)?;
        if !swmr && sb.writer_active() {
            return Err(Error::Locked { path });
        }
        Ok(H5File {
            path,
            file: Some(file),
            writable: false,
            swmr,
            newfile: false,
            root,
            image: Vec::new(),
            flushed_bytes: 0,
        })
    }

    fn open_writer(path: PathBuf, mode: OpenMode, swmr: bool) -> Result<H5File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(matches!(mode, OpenMode::Create | OpenMode::Append))
            .truncate(false)
            .open(&path)?;
        // lock before truncating so a held file is never clobbered
        lock(&file, &path, true)?;

        let existing = if mode == OpenMode::Create {
            None
        } else {
            load(&mut file)?
        };
        let root = match existing {
            Some((sb, root)) => {
                if sb.writer_active() {
                    warn!(path = %path.display(), "clearing writer flags left by an unclosed session");
                }
                root
            }
            None => GroupNode::new(),
        };

        let mut handle = H5File {
            newfile: !root.attrs.contains("qkit"),
            path,
            file: Some(file),
            writable: true,
            swmr,
            root,
            image: Vec::new(),
            flushed_bytes: 0,
        };
        handle.ensure_layout()?;
        handle.flush()?;
        Ok(handle)
    }

    fn ensure_layout(&mut self) -> Result<()> {
        if self.newfile {
            self.root.attrs.set("qkit", "1.0");
            self.root.attrs.set("NeXus_version", "4.3.0");
            let entry = self.root.require_group("entry")?;
            entry.attrs.set("NX_class", "NXentry");
            entry.attrs.set("data_latest", 0i64);
            entry.attrs.set("analysis_latest", 0i64);
            entry.attrs.set("updating", true);
            self.root
                .require_group(Folder::Data.group_path())?
                .attrs
                .set("NX_class", "NXdata");
        }
        for folder in [Folder::Data, Folder::Analysis, Folder::Views] {
            self.root.require_group(folder.group_path())?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable && self.file.is_some()
    }

    pub fn is_swmr(&self) -> bool {
        self.swmr
    }

    /// Whether this handle laid out the file.
    pub fn is_new(&self) -> bool {
        self.newfile
    }

    pub fn root(&self) -> &GroupNode {
        &self.root
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn consistency_flags(&self) -> u8 {
        match (self.is_writable(), self.swmr) {
            (false, _) => 0,
            (true, false) => FLAG_WRITE_ACCESS,
            (true, true) => FLAG_WRITE_ACCESS | FLAG_SWMR_WRITE,
        }
    }

    fn write_image(&mut self, flags: u8) -> Result<()> {
        let bytes = file_writer::serialize(&self.root, flags)?;
        let file = self.file.as_mut().ok_or(Error::ReadOnly)?;
        let mut written = 0;
        for range in dirty_ranges(&self.image, &bytes) {
            file.seek(SeekFrom::Start(range.start as u64))?;
            written += range.len();
            file.write_all(&bytes[range])?;
        }
        if bytes.len() != self.image.len() {
            file.set_len(bytes.len() as u64)?;
        }
        file.flush()?;
        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            written,
            "wrote file image"
        );
        self.image = bytes;
        self.flushed_bytes = written;
        Ok(())
    }

    /// Write the current tree to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.write_image(self.consistency_flags())
    }

    /// Re-read the file from disk. Lets SWMR readers follow a writer.
    pub fn refresh(&mut self) -> Result<()> {
        if self.writable {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(Error::ReadOnly)?;
        let (sb, root) = load(file)?.ok_or(FormatError::SignatureNotFound)?;
        if !self.swmr && sb.writer_active() {
            return Err(Error::Locked {
                path: self.path.clone(),
            });
        }
        self.root = root;
        Ok(())
    }

    /// Create a dataset and return its url.
    ///
    /// Names in the data folder are final; in the other folders an existing
    /// dataset of the same name is replaced.
    pub fn create_dataset(&mut self, spec: &DatasetSpec) -> Result<String> {
        self.ensure_writable()?;
        let node = spec.build()?;
        let url = self.insert_dataset(spec.folder, &spec.name, node)?;
        info!(
            url = %url,
            ds_type = ?spec.ds_type,
            dim = spec.dim,
            tracelength = spec.tracelength,
            "created dataset"
        );
        Ok(url)
    }

    pub(crate) fn insert_dataset(&mut self, folder: Folder, name: &str, node: DatasetNode) -> Result<String> {
        self.ensure_writable()?;
        let group = self.root.require_group(folder.group_path())?;
        if group.get(name).is_some() {
            if folder == Folder::Data {
                return Err(Error::DuplicateDataset {
                    folder: folder.to_string(),
                    name: name.to_string(),
                });
            }
            warn!(folder = %folder, name, "replacing existing dataset");
            group.remove(name);
        }
        group.insert(name, Node::Dataset(node))?;
        self.flush()?;
        Ok(folder.url(name))
    }

    /// Append `payload` to the dataset at `url` and flush.
    pub fn append(&mut self, url: &str, payload: &Payload, opts: AppendOptions) -> Result<()> {
        self.ensure_writable()?;
        let ds = self.dataset_mut(url)?;
        append::apply(ds, url, payload, opts)?;
        debug!(url, shape = ?ds.shape, fill = ?append::fill_of(ds), "appended");
        self.flush()
    }

    pub fn exists(&self, url: &str) -> bool {
        self.attributes(url).is_ok()
    }

    fn attributes(&self, url: &str) -> Result<&Attributes> {
        if url.trim_matches('/').is_empty() {
            return Ok(&self.root.attrs);
        }
        self.root
            .resolve(url)
            .map(Node::attrs)
            .ok_or_else(|| Error::NotFound(url.to_string()))
    }

    fn attributes_mut(&mut self, url: &str) -> Result<&mut Attributes> {
        if url.trim_matches('/').is_empty() {
            return Ok(&mut self.root.attrs);
        }
        self.root
            .resolve_mut(url)
            .map(Node::attrs_mut)
            .ok_or_else(|| Error::NotFound(url.to_string()))
    }

    /// The dataset at `url`.
    pub fn dataset(&self, url: &str) -> Result<&DatasetNode> {
        self.root
            .resolve(url)
            .ok_or_else(|| Error::NotFound(url.to_string()))?
            .as_dataset()
            .ok_or_else(|| Error::NotADataset(url.to_string()))
    }

    fn dataset_mut(&mut self, url: &str) -> Result<&mut DatasetNode> {
        self.root
            .resolve_mut(url)
            .ok_or_else(|| Error::NotFound(url.to_string()))?
            .as_dataset_mut()
            .ok_or_else(|| Error::NotADataset(url.to_string()))
    }

    pub fn shape(&self, url: &str) -> Result<Vec<u64>> {
        Ok(self.dataset(url)?.shape.clone())
    }

    /// All elements in row-major order.
    pub fn read_f64(&self, url: &str) -> Result<Vec<f64>> {
        Ok(self.dataset(url)?.to_f64()?)
    }

    pub fn read_text(&self, url: &str) -> Result<Vec<String>> {
        Ok(self.dataset(url)?.to_text()?)
    }

    /// Attribute `name` of the object at `url` (`/` for the root group).
    pub fn attr(&self, url: &str, name: &str) -> Result<Option<AttrValue>> {
        Ok(self.attributes(url)?.get(name).cloned())
    }

    pub fn attrs(&self, url: &str) -> Result<Vec<(String, AttrValue)>> {
        Ok(self
            .attributes(url)?
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect())
    }

    /// Set an attribute and flush.
    pub fn set_attr(&mut self, url: &str, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.set_attrs(url, [(name.to_string(), value.into())])
    }

    /// Set several attributes with a single flush.
    pub fn set_attrs(
        &mut self,
        url: &str,
        attrs: impl IntoIterator<Item = (String, AttrValue)>,
    ) -> Result<()> {
        self.ensure_writable()?;
        let target = self.attributes_mut(url)?;
        for (name, value) in attrs {
            target.set(&name, value);
        }
        self.flush()
    }

    /// Names of the datasets in `folder`, in creation order.
    pub fn list(&self, folder: Folder) -> Vec<String> {
        self.root
            .resolve(folder.group_path())
            .and_then(Node::as_group)
            .map(|g| {
                g.children()
                    .filter(|(_, node)| node.as_dataset().is_some())
                    .map(|(name, _)| name.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn finish(&mut self, error: Option<&str>) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = if self.writable {
            if self.newfile {
                if let Some(entry) = self.root.resolve_mut("entry") {
                    let attrs = entry.attrs_mut();
                    attrs.set("updating", false);
                    if let Some(message) = error {
                        attrs.set("error", message);
                    }
                }
            }
            self.write_image(0).and_then(|()| {
                self.file
                    .as_ref()
                    .map_or(Ok(()), |f| f.sync_all().map_err(Error::from))
            })
        } else {
            Ok(())
        };
        self.file = None;
        info!(path = %self.path.display(), error, "closed file");
        result
    }

    /// Mark the session finished, clear the writer flags and release the
    /// lock.
    pub fn close(mut self) -> Result<()> {
        self.finish(None)
    }

    /// Like [`close`](Self::close), recording `message` as the `error`
    /// attribute of `/entry` on files this handle created.
    pub fn close_with_error(mut self, message: &str) -> Result<()> {
        self.finish(Some(message))
    }
}

impl Drop for H5File {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.finish(None) {
                warn!(path = %self.path.display(), error = %e, "failed to close file cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.h5");
        (dir, path)
    }

    #[test]
    fn new_file_gets_base_layout() {
        let (_dir, path) = scratch();
        let file = H5File::open(&path, OpenMode::Create, false).unwrap();
        assert!(file.is_new());
        assert_eq!(file.attr("/", "qkit").unwrap(), Some(AttrValue::from("1.0")));
        assert_eq!(file.attr("/entry", "updating").unwrap(), Some(AttrValue::Bool(true)));
        assert_eq!(
            file.attr("/entry/data0", "NX_class").unwrap(),
            Some(AttrValue::from("NXdata"))
        );
        assert!(file.exists("/entry/analysis0"));
        assert!(file.exists("/entry/views"));
        file.close().unwrap();

        let reread = H5File::open(&path, OpenMode::Read, false).unwrap();
        assert_eq!(reread.attr("/entry", "updating").unwrap(), Some(AttrValue::Bool(false)));
        assert!(!reread.is_new());
    }

    #[test]
    fn dirty_ranges_merge_adjacent_pages() {
        let old = vec![0u8; 5 * PAGE];
        let mut new = old.clone();
        new[10] = 1;
        new[PAGE + 3] = 1;
        new[4 * PAGE] = 1;
        new.extend_from_slice(&[7; 100]);
        assert_eq!(
            dirty_ranges(&old, &new),
            vec![0..2 * PAGE, 4 * PAGE..5 * PAGE + 100]
        );
        assert!(dirty_ranges(&new, &new).is_empty());
        assert_eq!(dirty_ranges(&[], &new[..10]), vec![0..10]);
    }

    #[test]
    fn flush_writes_only_changed_pages() {
        let (_dir, path) = scratch();
        let mut file = H5File::open(&path, OpenMode::Create, false).unwrap();
        let spec = DatasetSpec::new("m", DsType::Matrix, Folder::Data).tracelength(100);
        let url = file.create_dataset(&spec).unwrap();
        let row: Vec<f64> = (0..100).map(f64::from).collect();
        for _ in 0..400 {
            file.append(&url, &Payload::from(row.clone()), AppendOptions::default())
                .unwrap();
        }

        file.append(&url, &Payload::from(row.clone()), AppendOptions::default())
            .unwrap();
        let image_len = file.image.len();
        assert!(image_len > 160_000);
        assert!(file.flushed_bytes > 0);
        assert!(file.flushed_bytes * 4 < image_len, "{} of {image_len}", file.flushed_bytes);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), image_len as u64);
        file.close().unwrap();

        let reread = H5File::open(&path, OpenMode::Read, false).unwrap();
        let values = reread.read_f64(&url).unwrap();
        assert_eq!(values.len(), 401 * 100);
        assert_eq!(&values[400 * 100..], row.as_slice());
    }

    #[test]
    fn chunking_follows_dimension() {
        let (_dir, path) = scratch();
        let mut file = H5File::open(&path, OpenMode::Create, false).unwrap();
        let spec = DatasetSpec::new("amp", DsType::Box, Folder::Data).tracelength(100);
        let url = file.create_dataset(&spec).unwrap();
        assert_eq!(url, "/entry/data0/amp");
        let ds = file.dataset(&url).unwrap();
        assert_eq!(ds.shape, vec![0, 0, 0]);
        assert_eq!(ds.chunks.as_deref(), Some(&[5, 5, 100][..]));
        assert_eq!(ds.attrs.get("ds_type"), Some(&AttrValue::I64(3)));
        assert_eq!(ds.attrs.get("fill"), Some(&AttrValue::I64Array(vec![0, 0, 0])));

        let text = DatasetSpec::new("log", DsType::Txt, Folder::Analysis);
        let url = file.create_dataset(&text).unwrap();
        let ds = file.dataset(&url).unwrap();
        assert_eq!(ds.element_type(), ElementType::Text);
        assert_eq!(ds.chunks.as_deref(), Some(&[64][..]));

        let flat = DatasetSpec::new("m", DsType::Matrix, Folder::Analysis);
        let url = file.create_dataset(&flat).unwrap();
        assert_eq!(file.dataset(&url).unwrap().chunks.as_deref(), Some(&[5, 1][..]));
    }

    #[test]
    fn bad_dimension_is_rejected() {
        let (_dir, path) = scratch();
        let mut file = H5File::open(&path, OpenMode::Create, false).unwrap();
        let spec = DatasetSpec::new("x", DsType::Vector, Folder::Data).dim(4);
        assert!(matches!(file.create_dataset(&spec), Err(Error::InvalidDimension(4))));
    }

    #[test]
    fn read_handle_refuses_writes() {
        let (_dir, path) = scratch();
        H5File::open(&path, OpenMode::Create, false).unwrap().close().unwrap();
        let mut file = H5File::open(&path, OpenMode::Read, false).unwrap();
        let spec = DatasetSpec::new("x", DsType::Vector, Folder::Data);
        assert!(matches!(file.create_dataset(&spec), Err(Error::ReadOnly)));
        assert!(matches!(file.flush(), Err(Error::ReadOnly)));
        assert!(matches!(file.set_attr("/", "a", 1i64), Err(Error::ReadOnly)));
    }

    #[test]
    fn missing_file_in_read_write_mode() {
        let (_dir, path) = scratch();
        let err = H5File::open(&path, OpenMode::ReadWrite, false).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn attributes_on_missing_objects() {
        let (_dir, path) = scratch();
        let file = H5File::open(&path, OpenMode::Create, false).unwrap();
        assert!(matches!(file.attr("/entry/nope", "x"), Err(Error::NotFound(_))));
        assert!(matches!(file.read_f64("/entry/data0"), Err(Error::NotADataset(_))));
        assert!(file.list(Folder::Data).is_empty());
    }
}
