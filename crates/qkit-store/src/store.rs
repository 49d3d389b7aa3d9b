//! The measurement-facing entry point.

use std::fs;
use std::path::{Path, PathBuf};

use qkit_format::{AttrValue, ElementType};
use tracing::info;

use crate::config::StoreConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::file::{H5File, OpenMode};
use crate::filename::{DateTimeGenerator, FileStamp};
use crate::types::{DsType, Folder, Payload};
use crate::view::{View, ViewOptions};

/// One measurement file plus the naming information it was opened with.
#[derive(Debug)]
pub struct Store {
    file: H5File,
    filepath: PathBuf,
    folder: PathBuf,
    filename: String,
    stamp: Option<FileStamp>,
}

impl Store {
    /// Open a measurement file.
    ///
    /// `name` is used as a path when it names an existing file or is
    /// absolute. Any other name becomes the suffix of a generated,
    /// time-stamped path below `config.datadir`, whose folders are created.
    pub fn open(name: &str, mode: OpenMode, config: &StoreConfig) -> Result<Store> {
        config.validate()?;
        let candidate = Path::new(name);
        let (filepath, stamp) = if candidate.is_file() || candidate.is_absolute() {
            (std::path::absolute(candidate)?, None)
        } else {
            let stamp = DateTimeGenerator::new().new_filename(Some(name), config);
            fs::create_dir_all(&stamp.folder)?;
            (stamp.filepath.clone(), Some(stamp))
        };

        let mut file = H5File::open(&filepath, mode, config.swmr)?;
        if file.is_new() && file.is_writable() {
            let mut tags = stamp.as_ref().map(FileStamp::attributes).unwrap_or_default();
            if let Some(user) = &config.user {
                tags.push(("_user".to_string(), AttrValue::from(user.as_str())));
            }
            if let Some(run_id) = &config.run_id {
                tags.push(("_run_id".to_string(), AttrValue::from(run_id.to_uppercase())));
            }
            file.set_attrs("/", tags)?;
        }

        let folder = filepath.parent().map(Path::to_path_buf).unwrap_or_default();
        let filename = filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(path = %filepath.display(), "store ready");
        Ok(Store {
            file,
            filepath,
            folder,
            filename,
            stamp,
        })
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Naming details, when the path was generated.
    pub fn stamp(&self) -> Option<&FileStamp> {
        self.stamp.as_ref()
    }

    pub fn file(&self) -> &H5File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut H5File {
        &mut self.file
    }

    /// Text dataset, one entry per append.
    pub fn add_textlist(&self, name: &str, folder: Folder) -> Dataset {
        Dataset::new(name, DsType::Txt, folder)
    }

    /// Independent axis, stored as 64-bit floats.
    pub fn add_coordinate(&self, name: &str, folder: Folder) -> Dataset {
        Dataset::new(name, DsType::Coordinate, folder).element_type(ElementType::F64)
    }

    pub fn add_value_vector(&self, name: &str, folder: Folder, x: Option<&Dataset>) -> Dataset {
        let ds = Dataset::new(name, DsType::Vector, folder);
        match x {
            Some(x) => ds.x(x),
            None => ds,
        }
    }

    /// One trace per append; `y` varies faster than `x`.
    pub fn add_value_matrix(&self, name: &str, folder: Folder, x: Option<&Dataset>, y: Option<&Dataset>) -> Dataset {
        let mut ds = Dataset::new(name, DsType::Matrix, folder);
        if let Some(x) = x {
            ds = ds.x(x);
        }
        if let Some(y) = y {
            ds = ds.y(y);
        }
        ds
    }

    pub fn add_value_box(
        &self,
        name: &str,
        folder: Folder,
        x: Option<&Dataset>,
        y: Option<&Dataset>,
        z: Option<&Dataset>,
    ) -> Dataset {
        let mut ds = Dataset::new(name, DsType::Box, folder);
        if let Some(x) = x {
            ds = ds.x(x);
        }
        if let Some(y) = y {
            ds = ds.y(y);
        }
        if let Some(z) = z {
            ds = ds.z(z);
        }
        ds
    }

    /// View of `y` against `x`. Both must already hold data.
    pub fn add_view(&mut self, name: &str, x: &Dataset, y: &Dataset, options: ViewOptions) -> Result<View> {
        View::create(&mut self.file, name, x.url(), y.url(), options)
    }

    /// Set the `comment` attribute of the data or analysis group.
    pub fn add_comment(&mut self, comment: &str, folder: Folder) -> Result<()> {
        if folder == Folder::Views {
            return Err(Error::InvalidFolder(folder.to_string()));
        }
        self.file.set_attr(folder.group_path(), "comment", comment)
    }

    pub fn comment(&self, folder: Folder) -> Result<Option<String>> {
        Ok(self
            .file
            .attr(folder.group_path(), "comment")?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Attribute on the analysis group, picked up by file indexers.
    pub fn add_fid_param(&mut self, param: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.file.set_attr(Folder::Analysis.group_path(), param, value)
    }

    pub fn get_dataset(&self, url: &str) -> Result<Dataset> {
        Dataset::open(&self.file, url)
    }

    pub fn list_datasets(&self, folder: Folder) -> Vec<String> {
        self.file.list(folder)
    }

    pub fn append(
        &mut self,
        ds: &mut Dataset,
        payload: impl Into<Payload>,
        reset: bool,
        pointwise: bool,
    ) -> Result<()> {
        ds.append(&mut self.file, payload, reset, pointwise)
    }

    pub fn add(&mut self, ds: &mut Dataset, payload: impl Into<Payload>) -> Result<()> {
        ds.add(&mut self.file, payload)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    pub fn close(self) -> Result<()> {
        self.file.close()
    }

    /// Close, recording `message` on files this store created.
    pub fn close_with_error(self, message: &str) -> Result<()> {
        self.file.close_with_error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> StoreConfig {
        StoreConfig {
            datadir: dir.to_path_buf(),
            user: Some("ada".into()),
            run_id: Some("cooldown7".into()),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn generated_path_is_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open("resonator", OpenMode::Append, &config(dir.path())).unwrap();
        let stamp = store.stamp().unwrap().clone();
        assert!(store.filepath().starts_with(dir.path()));
        assert!(store.filename().ends_with("_resonator.h5"));
        assert!(store.filepath().is_file());
        let file = store.file();
        assert_eq!(
            file.attr("/", "_uuid").unwrap(),
            Some(AttrValue::from(stamp.uuid.as_str()))
        );
        assert_eq!(
            file.attr("/", "_unix_timestamp").unwrap(),
            Some(AttrValue::I64(stamp.unix_timestamp))
        );
        assert_eq!(file.attr("/", "_run_id").unwrap(), Some(AttrValue::from("COOLDOWN7")));
        assert_eq!(file.attr("/", "_user").unwrap(), Some(AttrValue::from("ada")));
        store.close().unwrap();
    }

    #[test]
    fn existing_path_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("given.h5");
        H5File::open(&path, OpenMode::Create, false).unwrap().close().unwrap();
        let store = Store::open(path.to_str().unwrap(), OpenMode::ReadWrite, &config(dir.path())).unwrap();
        assert!(store.stamp().is_none());
        assert_eq!(store.filename(), "given.h5");
        assert_eq!(store.file().attr("/", "_user").unwrap(), None);
    }

    #[test]
    fn comments_only_on_data_and_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open("c", OpenMode::Append, &config(dir.path())).unwrap();
        store.add_comment("cold", Folder::Data).unwrap();
        assert_eq!(store.comment(Folder::Data).unwrap().as_deref(), Some("cold"));
        assert_eq!(store.comment(Folder::Analysis).unwrap(), None);
        assert!(matches!(
            store.add_comment("x", Folder::Views),
            Err(Error::InvalidFolder(_))
        ));
        store.add_fid_param("fr", 5.1e9).unwrap();
        assert_eq!(
            store.file().attr("/entry/analysis0", "fr").unwrap(),
            Some(AttrValue::F64(5.1e9))
        );
    }

    #[test]
    fn box_handle_links_three_axes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open("b", OpenMode::Append, &config(dir.path())).unwrap();
        let x = store.add_coordinate("x", Folder::Data);
        let y = store.add_coordinate("y", Folder::Data);
        let z = store.add_coordinate("z", Folder::Data);
        let mut b = store.add_value_box("B", Folder::Data, Some(&x), Some(&y), Some(&z));
        assert_eq!(b.ds_type(), DsType::Box);
        assert_eq!(b.z_url(), Some("/entry/data0/z"));
        store.append(&mut b, vec![1.0, 2.0], false, false).unwrap();
        assert_eq!(store.file().shape("/entry/data0/b").unwrap(), vec![1, 1, 2]);
        assert_eq!(store.list_datasets(Folder::Data), vec!["b"]);
        let reopened = store.get_dataset("/entry/data0/b").unwrap();
        assert_eq!(reopened.y_url(), Some("/entry/data0/y"));
    }
}
