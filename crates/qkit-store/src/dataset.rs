//! Dataset handles with deferred creation.
//!
//! Shape details such as the trace length are unknown until the first data
//! arrives, so a [`Dataset`] only records its metadata and creates the file
//! object on its first append.

use chrono::Utc;
use qkit_format::{AttrValue, ElementType};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::file::{DatasetSpec, H5File};
use crate::types::{AppendOptions, DsType, Folder, Payload};

/// Suffix of the companion dataset holding append times.
const TIMESTAMP_SUFFIX: &str = "_ts";

fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

fn folder_of(url: &str) -> Result<Folder> {
    [Folder::Data, Folder::Analysis, Folder::Views]
        .into_iter()
        .find(|f| {
            url.strip_prefix(f.group_path())
                .is_some_and(|rest| rest.starts_with('/'))
        })
        .ok_or_else(|| Error::InvalidFolder(url.to_string()))
}

fn string_attr(file: &H5File, url: &str, name: &str) -> Result<Option<String>> {
    Ok(file
        .attr(url, name)?
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty()))
}

/// Rank and kind of the timestamp dataset kept next to a dataset of
/// `ds_type`.
fn timestamp_kind(ds_type: DsType) -> Option<(DsType, u8)> {
    match ds_type {
        DsType::Vector => Some((DsType::Vector, 1)),
        DsType::Matrix => Some((DsType::Vector, 1)),
        DsType::Box => Some((DsType::Matrix, 2)),
        _ => None,
    }
}

/// A dataset in a measurement file, created on first append.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    folder: Folder,
    url: String,
    ds_type: DsType,
    dim: u8,
    element_type: ElementType,
    unit: String,
    comment: String,
    x_url: Option<String>,
    y_url: Option<String>,
    z_url: Option<String>,
    meta: Vec<(String, AttrValue)>,
    save_timestamp: bool,
    created: bool,
    next_matrix: bool,
    ts_url: Option<String>,
}

impl Dataset {
    /// A handle for a dataset that does not exist yet. The name is
    /// lowercased and spaces become underscores.
    pub fn new(name: &str, ds_type: DsType, folder: Folder) -> Self {
        let name = normalize_name(name);
        Self {
            url: folder.url(&name),
            name,
            folder,
            ds_type,
            dim: ds_type.dim(),
            element_type: if ds_type == DsType::Txt {
                ElementType::Text
            } else {
                ElementType::F32
            },
            unit: String::new(),
            comment: String::new(),
            x_url: None,
            y_url: None,
            z_url: None,
            meta: Vec::new(),
            save_timestamp: false,
            created: false,
            next_matrix: false,
            ts_url: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Link the first axis to `axis`.
    pub fn x(mut self, axis: &Dataset) -> Self {
        self.x_url = Some(axis.url.clone());
        self
    }

    pub fn y(mut self, axis: &Dataset) -> Self {
        self.y_url = Some(axis.url.clone());
        self
    }

    pub fn z(mut self, axis: &Dataset) -> Self {
        self.z_url = Some(axis.url.clone());
        self
    }

    /// Override the rank implied by the dataset type.
    pub fn dim(mut self, dim: u8) -> Self {
        self.dim = dim;
        self
    }

    pub fn element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    /// Extra attribute written when the dataset is created.
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.meta.push((name.into(), value.into()));
        self
    }

    /// Record the unix time of every append in `<name>_ts`.
    pub fn save_timestamp(mut self, enabled: bool) -> Self {
        self.save_timestamp = enabled;
        self
    }

    /// Handle for an existing dataset.
    pub fn open(file: &H5File, url: &str) -> Result<Self> {
        let node = file.dataset(url)?;
        let rank = node.rank() as u8;
        let element_type = node.element_type();
        let folder = folder_of(url)?;
        let name = url.rsplit('/').next().unwrap_or(url).to_string();
        let ds_type = file
            .attr(url, "ds_type")?
            .and_then(|v| v.as_i64())
            .and_then(DsType::from_code)
            .unwrap_or(DsType::Vector);
        let ts_url = format!("{url}{TIMESTAMP_SUFFIX}");
        let ts_url = file.dataset(&ts_url).is_ok().then_some(ts_url);

        Ok(Self {
            folder,
            url: url.to_string(),
            ds_type,
            dim: rank,
            element_type,
            unit: string_attr(file, url, "unit")?.unwrap_or_default(),
            comment: string_attr(file, url, "comment")?.unwrap_or_default(),
            x_url: string_attr(file, url, "x_ds_url")?,
            y_url: string_attr(file, url, "y_ds_url")?,
            z_url: string_attr(file, url, "z_ds_url")?,
            meta: Vec::new(),
            save_timestamp: ts_url.is_some(),
            created: true,
            next_matrix: false,
            ts_url,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ds_type(&self) -> DsType {
        self.ds_type
    }

    pub fn folder(&self) -> Folder {
        self.folder
    }

    pub fn unit_label(&self) -> &str {
        &self.unit
    }

    pub fn x_url(&self) -> Option<&str> {
        self.x_url.as_deref()
    }

    pub fn y_url(&self) -> Option<&str> {
        self.y_url.as_deref()
    }

    pub fn z_url(&self) -> Option<&str> {
        self.z_url.as_deref()
    }

    /// Whether the file object exists.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Url of the timestamp dataset, once it exists.
    pub fn timestamp_url(&self) -> Option<&str> {
        self.ts_url.as_deref()
    }

    /// Start a new slice with the next append.
    pub fn next_matrix(&mut self) {
        self.next_matrix = true;
    }

    fn metadata(&self) -> Vec<(String, AttrValue)> {
        let mut attrs = vec![
            ("comment".to_string(), AttrValue::from(self.comment.as_str())),
            ("ds_url".to_string(), AttrValue::from(self.url.as_str())),
        ];
        if self.ds_type != DsType::Txt {
            attrs.push(("unit".to_string(), AttrValue::from(self.unit.as_str())));
            for (key, url) in [
                ("x_ds_url", &self.x_url),
                ("y_ds_url", &self.y_url),
                ("z_ds_url", &self.z_url),
            ] {
                if let Some(url) = url {
                    attrs.push((key.to_string(), AttrValue::from(url.as_str())));
                }
            }
        }
        attrs.extend(self.meta.iter().cloned());
        attrs
    }

    fn create(&mut self, file: &mut H5File, first: &Payload) -> Result<()> {
        let tracelength = match first {
            Payload::Text(_) => 0,
            Payload::Values(v) => v.len() as u64,
        };
        // checked before anything is written, so a refusal leaves no dataset
        let ts_kind = if self.save_timestamp {
            Some(timestamp_kind(self.ds_type).ok_or_else(|| {
                Error::Unsupported(format!("timestamps for {:?} datasets", self.ds_type))
            })?)
        } else {
            None
        };

        let mut spec = DatasetSpec::new(self.name.clone(), self.ds_type, self.folder)
            .tracelength(tracelength)
            .dim(self.dim)
            .element_type(self.element_type);
        spec.meta = self.metadata();
        file.create_dataset(&spec)?;

        if let Some((ts_type, ts_dim)) = ts_kind {
            let mut ts = DatasetSpec::new(format!("{}{TIMESTAMP_SUFFIX}", self.name), ts_type, self.folder)
                .tracelength(1)
                .dim(ts_dim)
                .element_type(ElementType::F64)
                .meta("name", "measurement_time")
                .meta("unit", "s");
            if matches!(self.ds_type, DsType::Matrix | DsType::Box) {
                ts = ts.meta("x_ds_url", self.x_url.clone().unwrap_or_default());
            }
            if self.ds_type == DsType::Box {
                ts = ts.meta("y_ds_url", self.y_url.clone().unwrap_or_default());
            }
            self.ts_url = Some(file.create_dataset(&ts)?);
        }
        self.created = true;
        Ok(())
    }

    /// Append one value, trace or text line.
    ///
    /// `reset` overwrites the current trace (or replaces a 1-D dataset with
    /// several values), `pointwise` places a single value inside a matrix.
    pub fn append(
        &mut self,
        file: &mut H5File,
        payload: impl Into<Payload>,
        reset: bool,
        pointwise: bool,
    ) -> Result<()> {
        let payload = payload.into();
        if !self.created {
            self.create(file, &payload)?;
        }
        let opts = AppendOptions {
            next_matrix: self.next_matrix,
            reset,
            pointwise,
        };
        file.append(&self.url, &payload, opts)?;
        if let Some(ts_url) = &self.ts_url {
            let now = Utc::now().timestamp_micros() as f64 * 1e-6;
            let ts_opts = AppendOptions {
                pointwise: true,
                ..opts
            };
            file.append(ts_url, &Payload::from(now), ts_opts)?;
        }
        self.next_matrix = false;
        Ok(())
    }

    /// Append `value` as pretty-printed JSON with sorted keys. Text datasets
    /// only.
    pub fn append_json<T: Serialize>(&mut self, file: &mut H5File, value: &T) -> Result<()> {
        if self.ds_type != DsType::Txt {
            return Err(Error::Unsupported(format!(
                "JSON lines in {:?} dataset '{}'",
                self.ds_type, self.url
            )));
        }
        let value = serde_json::to_value(value)?;
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut ser)?;
        let text = String::from_utf8_lossy(&out).into_owned();
        self.append(file, text, false, false)
    }

    /// Write a whole coordinate or vector at once, replacing earlier
    /// content.
    pub fn add(&mut self, file: &mut H5File, payload: impl Into<Payload>) -> Result<()> {
        match self.ds_type {
            DsType::Coordinate | DsType::Vector => self.append(file, payload, true, false),
            other => {
                debug!(url = %self.url, ?other, "add is only for 1-D data");
                Err(Error::Unsupported(format!("add on {other:?} dataset '{}'", self.url)))
            }
        }
    }
}
