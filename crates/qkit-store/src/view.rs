//! Views: named overlays of existing datasets for plotting front ends.
//!
//! A view is an empty scalar dataset in `/entry/views`. Overlay `n` is the
//! attribute `xy_<n>` = `"<x url>:<y url>"`, optionally with
//! `xy_<n>_error` and `xy_<n>_filter`; `overlays` holds the newest index.

use qkit_format::{AttrValue, DatasetNode, ElementType};
use tracing::info;

use crate::error::{Error, Result};
use crate::file::H5File;
use crate::types::{DsType, Folder, ViewType};

/// Display settings of a new view.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub view_type: ViewType,
    /// Serialized into the `view_params` attribute.
    pub params: serde_json::Value,
    /// Error bars for the first overlay.
    pub error: Option<String>,
    /// Filter expression for the first overlay.
    pub filter: Option<String>,
}

/// Handle to a view dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    name: String,
    url: String,
    /// Index the next overlay will get.
    next_overlay: i64,
}

fn require_existing(file: &H5File, url: &str) -> Result<()> {
    file.dataset(url)
        .map(|_| ())
        .map_err(|_| Error::ForwardReference(url.to_string()))
}

impl View {
    /// Create (or replace) the view `name` showing `y` against `x`.
    pub fn create(file: &mut H5File, name: &str, x: &str, y: &str, options: ViewOptions) -> Result<View> {
        require_existing(file, x)?;
        require_existing(file, y)?;
        if let Some(error) = &options.error {
            require_existing(file, error)?;
        }

        let params = match &options.params {
            serde_json::Value::Null => "{}".to_string(),
            other => serde_json::to_string(other)?,
        };
        let mut node = DatasetNode::scalar(ElementType::F32);
        node.attrs.set("ds_type", DsType::View.code());
        node.attrs.set("view_type", options.view_type.code());
        node.attrs.set("view_params", params);
        let url = file.insert_dataset(Folder::Views, name, node)?;
        info!(url = %url, view_type = ?options.view_type, "created view");

        let mut view = View {
            name: name.to_string(),
            url,
            next_overlay: 0,
        };
        view.add(file, x, y, options.error.as_deref(), options.filter.as_deref())?;
        Ok(view)
    }

    /// Handle for an existing view.
    pub fn open(file: &H5File, url: &str) -> Result<View> {
        let is_view = file
            .attr(url, "ds_type")?
            .and_then(|v| v.as_i64())
            .is_some_and(|code| code == DsType::View.code());
        if !is_view {
            return Err(Error::NotFound(format!("{url} (view)")));
        }
        let next_overlay = file
            .attr(url, "overlays")?
            .and_then(|v| v.as_i64())
            .map_or(0, |n| n + 1);
        Ok(View {
            name: url.rsplit('/').next().unwrap_or(url).to_string(),
            url: url.to_string(),
            next_overlay,
        })
    }

    /// Register another overlay. `error` must already exist.
    pub fn add(
        &mut self,
        file: &mut H5File,
        x: &str,
        y: &str,
        error: Option<&str>,
        filter: Option<&str>,
    ) -> Result<()> {
        require_existing(file, x)?;
        require_existing(file, y)?;
        if let Some(error) = error {
            require_existing(file, error)?;
        }
        let n = self.next_overlay;
        let mut attrs = vec![(format!("xy_{n}"), AttrValue::from(format!("{x}:{y}")))];
        if let Some(filter) = filter {
            attrs.push((format!("xy_{n}_filter"), AttrValue::from(filter)));
        }
        if let Some(error) = error {
            attrs.push((format!("xy_{n}_error"), AttrValue::from(error)));
        }
        attrs.push(("overlays".to_string(), AttrValue::I64(n)));
        file.set_attrs(&self.url, attrs)?;
        self.next_overlay += 1;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of registered overlays.
    pub fn overlays(&self) -> usize {
        self.next_overlay as usize
    }
}
