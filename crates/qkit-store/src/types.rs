//! Tagged values shared across the store: dataset kinds, view kinds,
//! folders, payloads and append flags.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of dataset, stored as the integer `ds_type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DsType {
    Coordinate,
    Vector,
    Matrix,
    Box,
    Txt,
    View,
}

impl DsType {
    pub fn code(self) -> i64 {
        match self {
            DsType::Coordinate => 0,
            DsType::Vector => 1,
            DsType::Matrix => 2,
            DsType::Box => 3,
            DsType::Txt => 10,
            DsType::View => 20,
        }
    }

    pub fn from_code(code: i64) -> Option<DsType> {
        Some(match code {
            0 => DsType::Coordinate,
            1 => DsType::Vector,
            2 => DsType::Matrix,
            3 => DsType::Box,
            10 => DsType::Txt,
            20 => DsType::View,
            _ => return None,
        })
    }

    /// Number of dimensions a dataset of this kind is created with.
    pub fn dim(self) -> u8 {
        match self {
            DsType::Coordinate | DsType::Vector | DsType::Txt => 1,
            DsType::Matrix => 2,
            DsType::Box => 3,
            DsType::View => 0,
        }
    }
}

/// How a view is plotted, stored as the integer `view_type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewType {
    #[default]
    OneD,
    OneDV,
    TwoD,
    ThreeD,
    Table,
    Txt,
}

impl ViewType {
    pub fn code(self) -> i64 {
        match self {
            ViewType::OneD => 0,
            ViewType::OneDV => 1,
            ViewType::TwoD => 2,
            ViewType::ThreeD => 3,
            ViewType::Table => 4,
            ViewType::Txt => 5,
        }
    }
}

/// The three fixed groups under `/entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    Data,
    Analysis,
    Views,
}

impl Folder {
    /// Absolute path of the folder's group.
    pub fn group_path(self) -> &'static str {
        match self {
            Folder::Data => "/entry/data0",
            Folder::Analysis => "/entry/analysis0",
            Folder::Views => "/entry/views",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Folder::Data => "data",
            Folder::Analysis => "analysis",
            Folder::Views => "views",
        }
    }

    /// Absolute path of a dataset called `name` in this folder.
    pub fn url(self, name: &str) -> String {
        format!("{}/{}", self.group_path(), name)
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Folder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Folder::Data),
            "analysis" => Ok(Folder::Analysis),
            "views" | "view" => Ok(Folder::Views),
            other => Err(Error::InvalidFolder(other.to_string())),
        }
    }
}

/// One append's worth of data.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Values(Vec<f64>),
    Text(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Values(v) => v.len(),
            Payload::Text(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Values(vec![v])
    }
}

impl From<Vec<f64>> for Payload {
    fn from(v: Vec<f64>) -> Self {
        Payload::Values(v)
    }
}

impl From<&[f64]> for Payload {
    fn from(v: &[f64]) -> Self {
        Payload::Values(v.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Text(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Text(v)
    }
}

/// Flags steering where an append lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Start a new outer slice (box) or row (pointwise matrix).
    pub next_matrix: bool,
    /// Overwrite the current trace instead of adding one.
    pub reset: bool,
    /// Place a single value inside the matrix instead of adding a row.
    pub pointwise: bool,
}
