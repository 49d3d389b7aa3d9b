//! Time-stamped file names for new measurement files.
//!
//! Every file is named after the second it was created in, either as a
//! `HHMMSS` time mark below a per-day folder, or as a base-36 UUID of the
//! unix timestamp below a run/user folder.

use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone};
use qkit_format::AttrValue;

use crate::config::StoreConfig;
use crate::error::{Error, Result};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Render a unix timestamp in base 36 over `0-9A-Z`.
pub fn encode_uuid(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// Inverse of [`encode_uuid`], case-insensitive.
pub fn decode_uuid(uuid: &str) -> Result<u64> {
    if uuid.is_empty() {
        return Err(Error::InvalidUuid(uuid.to_string()));
    }
    uuid.bytes().try_fold(0u64, |acc, b| {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == b.to_ascii_uppercase())
            .ok_or_else(|| Error::InvalidUuid(uuid.to_string()))?;
        acc.checked_mul(36)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| Error::InvalidUuid(uuid.to_string()))
    })
}

/// Names and paths derived for one new file. Every field is also written as
/// an underscore-prefixed root attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStamp {
    pub unix_timestamp: i64,
    /// `asctime`-style local time, e.g. `Mon Oct 19 14:03:05 2026`.
    pub timestamp: String,
    pub timemark: String,
    pub datemark: String,
    pub uuid: String,
    pub filename: String,
    pub relfolder: PathBuf,
    pub folder: PathBuf,
    pub relpath: PathBuf,
    pub filepath: PathBuf,
}

impl FileStamp {
    /// `(attribute name, value)` pairs as stored on the root group.
    pub fn attributes(&self) -> Vec<(String, AttrValue)> {
        let text = |name: &str, value: String| (name.to_string(), AttrValue::String(value));
        vec![
            ("_unix_timestamp".to_string(), AttrValue::I64(self.unix_timestamp)),
            text("_timestamp", self.timestamp.clone()),
            text("_timemark", self.timemark.clone()),
            text("_datemark", self.datemark.clone()),
            text("_uuid", self.uuid.clone()),
            text("_filename", self.filename.clone()),
            text("_folder", self.folder.display().to_string()),
            text("_relpath", self.relpath.display().to_string()),
            text("_filepath", self.filepath.display().to_string()),
        ]
    }
}

/// One captured creation time.
#[derive(Debug, Clone)]
pub struct DateTimeGenerator {
    unix_timestamp: i64,
    local: DateTime<Local>,
}

impl Default for DateTimeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DateTimeGenerator {
    /// Capture the current second.
    pub fn new() -> Self {
        let local = Local::now();
        Self {
            unix_timestamp: local.timestamp(),
            local,
        }
    }

    /// Use a fixed unix timestamp (seconds).
    pub fn at(unix_timestamp: i64) -> Result<Self> {
        let local = Local
            .timestamp_opt(unix_timestamp, 0)
            .earliest()
            .ok_or_else(|| Error::Config(format!("timestamp {unix_timestamp} is out of range")))?;
        Ok(Self { unix_timestamp, local })
    }

    pub fn unix_timestamp(&self) -> i64 {
        self.unix_timestamp
    }

    pub fn timemark(&self) -> String {
        self.local.format("%H%M%S").to_string()
    }

    pub fn datemark(&self) -> String {
        self.local.format("%Y%m%d").to_string()
    }

    pub fn uuid(&self) -> String {
        encode_uuid(self.unix_timestamp.max(0) as u64)
    }

    /// Derive file name and folders for a measurement called `name`.
    pub fn new_filename(&self, name: Option<&str>, config: &StoreConfig) -> FileStamp {
        let suffix = name.filter(|n| !n.is_empty());
        let with_name = |prefix: String| match suffix {
            Some(n) => format!("{prefix}_{n}"),
            None => prefix,
        };

        let (stem, relfolder) = if config.datafolder_structure == 2 {
            let stem = with_name(self.uuid());
            let run_id = config
                .run_id
                .as_deref()
                .map(|r| r.trim().replace(' ', "_").to_uppercase())
                .unwrap_or_else(|| "NO_RUN".to_string());
            let user = config
                .user
                .as_deref()
                .map(|u| u.trim().replace(' ', "_"))
                .unwrap_or_else(|| "John_Doe".to_string());
            let rel = PathBuf::from(run_id).join(user).join(&stem);
            (stem, rel)
        } else {
            let stem = with_name(self.timemark());
            let rel = PathBuf::from(self.datemark()).join(&stem);
            (stem, rel)
        };

        let filename = format!("{stem}.h5");
        let folder = config.datadir.join(&relfolder);
        FileStamp {
            unix_timestamp: self.unix_timestamp,
            timestamp: self.local.format("%a %b %e %H:%M:%S %Y").to_string(),
            timemark: self.timemark(),
            datemark: self.datemark(),
            uuid: self.uuid(),
            relpath: relfolder.join(&filename),
            filepath: folder.join(&filename),
            filename,
            relfolder,
            folder,
        }
    }
}
