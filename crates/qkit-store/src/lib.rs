//! Incrementally appendable HDF5 measurement files in the qkit layout.
//!
//! Every file has the fixed hierarchy `/entry/data0`, `/entry/analysis0`
//! and `/entry/views`. Datasets are created lazily on their first append
//! and grow along unlimited axes; each append is flushed so concurrent
//! SWMR readers can follow a running measurement.
//!
//! # Writing
//!
//! ```no_run
//! use qkit_store::{Folder, OpenMode, Store, StoreConfig, ViewOptions};
//!
//! let config = StoreConfig::load(None)?;
//! let mut store = Store::open("resonator", OpenMode::Append, &config)?;
//!
//! let mut freq = store.add_coordinate("frequency", Folder::Data);
//! store.add(&mut freq, vec![5.0e9, 5.1e9, 5.2e9])?;
//!
//! let mut amp = store.add_value_vector("amplitude", Folder::Data, Some(&freq));
//! for value in [0.1, 0.4, 0.2] {
//!     store.append(&mut amp, value, false, false)?;
//! }
//! store.add_view("spectrum", &freq, &amp, ViewOptions::default())?;
//! store.close()?;
//! # Ok::<(), qkit_store::Error>(())
//! ```
//!
//! # Reading
//!
//! ```no_run
//! use qkit_store::{H5File, OpenMode};
//!
//! let file = H5File::open("data.h5", OpenMode::Read, false)?;
//! let values = file.read_f64("/entry/data0/amplitude")?;
//! println!("{:?} {:?}", file.shape("/entry/data0/amplitude")?, values);
//! # Ok::<(), qkit_store::Error>(())
//! ```

pub mod append;
pub mod config;
pub mod dataset;
pub mod error;
pub mod file;
pub mod filename;
pub mod logging;
pub mod store;
pub mod types;
pub mod view;

pub use config::StoreConfig;
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use file::{DatasetSpec, H5File, OpenMode};
pub use filename::{decode_uuid, encode_uuid, DateTimeGenerator, FileStamp};
pub use logging::{init_default_tracing, init_tracing, TracingConfig, TracingFormat};
pub use store::Store;
pub use types::{AppendOptions, DsType, Folder, Payload, ViewType};
pub use view::{View, ViewOptions};

// Attribute and element types appear in the public API.
pub use qkit_format::{AttrValue, ElementType};
