//! Safe extraction of downloaded build archives.

mod path;
mod zip_ops;

pub(crate) use zip_ops::extract_zip;
