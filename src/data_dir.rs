use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LIBSCOPE_DATA_DIR";

/// File name of the segment store inside the data directory.
pub const STORE_FILE: &str = "segments.redb";

/// Where libscope keeps its segment store.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve and create the data directory.
    ///
    /// `--data-dir` wins, then a non-empty `LIBSCOPE_DATA_DIR`, then
    /// `$XDG_DATA_HOME/libscope`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, std::env::var_os(DATA_DIR_ENV))
    }

    fn resolve_with(
        explicit: Option<&Path>,
        env: Option<OsString>,
    ) -> Result<Self> {
        let root = match (explicit, env.filter(|v| !v.is_empty())) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(val)) => PathBuf::from(val),
            (None, None) => xdg::BaseDirectories::with_prefix("libscope")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config("no XDG data home for the segment store".into())
                })?,
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the segment store.
    pub fn segments_db(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }
}
