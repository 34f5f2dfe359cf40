//! JSON model store: one pretty-printed file per model name.

use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonModelStore {
    dir: PathBuf,
}

impl JsonModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<name>.json`
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Write `value` under `name`, replacing any previous file
    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;

        info!("Saved model {} to {:?}", name, path);
        Ok(path)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path_for(name);
        let reader = BufReader::new(File::open(&path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
