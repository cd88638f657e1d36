//! Durable storage of named text records.
//!
//! The conversation store persists itself as a single JSON record.  [`Storage`] abstracts over
//! where that record lives: [`MemoryStorage`] keeps records in a map, [`FileStorage`] keeps one
//! `<name>.json` file per record in a directory.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Read and write named text records.
pub trait Storage {
    /// Read the record called `name`, or `None` if it was never written.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Replace the record called `name`.
    fn write(&mut self, name: &str, value: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&self, name: &str) -> Result<Option<String>> {
        (**self).read(name)
    }

    fn write(&mut self, name: &str, value: &str) -> Result<()> {
        (**self).write(name, value)
    }
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: HashMap<String, String>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-populated with one record.
    pub fn with_record(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut records = HashMap::new();
        records.insert(name.into(), value.into());
        Self { records }
    }

    /// Borrow a record without going through the trait.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.records.get(name).map(String::as_str)
    }
}

impl Storage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.records.get(name).cloned())
    }

    fn write(&mut self, name: &str, value: &str) -> Result<()> {
        self.records.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// Records held as files in a directory.
///
/// Writes go to a temporary file that is renamed over the record, so a crash mid-write leaves
/// the previous contents intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for records, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            Error::io(format!("failed to create {}", dir.display()), err)
        })?;
        Ok(Self { dir })
    }

    /// The directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(Error::storage(format!("invalid record name {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl Storage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(format!("failed to read {}", path.display()), err)),
        }
    }

    fn write(&mut self, name: &str, value: &str) -> Result<()> {
        let path = self.path_for(name)?;
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        let mut file = fs::File::create(&tmp)
            .map_err(|err| Error::io(format!("failed to create {}", tmp.display()), err))?;
        file.write_all(value.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|err| Error::io(format!("failed to write {}", tmp.display()), err))?;
        drop(file);
        fs::rename(&tmp, &path)
            .map_err(|err| Error::io(format!("failed to replace {}", path.display()), err))
    }
}
