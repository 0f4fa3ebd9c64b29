//! Program catalog
//!
//! Programs are kept as one JSON file per program inside a folder. The whole
//! folder is read on open; saves overwrite the program's file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Program;

/// Errors from the program catalog
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid program file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid program name: '{0}'")]
    InvalidName(String),
}

/// Lookup of programs by name, consumed by the engine during recovery
pub trait ProgramCatalog {
    /// All known programs keyed by name
    fn programs(&self) -> HashMap<String, Program>;
}

impl ProgramCatalog for HashMap<String, Program> {
    fn programs(&self) -> HashMap<String, Program> {
        self.clone()
    }
}

/// Folder of `<name>.json` program files
pub struct FolderProgramStore {
    /// Folder holding the program files
    path: PathBuf,
    /// Programs loaded from the folder
    programs: HashMap<String, Program>,
}

impl FolderProgramStore {
    /// Open the folder, creating it if needed, and load every program in it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let mut store = Self {
            path,
            programs: HashMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Folder the programs are stored in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read every program file in the folder
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut programs = HashMap::new();
        for entry in fs::read_dir(&self.path).map_err(io_err)? {
            let file_path = entry.map_err(io_err)?.path();
            if !file_path.is_file()
                || file_path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let program = read_program(&file_path)?;
            programs.insert(program.name.clone(), program);
        }

        tracing::debug!("Loaded {} programs from {}", programs.len(), self.path.display());
        self.programs = programs;
        Ok(())
    }

    /// Look up a program by name
    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    /// Program names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.programs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Save a program, replacing any program with the same name
    pub fn save(&mut self, program: Program) -> Result<(), StoreError> {
        let file_path = self.file_path(&program.name)?;
        let content = serde_json::to_string_pretty(&program).map_err(|source| StoreError::Parse {
            path: file_path.clone(),
            source,
        })?;
        fs::write(&file_path, content).map_err(|source| StoreError::Io {
            path: file_path.clone(),
            source,
        })?;
        self.programs.insert(program.name.clone(), program);
        Ok(())
    }

    /// Delete a program. Unknown names are ignored.
    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        if self.programs.remove(name).is_none() {
            return Ok(());
        }
        let file_path = self.file_path(name)?;
        match fs::remove_file(&file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: file_path,
                source,
            }),
        }
    }

    fn file_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.path.join(format!("{name}.json")))
    }
}

impl ProgramCatalog for FolderProgramStore {
    fn programs(&self) -> HashMap<String, Program> {
        self.programs.clone()
    }
}

fn read_program(path: &Path) -> Result<Program, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Segment;
    use tempfile::TempDir;

    #[test]
    fn test_save_reload_delete() {
        let dir = TempDir::new().unwrap();
        let mut store = FolderProgramStore::open(dir.path().join("programs")).unwrap();
        assert!(store.names().is_empty());

        store
            .save(Program::new("Bisque", vec![Segment::new("up", 950.0, 480.0)]))
            .unwrap();
        store
            .save(Program::new("Bisque", vec![Segment::new("up", 1000.0, 480.0)]))
            .unwrap();

        let reopened = FolderProgramStore::open(store.path()).unwrap();
        assert_eq!(reopened.names(), vec!["Bisque".to_string()]);
        assert_eq!(
            reopened.get("Bisque").unwrap().points[0].target_temperature,
            1000.0
        );

        store.delete("Bisque").unwrap();
        store.delete("Missing").unwrap();
        let reopened = FolderProgramStore::open(store.path()).unwrap();
        assert!(reopened.programs().is_empty());
    }

    #[test]
    fn test_rejects_path_names() {
        let dir = TempDir::new().unwrap();
        let mut store = FolderProgramStore::open(dir.path()).unwrap();
        let result = store.save(Program::new("../escape", Vec::new()));
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn test_bad_file_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert!(matches!(
            FolderProgramStore::open(dir.path()),
            Err(StoreError::Parse { .. })
        ));
    }
}
