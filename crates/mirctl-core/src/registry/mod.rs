//! Per-user label registry, persisted as JSON next to the user's repositories.
//!
//! A name or alias belongs to exactly one class. Adding labels either applies every
//! requested entry or, on any conflict, none of them.
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use mirctl_model::{ClassId, LabelConflict, LabelEntry};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct LabelRegistry {
    path: PathBuf,
    entries: Vec<LabelEntry>,
}

/// Outcome of [`LabelRegistry::add`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOutcome {
    pub conflicts: Vec<LabelConflict>,
    /// Entries as they would be (or now are) stored.
    pub labels: Vec<LabelEntry>,
    pub written: bool,
}

impl LabelRegistry {
    /// Load the registry at `path`; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    /// Merge `requested` into the registry.
    ///
    /// An entry whose name already exists extends that class's aliases; otherwise it becomes a
    /// new class with the next free id. A name bound to some other class is a conflict.
    /// Nothing is written on conflict or when `dry_run` is set.
    pub fn add(&mut self, requested: &[LabelEntry], dry_run: bool) -> Result<AddOutcome, CoreError> {
        let mut working = self.entries.clone();
        let mut conflicts = Vec::new();

        for entry in requested {
            let mut names = entry.all_names();
            let Some(primary) = names.next().filter(|n| !n.is_empty()) else {
                return Err(CoreError::InvalidRequest("empty label name".into()));
            };
            let index = name_index(&working);
            let target = index.get(&primary).copied();

            for name in std::iter::once(primary.clone()).chain(names) {
                if name.is_empty() {
                    continue;
                }
                if let Some(&pos) = index.get(&name) {
                    if Some(pos) != target {
                        conflicts.push(LabelConflict {
                            name,
                            existing_id: working[pos].id,
                            existing_name: working[pos].name.clone(),
                        });
                    }
                }
            }

            match target {
                Some(pos) => {
                    let known: Vec<String> = working[pos].all_names().collect();
                    for alias in &entry.aliases {
                        let norm = alias.trim().to_lowercase();
                        if !norm.is_empty() && !known.contains(&norm) {
                            working[pos].aliases.push(alias.trim().to_string());
                        }
                    }
                }
                None => {
                    let id = next_id(&working);
                    working.push(LabelEntry {
                        id,
                        name: entry.name.trim().to_string(),
                        aliases: entry.aliases.iter().map(|a| a.trim().to_string()).collect(),
                    });
                }
            }
        }

        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "label add rejected");
            return Ok(AddOutcome {
                conflicts,
                labels: self.entries.clone(),
                written: false,
            });
        }
        if dry_run {
            return Ok(AddOutcome {
                conflicts,
                labels: working,
                written: false,
            });
        }

        self.entries = working;
        self.save()?;
        Ok(AddOutcome {
            conflicts,
            labels: self.entries.clone(),
            written: true,
        })
    }

    fn save(&self) -> Result<(), CoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&self.entries)?)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// One writer lock per user registry.
///
/// Holders run load, add and save as a unit, so concurrent adds for the same user never
/// read a registry another add is about to replace.
#[derive(Default)]
pub struct RegistryLocks {
    users: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegistryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.users.lock().entry(user_id.to_string()).or_default())
    }
}

fn name_index(entries: &[LabelEntry]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (pos, entry) in entries.iter().enumerate() {
        for name in entry.all_names() {
            index.entry(name).or_insert(pos);
        }
    }
    index
}

fn next_id(entries: &[LabelEntry]) -> ClassId {
    entries.iter().map(|e| e.id + 1).max().unwrap_or(0)
}
