//! Per-profile system prompts loaded from disk.
//!
//! Layout: `{root}/{service}/{profile}/system.txt`. The whole tree is read
//! into an immutable [`PromptSnapshot`]; [`PromptStore::reload`] builds a
//! fresh snapshot off to the side and publishes it with a single pointer
//! swap, so a lookup sees either the old tree or the new one, never a mix.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use picker_core::{PickerError, Service};

const PROMPT_FILE: &str = "system.txt";

/// Normalize a quality profile name into its directory key.
///
/// Trimmed, lowercased, with whitespace runs collapsed to one `-`.
///
/// # Examples
///
/// ```
/// use picker_engine::store::profile_key;
///
/// assert_eq!(profile_key("HD-1080p"), "hd-1080p");
/// assert_eq!(profile_key("  Ultra  HD "), "ultra-hd");
/// ```
pub fn profile_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[derive(Debug, Clone)]
enum PromptEntry {
    Loaded(Arc<str>),
    Unreadable { path: PathBuf, reason: String },
}

/// An immutable view of the prompt tree at one point in time.
#[derive(Debug, Default)]
pub struct PromptSnapshot {
    entries: HashMap<Service, BTreeMap<String, PromptEntry>>,
}

impl PromptSnapshot {
    /// Read every `system.txt` under `root`.
    ///
    /// A missing root or service directory yields an empty section. A
    /// profile directory without `system.txt` is skipped; one whose file
    /// cannot be read, is not UTF-8, or is blank is kept as unreadable so
    /// lookups can tell it apart from "no prompt".
    pub fn scan(root: &Path) -> Self {
        let mut entries = HashMap::new();

        if !root.is_dir() {
            tracing::info!(
                root = %root.display(),
                "prompts directory not found, AI selection disabled for all profiles"
            );
            return Self { entries };
        }

        for service in Service::ALL {
            entries.insert(service, scan_service(&root.join(service.as_str()), service));
        }

        let snapshot = Self { entries };
        if snapshot.loaded_count() == 0 {
            tracing::info!(
                root = %root.display(),
                "no prompts found, AI selection disabled for all profiles"
            );
        }
        snapshot
    }

    /// Resolve the prompt for a service and quality profile name.
    ///
    /// Returns `Ok(None)` when no directory exists for the profile.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::PromptRead`] if the directory exists but its
    /// prompt file was unusable at the last load.
    pub fn lookup(&self, service: Service, profile_name: &str) -> Result<Option<Arc<str>>, PickerError> {
        let key = profile_key(profile_name);
        match self.entries.get(&service).and_then(|profiles| profiles.get(&key)) {
            None => Ok(None),
            Some(PromptEntry::Loaded(text)) => Ok(Some(Arc::clone(text))),
            Some(PromptEntry::Unreadable { path, reason }) => Err(PickerError::PromptRead {
                path: path.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Number of usable prompts across all services.
    pub fn loaded_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(|profiles| profiles.values())
            .filter(|entry| matches!(entry, PromptEntry::Loaded(_)))
            .count()
    }

    /// Keys of usable prompts for `service`, sorted.
    pub fn profiles(&self, service: Service) -> Vec<String> {
        self.entries
            .get(&service)
            .map(|profiles| {
                profiles
                    .iter()
                    .filter(|(_, entry)| matches!(entry, PromptEntry::Loaded(_)))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys and failure reasons of unusable prompts for `service`, sorted.
    pub fn unreadable(&self, service: Service) -> Vec<(String, String)> {
        self.entries
            .get(&service)
            .map(|profiles| {
                profiles
                    .iter()
                    .filter_map(|(key, entry)| match entry {
                        PromptEntry::Unreadable { reason, .. } => Some((key.clone(), reason.clone())),
                        PromptEntry::Loaded(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn scan_service(dir: &Path, service: Service) -> BTreeMap<String, PromptEntry> {
    let mut profiles = BTreeMap::new();

    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return profiles,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list prompt directory");
            return profiles;
        }
    };

    // Sorted so colliding keys resolve the same way on every load.
    let mut profile_dirs: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    profile_dirs.sort();

    for profile_dir in profile_dirs {
        let Some(name) = profile_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let path = profile_dir.join(PROMPT_FILE);
        if !path.exists() {
            tracing::debug!(%service, profile = %name, "no {PROMPT_FILE}, skipping");
            continue;
        }

        let entry = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => PromptEntry::Unreadable {
                path,
                reason: "prompt file is empty".into(),
            },
            Ok(text) => {
                tracing::info!(%service, profile = %name, "loaded prompt");
                PromptEntry::Loaded(Arc::from(text.trim()))
            }
            Err(e) => PromptEntry::Unreadable {
                path,
                reason: e.to_string(),
            },
        };
        if let PromptEntry::Unreadable { path, reason } = &entry {
            tracing::warn!(%service, profile = %name, path = %path.display(), %reason, "prompt unreadable");
        }
        profiles.insert(profile_key(&name), entry);
    }

    profiles
}

/// Hot-reloadable prompt cache.
///
/// Readers clone the current `Arc<PromptSnapshot>` and work on it without
/// holding any lock; the write lock is held only for the pointer swap.
///
/// # Examples
///
/// ```
/// use picker_core::Service;
/// use picker_engine::store::PromptStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = PromptStore::load(dir.path());
/// assert!(store.lookup(Service::Radarr, "HD-1080p").unwrap().is_none());
///
/// let profile = dir.path().join("radarr/hd-1080p");
/// std::fs::create_dir_all(&profile).unwrap();
/// std::fs::write(profile.join("system.txt"), "Prefer small x265 encodes.").unwrap();
///
/// assert_eq!(store.reload(), 1);
/// assert!(store.lookup(Service::Radarr, "HD-1080p").unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct PromptStore {
    root: PathBuf,
    current: RwLock<Arc<PromptSnapshot>>,
}

impl PromptStore {
    /// Scan `root` and build a store. A missing directory is not an error.
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let snapshot = PromptSnapshot::scan(&root);
        Self {
            root,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Directory this store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<PromptSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// See [`PromptSnapshot::lookup`].
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::PromptRead`] for an unusable prompt file.
    pub fn lookup(&self, service: Service, profile_name: &str) -> Result<Option<Arc<str>>, PickerError> {
        self.snapshot().lookup(service, profile_name)
    }

    /// Keys of usable prompts for `service`, sorted.
    pub fn profiles(&self, service: Service) -> Vec<String> {
        self.snapshot().profiles(service)
    }

    /// Re-scan the root and atomically replace the snapshot.
    ///
    /// Returns the number of usable prompts in the new snapshot.
    pub fn reload(&self) -> usize {
        let fresh = Arc::new(PromptSnapshot::scan(&self.root));
        let count = fresh.loaded_count();
        for service in Service::ALL {
            tracing::info!(%service, profiles = ?fresh.profiles(service), "prompts reloaded");
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        count
    }
}
