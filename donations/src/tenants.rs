//! Registered tenants: donation keys, API credentials and per-tenant settings.
//!
//! Admin changes take effect immediately. The filesystem backend only
//! re-parses its file when the file on disk has changed.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum TenantStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("tenant file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Replacement donor name and message shown to the poller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOverride {
    pub enabled: bool,
    pub donor_name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub key: String,
    pub api_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_override: Option<DisplayOverride>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// New tenant with freshly generated key and API key.
    pub fn generate(name: &str, max_queue_size: Option<usize>) -> Self {
        Tenant {
            key: generate_key(),
            api_key: generate_api_key(),
            name: name.to_string(),
            max_queue_size,
            display_override: None,
            created_at: Utc::now(),
        }
    }

    pub fn queue_limit(&self, default: usize) -> usize {
        self.max_queue_size.unwrap_or(default)
    }

    /// The override, only when it is switched on.
    pub fn active_override(&self) -> Option<&DisplayOverride> {
        self.display_override.as_ref().filter(|o| o.enabled)
    }
}

/// `XXXX-XXXX-XXXX-XXXX` from uppercase letters and digits.
pub fn generate_key() -> String {
    let mut rng = rand::rng();
    let groups: Vec<String> = (0..KEY_GROUPS)
        .map(|_| {
            (0..KEY_GROUP_LEN)
                .map(|_| KEY_CHARSET[rng.random_range(0..KEY_CHARSET.len())] as char)
                .collect()
        })
        .collect();
    groups.join("-")
}

/// 32 hex characters.
pub fn generate_api_key() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

pub fn is_valid_key(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == KEY_GROUPS
        && groups.iter().all(|g| {
            g.len() == KEY_GROUP_LEN && g.bytes().all(|b| KEY_CHARSET.contains(&b))
        })
}

pub trait TenantStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Tenant>, TenantStoreError>;
    fn list(&self) -> Result<Vec<Tenant>, TenantStoreError>;
    fn insert(&self, tenant: Tenant) -> Result<(), TenantStoreError>;
    /// Returns whether the tenant existed.
    fn remove(&self, key: &str) -> Result<bool, TenantStoreError>;
    /// Returns the updated tenant, or `None` when the key is unknown.
    fn set_override(
        &self,
        key: &str,
        display_override: Option<DisplayOverride>,
    ) -> Result<Option<Tenant>, TenantStoreError>;
}

type TenantMap = BTreeMap<String, Tenant>;

fn sorted(tenants: &TenantMap) -> Vec<Tenant> {
    let mut list: Vec<Tenant> = tenants.values().cloned().collect();
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
    list
}

fn apply_override(
    tenants: &mut TenantMap,
    key: &str,
    display_override: Option<DisplayOverride>,
) -> Option<Tenant> {
    let tenant = tenants.get_mut(key)?;
    tenant.display_override = display_override;
    Some(tenant.clone())
}

/// Identifies one version of the tenant file.
#[derive(Clone, Copy, Debug, PartialEq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> io::Result<Option<FileStamp>> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(FileStamp {
                modified: metadata.modified()?,
                len: metadata.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

struct CachedTenants {
    stamp: FileStamp,
    tenants: TenantMap,
}

/// Tenants kept in a JSON file keyed by donation key.
///
/// Reads stat the file and reuse the last parse while it is unchanged, so
/// the request path costs one `metadata` call instead of a full read.
/// Writes are serialized, go to a sibling temp file first and are then
/// renamed over the original.
pub struct FilesystemTenantStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    cache: Mutex<Option<CachedTenants>>,
}

impl FilesystemTenantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilesystemTenantStore {
            path: path.into(),
            write_lock: Mutex::new(()),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` over the current registry, re-reading the file only if it
    /// changed since the last read.
    fn read<R>(&self, f: impl FnOnce(&TenantMap) -> R) -> Result<R, TenantStoreError> {
        let Some(stamp) = FileStamp::of(&self.path)? else {
            *self.cache.lock() = None;
            return Ok(f(&TenantMap::new()));
        };

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref().filter(|cached| cached.stamp == stamp) {
            return Ok(f(&cached.tenants));
        }

        let file = File::open(&self.path)?;
        let tenants: TenantMap = serde_json::from_reader(BufReader::new(file))?;
        tracing::debug!(path = %self.path.display(), tenants = tenants.len(), "Loaded tenant registry");
        let result = f(&tenants);
        *cache = Some(CachedTenants { stamp, tenants });
        Ok(result)
    }

    fn save(&self, tenants: &TenantMap) -> Result<(), TenantStoreError> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, tenants)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp_path, &self.path)?;

        if let Some(stamp) = FileStamp::of(&self.path)? {
            *self.cache.lock() = Some(CachedTenants {
                stamp,
                tenants: tenants.clone(),
            });
        }
        tracing::debug!(path = %self.path.display(), tenants = tenants.len(), "Saved tenant registry");
        Ok(())
    }

    fn modify<R>(&self, f: impl FnOnce(&mut TenantMap) -> R) -> Result<R, TenantStoreError> {
        let _guard = self.write_lock.lock();
        let mut tenants = self.read(TenantMap::clone)?;
        let result = f(&mut tenants);
        self.save(&tenants)?;
        Ok(result)
    }
}

impl TenantStore for FilesystemTenantStore {
    fn get(&self, key: &str) -> Result<Option<Tenant>, TenantStoreError> {
        self.read(|tenants| tenants.get(key).cloned())
    }

    fn list(&self) -> Result<Vec<Tenant>, TenantStoreError> {
        self.read(sorted)
    }

    fn insert(&self, tenant: Tenant) -> Result<(), TenantStoreError> {
        self.modify(|tenants| {
            tenants.insert(tenant.key.clone(), tenant);
        })
    }

    fn remove(&self, key: &str) -> Result<bool, TenantStoreError> {
        self.modify(|tenants| tenants.remove(key).is_some())
    }

    fn set_override(
        &self,
        key: &str,
        display_override: Option<DisplayOverride>,
    ) -> Result<Option<Tenant>, TenantStoreError> {
        self.modify(|tenants| apply_override(tenants, key, display_override))
    }
}

/// Tenants held in memory only; lost on restart.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<TenantMap>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        InMemoryTenantStore::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        InMemoryTenantStore {
            tenants: RwLock::new(tenants.into_iter().map(|t| (t.key.clone(), t)).collect()),
        }
    }
}

impl TenantStore for InMemoryTenantStore {
    fn get(&self, key: &str) -> Result<Option<Tenant>, TenantStoreError> {
        Ok(self.tenants.read().get(key).cloned())
    }

    fn list(&self) -> Result<Vec<Tenant>, TenantStoreError> {
        Ok(sorted(&self.tenants.read()))
    }

    fn insert(&self, tenant: Tenant) -> Result<(), TenantStoreError> {
        self.tenants.write().insert(tenant.key.clone(), tenant);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, TenantStoreError> {
        Ok(self.tenants.write().remove(key).is_some())
    }

    fn set_override(
        &self,
        key: &str,
        display_override: Option<DisplayOverride>,
    ) -> Result<Option<Tenant>, TenantStoreError> {
        Ok(apply_override(&mut self.tenants.write(), key, display_override))
    }
}
