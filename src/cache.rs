use crate::remote::{AddonRecord, FileRecord};
use anyhow::{Context, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Read,
    path::{Path, PathBuf},
    sync::RwLock,
};
use time::OffsetDateTime;
use tracing::warn;

// Snapshots written by older releases are discarded wholesale on load.
pub const CACHE_VERSION: u32 = 3;

// Addon records go stale after this window; file records never do, since a
// published file's content never changes.
const FRESH_WINDOW_SECS: i64 = 48 * 60 * 60;

// Each map has its own lock so a slow fetch filling one domain never stalls
// lookups in another.
pub struct Cache {
    addons: RwLock<HashMap<i64, AddonRecord>>,
    files: RwLock<HashMap<i64, FileRecord>>,
    slug_ids: RwLock<HashMap<String, i64>>,
    last_opened_folder: RwLock<Option<PathBuf>>,
    path: PathBuf,
    store: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Snapshot {
    #[serde(rename = "addonsByID")]
    addons_by_id: HashMap<i64, AddonRecord>,
    #[serde(rename = "filesByID")]
    files_by_id: HashMap<i64, FileRecord>,
    #[serde(rename = "idsBySlug")]
    ids_by_slug: HashMap<String, i64>,
    #[serde(rename = "lastOpenedFolder")]
    last_opened_folder: Option<PathBuf>,
    version: u32,
}

impl Cache {
    pub fn empty(path: PathBuf, store: bool) -> Self {
        Self {
            addons: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            slug_ids: RwLock::new(HashMap::new()),
            last_opened_folder: RwLock::new(None),
            path,
            store,
        }
    }

    // Never touches the disk again; used by tests and --ephemeral sessions.
    pub fn ephemeral() -> Self {
        Self::empty(PathBuf::new(), false)
    }

    pub fn load(path: &Path, store: bool) -> Self {
        if !store {
            return Self::ephemeral();
        }
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::empty(path.to_path_buf(), store);
            }
            Err(err) => {
                warn!("could not read metadata cache: {err}");
                return Self::empty(path.to_path_buf(), store);
            }
        };
        let snapshot = match decode_snapshot(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("could not decode metadata cache: {err:#}");
                return Self::empty(path.to_path_buf(), store);
            }
        };
        if snapshot.version < CACHE_VERSION {
            warn!(
                "metadata cache version {} is older than {CACHE_VERSION}, discarding",
                snapshot.version
            );
            return Self::empty(path.to_path_buf(), store);
        }
        Self {
            addons: RwLock::new(snapshot.addons_by_id),
            files: RwLock::new(snapshot.files_by_id),
            slug_ids: RwLock::new(snapshot.ids_by_slug),
            last_opened_folder: RwLock::new(snapshot.last_opened_folder),
            path: path.to_path_buf(),
            store,
        }
    }

    pub fn get_addon(&self, addon_id: i64) -> Option<AddonRecord> {
        self.get_addon_at(addon_id, OffsetDateTime::now_utc().unix_timestamp())
    }

    fn get_addon_at(&self, addon_id: i64, now: i64) -> Option<AddonRecord> {
        let addons = self.addons.read().ok()?;
        let record = addons.get(&addon_id)?;
        if !record.available || now - record.last_queried >= FRESH_WINDOW_SECS {
            return None;
        }
        Some(record.clone())
    }

    pub fn put_addon(&self, record: AddonRecord) {
        self.put_addon_at(record, OffsetDateTime::now_utc().unix_timestamp());
    }

    fn put_addon_at(&self, mut record: AddonRecord, now: i64) {
        // Embedded file records never displace a file already cached.
        if let Ok(mut files) = self.files.write() {
            for file in &record.latest_files {
                files.entry(file.id).or_insert_with(|| file.clone());
            }
        }
        record.last_queried = now;
        if let Ok(mut addons) = self.addons.write() {
            addons.insert(record.id, record);
        }
    }

    pub fn get_file(&self, file_id: i64) -> Option<FileRecord> {
        let files = self.files.read().ok()?;
        let record = files.get(&file_id)?;
        if !record.available {
            return None;
        }
        Some(record.clone())
    }

    pub fn put_file(&self, record: FileRecord) {
        let Ok(mut files) = self.files.write() else {
            return;
        };
        // An available record is final; only placeholders may be replaced.
        match files.get(&record.id) {
            Some(existing) if existing.available => {}
            _ => {
                files.insert(record.id, record);
            }
        }
    }

    pub fn resolve_slug(&self, slug: &str) -> Option<i64> {
        self.slug_ids.read().ok()?.get(slug).copied()
    }

    pub fn record_slug(&self, slug: &str, addon_id: i64) {
        if let Ok(mut slug_ids) = self.slug_ids.write() {
            slug_ids.entry(slug.to_string()).or_insert(addon_id);
        }
    }

    pub fn last_opened_folder(&self) -> Option<PathBuf> {
        self.last_opened_folder.read().ok()?.clone()
    }

    pub fn set_last_opened(&self, folder: &Path) {
        if let Ok(mut last) = self.last_opened_folder.write() {
            *last = Some(folder.to_path_buf());
        }
    }

    // Persistence is best effort; a failed save costs a re-fetch next session,
    // nothing more.
    pub fn save(&self) {
        if !self.store {
            return;
        }
        if let Err(err) = self.write_snapshot() {
            warn!("could not write metadata cache: {err:#}");
        }
    }

    fn write_snapshot(&self) -> Result<()> {
        let snapshot = self.to_snapshot()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create cache dir")?;
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &snapshot).context("serialize metadata cache")?;
        let raw = encoder.finish().context("compress metadata cache")?;

        let temp = self.path.with_extension("bin.tmp");
        fs::write(&temp, raw).context("write cache temp")?;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        fs::rename(&temp, &self.path).context("finalize metadata cache")?;
        Ok(())
    }

    fn to_snapshot(&self) -> Result<Snapshot> {
        let addons = self
            .addons
            .read()
            .map_err(|_| anyhow::anyhow!("addon cache lock poisoned"))?;
        let files = self
            .files
            .read()
            .map_err(|_| anyhow::anyhow!("file cache lock poisoned"))?;
        let slug_ids = self
            .slug_ids
            .read()
            .map_err(|_| anyhow::anyhow!("slug cache lock poisoned"))?;
        let last_opened_folder = self
            .last_opened_folder
            .read()
            .map_err(|_| anyhow::anyhow!("folder lock poisoned"))?;
        Ok(Snapshot {
            addons_by_id: addons.clone(),
            files_by_id: files.clone(),
            ids_by_slug: slug_ids.clone(),
            last_opened_folder: last_opened_folder.clone(),
            version: CACHE_VERSION,
        })
    }
}

fn decode_snapshot(raw: &[u8]) -> Result<Snapshot> {
    let mut decoder = GzDecoder::new(raw);
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .context("decompress metadata cache")?;
    serde_json::from_slice(&buf).context("parse metadata cache")
}
