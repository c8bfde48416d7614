//! Directory-backed artifact store.
//!
//! Layout under the root directory:
//!
//! ```text
//! objects/<fingerprint>-<version>/image.png
//! objects/<fingerprint>-<version>/table.json
//! objects/<fingerprint>-<version>/meta.json
//! refs/<fingerprint>                  # holds the current version
//! ```
//!
//! A `put` stages a complete version directory, syncs it, renames it into
//! place and then atomically replaces the ref file. Readers resolve the ref
//! first, so they see either the previous version or the new one. A reader
//! that loses a race with the removal of an old version re-resolves the ref
//! once.
//!
//! All I/O goes through `cap_std` directories on the blocking pool.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::{Dir, OpenOptions};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{
    Artifact, ArtifactMetadata, ArtifactStore, ArtifactStoreError, NewArtifact,
};
use crate::domain::{DataTable, Fingerprint};

const OBJECTS_DIR: &str = "objects";
const REFS_DIR: &str = "refs";
const IMAGE_FILE: &str = "image.png";
const TABLE_FILE: &str = "table.json";
const META_FILE: &str = "meta.json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Artifact store persisting versions under a root directory.
#[derive(Clone)]
pub struct FilesystemArtifactStore {
    dirs: Arc<StoreDirs>,
}

struct StoreDirs {
    objects: Dir,
    refs: Dir,
    // Serialises ref swaps against conditional removal.
    ref_lock: Mutex<()>,
}

impl FilesystemArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns [`ArtifactStoreError::Io`] when the directories cannot be
    /// created or opened.
    pub fn open(root: &Utf8Path) -> Result<Self, ArtifactStoreError> {
        Dir::create_ambient_dir_all(root, ambient_authority())
            .map_err(|err| io_error(root, &err))?;
        let root_dir =
            Dir::open_ambient_dir(root, ambient_authority()).map_err(|err| io_error(root, &err))?;
        let objects = open_subdir(&root_dir, OBJECTS_DIR)?;
        let refs = open_subdir(&root_dir, REFS_DIR)?;
        debug!(root = %root, "artifact store opened");
        Ok(Self {
            dirs: Arc::new(StoreDirs {
                objects,
                refs,
                ref_lock: Mutex::new(()),
            }),
        })
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, ArtifactStoreError>
    where
        F: FnOnce(&StoreDirs) -> Result<T, ArtifactStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let dirs = Arc::clone(&self.dirs);
        tokio::task::spawn_blocking(move || operation(&dirs))
            .await
            .map_err(|err| ArtifactStoreError::io(format!("storage task failed: {err}")))?
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put(&self, artifact: NewArtifact<'_>) -> Result<ArtifactMetadata, ArtifactStoreError> {
        let metadata = ArtifactMetadata {
            fingerprint: artifact.fingerprint,
            version: Uuid::new_v4().simple().to_string(),
            stored_at: artifact.stored_at,
            image_bytes: u64::try_from(artifact.image.len()).unwrap_or(u64::MAX),
            row_count: artifact.table.row_count(),
        };
        let table = serde_json::to_vec(artifact.table)
            .map_err(|err| ArtifactStoreError::io(format!("encode data table: {err}")))?;
        let meta = serde_json::to_vec(&metadata)
            .map_err(|err| ArtifactStoreError::io(format!("encode metadata: {err}")))?;
        let image = artifact.image.to_vec();
        let written = metadata.clone();
        self.blocking(move |dirs| dirs.write_version(&written, &image, &table, &meta))
            .await?;
        Ok(metadata)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, ArtifactStoreError> {
        let fingerprint = *fingerprint;
        self.blocking(move |dirs| dirs.read_current(&fingerprint, StoreDirs::read_artifact))
            .await
    }

    async fn metadata(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ArtifactMetadata>, ArtifactStoreError> {
        let fingerprint = *fingerprint;
        self.blocking(move |dirs| dirs.read_current(&fingerprint, StoreDirs::read_metadata))
            .await
    }

    async fn list(&self) -> Result<Vec<ArtifactMetadata>, ArtifactStoreError> {
        self.blocking(StoreDirs::list).await
    }

    async fn remove(
        &self,
        fingerprint: &Fingerprint,
        version: &str,
    ) -> Result<bool, ArtifactStoreError> {
        let fingerprint = *fingerprint;
        let version = version.to_owned();
        self.blocking(move |dirs| dirs.remove_version(&fingerprint, &version))
            .await
    }
}

impl StoreDirs {
    fn write_version(
        &self,
        metadata: &ArtifactMetadata,
        image: &[u8],
        table: &[u8],
        meta: &[u8],
    ) -> Result<(), ArtifactStoreError> {
        let final_name = object_name(&metadata.fingerprint, &metadata.version);
        let staging_name = format!(".staging-{final_name}");
        self.objects
            .create_dir(&staging_name)
            .map_err(|err| io_error(&staging_name, &err))?;

        let staged = self.stage_files(&staging_name, image, table, meta).and_then(|()| {
            self.objects
                .rename(&staging_name, &self.objects, &final_name)
                .map_err(|err| io_error(&final_name, &err))
        });
        if let Err(err) = staged {
            drop(self.objects.remove_dir_all(&staging_name));
            return Err(err);
        }
        sync_directory(&self.objects);

        let previous = {
            let _guard = self.ref_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = self.read_ref(&metadata.fingerprint)?;
            write_atomic(
                &self.refs,
                &metadata.fingerprint.to_hex(),
                metadata.version.as_bytes(),
            )?;
            previous
        };

        if let Some(previous) = previous {
            let old_name = object_name(&metadata.fingerprint, &previous);
            if let Err(err) = self.objects.remove_dir_all(&old_name) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(object = %old_name, error = %err, "failed to remove superseded artifact");
                }
            }
        }
        Ok(())
    }

    fn stage_files(
        &self,
        staging_name: &str,
        image: &[u8],
        table: &[u8],
        meta: &[u8],
    ) -> Result<(), ArtifactStoreError> {
        let staging = self
            .objects
            .open_dir(staging_name)
            .map_err(|err| io_error(staging_name, &err))?;
        write_synced(&staging, IMAGE_FILE, image)?;
        write_synced(&staging, TABLE_FILE, table)?;
        write_synced(&staging, META_FILE, meta)?;
        sync_directory(&staging);
        Ok(())
    }

    fn read_ref(&self, fingerprint: &Fingerprint) -> Result<Option<String>, ArtifactStoreError> {
        let name = fingerprint.to_hex();
        match self.refs.read_to_string(&name) {
            Ok(version) => Ok(Some(version.trim().to_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&name, &err)),
        }
    }

    fn read_current<T>(
        &self,
        fingerprint: &Fingerprint,
        read: fn(&Self, &str) -> io::Result<Result<T, ArtifactStoreError>>,
    ) -> Result<Option<T>, ArtifactStoreError> {
        // A concurrent put may delete the version between resolving the ref
        // and opening the object, so resolve twice before giving up.
        for _ in 0..2 {
            let Some(version) = self.read_ref(fingerprint)? else {
                return Ok(None);
            };
            let name = object_name(fingerprint, &version);
            match read(self, &name) {
                Ok(decoded) => return decoded.map(Some),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(&name, &err)),
            }
        }
        Ok(None)
    }

    fn read_metadata(
        &self,
        object: &str,
    ) -> io::Result<Result<ArtifactMetadata, ArtifactStoreError>> {
        let dir = self.objects.open_dir(object)?;
        let bytes = dir.read(META_FILE)?;
        Ok(serde_json::from_slice(&bytes)
            .map_err(|err| ArtifactStoreError::corrupt(format!("{object}/{META_FILE}: {err}"))))
    }

    fn read_artifact(&self, object: &str) -> io::Result<Result<Artifact, ArtifactStoreError>> {
        let dir = self.objects.open_dir(object)?;
        let meta = dir.read(META_FILE)?;
        let image = dir.read(IMAGE_FILE)?;
        let table = dir.read(TABLE_FILE)?;
        Ok(decode_artifact(object, &meta, image, &table))
    }

    fn list(&self) -> Result<Vec<ArtifactMetadata>, ArtifactStoreError> {
        let entries = self
            .refs
            .entries()
            .map_err(|err| io_error(REFS_DIR, &err))?;
        let mut listed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(REFS_DIR, &err))?;
            let file_name = entry.file_name();
            let Some(Ok(fingerprint)) = file_name.to_str().map(str::parse::<Fingerprint>) else {
                // Temp files from in-progress ref swaps.
                continue;
            };
            match self.read_current(&fingerprint, Self::read_metadata) {
                Ok(Some(metadata)) => listed.push(metadata),
                Ok(None) => {}
                Err(err) => warn!(%fingerprint, error = %err, "skipping unreadable artifact"),
            }
        }
        Ok(listed)
    }

    fn remove_version(
        &self,
        fingerprint: &Fingerprint,
        version: &str,
    ) -> Result<bool, ArtifactStoreError> {
        {
            let _guard = self.ref_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if self.read_ref(fingerprint)?.as_deref() != Some(version) {
                return Ok(false);
            }
            let name = fingerprint.to_hex();
            self.refs
                .remove_file(&name)
                .map_err(|err| io_error(&name, &err))?;
        }
        let object = object_name(fingerprint, version);
        match self.objects.remove_dir_all(&object) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(%object, error = %err, "failed to remove artifact files"),
        }
        Ok(true)
    }
}

fn decode_artifact(
    object: &str,
    meta: &[u8],
    image: Vec<u8>,
    table: &[u8],
) -> Result<Artifact, ArtifactStoreError> {
    let metadata: ArtifactMetadata = serde_json::from_slice(meta)
        .map_err(|err| ArtifactStoreError::corrupt(format!("{object}/{META_FILE}: {err}")))?;
    let table: DataTable = serde_json::from_slice(table)
        .map_err(|err| ArtifactStoreError::corrupt(format!("{object}/{TABLE_FILE}: {err}")))?;
    Ok(Artifact {
        metadata,
        image,
        table,
    })
}

fn object_name(fingerprint: &Fingerprint, version: &str) -> String {
    format!("{fingerprint}-{version}")
}

fn open_subdir(root: &Dir, name: &str) -> Result<Dir, ArtifactStoreError> {
    match root.create_dir(name) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(io_error(name, &err)),
    }
    root.open_dir(name).map_err(|err| io_error(name, &err))
}

fn write_synced(dir: &Dir, name: &str, contents: &[u8]) -> Result<(), ArtifactStoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = dir
        .open_with(name, &options)
        .map_err(|err| io_error(name, &err))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|err| io_error(name, &err))
}

/// Replace `name` in `dir` with `contents` via a synced temp file and rename.
fn write_atomic(dir: &Dir, name: &str, contents: &[u8]) -> Result<(), ArtifactStoreError> {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(".{name}.tmp.{}.{counter}", std::process::id());
    if let Err(err) = write_synced(dir, &tmp_name, contents) {
        drop(dir.remove_file(&tmp_name));
        return Err(err);
    }
    if let Err(err) = dir.rename(&tmp_name, dir, name) {
        drop(dir.remove_file(&tmp_name));
        return Err(io_error(name, &err));
    }
    sync_directory(dir);
    Ok(())
}

fn sync_directory(dir: &Dir) {
    // Best effort: not every platform can sync a directory handle.
    if dir.open(".").and_then(|handle| handle.sync_all()).is_err() {
        debug!("directory sync unsupported");
    }
}

fn io_error(path: impl AsRef<str>, err: &io::Error) -> ArtifactStoreError {
    ArtifactStoreError::io(format!("{}: {err}", path.as_ref()))
}
