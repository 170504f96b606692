//! Filesystem store adapter.
//!
//! Implements [`FileStore`] on top of `std::fs`, rooted at a directory.
//! On the device that directory is the FAT partition mounted by
//! [`mount_fat`]; on the host it is any directory (tests use a tempdir).
//!
//! ## Staged writes
//!
//! Each write goes to `<dest>.tmp` and is renamed over `<dest>` on commit.
//! FAT cannot rename onto an existing file, so replacement is done in
//! three steps:
//!
//! ```text
//!   dest     → dest.bak
//!   dest.tmp → dest
//!   remove dest.bak
//! ```
//!
//! A power cut between the first two renames leaves only `dest.bak`;
//! [`FsStore::read`] falls back to it, so `config.json` stays readable.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};

use crate::app::ports::{FileStore, StagedFile, StorageError};

/// VFS mount point of the application partition.
pub const MOUNT_POINT: &str = "/app";

/// Label of the FAT data partition in `partitions.csv`.
pub const PARTITION_LABEL: &str = "storage";

const TMP_SUFFIX: &str = ".tmp";
const BAK_SUFFIX: &str = ".bak";

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a store-relative path to a real path. Only plain components
    /// are allowed.
    fn resolve(&self, path: &Path) -> Result<PathBuf, StorageError> {
        let plain = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath);
        }
        Ok(self.root.join(path))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn replace(tmp: &Path, dest: &Path) -> std::io::Result<()> {
    match fs::rename(tmp, dest) {
        Ok(()) => return Ok(()),
        Err(_) if dest.exists() => {}
        Err(e) => return Err(e),
    }

    let bak = with_suffix(dest, BAK_SUFFIX);
    let _ = fs::remove_file(&bak);
    fs::rename(dest, &bak)?;
    if let Err(e) = fs::rename(tmp, dest) {
        let _ = fs::rename(&bak, dest);
        return Err(e);
    }
    let _ = fs::remove_file(&bak);
    Ok(())
}

impl FileStore for FsStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let bak = with_suffix(&full, BAK_SUFFIX);
                let bytes = fs::read(&bak).map_err(|_| StorageError::NotFound)?;
                warn!("storage: {} missing, recovered from backup", path.display());
                Ok(bytes)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_ok_and(|full| full.exists())
    }

    fn create_dir(&mut self, path: &Path) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)?;
        Ok(())
    }

    fn stage<'a>(&'a mut self, path: &Path) -> Result<Box<dyn StagedFile + 'a>, StorageError> {
        let dest = self.resolve(path)?;
        let tmp = with_suffix(&dest, TMP_SUFFIX);
        let file = File::create(&tmp)?;
        debug!("storage: staging {}", tmp.display());
        Ok(Box::new(FsStagedFile {
            file: Some(file),
            tmp,
            dest,
        }))
    }
}

struct FsStagedFile {
    file: Option<File>,
    tmp: PathBuf,
    dest: PathBuf,
}

impl StagedFile for FsStagedFile {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::InvalidPath)?;
        file.write_all(data)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        replace(&self.tmp, &self.dest)?;
        debug!("storage: committed {}", self.dest.display());
        Ok(())
    }
}

impl Drop for FsStagedFile {
    fn drop(&mut self) {
        // Uncommitted (or failed) writes leave no temp file behind.
        if self.tmp.exists() {
            self.file.take();
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Mount the FAT data partition at [`MOUNT_POINT`], formatting it if it
/// cannot be mounted.
#[cfg(target_os = "espidf")]
pub fn mount_fat() -> Result<(), StorageError> {
    use esp_idf_sys::{
        ESP_OK, esp_vfs_fat_mount_config_t, esp_vfs_fat_spiflash_mount_rw_wl, wl_handle_t,
    };
    use std::ffi::CString;

    let base = CString::new(MOUNT_POINT).map_err(|_| StorageError::InvalidPath)?;
    let label = CString::new(PARTITION_LABEL).map_err(|_| StorageError::InvalidPath)?;
    let config = esp_vfs_fat_mount_config_t {
        format_if_mount_failed: true,
        max_files: 8,
        allocation_unit_size: 4096,
        ..Default::default()
    };
    let mut handle: wl_handle_t = 0;

    let ret = unsafe {
        esp_vfs_fat_spiflash_mount_rw_wl(base.as_ptr(), label.as_ptr(), &config, &mut handle)
    };
    if ret != ESP_OK {
        warn!("storage: FAT mount failed ({})", ret);
        return Err(StorageError::Io(std::io::ErrorKind::Other));
    }
    log::info!("storage: FAT mounted at {}", MOUNT_POINT);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn mount_fat() -> Result<(), StorageError> {
    log::info!("storage(sim): mount skipped");
    Ok(())
}
