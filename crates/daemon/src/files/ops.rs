//! File-tree operations: the CRUD primitives behind every endpoint.
//!
//! Each operation resolves its path(s) through the [`Sandbox`] first, then
//! performs the mutation and publishes a change event scoped to the affected
//! directory. OS errors are mapped to [`ShareError`] at this boundary;
//! nothing propagates unmapped.
//!
//! There is no cross-request locking: concurrent operations racing on one
//! path rely on the filesystem's own syscall atomicity, and the loser of a
//! create/create race surfaces `Conflict`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::warn;

use protocol::messages::{
    format_size, ChangeEvent, DirectoryEntry, ListResponse, UploadFailure, UploadResponse,
};
use protocol::ShareError;

use crate::events::ChangeBus;

use super::sandbox::{depth_of, is_within, parent_of, sanitize_name, Sandbox};

/// The sandboxed file-tree mutation layer.
#[derive(Debug)]
pub struct FileTree {
    sandbox: Sandbox,
    bus: ChangeBus,
}

/// An open file handed to the router for streaming back to the client.
#[derive(Debug)]
pub struct Download {
    /// The opened file, positioned at the start.
    pub file: tokio::fs::File,
    /// Original filename for the attachment header.
    pub name: String,
    /// File size in bytes for Content-Length.
    pub size: u64,
}

impl FileTree {
    /// Build the operation layer over a sandbox and change bus.
    pub fn new(sandbox: Sandbox, bus: ChangeBus) -> Self {
        Self { sandbox, bus }
    }

    /// The underlying sandbox.
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// List the immediate children of a directory.
    ///
    /// Entries are ordered directories first, then files, case-insensitive
    /// by name; children that cannot be stat'ed are skipped.
    pub fn list(&self, rel: &str) -> Result<ListResponse, ShareError> {
        let resolved = self.sandbox.resolve(rel)?;
        let meta = fs::metadata(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;
        if !meta.is_dir() {
            return Err(ShareError::NotADirectory(rel.to_string()));
        }

        let dir_rel = self.sandbox.relative_of(&resolved);
        let reader = fs::read_dir(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;

        let mut entries = Vec::new();
        for entry in reader {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };

            let name = entry.file_name().to_string_lossy().to_string();
            let path = if dir_rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", dir_rel, name)
            };
            let is_dir = meta.is_dir();
            entries.push(DirectoryEntry {
                name,
                path,
                is_dir,
                size: if is_dir {
                    None
                } else {
                    Some(format_size(meta.len()))
                },
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        let depth = depth_of(&dir_rel);
        Ok(ListResponse {
            path: dir_rel,
            depth,
            can_create_folder: self.sandbox.within_limit(depth + 1),
            entries,
        })
    }

    /// Create a folder named `raw_name` under `parent_rel`.
    ///
    /// Returns the new folder's root-relative path and emits a change event
    /// scoped to the parent.
    pub fn create_folder(&self, parent_rel: &str, raw_name: &str) -> Result<String, ShareError> {
        let parent = self.sandbox.resolve(parent_rel)?;
        let name = sanitize_name(raw_name).ok_or(ShareError::InvalidName)?;

        let target = parent.join(&name);
        let target_rel = self.sandbox.relative_of(&target);
        let depth = depth_of(&target_rel);
        if !self.sandbox.within_limit(depth) {
            return Err(ShareError::DepthExceeded {
                depth,
                max: self.sandbox.max_depth(),
            });
        }
        if target.exists() {
            return Err(ShareError::Conflict(target_rel));
        }

        // Non-recursive create: a parent that vanished between resolve and
        // here must surface as NotFound, not be silently recreated.
        fs::create_dir(&target).map_err(|e| ShareError::from_io(e, &target))?;

        self.bus
            .publish(&ChangeEvent::file_change(self.sandbox.relative_of(&parent)));
        Ok(target_rel)
    }

    /// Start an upload batch into the directory at `dir_rel`.
    pub fn upload_to(&self, dir_rel: &str) -> Result<UploadBatch<'_>, ShareError> {
        let dir = self.sandbox.resolve(dir_rel)?;
        let meta = fs::metadata(&dir).map_err(|e| ShareError::from_io(e, &dir))?;
        if !meta.is_dir() {
            return Err(ShareError::NotADirectory(dir_rel.to_string()));
        }
        let dir_rel = self.sandbox.relative_of(&dir);
        Ok(UploadBatch {
            tree: self,
            dir,
            dir_rel,
            uploaded: 0,
            failures: Vec::new(),
        })
    }

    /// Open a file for download.
    pub async fn open_download(&self, rel: &str) -> Result<Download, ShareError> {
        let resolved = self.sandbox.resolve(rel)?;
        let meta = fs::metadata(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;
        if !meta.is_file() {
            return Err(ShareError::NotAFile(rel.to_string()));
        }
        let file = tokio::fs::File::open(&resolved)
            .await
            .map_err(|e| ShareError::from_io(e, &resolved))?;
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());
        Ok(Download {
            file,
            name,
            size: meta.len(),
        })
    }

    /// Rename the entry at `rel` to `raw_name` within its directory.
    ///
    /// Returns the sanitized new name and emits a change event scoped to the
    /// entry's parent directory.
    pub fn rename(&self, rel: &str, raw_name: &str) -> Result<String, ShareError> {
        let resolved = self.sandbox.resolve(rel)?;
        if resolved == self.sandbox.root() {
            return Err(ShareError::Forbidden);
        }
        let meta = fs::metadata(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;
        let name = sanitize_name(raw_name).ok_or(ShareError::InvalidName)?;

        let target = resolved
            .parent()
            .unwrap_or_else(|| self.sandbox.root())
            .join(&name);
        let target_rel = self.sandbox.relative_of(&target);

        // A rename cannot change depth; the check still runs on the
        // sanitized name so a bad limit never slips through.
        if meta.is_dir() {
            let depth = depth_of(&target_rel);
            if !self.sandbox.within_limit(depth) {
                return Err(ShareError::DepthExceeded {
                    depth,
                    max: self.sandbox.max_depth(),
                });
            }
        }
        if target.exists() {
            return Err(ShareError::Conflict(target_rel));
        }

        fs::rename(&resolved, &target).map_err(|e| ShareError::from_io(e, &resolved))?;

        let scope = parent_of(&self.sandbox.relative_of(&resolved));
        self.bus.publish(&ChangeEvent::file_change(scope));
        Ok(name)
    }

    /// Move the entry at `src_rel` into the directory at `dest_dir_rel`,
    /// keeping its name.
    ///
    /// Returns the entry's new root-relative path and emits change events
    /// for both the old parent and the destination directory.
    pub fn move_item(&self, src_rel: &str, dest_dir_rel: &str) -> Result<String, ShareError> {
        let source = self.sandbox.resolve(src_rel)?;
        if source == self.sandbox.root() {
            return Err(ShareError::Forbidden);
        }
        let src_meta = fs::metadata(&source).map_err(|e| ShareError::from_io(e, &source))?;

        let dest_dir = self.sandbox.resolve(dest_dir_rel)?;
        let dest_meta = fs::metadata(&dest_dir).map_err(|e| ShareError::from_io(e, &dest_dir))?;
        if !dest_meta.is_dir() {
            return Err(ShareError::NotADirectory(dest_dir_rel.to_string()));
        }

        let name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let target = dest_dir.join(&name);
        let target_rel = self.sandbox.relative_of(&target);

        if src_meta.is_dir() {
            // Containment check on resolved paths: the destination being the
            // source or anything under it would detach the subtree.
            if is_within(&source, &dest_dir) {
                return Err(ShareError::InvalidOperation(
                    "cannot move a folder into itself".to_string(),
                ));
            }
            let depth = depth_of(&target_rel);
            if !self.sandbox.within_limit(depth) {
                return Err(ShareError::DepthExceeded {
                    depth,
                    max: self.sandbox.max_depth(),
                });
            }
        }
        if target.exists() {
            return Err(ShareError::Conflict(target_rel));
        }

        fs::rename(&source, &target).map_err(|e| ShareError::from_io(e, &source))?;

        let old_scope = parent_of(&self.sandbox.relative_of(&source));
        self.bus.publish(&ChangeEvent::file_change(old_scope));
        self.bus
            .publish(&ChangeEvent::file_change(self.sandbox.relative_of(&dest_dir)));
        Ok(target_rel)
    }

    /// Delete the entry at `rel`; directories are removed recursively.
    ///
    /// Returns the removed entry's root-relative path and emits a change
    /// event scoped to its parent.
    pub fn delete(&self, rel: &str) -> Result<String, ShareError> {
        let resolved = self.sandbox.resolve(rel)?;
        if resolved == self.sandbox.root() {
            return Err(ShareError::Forbidden);
        }
        let meta = fs::metadata(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;

        if meta.is_dir() {
            fs::remove_dir_all(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;
        } else {
            fs::remove_file(&resolved).map_err(|e| ShareError::from_io(e, &resolved))?;
        }

        let rel_path = self.sandbox.relative_of(&resolved);
        self.bus
            .publish(&ChangeEvent::file_change(parent_of(&rel_path)));
        Ok(rel_path)
    }
}

/// One upload request's accumulating outcome.
///
/// Files stream in one at a time through [`UploadBatch::begin_file`];
/// [`UploadBatch::finish`] publishes a single change event when at least one
/// file landed.
#[derive(Debug)]
pub struct UploadBatch<'a> {
    tree: &'a FileTree,
    dir: PathBuf,
    dir_rel: String,
    uploaded: usize,
    failures: Vec<UploadFailure>,
}

impl UploadBatch<'_> {
    /// Open a write sink for one incoming file.
    ///
    /// Returns `Ok(None)` when the name sanitizes to nothing - such parts
    /// are skipped, not errored.
    pub async fn begin_file(&self, raw_name: &str) -> Result<Option<UploadWriter>, ShareError> {
        let Some(name) = sanitize_name(raw_name) else {
            return Ok(None);
        };
        UploadWriter::create(&self.dir, name).await.map(Some)
    }

    /// Count one verified file.
    pub fn record_success(&mut self) {
        self.uploaded += 1;
    }

    /// Record one per-file failure without aborting the batch.
    pub fn record_failure(&mut self, name: impl Into<String>, error: &ShareError) {
        self.failures.push(UploadFailure {
            name: name.into(),
            error: error.to_string(),
        });
    }

    /// Number of files written and verified so far.
    pub fn uploaded(&self) -> usize {
        self.uploaded
    }

    /// Whether any per-file failure was recorded.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Close the batch: one change event if anything landed, and the
    /// aggregate response body. The batch-level `error` is set only when
    /// every file failed.
    pub fn finish(self) -> UploadResponse {
        if self.uploaded > 0 {
            self.tree
                .bus
                .publish(&ChangeEvent::file_change(self.dir_rel.clone()));
        }
        let error = if self.uploaded == 0 && !self.failures.is_empty() {
            Some("all uploads failed".to_string())
        } else {
            None
        };
        UploadResponse {
            error,
            uploaded: self.uploaded,
            errors: self.failures,
        }
    }
}

/// Streaming sink for one uploaded file.
///
/// Bytes go to a hidden temp file in the destination directory; `finish`
/// fsyncs, verifies the on-disk size against the bytes written, and only
/// then renames onto the final name. Any failure removes the temp file so a
/// partial upload never becomes visible.
#[derive(Debug)]
pub struct UploadWriter {
    name: String,
    dest: PathBuf,
    temp: PathBuf,
    file: tokio::fs::File,
    written: u64,
}

impl UploadWriter {
    async fn create(dir: &Path, name: String) -> Result<Self, ShareError> {
        let temp = dir.join(format!(".{}.{:08x}.part", name, rand::random::<u32>()));
        let dest = dir.join(&name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await
            .map_err(|e| ShareError::from_io(e, &temp))?;
        Ok(Self {
            name,
            dest,
            temp,
            file,
            written: 0,
        })
    }

    /// Sanitized name this file will land under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one chunk. On error the caller aborts the writer.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), ShareError> {
        self.file
            .write_all(data)
            .await
            .map_err(|e| ShareError::from_io(e, &self.temp))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Verify and publish the file: flush, fsync, size check, atomic rename.
    pub async fn finish(mut self) -> Result<(), ShareError> {
        match self.finalize().await {
            Ok(()) => Ok(()),
            Err(err) => {
                remove_temp(&self.temp).await;
                Err(err)
            }
        }
    }

    async fn finalize(&mut self) -> Result<(), ShareError> {
        self.file
            .flush()
            .await
            .map_err(|e| ShareError::from_io(e, &self.temp))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| ShareError::from_io(e, &self.temp))?;

        let meta = tokio::fs::metadata(&self.temp)
            .await
            .map_err(|e| ShareError::from_io(e, &self.temp))?;
        if meta.len() != self.written {
            return Err(ShareError::Io(format!(
                "short write for {}: {} of {} bytes persisted",
                self.name,
                meta.len(),
                self.written
            )));
        }

        tokio::fs::rename(&self.temp, &self.dest)
            .await
            .map_err(|e| ShareError::from_io(e, &self.dest))
    }

    /// Discard the upload and remove the temp file.
    pub async fn abort(self) {
        remove_temp(&self.temp).await;
    }
}

async fn remove_temp(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = ?temp, error = %e, "Failed to remove partial upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::{ChangeBus, Subscription};
    use tempfile::TempDir;

    fn tree_with_depth(temp: &TempDir, max_depth: usize) -> (FileTree, ChangeBus) {
        let bus = ChangeBus::new(10);
        let sandbox = Sandbox::open(temp.path().join("share"), max_depth).unwrap();
        (FileTree::new(sandbox, bus.clone()), bus)
    }

    fn tree(temp: &TempDir) -> (FileTree, ChangeBus) {
        tree_with_depth(temp, 5)
    }

    async fn next_path(sub: &mut Subscription) -> String {
        sub.recv().await.expect("expected a change event").path
    }

    // ---------------------------------------------------------------------
    // list
    // ---------------------------------------------------------------------

    #[test]
    fn test_list_orders_and_sizes() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();

        fs::write(root.join("zebra.txt"), "zz").unwrap();
        fs::write(root.join("Apple.txt"), "aaaaa").unwrap();
        fs::create_dir(root.join("beta")).unwrap();
        fs::create_dir(root.join("alpha")).unwrap();

        let listing = tree.list("").unwrap();
        assert_eq!(listing.path, "");
        assert_eq!(listing.depth, 0);
        assert!(listing.can_create_folder);

        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta", "Apple.txt", "zebra.txt"]);

        assert!(listing.entries[0].is_dir);
        assert_eq!(listing.entries[0].size, None);
        assert_eq!(listing.entries[2].size.as_deref(), Some("5.0 B"));
        assert_eq!(listing.entries[2].path, "Apple.txt");
    }

    #[test]
    fn test_list_subdirectory_paths_are_root_relative() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();

        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/file.txt"), "hello").unwrap();

        let listing = tree.list("docs").unwrap();
        assert_eq!(listing.path, "docs");
        assert_eq!(listing.depth, 1);
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].path, "docs/file.txt");
    }

    #[test]
    fn test_list_twice_is_stable() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();

        for name in ["c.txt", "a.txt", "B.txt"] {
            fs::write(root.join(name), "x").unwrap();
        }
        fs::create_dir(root.join("sub")).unwrap();

        let first = tree.list("").unwrap();
        let second = tree.list("").unwrap();
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_list_missing_and_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        fs::write(tree.sandbox().root().join("f.txt"), "x").unwrap();

        assert!(matches!(tree.list("nope"), Err(ShareError::NotFound(_))));
        assert!(matches!(
            tree.list("f.txt"),
            Err(ShareError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_list_depth_limits_folder_creation() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree_with_depth(&temp, 2);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("a/b")).unwrap();

        assert!(tree.list("a").unwrap().can_create_folder);
        assert!(!tree.list("a/b").unwrap().can_create_folder);
    }

    #[test]
    fn test_list_rejects_escape() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        assert!(matches!(
            tree.list("../outside"),
            Err(ShareError::InvalidPath(_))
        ));
    }

    // ---------------------------------------------------------------------
    // create_folder
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_folder_at_root() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let mut sub = bus.subscribe();

        let created = tree.create_folder("", "docs").unwrap();
        assert_eq!(created, "docs");
        assert!(tree.sandbox().root().join("docs").is_dir());

        // Event scoped to the root, which is the empty string.
        assert_eq!(next_path(&mut sub).await, "");
    }

    #[tokio::test]
    async fn test_create_folder_nested_event_scope() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        fs::create_dir_all(tree.sandbox().root().join("docs")).unwrap();
        let mut sub = bus.subscribe();

        let created = tree.create_folder("docs", "reports").unwrap();
        assert_eq!(created, "docs/reports");
        assert_eq!(next_path(&mut sub).await, "docs");
    }

    #[test]
    fn test_create_folder_sanitizes_name() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        let created = tree.create_folder("", "my/../docs").unwrap();
        // Separators are stripped from the name, not interpreted.
        assert_eq!(created, "my..docs");
        assert!(tree.sandbox().root().join("my..docs").is_dir());
    }

    #[test]
    fn test_create_folder_invalid_name() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        for bad in ["", "  ", "///", "..", "."] {
            assert!(
                matches!(tree.create_folder("", bad), Err(ShareError::InvalidName)),
                "{:?} should be InvalidName",
                bad
            );
        }
    }

    #[test]
    fn test_create_folder_depth_boundary() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree_with_depth(&temp, 2);

        tree.create_folder("", "a").unwrap();
        // Exactly max_depth succeeds.
        assert_eq!(tree.create_folder("a", "b").unwrap(), "a/b");
        // One past it fails.
        assert!(matches!(
            tree.create_folder("a/b", "c"),
            Err(ShareError::DepthExceeded { depth: 3, max: 2 })
        ));
    }

    #[test]
    fn test_create_folder_conflict() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        tree.create_folder("", "docs").unwrap();
        assert!(matches!(
            tree.create_folder("", "docs"),
            Err(ShareError::Conflict(_))
        ));
    }

    #[test]
    fn test_create_folder_missing_parent() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        assert!(matches!(
            tree.create_folder("ghost", "docs"),
            Err(ShareError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_folder_race_one_winner() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let tree = &tree;

        // Both racers may see "does not exist"; the filesystem picks the
        // winner and the loser must surface Conflict.
        let (a, b) = std::thread::scope(|s| {
            let ha = s.spawn(|| tree.create_folder("", "racing"));
            let hb = s.spawn(|| tree.create_folder("", "racing"));
            (ha.join().unwrap(), hb.join().unwrap())
        });

        let oks = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1, "exactly one racer wins: {:?} / {:?}", a, b);
        for result in [a, b] {
            if let Err(e) = result {
                assert!(matches!(e, ShareError::Conflict(_)));
            }
        }
    }

    // ---------------------------------------------------------------------
    // upload
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_upload_roundtrip() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        fs::create_dir_all(tree.sandbox().root().join("docs")).unwrap();
        let mut sub = bus.subscribe();

        let content = b"hello upload world";
        let mut batch = tree.upload_to("docs").unwrap();
        let mut writer = batch.begin_file("file.txt").await.unwrap().unwrap();
        writer.write_chunk(&content[..5]).await.unwrap();
        writer.write_chunk(&content[5..]).await.unwrap();
        writer.finish().await.unwrap();
        batch.record_success();
        let outcome = batch.finish();

        assert_eq!(outcome.uploaded, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.error, None);

        let on_disk = fs::read(tree.sandbox().root().join("docs/file.txt")).unwrap();
        assert_eq!(on_disk, content);

        // One event for the whole batch, scoped to the target directory.
        assert_eq!(next_path(&mut sub).await, "docs");
    }

    #[tokio::test]
    async fn test_upload_single_event_for_many_files() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let mut sub = bus.subscribe();

        let mut batch = tree.upload_to("").unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let mut writer = batch.begin_file(name).await.unwrap().unwrap();
            writer.write_chunk(b"data").await.unwrap();
            writer.finish().await.unwrap();
            batch.record_success();
        }
        let outcome = batch.finish();
        assert_eq!(outcome.uploaded, 3);

        assert_eq!(next_path(&mut sub).await, "");
        // No second event queued.
        bus.publish(&ChangeEvent::file_change("marker"));
        assert_eq!(next_path(&mut sub).await, "marker");
    }

    #[tokio::test]
    async fn test_upload_skips_unusable_names() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        let batch = tree.upload_to("").unwrap();
        assert!(batch.begin_file("").await.unwrap().is_none());
        assert!(batch.begin_file("///").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_truncated_write_cleans_up() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        let mut sub = bus.subscribe();

        let mut batch = tree.upload_to("").unwrap();
        let mut writer = batch.begin_file("big.bin").await.unwrap().unwrap();
        writer.write_chunk(&[0u8; 1024]).await.unwrap();

        // Simulate a torn write: the temp file loses bytes behind our back.
        let temp_path = writer.temp.clone();
        writer.file.sync_all().await.unwrap();
        let handle = std::fs::OpenOptions::new()
            .write(true)
            .open(&temp_path)
            .unwrap();
        handle.set_len(100).unwrap();
        drop(handle);

        let name = writer.name().to_string();
        let err = writer.finish().await.unwrap_err();
        batch.record_failure(name, &err);
        let outcome = batch.finish();

        // The partial file is gone and nothing landed at the destination.
        assert!(!temp_path.exists());
        assert!(!root.join("big.bin").exists());
        assert_eq!(outcome.uploaded, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.error.as_deref(), Some("all uploads failed"));
        assert!(outcome.errors[0].error.contains("short write"));

        // No event for an all-failed batch.
        bus.publish(&ChangeEvent::file_change("marker"));
        assert_eq!(next_path(&mut sub).await, "marker");
    }

    #[tokio::test]
    async fn test_upload_abort_removes_temp() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();

        let batch = tree.upload_to("").unwrap();
        let mut writer = batch.begin_file("x.txt").await.unwrap().unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        let temp_path = writer.temp.clone();
        assert!(temp_path.exists());

        writer.abort().await;
        assert!(!temp_path.exists());
        assert!(!root.join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_file() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::write(root.join("file.txt"), "old").unwrap();

        let mut batch = tree.upload_to("").unwrap();
        let mut writer = batch.begin_file("file.txt").await.unwrap().unwrap();
        writer.write_chunk(b"new content").await.unwrap();
        writer.finish().await.unwrap();
        batch.record_success();
        batch.finish();

        assert_eq!(fs::read(root.join("file.txt")).unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_upload_to_missing_or_file_target() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        fs::write(tree.sandbox().root().join("f.txt"), "x").unwrap();

        assert!(matches!(
            tree.upload_to("ghost").err(),
            Some(ShareError::NotFound(_))
        ));
        assert!(matches!(
            tree.upload_to("f.txt").err(),
            Some(ShareError::NotADirectory(_))
        ));
    }

    // ---------------------------------------------------------------------
    // download
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_download_metadata() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/report.pdf"), vec![7u8; 2048]).unwrap();

        let download = tree.open_download("docs/report.pdf").await.unwrap();
        assert_eq!(download.name, "report.pdf");
        assert_eq!(download.size, 2048);
    }

    #[tokio::test]
    async fn test_download_rejects_directory_and_missing() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        fs::create_dir_all(tree.sandbox().root().join("docs")).unwrap();

        assert!(matches!(
            tree.open_download("docs").await.err(),
            Some(ShareError::NotAFile(_))
        ));
        assert!(matches!(
            tree.open_download("ghost.txt").await.err(),
            Some(ShareError::NotFound(_))
        ));
    }

    // ---------------------------------------------------------------------
    // rename
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_rename_file() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/old.txt"), "x").unwrap();
        let mut sub = bus.subscribe();

        let new_name = tree.rename("docs/old.txt", "new.txt").unwrap();
        assert_eq!(new_name, "new.txt");
        assert!(!root.join("docs/old.txt").exists());
        assert!(root.join("docs/new.txt").exists());

        // Scoped to the parent directory of the renamed entry.
        assert_eq!(next_path(&mut sub).await, "docs");
    }

    #[test]
    fn test_rename_root_is_forbidden() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        assert!(matches!(
            tree.rename("", "newroot"),
            Err(ShareError::Forbidden)
        ));
        assert!(matches!(
            tree.rename("/", "newroot"),
            Err(ShareError::Forbidden)
        ));
    }

    #[test]
    fn test_rename_conflict_and_missing() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();

        assert!(matches!(
            tree.rename("a.txt", "b.txt"),
            Err(ShareError::Conflict(_))
        ));
        assert!(matches!(
            tree.rename("ghost.txt", "x"),
            Err(ShareError::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_sanitizes_and_rejects_bad_names() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::write(root.join("a.txt"), "a").unwrap();

        assert!(matches!(
            tree.rename("a.txt", "///"),
            Err(ShareError::InvalidName)
        ));

        let renamed = tree.rename("a.txt", "evil/../name.txt").unwrap();
        assert_eq!(renamed, "evil..name.txt");
        assert!(root.join("evil..name.txt").exists());
    }

    // ---------------------------------------------------------------------
    // move
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_move_file_emits_two_events() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("inbox")).unwrap();
        fs::create_dir_all(root.join("archive")).unwrap();
        fs::write(root.join("inbox/doc.txt"), "x").unwrap();
        let mut sub = bus.subscribe();

        let moved = tree.move_item("inbox/doc.txt", "archive").unwrap();
        assert_eq!(moved, "archive/doc.txt");
        assert!(root.join("archive/doc.txt").exists());

        // Old parent first, destination second.
        assert_eq!(next_path(&mut sub).await, "inbox");
        assert_eq!(next_path(&mut sub).await, "archive");
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("a/b")).unwrap();

        // Into itself and into a descendant both fail, with nothing moved.
        assert!(matches!(
            tree.move_item("a", "a"),
            Err(ShareError::InvalidOperation(_))
        ));
        assert!(matches!(
            tree.move_item("a", "a/b"),
            Err(ShareError::InvalidOperation(_))
        ));
        assert!(root.join("a/b").is_dir());
    }

    #[test]
    fn test_move_conflict_and_bad_destination() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("dest")).unwrap();
        fs::write(root.join("doc.txt"), "src").unwrap();
        fs::write(root.join("dest/doc.txt"), "taken").unwrap();

        assert!(matches!(
            tree.move_item("doc.txt", "dest"),
            Err(ShareError::Conflict(_))
        ));
        assert!(matches!(
            tree.move_item("doc.txt", "ghost"),
            Err(ShareError::NotFound(_))
        ));
        assert!(matches!(
            tree.move_item("doc.txt", "dest/doc.txt"),
            Err(ShareError::NotADirectory(_))
        ));
        assert!(matches!(
            tree.move_item("", "dest"),
            Err(ShareError::Forbidden)
        ));
    }

    #[test]
    fn test_move_directory_depth_check() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree_with_depth(&temp, 2);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();

        // Moving "c" under "a/b" would place it at depth 3.
        assert!(matches!(
            tree.move_item("c", "a/b"),
            Err(ShareError::DepthExceeded { depth: 3, max: 2 })
        ));
        // Moving it under "a" keeps depth 2.
        assert_eq!(tree.move_item("c", "a").unwrap(), "a/c");
    }

    // ---------------------------------------------------------------------
    // delete
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_file_and_event_scope() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/file.txt"), "x").unwrap();
        let mut sub = bus.subscribe();

        let deleted = tree.delete("docs/file.txt").unwrap();
        assert_eq!(deleted, "docs/file.txt");
        assert!(!root.join("docs/file.txt").exists());
        assert_eq!(next_path(&mut sub).await, "docs");
    }

    #[test]
    fn test_delete_directory_recursive() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);
        let root = tree.sandbox().root().to_path_buf();
        fs::create_dir_all(root.join("docs/deep/deeper")).unwrap();
        fs::write(root.join("docs/deep/f.txt"), "x").unwrap();

        tree.delete("docs").unwrap();
        assert!(!root.join("docs").exists());
    }

    #[test]
    fn test_delete_root_forbidden_and_missing() {
        let temp = TempDir::new().unwrap();
        let (tree, _bus) = tree(&temp);

        assert!(matches!(tree.delete(""), Err(ShareError::Forbidden)));
        assert!(matches!(
            tree.delete("ghost"),
            Err(ShareError::NotFound(_))
        ));
    }

    // ---------------------------------------------------------------------
    // end-to-end operation sequence
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let temp = TempDir::new().unwrap();
        let (tree, bus) = tree(&temp);
        let mut sub = bus.subscribe();

        assert_eq!(tree.create_folder("", "docs").unwrap(), "docs");
        assert_eq!(next_path(&mut sub).await, "");

        let mut batch = tree.upload_to("docs").unwrap();
        let mut writer = batch.begin_file("file.txt").await.unwrap().unwrap();
        writer.write_chunk(b"12345").await.unwrap();
        writer.finish().await.unwrap();
        batch.record_success();
        batch.finish();
        assert_eq!(next_path(&mut sub).await, "docs");

        let listing = tree.list("docs").unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name, "file.txt");
        assert!(!listing.entries[0].is_dir);
        assert_eq!(listing.entries[0].size.as_deref(), Some("5.0 B"));

        tree.delete("docs/file.txt").unwrap();
        assert_eq!(next_path(&mut sub).await, "docs");

        assert!(tree.list("docs").unwrap().entries.is_empty());
    }
}
