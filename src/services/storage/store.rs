/*
 * Responsibility
 * - The only code that writes under the upload root
 * - Layout: <root>/<verified subject>/<declared path>
 * - A batch stages every part in temp files next to its destination and
 *   renames them into place on commit; dropping an uncommitted batch removes
 *   its temp files (directories created while staging stay)
 * - Commit refuses a batch whose destination is a directory before renaming
 *   anything
 */
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::services::auth::VerifiedIdentity;
use crate::services::storage::PublishPath;

#[cfg(unix)]
const DIR_MODE: u32 = 0o750;
#[cfg(unix)]
const FILE_MODE: u32 = 0o640;

const STAGING_PREFIX: &str = ".tavern-";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to commit {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("destination {path} is a directory")]
    Conflict { path: PathBuf },
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        create_dirs(&self.root).await
    }

    /// `<root>/<subject>`, the only subtree `identity` can write to.
    pub fn identity_dir(&self, identity: &VerifiedIdentity) -> PathBuf {
        self.root.join(identity.subject())
    }

    pub fn batch(&self, identity: &VerifiedIdentity) -> UploadBatch {
        UploadBatch {
            base: self.identity_dir(identity),
            staged: Vec::new(),
        }
    }
}

/// Files received in one request, not yet visible at their destinations.
#[derive(Debug)]
pub struct UploadBatch {
    base: PathBuf,
    staged: Vec<StagedFile>,
}

/// One part being streamed to a temp file beside its destination.
#[derive(Debug)]
pub struct StagedFile {
    file: File,
    temp: TempPath,
    destination: PathBuf,
    written: u64,
}

impl StagedFile {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|source| StorageError::Write {
                path: self.destination.clone(),
                source,
            })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl UploadBatch {
    /// Open a temp file for `path`, creating its parent directories.
    pub async fn stage(&self, path: &PublishPath) -> Result<StagedFile, StorageError> {
        let destination = path.under(&self.base);
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base.clone());
        create_dirs(&parent).await?;

        let dir = parent.clone();
        let named = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(STAGING_PREFIX);
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                builder.permissions(std::fs::Permissions::from_mode(FILE_MODE));
            }
            builder.tempfile_in(&dir)
        })
        .await?
        .map_err(|source| StorageError::Stage {
            path: destination.clone(),
            source,
        })?;

        let (file, temp) = named.into_parts();
        Ok(StagedFile {
            file: File::from_std(file),
            temp,
            destination,
            written: 0,
        })
    }

    /// Flush a fully received part and keep it for commit.
    pub async fn push(&mut self, mut staged: StagedFile) -> Result<(), StorageError> {
        let flushed = match staged.file.flush().await {
            Ok(()) => staged.file.sync_all().await,
            Err(e) => Err(e),
        };
        flushed.map_err(|source| StorageError::Write {
            path: staged.destination.clone(),
            source,
        })?;

        self.staged.push(staged);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Move every staged file to its destination, replacing what was there.
    ///
    /// Returns the number of files published. Files are renamed in the order
    /// they were received; a later duplicate path wins. A destination that is
    /// a directory, including one created for another part of this batch,
    /// fails the whole batch up front. An I/O error midway can still leave
    /// earlier files published.
    pub async fn commit(self) -> Result<usize, StorageError> {
        for staged in &self.staged {
            let is_dir = fs::metadata(&staged.destination)
                .await
                .is_ok_and(|meta| meta.is_dir());
            if is_dir {
                return Err(StorageError::Conflict {
                    path: staged.destination.clone(),
                });
            }
        }

        let count = self.staged.len();

        for StagedFile {
            file,
            temp,
            destination,
            ..
        } in self.staged
        {
            drop(file);
            tokio::task::spawn_blocking(move || {
                temp.persist(&destination)
                    .map_err(|e| StorageError::Commit {
                        path: destination,
                        source: e.error,
                    })
            })
            .await??;
        }

        Ok(count)
    }
}

async fn create_dirs(path: &Path) -> Result<(), StorageError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);

    builder
        .create(path)
        .await
        .map_err(|source| StorageError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn stage_bytes(batch: &mut UploadBatch, declared: &str, contents: &[u8]) {
        let path = PublishPath::parse(declared).unwrap();
        let mut staged = batch.stage(&path).await.unwrap();
        for chunk in contents.chunks(3) {
            staged.write_chunk(chunk).await.unwrap();
        }
        assert_eq!(staged.written(), contents.len() as u64);
        batch.push(staged).await.unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn committed_files_land_under_the_identity() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path());
        let alice = VerifiedIdentity::for_tests("alice");

        let mut batch = store.batch(&alice);
        stage_bytes(&mut batch, "dir/file.txt", b"hello world").await;
        stage_bytes(&mut batch, "top.txt", b"top").await;
        assert_eq!(batch.commit().await.unwrap(), 2);

        let base = root.path().join("alice");
        assert_eq!(std::fs::read(base.join("dir/file.txt")).unwrap(), b"hello world");
        assert_eq!(std::fs::read(base.join("top.txt")).unwrap(), b"top");
        assert_eq!(entries(&base), vec!["dir", "top.txt"]);
    }

    #[tokio::test]
    async fn dropping_a_batch_leaves_nothing_behind() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path());
        let alice = VerifiedIdentity::for_tests("alice");

        let mut batch = store.batch(&alice);
        stage_bytes(&mut batch, "site/index.html", b"<h1>hi</h1>").await;
        drop(batch);

        let site = root.path().join("alice/site");
        assert!(entries(&site).is_empty());
    }

    #[tokio::test]
    async fn republishing_replaces_content() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path());
        let alice = VerifiedIdentity::for_tests("alice");

        for contents in [&b"first version"[..], &b"v2"[..]] {
            let mut batch = store.batch(&alice);
            stage_bytes(&mut batch, "a/b.txt", contents).await;
            batch.commit().await.unwrap();
        }

        let dir = root.path().join("alice/a");
        assert_eq!(std::fs::read(dir.join("b.txt")).unwrap(), b"v2");
        assert_eq!(entries(&dir), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn identities_do_not_share_a_subtree() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path());

        for who in ["alice", "bob"] {
            let identity = VerifiedIdentity::for_tests(who);
            let mut batch = store.batch(&identity);
            stage_bytes(&mut batch, "same.txt", who.as_bytes()).await;
            batch.commit().await.unwrap();
        }

        assert_eq!(std::fs::read(root.path().join("alice/same.txt")).unwrap(), b"alice");
        assert_eq!(std::fs::read(root.path().join("bob/same.txt")).unwrap(), b"bob");
    }

    #[tokio::test]
    async fn file_and_directory_on_one_path_publish_nothing() {
        for order in [["a/b", "a"], ["a", "a/b"]] {
            let root = TempDir::new().unwrap();
            let store = UploadStore::new(root.path());
            let alice = VerifiedIdentity::for_tests("alice");

            let mut batch = store.batch(&alice);
            stage_bytes(&mut batch, "first.txt", b"1").await;
            for declared in order {
                stage_bytes(&mut batch, declared, declared.as_bytes()).await;
            }

            match batch.commit().await {
                Err(StorageError::Conflict { path }) => assert!(path.ends_with("a")),
                other => panic!("unexpected: {other:?}"),
            }
            let base = root.path().join("alice");
            assert!(!base.join("first.txt").exists());
            assert!(!base.join("a/b").exists());
            assert!(entries(&base.join("a")).is_empty());
        }
    }

    #[tokio::test]
    async fn existing_directory_is_not_replaced_by_a_file() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path());
        let alice = VerifiedIdentity::for_tests("alice");

        let mut batch = store.batch(&alice);
        stage_bytes(&mut batch, "docs/index.html", b"old").await;
        batch.commit().await.unwrap();

        let mut batch = store.batch(&alice);
        stage_bytes(&mut batch, "docs", b"file").await;
        assert!(matches!(
            batch.commit().await,
            Err(StorageError::Conflict { .. })
        ));
        assert_eq!(
            std::fs::read(root.path().join("alice/docs/index.html")).unwrap(),
            b"old"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn created_directories_are_owner_restricted() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path().join("uploads"));
        store.ensure_root().await.unwrap();
        let alice = VerifiedIdentity::for_tests("alice");

        let mut batch = store.batch(&alice);
        stage_bytes(&mut batch, "deep/er/file", b"x").await;
        batch.commit().await.unwrap();

        let mode = std::fs::metadata(store.root().join("alice/deep"))
            .unwrap()
            .permissions()
            .mode();
        // umask may only remove bits
        assert_eq!(mode & 0o777 & !DIR_MODE, 0);
    }
}
