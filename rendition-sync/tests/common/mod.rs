#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};

use rendition_core::{AssetClass, CatalogEntry, CatalogScope, ProjectId, RenditionConfig};
use rendition_renderer::RenditionLayout;
use rendition_sync::{
    Collaborators, Coordinator, MemorySnapshotStore, RasterConverter, RasterizeOutput,
    RasterizeRequest, Rasterizer, RemoteError, RenderedBinary, RenditionReader, RenditionStore,
    CatalogSource, SnapshotStore, Thumbnailer,
};

pub const PROJECT: &str = "site";

#[derive(Debug, Clone)]
struct Object {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory asset service. Every write gets a strictly later timestamp so
/// renditions produced after a source are never stale.
pub struct FakeRemote {
    files: Mutex<BTreeMap<String, Object>>,
    clock: AtomicUsize,
    layouts: BTreeMap<AssetClass, RenditionLayout>,
    pub mailbox: Option<PathBuf>,
    pub fail_fetch: AtomicBool,
    pub fail_convert: AtomicBool,
    pub fail_move: AtomicBool,
    /// Sources the converter silently fails to produce.
    pub skip_convert: Mutex<BTreeSet<String>>,
    pub fetch_calls: AtomicUsize,
    pub convert_calls: AtomicUsize,
    pub rasterize_calls: AtomicUsize,
    pub move_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub documents: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new(config: &RenditionConfig) -> Self {
        let layouts = AssetClass::all()
            .iter()
            .map(|c| (*c, RenditionLayout::new(config, *c).unwrap()))
            .collect();
        Self {
            files: Mutex::new(BTreeMap::new()),
            clock: AtomicUsize::new(0),
            layouts,
            mailbox: None,
            fail_fetch: AtomicBool::new(false),
            fail_convert: AtomicBool::new(false),
            fail_move: AtomicBool::new(false),
            skip_convert: Mutex::new(BTreeSet::new()),
            fetch_calls: AtomicUsize::new(0),
            convert_calls: AtomicUsize::new(0),
            rasterize_calls: AtomicUsize::new(0),
            move_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mailbox(mut self, dir: PathBuf) -> Self {
        self.mailbox = Some(dir);
        self
    }

    fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(n)
    }

    pub fn write(&self, path: &str, bytes: &[u8]) {
        let modified = self.tick();
        self.files.lock().unwrap().insert(
            path.to_string(),
            Object {
                bytes: bytes.to_vec(),
                modified,
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    /// Rename a source without touching its content or timestamp.
    pub fn rename(&self, from: &str, to: &str) {
        let mut files = self.files.lock().unwrap();
        let object = files.remove(from).expect("source to rename");
        files.insert(to.to_string(), object);
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).map(|o| o.bytes.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    fn layout(&self, class: AssetClass) -> &RenditionLayout {
        &self.layouts[&class]
    }

    fn rename_object(&self, from: &str, to: &str) -> bool {
        let mut files = self.files.lock().unwrap();
        match files.remove(from) {
            Some(object) => {
                files.insert(to.to_string(), object);
                true
            }
            None => false,
        }
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `source="..."` attributes of an aggregation document.
pub fn document_sources(document: &str) -> Vec<String> {
    document
        .split("source=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

impl CatalogSource for FakeRemote {
    fn fetch_catalog(
        &self,
        _project: &ProjectId,
        _scope: &CatalogScope,
    ) -> Result<Vec<CatalogEntry>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Http("timed out".to_string()));
        }
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .map(|(path, o)| CatalogEntry::file(path, &fingerprint(&o.bytes), o.modified))
            .collect())
    }
}

impl RasterConverter for FakeRemote {
    fn convert_images(
        &self,
        _project: &ProjectId,
        _scope: &CatalogScope,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_convert.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                code: 500,
                url: "convert".to_string(),
            });
        }
        let layout = self.layout(AssetClass::Image);
        let skipped = self.skip_convert.lock().unwrap().clone();
        let mut created = 0;
        for path in paths.iter().filter(|p| !skipped.contains(*p)) {
            if let Some(bytes) = self.read(path) {
                self.write(&layout.primary_path(path), &bytes);
                created += 1;
            }
        }
        Ok(created)
    }
}

impl Rasterizer for FakeRemote {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<RasterizeOutput, RemoteError> {
        self.rasterize_calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.staged_at.exists(), "document must be staged before submission");
        self.documents.lock().unwrap().push(request.document.to_string());
        if self.fail_convert.load(Ordering::SeqCst) {
            return Err(RemoteError::Http("rasterizer unavailable".to_string()));
        }

        let sources = document_sources(request.document);
        match &self.mailbox {
            None => Ok(RasterizeOutput::Binaries(
                sources
                    .into_iter()
                    .map(|source| RenderedBinary {
                        bytes: format!("png:{source}").into_bytes(),
                        source_path: source,
                        sub_id: None,
                        language: None,
                    })
                    .collect(),
            )),
            Some(dir) => {
                let layout = self.layout(request.class);
                std::fs::create_dir_all(dir).unwrap();
                for source in sources {
                    let name = layout.mailbox_name(&source, None, None);
                    std::fs::write(dir.join(name), format!("png:{source}")).unwrap();
                }
                Ok(RasterizeOutput::Mailbox(dir.clone()))
            }
        }
    }
}

impl RenditionStore for FakeRemote {
    fn move_renditions(
        &self,
        _project: &ProjectId,
        class: AssetClass,
        pairs: &[(String, String)],
    ) -> Result<usize, RemoteError> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_move.load(Ordering::SeqCst) {
            return Err(RemoteError::Http("move endpoint down".to_string()));
        }
        let layout = self.layout(class);
        let mut moved = 0;
        for (old, new) in pairs {
            let (old_primary, old_thumb) = layout.derived_paths(old).unwrap();
            let (new_primary, new_thumb) = layout.derived_paths(new).unwrap();
            if self.rename_object(&old_primary, &new_primary) {
                moved += 1;
            }
            self.rename_object(&old_thumb, &new_thumb);
        }
        Ok(moved)
    }

    fn remove_renditions(
        &self,
        _project: &ProjectId,
        class: AssetClass,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let layout = self.layout(class);
        let mut files = self.files.lock().unwrap();
        let mut removed = 0;
        for path in paths {
            let targets = if layout.is_rendition(path) {
                vec![path.clone()]
            } else {
                let (primary, thumb) = layout.derived_paths(path).unwrap();
                vec![primary, thumb]
            };
            for target in targets {
                removed += usize::from(files.remove(&target).is_some());
            }
        }
        Ok(removed)
    }

    fn open(&self, _project: &ProjectId, path: &str) -> Result<RenditionReader, RemoteError> {
        let bytes = self
            .read(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        Ok(RenditionReader {
            declared_len: bytes.len() as u64,
            reader: Box::new(std::io::Cursor::new(bytes)),
        })
    }

    fn put(&self, _project: &ProjectId, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        self.write(path, bytes);
        Ok(())
    }

    fn delete(&self, _project: &ProjectId, path: &str) -> Result<(), RemoteError> {
        self.remove(path);
        Ok(())
    }
}

/// Prefixes the input; rejects anything containing `corrupt`.
pub struct FakeThumbnailer;

impl Thumbnailer for FakeThumbnailer {
    fn thumbnail(&self, bytes: &[u8], max_size: u32) -> Result<Vec<u8>, RemoteError> {
        if bytes.windows(7).any(|w| w == b"corrupt") {
            return Err(RemoteError::Protocol("cannot decode image".to_string()));
        }
        let mut out = format!("thumb{max_size}:").into_bytes();
        out.extend_from_slice(bytes);
        Ok(out)
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub coordinator: Coordinator,
    pub staging: tempfile::TempDir,
}

pub fn config(staging: &std::path::Path) -> RenditionConfig {
    RenditionConfig {
        staging_dir: staging.to_path_buf(),
        debug: true,
        ..RenditionConfig::default()
    }
}

pub fn harness() -> Harness {
    let staging = tempfile::TempDir::new().unwrap();
    let cfg = config(staging.path());
    let remote = Arc::new(FakeRemote::new(&cfg));
    harness_with(cfg, remote, Arc::new(MemorySnapshotStore::new()), staging)
}

pub fn harness_with(
    config: RenditionConfig,
    remote: Arc<FakeRemote>,
    snapshots: Arc<dyn SnapshotStore>,
    staging: tempfile::TempDir,
) -> Harness {
    let collaborators = Collaborators {
        catalog: remote.clone(),
        snapshots: snapshots.clone(),
        converter: remote.clone(),
        rasterizer: remote.clone(),
        store: remote.clone(),
        thumbnailer: Arc::new(FakeThumbnailer),
    };
    Harness {
        coordinator: Coordinator::new(config, collaborators).unwrap(),
        remote,
        snapshots,
        staging,
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
