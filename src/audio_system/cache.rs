/// Resource registries and decoded-buffer caches
///
/// One [`Library`] per resource kind holds the name→URL registry, the
/// name→buffer cache and the in-flight loads. Concurrent loads of the same
/// name share one retrieval+decode; every joined caller receives the same
/// outcome. A failed load leaves nothing behind, so the next call retries.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::backend::{AudioBackend, DecodedAudio};
use super::fetch::ResourceFetcher;
use super::source::ResourceKind;
use crate::error::AudioError;

type LoadOutcome = Result<Arc<DecodedAudio>, AudioError>;

/// A load in progress that other callers can wait on
struct PendingLoad {
    outcome: Mutex<Option<LoadOutcome>>,
    done: Condvar,
}

impl PendingLoad {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> LoadOutcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut outcome);
        }
    }

    fn complete(&self, result: LoadOutcome) {
        *self.outcome.lock() = Some(result);
        self.done.notify_all();
    }
}

#[derive(Default)]
struct LibraryState {
    /// Registration order, for listing
    order: Vec<String>,
    urls: HashMap<String, String>,
    buffers: HashMap<String, Arc<DecodedAudio>>,
    in_flight: HashMap<String, Arc<PendingLoad>>,
}

/// Registry and cache for one resource kind
struct Library {
    kind: ResourceKind,
    state: Mutex<LibraryState>,
}

impl Library {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            state: Mutex::new(LibraryState::default()),
        }
    }

    fn register(&self, name: &str, url: &str) {
        let mut state = self.state.lock();
        if state.urls.insert(name.to_string(), url.to_string()).is_none() {
            state.order.push(name.to_string());
        }
        tracing::debug!("Registered {} '{}' -> {}", self.kind, name, url);
    }
}

/// Clears the in-flight marker and wakes waiters even if the loader unwinds
struct LoadGuard<'a> {
    library: &'a Library,
    name: &'a str,
    pending: Arc<PendingLoad>,
    finished: bool,
}

impl LoadGuard<'_> {
    fn finish(mut self, result: LoadOutcome) -> LoadOutcome {
        {
            let mut state = self.library.state.lock();
            state.in_flight.remove(self.name);
            if let Ok(buffer) = &result {
                state.buffers.insert(self.name.to_string(), Arc::clone(buffer));
            }
        }
        self.pending.complete(result.clone());
        self.finished = true;
        result
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.library.state.lock().in_flight.remove(self.name);
        self.pending.complete(Err(AudioError::LoadAborted {
            kind: self.library.kind,
            name: self.name.to_string(),
        }));
    }
}

/// Name→URL registries and decoded-buffer caches for BGM and SFX
pub struct ResourceCache {
    bgm: Library,
    sfx: Library,
    fetcher: Arc<dyn ResourceFetcher>,
    backend: Arc<dyn AudioBackend>,
}

impl ResourceCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            bgm: Library::new(ResourceKind::Bgm),
            sfx: Library::new(ResourceKind::Sfx),
            fetcher,
            backend,
        }
    }

    fn library(&self, kind: ResourceKind) -> &Library {
        match kind {
            ResourceKind::Bgm => &self.bgm,
            ResourceKind::Sfx => &self.sfx,
        }
    }

    /// Register or replace the URL for `name`
    ///
    /// A buffer already cached under `name` is kept.
    pub fn register(&self, kind: ResourceKind, name: &str, url: &str) {
        self.library(kind).register(name, url);
    }

    /// Registered names in registration order
    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.library(kind).state.lock().order.clone()
    }

    pub fn url(&self, kind: ResourceKind, name: &str) -> Option<String> {
        self.library(kind).state.lock().urls.get(name).cloned()
    }

    pub fn is_registered(&self, kind: ResourceKind, name: &str) -> bool {
        self.library(kind).state.lock().urls.contains_key(name)
    }

    pub fn is_loaded(&self, kind: ResourceKind, name: &str) -> bool {
        self.library(kind).state.lock().buffers.contains_key(name)
    }

    pub fn is_loading(&self, kind: ResourceKind, name: &str) -> bool {
        self.library(kind).state.lock().in_flight.contains_key(name)
    }

    /// Cached buffer for `name`, without loading
    pub fn cached(&self, kind: ResourceKind, name: &str) -> Option<Arc<DecodedAudio>> {
        self.library(kind).state.lock().buffers.get(name).cloned()
    }

    /// Load `name`, reusing the cache or an in-flight load when possible
    ///
    /// Blocks the calling thread for the retrieval and decode.
    pub fn load(&self, kind: ResourceKind, name: &str) -> Result<Arc<DecodedAudio>, AudioError> {
        let library = self.library(kind);

        let (url, pending) = {
            let mut state = library.state.lock();
            let url = state
                .urls
                .get(name)
                .cloned()
                .ok_or_else(|| AudioError::NotRegistered {
                    kind,
                    name: name.to_string(),
                })?;

            if let Some(buffer) = state.buffers.get(name) {
                return Ok(Arc::clone(buffer));
            }

            if let Some(pending) = state.in_flight.get(name) {
                let pending = Arc::clone(pending);
                drop(state);
                tracing::debug!("Joining in-flight load of {} '{}'", kind, name);
                return pending.wait();
            }

            let pending = Arc::new(PendingLoad::new());
            state.in_flight.insert(name.to_string(), Arc::clone(&pending));
            (url, pending)
        };

        let guard = LoadGuard {
            library,
            name,
            pending,
            finished: false,
        };

        tracing::debug!("Loading {} '{}' from {}", kind, name, url);
        let result = self.fetch_and_decode(kind, name, &url);
        match &result {
            Ok(buffer) => tracing::info!(
                "Loaded {} '{}' ({:.2}s, {} ch @ {} Hz)",
                kind,
                name,
                buffer.duration().as_secs_f32(),
                buffer.channels(),
                buffer.sample_rate()
            ),
            Err(e) => tracing::warn!("Failed to load {} '{}': {}", kind, name, e),
        }

        guard.finish(result)
    }

    fn fetch_and_decode(&self, kind: ResourceKind, name: &str, url: &str) -> LoadOutcome {
        let bytes = self
            .fetcher
            .fetch(url)
            .map_err(|e| AudioError::RetrievalFailed {
                url: url.to_string(),
                source: Arc::new(e),
            })?;

        let audio = self
            .backend
            .decode(&bytes)
            .map_err(|e| AudioError::DecodeFailed {
                kind,
                name: name.to_string(),
                source: Arc::new(e),
            })?;

        Ok(Arc::new(audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::backend::HeadlessBackend;
    use crate::audio_system::fetch::MemoryFetcher;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use std::io::Cursor;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wav_bytes() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..800 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn cache() -> (ResourceCache, Arc<MemoryFetcher>, Arc<HeadlessBackend>) {
        let fetcher = Arc::new(MemoryFetcher::new());
        let backend = Arc::new(HeadlessBackend::new(Arc::new(ManualClock::new())));
        let cache = ResourceCache::new(fetcher.clone(), backend.clone());
        (cache, fetcher, backend)
    }

    #[test]
    fn test_register_is_upsert() {
        let (cache, _, _) = cache();
        cache.register(ResourceKind::Bgm, "title", "a.wav");
        cache.register(ResourceKind::Bgm, "stage1", "b.wav");
        cache.register(ResourceKind::Bgm, "title", "c.wav");

        assert_eq!(cache.names(ResourceKind::Bgm), vec!["title", "stage1"]);
        assert_eq!(cache.url(ResourceKind::Bgm, "title").as_deref(), Some("c.wav"));
        assert!(cache.names(ResourceKind::Sfx).is_empty());
    }

    #[test]
    fn test_kinds_are_independent() {
        let (cache, _, _) = cache();
        cache.register(ResourceKind::Sfx, "hit", "hit.wav");
        assert!(cache.is_registered(ResourceKind::Sfx, "hit"));
        assert!(!cache.is_registered(ResourceKind::Bgm, "hit"));
    }

    #[test]
    fn test_load_unregistered() {
        let (cache, _, _) = cache();
        let err = cache.load(ResourceKind::Bgm, "missing").unwrap_err();
        assert!(matches!(err, AudioError::NotRegistered { kind: ResourceKind::Bgm, .. }));
    }

    #[test]
    fn test_load_caches_result() {
        let (cache, fetcher, backend) = cache();
        fetcher.insert("mem://hit", wav_bytes());
        cache.register(ResourceKind::Sfx, "hit", "mem://hit");

        let first = cache.load(ResourceKind::Sfx, "hit").unwrap();
        let second = cache.load(ResourceKind::Sfx, "hit").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.decode_count(), 1);
        assert!(cache.is_loaded(ResourceKind::Sfx, "hit"));
        assert!(!cache.is_loading(ResourceKind::Sfx, "hit"));
    }

    #[test]
    fn test_retrieval_failure_leaves_cache_clean() {
        let (cache, fetcher, _) = cache();
        cache.register(ResourceKind::Bgm, "title", "mem://title");

        let err = cache.load(ResourceKind::Bgm, "title").unwrap_err();
        assert!(matches!(err, AudioError::RetrievalFailed { .. }));
        assert!(!cache.is_loaded(ResourceKind::Bgm, "title"));
        assert!(!cache.is_loading(ResourceKind::Bgm, "title"));

        fetcher.insert("mem://title", wav_bytes());
        assert!(cache.load(ResourceKind::Bgm, "title").is_ok());
    }

    #[test]
    fn test_decode_failure_leaves_cache_clean() {
        let (cache, fetcher, _) = cache();
        fetcher.insert("mem://broken", b"not audio".to_vec());
        cache.register(ResourceKind::Sfx, "broken", "mem://broken");

        let err = cache.load(ResourceKind::Sfx, "broken").unwrap_err();
        assert!(matches!(err, AudioError::DecodeFailed { .. }));
        assert!(cache.cached(ResourceKind::Sfx, "broken").is_none());
        assert!(!cache.is_loading(ResourceKind::Sfx, "broken"));
    }

    #[test]
    fn test_reregister_keeps_cached_buffer() {
        let (cache, fetcher, backend) = cache();
        fetcher.insert("mem://a", wav_bytes());
        cache.register(ResourceKind::Bgm, "title", "mem://a");
        cache.load(ResourceKind::Bgm, "title").unwrap();

        cache.register(ResourceKind::Bgm, "title", "mem://b");
        assert!(cache.load(ResourceKind::Bgm, "title").is_ok());
        assert_eq!(backend.decode_count(), 1);
    }

    /// Fetcher whose first call blocks until released and then panics
    struct PanickingFetcher {
        inner: MemoryFetcher,
        calls: Mutex<usize>,
        released: Mutex<bool>,
        release: Condvar,
    }

    impl ResourceFetcher for PanickingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let call = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            if call == 1 {
                let mut released = self.released.lock();
                while !*released {
                    self.release.wait(&mut released);
                }
                panic!("fetcher blew up on {}", url);
            }
            self.inner.fetch(url)
        }
    }

    #[test]
    fn test_unwinding_loader_aborts_joined_callers() {
        let fetcher = Arc::new(PanickingFetcher {
            inner: MemoryFetcher::new(),
            calls: Mutex::new(0),
            released: Mutex::new(false),
            release: Condvar::new(),
        });
        fetcher.inner.insert("mem://title", wav_bytes());
        let backend = Arc::new(HeadlessBackend::new(Arc::new(ManualClock::new())));
        let cache = Arc::new(ResourceCache::new(fetcher.clone(), backend));
        cache.register(ResourceKind::Bgm, "title", "mem://title");

        let loader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.load(ResourceKind::Bgm, "title"))
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while *fetcher.calls.lock() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cache.is_loading(ResourceKind::Bgm, "title"));

        let joiner = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.load(ResourceKind::Bgm, "title"))
        };
        thread::sleep(Duration::from_millis(50));
        *fetcher.released.lock() = true;
        fetcher.release.notify_all();

        assert!(loader.join().is_err());
        let err = joiner.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            AudioError::LoadAborted { kind: ResourceKind::Bgm, ref name } if name == "title"
        ));
        assert_eq!(*fetcher.calls.lock(), 1);
        assert!(!cache.is_loading(ResourceKind::Bgm, "title"));
        assert!(!cache.is_loaded(ResourceKind::Bgm, "title"));

        assert!(cache.load(ResourceKind::Bgm, "title").is_ok());
        assert!(cache.is_loaded(ResourceKind::Bgm, "title"));
    }
}
