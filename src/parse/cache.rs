//! Hash-keyed AST cache with TTL eviction.
//!
//! Entries are keyed by SHA-256 of the source bytes and live for a short
//! TTL. Lookups clone the stored tree. One background task per cache
//! sweeps expired entries; it stops when the cache shuts down with the
//! engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tree_sitter::{Parser, Tree};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// How often the background task sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    tree: Tree,
    stored_at: Instant,
}

struct Inner {
    entries: DashMap<[u8; 32], CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Inner {
    fn sweep(&self) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "ast cache sweep");
        }
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

pub struct AstCache {
    inner: Arc<Inner>,
    stop: Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });

        let (stop, rx) = mpsc::channel();
        let sweeper_inner = Arc::clone(&inner);
        let sweeper = std::thread::spawn(move || {
            loop {
                match rx.recv_timeout(SWEEP_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => sweeper_inner.sweep(),
                    _ => break,
                }
            }
        });

        Self {
            inner,
            stop,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Look up a tree for the source bytes, parsing on miss. Returns the
    /// tree and whether it was a cache hit, or `None` when the grammar
    /// produced no tree (nothing is cached in that case).
    ///
    /// If two callers race to insert the same hash, the first stored wins;
    /// the loser returns its own freshly parsed tree without storing it.
    pub fn get_or_parse(&self, parser: &mut Parser, source: &str) -> Option<(Tree, bool)> {
        let key: [u8; 32] = Sha256::digest(source.as_bytes()).into();

        if let Some(entry) = self.inner.entries.get(&key) {
            if entry.stored_at.elapsed() < self.inner.ttl {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Some((entry.tree.clone(), true));
            }
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let tree = parser.parse(source, None)?;

        match self.inner.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    tree: tree.clone(),
                    stored_at: Instant::now(),
                });
            }
            Entry::Occupied(mut occupied) => {
                // Refresh a stale entry; otherwise the first stored wins.
                if occupied.get().stored_at.elapsed() >= self.inner.ttl {
                    occupied.insert(CacheEntry {
                        tree: tree.clone(),
                        stored_at: Instant::now(),
                    });
                }
            }
        }

        Some((tree, false))
    }

    /// Remove expired entries immediately.
    pub fn evict_expired(&self) {
        self.inner.sweep();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Stop the background sweeper. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for AstCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AstCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
