use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use super::{panic_message, ExtractionContext, Extraction, Extractor, RegistryError};
use crate::decoders::{BasicFallbackDecoder, BUILTIN_DECODERS};

/// Extensions every extractor is probed with at registration.
pub const PROBE_EXTENSIONS: &[&str] = &[
    "dm3", "dm4", "ser", "emi", "tif", "tiff", "spc", "msa", "txt", "png", "jpg", "jpeg", "bmp", "gif",
];

/// Directory that never exists; probe contexts point into it.
const PROBE_DIR: &str = "nexuslims-extract-probe-does-not-exist";

/// How an extractor ended up indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Indexed under these extensions
    Extensions(Vec<String>),
    /// Matched no probe extension; consulted for every file after the extension lists
    Wildcard,
}

struct Registered {
    seq: usize,
    extractor: Arc<dyn Extractor>,
    registration: Registration,
}

/// Extension-indexed, priority-ordered set of extractors.
///
/// Equal priorities resolve to the earlier registration. Re-registering an
/// identity replaces the extractor in its original slot.
pub struct ExtractorRegistry {
    entries: Vec<Registered>,
    by_extension: BTreeMap<String, Vec<usize>>,
    wildcards: Vec<usize>,
    fallback: Arc<dyn Extractor>,
    next_seq: usize,
}

impl ExtractorRegistry {
    /// Empty registry; [`select`](Self::select) returns the fallback for everything.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_extension: BTreeMap::new(),
            wildcards: Vec::new(),
            fallback: Arc::new(BasicFallbackDecoder),
            next_seq: 0,
        }
    }

    /// Registry holding every built-in decoder.
    ///
    /// Decoders that fail registration are logged and left out.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for factory in BUILTIN_DECODERS {
            if let Err(err) = registry.register(factory()) {
                log::warn!("excluding decoder: {err}");
            }
        }
        log::info!(
            "extractor registry built: {} decoders, {} extensions, {} wildcards",
            registry.entries.len(),
            registry.by_extension.len(),
            registry.wildcards.len()
        );
        registry
    }

    /// Register an extractor by probing it with [`PROBE_EXTENSIONS`].
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) -> Result<Registration, RegistryError> {
        let name = extractor.name();
        let mut matched = Vec::new();
        let mut failures = 0;
        let mut last_error = String::new();
        for ext in PROBE_EXTENSIONS {
            let probe = ExtractionContext::new(PathBuf::from(PROBE_DIR).join(format!("probe.{ext}")), None);
            match guarded_supports(extractor.as_ref(), &probe) {
                Ok(true) => matched.push((*ext).to_string()),
                Ok(false) => {}
                Err(message) => {
                    log::warn!("decoder {name} failed probe for .{ext}: {message}");
                    failures += 1;
                    last_error = message;
                }
            }
        }
        if failures == PROBE_EXTENSIONS.len() {
            return Err(RegistryError::ProbeFailed {
                name: name.to_string(),
                failures,
                last_error,
            });
        }

        let registration = if matched.is_empty() {
            Registration::Wildcard
        } else {
            Registration::Extensions(matched)
        };
        log::debug!("registered {name} (priority {}): {registration:?}", extractor.priority());

        match self.entries.iter_mut().find(|e| e.extractor.name() == name) {
            Some(existing) => {
                existing.extractor = extractor;
                existing.registration = registration.clone();
            }
            None => {
                self.entries.push(Registered {
                    seq: self.next_seq,
                    extractor,
                    registration: registration.clone(),
                });
                self.next_seq += 1;
            }
        }
        self.reindex();
        Ok(registration)
    }

    /// Register a concrete extractor value.
    pub fn register_decoder<E: Extractor + 'static>(&mut self, extractor: E) -> Result<Registration, RegistryError> {
        self.register(Arc::new(extractor))
    }

    fn reindex(&mut self) {
        self.by_extension.clear();
        self.wildcards.clear();
        for (index, entry) in self.entries.iter().enumerate() {
            match &entry.registration {
                Registration::Wildcard => self.wildcards.push(index),
                Registration::Extensions(exts) => {
                    for ext in exts {
                        self.by_extension.entry(ext.clone()).or_default().push(index);
                    }
                }
            }
        }
        let entries = &self.entries;
        let order = |i: &usize| (Reverse(entries[*i].extractor.priority()), entries[*i].seq);
        for list in self.by_extension.values_mut() {
            list.sort_by_key(order);
        }
        self.wildcards.sort_by_key(order);
    }

    /// Pick the extractor for `ctx`. Never fails.
    ///
    /// Extension candidates come first in priority order, then wildcards, then
    /// the fallback. A `supports` error or panic counts as "no".
    pub fn select(&self, ctx: &ExtractionContext<'_>) -> Arc<dyn Extractor> {
        let extension_list = ctx
            .extension()
            .and_then(|ext| self.by_extension.get(&ext))
            .map(Vec::as_slice)
            .unwrap_or_default();
        for &index in extension_list.iter().chain(&self.wildcards) {
            let extractor = &self.entries[index].extractor;
            match guarded_supports(extractor.as_ref(), ctx) {
                Ok(true) => {
                    log::debug!("selected {} for {}", extractor.name(), ctx.path().display());
                    return Arc::clone(extractor);
                }
                Ok(false) => {}
                Err(message) => log::warn!(
                    "{} failed to sniff {}: {message}",
                    extractor.name(),
                    ctx.path().display()
                ),
            }
        }
        log::debug!("no specific decoder for {}, using fallback", ctx.path().display());
        Arc::clone(&self.fallback)
    }

    /// Select and run an extractor.
    pub fn extract(&self, ctx: &ExtractionContext<'_>) -> Extraction {
        self.select(ctx).extract(ctx)
    }

    /// Names indexed under `extension`, in selection order
    pub fn extractors_for(&self, extension: &str) -> Vec<&'static str> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .map(|list| list.iter().map(|&i| self.entries[i].extractor.name()).collect())
            .unwrap_or_default()
    }

    /// Wildcard names, in selection order
    pub fn wildcard_names(&self) -> Vec<&'static str> {
        self.wildcards.iter().map(|&i| self.entries[i].extractor.name()).collect()
    }

    /// Indexed extensions, sorted
    pub fn extensions(&self) -> Vec<&str> {
        self.by_extension.keys().map(String::as_str).collect()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.extractor.name()).collect()
    }

    /// Look up an extractor by identity
    pub fn get(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.entries
            .iter()
            .find(|e| e.extractor.name() == name)
            .map(|e| Arc::clone(&e.extractor))
    }

    /// The terminal decoder
    pub fn fallback(&self) -> &Arc<dyn Extractor> {
        &self.fallback
    }

    /// Number of registered extractors, excluding the fallback
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing but the fallback is available
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .field("extensions", &self.by_extension.keys().collect::<Vec<_>>())
            .field("wildcards", &self.wildcard_names())
            .finish()
    }
}

fn guarded_supports(extractor: &dyn Extractor, ctx: &ExtractionContext<'_>) -> Result<bool, String> {
    match catch_unwind(AssertUnwindSafe(|| extractor.supports(ctx))) {
        Ok(Ok(answer)) => Ok(answer),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

static GLOBAL: OnceLock<ExtractorRegistry> = OnceLock::new();

/// Process-wide registry of built-in decoders, built on first use.
pub fn global_registry() -> &'static ExtractorRegistry {
    GLOBAL.get_or_init(ExtractorRegistry::with_builtin)
}
