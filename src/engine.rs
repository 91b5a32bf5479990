//! The engine: registry + cache + journal threaded through every call site.
//!
//! An [`Engine`] is constructed once per working tree from an
//! [`EngineConfig`] and owns all shared state. There is no process-global
//! mutable state; hosts embedding morfx as a library create and drop
//! engines freely.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::apply::{self, RollbackOptions, RollbackReport, atomic_write, sha256_hex};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::journal::{
    Journal, KeyRow, LogEntry, NewPatch, PATCH_ALGO_BINARY, RunMeta, RunRow, RunSummary,
};
use crate::lang::{LanguageProvider, ProviderRegistry};
use crate::parse::{AstCache, CacheStats, parse_source};
use crate::query::{self, QueryMatch};
use crate::rewrite::{self, Confidence, Verb};

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Show the diff and confidence without touching disk or journal.
    pub dry_run: bool,
    /// Explicit language id overriding extension detection.
    pub lang: Option<String>,
}

/// What a transform produced.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub path: PathBuf,
    pub matches: usize,
    pub diff: String,
    pub confidence: Confidence,
    pub dry_run: bool,
    /// Operation and run ids; `None` on dry runs.
    pub op_id: Option<String>,
    pub run_public_id: Option<String>,
}

pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    registry: ProviderRegistry,
    cache: AstCache,
    journal: Journal,
}

impl Engine {
    /// Open the engine for the working tree at `root`.
    pub fn open(root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        let root = root.into();
        let journal = Journal::open(&root, &config)?;
        Ok(Self {
            root,
            config,
            registry: ProviderRegistry::with_builtins(),
            cache: AstCache::new(),
            journal,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Shut down background work and collapse the WAL if oversized.
    pub fn close(self) -> Result<()> {
        self.cache.shutdown();
        self.journal.maintain()
    }

    fn provider_for(
        &self,
        path: &Path,
        lang: Option<&str>,
    ) -> Result<Arc<dyn LanguageProvider>> {
        let provider = match lang {
            Some(name) => self.registry.get(name),
            None => self.registry.for_path(path),
        };
        provider.ok_or_else(|| {
            Error::QueryResolution(match lang {
                Some(name) => format!("unknown language '{name}'"),
                None => format!("no language provider for {}", path.display()),
            })
        })
    }

    /// Run a (possibly compound) query against one file.
    pub fn query_file(
        &self,
        path: &Path,
        expression: &str,
        lang: Option<&str>,
    ) -> Result<Vec<QueryMatch>> {
        let provider = self.provider_for(path, lang)?;
        let source = std::fs::read_to_string(path)?;
        let (tree, _) = parse_source(provider.as_ref(), &self.cache, path, &source)?;
        let expr = query::parse_expression(expression)?;
        query::evaluate(provider.as_ref(), &tree, &source, &expr)
    }

    /// Apply a transform verb to one file: locate targets, rewrite, write
    /// the temp file, rename it over the target, and only then commit the
    /// journal transaction holding the operation and patch rows.
    pub fn transform(
        &self,
        verb: Verb,
        expression: &str,
        path: &Path,
        content: &str,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        if !verb.is_mutating() {
            return Err(Error::QueryResolution(
                "use query_file for the query verb".to_string(),
            ));
        }

        let provider = self.provider_for(path, options.lang.as_deref())?;
        let source = std::fs::read_to_string(path)?;
        let (tree, _) = parse_source(provider.as_ref(), &self.cache, path, &source)?;

        let expr = query::parse_expression(expression)?;
        let matches = query::evaluate(provider.as_ref(), &tree, &source, &expr)?;

        let mut append_anchor = None;
        if matches.is_empty() {
            if verb == Verb::Append {
                // Smart append: land after the last declaration of the same
                // kind, or at end-of-file.
                append_anchor = provider.append_anchor(&tree, &source, content);
            } else {
                return Err(Error::QueryResolution(format!(
                    "no matches for '{expression}' in {}",
                    path.display()
                )));
            }
        }

        let pattern = wildcardiest_pattern(&expr);
        let rewrite = rewrite::rewrite(&source, verb, &matches, content, &pattern, append_anchor)?;

        // A rewrite that breaks a previously clean parse is rejected before
        // anything touches disk.
        let (new_tree, _) = parse_source(provider.as_ref(), &self.cache, path, &rewrite.output)?;
        if new_tree.root_node().has_error() && !tree.root_node().has_error() {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                reason: format!("{} produced invalid {}", verb.as_str(), provider.id()),
            });
        }

        if options.dry_run {
            return Ok(TransformOutcome {
                path: path.to_path_buf(),
                matches: matches.len(),
                diff: rewrite.diff,
                confidence: rewrite.confidence,
                dry_run: true,
                op_id: None,
                run_public_id: None,
            });
        }

        let run = self.journal.begin_run(RunMeta::default())?;
        let tx = self.journal.begin()?;
        let file_id = self.journal.ensure_file_tx(
            &tx,
            &run.id,
            &path.to_string_lossy(),
            provider.id(),
            source.len() as u64,
            &sha256_hex(source.as_bytes()),
        )?;
        let op = self
            .journal
            .append_op_tx(&tx, &run.id, file_id, verb.as_str())?;
        self.journal.record_patch_tx(
            &tx,
            &NewPatch {
                op_id: op.id.clone(),
                file_id,
                algo: PATCH_ALGO_BINARY.to_string(),
                forward: rewrite.output.clone().into_bytes(),
                reverse: source.clone().into_bytes(),
                bytes_added: rewrite.bytes_added,
                bytes_removed: rewrite.bytes_removed,
            },
        )?;
        if rewrite.confidence.score < 0.5 {
            self.journal.add_diagnostic_tx(
                &tx,
                &op.id,
                "warning",
                "low-confidence",
                &format!("confidence {:.2} for {}", rewrite.confidence.score, verb.as_str()),
                Some(&path.to_string_lossy()),
            )?;
        }

        // Filesystem first; the transaction only commits after the rename
        // succeeded, so a journal row without the file change cannot exist.
        atomic_write(path, rewrite.output.as_bytes())?;

        self.journal.set_file_result_tx(
            &tx,
            file_id,
            &sha256_hex(rewrite.output.as_bytes()),
            "modified",
        )?;
        self.journal.finish_op_tx(&tx, &op.id, "committed")?;
        tx.commit()?;

        self.journal.complete_run(
            &run.id,
            Some(json!({
                "operations": 1,
                "confidence": rewrite.confidence.score,
                "bytes_added": rewrite.bytes_added,
                "bytes_removed": rewrite.bytes_removed,
            })),
        )?;
        self.journal.append_log(
            "info",
            &format!("{} '{}' applied to {}", verb.as_str(), expression, path.display()),
        )?;
        self.journal.maintain()?;

        tracing::info!(op = %op.id, path = %path.display(), "transform committed");
        Ok(TransformOutcome {
            path: path.to_path_buf(),
            matches: matches.len(),
            diff: rewrite.diff,
            confidence: rewrite.confidence,
            dry_run: false,
            op_id: Some(op.id),
            run_public_id: Some(run.public_id),
        })
    }

    /// Roll back to an operation id or checkpoint name. The crash point
    /// from the engine config applies unless the options carry their own.
    pub fn rollback(&self, target: &str, options: &RollbackOptions) -> Result<RollbackReport> {
        let mut options = options.clone();
        if options.crash_point.is_none() {
            options.crash_point = self.config.crash_point;
        }
        let report = apply::rollback(&self.journal, &self.root, target, &options)?;
        if !report.dry_run {
            self.journal.append_log(
                "info",
                &format!(
                    "rollback of '{target}' reverted {} operation(s)",
                    report.reverted_operations
                ),
            )?;
        }
        Ok(report)
    }

    /// Record a checkpoint in the most recent run.
    pub fn checkpoint(&self, name: &str) -> Result<RunRow> {
        let run = self.journal.latest_run()?.ok_or_else(|| {
            Error::QueryResolution("no run to checkpoint; apply a transform first".to_string())
        })?;
        self.journal.checkpoint(&run.id, name, None)?;
        Ok(run)
    }

    pub fn history(&self, limit: u32) -> Result<Vec<RunRow>> {
        self.journal.list_runs(limit)
    }

    pub fn run_summary(&self, run_key: &str) -> Result<RunSummary> {
        self.journal.run_summary(run_key)
    }

    pub fn rotate_key(&self) -> Result<u32> {
        self.journal.rotate_key()
    }

    pub fn list_keys(&self) -> Result<Vec<KeyRow>> {
        self.journal.list_keys()
    }

    pub fn search_logs(&self, query: &str) -> Result<Vec<LogEntry>> {
        self.journal.search_logs(query, true)
    }
}

/// The name pattern shown to confidence scoring: the first wildcarded term
/// pattern if any term carries one, otherwise the first term's pattern.
fn wildcardiest_pattern(expr: &query::Expr) -> String {
    let patterns = term_patterns(expr);
    patterns
        .iter()
        .find(|p| p.contains('*'))
        .or_else(|| patterns.first())
        .cloned()
        .unwrap_or_default()
}

fn term_patterns(expr: &query::Expr) -> Vec<String> {
    match expr {
        query::Expr::Term(q) => vec![q.name.clone()],
        query::Expr::And(a, b) | query::Expr::Or(a, b) => {
            let mut patterns = term_patterns(a);
            patterns.extend(term_patterns(b));
            patterns
        }
        query::Expr::Not(inner) => term_patterns(inner),
    }
}
