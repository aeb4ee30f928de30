//! Async module evaluation with a single-flight cache.
//!
//! Each module id is evaluated at most once per build pass: the first caller
//! installs a shared future under the cache lock, every later caller awaits
//! the same future. Side effects (and side-channel CSS collection) therefore
//! happen exactly once no matter how many modules import the same file
//! concurrently.
//!
//! Resolution, loading and transformation are pluggable through hooks so the
//! embedding build tool can layer its own pipeline on top. Import cycles are
//! not detected and will hang; the source format has no legal cycles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::esm::{parse_imports, rewrite_esm};
use crate::script::{run_module, ImportHost, ImportKind, NativeFn, ScriptError, ScriptResult, Value};
use crate::script::new_object;
use crate::utils::{logging, ExtractError, Result};

/// Maps an import specifier to a module id on disk. `Ok(None)` means the
/// specifier is outside the resolver's domain (a bare package name) and is
/// handed to the [`NativeLoader`].
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<Option<PathBuf>>;
}

/// Supplies module source before the filesystem is consulted. `Ok(None)`
/// passes to the next hook.
#[async_trait]
pub trait LoadHook: Send + Sync {
    async fn load(&self, id: &Path) -> Result<Option<String>>;
}

/// Rewrites module source after loading, before evaluation.
#[async_trait]
pub trait TransformHook: Send + Sync {
    async fn transform(&self, code: String, id: &Path) -> Result<String>;
}

/// Provides values for specifiers the resolver declined (bare package
/// imports). The default registry is empty and fails the evaluation.
pub trait NativeLoader: Send + Sync {
    fn load(&self, specifier: &str, importer: &Path) -> Result<Value>;
}

struct EmptyNativeLoader;

impl NativeLoader for EmptyNativeLoader {
    fn load(&self, specifier: &str, importer: &Path) -> Result<Value> {
        Err(ExtractError::Resolution {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        })
    }
}

/// Filesystem resolver: relative and absolute specifiers only, with the
/// usual extension guessing. Bare specifiers are declined.
pub struct FsResolver;

const EXTENSION_CANDIDATES: &[&str] = &["", ".js", ".mjs", "/index.js"];

#[async_trait]
impl ModuleResolver for FsResolver {
    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<Option<PathBuf>> {
        if !specifier.starts_with('.') && !specifier.starts_with('/') {
            return Ok(None);
        }
        let base = importer.parent().unwrap_or_else(|| Path::new("."));
        for ext in EXTENSION_CANDIDATES {
            let candidate = base.join(format!("{}{}", specifier, ext));
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() {
                    let resolved = tokio::fs::canonicalize(&candidate).await?;
                    return Ok(Some(resolved));
                }
            }
        }
        Err(ExtractError::Resolution {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        })
    }
}

type ModuleFuture = Shared<BoxFuture<'static, Result<Value>>>;

pub struct Evaluator {
    resolver: Box<dyn ModuleResolver>,
    loaders: Vec<Box<dyn LoadHook>>,
    transformers: Vec<Box<dyn TransformHook>>,
    native: Box<dyn NativeLoader>,
    /// Specifier of the tagging module, served virtually.
    tag_module: String,
    cache: Mutex<HashMap<PathBuf, ModuleFuture>>,
}

impl Evaluator {
    pub fn new(tag_module: impl Into<String>) -> Self {
        Self {
            resolver: Box::new(FsResolver),
            loaders: Vec::new(),
            transformers: Vec::new(),
            native: Box::new(EmptyNativeLoader),
            tag_module: tag_module.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn LoadHook>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn with_transformer(mut self, transformer: Box<dyn TransformHook>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn with_native_loader(mut self, native: Box<dyn NativeLoader>) -> Self {
        self.native = native;
        self
    }

    pub fn tag_module(&self) -> &str {
        &self.tag_module
    }

    /// Drop all memoized evaluations. Must be called between build passes so
    /// edited modules re-run.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Evaluate the module at `id`, or join an evaluation already in flight.
    pub async fn evaluate(self: &Arc<Self>, id: &Path) -> Result<Value> {
        let future = {
            let mut cache = self.cache.lock();
            match cache.get(id) {
                Some(existing) => existing.clone(),
                None => {
                    let this = self.clone();
                    let id_owned = id.to_path_buf();
                    let future = async move { this.evaluate_uncached(&id_owned).await }
                        .boxed()
                        .shared();
                    cache.insert(id.to_path_buf(), future.clone());
                    future
                }
            }
        };
        future.await
    }

    async fn evaluate_uncached(self: &Arc<Self>, id: &Path) -> Result<Value> {
        logging::Logger::evaluating_module(&id.display().to_string());
        let mut code = None;
        for loader in &self.loaders {
            if let Some(loaded) = loader.load(id).await? {
                code = Some(loaded);
                break;
            }
        }
        let mut code = match code {
            Some(code) => code,
            None => tokio::fs::read_to_string(id).await?,
        };
        for transformer in &self.transformers {
            code = transformer.transform(code, id).await?;
        }
        self.run_rewritten(&code, id, "", Vec::new()).await
    }

    /// Rewrite `code` to the script form and run it in a fresh context.
    /// `extra_statements` is spliced in ahead of the wrapper epilogue and
    /// `extra_globals` are bound in the root scope; both exist for the
    /// extractor's side-channel instrumentation.
    pub async fn run_rewritten(
        self: &Arc<Self>,
        code: &str,
        id: &Path,
        extra_statements: &str,
        extra_globals: Vec<(String, Value)>,
    ) -> Result<Value> {
        let imports = parse_imports(code);
        let rewritten = rewrite_esm(code, &imports, extra_statements);
        let host: Arc<dyn ImportHost> = Arc::new(ModuleImportHost {
            evaluator: self.clone(),
            importer: id.to_path_buf(),
        });
        match run_module(&rewritten, host, extra_globals).await {
            Ok(exports) => Ok(exports),
            Err(ScriptError::Host(inner)) => Err(*inner),
            Err(other) => Err(ExtractError::Evaluation {
                id: id.to_path_buf(),
                message: other.to_string(),
                rewritten,
            }),
        }
    }

    /// The namespace served for imports of the tagging module itself: a
    /// `css` function that reassembles its template into plain text.
    fn tag_namespace(&self) -> Value {
        let ns = new_object();
        ns.lock().set("css", Value::Native(NativeFn::TemplateTagNoop));
        Value::Object(ns)
    }
}

struct ModuleImportHost {
    evaluator: Arc<Evaluator>,
    importer: PathBuf,
}

#[async_trait]
impl ImportHost for ModuleImportHost {
    async fn import(&self, kind: ImportKind, specifier: &str) -> ScriptResult<Value> {
        if specifier == self.evaluator.tag_module {
            return Ok(self.evaluator.tag_namespace());
        }
        let resolved = self
            .evaluator
            .resolver
            .resolve(specifier, &self.importer)
            .await
            .map_err(|e| ScriptError::Host(Box::new(e)))?;
        let exports = match resolved {
            Some(id) => self
                .evaluator
                .evaluate(&id)
                .await
                .map_err(|e| ScriptError::Host(Box::new(e)))?,
            None => self
                .evaluator
                .native
                .load(specifier, &self.importer)
                .map_err(|e| ScriptError::Host(Box::new(e)))?,
        };
        Ok(shape_for_kind(kind, exports))
    }
}

/// Adapt a module's exports object to the import form used at the call site.
fn shape_for_kind(kind: ImportKind, exports: Value) -> Value {
    match kind {
        ImportKind::Named | ImportKind::Namespace => match exports {
            Value::Object(_) => exports,
            other => {
                // A native value that is not an object is exposed as its own
                // default export.
                let ns = new_object();
                ns.lock().set("default", other);
                Value::Object(ns)
            }
        },
        ImportKind::Default => match &exports {
            Value::Object(obj) => obj.lock().get("default").unwrap_or(exports.clone()),
            _ => exports,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingLoader {
        source: String,
        loads: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LoadHook for CountingLoader {
        async fn load(&self, _id: &Path) -> Result<Option<String>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.source.clone()))
        }
    }

    fn export(exports: &Value, name: &str) -> Value {
        match exports {
            Value::Object(obj) => obj.lock().get(name).unwrap(),
            other => panic!("exports is a {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn concurrent_evaluations_share_one_flight() {
        let loads = Arc::new(AtomicU32::new(0));
        let evaluator = Arc::new(Evaluator::new("static-css-extract").with_loader(Box::new(
            CountingLoader {
                source: "export const n = 1\n".to_string(),
                loads: loads.clone(),
            },
        )));
        let id = PathBuf::from("/virtual/mod.js");
        let (a, b, c) = futures::join!(
            evaluator.evaluate(&id),
            evaluator.evaluate(&id),
            evaluator.evaluate(&id)
        );
        for exports in [a.unwrap(), b.unwrap(), c.unwrap()] {
            assert!(matches!(export(&exports, "n"), Value::Num(n) if n == 1.0));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_cache_forces_a_fresh_evaluation() {
        let loads = Arc::new(AtomicU32::new(0));
        let evaluator = Arc::new(Evaluator::new("static-css-extract").with_loader(Box::new(
            CountingLoader {
                source: "export const n = 1\n".to_string(),
                loads: loads.clone(),
            },
        )));
        let id = PathBuf::from("/virtual/mod.js");
        evaluator.evaluate(&id).await.unwrap();
        evaluator.evaluate(&id).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        evaluator.clear_cache();
        evaluator.evaluate(&id).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tagging_module_is_served_virtually() {
        let evaluator = Arc::new(Evaluator::new("static-css-extract").with_loader(Box::new(
            CountingLoader {
                source: "import {css} from 'static-css-extract'\nexport const a = css`color: red;`\n"
                    .to_string(),
                loads: Arc::new(AtomicU32::new(0)),
            },
        )));
        let exports = evaluator
            .evaluate(&PathBuf::from("/virtual/styles.js"))
            .await
            .unwrap();
        assert!(matches!(
            export(&exports, "a"),
            Value::Str(s) if s == "color: red;"
        ));
    }

    #[tokio::test]
    async fn relative_imports_resolve_with_extension_guessing() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("theme.js"), "export const color = 'red'\n")
            .await
            .unwrap();
        let entry = dir.path().join("entry.js");
        tokio::fs::write(
            &entry,
            "import {color} from './theme'\nexport const border = `1px solid ${color}`\n",
        )
        .await
        .unwrap();

        let evaluator = Arc::new(Evaluator::new("static-css-extract"));
        let exports = evaluator.evaluate(&entry).await.unwrap();
        assert!(matches!(
            export(&exports, "border"),
            Value::Str(s) if s == "1px solid red"
        ));
    }

    #[tokio::test]
    async fn default_import_reads_the_default_export() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("dep.js"), "export default 'from-default'\n")
            .await
            .unwrap();
        let entry = dir.path().join("entry.js");
        tokio::fs::write(&entry, "import d from './dep.js'\nexport const v = d\n")
            .await
            .unwrap();

        let evaluator = Arc::new(Evaluator::new("static-css-extract"));
        let exports = evaluator.evaluate(&entry).await.unwrap();
        assert!(matches!(
            export(&exports, "v"),
            Value::Str(s) if s == "from-default"
        ));
    }

    #[tokio::test]
    async fn bare_specifiers_fail_resolution_by_default() {
        let evaluator = Arc::new(Evaluator::new("static-css-extract").with_loader(Box::new(
            CountingLoader {
                source: "import {x} from 'left-pad'\n".to_string(),
                loads: Arc::new(AtomicU32::new(0)),
            },
        )));
        let err = evaluator
            .evaluate(&PathBuf::from("/virtual/mod.js"))
            .await
            .unwrap_err();
        match err {
            ExtractError::Resolution { specifier, .. } => assert_eq!(specifier, "left-pad"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn evaluation_errors_carry_the_rewritten_source() {
        let evaluator = Arc::new(Evaluator::new("static-css-extract").with_loader(Box::new(
            CountingLoader {
                source: "export const x = missing\n".to_string(),
                loads: Arc::new(AtomicU32::new(0)),
            },
        )));
        let err = evaluator
            .evaluate(&PathBuf::from("/virtual/mod.js"))
            .await
            .unwrap_err();
        match err {
            ExtractError::Evaluation { id, message, rewritten } => {
                assert_eq!(id, PathBuf::from("/virtual/mod.js"));
                assert!(message.contains("missing"));
                assert!(rewritten.starts_with("main = async () => {"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
