//! Snapshot resolution
//!
//! Resolvers are tried in priority order. Each one either claims the model
//! (`Ok(Some(files))`), declines (`Ok(None)`) so the next one runs, or fails
//! the whole load (`Err`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{RegistryConfig, ServiceConfig};
use crate::error::{Result, SomniaError};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const SINGLE_WEIGHTS: &str = "model.safetensors";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";

/// Files making up one model snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    /// Snapshot directory (first file's parent for registry downloads)
    pub root: PathBuf,
    /// `config.json`
    pub config: PathBuf,
    /// `tokenizer.json`
    pub tokenizer: PathBuf,
    /// `tokenizer_config.json`, carrying the chat template
    pub tokenizer_config: Option<PathBuf>,
    /// `generation_config.json`
    pub generation_config: Option<PathBuf>,
    /// safetensors weight files
    pub weights: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct WeightIndex {
    weight_map: std::collections::HashMap<String, String>,
}

/// Distinct shard names listed in a `model.safetensors.index.json`
///
/// # Errors
///
/// Returns [`SomniaError::ModelLoad`] if the index is not valid JSON.
pub fn shard_names(index_json: &str) -> Result<Vec<String>> {
    let index: WeightIndex =
        serde_json::from_str(index_json).map_err(|e| SomniaError::ModelLoad {
            reason: format!("Invalid weight index: {e}"),
        })?;
    let names: BTreeSet<String> = index.weight_map.into_values().collect();
    Ok(names.into_iter().collect())
}

fn optional_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    path.is_file().then_some(path)
}

impl ModelFiles {
    /// Read a snapshot directory
    ///
    /// Returns `Ok(None)` when `dir` has no `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] when `config.json` exists but the
    /// tokenizer or weights are missing.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>> {
        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            return Ok(None);
        }

        let tokenizer = optional_file(dir, TOKENIZER_FILE).ok_or_else(|| SomniaError::ModelLoad {
            reason: format!("{} has no {TOKENIZER_FILE}", dir.display()),
        })?;

        let weights = if let Some(single) = optional_file(dir, SINGLE_WEIGHTS) {
            vec![single]
        } else if let Some(index) = optional_file(dir, WEIGHTS_INDEX) {
            let json = std::fs::read_to_string(&index)?;
            let shards: Vec<PathBuf> = shard_names(&json)?
                .into_iter()
                .map(|name| dir.join(name))
                .collect();
            if let Some(missing) = shards.iter().find(|p| !p.is_file()) {
                return Err(SomniaError::ModelLoad {
                    reason: format!("Missing weight shard {}", missing.display()),
                });
            }
            shards
        } else {
            return Err(SomniaError::ModelLoad {
                reason: format!("{} has no safetensors weights", dir.display()),
            });
        };

        Ok(Some(Self {
            root: dir.to_path_buf(),
            config,
            tokenizer,
            tokenizer_config: optional_file(dir, TOKENIZER_CONFIG_FILE),
            generation_config: optional_file(dir, GENERATION_CONFIG_FILE),
            weights,
        }))
    }
}

/// One step of the resolution chain
pub trait ModelResolver: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Try to locate `model_id`
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] to abort resolution.
    fn resolve(&self, model_id: &str) -> Result<Option<ModelFiles>>;
}

/// Directory given explicitly by the operator
#[derive(Debug, Clone)]
pub struct ExplicitPathResolver {
    path: Option<PathBuf>,
}

impl ExplicitPathResolver {
    /// Resolver over an optional directory; `None` always declines
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ModelResolver for ExplicitPathResolver {
    fn name(&self) -> &'static str {
        "explicit-path"
    }

    fn resolve(&self, _model_id: &str) -> Result<Option<ModelFiles>> {
        match &self.path {
            Some(path) => ModelFiles::from_dir(path),
            None => Ok(None),
        }
    }
}

/// Conventional on-disk locations: registry cache, then `./models`, `../models`
#[derive(Debug, Clone)]
pub struct LocalSnapshotResolver {
    hub_cache: PathBuf,
    search_roots: Vec<PathBuf>,
}

impl LocalSnapshotResolver {
    /// Resolver over a registry cache dir and extra `models/` roots
    #[must_use]
    pub fn new(hub_cache: PathBuf, search_roots: Vec<PathBuf>) -> Self {
        Self {
            hub_cache,
            search_roots,
        }
    }

    /// Resolver over the default locations
    #[must_use]
    pub fn with_defaults(registry: &RegistryConfig) -> Self {
        Self::new(
            registry.hub_cache_dir(),
            vec![PathBuf::from("models"), PathBuf::from("../models")],
        )
    }

    /// `models--{org}--{name}` directory name used by the registry cache
    #[must_use]
    pub fn cache_folder_name(model_id: &str) -> String {
        format!("models--{}", model_id.replace('/', "--"))
    }

    /// Lexicographically last snapshot holding a `config.json`
    fn latest_snapshot(&self, model_id: &str) -> Option<PathBuf> {
        let snapshots = self
            .hub_cache
            .join(Self::cache_folder_name(model_id))
            .join("snapshots");
        let entries = std::fs::read_dir(&snapshots).ok()?;
        entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.join(CONFIG_FILE).is_file())
            .max()
    }

    fn candidates(&self, model_id: &str) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.latest_snapshot(model_id).into_iter().collect();
        dirs.extend(self.search_roots.iter().map(|root| root.join(model_id)));
        dirs
    }
}

impl ModelResolver for LocalSnapshotResolver {
    fn name(&self) -> &'static str {
        "local-snapshot"
    }

    fn resolve(&self, model_id: &str) -> Result<Option<ModelFiles>> {
        for dir in self.candidates(model_id) {
            debug!(dir = %dir.display(), "Checking local snapshot");
            match ModelFiles::from_dir(&dir) {
                Ok(Some(files)) => return Ok(Some(files)),
                Ok(None) => {},
                // Partial downloads are common; keep looking
                Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping incomplete snapshot"),
            }
        }
        Ok(None)
    }
}

/// Download from the remote model registry
#[derive(Debug, Clone)]
pub struct HubResolver {
    registry: RegistryConfig,
    revision: String,
}

impl HubResolver {
    /// Resolver for a registry and revision
    #[must_use]
    pub fn new(registry: RegistryConfig, revision: impl Into<String>) -> Self {
        Self {
            registry,
            revision: revision.into(),
        }
    }

    async fn fetch(&self, model_id: &str) -> Result<ModelFiles> {
        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_cache_dir(self.registry.hub_cache_dir())
            .with_token(self.registry.token.clone());
        if let Some(endpoint) = &self.registry.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        let api = builder.build().map_err(|e| SomniaError::ModelLoad {
            reason: format!("Registry client: {e}"),
        })?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            self.revision.clone(),
        ));

        let config = get_required(&repo, CONFIG_FILE).await?;
        let tokenizer = get_required(&repo, TOKENIZER_FILE).await?;
        let tokenizer_config = repo.get(TOKENIZER_CONFIG_FILE).await.ok();
        let generation_config = repo.get(GENERATION_CONFIG_FILE).await.ok();

        let weights = match repo.get(WEIGHTS_INDEX).await {
            Ok(index) => {
                let json = std::fs::read_to_string(&index)?;
                let mut files = Vec::new();
                for shard in shard_names(&json)? {
                    info!(shard = %shard, "Downloading weight shard");
                    files.push(get_required(&repo, &shard).await?);
                }
                files
            },
            Err(_) => vec![get_required(&repo, SINGLE_WEIGHTS).await?],
        };

        let root = config
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(ModelFiles {
            root,
            config,
            tokenizer,
            tokenizer_config,
            generation_config,
            weights,
        })
    }
}

async fn get_required(repo: &ApiRepo, file: &str) -> Result<PathBuf> {
    repo.get(file).await.map_err(|e| SomniaError::ModelLoad {
        reason: format!("Failed to download {file}: {e}"),
    })
}

impl ModelResolver for HubResolver {
    fn name(&self) -> &'static str {
        "hub"
    }

    fn resolve(&self, model_id: &str) -> Result<Option<ModelFiles>> {
        if let Some(proxy) = &self.registry.proxy {
            debug!(proxy = %proxy, "Registry downloads go through proxy");
        }
        info!(model_id, revision = %self.revision, "Fetching model from registry");

        // Loading runs on a blocking thread, so blocking on the handle is allowed
        let files = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(self.fetch(model_id))?,
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(self.fetch(model_id))?,
        };
        Ok(Some(files))
    }
}

/// Ordered list of resolvers
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ModelResolver>>,
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| r.name()))
            .finish()
    }
}

impl ResolverChain {
    /// Chain over `resolvers`, tried in order
    #[must_use]
    pub fn new(resolvers: Vec<Box<dyn ModelResolver>>) -> Self {
        Self { resolvers }
    }

    /// Names of the resolvers in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// First resolver to claim `model_id` wins
    ///
    /// # Errors
    ///
    /// Returns [`SomniaError::ModelLoad`] if a resolver fails or all decline.
    pub fn resolve(&self, model_id: &str) -> Result<ModelFiles> {
        for resolver in &self.resolvers {
            if let Some(files) = resolver.resolve(model_id)? {
                info!(resolver = resolver.name(), root = %files.root.display(), "Model files resolved");
                return Ok(files);
            }
            debug!(resolver = resolver.name(), "Resolver declined");
        }
        Err(SomniaError::ModelLoad {
            reason: format!("No resolver could locate model '{model_id}'"),
        })
    }
}

/// Explicit path, then local snapshots, then the registry
#[must_use]
pub fn default_chain(config: &ServiceConfig) -> ResolverChain {
    ResolverChain::new(vec![
        Box::new(ExplicitPathResolver::new(config.model_path.clone())),
        Box::new(LocalSnapshotResolver::with_defaults(&config.registry)),
        Box::new(HubResolver::new(
            config.registry.clone(),
            config.revision.clone(),
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_snapshot(dir: &Path, sharded: bool) {
        fs::create_dir_all(dir).expect("mkdir");
        fs::write(dir.join(CONFIG_FILE), "{}").expect("write");
        fs::write(dir.join(TOKENIZER_FILE), "{}").expect("write");
        if sharded {
            fs::write(
                dir.join(WEIGHTS_INDEX),
                r#"{"metadata":{},"weight_map":{"a":"model-00002-of-00002.safetensors","b":"model-00001-of-00002.safetensors","c":"model-00001-of-00002.safetensors"}}"#,
            )
            .expect("write");
            fs::write(dir.join("model-00001-of-00002.safetensors"), b"x").expect("write");
            fs::write(dir.join("model-00002-of-00002.safetensors"), b"x").expect("write");
        } else {
            fs::write(dir.join(SINGLE_WEIGHTS), b"x").expect("write");
        }
    }

    struct Declines;
    impl ModelResolver for Declines {
        fn name(&self) -> &'static str {
            "declines"
        }
        fn resolve(&self, _model_id: &str) -> Result<Option<ModelFiles>> {
            Ok(None)
        }
    }

    struct Fails;
    impl ModelResolver for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }
        fn resolve(&self, _model_id: &str) -> Result<Option<ModelFiles>> {
            Err(SomniaError::ModelLoad {
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn test_from_dir_single_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_snapshot(tmp.path(), false);
        let files = ModelFiles::from_dir(tmp.path()).expect("ok").expect("some");
        assert_eq!(files.weights, vec![tmp.path().join(SINGLE_WEIGHTS)]);
        assert!(files.tokenizer_config.is_none());
    }

    #[test]
    fn test_from_dir_sharded_sorted_unique() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_snapshot(tmp.path(), true);
        let files = ModelFiles::from_dir(tmp.path()).expect("ok").expect("some");
        assert_eq!(
            files.weights,
            vec![
                tmp.path().join("model-00001-of-00002.safetensors"),
                tmp.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_from_dir_without_config_declines() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(ModelFiles::from_dir(tmp.path()).expect("ok").is_none());
    }

    #[test]
    fn test_from_dir_missing_weights_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join(CONFIG_FILE), "{}").expect("write");
        fs::write(tmp.path().join(TOKENIZER_FILE), "{}").expect("write");
        let err = ModelFiles::from_dir(tmp.path()).expect_err("no weights");
        assert!(matches!(err, SomniaError::ModelLoad { .. }));
    }

    #[test]
    fn test_explicit_path_unset_declines() {
        assert!(ExplicitPathResolver::new(None)
            .resolve("any")
            .expect("ok")
            .is_none());
    }

    #[test]
    fn test_local_snapshot_picks_latest_complete() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let snapshots = tmp
            .path()
            .join("models--deepseek-ai--R1")
            .join("snapshots");
        write_snapshot(&snapshots.join("aaa"), false);
        write_snapshot(&snapshots.join("bbb"), false);
        fs::create_dir_all(snapshots.join("zzz")).expect("mkdir");

        let resolver = LocalSnapshotResolver::new(tmp.path().to_path_buf(), Vec::new());
        let files = resolver.resolve("deepseek-ai/R1").expect("ok").expect("some");
        assert_eq!(files.root, snapshots.join("bbb"));
    }

    #[test]
    fn test_local_snapshot_searches_models_roots() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let models = tmp.path().join("models");
        write_snapshot(&models.join("Qwen").join("tiny"), false);

        let resolver =
            LocalSnapshotResolver::new(tmp.path().join("empty-cache"), vec![models.clone()]);
        let files = resolver.resolve("Qwen/tiny").expect("ok").expect("some");
        assert_eq!(files.root, models.join("Qwen").join("tiny"));
    }

    #[test]
    fn test_local_snapshot_skips_incomplete() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let broken = tmp.path().join("a").join("m");
        fs::create_dir_all(&broken).expect("mkdir");
        fs::write(broken.join(CONFIG_FILE), "{}").expect("write");
        write_snapshot(&tmp.path().join("b").join("m"), false);

        let resolver = LocalSnapshotResolver::new(
            tmp.path().join("cache"),
            vec![tmp.path().join("a"), tmp.path().join("b")],
        );
        let files = resolver.resolve("m").expect("ok").expect("some");
        assert_eq!(files.root, tmp.path().join("b").join("m"));
    }

    #[test]
    fn test_chain_order_and_failure() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_snapshot(tmp.path(), false);

        let chain = ResolverChain::new(vec![
            Box::new(Declines),
            Box::new(ExplicitPathResolver::new(Some(tmp.path().to_path_buf()))),
            Box::new(Fails),
        ]);
        assert_eq!(chain.names(), vec!["declines", "explicit-path", "fails"]);
        assert!(chain.resolve("m").is_ok());

        let chain = ResolverChain::new(vec![Box::new(Fails), Box::new(Declines)]);
        assert!(chain.resolve("m").is_err());

        let chain = ResolverChain::new(vec![Box::new(Declines)]);
        let err = chain.resolve("m").expect_err("all decline");
        assert!(err.to_string().contains("'m'"));
    }

    #[test]
    fn test_cache_folder_name() {
        assert_eq!(
            LocalSnapshotResolver::cache_folder_name("deepseek-ai/DeepSeek-R1-Distill-Qwen-7B"),
            "models--deepseek-ai--DeepSeek-R1-Distill-Qwen-7B"
        );
    }

    #[test]
    fn test_default_chain_order() {
        let chain = default_chain(&ServiceConfig::default());
        assert_eq!(chain.names(), vec!["explicit-path", "local-snapshot", "hub"]);
    }
}
