// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Module execution backends and the registry that resolves them by name.

mod external;
mod internal;
pub mod mock;
mod traits;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

pub use external::ExternalModule;
pub use internal::PingModule;
pub use mock::MockModule;
pub use traits::*;

use crate::error::RequestError;
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

/// Modules known to the agent, keyed by name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PingModule));
        registry
    }

    /// Add a module, replacing any module with the same name.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        let name = module.name().to_string();
        if self.modules.insert(name.clone(), module).is_some() {
            debug!(module = %name, "Replaced previously registered module");
        }
    }

    /// Register every executable in `dir` as an external module named after
    /// its file name. Returns how many modules were added.
    pub async fn load_external(&mut self, dir: &Path) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable module entry");
                    continue;
                }
            };
            if !metadata.is_file() || !is_executable(&metadata) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            self.register(Arc::new(ExternalModule::new(name, path)));
            loaded += 1;
        }

        info!(dir = %dir.display(), loaded = loaded, "Loaded external modules");
        Ok(loaded)
    }

    /// Resolve a module by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Module>> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| RequestError::UnknownModule(name.to_string()))
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

/// Run the module on its own task so that a panic inside it becomes a
/// request error instead of unwinding through the caller.
pub(crate) async fn execute_isolated(
    module: Arc<dyn Module>,
    request: Arc<ActionRequest>,
) -> Result<ActionOutcome> {
    let handle = tokio::spawn(async move { module.execute_action(&request).await });

    match handle.await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            let panic = join_error.into_panic();
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RequestError::Execution(format!("module panicked: {message}")))
        }
        Err(join_error) => Err(RequestError::Execution(format!(
            "module task aborted: {join_error}"
        ))),
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_contain_ping() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["ping"]);
        assert!(registry.get("ping").is_ok());
    }

    #[test]
    fn test_unknown_module() {
        let registry = ModuleRegistry::new();
        let err = registry.get("facts").err().unwrap();
        assert_eq!(err, RequestError::UnknownModule("facts".to_string()));
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(MockModule::returning("facts", json!(1))));
        registry.register(Arc::new(MockModule::returning("facts", json!(2))));
        assert_eq!(registry.names(), vec!["facts"]);
    }

    #[tokio::test]
    async fn test_execute_isolated_turns_panic_into_error() {
        let module: Arc<dyn Module> = Arc::new(MockModule::panicking("facts", "kaboom"));
        let request = Arc::new(ActionRequest::new(
            crate::request::RequestType::Blocking,
            "r1",
            "t1",
            "ctl",
            "facts",
            "get",
        ));

        let err = execute_isolated(module, request).await.unwrap_err();

        assert_eq!(
            err,
            RequestError::Execution("module panicked: kaboom".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute_isolated_passes_results_through() {
        let module: Arc<dyn Module> = Arc::new(MockModule::returning("facts", json!({"a": 1})));
        let request = Arc::new(ActionRequest::new(
            crate::request::RequestType::Blocking,
            "r1",
            "t1",
            "ctl",
            "facts",
            "get",
        ));

        let outcome = execute_isolated(module, request).await.unwrap();

        assert_eq!(outcome.results(), &json!({"a": 1}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_external_only_executables() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let exec = dir.path().join("facts");
        let plain = dir.path().join("README");
        std::fs::write(&exec, "#!/bin/sh\necho '{}'\n").unwrap();
        std::fs::write(&plain, "docs").unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut registry = ModuleRegistry::with_builtins();
        let loaded = registry.load_external(dir.path()).await.unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(registry.names(), vec!["facts", "ping"]);
    }
}
