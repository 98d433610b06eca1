//! A fully wired host for integration tests.

use std::sync::Arc;

use enclave_capabilities::CapabilityRegistry;
use enclave_core::PluginId;
use enclave_events::EventBus;
use enclave_executor::{ExecutionSupervisor, ExecutorResult};
use enclave_multichain::SessionNegotiator;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::fixtures::keyring_handler;
use crate::mocks::{MockPermissionController, MockPluginDirectory, MockRuntimeBackend};

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Supervisor and negotiator wired to mock collaborators.
#[derive(Debug, Clone)]
pub struct TestHost {
    /// The runtime backend.
    pub backend: MockRuntimeBackend,
    /// The permission store.
    pub permissions: MockPermissionController,
    /// The installed plugins.
    pub directory: MockPluginDirectory,
    /// The supervisor.
    pub supervisor: ExecutionSupervisor,
    /// The negotiator.
    pub negotiator: SessionNegotiator,
}

impl TestHost {
    /// A host with no plugins.
    #[must_use]
    pub fn new() -> Self {
        init_test_logging();
        let backend = MockRuntimeBackend::new();
        let permissions = MockPermissionController::new();
        let directory = MockPluginDirectory::new();
        let supervisor = ExecutionSupervisor::new(Arc::new(backend.clone()), EventBus::new());
        let negotiator = SessionNegotiator::new(
            Arc::new(CapabilityRegistry::with_defaults()),
            supervisor.clone(),
            Arc::new(permissions.clone()),
            Arc::new(directory.clone()),
        );
        Self {
            backend,
            permissions,
            directory,
            supervisor,
            negotiator,
        }
    }

    /// Install, grant and start a keyring plugin declaring `namespaces`
    /// (see [`keyring_declaration`](crate::keyring_declaration)) and offering
    /// `accounts`.
    ///
    /// # Errors
    ///
    /// Returns the supervisor's error if the plugin cannot be started.
    pub async fn install_keyring(
        &self,
        plugin_id: &str,
        namespaces: Value,
        accounts: &[&str],
    ) -> ExecutorResult<PluginId> {
        let id = PluginId::from_static(plugin_id);
        self.backend.set_handler(id.clone(), keyring_handler(accounts));
        self.permissions.add_keyring(&id, namespaces);
        self.directory.install(enclave_multichain::InstalledPlugin::new(id.clone()));
        self.supervisor.execute_plugin(&id, "/* keyring */", &[]).await?;
        Ok(id)
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
