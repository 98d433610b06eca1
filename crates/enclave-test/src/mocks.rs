//! Mock implementations for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use enclave_capabilities::CapabilityKind;
use enclave_capabilities::caveat::KEYRING_NAMESPACES;
use enclave_core::{Caveat, Grant, JsonRpcError, Origin, PermissionSet, PluginId, error_codes};
use enclave_executor::{
    EXECUTE_SNAP, ExecutorError, ExecutorResult, RuntimeBackend, RuntimeChannel, RuntimeEnd,
    SNAP_RPC,
};
use enclave_multichain::collaborator::{
    merge_permissions, wallet_snap_grant, wallet_snap_plugins,
};
use enclave_multichain::{
    ApprovalRequest, GrantRequest, InstalledPlugin, MultichainError, MultichainResult,
    PermissionController, PluginDirectory, WALLET_SNAP,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Runtime backend
// ---------------------------------------------------------------------------

/// A handler call observed by [`MockRuntimeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The plugin called.
    pub plugin_id: PluginId,
    /// Origin the call was made for.
    pub origin: String,
    /// Handler invoked, e.g. `onKeyringRequest`.
    pub handler: String,
    /// Method of the inner request.
    pub method: String,
    /// Params of the inner request, `null` when absent.
    pub params: Value,
}

/// Answers a plugin's handler calls.
pub type PluginHandler = Arc<dyn Fn(&RecordedCall) -> Result<Value, JsonRpcError> + Send + Sync>;

#[derive(Default)]
struct BackendState {
    handlers: HashMap<PluginId, PluginHandler>,
    calls: Vec<RecordedCall>,
    kills: HashMap<PluginId, oneshot::Sender<()>>,
    failing_spawn: HashSet<PluginId>,
    rejecting_code: HashSet<PluginId>,
    spawned: Vec<PluginId>,
}

/// In-process runtime backend driven by per-plugin handler closures.
///
/// `executeSnap` is acknowledged with `"OK"`; `snapRpc` calls are recorded
/// and answered by the plugin's handler, or with "method not found" when none
/// is set. [`crash`](Self::crash) makes a runtime vanish.
#[derive(Clone, Default)]
pub struct MockRuntimeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockRuntimeBackend {
    /// Create a backend with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `plugin_id`'s calls with `handler`.
    #[must_use]
    pub fn with_handler<F>(self, plugin_id: PluginId, handler: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<Value, JsonRpcError> + Send + Sync + 'static,
    {
        self.set_handler(plugin_id, handler);
        self
    }

    /// Answer `plugin_id`'s calls with `handler`, replacing any previous one.
    pub fn set_handler<F>(&self, plugin_id: PluginId, handler: F)
    where
        F: Fn(&RecordedCall) -> Result<Value, JsonRpcError> + Send + Sync + 'static,
    {
        lock(&self.state).handlers.insert(plugin_id, Arc::new(handler));
    }

    /// Make spawning a runtime for `plugin_id` fail.
    #[must_use]
    pub fn with_failing_spawn(self, plugin_id: PluginId) -> Self {
        lock(&self.state).failing_spawn.insert(plugin_id);
        self
    }

    /// Make `plugin_id`'s runtime reject its code.
    #[must_use]
    pub fn with_rejected_code(self, plugin_id: PluginId) -> Self {
        lock(&self.state).rejecting_code.insert(plugin_id);
        self
    }

    /// Kill the plugin's current runtime without telling the host. Returns
    /// `false` if it has none.
    pub fn crash(&self, plugin_id: &PluginId) -> bool {
        lock(&self.state).kills.remove(plugin_id).is_some()
    }

    /// Every recorded handler call.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state).calls.clone()
    }

    /// Recorded calls to `method` on `plugin_id`.
    #[must_use]
    pub fn calls_to(&self, plugin_id: &PluginId, method: &str) -> Vec<RecordedCall> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| &c.plugin_id == plugin_id && c.method == method)
            .cloned()
            .collect()
    }

    /// Wait up to a second for a call to `method` on `plugin_id`.
    pub async fn wait_for_call(&self, plugin_id: &PluginId, method: &str) -> Option<RecordedCall> {
        for _ in 0..100 {
            if let Some(call) = self.calls_to(plugin_id, method).pop() {
                return Some(call);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// How many runtimes were spawned for `plugin_id`.
    #[must_use]
    pub fn spawn_count(&self, plugin_id: &PluginId) -> usize {
        lock(&self.state)
            .spawned
            .iter()
            .filter(|p| *p == plugin_id)
            .count()
    }

    fn answer(&self, plugin_id: &PluginId, message: &Value) -> Option<Result<Value, JsonRpcError>> {
        let method = message.get("method")?.as_str()?;
        let outcome = match method {
            EXECUTE_SNAP => {
                if lock(&self.state).rejecting_code.contains(plugin_id) {
                    Err(JsonRpcError::new(-32000, "Failed to evaluate plugin code"))
                } else {
                    Ok(json!("OK"))
                }
            },
            SNAP_RPC => {
                let params = &message["params"];
                let call = RecordedCall {
                    plugin_id: plugin_id.clone(),
                    origin: params["origin"].as_str().unwrap_or_default().to_string(),
                    handler: params["handler"].as_str().unwrap_or_default().to_string(),
                    method: params["request"]["method"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    params: params["request"].get("params").cloned().unwrap_or(Value::Null),
                };
                let handler = {
                    let mut state = lock(&self.state);
                    state.calls.push(call.clone());
                    state.handlers.get(plugin_id).cloned()
                };
                match handler {
                    Some(handler) => handler(&call),
                    None => Err(method_not_found(&call.method)),
                }
            },
            other => Err(method_not_found(other)),
        };
        Some(outcome)
    }
}

fn method_not_found(method: &str) -> JsonRpcError {
    JsonRpcError::new(
        error_codes::METHOD_NOT_FOUND,
        format!("The method \"{method}\" does not exist / is not available."),
    )
}

async fn run_runtime(
    backend: MockRuntimeBackend,
    plugin_id: PluginId,
    mut end: RuntimeEnd,
    mut kill: oneshot::Receiver<()>,
) {
    loop {
        let message = tokio::select! {
            _ = &mut kill => return,
            message = end.from_host.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let Some(outcome) = backend.answer(&plugin_id, &message) else {
            continue;
        };
        let reply = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        if end.to_host.send(reply).await.is_err() {
            return;
        }
    }
}

impl std::fmt::Debug for MockRuntimeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockRuntimeBackend")
            .field("handlers", &state.handlers.len())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RuntimeBackend for MockRuntimeBackend {
    async fn spawn(&self, plugin_id: &PluginId) -> ExecutorResult<RuntimeChannel> {
        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            if state.failing_spawn.contains(plugin_id) {
                return Err(ExecutorError::Backend(format!("cannot start {plugin_id}")));
            }
            state.spawned.push(plugin_id.clone());
            state.kills.insert(plugin_id.clone(), kill_tx);
        }

        let (channel, end) = RuntimeChannel::pair(16);
        tokio::spawn(run_runtime(self.clone(), plugin_id.clone(), end, kill_rx));
        Ok(channel)
    }
}

// ---------------------------------------------------------------------------
// Permission controller
// ---------------------------------------------------------------------------

type ApprovalAnswer = Box<dyn FnOnce() -> Result<Value, String> + Send>;

enum QueuedApproval {
    Answer(ApprovalAnswer),
    Unanswered,
}

#[derive(Default)]
struct PermissionState {
    permissions: HashMap<String, PermissionSet>,
    approvals: VecDeque<QueuedApproval>,
    approval_requests: Vec<ApprovalRequest>,
    grants: Vec<GrantRequest>,
    failing_grant: Option<String>,
}

/// In-memory permission controller.
///
/// Origins reach plugins through `wallet_snap` grants, exactly as the
/// negotiator writes them. Approval answers are queued up front; an approval
/// with nothing queued is rejected.
#[derive(Clone, Default)]
pub struct MockPermissionController {
    state: Arc<Mutex<PermissionState>>,
}

impl MockPermissionController {
    /// Create an empty controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `grant` to `subject`.
    #[must_use]
    pub fn with_grant(self, subject: &str, grant: Grant) -> Self {
        self.add_grant(subject, grant);
        self
    }

    /// Non-builder form of [`with_grant`](Self::with_grant).
    pub fn add_grant(&self, subject: &str, grant: Grant) {
        lock(&self.state)
            .permissions
            .entry(subject.to_string())
            .or_default()
            .insert(grant.parent_capability.clone(), grant);
    }

    /// Grant `plugin_id` the keyring capability declaring `namespaces`
    /// (the object under the caveat's `namespaces` key).
    #[must_use]
    pub fn with_keyring(self, plugin_id: &PluginId, namespaces: Value) -> Self {
        self.add_keyring(plugin_id, namespaces);
        self
    }

    /// Non-builder form of [`with_keyring`](Self::with_keyring).
    pub fn add_keyring(&self, plugin_id: &PluginId, namespaces: Value) {
        let grant = Grant::new(CapabilityKind::Keyring.default_name())
            .with_caveat(Caveat::new(KEYRING_NAMESPACES, json!({ "namespaces": namespaces })));
        self.add_grant(plugin_id.as_str(), grant);
    }

    /// Let `origin` reach `plugin_id`.
    #[must_use]
    pub fn with_access(self, origin: &Origin, plugin_id: &PluginId) -> Self {
        self.add_access(origin, plugin_id);
        self
    }

    /// Non-builder form of [`with_access`](Self::with_access).
    pub fn add_access(&self, origin: &Origin, plugin_id: &PluginId) {
        let mut state = lock(&self.state);
        let existing = state.permissions.entry(origin.to_string()).or_default();
        merge_permissions(
            existing,
            PermissionSet::from([(WALLET_SNAP.to_string(), wallet_snap_grant([plugin_id]))]),
        );
    }

    /// Take `plugin_id` out of the origin's `wallet_snap` grant.
    pub fn revoke(&self, origin: &Origin, plugin_id: &PluginId) {
        let mut state = lock(&self.state);
        let Some(permissions) = state.permissions.get_mut(origin.as_str()) else {
            return;
        };
        let Some(grant) = permissions.get(WALLET_SNAP) else {
            return;
        };
        let remaining: Vec<PluginId> = wallet_snap_plugins(grant)
            .into_iter()
            .filter(|p| p != plugin_id)
            .collect();
        permissions.insert(WALLET_SNAP.to_string(), wallet_snap_grant(&remaining));
    }

    /// Answer the next approval with `result`.
    pub fn queue_approval(&self, result: Value) {
        self.queue_approval_with(move || result);
    }

    /// Answer the next approval with whatever `answer` returns when the
    /// request arrives.
    pub fn queue_approval_with<F>(&self, answer: F)
    where
        F: FnOnce() -> Value + Send + 'static,
    {
        lock(&self.state)
            .approvals
            .push_back(QueuedApproval::Answer(Box::new(move || Ok(answer()))));
    }

    /// Reject the next approval.
    pub fn queue_rejection(&self, reason: impl Into<String>) {
        let reason = reason.into();
        lock(&self.state)
            .approvals
            .push_back(QueuedApproval::Answer(Box::new(move || Err(reason))));
    }

    /// Leave the next approval pending forever, like a human who never
    /// answers.
    pub fn queue_unanswered(&self) {
        lock(&self.state).approvals.push_back(QueuedApproval::Unanswered);
    }

    /// Fail every grant with `reason` until cleared with `None`.
    pub fn set_failing_grant(&self, reason: Option<&str>) {
        lock(&self.state).failing_grant = reason.map(str::to_string);
    }

    /// Approval requests received so far.
    #[must_use]
    pub fn approval_requests(&self) -> Vec<ApprovalRequest> {
        lock(&self.state).approval_requests.clone()
    }

    /// Grant requests received so far.
    #[must_use]
    pub fn grants(&self) -> Vec<GrantRequest> {
        lock(&self.state).grants.clone()
    }
}

impl std::fmt::Debug for MockPermissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockPermissionController")
            .field("subjects", &state.permissions.len())
            .field("queued_approvals", &state.approvals.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PermissionController for MockPermissionController {
    async fn get_permissions(&self, subject: &str) -> MultichainResult<Option<PermissionSet>> {
        Ok(lock(&self.state).permissions.get(subject).cloned())
    }

    async fn has_permission(&self, origin: &Origin, plugin_id: &PluginId) -> MultichainResult<bool> {
        let state = lock(&self.state);
        Ok(state
            .permissions
            .get(origin.as_str())
            .and_then(|p| p.get(WALLET_SNAP))
            .is_some_and(|grant| wallet_snap_plugins(grant).contains(plugin_id)))
    }

    async fn grant_permissions(&self, request: GrantRequest) -> MultichainResult<()> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.failing_grant {
            return Err(MultichainError::Collaborator(reason.clone()));
        }
        state.grants.push(request.clone());
        let existing = state
            .permissions
            .entry(request.subject.to_string())
            .or_default();
        if request.preserve_existing {
            merge_permissions(existing, request.approved_permissions);
        } else {
            *existing = request.approved_permissions;
        }
        Ok(())
    }

    async fn add_approval_request(
        &self,
        request: ApprovalRequest,
        _should_show_ui: bool,
    ) -> MultichainResult<Value> {
        let answer = {
            let mut state = lock(&self.state);
            state.approval_requests.push(request);
            state.approvals.pop_front()
        };
        match answer {
            Some(QueuedApproval::Answer(answer)) => answer().map_err(MultichainError::Collaborator),
            Some(QueuedApproval::Unanswered) => std::future::pending().await,
            None => Err(MultichainError::Collaborator("User rejected the request.".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin directory
// ---------------------------------------------------------------------------

/// In-memory list of installed plugins.
#[derive(Debug, Clone, Default)]
pub struct MockPluginDirectory {
    plugins: Arc<Mutex<Vec<InstalledPlugin>>>,
}

impl MockPluginDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an enabled plugin.
    #[must_use]
    pub fn with_plugin(self, plugin_id: PluginId) -> Self {
        self.install(InstalledPlugin::new(plugin_id));
        self
    }

    /// Install a plugin.
    pub fn install(&self, plugin: InstalledPlugin) {
        lock(&self.plugins).push(plugin);
    }

    /// Disable an installed plugin.
    pub fn disable(&self, plugin_id: &PluginId) {
        for plugin in lock(&self.plugins).iter_mut().filter(|p| &p.id == plugin_id) {
            plugin.enabled = false;
        }
    }

    /// Block an installed plugin.
    pub fn block(&self, plugin_id: &PluginId) {
        for plugin in lock(&self.plugins).iter_mut().filter(|p| &p.id == plugin_id) {
            plugin.blocked = true;
        }
    }
}

#[async_trait]
impl PluginDirectory for MockPluginDirectory {
    async fn list_plugins(&self) -> MultichainResult<Vec<InstalledPlugin>> {
        Ok(lock(&self.plugins).clone())
    }
}
