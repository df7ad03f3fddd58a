use std::path::PathBuf;

use anyhow::Context as _;
use hostbridge_config::BridgeConfig;
use hostbridge_env::{HostContext, Local};
use hostbridge_reflect::{BindError, Binding, ClassRegistry, ClassTable, DefinitionBlob};
use hostbridge_task::{
    BridgeRequest, CallbackRegistry, DispatchContext, DispatchHandle, FutureTable, Outcome,
    TaskBridge, TaskFuture, run_on_background_thread, run_on_main_thread,
};
use parking_lot::Mutex;

/// One host context plus the shared bridge state built from a
/// [`BridgeConfig`].
///
/// `initialize` and `terminate` are reference counted: every product that
/// starts using the bridge initializes it once and terminates it once. The
/// last terminate cancels whatever completions are still pending.
#[derive(Debug)]
pub struct Runtime {
    ctx: HostContext,
    config: BridgeConfig,
    registry: &'static ClassRegistry,
    bridge: TaskBridge,
    users: Mutex<usize>,
}

impl Runtime {
    /// Runtime over the process-wide class registry.
    pub fn new(ctx: HostContext, config: BridgeConfig) -> Self {
        Self::with_registry(ctx, config, ClassRegistry::global())
    }

    pub fn with_registry(
        ctx: HostContext,
        config: BridgeConfig,
        registry: &'static ClassRegistry,
    ) -> Self {
        let futures = FutureTable::with_last_results(config.futures.keep_last_results);
        let bridge = TaskBridge::new(
            futures,
            CallbackRegistry::new(),
            config.callbacks.default_api_identifier.clone(),
        );
        Self {
            ctx,
            config,
            registry,
            bridge,
            users: Mutex::new(0),
        }
    }

    /// Loads the configuration from the environment.
    pub fn from_env(ctx: HostContext) -> Self {
        Self::new(ctx, BridgeConfig::from_env())
    }

    /// Loads `config_file` (TOML, requires the `toml-config` feature) and
    /// applies environment overrides on top.
    pub fn from_config_file(
        ctx: HostContext,
        config_file: Option<&PathBuf>,
    ) -> anyhow::Result<Self> {
        let config =
            BridgeConfig::load(config_file).context("failed to load bridge configuration")?;
        Ok(Self::new(ctx, config))
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &'static ClassRegistry {
        self.registry
    }

    pub fn futures(&self) -> &FutureTable {
        self.bridge.futures()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        self.bridge.callbacks()
    }

    pub fn task_bridge(&self) -> &TaskBridge {
        &self.bridge
    }

    /// Returns the number of users after this call.
    pub fn initialize(&self) -> usize {
        let mut users = self.users.lock();
        *users += 1;
        if *users == 1 {
            self.registry.set_log_members(self.config.lookup.log_members);
            tracing::info!(
                default_api = %self.config.callbacks.default_api_identifier,
                "bridge runtime initialized"
            );
        }
        *users
    }

    /// Returns the number of users left.
    ///
    /// Completion observers run after the user count is unlocked and may
    /// call back into the runtime.
    pub fn terminate(&self) -> usize {
        let remaining = {
            let mut users = self.users.lock();
            if *users == 0 {
                tracing::warn!("terminate called on a runtime that is not initialized");
                return 0;
            }
            *users -= 1;
            *users
        };
        if remaining == 0 {
            let cancelled = if self.config.callbacks.cancel_on_terminate {
                self.callbacks().cancel_callbacks(&self.ctx, None)
            } else {
                0
            };
            tracing::info!(cancelled, "bridge runtime terminated");
        }
        remaining
    }

    pub fn is_initialized(&self) -> bool {
        *self.users.lock() > 0
    }

    pub fn binding<T: ClassTable>(&self) -> Binding<'static, T> {
        Binding::in_registry(self.registry)
    }

    /// Acquires `T`, searching `blobs` only when the lookup configuration
    /// allows it.
    pub fn acquire<T: ClassTable>(
        &self,
        blobs: &[DefinitionBlob],
    ) -> Result<Binding<'static, T>, BindError> {
        let binding = self.binding::<T>();
        let blobs: &[DefinitionBlob] = if self.config.lookup.search_definition_blobs {
            blobs
        } else {
            &[]
        };
        binding.acquire_with_blobs(&self.ctx, blobs)?;
        Ok(binding)
    }

    pub fn release<T: ClassTable>(&self) {
        self.binding::<T>().release(&self.ctx);
    }

    pub fn bridge(&self, task: &Local<'_>, request: BridgeRequest) -> TaskFuture {
        self.bridge.bridge(&self.ctx, task, request)
    }

    /// Blocks until `future` completes, bounded by the configured wait
    /// timeout. `None` when the timeout elapsed first.
    pub fn wait(&self, future: &TaskFuture) -> Option<Outcome> {
        match self.config.futures.wait_timeout() {
            Some(timeout) => future.wait_timeout(timeout),
            None => Some(future.wait()),
        }
    }

    pub fn run_on_main_thread<F>(&self, work: F) -> DispatchHandle
    where
        F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
    {
        run_on_main_thread(&self.ctx, self.futures(), work)
    }

    pub fn run_on_background_thread<F>(&self, work: F) -> DispatchHandle
    where
        F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
    {
        run_on_background_thread(&self.ctx, self.futures(), work)
    }
}
