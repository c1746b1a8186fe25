//! Action registry and effect compilation.
//!
//! Side-effect code lives only in [`ActionHandler`] implementations registered
//! by name. Schemas refer to handlers through [`ActionConfig`]s; the registry
//! resolves each config once at compile time and produces an [`Effect`].
//!
//! Effects run in one of two modes:
//!
//! - [`ActionMode::Sync`] - awaited inline by the engine.
//! - [`ActionMode::Async`] - spawned onto the runtime and never joined. Failures
//!   are logged and forwarded to an [`EffectFailureSink`] when one is attached.

use crate::context::Context;
use crate::error::{ActionError, HookPhase};
use crate::schema::ActionConfig;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Whether an effect is awaited or detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    #[default]
    Sync,
    Async,
}

/// Executable side effect, looked up by name.
#[async_trait]
pub trait ActionHandler<C>: Send + Sync {
    /// Runs the action against the context with the configured params
    /// (`null` when the config carries none).
    async fn execute(&self, ctx: Arc<C>, params: &Value) -> Result<(), ActionError>;
}

/// Adapts an async closure into an [`ActionHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<C, F, Fut> ActionHandler<C> for FnHandler<F>
where
    C: Context,
    F: Fn(Arc<C>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ActionError>> + Send,
{
    async fn execute(&self, ctx: Arc<C>, params: &Value) -> Result<(), ActionError> {
        (self.0)(ctx, params.clone()).await
    }
}

/// Writes `params.message` to the log.
pub struct LogAction;

#[async_trait]
impl<C: Context> ActionHandler<C> for LogAction {
    async fn execute(&self, _ctx: Arc<C>, params: &Value) -> Result<(), ActionError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No message");
        tracing::info!(action = "log", "{}", message);
        Ok(())
    }
}

/// Waits `params.delay` milliseconds (default 2000), then logs `params.message`.
pub struct LogDelayedAction;

impl LogDelayedAction {
    pub const DEFAULT_DELAY_MS: u64 = 2000;
}

#[async_trait]
impl<C: Context> ActionHandler<C> for LogDelayedAction {
    async fn execute(&self, _ctx: Arc<C>, params: &Value) -> Result<(), ActionError> {
        let delay = match params.get("delay") {
            None | Some(Value::Null) => Self::DEFAULT_DELAY_MS,
            Some(v) => v.as_u64().ok_or_else(|| ActionError::InvalidParams {
                action: "logDelayed".to_string(),
                reason: format!("delay must be a non-negative integer, got {}", v),
            })?,
        };
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No message");

        tracing::info!(action = "logDelayed", delay_ms = delay, "starting wait");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        tracing::info!(action = "logDelayed", "{}", message);
        Ok(())
    }
}

type EffectFn<C> = dyn Fn(Arc<C>) -> BoxFuture<'static, Result<(), ActionError>> + Send + Sync;

/// A compiled hook: state entry/exit hook or transition effect.
pub struct Effect<C> {
    label: String,
    mode: ActionMode,
    run: Arc<EffectFn<C>>,
}

impl<C: Context> Effect<C> {
    /// Creates a sync-mode effect from a synchronous closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self {
            label: "effect".to_string(),
            mode: ActionMode::Sync,
            run: Arc::new(move |ctx: Arc<C>| future::ready(f(ctx.as_ref())).boxed()),
        }
    }

    /// Creates a sync-mode effect from an async closure.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        Self {
            label: "effect".to_string(),
            mode: ActionMode::Sync,
            run: Arc::new(move |ctx: Arc<C>| f(ctx).boxed()),
        }
    }

    /// An effect that does nothing.
    pub fn noop() -> Self {
        Self {
            label: "noop".to_string(),
            mode: ActionMode::Sync,
            run: Arc::new(|_ctx: Arc<C>| future::ready(Ok(())).boxed()),
        }
    }

    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_mode(mut self, mode: ActionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Marks the effect fire-and-forget.
    pub fn detached(self) -> Self {
        self.with_mode(ActionMode::Async)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> ActionMode {
        self.mode
    }

    /// Starts the effect. The returned future owns everything it needs.
    pub fn invoke(&self, ctx: Arc<C>) -> BoxFuture<'static, Result<(), ActionError>> {
        (self.run)(ctx)
    }
}

impl<C> Clone for Effect<C> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            mode: self.mode,
            run: Arc::clone(&self.run),
        }
    }
}

impl<C> fmt::Debug for Effect<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Failure of a detached effect.
#[derive(Debug)]
pub struct EffectFailure {
    pub action: String,
    pub phase: HookPhase,
    pub from: String,
    pub to: String,
    pub event: String,
    pub error: ActionError,
}

/// Receives failures of detached effects.
pub type EffectFailureSink = mpsc::UnboundedSender<EffectFailure>;

/// Creates a sink and the receiver that observes it.
pub fn failure_channel() -> (EffectFailureSink, mpsc::UnboundedReceiver<EffectFailure>) {
    mpsc::unbounded_channel()
}

/// Where a detached effect was started from.
#[derive(Debug, Clone)]
pub(crate) struct EffectSite {
    pub phase: HookPhase,
    pub from: String,
    pub to: String,
    pub event: String,
}

/// Spawns an async-mode effect without joining it.
///
/// Outside a tokio runtime the effect is not run and the failure is
/// reported like any other detached failure.
pub(crate) fn spawn_detached<C: Context>(
    effect: &Effect<C>,
    ctx: Arc<C>,
    site: EffectSite,
    sink: Option<EffectFailureSink>,
) {
    let action = effect.label().to_string();

    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            let error = ActionError::failed(format!("no tokio runtime for detached effect: {}", e));
            report_detached_failure(action, site, sink, error);
            return;
        }
    };

    let task = handle.spawn(effect.invoke(ctx));
    handle.spawn(async move {
        let error = match task.await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(join_err) => ActionError::Panicked(join_err.to_string()),
        };
        report_detached_failure(action, site, sink, error);
    });
}

fn report_detached_failure(
    action: String,
    site: EffectSite,
    sink: Option<EffectFailureSink>,
    error: ActionError,
) {
    tracing::error!(
        action = %action,
        phase = %site.phase,
        event = %site.event,
        error = %error,
        "detached effect failed"
    );

    if let Some(sink) = sink {
        let _ = sink.send(EffectFailure {
            action,
            phase: site.phase,
            from: site.from,
            to: site.to,
            event: site.event,
            error,
        });
    }
}

/// Named table of action handlers.
pub struct ActionRegistry<C> {
    handlers: HashMap<String, Arc<dyn ActionHandler<C>>>,
}

impl<C: Context> ActionRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in `log` and `logDelayed` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("log", LogAction);
        registry.register("logDelayed", LogDelayedAction);
        registry
    }

    /// Registers a handler, replacing any previous one with the same name.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: ActionHandler<C> + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Registers an async closure as a handler.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.register(name, FnHandler(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler<C>>> {
        self.handlers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Lists registered handler names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolves an action config into an effect. Unknown action types
    /// compile to a no-op and log a warning.
    pub fn compile(&self, config: &ActionConfig) -> Effect<C> {
        let Some(handler) = self.get(&config.action_type) else {
            tracing::warn!(
                action = %config.action_type,
                "action type not found in registry, using no-op"
            );
            return Effect::noop().named(config.action_type.clone());
        };

        let params = config.params.clone();
        let run: Arc<EffectFn<C>> = Arc::new(move |ctx: Arc<C>| {
            let handler = Arc::clone(&handler);
            let params = params.clone();
            async move { handler.execute(ctx, &params).await }.boxed()
        });

        Effect {
            label: config.action_type.clone(),
            mode: config.mode,
            run,
        }
    }

    /// Compiles a list of action configs, preserving order.
    pub fn compile_all(&self, configs: &[ActionConfig]) -> Vec<Effect<C>> {
        configs.iter().map(|c| self.compile(c)).collect()
    }
}

impl<C: Context> Default for ActionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ActionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
