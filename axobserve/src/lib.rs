//! Observability hooks for model calls, tool runs, and chat turns.
//!
//! [`standard_hooks`] is what the runtime installs: tracing and metrics side by side, each
//! callback behind a panic guard. One value serves all three hook traits.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axchat::TurnLifecycleHooks;
//! use axobserve::{SafeHooks, TracingObservabilityHooks, standard_hooks};
//! use axprovider::ProviderOperationHooks;
//!
//! let hooks = Arc::new(standard_hooks());
//! let _provider: Arc<dyn ProviderOperationHooks> = hooks.clone();
//! let _turns: Arc<dyn TurnLifecycleHooks> = hooks;
//!
//! let _tracing_only = SafeHooks::new(TracingObservabilityHooks);
//! ```

mod fanout;
mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use fanout::FanoutHooks;
pub use metrics_hooks::{MetricsObservabilityHooks, names as metric_names};
pub use safe_hooks::SafeHooks;
pub use tracing_hooks::TracingObservabilityHooks;

pub type StandardHooks =
    SafeHooks<FanoutHooks<TracingObservabilityHooks, MetricsObservabilityHooks>>;

pub fn standard_hooks() -> StandardHooks {
    SafeHooks::new(FanoutHooks::new(
        TracingObservabilityHooks,
        MetricsObservabilityHooks,
    ))
}

pub mod prelude {
    pub use crate::{
        FanoutHooks, MetricsObservabilityHooks, SafeHooks, StandardHooks,
        TracingObservabilityHooks, standard_hooks,
    };
}

#[cfg(test)]
mod tests;
