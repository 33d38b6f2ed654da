/// Host-side runtime for behavior scripts
///
/// Behaviors attached to actors receive messages through [`HandlerApi`], the
/// only surface they see. [`BehaviorSystem`] routes messages, schedules
/// sleeping handlers and hands one merged response per tick to the host.
pub mod actor;
pub mod behavior_system;
pub mod compat;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod registry;
pub mod response;
pub mod sleep;
pub mod views;

// Re-export commonly used types for host-side scripting
pub use actor::{Actor, ActorStore, Memory, ModuleBehaviorUse};
pub use behavior_system::{BehaviorSystem, BroadcastOptions};
pub use compat::LegacyHandlerApi;
pub use config::ScriptingConfig;
pub use context::{Continuation, Flow, HandlerApi, HandlerResult};
pub use error::{ScriptError, ScriptResult};
pub use host::{HostError, HostServices, RecordingHost};
pub use response::{ResponseBuffer, TickBuffer};
pub use sleep::{SleepId, SleepManager, SleepState};
pub use views::{ActorMut, ActorRef, HandlingActor, MutableActorView, OtherActor, ReadOnlyActorView};

pub use registry::create_system_from_config;

/// A behavior module that can be attached to actors
pub trait Behavior: Send + Sync + 'static {
    /// URI that behavior uses refer to (e.g., "builtin:Spinner")
    fn uri(&self) -> &str;

    /// Messages this behavior wants to receive
    fn subscribed_messages(&self) -> &[MessageFilter];

    /// Handle one delivered message for one behavior use
    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult;
}

/// Filter for subscribing to messages by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Subscribe to all messages
    All,
    /// Subscribe to one message name
    Named(&'static str),
}

impl MessageFilter {
    pub fn matches(&self, message: &str) -> bool {
        match self {
            MessageFilter::All => true,
            MessageFilter::Named(name) => *name == message,
        }
    }
}

/// Behavior backed by a closure
pub struct FnBehavior<F> {
    uri: String,
    filters: Vec<MessageFilter>,
    handler: F,
}

impl<F> FnBehavior<F>
where
    F: Fn(&mut HandlerApi<'_>) -> HandlerResult + Send + Sync + 'static,
{
    pub fn new(uri: impl Into<String>, filters: Vec<MessageFilter>, handler: F) -> Self {
        Self {
            uri: uri.into(),
            filters,
            handler,
        }
    }
}

impl<F> Behavior for FnBehavior<F>
where
    F: Fn(&mut HandlerApi<'_>) -> HandlerResult + Send + Sync + 'static,
{
    fn uri(&self) -> &str {
        &self.uri
    }

    fn subscribed_messages(&self) -> &[MessageFilter] {
        &self.filters
    }

    fn on_message(&self, api: &mut HandlerApi<'_>) -> HandlerResult {
        (self.handler)(api)
    }
}
