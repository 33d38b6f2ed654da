use serde::{Deserialize, Serialize};

/// Out-of-band events sent to the host outside the per-tick response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostNotification {
    /// A handler broadcast the reset message
    #[serde(rename_all = "camelCase")]
    GameResetRequested { requested_by: String },
    /// An actor was cloned during the tick
    #[serde(rename_all = "camelCase")]
    ActorCloned { source: String, clone: String },
    /// An actor was destroyed at the end of the tick
    #[serde(rename_all = "camelCase")]
    ActorDestroyed { name: String },
}
