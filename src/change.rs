//! Spec change detection
//!
//! Every expensive side effect (creating infrastructure, running a dump or
//! restore) is gated on a comparison between the live spec and the snapshot
//! of the spec this controller last acted on. The snapshot lives in the
//! resource status as a structured field with a two-phase marker: `Recorded`
//! is written before acting, `Applied` after the action succeeded. A crash
//! between the two leaves the marker at `Recorded`, which reads as "changed"
//! and forces the (idempotent) action to run again.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Marker for the two-phase compare-and-act-and-record sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ApplyState {
    /// Intent written, action not yet known to have succeeded
    Recorded,
    /// Action succeeded with this spec
    Applied,
}

/// Snapshot of the last spec this controller acted on
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSpec<T> {
    pub state: ApplyState,
    pub spec: T,
}

impl<T> AppliedSpec<T> {
    pub fn recorded(spec: T) -> Self {
        Self {
            state: ApplyState::Recorded,
            spec,
        }
    }

    pub fn applied(spec: T) -> Self {
        Self {
            state: ApplyState::Applied,
            spec,
        }
    }
}

/// Compare the live spec against the last-applied snapshot.
///
/// A missing snapshot means the controller never acted and always reads as
/// changed. Only the spec subtree participates in the comparison; status and
/// metadata churn (the usual cause of duplicate dispatcher deliveries) never
/// trigger an action.
pub fn spec_changed<T: PartialEq>(current: &T, last: Option<&AppliedSpec<T>>) -> bool {
    match last {
        None => true,
        Some(applied) => applied.state != ApplyState::Applied || applied.spec != *current,
    }
}
