//! Source of the current delivery target list.

use std::fmt;

use relaycast_core::DeliveryTarget;

/// Supplies the targets a broadcast is sent to.
///
/// Read once per broadcast; the dispatcher works from that snapshot.
pub trait TargetRegistry: Send + Sync + fmt::Debug {
    /// Returns the current targets. Order carries no meaning.
    fn current_targets(&self) -> Vec<DeliveryTarget>;
}

/// Registry with a fixed list of targets, usually taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetRegistry {
    targets: Vec<DeliveryTarget>,
}

impl StaticTargetRegistry {
    /// Creates a registry over the given targets.
    pub fn new(targets: impl IntoIterator<Item = impl Into<DeliveryTarget>>) -> Self {
        Self { targets: targets.into_iter().map(Into::into).collect() }
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no targets are registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl TargetRegistry for StaticTargetRegistry {
    fn current_targets(&self) -> Vec<DeliveryTarget> {
        self.targets.clone()
    }
}
