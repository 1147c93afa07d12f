//! Alerting: per-channel hysteretic state machines over machine status.
//!
//! One `AlertChannel` per transport (email, SMS). Each channel owns its
//! per-machine state and guarantees at most one inactive notification
//! per inactive episode, with a matching recovery notification.

mod email;
mod sms;

pub use email::*;
pub use sms::*;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;

use crate::detection::MachineStatus;

/// Alert transport error types.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Outbound notification transport for one channel.
pub trait Notifier {
    /// Channel name used in log lines.
    fn channel(&self) -> &'static str;

    /// Whether credentials and recipients are present.
    fn configured(&self) -> bool;

    fn send_inactive(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> impl Future<Output = Result<(), AlertError>> + Send;

    fn send_recovery(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        is_test: bool,
    ) -> impl Future<Output = Result<(), AlertError>> + Send;
}

/// Per-machine channel state. Lives only in process memory and resets
/// to defaults on restart.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub last_alert_time: Option<DateTime<Utc>>,
    pub alert_sent_for_current_inactive_period: bool,
    pub last_known_status: Option<MachineStatus>,
}

/// One alert channel: a notifier plus its machine-state map.
pub struct AlertChannel<N: Notifier> {
    notifier: N,
    enabled: bool,
    alert_machines: Vec<String>,
    states: HashMap<String, ChannelState>,
}

impl<N: Notifier> AlertChannel<N> {
    pub fn new(notifier: N, enabled: bool, alert_machines: Vec<String>) -> Self {
        Self {
            notifier,
            enabled,
            alert_machines,
            states: HashMap::new(),
        }
    }

    /// Channel state for a machine, if any cycle has touched it yet.
    pub fn state(&self, machine_id: &str) -> Option<&ChannelState> {
        self.states.get(machine_id)
    }

    fn eligible(&self, machine_id: &str) -> bool {
        self.enabled && self.alert_machines.iter().any(|m| m == machine_id)
    }

    fn should_send_inactive(&self, machine_id: &str) -> bool {
        if !self.eligible(machine_id) {
            return false;
        }
        !self
            .states
            .get(machine_id)
            .map(|s| s.alert_sent_for_current_inactive_period)
            .unwrap_or(false)
    }

    /// Record the status observed this cycle and fire the recovery
    /// notification on an inactive-to-active transition.
    ///
    /// `inactive_minutes` is the inactive duration measured just before
    /// the transition was recorded. The period flag is cleared whether
    /// or not the send succeeds.
    pub async fn observe_status(
        &mut self,
        machine_id: &str,
        status: MachineStatus,
        inactive_minutes: f64,
    ) {
        let state = self.states.entry(machine_id.to_string()).or_default();
        let previous = state.last_known_status.replace(status);

        if previous != Some(MachineStatus::Inactive) || status != MachineStatus::Active {
            return;
        }

        let alert_was_sent = state.alert_sent_for_current_inactive_period;
        state.alert_sent_for_current_inactive_period = false;
        tracing::debug!(
            "AlertChannel[{}]: {} transitioned to active - reset alert flag",
            self.notifier.channel(),
            machine_id
        );

        if !alert_was_sent || !self.eligible(machine_id) {
            return;
        }

        match self
            .notifier
            .send_recovery(machine_id, inactive_minutes, false)
            .await
        {
            Ok(()) => tracing::info!(
                "AlertChannel[{}]: active-again alert sent for {} (was inactive {:.1} minutes)",
                self.notifier.channel(),
                machine_id,
                inactive_minutes
            ),
            Err(e) => tracing::warn!(
                "AlertChannel[{}]: failed to send active-again alert for {}: {}",
                self.notifier.channel(),
                machine_id,
                e
            ),
        }
    }

    /// Evaluate the inactive alert for one machine. Returns whether a
    /// notification went out this cycle.
    pub async fn check_inactive(
        &mut self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.should_send_inactive(machine_id) {
            tracing::debug!(
                "AlertChannel[{}]: skipping alert for {} - already sent or not configured",
                self.notifier.channel(),
                machine_id
            );
            return false;
        }

        match self
            .notifier
            .send_inactive(machine_id, inactive_minutes, last_active, false)
            .await
        {
            Ok(()) => {
                let state = self.states.entry(machine_id.to_string()).or_default();
                state.last_alert_time = Some(now);
                state.alert_sent_for_current_inactive_period = true;
                tracing::info!(
                    "AlertChannel[{}]: alert sent for {} (inactive for {:.1} minutes)",
                    self.notifier.channel(),
                    machine_id,
                    inactive_minutes
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    "AlertChannel[{}]: failed to send alert for {}: {}",
                    self.notifier.channel(),
                    machine_id,
                    e
                );
                false
            }
        }
    }

    /// Test-mode inactive send: bypasses gating and leaves state untouched.
    pub async fn send_test_inactive(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
    ) -> Result<(), AlertError> {
        self.notifier
            .send_inactive(machine_id, inactive_minutes, last_active, true)
            .await
    }

    /// Test-mode recovery send: bypasses gating and leaves state untouched.
    pub async fn send_test_recovery(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
    ) -> Result<(), AlertError> {
        self.notifier
            .send_recovery(machine_id, inactive_minutes, true)
            .await
    }
}
