//! SMS notifier: one gateway call per recipient against a Twilio-style
//! REST API. The channel succeeds if at least one recipient does.

use chrono::{DateTime, Utc};

use crate::config::SmsConfig;

use super::{AlertError, Notifier};

pub struct SmsNotifier {
    cfg: SmsConfig,
    client: reqwest::Client,
}

impl SmsNotifier {
    pub fn new(cfg: SmsConfig) -> Self {
        if cfg.enabled
            && (cfg.account_sid.is_empty() || cfg.auth_token.is_empty() || cfg.from_number.is_empty())
        {
            tracing::warn!(
                "SMS credentials not configured; set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, and TWILIO_FROM_NUMBER"
            );
        }
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.account_sid
        )
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.cfg.account_sid, Some(&self.cfg.auth_token))
            .form(&[
                ("To", to),
                ("From", self.cfg.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AlertError::Gateway(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fan the message out to every recipient independently.
    async fn send_to_all(&self, body: &str) -> Result<(), AlertError> {
        if !self.configured() {
            return Err(AlertError::Config(
                "SMS credentials not configured".to_string(),
            ));
        }
        if self.cfg.recipients.is_empty() {
            return Err(AlertError::Config("no SMS recipients configured".to_string()));
        }

        let mut sent = 0usize;
        for recipient in &self.cfg.recipients {
            match self.send_one(recipient, body).await {
                Ok(()) => {
                    tracing::debug!("SMS sent to {}", recipient);
                    sent += 1;
                }
                Err(e) => tracing::error!("Failed to send SMS to {}: {}", recipient, e),
            }
        }

        if sent > 0 {
            tracing::debug!("SMS delivered to {}/{} recipients", sent, self.cfg.recipients.len());
            Ok(())
        } else {
            Err(AlertError::Gateway(
                "failed to send SMS to any recipient".to_string(),
            ))
        }
    }

    fn inactive_message(
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> String {
        if is_test {
            return format!(
                "TEST ALERT: laser monitor SMS system is working correctly. Machine: {}",
                machine_id
            );
        }
        let last_active_str = last_active
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        format!(
            "LASER ALERT: {} has been inactive for {:.1} minutes. Last active: {}. Please check the machine.",
            machine_id, inactive_minutes, last_active_str
        )
    }

    fn recovery_message(machine_id: &str, inactive_minutes: f64, is_test: bool) -> String {
        if is_test {
            return format!(
                "TEST: laser monitor active alert system working. Machine: {}",
                machine_id
            );
        }
        format!(
            "LASER UPDATE: {} is now ACTIVE again after being inactive for {:.1} minutes.",
            machine_id, inactive_minutes
        )
    }
}

impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }

    fn configured(&self) -> bool {
        !self.cfg.account_sid.is_empty()
            && !self.cfg.auth_token.is_empty()
            && !self.cfg.from_number.is_empty()
    }

    async fn send_inactive(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> Result<(), AlertError> {
        let body = Self::inactive_message(machine_id, inactive_minutes, last_active, is_test);
        self.send_to_all(&body).await
    }

    async fn send_recovery(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        is_test: bool,
    ) -> Result<(), AlertError> {
        let body = Self::recovery_message(machine_id, inactive_minutes, is_test);
        self.send_to_all(&body).await
    }
}
