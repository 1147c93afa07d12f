//! Email notifier: HTML alerts over SMTP submission (STARTTLS).

use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;

use super::{AlertError, Notifier};

pub struct EmailNotifier {
    cfg: EmailConfig,
}

impl EmailNotifier {
    pub fn new(cfg: EmailConfig) -> Self {
        if cfg.enabled && (cfg.username.is_empty() || cfg.password.is_empty()) {
            tracing::warn!(
                "Email credentials not configured; set LASERWATCH_EMAIL_USER and LASERWATCH_EMAIL_PASS"
            );
        }
        Self { cfg }
    }

    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, AlertError> {
        let relay = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.cfg.smtp_server)
            .map_err(|e| AlertError::Transport(e.to_string()))?;
        Ok(relay
            .port(self.cfg.smtp_port)
            .credentials(Credentials::new(
                self.cfg.username.clone(),
                self.cfg.password.clone(),
            ))
            .build())
    }

    fn build_message(&self, subject: &str, body: String) -> Result<Message, AlertError> {
        let mut builder = Message::builder()
            .from(
                self.cfg
                    .from
                    .parse()
                    .map_err(|e| AlertError::Config(format!("invalid from address: {}", e)))?,
            )
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for recipient in &self.cfg.recipients {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| AlertError::Config(format!("invalid recipient {}: {}", recipient, e)))?);
        }
        builder
            .body(body)
            .map_err(|e| AlertError::Transport(e.to_string()))
    }

    async fn send(&self, subject: &str, body: String) -> Result<(), AlertError> {
        if !self.configured() {
            return Err(AlertError::Config(
                "email credentials or recipients not configured".to_string(),
            ));
        }
        let message = self.build_message(subject, body)?;
        self.mailer()?
            .send(message)
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;
        Ok(())
    }

    fn inactive_body(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> String {
        let last_active_str = last_active
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let current_time = Utc::now().format("%Y-%m-%d %H:%M:%S");

        let (header_color, header_text, status_text, test_notice) = if is_test {
            (
                "#2196F3",
                "Laser Monitor Test Alert",
                "TEST - INACTIVE",
                TEST_NOTICE,
            )
        } else {
            ("#d32f2f", "Laser Monitor Alert", "INACTIVE", "")
        };

        format!(
            r#"<html>
<body>
  <h2 style="color: {header_color};">{header_text}</h2>
  {test_notice}
  <p><strong>Machine:</strong> {machine_id}</p>
  <p><strong>Status:</strong> <span style="color: {header_color};">{status_text}</span></p>
  <p><strong>Inactive Duration:</strong> {inactive_minutes:.1} minutes</p>
  <p><strong>Last Active:</strong> {last_active_str}</p>
  <p><strong>Alert Time:</strong> {current_time}</p>
  <hr>
  <p>The machine has been inactive longer than the configured threshold.
  Please check the machine status and investigate if necessary.</p>
  <p><em>This is an automated alert from the laser monitor.</em></p>
</body>
</html>"#
        )
    }

    fn recovery_body(&self, machine_id: &str, inactive_minutes: f64, is_test: bool) -> String {
        let current_time = Utc::now().format("%Y-%m-%d %H:%M:%S");

        let (header_color, header_text, status_text) = if is_test {
            ("#2196F3", "Laser Monitor Test - Machine Active", "TEST - ACTIVE AGAIN")
        } else {
            ("#4caf50", "Laser Monitor - Machine Active Again", "ACTIVE AGAIN")
        };

        format!(
            r#"<html>
<body>
  <h2 style="color: {header_color};">{header_text}</h2>
  <p><strong>Machine:</strong> {machine_id}</p>
  <p><strong>Status:</strong> <span style="color: {header_color}; font-weight: bold;">{status_text}</span></p>
  <p><strong>Previous Inactive Duration:</strong> {inactive_minutes:.1} minutes</p>
  <p><strong>Alert Time:</strong> {current_time}</p>
  <hr>
  <p style="font-size: 12px; color: #666;">
    The machine is active again after being inactive for {inactive_minutes:.1} minutes.
  </p>
</body>
</html>"#
        )
    }
}

const TEST_NOTICE: &str = r#"<div style="background-color: #e3f2fd; padding: 10px; border-left: 4px solid #2196F3; margin: 10px 0;">
    <strong>This is a test email</strong> sent to verify the alert system is working.
  </div>"#;

impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    fn configured(&self) -> bool {
        !self.cfg.username.is_empty()
            && !self.cfg.password.is_empty()
            && !self.cfg.recipients.is_empty()
    }

    async fn send_inactive(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        last_active: Option<DateTime<Utc>>,
        is_test: bool,
    ) -> Result<(), AlertError> {
        let subject = if is_test {
            format!("TEST - {}", self.cfg.subject)
        } else {
            self.cfg.subject.clone()
        };
        let body = self.inactive_body(machine_id, inactive_minutes, last_active, is_test);
        self.send(&subject, body).await
    }

    async fn send_recovery(
        &self,
        machine_id: &str,
        inactive_minutes: f64,
        is_test: bool,
    ) -> Result<(), AlertError> {
        let subject = if is_test {
            format!("TEST - Machine Active Again - {}", self.cfg.subject)
        } else {
            format!("Machine Active Again - {}", self.cfg.subject)
        };
        let body = self.recovery_body(machine_id, inactive_minutes, is_test);
        self.send(&subject, body).await
    }
}
