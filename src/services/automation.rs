//! Daily email automation: reminders before an event and a thank-you after it.
//!
//! A run scans every event, asks [`schedule::due_emails`] what is due and
//! attempts each send. Every automated send is keyed in the email log by
//! `(event, type, offset)`; the log entry is written only after the provider
//! accepted the email, so a failed send is attempted again by a later run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{BrandingConfig, Config};
use crate::db::{
    EmailLogEntry, EmailType, Event, LogInsert, LogKey, NewEmailLogEntry, Registration, Trigger,
};
use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;
use crate::services::email::{DispatchReceipt, EmailGateway, GatewayError, OutgoingEmail};
use crate::services::schedule::{self, DayOffsets, DueEmail, DuePolicy};
use crate::services::store::AutomationStore;
use crate::services::templates::{self, RenderedEmail};

/// Settings the automation needs, resolved from [`Config`] at startup.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub reminder_offsets: Vec<i64>,
    pub due_policy: DuePolicy,
    pub from_address: String,
    pub dispatch_timeout: Duration,
    pub branding: BrandingConfig,
}

impl AutomationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reminder_offsets: config.automation.reminder_offsets.clone(),
            due_policy: config.automation.due_policy,
            from_address: config.email.from_address.clone(),
            dispatch_timeout: Duration::from_secs(config.email.timeout_seconds),
            branding: config.branding.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySent,
    NoRecipients,
}

/// Result of one attempted automated send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { recipients: usize },
    Skipped(SkipReason),
    /// Nothing was logged; a later run will try again.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub events_scanned: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub emails_skipped: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &SendOutcome) {
        match outcome {
            SendOutcome::Sent { .. } => self.emails_sent += 1,
            SendOutcome::Skipped(_) => self.emails_skipped += 1,
            SendOutcome::Failed(_) => self.emails_failed += 1,
        }
    }
}

pub struct AutomationService {
    store: Arc<dyn AutomationStore>,
    gateway: Arc<dyn EmailGateway>,
    clock: Arc<dyn Clock>,
    settings: AutomationSettings,
    run_lock: Mutex<()>,
}

impl AutomationService {
    pub fn new(
        store: Arc<dyn AutomationStore>,
        gateway: Arc<dyn EmailGateway>,
        clock: Arc<dyn Clock>,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    /// Run the automation once over all events.
    ///
    /// Fails only if the run cannot start (another run in progress) or the
    /// event list cannot be loaded. Per-email failures are counted in the
    /// summary.
    pub async fn run(&self) -> AppResult<RunSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| {
            AppError::Conflict("An automation run is already in progress".to_string())
        })?;

        let now = self.clock.now();
        let events = self.store.find_events_all().await?;

        info!(
            "Starting email automation run at {} over {} event(s)",
            now.to_rfc3339(),
            events.len()
        );

        let mut summary = RunSummary {
            events_scanned: events.len(),
            ..RunSummary::default()
        };

        for event in &events {
            let due = schedule::due_emails(
                now,
                event.date,
                &self.settings.reminder_offsets,
                self.settings.due_policy,
            );

            for email in due {
                let outcome = match email {
                    DueEmail::Reminder { days_before } => {
                        self.send_reminder(event, days_before).await
                    }
                    DueEmail::ThankYou => self.send_thank_you(event).await,
                };

                match &outcome {
                    SendOutcome::Sent { recipients } => info!(
                        "Sent {:?} for event {} to {} recipient(s)",
                        email, event.id, recipients
                    ),
                    SendOutcome::Skipped(reason) => {
                        debug!("Skipped {:?} for event {}: {:?}", email, event.id, reason)
                    }
                    SendOutcome::Failed(err) => {
                        warn!("Failed to send {:?} for event {}: {}", email, event.id, err)
                    }
                }

                summary.record(&outcome);
            }
        }

        info!(
            "Email automation run finished: events={}, sent={}, failed={}, skipped={}",
            summary.events_scanned,
            summary.emails_sent,
            summary.emails_failed,
            summary.emails_skipped
        );

        Ok(summary)
    }

    /// Reminder `days_before` days ahead of `event`, at most once per offset.
    pub async fn send_reminder(&self, event: &Event, days_before: i64) -> SendOutcome {
        let branding = &self.settings.branding;
        self.send_automated(event, LogKey::reminder(&event.id, days_before), |first_name| {
            templates::render_reminder(branding, event, days_before, first_name)
        })
        .await
    }

    /// Thank-you after `event`, at most once.
    pub async fn send_thank_you(&self, event: &Event) -> SendOutcome {
        let branding = &self.settings.branding;
        self.send_automated(event, LogKey::thank_you(&event.id), |first_name| {
            templates::render_thank_you(branding, event, first_name)
        })
        .await
    }

    async fn send_automated<F>(&self, event: &Event, key: LogKey, render: F) -> SendOutcome
    where
        F: FnOnce(Option<&str>) -> RenderedEmail,
    {
        match self.try_send_automated(event, &key, render).await {
            Ok(outcome) => outcome,
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }

    async fn try_send_automated<F>(
        &self,
        event: &Event,
        key: &LogKey,
        render: F,
    ) -> AppResult<SendOutcome>
    where
        F: FnOnce(Option<&str>) -> RenderedEmail,
    {
        if let Some(existing) = self.store.find_log_entry(key).await? {
            debug!(
                "{} for event {} already sent at {} ({})",
                key.email_type,
                event.id,
                existing.sent_at.to_rfc3339(),
                existing.trigger.as_str()
            );
            return Ok(SendOutcome::Skipped(SkipReason::AlreadySent));
        }

        let registrations = self.store.find_registrations_by_event(&event.id).await?;
        if registrations.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::NoRecipients));
        }

        // Rendered once for every recipient; the greeting uses the first registrant.
        let rendered = render(registrations.first().map(|r| r.first_name.as_str()));
        let email = self.build_email(&registrations, &rendered, Some(key.idempotency_key()));

        if let Err(e) = self.dispatch(&email).await {
            return Ok(SendOutcome::Failed(e.to_string()));
        }

        let entry = NewEmailLogEntry {
            event_id: event.id.clone(),
            email_type: key.email_type,
            days_before_event: key.days_before_event,
            sent_at: self.clock.now(),
            recipient_count: email.to.len() as i64,
            subject: rendered.subject,
            trigger: Trigger::Auto,
        };

        match self.store.insert_log_entry(entry).await {
            Ok(LogInsert::Inserted(_)) => Ok(SendOutcome::Sent {
                recipients: email.to.len(),
            }),
            Ok(LogInsert::Duplicate) => {
                warn!(
                    "{} for event {} was recorded concurrently",
                    key.email_type, event.id
                );
                Ok(SendOutcome::Skipped(SkipReason::AlreadySent))
            }
            Err(e) => {
                error!(
                    "{} for event {} was accepted by the provider but could not be logged; \
                     a later run will dispatch it again under idempotency key {}: {}",
                    key.email_type,
                    event.id,
                    key.idempotency_key(),
                    e
                );
                Ok(SendOutcome::Failed(format!("log write failed: {}", e)))
            }
        }
    }

    /// Send a reminder or thank-you for `event` right now on an admin's request.
    ///
    /// A manual send shares the key space of automated sends: a reminder is
    /// keyed by the current days-until offset, a thank-you by the event alone.
    /// If that key is already logged, by either trigger, nothing is sent and
    /// the call fails with `Conflict`.
    pub async fn send_manual(&self, event: &Event, email_type: EmailType) -> AppResult<EmailLogEntry> {
        let now = self.clock.now();

        let key = match email_type {
            EmailType::Reminder => {
                let days_until = DayOffsets::between(now, event.date).days_until;
                if days_until <= 0 {
                    return Err(AppError::BadRequest(
                        "Event has already started; reminders can no longer be sent".to_string(),
                    ));
                }
                LogKey::reminder(&event.id, days_until)
            }
            EmailType::ThankYou => LogKey::thank_you(&event.id),
        };

        if let Some(existing) = self.store.find_log_entry(&key).await? {
            return Err(AppError::Conflict(format!(
                "{} for event {} was already sent at {}",
                email_type,
                event.id,
                existing.sent_at.to_rfc3339()
            )));
        }

        let registrations = self.store.find_registrations_by_event(&event.id).await?;
        if registrations.is_empty() {
            return Err(AppError::Validation(format!(
                "Event {} has no registrations",
                event.id
            )));
        }

        let first_name = registrations.first().map(|r| r.first_name.as_str());
        let rendered = match key.days_before_event {
            Some(days_before) => {
                templates::render_reminder(&self.settings.branding, event, days_before, first_name)
            }
            None => templates::render_thank_you(&self.settings.branding, event, first_name),
        };
        let days_before_event = key.days_before_event;

        let email = self.build_email(&registrations, &rendered, None);
        let receipt = self
            .dispatch(&email)
            .await
            .map_err(|e| AppError::EmailGateway(e.to_string()))?;

        info!(
            "Manual {} for event {} sent to {} recipient(s), message_id={:?}",
            email_type,
            event.id,
            email.to.len(),
            receipt.message_id
        );

        let entry = NewEmailLogEntry {
            event_id: event.id.clone(),
            email_type,
            days_before_event,
            sent_at: self.clock.now(),
            recipient_count: email.to.len() as i64,
            subject: rendered.subject,
            trigger: Trigger::Manual,
        };

        match self.store.insert_log_entry(entry).await? {
            LogInsert::Inserted(row) => Ok(row),
            LogInsert::Duplicate => Err(AppError::Conflict(format!(
                "{} for event {} is already recorded",
                email_type, event.id
            ))),
        }
    }

    fn build_email(
        &self,
        registrations: &[Registration],
        rendered: &RenderedEmail,
        idempotency_key: Option<String>,
    ) -> OutgoingEmail {
        OutgoingEmail {
            from: self.settings.from_address.clone(),
            to: registrations.iter().map(|r| r.email.clone()).collect(),
            subject: rendered.subject.clone(),
            html: rendered.html.clone(),
            idempotency_key,
        }
    }

    async fn dispatch(&self, email: &OutgoingEmail) -> Result<DispatchReceipt, GatewayError> {
        let timeout = self.settings.dispatch_timeout;
        tokio::time::timeout(timeout, self.gateway.send(email))
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?
    }
}
