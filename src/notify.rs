//! Email notifications.
//!
//! Delivery is best effort. [`Notifier::notify`] returns immediately, the send
//! runs on its own thread with a bounded wait, and any failure is logged and
//! dropped. A failed email never touches the business transaction that
//! triggered it.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::NotificationError;

/// Bounded wait for a single send
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    LeaveSubmitted,
    LeaveTlApproved,
    LeaveApproved,
    LeaveRejected,
    LeaveCancelled,
    BalanceAdjusted,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::LeaveSubmitted => "leave_submitted",
            NotificationKind::LeaveTlApproved => "leave_tl_approved",
            NotificationKind::LeaveApproved => "leave_approved",
            NotificationKind::LeaveRejected => "leave_rejected",
            NotificationKind::LeaveCancelled => "leave_cancelled",
            NotificationKind::BalanceAdjusted => "balance_adjusted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

pub type TemplateFields = BTreeMap<String, String>;

pub trait NotificationSender: Send + Sync {
    /// Checked before any work is done for a send
    fn is_enabled(&self) -> bool;

    fn send(
        &self,
        kind: NotificationKind,
        recipients: &[Recipient],
        fields: &TemplateFields,
    ) -> Result<(), NotificationError>;
}

/// Count of deliveries still in flight, shared by every clone of a notifier
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    fn finish(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.idle.notify_all();
            }
        }
    }
}

/// Fire-and-forget front for a [`NotificationSender`]
#[derive(Clone)]
pub struct Notifier {
    sender: Option<Arc<dyn NotificationSender>>,
    timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl Notifier {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            sender: Some(sender),
            timeout: SEND_TIMEOUT,
            in_flight: Arc::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            sender: None,
            timeout: SEND_TIMEOUT,
            in_flight: Arc::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| s.is_enabled())
    }

    pub fn notify(&self, kind: NotificationKind, recipients: Vec<Recipient>, fields: TemplateFields) {
        let Some(sender) = &self.sender else {
            return;
        };
        if !sender.is_enabled() {
            tracing::debug!(%kind, "notifications disabled, skipping");
            return;
        }
        if recipients.is_empty() {
            tracing::debug!(%kind, "no recipients, skipping");
            return;
        }

        let sender = Arc::clone(sender);
        let timeout = self.timeout;
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.begin();
        let spawned = thread::Builder::new().name("notify".into()).spawn({
            let in_flight = Arc::clone(&in_flight);
            move || {
                deliver(sender, kind, recipients, fields, timeout);
                in_flight.finish();
            }
        });
        if let Err(e) = spawned {
            in_flight.finish();
            tracing::warn!(%kind, error = %e, "could not start notification thread");
        }
    }

    /// Blocks until every delivery started so far has finished or been
    /// abandoned, waiting at most `timeout` (capped at [`SEND_TIMEOUT`]).
    /// Short-lived processes call this before exiting. Returns `true` when
    /// nothing is left in flight.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout.min(SEND_TIMEOUT);
        let Ok(mut count) = self.in_flight.count.lock() else {
            return false;
        };
        while *count > 0 {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                tracing::warn!(pending = *count, "notifications still in flight at shutdown");
                return false;
            }
            count = match self.in_flight.idle.wait_timeout(count, left) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        true
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}

fn deliver(
    sender: Arc<dyn NotificationSender>,
    kind: NotificationKind,
    recipients: Vec<Recipient>,
    fields: TemplateFields,
    timeout: Duration,
) {
    let (tx, rx) = mpsc::channel();
    let worker = thread::Builder::new().name("notify-send".into()).spawn(move || {
        let _ = tx.send(sender.send(kind, &recipients, &fields));
    });
    if let Err(e) = worker {
        tracing::warn!(%kind, error = %e, "could not start notification sender");
        return;
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => tracing::debug!(%kind, "notification sent"),
        Ok(Err(e)) => tracing::warn!(%kind, error = %e, "notification failed"),
        Err(_) => tracing::warn!(
            %kind,
            error = %NotificationError::TimedOut,
            "notification abandoned"
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailPayload<'a> {
    api_key: &'a str,
    from: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: String,
    html: String,
}

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EmailResponse {
    success: bool,
    #[allow(dead_code)]
    message_id: Option<String>,
    error: Option<String>,
}

/// Posts rendered emails to an HTTP email API
pub struct EmailApiSender {
    client: reqwest::blocking::Client,
    settings: EmailSettings,
}

impl EmailApiSender {
    pub fn new(settings: EmailSettings) -> Result<Self, NotificationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()?;
        Ok(Self { client, settings })
    }
}

impl NotificationSender for EmailApiSender {
    fn is_enabled(&self) -> bool {
        self.settings.enabled && !self.settings.api_url.is_empty()
    }

    fn send(
        &self,
        kind: NotificationKind,
        recipients: &[Recipient],
        fields: &TemplateFields,
    ) -> Result<(), NotificationError> {
        if !self.is_enabled() {
            return Err(NotificationError::Disabled);
        }
        let (subject, html) = render(kind, fields);
        let payload = EmailPayload {
            api_key: &self.settings.api_key,
            from: Contact {
                email: &self.settings.from_email,
                name: &self.settings.from_name,
            },
            to: recipients
                .iter()
                .map(|r| Contact {
                    email: &r.email,
                    name: &r.name,
                })
                .collect(),
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.settings.api_url)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            return Err(NotificationError::HttpStatus(response.status().as_u16()));
        }
        let body: EmailResponse = response.json()?;
        if !body.success {
            return Err(NotificationError::Rejected(
                body.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }
}

fn field<'a>(fields: &'a TemplateFields, name: &str) -> &'a str {
    fields.get(name).map(String::as_str).unwrap_or("")
}

/// Subject and HTML body for a notification
pub fn render(kind: NotificationKind, fields: &TemplateFields) -> (String, String) {
    let employee = escape_html(field(fields, "employee_name"));
    let actor = escape_html(field(fields, "actor_name"));
    let summary = format!(
        "{} leave from {} to {} ({} minutes)",
        escape_html(field(fields, "leave_type")),
        escape_html(field(fields, "start")),
        escape_html(field(fields, "end")),
        escape_html(field(fields, "minutes")),
    );

    let (subject, body) = match kind {
        NotificationKind::LeaveSubmitted => (
            format!("Leave request from {employee}"),
            format!("<p>{employee} requested {summary}.</p><p>Please review it.</p>"),
        ),
        NotificationKind::LeaveTlApproved => (
            format!("Leave request from {employee} awaits final approval"),
            format!("<p>{actor} approved {summary} for {employee}. A manager approval is still required.</p>"),
        ),
        NotificationKind::LeaveApproved => (
            "Your leave request was approved".to_string(),
            format!("<p>{actor} approved your {summary}.</p>"),
        ),
        NotificationKind::LeaveRejected => {
            let reason = field(fields, "reason");
            let reason = if reason.is_empty() {
                String::new()
            } else {
                format!("<p>Reason: {}</p>", escape_html(reason))
            };
            (
                "Your leave request was rejected".to_string(),
                format!("<p>{actor} rejected your {summary}.</p>{reason}"),
            )
        }
        NotificationKind::LeaveCancelled => (
            format!("Leave request for {employee} was cancelled"),
            format!("<p>{actor} cancelled {summary}.</p>"),
        ),
        NotificationKind::BalanceAdjusted => (
            "Your leave balance was adjusted".to_string(),
            format!(
                "<p>{actor} adjusted your {} balance for {} by {} minutes. New balance: {} minutes.</p><p>Reason: {}</p>",
                escape_html(field(fields, "leave_type")),
                escape_html(field(fields, "year")),
                escape_html(field(fields, "delta_minutes")),
                escape_html(field(fields, "balance_minutes")),
                escape_html(field(fields, "reason")),
            ),
        ),
    };
    (subject, body)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct SlowSender {
        calls: Mutex<u32>,
    }

    impl NotificationSender for SlowSender {
        fn is_enabled(&self) -> bool {
            true
        }
        fn send(&self, _: NotificationKind, _: &[Recipient], _: &TemplateFields) -> Result<(), NotificationError> {
            *self.calls.lock().unwrap() += 1;
            thread::sleep(Duration::from_millis(200));
            Err(NotificationError::HttpStatus(500))
        }
    }

    fn recipient() -> Recipient {
        Recipient {
            email: "emp@example.com".into(),
            name: "Emp".into(),
        }
    }

    #[test]
    fn notify_returns_before_send_finishes() {
        let sender = Arc::new(SlowSender { calls: Mutex::new(0) });
        let notifier = Notifier::new(sender.clone()).with_timeout(Duration::from_millis(10));

        let started = std::time::Instant::now();
        notifier.notify(NotificationKind::LeaveApproved, vec![recipient()], TemplateFields::new());
        assert!(started.elapsed() < Duration::from_millis(150));

        thread::sleep(Duration::from_millis(400));
        assert_eq!(*sender.calls.lock().unwrap(), 1);
    }

    #[derive(Default)]
    struct RecordingSender {
        kinds: Mutex<Vec<NotificationKind>>,
    }

    impl NotificationSender for RecordingSender {
        fn is_enabled(&self) -> bool {
            true
        }
        fn send(&self, kind: NotificationKind, _: &[Recipient], _: &TemplateFields) -> Result<(), NotificationError> {
            thread::sleep(Duration::from_millis(100));
            self.kinds.lock().unwrap().push(kind);
            Ok(())
        }
    }

    #[test]
    fn drain_waits_for_pending_sends() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(sender.clone());

        notifier.notify(NotificationKind::BalanceAdjusted, vec![recipient()], TemplateFields::new());
        assert!(notifier.clone().drain(Duration::from_secs(5)));
        assert_eq!(*sender.kinds.lock().unwrap(), vec![NotificationKind::BalanceAdjusted]);
    }

    #[test]
    fn drain_gives_up_after_timeout() {
        let sender = Arc::new(SlowSender { calls: Mutex::new(0) });
        let notifier = Notifier::new(sender.clone()).with_timeout(Duration::from_secs(5));

        notifier.notify(NotificationKind::LeaveApproved, vec![recipient()], TemplateFields::new());
        assert!(!notifier.drain(Duration::from_millis(20)));
        assert!(notifier.drain(Duration::from_secs(5)));
    }

    #[test]
    fn drain_with_nothing_sent_returns_at_once() {
        assert!(Notifier::disabled().drain(Duration::from_secs(5)));
    }

    #[test]
    fn disabled_notifier_does_nothing() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.notify(NotificationKind::LeaveApproved, vec![recipient()], TemplateFields::new());
    }

    #[test]
    fn rejection_template_includes_escaped_reason() {
        let mut fields = TemplateFields::new();
        fields.insert("actor_name".into(), "Lead".into());
        fields.insert("reason".into(), "<busy>".into());

        let (subject, html) = render(NotificationKind::LeaveRejected, &fields);
        assert_eq!(subject, "Your leave request was rejected");
        assert!(html.contains("Reason: &lt;busy&gt;"));
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let payload = EmailPayload {
            api_key: "k",
            from: Contact { email: "a@b.c", name: "A" },
            to: vec![Contact { email: "d@e.f", name: "D" }],
            subject: "s".into(),
            html: "h".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["apiKey"], "k");
        assert_eq!(json["to"][0]["email"], "d@e.f");
    }

    #[test]
    fn email_sender_without_url_is_disabled() {
        let sender = EmailApiSender::new(EmailSettings {
            api_url: String::new(),
            api_key: "k".into(),
            from_email: "noreply@example.com".into(),
            from_name: "Leave".into(),
            enabled: true,
        })
        .unwrap();
        assert!(!sender.is_enabled());
        assert!(matches!(
            sender.send(NotificationKind::LeaveApproved, &[recipient()], &TemplateFields::new()),
            Err(NotificationError::Disabled)
        ));
    }
}
