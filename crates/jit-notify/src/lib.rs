//! # jit-notify — Notification Engine (C5, §4.5)
//!
//! Renders `{{KEY}}` placeholders in a configured HTML template with
//! HTML-escaped property values, then dispatches through every
//! registered, functional `MailTransport`. A transport's failure is
//! isolated — it is logged and the remaining transports still run (§7).

use tracing::{info, warn};

use jit_contracts::config::EngineConfig;
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::notification::Notification;
use jit_core::traits::{MailTransport, Notifier};

/// A minimal default template used when the deployment does not configure
/// `emailTemplatePath` (§6). Every `{{KEY}}` the activator populates in a
/// notification's `properties` map is substituted in.
pub const DEFAULT_TEMPLATE: &str = concat!(
    "<html><body>",
    "<p>Beneficiary: {{BENEFICIARY}}</p>",
    "<p>Justification: {{JUSTIFICATION}}</p>",
    "<p>Start: {{START}}</p>",
    "</body></html>",
);

/// The production `Notifier` (C5).
pub struct TemplateNotifier {
    template: String,
    transports: Vec<Box<dyn MailTransport>>,
    enable_email: bool,
}

impl std::fmt::Debug for TemplateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateNotifier")
            .field("template", &self.template)
            .field("transports_len", &self.transports.len())
            .field("enable_email", &self.enable_email)
            .finish()
    }
}

impl TemplateNotifier {
    pub fn new(template: String, transports: Vec<Box<dyn MailTransport>>, enable_email: bool) -> Self {
        Self { template, transports, enable_email }
    }

    /// Loads the template from `config.email_template_path` when set, falling
    /// back to [`DEFAULT_TEMPLATE`] otherwise (§4.5).
    pub fn from_config(config: &EngineConfig, transports: Vec<Box<dyn MailTransport>>) -> JitResult<Self> {
        let template = match &config.email_template_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| JitError::ConfigError {
                reason: format!("failed to read email template at '{path}': {e}"),
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        Ok(Self::new(template, transports, config.enable_email))
    }

    fn render(&self, notification: &Notification) -> String {
        render_template(&self.template, &notification.properties)
    }
}

/// Substitute every `{{KEY}}` in `template` with the HTML-escaped value of
/// `properties[KEY]`. Keys with no entry in `properties` are left
/// unsubstituted.
pub fn render_template(template: &str, properties: &std::collections::BTreeMap<String, String>) -> String {
    let mut body = template.to_string();
    for (key, value) in properties {
        let placeholder = format!("{{{{{key}}}}}");
        body = body.replace(&placeholder, &html_escape::encode_text(value));
    }
    body
}

impl Notifier for TemplateNotifier {
    fn dispatch(&self, notification: &Notification) {
        if !self.enable_email {
            info!(
                recipients = ?notification.recipients,
                cc = ?notification.cc_recipients,
                subject = %notification.subject,
                notification_type = ?notification.notification_type,
                "email disabled; logging notification instead of sending"
            );
            return;
        }

        let body = self.render(notification);
        let mut dispatched = 0;
        for transport in &self.transports {
            if !transport.is_functional() {
                continue;
            }
            match transport.send_mail(&notification.recipients, &notification.cc_recipients, &notification.subject, &body) {
                Ok(()) => dispatched += 1,
                Err(e) => warn!(transport = transport.name(), error = %e, "notification transport failed"),
            }
        }
        if dispatched == 0 {
            warn!(subject = %notification.subject, "no functional mail transport delivered this notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_contracts::notification::NotificationType;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[test]
    fn render_template_escapes_html_in_property_values() {
        let mut properties = BTreeMap::new();
        properties.insert("JUSTIFICATION".to_string(), "<script>alert(1)</script>".to_string());
        let body = render_template("justification: {{JUSTIFICATION}}", &properties);
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    struct RecordingTransport {
        name: String,
        functional: bool,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MailTransport for RecordingTransport {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_functional(&self) -> bool {
            self.functional
        }
        fn send_mail(&self, _to: &[String], _cc: &[String], subject: &str, _html_body: &str) -> JitResult<()> {
            self.calls.lock().unwrap().push(subject.to_string());
            if self.fail {
                return Err(JitError::Transient { reason: "smtp down".into() });
            }
            Ok(())
        }
    }

    fn notification() -> Notification {
        let mut properties = BTreeMap::new();
        properties.insert("BENEFICIARY".to_string(), "alice@example.com".to_string());
        Notification {
            recipients: vec!["alice@example.com".to_string()],
            cc_recipients: vec![],
            subject: "subject".to_string(),
            notification_type: NotificationType::ActivationSelfApproved,
            properties,
        }
    }

    #[test]
    fn dispatch_skips_non_functional_transports() {
        let functional = RecordingTransport { name: "a".into(), functional: true, fail: false, calls: Mutex::new(vec![]) };
        let broken = RecordingTransport { name: "b".into(), functional: false, fail: false, calls: Mutex::new(vec![]) };

        let notifier = TemplateNotifier::new(DEFAULT_TEMPLATE.to_string(), vec![Box::new(functional), Box::new(broken)], true);
        notifier.dispatch(&notification());
    }

    #[test]
    fn dispatch_isolates_one_transport_failure_from_the_rest() {
        let failing = RecordingTransport { name: "a".into(), functional: true, fail: true, calls: Mutex::new(vec![]) };
        let working = RecordingTransport { name: "b".into(), functional: true, fail: false, calls: Mutex::new(vec![]) };

        let notifier = TemplateNotifier::new(DEFAULT_TEMPLATE.to_string(), vec![Box::new(failing), Box::new(working)], true);
        // Must not panic even though the first transport fails.
        notifier.dispatch(&notification());
    }

    #[test]
    fn dispatch_logs_instead_of_sending_when_email_disabled() {
        let notifier = TemplateNotifier::new(DEFAULT_TEMPLATE.to_string(), vec![], false);
        notifier.dispatch(&notification());
    }

    fn base_toml() -> &'static str {
        r#"
            scope = "projects/demo"
            justification-pattern = "^.+$"
            justification-hint = "provide a ticket reference"
            service-account = "jit-signer@demo.iam.gserviceaccount.com"
        "#
    }

    #[test]
    fn from_config_falls_back_to_default_template_when_path_unset() {
        let config = EngineConfig::from_toml_str(base_toml()).unwrap();
        let notifier = TemplateNotifier::from_config(&config, vec![]).unwrap();
        assert_eq!(notifier.template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn from_config_reads_template_from_configured_path() {
        let path = std::env::temp_dir().join("jit-notify-test-template.html");
        std::fs::write(&path, "<p>{{BENEFICIARY}}</p>").unwrap();
        let toml = format!("{}\nemail-template-path = \"{}\"\n", base_toml(), path.display());

        let config = EngineConfig::from_toml_str(&toml).unwrap();
        let notifier = TemplateNotifier::from_config(&config, vec![]).unwrap();
        assert_eq!(notifier.template, "<p>{{BENEFICIARY}}</p>");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn from_config_surfaces_missing_template_file_as_config_error() {
        let toml = format!("{}\nemail-template-path = \"/nonexistent/path/template.html\"\n", base_toml());
        let config = EngineConfig::from_toml_str(&toml).unwrap();
        let err = TemplateNotifier::from_config(&config, vec![]).unwrap_err();
        assert!(matches!(err, JitError::ConfigError { .. }));
    }
}
