//! SMTP email delivery
//!
//! Sends a plain-text body together with a branded HTML alternative.

use async_trait::async_trait;
use cares_core::prelude::*;
use cares_core::{unique_id, SmtpConfig};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

/// Implicit TLS submission port; every other port is upgraded with STARTTLS
const SMTPS_PORT: u16 = 465;

/// Mailer backed by an authenticated SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpMailer {
    /// Build a mailer from configuration
    ///
    /// Fails when no credentials are configured.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let (user, pass) = config
            .credentials()
            .ok_or_else(|| CaresError::config("SMTP_USER and SMTP_PASS are not set"))?;

        let builder = if config.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| CaresError::email_with_source(format!("invalid SMTP host {}", config.host), e))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();

        Ok(Self {
            transport,
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let (message, message_id) = compose(email)?;
        debug!(host = %self.host, to = %email.to, "Sending email");

        self.transport
            .send(message)
            .await
            .map_err(|e| CaresError::email_with_source(format!("SMTP delivery failed: {e}"), e))?;
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| CaresError::email_with_source(format!("invalid address '{address}'"), e))
}

/// Build the MIME message and its `Message-ID`
pub fn compose(email: &OutgoingEmail) -> Result<(Message, String)> {
    let message_id = format!("<{}@christy-cares.com>", unique_id());

    let message = Message::builder()
        .from(mailbox(&email.from)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject.clone())
        .message_id(Some(message_id.clone()))
        .multipart(MultiPart::alternative_plain_html(
            email.content.clone(),
            render_html(&email.content),
        ))
        .map_err(|e| CaresError::email_with_source("failed to build email", e))?;

    Ok((message, message_id))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Branded HTML body, one paragraph per content line
pub fn render_html(content: &str) -> String {
    let paragraphs: String = content
        .split('\n')
        .map(|line| format!(r#"<p style="margin: 10px 0;">{}</p>"#, escape_html(line)))
        .collect();

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: linear-gradient(135deg, #2E7D8A, #8B5A96); padding: 20px; text-align: center;">
    <h1 style="color: white; margin: 0;">Christy Cares</h1>
    <p style="color: white; margin: 5px 0;">Personalized Assisted Living Services</p>
  </div>
  <div style="padding: 30px; background: #f9f9f9;">
    <div style="background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
      {paragraphs}
    </div>
    <div style="text-align: center; margin-top: 30px; padding-top: 20px; border-top: 1px solid #ddd;">
      <p style="color: #666; font-size: 12px;">
        This email was sent by Christy Cares<br>
        If you have questions, please contact your caregiver directly.
      </p>
    </div>
  </div>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "family@example.com".into(),
            from: "\"Christy Cares\" <noreply@christy-cares.com>".into(),
            subject: "Visit update".into(),
            content: "Lunch went well.\nMeds taken at 2pm.".into(),
        }
    }

    #[test]
    fn test_render_html_one_paragraph_per_line() {
        let html = render_html("first\nsecond\n");
        assert_eq!(html.matches(r#"<p style="margin: 10px 0;">"#).count(), 3);
        assert!(html.contains(">first</p>"));
        assert!(html.contains(">second</p>"));
    }

    #[test]
    fn test_render_html_escapes_content() {
        let html = render_html("<script>alert('x')</script> & more");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
    }

    #[test]
    fn test_compose_sets_headers() {
        let (message, message_id) = compose(&email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(message_id.starts_with('<') && message_id.ends_with("@christy-cares.com>"));
        assert!(raw.contains("Subject: Visit update"));
        assert!(raw.contains("To: family@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn test_compose_rejects_bad_address() {
        let mut bad = email();
        bad.to = "not an address".into();
        assert!(matches!(compose(&bad), Err(CaresError::Email { .. })));
    }

    #[test]
    fn test_mailer_requires_credentials() {
        let err = SmtpMailer::new(&SmtpConfig::default()).err().unwrap();
        assert!(matches!(err, CaresError::Configuration { .. }));
    }
}
