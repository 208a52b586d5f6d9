use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Attachment as LettreAttachment;
use lettre::message::Message;
use lettre::message::MultiPart;
use lettre::message::SinglePart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Tokio1Executor;
use secrecy::ExposeSecret;

use crate::configuration::Settings;
use crate::domain::BodyType;

/// Seam between the delivery engine and the actual wire transport (spec
/// §4.5's "SMTP send"). A `lettre`-backed implementor talks to a real relay;
/// `StubTransport` replaces it in tests, the way the teacher's `wiremock`
/// stub replaces the Postmark HTTP client.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), anyhow::Error>;
}

/// Real SMTP relay via `lettre`. AUTH is only attempted when credentials are
/// configured; STARTTLS is opportunistic per `Settings::smtp_use_tls`.
pub struct LettreTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreTransport {
    pub fn from_settings(settings: &Settings) -> Result<Self, anyhow::Error> {
        let mut builder = if settings.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_server)
        }
        .port(settings.smtp_port);

        if let (Some(username), Some(password)) = (&settings.smtp_username, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.expose_secret().clone()));
        }

        Ok(Self { inner: builder.build() })
    }
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn send(&self, message: Message) -> Result<(), anyhow::Error> {
        self.inner.send(message).await?;
        Ok(())
    }
}

/// In-memory transport for tests: records every message it would have sent,
/// and can be primed to fail the next N sends (e.g. to exercise retry and
/// dead-letter paths).
#[derive(Clone, Default)]
pub struct StubTransport {
    state: Arc<Mutex<StubState>>,
}

#[derive(Default)]
struct StubState {
    sent: Vec<Message>,
    fail_next: usize,
}

impl StubTransport {
    pub fn new() -> Self { Self::default() }

    /// Build a transport that fails the next `n` sends, then succeeds.
    pub fn failing_next(n: usize) -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().fail_next = n;
        transport
    }

    /// Build a transport that never succeeds.
    pub fn always_failing() -> Self { Self::failing_next(usize::MAX) }

    pub fn sent_count(&self) -> usize { self.state.lock().unwrap().sent.len() }
}

#[async_trait]
impl MailTransport for StubTransport {
    async fn send(&self, message: Message) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(anyhow::anyhow!("stub transport: simulated send failure"));
        }
        state.sent.push(message);
        Ok(())
    }
}

/// A single decoded attachment ready to be embedded in a MIME message.
pub struct AttachmentPart {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

/// Build the outgoing MIME message for one delivery attempt (spec §4.5).
/// BCC addresses are added to the envelope (so they reach the relay's
/// RCPT-TO) but never appear in a header, which `lettre`'s `bcc()` already
/// guarantees.
pub fn build_message(
    from_address: &str,
    to: &[String],
    cc: &[String],
    bcc: &[String],
    subject: &str,
    body: &str,
    body_type: BodyType,
    attachments: &[AttachmentPart],
) -> Result<Message, anyhow::Error> {
    let mut builder = Message::builder().from(from_address.parse()?).subject(subject);
    for addr in to {
        builder = builder.to(addr.parse()?);
    }
    for addr in cc {
        builder = builder.cc(addr.parse()?);
    }
    for addr in bcc {
        builder = builder.bcc(addr.parse()?);
    }

    let body_part = match body_type {
        BodyType::Plain => Body::Single(SinglePart::plain(body.to_string())),
        BodyType::Html => Body::Single(SinglePart::html(body.to_string())),
        BodyType::Markdown => {
            let rendered = render_markdown(body);
            Body::Multi(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(body.to_string()))
                    .singlepart(SinglePart::html(rendered)),
            )
        }
    };

    let message = if attachments.is_empty() {
        match body_part {
            Body::Single(part) => builder.singlepart(part)?,
            Body::Multi(multi) => builder.multipart(multi)?,
        }
    } else {
        let mut mixed = MultiPart::mixed();
        mixed = match body_part {
            Body::Single(part) => mixed.singlepart(part),
            Body::Multi(multi) => mixed.multipart(multi),
        };
        for part in attachments {
            mixed = mixed.singlepart(attachment_part(part)?);
        }
        builder.multipart(mixed)?
    };

    Ok(message)
}

fn attachment_part(part: &AttachmentPart) -> Result<SinglePart, anyhow::Error> {
    let content_type = ContentType::parse(&part.content_type)
        .unwrap_or_else(|_| ContentType::parse("application/octet-stream").expect("static mime parses"));
    Ok(LettreAttachment::new(part.filename.clone()).body(part.bytes.clone(), content_type))
}

fn render_markdown(source: &str) -> String {
    let mut rendered = String::new();
    pulldown_cmark::html::push_html(&mut rendered, pulldown_cmark::Parser::new(source));
    rendered
}
