//! Delivery over SMTP.
//!
//! Messages go out through the configured relay over implicit TLS, authenticated with the mail credentials, which
//! double as the sender address. The message differs per product kind: a download link for e-books, or the serial
//! key plus the installer link for licensed products.
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address,
    AsyncSmtpTransport,
    AsyncTransport,
    Message,
    Tokio1Executor,
};
use log::*;
use rread_engine::{DeliveryContent, DeliveryError, DeliveryMessage, DeliveryNotifier};

use crate::config::SmtpConfig;

#[derive(Clone)]
pub struct SmtpNotifier {
    sender: String,
    transport: Result<AsyncSmtpTransport<Tokio1Executor>, String>,
}

impl SmtpNotifier {
    /// Never fails. A notifier without credentials, or with an unusable relay, fails every delivery instead, so the
    /// jobs stay on the queue until the configuration is fixed.
    pub fn new(config: &SmtpConfig) -> Self {
        let transport = build_transport(config);
        if let Err(e) = &transport {
            error!("📧️ Email delivery is not available. {e}");
        }
        Self { sender: config.user.trim().to_string(), transport }
    }
}

fn build_transport(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    if !config.has_credentials() {
        return Err("RR_EMAIL_USER and RR_EMAIL_PASSWORD are not set".to_string());
    }
    let credentials = Credentials::new(config.user.trim().to_string(), config.password.reveal().clone());
    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
        .map_err(|e| format!("Invalid SMTP relay {}: {e}", config.server))?
        .port(config.port)
        .credentials(credentials)
        .build();
    info!("📧️ Sending email through {}:{} as {}", config.server, config.port, config.user);
    Ok(transport)
}

impl DeliveryNotifier for SmtpNotifier {
    async fn deliver(&self, message: &DeliveryMessage) -> Result<(), DeliveryError> {
        let transport = self.transport.as_ref().map_err(|e| DeliveryError::NotConfigured(e.clone()))?;
        let email = compose(&self.sender, message)?;
        transport.send(email).await.map_err(|e| DeliveryError::Transport(e.to_string()))?;
        info!("📧️ Delivery email for order #{} sent to {}", message.order_id, message.recipient);
        Ok(())
    }
}

fn compose(sender: &str, message: &DeliveryMessage) -> Result<Message, DeliveryError> {
    let from = sender
        .parse::<Address>()
        .map_err(|e| DeliveryError::NotConfigured(format!("{sender} is not a valid sender address. {e}")))?;
    let to = message
        .recipient
        .trim()
        .parse::<Address>()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {e}", message.recipient)))?;
    let customer = message.customer_name.trim();
    let to = Mailbox::new((!customer.is_empty()).then(|| customer.to_string()), to);
    Message::builder()
        .from(Mailbox::new(Some("R·READ".to_string()), from.clone()))
        .reply_to(Mailbox::new(None, from))
        .to(to)
        .subject(subject(message))
        .header(ContentType::TEXT_HTML)
        .body(html_body(message))
        .map_err(|e| DeliveryError::Compose(e.to_string()))
}

pub fn subject(message: &DeliveryMessage) -> String {
    match &message.content {
        DeliveryContent::LicenseKey { .. } => {
            format!("R·READ: Sua chave de acesso para \"{}\" chegou! 🚀", message.product_name)
        },
        DeliveryContent::Download { .. } => {
            format!("R·READ: Seu e-book \"{}\" está pronto para devorar! 🎉", message.product_name)
        },
    }
}

pub fn html_body(message: &DeliveryMessage) -> String {
    let name = escape_html(&message.customer_name);
    let product = escape_html(&message.product_name);
    let amount = message.amount;
    let (instructions, link) = match &message.content {
        DeliveryContent::LicenseKey { serial, installer_url } => {
            let serial = escape_html(serial);
            let link = escape_html(installer_url);
            let block = format!(
                r#"<p>Seu pagamento de <strong>{amount}</strong> referente ao produto "<strong>{product}</strong>" foi confirmado.</p>
      <h2>Sua chave de acesso está aqui! 🔑</h2>
      <p>Sua chave de acesso (Serial Key) é:</p>
      <div class="key"><code>{serial}</code></div>
      <p>Copie a chave acima e use-a no instalador. Se precisar baixar o instalador, clique abaixo:</p>
      <p class="button-container"><a href="{link}" class="button">[·] Baixar o Instalador</a></p>"#
            );
            (block, link)
        },
        DeliveryContent::Download { url } => {
            let link = escape_html(url);
            let block = format!(
                r#"<p>Seu pagamento de <strong>{amount}</strong> referente ao e-book "<strong>{product}</strong>" foi confirmado.</p>
      <h2>Agora é hora de devorar o conteúdo!</h2>
      <p class="button-container"><a href="{link}" class="button">[·] Baixar Meu E-book Agora</a></p>"#
            );
            (block, link)
        },
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="UTF-8"></head>
<body>
  <div class="container">
    <h1>✅ Parabéns pela sua compra!</h1>
    <div class="content">
      <p>Olá, {name},</p>
      {instructions}
      <p>Se o link do botão não funcionar, copie e cole este link no seu navegador:</p>
      <code class="link-copy">{link}</code>
      <div class="footer-text">
        Equipe <strong>R·READ</strong><br>
        Pedido ID: {order_id}<br>
        Em caso de dúvidas, responda a este e-mail.
      </div>
    </div>
  </div>
</body>
</html>
"#,
        order_id = message.order_id
    )
}

fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            c => result.push(c),
        }
    }
    result
}
