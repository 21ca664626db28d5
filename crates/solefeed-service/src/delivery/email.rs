//! Transactional email notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use solefeed_core::outfit::escape_html;
use solefeed_core::PriceNotification;

use super::{DeliveryError, Notifier};
use crate::config::EmailConfig;

/// Timeout for email API requests.
const EMAIL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

/// Sends price-drop emails through an HTTP email API (`POST {api_url}/emails`).
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    client: Client,
    config: EmailConfig,
    site_url: String,
}

impl EmailNotifier {
    /// Create a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: EmailConfig, site_url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(EMAIL_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn render(&self, n: &PriceNotification) -> (String, String) {
        let subject = format!(
            "Price drop: {} is now {}",
            n.product.name,
            format_cents(n.new_price_cents)
        );

        let name = escape_html(&n.product.name);
        let brand = escape_html(&n.product.brand);
        let link = n
            .product
            .purchase_url
            .as_deref()
            .map_or_else(|| format!("{}/alerts", self.site_url), str::to_string);

        let image = n
            .product
            .image_url
            .as_deref()
            .map(|url| format!(r#"<img src="{}" alt="{name}" width="240">"#, escape_html(url)))
            .unwrap_or_default();

        let html = format!(
            r#"<h1>Good news!</h1>
<p><strong>{brand} {name}</strong> dropped from <s>{old}</s> to <strong>{new}</strong>.</p>
<p>You save {saved} ({percent}% off).</p>
{image}
<p><a href="{href}">Shop now</a></p>
<p style="color:#888">You are receiving this because you set a price alert on SoleFeed.</p>"#,
            old = format_cents(n.old_price_cents),
            new = format_cents(n.new_price_cents),
            saved = format_cents(n.saved_amount_cents),
            percent = n.percent_off,
            href = escape_html(&link),
        );

        (subject, html)
    }
}

/// Render cents as dollars, e.g. `8500` as `$85.00`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_price_drop(
        &self,
        recipient: &str,
        notification: &PriceNotification,
    ) -> Result<(), DeliveryError> {
        let (subject, html) = self.render(notification);
        let request = SendEmailRequest {
            from: &self.config.from,
            to: [recipient],
            subject,
            html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(notification_id = %notification.id, "Price alert email accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Api {
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solefeed_core::{NewPriceAlert, PriceAlert, PriceDrop, ProductSnapshot, UserId};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification(name: &str) -> PriceNotification {
        let alert = PriceAlert::create(
            UserId::generate(),
            NewPriceAlert {
                product_id: "B07QXLFLXT".into(),
                product: ProductSnapshot {
                    name: name.into(),
                    brand: "Nike".into(),
                    image_url: Some("https://img.example.com/af1.jpg".into()),
                    purchase_url: Some("https://www.amazon.com/dp/B07QXLFLXT".into()),
                },
                target_price_cents: 10_000,
                current_price_cents: 11_000,
            },
            Utc::now(),
        )
        .unwrap();
        PriceNotification::for_alert(&alert, PriceDrop::between(11_000, 8_500), Utc::now())
    }

    fn notifier(api_url: String) -> EmailNotifier {
        EmailNotifier::new(
            EmailConfig {
                api_url,
                api_key: "re_test".into(),
                from: "SoleFeed <alerts@solefeed.app>".into(),
            },
            "https://solefeed.app/",
        )
        .unwrap()
    }

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(8500), "$85.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(-250), "-$2.50");
    }

    #[test]
    fn html_escapes_product_fields() {
        let (subject, html) = notifier("http://unused".into()).render(&notification("<b>AF1</b>"));
        assert!(subject.contains("$85.00"));
        assert!(html.contains("&lt;b&gt;AF1&lt;&#x2F;b&gt;"));
        assert!(!html.contains("<b>AF1"));
        assert!(html.contains("23% off"));
    }

    #[tokio::test]
    async fn posts_to_email_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({ "to": ["runner@example.com"] })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        notifier(server.uri())
            .send_price_drop("runner@example.com", &notification("Air Force 1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_send_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid recipient"))
            .mount(&server)
            .await;

        let result = notifier(server.uri())
            .send_price_drop("bad", &notification("Air Force 1"))
            .await;
        assert!(matches!(result, Err(DeliveryError::Api { status: 422, .. })));
    }
}
