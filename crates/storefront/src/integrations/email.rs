//! Transactional email.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain-text
//! templates. Every message is sent as `multipart/alternative`.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use nestling_core::{CurrencyCode, Money};

use crate::config::EmailConfig;
use crate::models::{DropshipOrderDetail, OrderDetail, Shipping, ShippingAddress};

/// One line as printed in an email.
#[derive(Debug, Clone)]
pub struct EmailLine {
    pub name: String,
    pub sku: String,
    pub quantity: i32,
    pub line_total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_number: &'a str,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    shipping: &'a str,
    tax: &'a str,
    total: &'a str,
    address: &'a ShippingAddress,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_number: &'a str,
    lines: &'a [EmailLine],
    subtotal: &'a str,
    shipping: &'a str,
    tax: &'a str,
    total: &'a str,
    address: &'a ShippingAddress,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/shipping_notification.html")]
struct ShippingNotificationHtml<'a> {
    order_number: &'a str,
    carrier: &'a str,
    tracking_number: &'a str,
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/shipping_notification.txt")]
struct ShippingNotificationText<'a> {
    order_number: &'a str,
    carrier: &'a str,
    tracking_number: &'a str,
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/supplier_purchase_order.html")]
struct SupplierPurchaseOrderHtml<'a> {
    supplier_name: &'a str,
    purchase_order: &'a str,
    order_number: &'a str,
    lines: &'a [EmailLine],
    address: &'a ShippingAddress,
}

#[derive(Template)]
#[template(path = "email/supplier_purchase_order.txt")]
struct SupplierPurchaseOrderText<'a> {
    supplier_name: &'a str,
    purchase_order: &'a str,
    order_number: &'a str,
    lines: &'a [EmailLine],
    address: &'a ShippingAddress,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    supplier_orders_bcc: Option<String>,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            supplier_orders_bcc: config.supplier_orders_bcc.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send the order confirmation to the customer.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, detail), fields(order_id = %detail.order.id))]
    pub async fn send_order_confirmation(&self, detail: &OrderDetail) -> Result<(), EmailError> {
        let order = &detail.order;
        let currency = order.currency;
        let lines = order_lines(detail);
        let Some(shipping) = &detail.shipping else {
            return Err(EmailError::InvalidAddress(format!(
                "order {} has no shipping address",
                order.id
            )));
        };
        let subtotal = price(order.subtotal, currency);
        let shipping_fee = price(order.shipping, currency);
        let tax = price(order.tax, currency);
        let total = price(order.total, currency);
        let order_url = format!("{}/account/orders/{}", self.base_url, order.id);

        let html = OrderConfirmationHtml {
            order_number: &detail.number,
            lines: &lines,
            subtotal: &subtotal,
            shipping: &shipping_fee,
            tax: &tax,
            total: &total,
            address: &shipping.address,
            order_url: &order_url,
        }
        .render()?;
        let text = OrderConfirmationText {
            order_number: &detail.number,
            lines: &lines,
            subtotal: &subtotal,
            shipping: &shipping_fee,
            tax: &tax,
            total: &total,
            address: &shipping.address,
            order_url: &order_url,
        }
        .render()?;

        let subject = format!("Your Nestling order {}", detail.number);
        self.send_multipart_email(order.email.as_str(), None, &subject, &text, &html)
            .await
    }

    /// Tell the customer their order is on its way.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, shipping), fields(order_id = %shipping.order_id))]
    pub async fn send_shipping_notification(
        &self,
        to: &str,
        order_number: &str,
        shipping: &Shipping,
    ) -> Result<(), EmailError> {
        let carrier = shipping.carrier.as_deref().unwrap_or("our carrier");
        let tracking_number = shipping.tracking_number.as_deref().unwrap_or("");

        let html = ShippingNotificationHtml {
            order_number,
            carrier,
            tracking_number,
            address: &shipping.address,
        }
        .render()?;
        let text = ShippingNotificationText {
            order_number,
            carrier,
            tracking_number,
            address: &shipping.address,
        }
        .render()?;

        let subject = format!("Your Nestling order {order_number} has shipped");
        self.send_multipart_email(to, None, &subject, &text, &html)
            .await
    }

    /// Send a purchase order for a dropship order to its supplier.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, detail, address), fields(dropship_order_id = %detail.dropship_order.id))]
    pub async fn send_supplier_purchase_order(
        &self,
        detail: &DropshipOrderDetail,
        order_number: &str,
        address: &ShippingAddress,
    ) -> Result<(), EmailError> {
        let purchase_order = purchase_order_number(detail);
        let lines: Vec<EmailLine> = detail
            .lines
            .iter()
            .map(|line| EmailLine {
                name: line_name(&line.product_name, &line.variant_name),
                sku: line.sku.clone(),
                quantity: line.quantity,
                line_total: String::new(),
            })
            .collect();

        let html = SupplierPurchaseOrderHtml {
            supplier_name: &detail.supplier.name,
            purchase_order: &purchase_order,
            order_number,
            lines: &lines,
            address,
        }
        .render()?;
        let text = SupplierPurchaseOrderText {
            supplier_name: &detail.supplier.name,
            purchase_order: &purchase_order,
            order_number,
            lines: &lines,
            address,
        }
        .render()?;

        let subject = format!("Purchase order {purchase_order} from Nestling");
        self.send_multipart_email(
            detail.supplier.email.as_str(),
            self.supplier_orders_bcc.as_deref(),
            &subject,
            &text,
            &html,
        )
        .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        bcc: Option<&str>,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from_address)?)
            .to(parse_mailbox(to)?)
            .subject(subject);
        if let Some(bcc) = bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }

        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body.to_string()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body.to_string()),
                ),
        )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

fn price(amount: rust_decimal::Decimal, currency: CurrencyCode) -> String {
    Money::new(amount, currency).display()
}

fn line_name(product: &str, variant: &str) -> String {
    if variant.is_empty() {
        product.to_string()
    } else {
        format!("{product} ({variant})")
    }
}

/// Lines of an order formatted for email.
#[must_use]
pub fn order_lines(detail: &OrderDetail) -> Vec<EmailLine> {
    detail
        .items
        .iter()
        .map(|item| EmailLine {
            name: line_name(&item.product_name, &item.variant_name),
            sku: item.sku.clone(),
            quantity: item.quantity,
            line_total: price(item.line_total, detail.order.currency),
        })
        .collect()
}

/// Purchase order number printed for the supplier, e.g. `PO-000042`.
#[must_use]
pub fn purchase_order_number(detail: &DropshipOrderDetail) -> String {
    format!("PO-{:06}", detail.dropship_order.id.as_i32())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Robin Park".to_string(),
            line1: "12 Elm St".to_string(),
            line2: None,
            city: "Portland".to_string(),
            region: "OR".to_string(),
            postal_code: "97201".to_string(),
            country: "US".to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_line_name() {
        assert_eq!(line_name("Swaddle", "Sage"), "Swaddle (Sage)");
        assert_eq!(line_name("Rattle", ""), "Rattle");
    }

    #[test]
    fn test_order_confirmation_renders() {
        let lines = vec![EmailLine {
            name: "Swaddle (Sage)".to_string(),
            sku: "SW-SAGE".to_string(),
            quantity: 2,
            line_total: "$49.98".to_string(),
        }];
        let address = address();
        let text = OrderConfirmationText {
            order_number: "NS-20260105-000042",
            lines: &lines,
            subtotal: "$49.98",
            shipping: "$7.95",
            tax: "$0.00",
            total: "$57.93",
            address: &address,
            order_url: "https://shop.test/account/orders/42",
        }
        .render()
        .unwrap();

        assert!(text.contains("NS-20260105-000042"));
        assert!(text.contains("2 x Swaddle (Sage)"));
        assert!(text.contains("$57.93"));
        assert!(text.contains("Portland"));
    }

    #[test]
    fn test_supplier_purchase_order_renders() {
        let lines = vec![EmailLine {
            name: "Crib Sheet".to_string(),
            sku: "CS-1".to_string(),
            quantity: 3,
            line_total: String::new(),
        }];
        let address = address();
        let html = SupplierPurchaseOrderHtml {
            supplier_name: "Loom Co",
            purchase_order: "PO-000007",
            order_number: "NS-20260105-000042",
            lines: &lines,
            address: &address,
        }
        .render()
        .unwrap();

        assert!(html.contains("PO-000007"));
        assert!(html.contains("CS-1"));
        assert!(html.contains("Robin Park"));
    }
}
