//! Rendering of lifecycle e-mails.
//!
//! Rendering happens once, at enqueue time; the dispatch engine only ever
//! resends the stored subject and bodies.

use crate::entities::{
    notification_task::NotificationKind, order::Model as Order, order_item::Model as OrderItem,
};
use rust_decimal::Decimal;
use std::fmt::Write;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub template_key: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

fn subject_for(kind: NotificationKind, order: &Order) -> String {
    let number = &order.order_number;
    match kind {
        NotificationKind::OrderConfirmation => format!("Order Confirmation - {}", number),
        NotificationKind::OrderAdminAlert => {
            format!("New Order Received - {} ({})", number, money(order.final_amount))
        }
        NotificationKind::OrderShipped => format!("Your order {} has shipped", number),
        NotificationKind::OrderDelivered => format!("Your order {} has been delivered", number),
        NotificationKind::OrderCancelled => format!("Your order {} has been cancelled", number),
        NotificationKind::PaymentSuccess => format!("Payment received for order {}", number),
        NotificationKind::PaymentFailed => format!("Payment failed for order {}", number),
        NotificationKind::PaymentFailedAdminAlert => {
            format!("Payment failure on order {}", number)
        }
        NotificationKind::PaymentRefunded => format!("Refund issued for order {}", number),
    }
}

fn headline_for(kind: NotificationKind, order: &Order) -> String {
    match kind {
        NotificationKind::OrderConfirmation => {
            format!("Thank you for your order, {}!", order.customer_name)
        }
        NotificationKind::OrderAdminAlert => format!(
            "{} <{}> placed a new order.",
            order.customer_name, order.customer_email
        ),
        NotificationKind::OrderShipped => match &order.tracking_number {
            Some(tracking) => format!("Your order is on its way. Tracking number: {}", tracking),
            None => "Your order is on its way.".to_string(),
        },
        NotificationKind::OrderDelivered => "Your order has been delivered.".to_string(),
        NotificationKind::OrderCancelled => "Your order has been cancelled.".to_string(),
        NotificationKind::PaymentSuccess => {
            format!("We received your payment of {}.", money(order.final_amount))
        }
        NotificationKind::PaymentFailed => {
            "We could not process your payment. Please update your payment method.".to_string()
        }
        NotificationKind::PaymentFailedAdminAlert => format!(
            "Payment via {} failed for {} <{}>.",
            order.payment_method, order.customer_name, order.customer_email
        ),
        NotificationKind::PaymentRefunded => {
            format!("A refund of {} has been issued.", money(order.final_amount))
        }
    }
}

/// Renders the e-mail for `kind` about `order`.
pub fn render(kind: NotificationKind, order: &Order, items: &[OrderItem]) -> RenderedEmail {
    let subject = subject_for(kind, order);
    let headline = headline_for(kind, order);

    let mut html = String::new();
    let mut text = String::new();

    let _ = write!(
        html,
        "<html><body><h1>{}</h1><p>{}</p><p>Order number: <strong>{}</strong><br>Status: {}<br>Payment: {}</p>",
        escape_html(&subject),
        escape_html(&headline),
        escape_html(&order.order_number),
        order.status,
        order.payment_status,
    );
    let _ = writeln!(text, "{}\n\n{}\n", subject, headline);
    let _ = writeln!(text, "Order number: {}", order.order_number);
    let _ = writeln!(text, "Status: {}", order.status);
    let _ = writeln!(text, "Payment: {}", order.payment_status);

    if !items.is_empty() {
        html.push_str(
            "<table><thead><tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Total</th></tr></thead><tbody>",
        );
        let _ = writeln!(text, "\nItems:");
        for item in items {
            let _ = write!(
                html,
                "<tr><td>{} ({})</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&item.name),
                escape_html(&item.sku),
                item.quantity,
                money(item.unit_price),
                money(item.total_amount),
            );
            let _ = writeln!(
                text,
                "  {} x {} @ {} = {}",
                item.quantity,
                item.name,
                money(item.unit_price),
                money(item.total_amount)
            );
        }
        html.push_str("</tbody></table>");
    }

    let _ = write!(
        html,
        "<p>Subtotal: {}<br>Tax: {}<br>Shipping: {}<br>Discount: {}<br><strong>Total: {}</strong></p></body></html>",
        money(order.subtotal),
        money(order.tax_amount),
        money(order.shipping_amount),
        money(order.discount_amount),
        money(order.final_amount),
    );
    let _ = writeln!(text, "\nTotal: {}", money(order.final_amount));

    RenderedEmail {
        template_key: kind.to_string(),
        subject,
        html,
        text,
    }
}
