//! HTML bodies and subject lines for event emails.

use crate::config::BrandingConfig;
use crate::db::Event;

/// A rendered email, ready to hand to the gateway.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Escape text for safe interpolation into HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn reminder_subject(event: &Event, days_before: i64) -> String {
    match days_before {
        1 => format!("Reminder: {} is tomorrow", event.title),
        n => format!("Reminder: {} is in {} days", event.title, n),
    }
}

pub fn thank_you_subject(event: &Event) -> String {
    format!("Thank you for attending {}", event.title)
}

fn format_event_date(event: &Event) -> String {
    event.date.format("%A, %B %-d, %Y at %H:%M UTC").to_string()
}

fn greeting(first_name: Option<&str>) -> String {
    match first_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hi {},", escape_html(name)),
        None => "Hi there,".to_string(),
    }
}

fn layout(branding: &BrandingConfig, heading: &str, body: &str) -> String {
    let community = escape_html(&branding.community_name);
    let footer_link = branding
        .site_url
        .as_deref()
        .map(|url| {
            format!(
                r#"<p style="margin:0"><a href="{}" style="color:#6b7280">{}</a></p>"#,
                escape_html(url),
                escape_html(url)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="margin:0;padding:24px;background:#f4f4f5;font-family:Arial,Helvetica,sans-serif;color:#111827">
<div style="max-width:560px;margin:0 auto;background:#ffffff;border-radius:8px;padding:32px">
<h1 style="font-size:22px;margin:0 0 16px">{heading}</h1>
{body}
<hr style="border:none;border-top:1px solid #e5e7eb;margin:24px 0">
<div style="font-size:12px;color:#6b7280">
<p style="margin:0 0 4px">{community}</p>
{footer_link}
</div>
</div>
</body>
</html>"#,
        heading = heading,
        body = body,
        community = community,
        footer_link = footer_link,
    )
}

/// Reminder email for an upcoming event.
pub fn render_reminder(
    branding: &BrandingConfig,
    event: &Event,
    days_before: i64,
    first_name: Option<&str>,
) -> RenderedEmail {
    let when = match days_before {
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    };

    let body = format!(
        r#"<p>{greeting}</p>
<p>This is a friendly reminder that <strong>{title}</strong> is happening {when}.</p>
<table style="border-collapse:collapse;margin:16px 0">
<tr><td style="padding:4px 12px 4px 0;color:#6b7280">When</td><td style="padding:4px 0">{date}</td></tr>
<tr><td style="padding:4px 12px 4px 0;color:#6b7280">Where</td><td style="padding:4px 0">{location}</td></tr>
</table>
<p>We look forward to seeing you there!</p>"#,
        greeting = greeting(first_name),
        title = escape_html(&event.title),
        when = when,
        date = escape_html(&format_event_date(event)),
        location = escape_html(&event.location),
    );

    RenderedEmail {
        subject: reminder_subject(event, days_before),
        html: layout(branding, &escape_html(&event.title), &body),
    }
}

/// Thank-you email sent after an event.
pub fn render_thank_you(
    branding: &BrandingConfig,
    event: &Event,
    first_name: Option<&str>,
) -> RenderedEmail {
    let body = format!(
        r#"<p>{greeting}</p>
<p>Thank you for joining us at <strong>{title}</strong> on {date}.</p>
<p>We hope you enjoyed it and we would love to see you at our next event.</p>"#,
        greeting = greeting(first_name),
        title = escape_html(&event.title),
        date = escape_html(&format_event_date(event)),
    );

    RenderedEmail {
        subject: thank_you_subject(event),
        html: layout(branding, "Thank you for coming!", &body),
    }
}
