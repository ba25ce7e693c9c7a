//! Turn a lab report into channel-ready text.

use labpush_common::types::{LabReport, NotificationPayload};

/// SMS bodies longer than this are cut (two concatenated segments).
const SMS_MAX_CHARS: usize = 306;

/// Render the email subject and body for a report.
pub fn render_email(report: &LabReport) -> NotificationPayload {
    let test = report.test_name.as_deref().unwrap_or("lab test");

    let subject = format!("Your {} results are ready", test);

    let mut body = String::new();
    match report.patient_ref.as_deref() {
        Some(patient) => body.push_str(&format!("Hello {},\n\n", patient)),
        None => body.push_str("Hello,\n\n"),
    }
    body.push_str(&format!("A new report ({}) is available for your {}.\n", report.id, test));
    if let Some(collected) = report.collected_at {
        body.push_str(&format!(
            "Sample collected: {}\n",
            collected.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if let Some(result) = report.result.as_deref() {
        body.push_str(&format!("Result: {}\n", result));
    }
    body.push_str("\nPlease contact your care provider with any questions.\n");

    NotificationPayload { subject, body }
}

/// Render a short SMS text for a report.
pub fn render_sms(report: &LabReport) -> String {
    let test = report.test_name.as_deref().unwrap_or("lab");
    let mut text = format!("Your {} report {} is ready.", test, report.id);
    if let Some(result) = report.result.as_deref() {
        text.push_str(&format!(" Result: {}.", result));
    }
    truncate_chars(&text, SMS_MAX_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
