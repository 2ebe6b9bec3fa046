//! Summary renderer
//!
//! Renders a batch result to a plain-text report for the terminal.

use crate::domain::entities::{BatchResult, ListingResult, Outcome};

/// Render a batch result as a plain-text report
pub fn render_summary(result: &BatchResult) -> String {
    let mut buf = String::new();

    buf.push_str("Renewal summary\n");
    buf.push_str("===============\n");
    buf.push_str(&format!(
        "Renewed {} of {} listing(s)\n",
        result.success_count(),
        result.listings.len()
    ));
    if result.short_circuited {
        buf.push_str("No listing left exposure; renewal and retry were skipped\n");
    }
    buf.push('\n');

    for listing in &result.listings {
        buf.push_str(&render_listing(listing));
        buf.push('\n');
    }

    // Follow-up hints only for listings that need manual attention
    let manual: Vec<&ListingResult> = result
        .unsuccessful()
        .filter(|l| matches!(l.outcome, Outcome::ExposureEndedOnly | Outcome::Saved))
        .collect();
    if !manual.is_empty() {
        buf.push_str("\nNeeds attention on the portal:\n");
        for listing in manual {
            buf.push_str(&format!("  - {}: {}\n", listing.id, hint(listing.outcome)));
        }
    }

    buf
}

fn render_listing(listing: &ListingResult) -> String {
    let marker = if listing.outcome == Outcome::Success {
        "OK  "
    } else {
        "FAIL"
    };
    let stage = listing
        .stage_reached
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "[{}] {:<12} {:<20} stage={} attempts={}",
        marker,
        listing.id.as_str(),
        listing.outcome.to_string(),
        stage,
        listing.attempts
    );
    if let Some(name) = &listing.display_name {
        line.push_str(&format!(" name=\"{}\"", name));
    }
    line
}

fn hint(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::ExposureEndedOnly => "exposure ended but not re-advertised",
        Outcome::Saved => "saved but payment not confirmed",
        _ => "",
    }
}
