//! Compact XML-like summary of a data file.

use super::generator::percent;
use crate::coverage::ProjectData;
use chrono::{DateTime, Utc};

/// Render the dump printed by `covreactor dump`.
pub fn generate_dump(data: &ProjectData, timestamp: DateTime<Utc>) -> String {
    let totals = data.counts();
    let mut lines = Vec::with_capacity(data.packages.len() + 3);

    lines.push("<?xml version=\"1.0\"?>".to_string());
    lines.push(format!(
        "<coverage line-rate=\"{}\" branch-rate=\"{}\" version=\"{}\" timestamp=\"{}\">",
        percent(totals.line_rate()),
        percent(totals.branch_rate()),
        env!("CARGO_PKG_VERSION"),
        timestamp.timestamp_millis()
    ));

    for (name, package) in &data.packages {
        let counts = package.counts();
        lines.push(format!(
            "<package name=\"{}\" line-rate=\"{}\" branch-rate=\"{}\" />",
            name,
            percent(counts.line_rate()),
            percent(counts.branch_rate())
        ));
    }

    lines.push("</coverage>".to_string());
    lines.join("\n")
}
