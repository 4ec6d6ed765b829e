// src/render.rs

//! Human-readable rendering of a decoded report.

use shared::Report;
use std::fmt::Write;

/// One summary line followed by one line per packed entry.
pub fn render_report(report: &Report) -> String {
    let header = &report.header;
    let mut out = String::new();

    if report.is_clean() {
        out.push_str("service table clean: no modified entries\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{} modified entr{} ({} reported{})",
        header.modified_count,
        if header.modified_count == 1 { "y" } else { "ies" },
        header.entry_count,
        if report.is_truncated() { ", truncated: enlarge the buffer" } else { "" }
    );
    let _ = writeln!(out, "{:>6}  {:>18}  {:>18}  module", "index", "current", "baseline");
    for e in &report.entries {
        let _ = writeln!(
            out,
            "{:>6}  {:#018x}  {:#018x}  {}",
            e.table_index, e.current_address, e.baseline_address, e.module_name
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ReportEntry, ReportHeader};

    #[test]
    fn clean_report_is_one_line() {
        let report = Report { header: ReportHeader::empty(), entries: Vec::new() };
        assert_eq!(render_report(&report).lines().count(), 1);
    }

    #[test]
    fn truncated_report_says_so() {
        let report = Report {
            header: ReportHeader { modified_count: 2, entry_count: 1, ..ReportHeader::empty() },
            entries: vec![ReportEntry {
                table_index: 3,
                baseline_address: 0x1000,
                current_address: 0x9000,
                module_name: "rootkit.sys".into(),
            }],
        };
        let text = render_report(&report);
        assert!(text.starts_with("2 modified entries (1 reported, truncated"));
        assert!(text.contains("0x0000000000009000  0x0000000000001000  rootkit.sys"));
    }
}
