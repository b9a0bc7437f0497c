//! Rendering of runs into the files the tools write.
//!
//! All renderers are pure and return the full file contents. Rows follow input
//! order and there is exactly one row per parsed input ID.

use rootsync::{ParseWarning, ResolvedResult, RootId, Run, Status, VoxelCoord};
use std::fmt::Write;

/// Separates the report header from the per-ID rows.
pub const RESULTS_MARKER: &str = "---RESULTS---";

pub const COORDINATE_HEADER: &str = "root_id\tx\ty\tz";

/// Header values that do not come from the run itself.
#[derive(Clone, Copy, Debug)]
pub struct ReportMeta<'a> {
    pub datastack: &'a str,
    pub workers: usize,
    /// Wall-clock seconds including connection setup.
    pub elapsed_secs: f64,
}

/// The full identity report.
///
/// ```text
/// # ID Validation Report
/// # ...totals...
///
/// ---RESULTS---
///
/// 100 CURRENT
/// 250 UPDATED(from 200)
/// 300 LOOKUP_FAILED # identifier not found
/// ```
pub fn render_report(run: &Run<RootId>, meta: &ReportMeta<'_>) -> String {
    let counts = &run.counts;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# ID Validation Report");
    let _ = writeln!(out, "# Datastack: {}", meta.datastack);
    let _ = writeln!(out, "# Total IDs: {}", counts.total());
    let _ = writeln!(out, "# Current: {}", counts.current);
    let _ = writeln!(out, "# Updated: {}", counts.updated);
    let _ = writeln!(out, "# Unresolved: {}", counts.unresolved);
    let _ = writeln!(out, "# Lookup failed: {}", counts.lookup_failed);
    let _ = writeln!(out, "# Batch failed: {}", counts.batch_failed);
    let _ = writeln!(out, "# Skipped lines: {}", run.warnings.len());
    for warning in &run.warnings {
        let _ = writeln!(out, "#   {}", describe_warning(warning));
    }
    let _ = writeln!(out, "# Time: {:.1}s", meta.elapsed_secs);
    let _ = writeln!(out, "# Workers: {}", meta.workers);
    let _ = writeln!(out);
    let _ = writeln!(out, "{RESULTS_MARKER}");
    let _ = writeln!(out);

    for result in &run.results {
        let _ = writeln!(out, "{}", report_row(result));
    }

    out
}

/// One report line.
pub fn report_row(result: &ResolvedResult<RootId>) -> String {
    let original = result.record.id;
    let reason = result.reason.as_deref().unwrap_or("unknown");

    match (result.status, result.resolved) {
        (Status::Current, Some(id)) => format!("{id} {}", Status::Current),
        (Status::Updated, Some(id)) => format!("{id} {}(from {original})", Status::Updated),
        (Status::Unresolved, _) => format!("{original} {}", Status::Unresolved),
        (status, _) => format!("{original} {status} # {reason}"),
    }
}

/// Resolved IDs only, one per line, using the current ID for updated records.
pub fn render_clean_list(run: &Run<RootId>) -> String {
    run.results
        .iter()
        .filter(|r| r.status.is_resolved())
        .filter_map(|r| r.resolved)
        .map(|id| format!("{id}\n"))
        .collect()
}

/// Tab-separated coordinate table with a header row.
///
/// Lookup failures render `ERROR` in every coordinate column. Records that got
/// no coordinate for another reason render `N/A`.
pub fn render_coordinates(run: &Run<VoxelCoord>) -> String {
    let mut out = String::with_capacity((run.results.len() + 1) * 48);
    out.push_str(COORDINATE_HEADER);
    out.push('\n');

    for result in &run.results {
        let id = result.record.id;
        let _ = match (result.status, result.resolved) {
            (_, Some(VoxelCoord { x, y, z })) => writeln!(out, "{id}\t{x}\t{y}\t{z}"),
            (Status::LookupFailed, None) => writeln!(out, "{id}\tERROR\tERROR\tERROR"),
            (_, None) => writeln!(out, "{id}\tN/A\tN/A\tN/A"),
        };
    }

    out
}

pub fn describe_warning(warning: &ParseWarning) -> String {
    format!(
        "line {}: {:?} ({})",
        warning.line, warning.text, warning.reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootsync::{InputRecord, ParseIdError, ParseWarningReason, StageTimings, StatusCounts};

    fn result<V>(id: u64, status: Status, resolved: Option<V>, reason: Option<&str>) -> ResolvedResult<V> {
        ResolvedResult {
            record: InputRecord {
                position: 0,
                raw_label: id.to_string(),
                id: RootId::new(id),
            },
            resolved,
            status,
            reason: reason.map(str::to_string),
        }
    }

    fn run<V>(results: Vec<ResolvedResult<V>>, warnings: Vec<ParseWarning>) -> Run<V> {
        let mut counts = StatusCounts::default();
        for r in &results {
            counts.record(r.status);
        }
        Run {
            results,
            counts,
            warnings,
            groups: Vec::new(),
            timings: StageTimings::default(),
        }
    }

    fn identity_run() -> Run<RootId> {
        run(
            vec![
                result(100, Status::Current, Some(RootId::new(100)), None),
                result(200, Status::Updated, Some(RootId::new(250)), None),
                result(300, Status::LookupFailed, None, Some("identifier not found")),
                result(400, Status::Unresolved, None, Some("no leaves found")),
                result(500, Status::BatchFailed, None, Some("bulk call failed: network error: reset")),
            ],
            vec![ParseWarning {
                line: 3,
                text: "bad-line".to_string(),
                reason: ParseWarningReason::InvalidId(ParseIdError::NotNumeric),
            }],
        )
    }

    #[test]
    fn report_rows_by_status() {
        let rows: Vec<_> = identity_run().results.iter().map(report_row).collect();
        assert_eq!(
            rows,
            vec![
                "100 CURRENT",
                "250 UPDATED(from 200)",
                "300 LOOKUP_FAILED # identifier not found",
                "400 UNRESOLVED",
                "500 BATCH_FAILED # bulk call failed: network error: reset",
            ]
        );
    }

    #[test]
    fn report_has_header_then_rows() {
        let meta = ReportMeta {
            datastack: "brain_and_nerve_cord",
            workers: 20,
            elapsed_secs: 12.34,
        };
        let report = render_report(&identity_run(), &meta);

        assert!(report.starts_with("# ID Validation Report\n"));
        assert!(report.contains("# Total IDs: 5\n"));
        assert!(report.contains("# Updated: 1\n"));
        assert!(report.contains("# Skipped lines: 1\n"));
        assert!(report.contains("bad-line"));
        assert!(report.contains("# Time: 12.3s\n"));
        assert!(report.contains("# Workers: 20\n"));

        let (header, rows) = report.split_once(RESULTS_MARKER).unwrap();
        assert!(header.lines().all(|l| l.is_empty() || l.starts_with('#')));
        assert_eq!(rows.trim().lines().count(), 5);
        assert_eq!(rows.trim().lines().next(), Some("100 CURRENT"));
    }

    #[test]
    fn clean_list_keeps_resolved_ids_only() {
        assert_eq!(render_clean_list(&identity_run()), "100\n250\n");
    }

    #[test]
    fn coordinate_table_marks_failures() {
        let coords = run(
            vec![
                result(1, Status::Current, Some(VoxelCoord::new(100, 200, 100)), None),
                result(2, Status::LookupFailed, None, Some("identifier not found")),
                result(3, Status::BatchFailed, None, Some("bulk call omitted 1 of 1 keys")),
            ],
            Vec::new(),
        );

        assert_eq!(
            render_coordinates(&coords),
            "root_id\tx\ty\tz\n\
             1\t100\t200\t100\n\
             2\tERROR\tERROR\tERROR\n\
             3\tN/A\tN/A\tN/A\n"
        );
    }

    #[test]
    fn empty_run_renders_header_only() {
        let coords: Run<VoxelCoord> = run(Vec::new(), Vec::new());
        assert_eq!(render_coordinates(&coords), "root_id\tx\ty\tz\n");
        assert_eq!(render_clean_list(&run(Vec::new(), Vec::new())), "");
    }
}
