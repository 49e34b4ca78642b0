use serde::Serialize;
use tf_driver::{RunReport, StepStatus};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:width$}", cell, width = w))
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportView<'a> {
    run_id: String,
    started_at: String,
    requested_version: &'a str,
    version: Option<&'a str>,
    success: bool,
    elapsed_ms: u64,
    steps: Vec<StepView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StepView {
    action: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    changes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

fn status_label(status: &StepStatus) -> &'static str {
    match status {
        StepStatus::Succeeded { .. } => "succeeded",
        StepStatus::Failed(_) => "failed",
        StepStatus::Skipped => "skipped",
    }
}

fn view(report: &RunReport) -> ReportView<'_> {
    ReportView {
        run_id: report.run_id.to_string(),
        started_at: report.started_at.to_rfc3339(),
        requested_version: &report.requested_version,
        version: report.version.as_deref(),
        success: report.is_success(),
        elapsed_ms: report.elapsed.as_millis() as u64,
        steps: report
            .steps
            .iter()
            .map(|s| StepView {
                action: s.action.to_string(),
                status: status_label(&s.status),
                changes: match s.status {
                    StepStatus::Succeeded { changes } => changes,
                    _ => None,
                },
                error: match &s.status {
                    StepStatus::Failed(msg) => Some(msg.clone()),
                    _ => None,
                },
                duration_ms: s.duration.as_millis() as u64,
            })
            .collect(),
        error: report.first_error().map(|e| e.to_string()),
    }
}

/// Summarise a finished run on stdout.
pub fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&view(report));
    }
    if report.steps.is_empty() {
        return Ok(());
    }

    let rows = report
        .steps
        .iter()
        .map(|s| {
            let detail = match &s.status {
                StepStatus::Succeeded { changes: Some(true) } => "changes present".to_string(),
                StepStatus::Succeeded { changes: Some(false) } => "no changes".to_string(),
                StepStatus::Failed(msg) => msg.lines().next().unwrap_or_default().to_string(),
                _ => String::new(),
            };
            vec![
                s.action.to_string(),
                status_label(&s.status).to_string(),
                format!("{:.1}s", s.duration.as_secs_f64()),
                detail,
            ]
        })
        .collect();
    print_table(&["ACTION", "STATUS", "TIME", "DETAIL"], rows);
    Ok(())
}
