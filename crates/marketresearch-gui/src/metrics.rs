use tracing::info;

pub fn report_started(report_id: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        report_id,
        running_reports = running,
        available_permits,
        event = "report_started"
    );
}

pub fn report_completed(
    report_id: &str,
    filename: &str,
    source_count: usize,
    elapsed_ms: u64,
) {
    info!(
        target = "telemetry.gui",
        report_id,
        filename,
        source_count,
        elapsed_ms,
        event = "report_completed"
    );
}

pub fn report_failed(report_id: &str, elapsed_ms: u64, error: &str) {
    info!(
        target = "telemetry.gui",
        report_id,
        elapsed_ms,
        error,
        event = "report_failed"
    );
}

pub fn report_downloaded(report_id: &str, bytes: usize) {
    info!(
        target = "telemetry.gui",
        report_id,
        bytes,
        event = "report_downloaded"
    );
}
