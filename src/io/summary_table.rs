use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use crate::core::DailySummary;

/// Render the daily summary as a terminal table.
pub fn render_summary(rows: &[DailySummary]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "date",
            "deploys",
            "failed",
            "cfr",
            "lead time (h)",
            "mttr (min)",
        ]);

    for row in rows {
        let numeric = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);
        table.add_row(vec![
            Cell::new(row.date.format("%Y-%m-%d")),
            numeric(row.deploy_count.to_string()),
            numeric(row.failed_deploy_count.to_string()),
            numeric(format!("{:.2}", row.change_failure_rate)),
            numeric(format!("{:.2}", row.avg_lead_time_hours)),
            numeric(format!("{:.1}", row.mttr_minutes)),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_render_contains_formatted_values() {
        let rendered = render_summary(&[DailySummary {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            deploy_count: 4,
            failed_deploy_count: 1,
            change_failure_rate: 0.25,
            avg_lead_time_hours: 12.5,
            mttr_minutes: 30.0,
        }]);
        assert!(rendered.contains("2024-01-02"));
        assert!(rendered.contains("0.25"));
        assert!(rendered.contains("12.50"));
        assert!(rendered.contains("30.0"));
    }
}
