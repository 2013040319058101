use super::{AttendanceDate, AttendanceRecord, AttendanceStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterStudent {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReportRow {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DaySummary {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    pub class_name: String,
    pub date: AttendanceDate,
    pub report: Vec<DayReportRow>,
    pub summary: DaySummary,
}

/// One row per roster student in roster order. Students with no record for
/// the day are reported absent with no `marked_at`.
pub fn build_day_report(
    class_name: &str,
    date: AttendanceDate,
    roster: &[RosterStudent],
    records: &[AttendanceRecord],
) -> DayReport {
    let by_student: HashMap<&str, &AttendanceRecord> = records
        .iter()
        .filter(|r| r.date == date)
        .map(|r| (r.student_id.as_str(), r))
        .collect();

    let mut summary = DaySummary::default();
    let report: Vec<DayReportRow> = roster
        .iter()
        .map(|s| {
            let rec = by_student.get(s.id.as_str());
            let status = rec.map(|r| r.status).unwrap_or(AttendanceStatus::Absent);
            match status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Absent => summary.absent += 1,
                AttendanceStatus::Late => summary.late += 1,
            }
            DayReportRow {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                student_email: s.email.clone().unwrap_or_default(),
                status,
                marked_at: rec.map(|r| r.marked_at),
            }
        })
        .collect();
    summary.total = report.len();

    DayReport {
        class_name: class_name.to_string(),
        date,
        report,
        summary,
    }
}

/// Attendance totals for one class across every recorded day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAttendanceSummary {
    pub class_id: String,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub total: usize,
    /// Present days over recorded days, rounded to a whole percent. Late
    /// does not count as present.
    pub percentage: u32,
}

pub fn summarize_by_class(records: &[AttendanceRecord]) -> Vec<ClassAttendanceSummary> {
    let mut by_class: BTreeMap<&str, ClassAttendanceSummary> = BTreeMap::new();
    for rec in records {
        let entry = by_class
            .entry(rec.class_id.as_str())
            .or_insert_with(|| ClassAttendanceSummary {
                class_id: rec.class_id.clone(),
                present: 0,
                absent: 0,
                late: 0,
                total: 0,
                percentage: 0,
            });
        match rec.status {
            AttendanceStatus::Present => entry.present += 1,
            AttendanceStatus::Absent => entry.absent += 1,
            AttendanceStatus::Late => entry.late += 1,
        }
        entry.total += 1;
    }
    by_class
        .into_values()
        .map(|mut s| {
            s.percentage = whole_percent(s.present, s.total);
            s
        })
        .collect()
}

fn whole_percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    // Half rounds up.
    ((part * 200 + total) / (2 * total)) as u32
}
