use std::collections::BTreeMap;

use tracing::info;
use xwalk_core::{coerce_numeric, soc_6digit, CrosswalkRow, EnrichedRow, WageRecord};
use xwalk_sources::WageSourceRow;

pub const NATIONAL_AREA: f64 = 99.0;
pub const DETAILED_GROUP: &str = "detailed";

#[derive(Debug, Clone, Default)]
pub struct WageTable {
    records: BTreeMap<String, WageRecord>,
    filtered_out: usize,
}

impl WageTable {
    pub fn from_rows(rows: &[WageSourceRow]) -> Self {
        let mut records = BTreeMap::new();
        let mut filtered_out = 0usize;
        for row in rows {
            if !is_national_detailed(row) {
                filtered_out += 1;
                continue;
            }
            let occ_code = row.occ_code.trim();
            if occ_code.is_empty() || records.contains_key(occ_code) {
                continue;
            }
            records.insert(occ_code.to_string(), wage_record(occ_code, row));
        }
        Self {
            records,
            filtered_out,
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = WageRecord>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.entry(record.occ_code.clone()).or_insert(record);
        }
        Self {
            records: map,
            filtered_out: 0,
        }
    }

    pub fn get(&self, soc_code: &str) -> Option<&WageRecord> {
        self.records.get(soc_code)
    }

    pub fn employment(&self, occupation_code: &str) -> Option<f64> {
        self.get(&soc_6digit(occupation_code))?.tot_emp
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filtered_out(&self) -> usize {
        self.filtered_out
    }
}

fn is_national_detailed(row: &WageSourceRow) -> bool {
    let area_ok = row
        .area
        .as_deref()
        .map_or(true, |area| coerce_numeric(area) == Some(NATIONAL_AREA));
    let naics_ok = row.naics.as_deref().map_or(true, |naics| {
        let naics = naics.trim();
        !naics.is_empty() && naics.chars().all(|c| c == '0')
    });
    let group_ok = row
        .o_group
        .as_deref()
        .map_or(true, |group| group.trim().eq_ignore_ascii_case(DETAILED_GROUP));
    area_ok && naics_ok && group_ok
}

fn wage_record(occ_code: &str, row: &WageSourceRow) -> WageRecord {
    let num = |field: &Option<String>| field.as_deref().and_then(coerce_numeric);
    WageRecord {
        occ_code: occ_code.to_string(),
        occ_title: row.occ_title.clone().filter(|t| !t.trim().is_empty()),
        tot_emp: num(&row.tot_emp),
        h_mean: num(&row.h_mean),
        a_mean: num(&row.a_mean),
        h_median: num(&row.h_median),
        a_median: num(&row.a_median),
        h_pct10: num(&row.h_pct10),
        h_pct25: num(&row.h_pct25),
        h_pct75: num(&row.h_pct75),
        h_pct90: num(&row.h_pct90),
        a_pct10: num(&row.a_pct10),
        a_pct25: num(&row.a_pct25),
        a_pct75: num(&row.a_pct75),
        a_pct90: num(&row.a_pct90),
    }
}

pub fn merge_wages(rows: Vec<EnrichedRow>, table: &WageTable) -> Vec<CrosswalkRow> {
    let merged: Vec<CrosswalkRow> = rows
        .into_iter()
        .map(|enriched| {
            let soc = soc_6digit(&enriched.row.task.occupation_code);
            let wages = table.get(&soc).cloned();
            CrosswalkRow {
                enriched,
                soc_6digit: soc,
                wages,
            }
        })
        .collect();

    let with_wages = merged.iter().filter(|row| row.wages.is_some()).count();
    let rate = if merged.is_empty() {
        0.0
    } else {
        100.0 * with_wages as f64 / merged.len() as f64
    };
    info!(
        matched = with_wages,
        total = merged.len(),
        rate = %format!("{rate:.1}%"),
        "wage match"
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, emp: &str, h_mean: &str) -> WageSourceRow {
        WageSourceRow {
            occ_code: code.into(),
            occ_title: Some(format!("title {code}")),
            tot_emp: Some(emp.into()),
            h_mean: Some(h_mean.into()),
            ..WageSourceRow::default()
        }
    }

    #[test]
    fn redacted_values_become_missing_and_first_row_wins() {
        let table = WageTable::from_rows(&[
            row("15-1252", "1,654,440", "*"),
            row("15-1252", "1", "1"),
            row("11-1021", "#", "60.5"),
        ]);
        assert_eq!(table.len(), 2);
        let dev = table.get("15-1252").expect("developers");
        assert_eq!(dev.tot_emp, Some(1_654_440.0));
        assert_eq!(dev.h_mean, None);
        assert_eq!(table.employment("15-1252.00"), Some(1_654_440.0));
        assert_eq!(table.employment("11-1021.00"), None);
        assert_eq!(table.get("11-1021").and_then(|r| r.h_mean), Some(60.5));
    }

    #[test]
    fn national_detailed_filter_applies_when_columns_present() {
        let national = WageSourceRow {
            area: Some("99".into()),
            naics: Some("000000".into()),
            o_group: Some("detailed".into()),
            ..row("15-1252", "100", "50")
        };
        let state = WageSourceRow {
            area: Some("6".into()),
            ..national.clone()
        };
        let broad = WageSourceRow {
            o_group: Some("broad".into()),
            occ_code: "15-1250".into(),
            ..national.clone()
        };
        let table = WageTable::from_rows(&[state, broad, national]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.filtered_out(), 2);
        assert_eq!(table.employment("15-1252.00"), Some(100.0));
    }
}
