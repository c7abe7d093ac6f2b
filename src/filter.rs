use crate::models::{index_by_id, RiskResult, RiskTier, StudentRecord};

/// Dashboard-style narrowing of a finished analysis. Empty criteria match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub tiers: Vec<RiskTier>,
    pub departments: Vec<String>,
    pub semesters: Vec<String>,
    /// Case-insensitive substring of the student id or name.
    pub search: Option<String>,
}

impl ResultFilter {
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
            && self.departments.is_empty()
            && self.semesters.is_empty()
            && self.search.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn matches(&self, result: &RiskResult, record: Option<&StudentRecord>) -> bool {
        if !self.tiers.is_empty() && !self.tiers.contains(&result.tier) {
            return false;
        }

        let department = record.and_then(|r| r.department.as_deref());
        if !self.departments.is_empty() && !contains_ignore_case(&self.departments, department) {
            return false;
        }

        let semester = record.and_then(|r| r.semester.as_deref());
        if !self.semesters.is_empty() && !contains_ignore_case(&self.semesters, semester) {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                let name = record.map(|r| r.name.to_lowercase()).unwrap_or_default();
                result.student_id.as_str().to_lowercase().contains(&needle) || name.contains(&needle)
            }
            _ => true,
        }
    }

    /// Keeps priority order from `results`.
    pub fn apply<'a>(
        &self,
        results: &'a [RiskResult],
        records: &[StudentRecord],
    ) -> Vec<&'a RiskResult> {
        let by_id = index_by_id(records);

        results
            .iter()
            .filter(|result| self.matches(result, by_id.get(&result.student_id).copied()))
            .collect()
    }
}

fn contains_ignore_case(wanted: &[String], value: Option<&str>) -> bool {
    value.is_some_and(|value| wanted.iter().any(|w| w.trim().eq_ignore_ascii_case(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{analyze, Execution};
    use crate::policy::ThresholdPolicy;

    fn records() -> Vec<StudentRecord> {
        vec![
            StudentRecord::new("S001", "Avery Lee")
                .with_department("Science")
                .with_semester("1")
                .with_grade("Mathematics", 35.0)
                .with_attendance(0.4),
            StudentRecord::new("S002", "Jules Moreno")
                .with_department("Arts")
                .with_semester("2")
                .with_grade("Arts", 90.0),
            StudentRecord::new("S003", "Kiara Patel").with_department("science"),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything_in_order() {
        let records = records();
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);
        let filter = ResultFilter::default();

        assert!(filter.is_empty());
        assert_eq!(filter.apply(&report.results, &records).len(), 3);
    }

    #[test]
    fn filters_by_tier_and_department() {
        let records = records();
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);

        let high = ResultFilter {
            tiers: vec![RiskTier::High],
            ..Default::default()
        };
        let ids: Vec<_> = high
            .apply(&report.results, &records)
            .iter()
            .map(|r| r.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["S001"]);

        let science = ResultFilter {
            departments: vec!["Science".to_string()],
            ..Default::default()
        };
        assert_eq!(science.apply(&report.results, &records).len(), 2);
    }

    #[test]
    fn search_matches_id_or_name() {
        let records = records();
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);

        let by_name = ResultFilter {
            search: Some("moreno".to_string()),
            ..Default::default()
        };
        assert_eq!(by_name.apply(&report.results, &records)[0].student_id.as_str(), "S002");

        let by_id = ResultFilter {
            search: Some("s00".to_string()),
            semesters: vec!["1".to_string()],
            ..Default::default()
        };
        assert_eq!(by_id.apply(&report.results, &records).len(), 1);
    }

    #[test]
    fn duplicate_ids_filter_on_the_first_record() {
        let records = vec![
            StudentRecord::new("S001", "Avery Lee")
                .with_department("Science")
                .with_attendance(0.1),
            StudentRecord::new("S001", "Zed Other")
                .with_department("Arts")
                .with_attendance(0.9),
        ];
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);

        let arts = ResultFilter {
            departments: vec!["Arts".to_string()],
            ..Default::default()
        };
        assert!(arts.apply(&report.results, &records).is_empty());

        let science = ResultFilter {
            departments: vec!["Science".to_string()],
            ..Default::default()
        };
        assert_eq!(science.apply(&report.results, &records).len(), 1);

        let other = ResultFilter {
            search: Some("zed".to_string()),
            ..Default::default()
        };
        assert!(other.apply(&report.results, &records).is_empty());
    }
}
