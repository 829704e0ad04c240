use std::collections::HashSet;

use chrono::NaiveDate;

use crate::bulletin::{date_path, is_weekend, ymd};

/// Weekend special issues, most frequently observed first.
pub const WEEKEND_PRIORITY: &[u32] = &[75, 50, 100, 125, 150, 25, 175, 200];

pub const DEFAULT_MAX_ISSUE: u32 = 200;

/// Produces the ordered list of URLs that might hold a date's summary.
///
/// Order is priority: the resolver dispatches batches front to back and
/// stops at the first batch containing a hit.
pub trait CandidateStrategy: Send + Sync {
    fn candidates(&self, date: NaiveDate) -> Vec<String>;
}

/// Naming conventions observed on the gazette's summary directory.
///
/// Weekday summaries are named after the issue number followed by `00`
/// (`12300.PDF`), with a few zero-padded variants. Weekend special issues
/// use `BOCM-YYYYMMDD0NN.PDF` and are tried first on Saturdays and Sundays.
#[derive(Debug, Clone)]
pub struct BocmConventions {
    pub base_url: String,
    pub max_issue: u32,
}

impl BocmConventions {
    pub fn new(base_url: &str, max_issue: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_issue: max_issue.max(1),
        }
    }

    fn dir(&self, date: NaiveDate) -> String {
        format!("{}/boletin/CM_Boletin_BOCM/{}", self.base_url, date_path(date))
    }

    fn weekend_names(&self, date: NaiveDate) -> Vec<String> {
        let stamp = ymd(date);
        let rest = (1..=self.max_issue).filter(|n| !WEEKEND_PRIORITY.contains(n));
        WEEKEND_PRIORITY
            .iter()
            .copied()
            .filter(|n| *n <= self.max_issue)
            .chain(rest)
            .map(|n| format!("BOCM-{stamp}{n:03}.PDF"))
            .collect()
    }

    fn issue_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.max_issue as usize * 3);
        for i in 1..=self.max_issue {
            if i < 10 {
                names.push(format!("00{i}00.PDF"));
                names.push(format!("0{i}00.PDF"));
                names.push(format!("0{i}000.PDF"));
            } else if i < 100 {
                names.push(format!("0{i}00.PDF"));
                names.push(format!("{i}00.PDF"));
                names.push(format!("{i}000.PDF"));
            } else {
                names.push(format!("{i}00.PDF"));
            }
        }
        names
    }
}

impl Default for BocmConventions {
    fn default() -> Self {
        Self::new("https://www.bocm.es", DEFAULT_MAX_ISSUE)
    }
}

impl CandidateStrategy for BocmConventions {
    fn candidates(&self, date: NaiveDate) -> Vec<String> {
        let dir = self.dir(date);
        let mut names = Vec::new();
        if is_weekend(date) {
            names.extend(self.weekend_names(date));
        }
        names.extend(self.issue_names());

        // Some templates collide (issue 5 as `05000` vs issue 50 as `05000`).
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|n| seen.insert(n.clone()))
            .map(|n| format!("{dir}/{n}"))
            .collect()
    }
}
