use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::detector::vocab::{contains_any, Vocabularies};
use crate::detector::DetectedEntry;
use crate::error::Result;
use crate::knowledge::{KnowledgeRecord, KnowledgeStore};

pub const STALE_AFTER_DAYS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "estado")]
pub enum Verdict {
    /// Entity never seen before.
    New,
    /// Stored code differs from the detected one.
    Changed,
    /// Same code. `suspect` when the wording still announces a change,
    /// so a reviewer can double check.
    Unchanged { suspect: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub key: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub prior_code: Option<String>,
    pub new_code: String,
    /// Stored record older than the staleness threshold.
    pub stale: bool,
    /// Stored record described an agreement of limited validity.
    pub temporary: bool,
}

impl Reconciliation {
    pub fn has_change(&self) -> bool {
        matches!(self.verdict, Verdict::New | Verdict::Changed)
    }

    /// Worth downloading the full document, whatever the code comparison said.
    pub fn eligible_for_download(&self) -> bool {
        self.has_change() || self.stale || self.temporary
    }
}

/// Classifies detected codes against the knowledge base and records new ones.
#[derive(Debug, Clone)]
pub struct Reconciler {
    pub vocab: Vocabularies,
    pub stale_after_days: i64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            vocab: Vocabularies::standard(),
            stale_after_days: STALE_AFTER_DAYS,
        }
    }
}

impl Reconciler {
    pub fn new(stale_after_days: i64) -> Self {
        Self {
            stale_after_days,
            ..Self::default()
        }
    }

    /// Pure classification; never touches the store.
    pub fn classify(
        &self,
        key: &str,
        prior: Option<&KnowledgeRecord>,
        new_code: &str,
        text: &str,
        today: NaiveDate,
    ) -> Reconciliation {
        let Some(prior) = prior else {
            return Reconciliation {
                key: key.to_string(),
                verdict: Verdict::New,
                prior_code: None,
                new_code: new_code.to_string(),
                stale: false,
                temporary: false,
            };
        };

        let verdict = if prior.code != new_code {
            Verdict::Changed
        } else {
            Verdict::Unchanged {
                suspect: contains_any(&text.to_lowercase(), self.vocab.change_indicators),
            }
        };

        Reconciliation {
            key: key.to_string(),
            verdict,
            prior_code: Some(prior.code.clone()),
            new_code: new_code.to_string(),
            stale: (today - prior.last_seen).num_days() > self.stale_after_days,
            temporary: contains_any(&prior.description.to_lowercase(), self.vocab.temporary_validity),
        }
    }

    /// Classify and, for NEW or CHANGED, overwrite the record for `key`.
    pub fn reconcile(
        &self,
        store: &mut dyn KnowledgeStore,
        key: &str,
        new_code: &str,
        text: &str,
        source_file: &str,
        today: NaiveDate,
    ) -> Result<Reconciliation> {
        let prior = store.get(key)?;
        let result = self.classify(key, prior.as_ref(), new_code, text, today);

        match result.verdict {
            Verdict::New => {
                info!(entity = %key, code = %new_code, "new agreement");
            }
            Verdict::Changed => {
                info!(
                    entity = %key,
                    prior = result.prior_code.as_deref().unwrap_or("-"),
                    code = %new_code,
                    "*** code changed"
                );
            }
            Verdict::Unchanged { suspect } => {
                debug!(entity = %key, code = %new_code, suspect, stale = result.stale, "code unchanged");
            }
        }

        if result.has_change() {
            store.put(key, KnowledgeRecord::new(new_code, today, source_file, text))?;
        }
        Ok(result)
    }

    pub fn reconcile_entry(
        &self,
        store: &mut dyn KnowledgeStore,
        entry: &DetectedEntry,
        today: NaiveDate,
    ) -> Result<Reconciliation> {
        let key = entry.knowledge_key(today);
        let file = entry.file_name(today).unwrap_or_default();
        self.reconcile(store, &key, &entry.code, &entry.description, &file, today)
    }

    /// Re-stamp a record after its document was fetched again, clearing staleness.
    pub fn refresh(
        &self,
        store: &mut dyn KnowledgeStore,
        key: &str,
        code: &str,
        text: &str,
        source_file: &str,
        today: NaiveDate,
    ) -> Result<()> {
        store.put(key, KnowledgeRecord::new(code, today, source_file, text))
    }
}
