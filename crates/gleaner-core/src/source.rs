use std::collections::{BTreeMap, BTreeSet};

use crate::error::AppError;
use crate::models::{Job, RunDate, SelectionMode};
use crate::traits::TargetStore;

/// Keys listed in the unresolved-key warning.
const UNRESOLVED_PREVIEW: usize = 10;

/// Pick the run date: the explicit one if given, else the latest stored one.
///
/// An invalid explicit date is an input error. An unusable stored date
/// (none at all, or malformed) resolves to `None` so the caller can exit
/// cleanly.
pub async fn resolve_run_date<T: TargetStore>(
    targets: &T,
    explicit: Option<&str>,
) -> Result<Option<RunDate>, AppError> {
    if let Some(raw) = explicit {
        return raw.trim().parse().map(Some);
    }

    let Some(latest) = targets.latest_run_date().await? else {
        return Ok(None);
    };
    match latest.trim().parse::<RunDate>() {
        Ok(run_date) => Ok(Some(run_date)),
        Err(e) => {
            tracing::warn!(value = %latest, error = %e, "Latest stored run date is not usable");
            Ok(None)
        }
    }
}

/// Jobs for one run, plus the keys that were wanted but had no location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPlan {
    pub jobs: Vec<Job>,
    pub unresolved: Vec<String>,
}

impl JobPlan {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Builds the ordered job list from the reference tables.
#[derive(Clone)]
pub struct JobSource<T: TargetStore> {
    targets: T,
}

impl<T: TargetStore> JobSource<T> {
    pub fn new(targets: T) -> Self {
        Self { targets }
    }

    /// Jobs ordered by key.
    ///
    /// - `All`: every target with a non-empty location.
    /// - `Missing`: (population - recorded) restricted to targets with a
    ///   usable location.
    pub async fn load_targets(
        &self,
        run_date: RunDate,
        mode: SelectionMode,
    ) -> Result<JobPlan, AppError> {
        let mut locations: BTreeMap<String, String> = BTreeMap::new();
        let mut blank: BTreeSet<String> = BTreeSet::new();
        for (key, location) in self.targets.target_locations(run_date).await? {
            let key = key.trim().to_string();
            let location = location.trim().to_string();
            if key.is_empty() {
                continue;
            }
            if location.is_empty() {
                blank.insert(key);
            } else {
                blank.remove(&key);
                locations.insert(key, location);
            }
        }

        let plan = match mode {
            SelectionMode::All => JobPlan {
                jobs: locations
                    .into_iter()
                    .map(|(key, location)| Job::new(key, location))
                    .collect(),
                unresolved: blank.into_iter().collect(),
            },
            SelectionMode::Missing => {
                let recorded: BTreeSet<String> = self
                    .targets
                    .recorded_keys(run_date)
                    .await?
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .collect();
                let outstanding: BTreeSet<String> = self
                    .targets
                    .population_keys(run_date)
                    .await?
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty() && !recorded.contains(k))
                    .collect();

                let mut plan = JobPlan::default();
                for key in outstanding {
                    match locations.get(&key) {
                        Some(location) => plan.jobs.push(Job::new(key, location.clone())),
                        None => plan.unresolved.push(key),
                    }
                }
                plan
            }
        };

        if !plan.unresolved.is_empty() {
            let preview: Vec<&str> = plan
                .unresolved
                .iter()
                .take(UNRESOLVED_PREVIEW)
                .map(String::as_str)
                .collect();
            tracing::warn!(
                %run_date,
                mode = %mode,
                count = plan.unresolved.len(),
                keys = ?preview,
                "Keys without a usable location were skipped"
            );
        }

        tracing::debug!(%run_date, mode = %mode, jobs = plan.jobs.len(), "Job list built");
        Ok(plan)
    }
}
