//! Eviction planning.
//!
//! Every namespace that has been idle for longer than the maximum inactive duration is archived.
//! When the cluster holds at least `high_watermark` namespaces, namespaces idle for longer than the
//! minimum inactive duration are archived too, oldest first, until only `low_watermark` namespaces
//! would remain.

use crate::{ActivityError, ActivitySource, Namespace};
use ahash::AHashSet as HashSet;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};


/// Cluster capacity settings that drive eviction planning and archival.
#[derive(Clone, Debug, Default)]
pub struct CapacityPolicy {
    /// The number of namespaces that triggers more aggressive archival.
    pub high_watermark: usize,

    /// The number of namespaces archival attempts to get down to once the high watermark has been
    /// reached.
    pub low_watermark: usize,

    /// Namespaces idle for longer than this *may* be archived if room is needed.
    pub min_inactive: Duration,

    /// Namespaces idle for longer than this *will* be archived.
    pub max_inactive: Duration,

    /// Namespaces that are never archived.
    pub protected_namespaces: HashSet<String>,

    /// Log intended actions without mutating anything.
    pub dry_run: bool,

    /// Delete namespaces once their backup has completed.
    pub delete_archived_namespaces: bool,

    /// How long archived backups are retained by the backup service.
    pub archive_ttl: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Idle for longer than the maximum inactive duration; always evicted.
    VeryInactive,

    /// Idle for longer than the minimum inactive duration; evicted only to reach the low
    /// watermark.
    SomewhatInactive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub namespace: Namespace,
    pub last_activity: DateTime<Utc>,
    pub tier: Tier,
}

/// The outcome of a single planning cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub candidates: Vec<EvictionCandidate>,
    pub total_namespaces: usize,
    pub very_inactive: usize,
    pub somewhat_inactive: usize,
}

// === impl CapacityPolicy ===

impl CapacityPolicy {
    pub fn is_protected(&self, namespace: &str) -> bool {
        self.protected_namespaces.contains(namespace)
    }

    /// Determines which namespaces must be archived at `check_time`.
    ///
    /// Fails if the last activity of any namespace cannot be resolved; the cycle is abandoned
    /// rather than planned against partial data.
    pub fn plan<S: ActivitySource>(
        &self,
        source: &S,
        check_time: DateTime<Utc>,
    ) -> Result<Plan, ActivityError> {
        if self.high_watermark == 0 {
            warn!("No namespace capacity high watermark defined, skipping");
            return Ok(Plan::default());
        }
        if self.low_watermark == 0 {
            warn!("No namespace capacity low watermark defined, skipping");
            return Ok(Plan::default());
        }

        let min_inactive = cutoff(check_time, self.min_inactive);
        let max_inactive = cutoff(check_time, self.max_inactive);

        let mut namespaces = source.namespaces();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        let total = namespaces.len();
        info!(
            %check_time,
            %min_inactive,
            %max_inactive,
            high_watermark = self.high_watermark,
            low_watermark = self.low_watermark,
            "Calculating namespaces to be archived"
        );

        let mut very_inactive = Vec::new();
        let mut somewhat_inactive = Vec::new();
        for namespace in namespaces {
            if self.is_protected(&namespace.name) {
                debug!(namespace = %namespace.name, "Skipping protected namespace");
                continue;
            }

            let last_activity = match source.last_activity(&namespace.name)? {
                Some(last_activity) => last_activity,
                None => {
                    warn!(namespace = %namespace.name, "No last activity time calculated for namespace");
                    continue;
                }
            };

            if last_activity < max_inactive {
                info!(namespace = %namespace.name, %last_activity, "Found namespace over max inactive time");
                very_inactive.push(EvictionCandidate {
                    namespace,
                    last_activity,
                    tier: Tier::VeryInactive,
                });
            } else if last_activity < min_inactive {
                info!(namespace = %namespace.name, %last_activity, "Found namespace between max/min inactive times");
                somewhat_inactive.push(EvictionCandidate {
                    namespace,
                    last_activity,
                    tier: Tier::SomewhatInactive,
                });
            }
        }
        info!(
            total_namespaces = total,
            very_inactive = very_inactive.len(),
            somewhat_inactive = somewhat_inactive.len(),
            "Last activity totals"
        );

        let mut plan = Plan {
            total_namespaces: total,
            very_inactive: very_inactive.len(),
            somewhat_inactive: somewhat_inactive.len(),
            candidates: very_inactive,
        };

        // Once over the high watermark, archive somewhat-inactive namespaces until the low
        // watermark would be reached. The most recently active among them are spared.
        let remaining = total - plan.candidates.len();
        if total >= self.high_watermark && remaining >= self.low_watermark {
            let target = remaining - self.low_watermark;
            debug!(target, "Looking for somewhat inactive namespaces to archive");
            if target < somewhat_inactive.len() {
                somewhat_inactive.sort_by_key(|c| c.last_activity);
                somewhat_inactive.truncate(target);
            }
            plan.candidates.extend(somewhat_inactive);
        }
        info!(candidates = plan.candidates.len(), "Found namespaces to archive");

        let remaining = total - plan.candidates.len();
        if remaining > self.low_watermark {
            warn!(
                low_watermark = self.low_watermark,
                remaining, "Unable to reach namespace capacity low watermark"
            );
        }

        Ok(plan)
    }
}

/// Computes `check_time - inactive`, saturating at the earliest representable time.
fn cutoff(check_time: DateTime<Utc>, inactive: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(inactive)
        .ok()
        .and_then(|inactive| check_time.checked_sub_signed(inactive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// === impl Plan ===

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.candidates.iter().map(|c| c.namespace.name.as_str())
    }
}
