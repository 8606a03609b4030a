//! Coverage projector: derives an advertiser's visibility from its active
//! subscriptions.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::instrument;

use crate::models::{Advertiser, CoverageType, PlanCoverage, Subscription};
use crate::services::engine::EngineContext;
use crate::services::error::ServiceError;
use crate::services::metrics::record_side_effect_failure;

/// Coverage scope and sorted, de-duplicated cities of the active subscriptions.
pub fn derive_coverage(subscriptions: &[Subscription]) -> (CoverageType, Vec<String>) {
    let mut kingdom = false;
    let mut city = false;
    let mut cities = BTreeSet::new();

    for subscription in subscriptions.iter().filter(|s| s.grants_visibility()) {
        match subscription.coverage_type {
            PlanCoverage::Kingdom => kingdom = true,
            PlanCoverage::City => {
                city = true;
                cities.extend(subscription.coverage_cities.iter().cloned());
            }
        }
    }

    let coverage_type = match (kingdom, city) {
        (true, true) => CoverageType::Both,
        (true, false) => CoverageType::Kingdom,
        (false, true) => CoverageType::City,
        (false, false) => CoverageType::None,
    };

    (coverage_type, cities.into_iter().collect())
}

#[derive(Clone)]
pub struct CoverageProjector {
    ctx: Arc<EngineContext>,
}

impl CoverageProjector {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Recompute and store the advertiser's coverage.
    ///
    /// Rebuilds for one advertiser run one at a time and read the
    /// subscriptions under that lock, so the last write reflects the latest
    /// subscription state. Only the coverage fields are written.
    #[instrument(skip(self))]
    pub async fn rebuild(&self, advertiser_id: &str) -> Result<Advertiser, ServiceError> {
        let _guard = self.ctx.advertiser_locks.acquire(advertiser_id).await;
        let mut advertiser = self
            .ctx
            .store
            .get_advertiser(advertiser_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Advertiser", advertiser_id))?;

        let subscriptions = self
            .ctx
            .store
            .list_subscriptions_by_advertiser(advertiser_id)
            .await?;
        let (coverage_type, cities) = derive_coverage(&subscriptions);

        if advertiser.coverage_type == coverage_type && advertiser.coverage_cities == cities {
            return Ok(advertiser);
        }

        let now = self.ctx.now();
        self.ctx
            .store
            .set_advertiser_coverage(advertiser_id, coverage_type, &cities, now)
            .await?;
        advertiser.coverage_type = coverage_type;
        advertiser.coverage_cities = cities;
        advertiser.updated_utc = now;

        tracing::info!(
            advertiser_id = %advertiser_id,
            coverage_type = coverage_type.as_str(),
            cities = advertiser.coverage_cities.len(),
            "Advertiser coverage rebuilt"
        );
        Ok(advertiser)
    }

    /// Rebuild, logging instead of failing.
    pub async fn refresh(&self, advertiser_id: &str) {
        if let Err(e) = self.rebuild(advertiser_id).await {
            record_side_effect_failure("coverage");
            tracing::warn!(
                advertiser_id = %advertiser_id,
                error = %e,
                "Coverage rebuild failed"
            );
        }
    }
}
