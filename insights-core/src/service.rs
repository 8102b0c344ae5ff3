//! Request orchestration: cache, window math, assembly, execution, shaping.

use std::sync::Arc;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assembler;
use crate::cache::InsightsCache;
use crate::error::InsightsError;
use crate::executor::QueryExecutor;
use crate::filter::InsightsFilter;
use crate::interval::{self, LowerBound};
use crate::shaper::{self, InsightsPage};
use crate::sql::SqlQuery;

/// One insights request as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub filter: Option<InsightsFilter>,
}

impl InsightsRequest {
    pub fn new(tenant_id: impl Into<String>, locale: impl Into<String>, filter: InsightsFilter) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            locale: Some(locale.into()),
            filter: Some(filter),
        }
    }

    /// Required parts, or the first one missing.
    fn parts(&self) -> Result<(&str, &str, &InsightsFilter), InsightsError> {
        let filter = self
            .filter
            .as_ref()
            .ok_or(InsightsError::MissingParameter("filter"))?;
        let tenant_id = self
            .tenant_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(InsightsError::MissingParameter("tenantId"))?;
        let locale = self
            .locale
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or(InsightsError::MissingParameter("locale"))?;
        Ok((tenant_id, locale, filter))
    }
}

/// Everything computed before the query is executed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub week_start: Weekday,
    pub points: u32,
    pub lower_bound: LowerBound,
    pub query: SqlQuery,
}

pub struct InsightsService {
    executor: Arc<dyn QueryExecutor>,
    cache: InsightsCache,
}

impl InsightsService {
    pub fn new(executor: Arc<dyn QueryExecutor>, cache: InsightsCache) -> Self {
        Self { executor, cache }
    }

    pub fn cache(&self) -> &InsightsCache {
        &self.cache
    }

    /// Window math and assembled query for a request, without running it.
    pub fn plan(
        &self,
        tenant_id: &str,
        locale: &str,
        filter: &InsightsFilter,
        now: DateTime<Utc>,
    ) -> Result<QueryPlan, InsightsError> {
        let week_start = interval::week_start_for_locale(locale)?;
        Ok(Self::plan_for_week(tenant_id, week_start, filter, now))
    }

    fn plan_for_week(
        tenant_id: &str,
        week_start: Weekday,
        filter: &InsightsFilter,
        now: DateTime<Utc>,
    ) -> QueryPlan {
        let points = interval::points_per_interval(
            filter.date_from,
            filter.date_to,
            filter.interval,
            week_start,
            now,
        );
        let lower_bound =
            interval::lower_bound(filter.date_from, filter.date_to, points, filter.interval, now);
        let query = assembler::assemble(tenant_id, filter, lower_bound);

        QueryPlan {
            week_start,
            points,
            lower_bound,
            query,
        }
    }

    pub async fn insights(&self, request: &InsightsRequest) -> Result<InsightsPage, InsightsError> {
        self.insights_at(request, Utc::now()).await
    }

    /// [`Self::insights`] with a fixed clock.
    pub async fn insights_at(
        &self,
        request: &InsightsRequest,
        now: DateTime<Utc>,
    ) -> Result<InsightsPage, InsightsError> {
        let (tenant_id, locale, filter) = request.parts()?;
        filter.validate()?;
        // A bad locale is rejected even when the page is cached.
        let week_start = interval::week_start_for_locale(locale)?;

        if let Some(page) = self.cache.get(tenant_id, filter).await {
            return Ok(page);
        }

        let plan = Self::plan_for_week(tenant_id, week_start, filter, now);
        debug!(
            tenant_id,
            points = plan.points,
            params = plan.query.params.len(),
            query = %plan.query.interpolated(),
            "insights query assembled"
        );

        let rows = self
            .executor
            .fetch(&plan.query)
            .await
            .map_err(InsightsError::Executor)?;
        let page = shaper::shape(&rows, &filter.dimensions(), filter.page, filter.page_size)?;
        info!(
            tenant_id,
            rows = rows.len(),
            groups = page.edges.len(),
            has_next = page.has_next,
            "insights served"
        );

        self.cache.set(tenant_id, filter, &page);
        Ok(page)
    }

    pub async fn invalidate(&self, tenant_id: Option<&str>) -> Result<u64, InsightsError> {
        self.cache.invalidate(tenant_id).await
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
