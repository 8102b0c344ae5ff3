//! Staged aggregate query for one page of insights.
//!
//! The query is a chain of CTEs:
//!
//! 1. `organization_insights`: tenant-scoped, filtered event rows.
//! 2. `last_interval` / `interval_before_last`: per-group totals of the two
//!    most recent intervals (trend ordering only).
//! 3. `ranked_groups`: the groups on the requested page, plus one.
//! 4. Final projection: the bucketed series of exactly those groups.
//!
//! Ranking (3) and series materialization (4) are separate so per-bucket
//! aggregates are only computed for the groups that made the page.

use crate::filter::{GroupDimension, InsightsFilter, Interval, Metric, OrderMetric, CURRENCY_COLUMN};
use crate::interval::{trend_windows, Anchor, LowerBound, TrendWindow, WindowEdge};
use crate::relation::Relation;
use crate::search;
use crate::sql::{Params, SqlQuery};

const BASE: Relation = Relation::OrganizationInsights;

/// Column carried from the base scope through every later stage.
#[derive(Debug, Clone, Copy)]
struct GroupColumn {
    name: &'static str,
    nullable: bool,
    /// Select-list entry inside the base scope.
    source: &'static str,
}

impl GroupColumn {
    fn dimension(dim: GroupDimension) -> Self {
        let source = match dim {
            GroupDimension::AdAccountId => "aa.id AS ad_account_id",
            GroupDimension::AdId => "a.id AS ad_id",
            GroupDimension::AdSetId => "ast.id AS ad_set_id",
            GroupDimension::CampaignId => "c.id AS campaign_id",
            GroupDimension::Device => "ins.device",
            GroupDimension::Position => "ins.position",
            GroupDimension::Publisher => "ins.publisher",
            GroupDimension::Integration => "ig.type AS integration",
        };
        Self {
            name: dim.column(),
            nullable: dim.nullable(),
            source,
        }
    }

    fn currency() -> Self {
        Self {
            name: CURRENCY_COLUMN,
            nullable: false,
            source: "aa.currency",
        }
    }
}

/// Assemble the full query for `filter` within `tenant_id`.
pub fn assemble(tenant_id: &str, filter: &InsightsFilter, lower_bound: LowerBound) -> SqlQuery {
    let mut columns: Vec<GroupColumn> = filter
        .dimensions()
        .into_iter()
        .map(GroupColumn::dimension)
        .collect();
    columns.push(GroupColumn::currency());

    QueryAssembler {
        tenant_id,
        filter,
        lower_bound,
        columns,
        params: Params::default(),
    }
    .build()
}

struct QueryAssembler<'a> {
    tenant_id: &'a str,
    filter: &'a InsightsFilter,
    lower_bound: LowerBound,
    columns: Vec<GroupColumn>,
    params: Params,
}

impl QueryAssembler<'_> {
    fn build(mut self) -> SqlQuery {
        // Stages are rendered in text order so placeholders number upwards.
        let mut ctes = vec![(BASE, self.base_scope())];

        let ranking_column = match self.filter.order_by {
            OrderMetric::Relative(metric) => {
                let (last, before) = trend_windows(self.filter.date_to);
                let last = self.trend_stage(metric, last);
                ctes.push((Relation::LastInterval, last));
                let before = self.trend_stage(metric, before);
                ctes.push((Relation::IntervalBeforeLast, before));
                ctes.push((Relation::RankedGroups, self.trend_ranking(metric)));
                "trend"
            }
            OrderMetric::Absolute(metric) => {
                ctes.push((Relation::RankedGroups, self.total_ranking(metric)));
                "total"
            }
        };

        let with = ctes
            .into_iter()
            .map(|(relation, body)| {
                let body: Vec<String> = body.into_iter().map(|line| format!("  {line}")).collect();
                format!("{} AS (\n{}\n)", relation.name(), body.join("\n"))
            })
            .collect::<Vec<_>>()
            .join(",\n");

        let projection = self.projection(ranking_column);
        let text = format!("WITH {with}\n{}", projection.join("\n"));
        SqlQuery::new(text, self.params)
    }

    // ------------------------------------------------------------------ //
    //  Shared fragments                                                   //
    // ------------------------------------------------------------------ //

    fn interval(&self) -> Interval {
        self.filter.interval
    }

    /// `alias.col1, alias.col2, ...` over the group columns.
    fn group_list(&self, relation: Relation) -> String {
        self.columns
            .iter()
            .map(|c| relation.col(c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Join condition matching every group column of `left` and `right`.
    fn group_join(&self, right: Relation, left: Relation) -> String {
        self.columns
            .iter()
            .map(|c| {
                let op = if c.nullable { "IS NOT DISTINCT FROM" } else { "=" };
                format!("{} {op} {}", right.col(c.name), left.col(c.name))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn anchor(&mut self, anchor: Anchor) -> String {
        match anchor {
            Anchor::Now => "NOW()".to_string(),
            Anchor::At(ts) => self.params.bind_timestamp(ts),
        }
    }

    fn truncated(&mut self, anchor: Anchor) -> String {
        let anchor = self.anchor(anchor);
        format!("DATE_TRUNC('{}', {anchor})", self.interval())
    }

    fn edge(&mut self, anchor: Anchor, edge: WindowEdge) -> String {
        match edge {
            WindowEdge::Anchor => self.anchor(anchor),
            WindowEdge::Truncated { back: 0 } => self.truncated(anchor),
            WindowEdge::Truncated { back } => {
                let truncated = self.truncated(anchor);
                format!("{truncated} - {}", self.interval().span_literal(back))
            }
        }
    }

    fn lower_bound(&mut self) -> String {
        match self.lower_bound {
            LowerBound::Truncated { anchor, offset } => {
                self.edge(anchor, WindowEdge::Truncated { back: offset })
            }
            LowerBound::Exact(ts) => self.params.bind_timestamp(ts),
        }
    }

    fn having_guard(metric: Metric, relation: Relation) -> Option<String> {
        metric
            .denominator()
            .map(|col| format!("HAVING SUM({}) > 0", relation.col(col)))
    }

    // ------------------------------------------------------------------ //
    //  Stage 1: base scope                                                //
    // ------------------------------------------------------------------ //

    fn base_scope(&mut self) -> Vec<String> {
        let ins = Relation::Insights;
        let ads = Relation::Ads;
        let ad_sets = Relation::AdSets;
        let campaigns = Relation::Campaigns;
        let accounts = Relation::AdAccounts;
        let integrations = Relation::Integrations;

        let mut select = vec![
            ins.col("date"),
            ins.col("spend"),
            ins.col("impressions"),
            ins.col("clicks"),
        ];
        select.extend(self.columns.iter().map(|c| c.source.to_string()));

        let mut lines = vec![
            format!("SELECT {}", select.join(", ")),
            format!("FROM {}", ins.source()),
            format!("JOIN {} ON {} = {}", ads.source(), ads.col("id"), ins.col("ad_id")),
            format!("JOIN {} ON {} = {}", ad_sets.source(), ad_sets.col("id"), ads.col("ad_set_id")),
            format!("JOIN {} ON {} = {}", campaigns.source(), campaigns.col("id"), ad_sets.col("campaign_id")),
            format!("JOIN {} ON {} = {}", accounts.source(), accounts.col("id"), campaigns.col("ad_account_id")),
            format!("JOIN {} ON {} = {}", integrations.source(), integrations.col("id"), accounts.col("integration_id")),
        ];

        let tenant = self.params.bind_text(self.tenant_id);
        lines.push(format!("WHERE {} = {tenant}", integrations.col("organization_id")));

        if let Some(expr) = &self.filter.search {
            if let Some(predicate) = search::compile(expr, &mut self.params) {
                lines.push(format!("AND {predicate}"));
            }
        }

        let filter = self.filter;
        let in_filters = [
            (ins.col("device"), &filter.devices),
            (ins.col("position"), &filter.positions),
            (ins.col("publisher"), &filter.publishers),
            (integrations.col("type"), &filter.integrations),
            (accounts.col("id"), &filter.ad_account_ids),
            (ads.col("id"), &filter.ad_ids),
        ];
        for (column, values) in in_filters {
            if !values.is_empty() {
                let placeholders = self.params.bind_list(values.iter());
                lines.push(format!("AND {column} IN ({placeholders})"));
            }
        }

        let lower = self.lower_bound();
        lines.push(format!("AND {} >= {lower}", ins.col("date")));
        if let Some(date_to) = filter.date_to {
            let upper = self.params.bind_timestamp(date_to);
            lines.push(format!("AND {} <= {upper}", ins.col("date")));
        }

        lines
    }

    // ------------------------------------------------------------------ //
    //  Stage 2: trend windows                                             //
    // ------------------------------------------------------------------ //

    fn trend_stage(&mut self, metric: Metric, window: TrendWindow) -> Vec<String> {
        let date = BASE.col("date");
        let start = self.edge(window.anchor, window.start);
        let end = self.edge(window.anchor, window.end);
        let end_op = if window.end_inclusive { "<=" } else { "<" };
        let window = format!("{date} >= {start} AND {date} {end_op} {end}");

        let groups = self.group_list(BASE);
        let mut lines = vec![
            format!(
                "SELECT {groups}, {} AS {}",
                metric.aggregate(BASE.alias()),
                metric.as_str()
            ),
            format!("FROM {}", BASE.source()),
            format!("WHERE {window}"),
            format!("GROUP BY {groups}"),
        ];
        lines.extend(Self::having_guard(metric, BASE));
        lines
    }

    // ------------------------------------------------------------------ //
    //  Stage 3: ranking                                                   //
    // ------------------------------------------------------------------ //

    fn trend_ranking(&mut self, metric: Metric) -> Vec<String> {
        let last = Relation::LastInterval;
        let before = Relation::IntervalBeforeLast;
        let column = metric.as_str();

        let lines = vec![
            format!(
                "SELECT {}, {} / {} AS trend",
                self.group_list(last),
                last.col(column),
                before.col(column)
            ),
            format!("FROM {}", last.source()),
            format!("JOIN {} ON {}", before.source(), self.group_join(before, last)),
            format!("WHERE {} > 0", before.col(column)),
        ];
        self.finish_ranking(lines, "trend", last)
    }

    fn total_ranking(&mut self, metric: Metric) -> Vec<String> {
        let groups = self.group_list(BASE);
        let mut lines = vec![
            format!("SELECT {groups}, {} AS total", metric.aggregate(BASE.alias())),
            format!("FROM {}", BASE.source()),
            format!("GROUP BY {groups}"),
        ];
        lines.extend(Self::having_guard(metric, BASE));
        self.finish_ranking(lines, "total", BASE)
    }

    /// Group columns break ties so pages never overlap.
    fn finish_ranking(&mut self, mut lines: Vec<String>, column: &str, groups: Relation) -> Vec<String> {
        lines.push(format!(
            "ORDER BY {column} {}, {}",
            self.filter.order.as_sql(),
            self.group_list(groups)
        ));
        let limit = self.params.bind_int(self.filter.limit());
        let offset = self.params.bind_int(self.filter.offset());
        lines.push(format!("LIMIT {limit} OFFSET {offset}"));
        lines
    }

    // ------------------------------------------------------------------ //
    //  Stage 4: projection                                                //
    // ------------------------------------------------------------------ //

    fn projection(&self, ranking_column: &str) -> Vec<String> {
        let ranked = Relation::RankedGroups;
        let groups = self.group_list(BASE);
        let oi = BASE.alias();
        let rank = ranked.col(ranking_column);

        let measures = [
            format!("DATE_TRUNC('{}', {}) AS interval_start", self.interval(), BASE.col("date")),
            format!("SUM({oi}.spend)::float8 AS spend"),
            format!("SUM({oi}.impressions)::bigint AS impressions"),
            format!("SUM({oi}.clicks)::bigint AS clicks"),
            format!("({})::float8 AS cpm", Metric::Cpm.aggregate(oi)),
            format!("({})::float8 AS cpc", Metric::Cpc.aggregate(oi)),
        ];

        vec![
            format!("SELECT {groups}, {}", measures.join(", ")),
            format!("FROM {}", BASE.source()),
            format!("JOIN {} ON {}", ranked.source(), self.group_join(ranked, BASE)),
            format!("GROUP BY {groups}, interval_start, {rank}"),
            format!(
                "ORDER BY {rank} {}, {groups}, interval_start ASC",
                self.filter.order.as_sql()
            ),
        ]
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SortOrder;
    use crate::search::{SearchExpression, SearchField};
    use crate::sql::SqlParam;
    use chrono::{TimeZone, Utc};

    const JOINS: [&str; 6] = [
        "  FROM insights ins",
        "  JOIN ads a ON a.id = ins.ad_id",
        "  JOIN ad_sets ast ON ast.id = a.ad_set_id",
        "  JOIN campaigns c ON c.id = ast.campaign_id",
        "  JOIN ad_accounts aa ON aa.id = c.ad_account_id",
        "  JOIN integrations ig ON ig.id = aa.integration_id",
    ];

    fn expected(head: &[&str], tail: &[&str]) -> String {
        head.iter()
            .chain(JOINS.iter())
            .chain(tail.iter())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn default_window() -> LowerBound {
        LowerBound::Truncated {
            anchor: Anchor::Now,
            offset: 2,
        }
    }

    #[test]
    fn absolute_spend_weekly_default_window() {
        let filter = InsightsFilter {
            group_by: vec![GroupDimension::AdId],
            order_by: OrderMetric::Absolute(Metric::Spend),
            order: SortOrder::Desc,
            page: 1,
            page_size: 10,
            ..Default::default()
        };

        let query = assemble("org_1", &filter, default_window());

        let want = expected(
            &[
                "WITH organization_insights AS (",
                "  SELECT ins.date, ins.spend, ins.impressions, ins.clicks, a.id AS ad_id, aa.currency",
            ],
            &[
                "  WHERE ig.organization_id = $1",
                "  AND ins.date >= DATE_TRUNC('week', NOW()) - INTERVAL '2 week'",
                "),",
                "ranked_groups AS (",
                "  SELECT oi.ad_id, oi.currency, SUM(oi.spend) AS total",
                "  FROM organization_insights oi",
                "  GROUP BY oi.ad_id, oi.currency",
                "  ORDER BY total DESC, oi.ad_id, oi.currency",
                "  LIMIT $2 OFFSET $3",
                ")",
                "SELECT oi.ad_id, oi.currency, DATE_TRUNC('week', oi.date) AS interval_start, \
                 SUM(oi.spend)::float8 AS spend, SUM(oi.impressions)::bigint AS impressions, \
                 SUM(oi.clicks)::bigint AS clicks, \
                 (SUM(oi.spend) * 10 / NULLIF(SUM(oi.impressions), 0))::float8 AS cpm, \
                 (SUM(oi.spend) / NULLIF(SUM(oi.clicks), 0))::float8 AS cpc",
                "FROM organization_insights oi",
                "JOIN ranked_groups rg ON rg.ad_id = oi.ad_id AND rg.currency = oi.currency",
                "GROUP BY oi.ad_id, oi.currency, interval_start, rg.total",
                "ORDER BY rg.total DESC, oi.ad_id, oi.currency, interval_start ASC",
            ],
        );
        assert_eq!(query.text, want);
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text("org_1".into()),
                SqlParam::Int(11),
                SqlParam::Int(0),
            ]
        );
    }

    #[test]
    fn relative_cpm_with_search_and_date_to() {
        let date_to = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let filter = InsightsFilter {
            date_to: Some(date_to),
            interval: Interval::Day,
            group_by: vec![GroupDimension::Device],
            order_by: OrderMetric::Relative(Metric::Cpm),
            order: SortOrder::Asc,
            page: 2,
            page_size: 5,
            devices: vec!["mobile_app".into(), "desktop".into()],
            search: Some(SearchExpression::Or(vec![
                SearchExpression::contains(SearchField::AdName, "asdf"),
                SearchExpression::contains(SearchField::AccountName, "asdf"),
            ])),
            ..Default::default()
        };
        let lower = LowerBound::Truncated {
            anchor: Anchor::At(date_to),
            offset: 27,
        };

        let query = assemble("org_1", &filter, lower);

        let want = expected(
            &[
                "WITH organization_insights AS (",
                "  SELECT ins.date, ins.spend, ins.impressions, ins.clicks, ins.device, aa.currency",
            ],
            &[
                "  WHERE ig.organization_id = $1",
                "  AND (a.name ILIKE $2 OR aa.name ILIKE $3)",
                "  AND ins.device IN ($4, $5)",
                "  AND ins.date >= DATE_TRUNC('day', $6) - INTERVAL '27 day'",
                "  AND ins.date <= $7",
                "),",
                "last_interval AS (",
                "  SELECT oi.device, oi.currency, SUM(oi.spend) * 10 / NULLIF(SUM(oi.impressions), 0) AS cpm",
                "  FROM organization_insights oi",
                "  WHERE oi.date >= DATE_TRUNC('day', $8) AND oi.date <= $9",
                "  GROUP BY oi.device, oi.currency",
                "  HAVING SUM(oi.impressions) > 0",
                "),",
                "interval_before_last AS (",
                "  SELECT oi.device, oi.currency, SUM(oi.spend) * 10 / NULLIF(SUM(oi.impressions), 0) AS cpm",
                "  FROM organization_insights oi",
                "  WHERE oi.date >= DATE_TRUNC('day', $10) - INTERVAL '1 day' AND oi.date < DATE_TRUNC('day', $11)",
                "  GROUP BY oi.device, oi.currency",
                "  HAVING SUM(oi.impressions) > 0",
                "),",
                "ranked_groups AS (",
                "  SELECT li.device, li.currency, li.cpm / ibl.cpm AS trend",
                "  FROM last_interval li",
                "  JOIN interval_before_last ibl ON ibl.device IS NOT DISTINCT FROM li.device AND ibl.currency = li.currency",
                "  WHERE ibl.cpm > 0",
                "  ORDER BY trend ASC, li.device, li.currency",
                "  LIMIT $12 OFFSET $13",
                ")",
                "SELECT oi.device, oi.currency, DATE_TRUNC('day', oi.date) AS interval_start, \
                 SUM(oi.spend)::float8 AS spend, SUM(oi.impressions)::bigint AS impressions, \
                 SUM(oi.clicks)::bigint AS clicks, \
                 (SUM(oi.spend) * 10 / NULLIF(SUM(oi.impressions), 0))::float8 AS cpm, \
                 (SUM(oi.spend) / NULLIF(SUM(oi.clicks), 0))::float8 AS cpc",
                "FROM organization_insights oi",
                "JOIN ranked_groups rg ON rg.device IS NOT DISTINCT FROM oi.device AND rg.currency = oi.currency",
                "GROUP BY oi.device, oi.currency, interval_start, rg.trend",
                "ORDER BY rg.trend ASC, oi.device, oi.currency, interval_start ASC",
            ],
        );
        assert_eq!(query.text, want);

        let ts = SqlParam::Timestamp(date_to);
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text("org_1".into()),
                SqlParam::Text("%asdf%".into()),
                SqlParam::Text("%asdf%".into()),
                SqlParam::Text("mobile_app".into()),
                SqlParam::Text("desktop".into()),
                ts.clone(),
                ts.clone(),
                ts.clone(),
                ts.clone(),
                ts.clone(),
                ts,
                SqlParam::Int(6),
                SqlParam::Int(5),
            ]
        );
        assert!(query
            .interpolated()
            .contains("AND (a.name ILIKE '%asdf%' OR aa.name ILIKE '%asdf%')"));
    }

    #[test]
    fn absolute_and_relative_orderings_differ_structurally() {
        let absolute = InsightsFilter {
            group_by: vec![GroupDimension::CampaignId],
            order_by: OrderMetric::Absolute(Metric::Clicks),
            ..Default::default()
        };
        let relative = InsightsFilter {
            order_by: OrderMetric::Relative(Metric::Clicks),
            ..absolute.clone()
        };

        let abs = assemble("t", &absolute, default_window()).text;
        let rel = assemble("t", &relative, default_window()).text;

        assert!(!abs.contains("last_interval"));
        assert!(!abs.contains("interval_before_last"));
        assert!(abs.contains("SUM(oi.clicks) AS total"));

        assert!(rel.contains("last_interval AS ("));
        assert!(rel.contains("interval_before_last AS ("));
        assert!(rel.contains("li.clicks / ibl.clicks AS trend"));
        assert!(!rel.contains("HAVING"));
    }

    #[test]
    fn tied_rankings_fall_back_to_group_columns() {
        let filter = InsightsFilter {
            group_by: vec![GroupDimension::Publisher, GroupDimension::AdId],
            order_by: OrderMetric::Absolute(Metric::Impressions),
            ..Default::default()
        };
        let text = assemble("t", &filter, default_window()).text;
        assert!(text.contains("  ORDER BY total DESC, oi.publisher, oi.ad_id, oi.currency\n  LIMIT"));
        assert!(text.ends_with("ORDER BY rg.total DESC, oi.publisher, oi.ad_id, oi.currency, interval_start ASC"));

        let relative = InsightsFilter {
            order_by: OrderMetric::Relative(Metric::Impressions),
            ..filter
        };
        let text = assemble("t", &relative, default_window()).text;
        assert!(text.contains("  ORDER BY trend DESC, li.publisher, li.ad_id, li.currency\n  LIMIT"));
    }

    #[test]
    fn every_relative_metric_guards_the_before_period() {
        for metric in [Metric::Spend, Metric::Impressions, Metric::Clicks, Metric::Cpm, Metric::Cpc] {
            let filter = InsightsFilter {
                order_by: OrderMetric::Relative(metric),
                ..Default::default()
            };
            let text = assemble("t", &filter, default_window()).text;
            assert!(
                text.contains(&format!("WHERE ibl.{} > 0", metric.as_str())),
                "missing trend guard for {metric:?}"
            );
        }
    }

    #[test]
    fn exact_bounds_are_bound_parameters() {
        let from = Utc.with_ymd_and_hms(2023, 1, 18, 9, 30, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2023, 1, 20, 0, 0, 0).unwrap();
        let filter = InsightsFilter {
            date_from: Some(from),
            date_to: Some(to),
            ..Default::default()
        };
        let query = assemble("t", &filter, LowerBound::Exact(from));

        assert!(query.text.contains("  AND ins.date >= $2\n  AND ins.date <= $3\n"));
        assert_eq!(query.params[1], SqlParam::Timestamp(from));
        assert_eq!(query.params[2], SqlParam::Timestamp(to));
    }

    #[test]
    fn empty_search_and_empty_lists_leave_no_predicate() {
        let filter = InsightsFilter {
            search: Some(SearchExpression::And(vec![SearchExpression::Empty])),
            devices: vec![],
            ..Default::default()
        };
        let query = assemble("t", &filter, default_window());
        assert!(!query.text.contains("ILIKE"));
        assert!(!query.text.contains(" IN ("));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn all_list_filters_render_in_fixed_order() {
        let filter = InsightsFilter {
            devices: vec!["d".into()],
            positions: vec!["p".into()],
            publishers: vec!["facebook".into(), "instagram".into()],
            integrations: vec!["meta".into()],
            ad_account_ids: vec!["acc".into()],
            ad_ids: vec!["ad".into()],
            ..Default::default()
        };
        let text = assemble("t", &filter, default_window()).text;
        let expected_order = [
            "  AND ins.device IN ($2)",
            "  AND ins.position IN ($3)",
            "  AND ins.publisher IN ($4, $5)",
            "  AND ig.type IN ($6)",
            "  AND aa.id IN ($7)",
            "  AND a.id IN ($8)",
            "  AND ins.date >= ",
        ];
        let mut cursor = 0;
        for fragment in expected_order {
            let pos = text[cursor..]
                .find(fragment)
                .unwrap_or_else(|| panic!("{fragment:?} missing or out of order"));
            cursor += pos + fragment.len();
        }
    }

    #[test]
    fn quarter_window_uses_month_multiples() {
        let filter = InsightsFilter {
            interval: Interval::Quarter,
            order_by: OrderMetric::Relative(Metric::Spend),
            ..Default::default()
        };
        let text = assemble("t", &filter, default_window()).text;
        assert!(text.contains("AND ins.date >= DATE_TRUNC('quarter', NOW()) - INTERVAL '6 month'"));
        assert!(text.contains(
            "WHERE oi.date >= DATE_TRUNC('quarter', NOW()) - INTERVAL '3 month' AND oi.date < DATE_TRUNC('quarter', NOW())"
        ));
    }

    #[test]
    fn duplicate_dimensions_do_not_repeat_columns() {
        let filter = InsightsFilter {
            group_by: vec![GroupDimension::Publisher, GroupDimension::Publisher],
            ..Default::default()
        };
        let text = assemble("t", &filter, default_window()).text;
        assert!(text.contains("GROUP BY oi.publisher, oi.currency\n"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let filter = InsightsFilter {
            group_by: vec![GroupDimension::AdAccountId, GroupDimension::Integration],
            order_by: OrderMetric::Relative(Metric::Cpc),
            ..Default::default()
        };
        let a = assemble("tenant", &filter, default_window());
        let b = assemble("tenant", &filter, default_window());
        assert_eq!(a, b);
    }
}
