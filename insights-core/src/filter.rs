//! Request-side data model: the tenant-scoped insights filter.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InsightsError;
use crate::search::SearchExpression;

// ------------------------------------------------------------------ //
//  Interval                                                           //
// ------------------------------------------------------------------ //

/// Calendar granularity used to bucket the time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
}

impl Interval {
    /// Field name understood by `DATE_TRUNC`.
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
            Interval::Quarter => "quarter",
        }
    }

    /// Number of points shown when the caller gives no start date.
    pub fn default_points(self) -> u32 {
        match self {
            Interval::Day => 28,
            Interval::Week | Interval::Month | Interval::Quarter => 3,
        }
    }

    /// `INTERVAL` literal spanning `count` of these intervals.
    ///
    /// Quarters are written as month multiples.
    pub fn span_literal(self, count: u32) -> String {
        match self {
            Interval::Quarter => format!("INTERVAL '{} month'", count * 3),
            other => format!("INTERVAL '{} {}'", count, other.as_str()),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------ //
//  Group dimensions                                                   //
// ------------------------------------------------------------------ //

/// Attribute the aggregated rows are partitioned by.
///
/// `currency` is not listed here: it is appended to every grouping so
/// monetary sums never mix currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupDimension {
    AdAccountId,
    AdId,
    AdSetId,
    CampaignId,
    Device,
    Position,
    Publisher,
    Integration,
}

/// Column every stage carries in addition to the requested dimensions.
pub const CURRENCY_COLUMN: &str = "currency";

impl GroupDimension {
    pub const ALL: [GroupDimension; 8] = [
        GroupDimension::AdAccountId,
        GroupDimension::AdId,
        GroupDimension::AdSetId,
        GroupDimension::CampaignId,
        GroupDimension::Device,
        GroupDimension::Position,
        GroupDimension::Publisher,
        GroupDimension::Integration,
    ];

    /// Output column name (snake_case) shared by every query stage.
    pub fn column(self) -> &'static str {
        match self {
            GroupDimension::AdAccountId => "ad_account_id",
            GroupDimension::AdId => "ad_id",
            GroupDimension::AdSetId => "ad_set_id",
            GroupDimension::CampaignId => "campaign_id",
            GroupDimension::Device => "device",
            GroupDimension::Position => "position",
            GroupDimension::Publisher => "publisher",
            GroupDimension::Integration => "integration",
        }
    }

    /// Free-text breakdowns may be NULL on the event row; ids never are.
    pub fn nullable(self) -> bool {
        matches!(
            self,
            GroupDimension::Device | GroupDimension::Position | GroupDimension::Publisher
        )
    }
}

// ------------------------------------------------------------------ //
//  Ordering                                                           //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Cpm,
    Cpc,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Spend => "spend",
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Cpm => "cpm",
            Metric::Cpc => "cpc",
        }
    }

    /// Column whose sum must be positive for the ratio metrics.
    pub fn denominator(self) -> Option<&'static str> {
        match self {
            Metric::Cpm => Some("impressions"),
            Metric::Cpc => Some("clicks"),
            _ => None,
        }
    }

    /// Aggregate expression over a relation aliased `alias`.
    ///
    /// Spend is stored in minor units, hence the `* 10` for CPM.
    pub fn aggregate(self, alias: &str) -> String {
        match self {
            Metric::Spend | Metric::Impressions | Metric::Clicks => {
                format!("SUM({alias}.{})", self.as_str())
            }
            Metric::Cpm => {
                format!("SUM({alias}.spend) * 10 / NULLIF(SUM({alias}.impressions), 0)")
            }
            Metric::Cpc => format!("SUM({alias}.spend) / NULLIF(SUM({alias}.clicks), 0)"),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "spend" => Some(Metric::Spend),
            "impressions" => Some(Metric::Impressions),
            "clicks" => Some(Metric::Clicks),
            "cpm" => Some(Metric::Cpm),
            "cpc" => Some(Metric::Cpc),
            _ => None,
        }
    }
}

/// Ranking criterion: a metric either as an absolute total or as the
/// trend between the last two intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderMetric {
    Absolute(Metric),
    Relative(Metric),
}

impl OrderMetric {
    pub fn metric(self) -> Metric {
        match self {
            OrderMetric::Absolute(m) | OrderMetric::Relative(m) => m,
        }
    }

    pub fn is_relative(self) -> bool {
        matches!(self, OrderMetric::Relative(_))
    }
}

impl Default for OrderMetric {
    fn default() -> Self {
        OrderMetric::Absolute(Metric::Spend)
    }
}

impl fmt::Display for OrderMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMetric::Absolute(m) => write!(f, "{}_abs", m.as_str()),
            OrderMetric::Relative(m) => write!(f, "{}_rel", m.as_str()),
        }
    }
}

impl FromStr for OrderMetric {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InsightsError::InvalidFilter(format!("unknown orderBy {s:?}"));
        let (metric, variant) = s.rsplit_once('_').ok_or_else(invalid)?;
        let metric = Metric::parse(metric).ok_or_else(invalid)?;
        match variant {
            "abs" => Ok(OrderMetric::Absolute(metric)),
            "rel" => Ok(OrderMetric::Relative(metric)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for OrderMetric {
    type Error = InsightsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderMetric> for String {
    fn from(value: OrderMetric) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

// ------------------------------------------------------------------ //
//  Filter                                                             //
// ------------------------------------------------------------------ //

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

/// Everything that selects and shapes one page of insights.
///
/// Serialization doubles as the canonical form hashed into cache keys, so
/// empty lists and absent options are skipped: `devices: []` and no
/// `devices` produce the same query and the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval: Interval,
    #[serde(default)]
    pub group_by: Vec<GroupDimension>,
    #[serde(default)]
    pub order_by: OrderMetric,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publishers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ad_account_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ad_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchExpression>,
}

impl Default for InsightsFilter {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            interval: Interval::default(),
            group_by: Vec::new(),
            order_by: OrderMetric::default(),
            order: SortOrder::default(),
            page: default_page(),
            page_size: default_page_size(),
            devices: Vec::new(),
            positions: Vec::new(),
            publishers: Vec::new(),
            integrations: Vec::new(),
            ad_account_ids: Vec::new(),
            ad_ids: Vec::new(),
            search: None,
        }
    }
}

impl InsightsFilter {
    pub fn validate(&self) -> Result<(), InsightsError> {
        if self.page < 1 {
            return Err(InsightsError::InvalidFilter("page must be >= 1".into()));
        }
        if self.page_size < 1 {
            return Err(InsightsError::InvalidFilter("pageSize must be >= 1".into()));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(InsightsError::InvalidFilter(format!(
                    "dateFrom {from} is after dateTo {to}"
                )));
            }
        }
        Ok(())
    }

    /// Requested dimensions with duplicates removed, first occurrence wins.
    pub fn dimensions(&self) -> Vec<GroupDimension> {
        let mut out = Vec::with_capacity(self.group_by.len());
        for dim in &self.group_by {
            if !out.contains(dim) {
                out.push(*dim);
            }
        }
        out
    }

    /// One more group than the page holds, to detect a following page.
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size) + 1
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
