//! Turns flat aggregate rows into one series per group.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InsightsError;
use crate::filter::{GroupDimension, CURRENCY_COLUMN};

/// Separator between dimension values in a series id.
pub const ID_DELIMITER: &str = "|";

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

/// One result row keyed by output column name.
pub type InsightRow = HashMap<String, ColumnValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    pub date: DateTime<Utc>,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub cpm: Option<f64>,
    pub cpc: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSeries {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    pub currency: String,
    pub datapoints: Vec<Datapoint>,
}

impl GroupedSeries {
    fn dimension_mut(&mut self, dim: GroupDimension) -> &mut Option<String> {
        match dim {
            GroupDimension::AdAccountId => &mut self.ad_account_id,
            GroupDimension::AdId => &mut self.ad_id,
            GroupDimension::AdSetId => &mut self.ad_set_id,
            GroupDimension::CampaignId => &mut self.campaign_id,
            GroupDimension::Device => &mut self.device,
            GroupDimension::Position => &mut self.position,
            GroupDimension::Publisher => &mut self.publisher,
            GroupDimension::Integration => &mut self.integration,
        }
    }
}

/// One page of grouped series, as returned to callers and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsPage {
    pub has_next: bool,
    pub page: u32,
    pub page_size: u32,
    pub edges: Vec<GroupedSeries>,
}

// ------------------------------------------------------------------ //
//  Column access                                                      //
// ------------------------------------------------------------------ //

fn column<'r>(row: &'r InsightRow, name: &str) -> Result<&'r ColumnValue, InsightsError> {
    row.get(name)
        .ok_or_else(|| InsightsError::MalformedRow(format!("missing column `{name}`")))
}

fn mistyped(name: &str, value: &ColumnValue) -> InsightsError {
    InsightsError::MalformedRow(format!("unexpected value {value:?} in column `{name}`"))
}

/// Dimension value as text; integer ids are rendered in decimal.
fn text_or_null(row: &InsightRow, name: &str) -> Result<Option<String>, InsightsError> {
    match column(row, name)? {
        ColumnValue::Null => Ok(None),
        ColumnValue::Text(s) => Ok(Some(s.clone())),
        ColumnValue::Int(i) => Ok(Some(i.to_string())),
        other => Err(mistyped(name, other)),
    }
}

fn float_or_null(row: &InsightRow, name: &str) -> Result<Option<f64>, InsightsError> {
    match column(row, name)? {
        ColumnValue::Null => Ok(None),
        ColumnValue::Float(f) => Ok(Some(*f)),
        ColumnValue::Int(i) => Ok(Some(*i as f64)),
        other => Err(mistyped(name, other)),
    }
}

fn required_float(row: &InsightRow, name: &str) -> Result<f64, InsightsError> {
    float_or_null(row, name)?
        .ok_or_else(|| InsightsError::MalformedRow(format!("column `{name}` is null")))
}

fn required_int(row: &InsightRow, name: &str) -> Result<i64, InsightsError> {
    match column(row, name)? {
        ColumnValue::Int(i) => Ok(*i),
        other => Err(mistyped(name, other)),
    }
}

fn required_timestamp(row: &InsightRow, name: &str) -> Result<DateTime<Utc>, InsightsError> {
    match column(row, name)? {
        ColumnValue::Timestamp(ts) => Ok(*ts),
        other => Err(mistyped(name, other)),
    }
}

fn datapoint(row: &InsightRow) -> Result<Datapoint, InsightsError> {
    Ok(Datapoint {
        date: required_timestamp(row, "interval_start")?,
        spend: required_float(row, "spend")?,
        impressions: required_int(row, "impressions")?,
        clicks: required_int(row, "clicks")?,
        cpm: float_or_null(row, "cpm")?,
        cpc: float_or_null(row, "cpc")?,
    })
}

// ------------------------------------------------------------------ //
//  Shaping                                                            //
// ------------------------------------------------------------------ //

/// Group `rows` into series, keeping the order in which groups first appear.
///
/// `rows` may hold one group more than `page_size`; that group only signals
/// that a following page exists and is not returned.
pub fn shape(
    rows: &[InsightRow],
    dimensions: &[GroupDimension],
    page: u32,
    page_size: u32,
) -> Result<InsightsPage, InsightsError> {
    let mut edges: Vec<GroupedSeries> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let mut values = Vec::with_capacity(dimensions.len());
        for dim in dimensions {
            values.push((*dim, text_or_null(row, dim.column())?));
        }
        let currency = match text_or_null(row, CURRENCY_COLUMN)? {
            Some(c) => c,
            None => {
                return Err(InsightsError::MalformedRow(format!(
                    "column `{CURRENCY_COLUMN}` is null"
                )))
            }
        };

        let id = values
            .iter()
            .map(|(_, v)| v.as_deref().unwrap_or(""))
            .chain(std::iter::once(currency.as_str()))
            .collect::<Vec<_>>()
            .join(ID_DELIMITER);

        let point = datapoint(row)?;
        let slot = match index.get(&id) {
            Some(&slot) => slot,
            None => {
                let mut series = GroupedSeries {
                    id: id.clone(),
                    currency,
                    ..Default::default()
                };
                for (dim, value) in values {
                    *series.dimension_mut(dim) = value;
                }
                edges.push(series);
                index.insert(id, edges.len() - 1);
                edges.len() - 1
            }
        };
        edges[slot].datapoints.push(point);
    }

    let limit = usize::try_from(page_size).unwrap_or(usize::MAX);
    let has_next = edges.len() > limit;
    edges.truncate(limit);

    Ok(InsightsPage {
        has_next,
        page,
        page_size,
        edges,
    })
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
