//! Tables and query stages referenced by generated SQL, with fixed aliases.
//!
//! Aliases are listed explicitly instead of being derived from initials:
//! `ad_sets` would abbreviate to the keyword `AS`, and `insights` and
//! `integrations` would both become `i`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Insights,
    Ads,
    AdSets,
    Campaigns,
    AdAccounts,
    Integrations,
    OrganizationInsights,
    LastInterval,
    IntervalBeforeLast,
    RankedGroups,
}

impl Relation {
    pub const ALL: [Relation; 10] = [
        Relation::Insights,
        Relation::Ads,
        Relation::AdSets,
        Relation::Campaigns,
        Relation::AdAccounts,
        Relation::Integrations,
        Relation::OrganizationInsights,
        Relation::LastInterval,
        Relation::IntervalBeforeLast,
        Relation::RankedGroups,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Relation::Insights => "insights",
            Relation::Ads => "ads",
            Relation::AdSets => "ad_sets",
            Relation::Campaigns => "campaigns",
            Relation::AdAccounts => "ad_accounts",
            Relation::Integrations => "integrations",
            Relation::OrganizationInsights => "organization_insights",
            Relation::LastInterval => "last_interval",
            Relation::IntervalBeforeLast => "interval_before_last",
            Relation::RankedGroups => "ranked_groups",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            Relation::Insights => "ins",
            Relation::Ads => "a",
            Relation::AdSets => "ast",
            Relation::Campaigns => "c",
            Relation::AdAccounts => "aa",
            Relation::Integrations => "ig",
            Relation::OrganizationInsights => "oi",
            Relation::LastInterval => "li",
            Relation::IntervalBeforeLast => "ibl",
            Relation::RankedGroups => "rg",
        }
    }

    /// `alias.column`
    pub fn col(self, column: &str) -> String {
        format!("{}.{}", self.alias(), column)
    }

    /// `name alias`, as used after `FROM` / `JOIN`.
    pub fn source(self) -> String {
        format!("{} {}", self.name(), self.alias())
    }
}
