//! Built-in manual input catalog
//!
//! The default schema for the leverage and stability inputs, available before
//! the first fetch completes.

use std::collections::BTreeMap;

use super::field::{FieldMetadata, ManualInputField, ManualInputsState};

struct Spec {
    name: &'static str,
    label: &'static str,
    description: &'static str,
    category: &'static str,
    range: Option<(f64, f64)>,
    boolean: bool,
    unit: &'static str,
    data_source: &'static str,
    frequency: &'static str,
    instructions: &'static str,
    url: Option<&'static str>,
    default: f64,
}

const FED_FSR_URL: &str = "https://www.federalreserve.gov/publications/financial-stability-report.htm";

const FIELDS: [Spec; 14] = [
    Spec {
        name: "hedge_fund_leverage_percentile",
        label: "Hedge Fund Leverage Percentile",
        description: "Historical percentile ranking of hedge fund gross leverage",
        category: "Hedge Fund Leverage",
        range: Some((0.0, 100.0)),
        boolean: false,
        unit: "percentile",
        data_source: "Federal Reserve Financial Stability Report",
        frequency: "Semi-annual (May, November)",
        instructions: "Read the hedge fund gross leverage chart in the leverage section and enter the \
                       current percentile (95 = 95th percentile).",
        url: Some(FED_FSR_URL),
        default: 50.0,
    },
    Spec {
        name: "hedge_fund_basis_trade_concern",
        label: "Basis Trade Regulator Concern",
        description: "Has the Fed flagged basis trade concentration risk?",
        category: "Hedge Fund Leverage",
        range: None,
        boolean: true,
        unit: "",
        data_source: "Federal Reserve Financial Stability Report",
        frequency: "Semi-annual",
        instructions: "Flag as true when the report warns about Treasury basis trade concentration, \
                       fragility or unwind risk.",
        url: None,
        default: 0.0,
    },
    Spec {
        name: "hedge_fund_basis_trade_notional",
        label: "Basis Trade Notional Value",
        description: "Estimated notional value of hedge fund Treasury basis trades",
        category: "Hedge Fund Leverage",
        range: Some((0.0, 5000.0)),
        boolean: false,
        unit: "billions USD",
        data_source: "Fed FSR + Market Estimates",
        frequency: "Semi-annual",
        instructions: "Enter the estimated gross basis trade exposure in billions USD.",
        url: None,
        default: 0.0,
    },
    Spec {
        name: "primary_dealer_slr_ratio",
        label: "Primary Dealer SLR Ratio",
        description: "Supplementary Leverage Ratio for primary dealers",
        category: "Hedge Fund Leverage",
        range: Some((4.0, 10.0)),
        boolean: false,
        unit: "%",
        data_source: "Fed FSR Banking Section",
        frequency: "Semi-annual",
        instructions: "Enter the current dealer SLR as a percentage; the regulatory minimum is 5.0%.",
        url: None,
        default: 7.0,
    },
    Spec {
        name: "leveraged_loan_coverage",
        label: "Leveraged Loan Interest Coverage",
        description: "Median interest coverage ratio (EBITDA / Interest Expense)",
        category: "Corporate Credit",
        range: Some((0.5, 5.0)),
        boolean: false,
        unit: "ratio",
        data_source: "Fed FSR Corporate Debt Section",
        frequency: "Semi-annual",
        instructions: "Enter the median coverage ratio for leveraged loan borrowers (2.5 = 2.5x).",
        url: None,
        default: 2.5,
    },
    Spec {
        name: "leveraged_loan_default_rate",
        label: "Current Leveraged Loan Default Rate",
        description: "Current annual default rate on leveraged loans",
        category: "Corporate Credit",
        range: Some((0.0, 15.0)),
        boolean: false,
        unit: "% annual",
        data_source: "Fed FSR + FDIC Risk Review",
        frequency: "Semi-annual",
        instructions: "Enter the current annual default rate as a percentage.",
        url: None,
        default: 2.0,
    },
    Spec {
        name: "leveraged_loan_default_rate_6m_ago",
        label: "Leveraged Loan Default Rate (6M Ago)",
        description: "Default rate from 6 months prior for momentum calculation",
        category: "Corporate Credit",
        range: Some((0.0, 15.0)),
        boolean: false,
        unit: "% annual",
        data_source: "Fed FSR Historical + FDIC",
        frequency: "Semi-annual",
        instructions: "Enter the default rate reported roughly six months ago.",
        url: None,
        default: 2.0,
    },
    Spec {
        name: "leveraged_loan_recovery_rate",
        label: "Leveraged Loan Recovery Rate",
        description: "Percentage recovered on defaulted leveraged loans",
        category: "Corporate Credit",
        range: Some((0.0, 100.0)),
        boolean: false,
        unit: "% recovery",
        data_source: "Fed FSR + Moody's/S&P Reports",
        frequency: "Semi-annual",
        instructions: "Enter the average percentage recovered on defaulted loans (42 = 42%).",
        url: None,
        default: 65.0,
    },
    Spec {
        name: "cre_delinquency_rate",
        label: "CRE Delinquency Rate",
        description: "Percentage of CRE loans 90+ days past due or nonaccrual",
        category: "CRE Delinquency",
        range: Some((0.0, 20.0)),
        boolean: false,
        unit: "% of CRE loans",
        data_source: "FDIC Quarterly Banking Profile",
        frequency: "Quarterly",
        instructions: "Enter the noncurrent rate for commercial real estate loans from the loan performance table.",
        url: Some("https://www.fdic.gov/analysis/quarterly-banking-profile/"),
        default: 5.0,
    },
    Spec {
        name: "cre_maturing_loans_12m",
        label: "CRE Loans Maturing (12 Months)",
        description: "Commercial real estate loans maturing in next 12 months",
        category: "CRE Refinancing Cliff",
        range: Some((0.0, 2000.0)),
        boolean: false,
        unit: "billions USD",
        data_source: "Fed FSR + Trepp + CBRE",
        frequency: "Semi-annual",
        instructions: "Enter the amount of CRE debt maturing over the next 12 months in billions USD.",
        url: None,
        default: 0.0,
    },
    Spec {
        name: "cre_maturing_loans_24m",
        label: "CRE Loans Maturing (24 Months)",
        description: "Total CRE loans maturing over next 2 years",
        category: "CRE Refinancing Cliff",
        range: Some((0.0, 3000.0)),
        boolean: false,
        unit: "billions USD",
        data_source: "Fed FSR + Trepp",
        frequency: "Semi-annual",
        instructions: "Enter cumulative maturities over 24 months. Informational, not scored.",
        url: None,
        default: 0.0,
    },
    Spec {
        name: "cre_refi_spread_shock",
        label: "CRE Refinancing Rate Shock",
        description: "Basis points higher than original rates at refinancing",
        category: "CRE Refinancing Cliff",
        range: Some((0.0, 500.0)),
        boolean: false,
        unit: "basis points",
        data_source: "Fed FSR + Market Data",
        frequency: "Semi-annual",
        instructions: "Enter current CRE lending rate minus the origination rate of loans now maturing, \
                       in basis points.",
        url: None,
        default: 0.0,
    },
    Spec {
        name: "cre_office_vacancy",
        label: "Office Vacancy Rate",
        description: "National office vacancy rate",
        category: "CRE Structural Stress",
        range: Some((5.0, 30.0)),
        boolean: false,
        unit: "% vacant",
        data_source: "CBRE, CoStar, Moody's Analytics",
        frequency: "Quarterly",
        instructions: "Enter the national average office vacancy rate.",
        url: Some("https://www.cbre.com/insights/reports/us-office-figures-q4-2024"),
        default: 12.0,
    },
    Spec {
        name: "cre_property_value_decline_pct",
        label: "Office Property Value Decline",
        description: "Percentage decline in office property valuations from peak",
        category: "CRE Structural Stress",
        range: Some((-50.0, 20.0)),
        boolean: false,
        unit: "% change",
        data_source: "Moody's/RCA CPPI + Fed FSR",
        frequency: "Quarterly",
        instructions: "Enter the change from peak; use a negative number for declines (-28 = 28% below peak).",
        url: None,
        default: 0.0,
    },
];

const GROUPS: [&str; 5] = [
    "Hedge Fund Leverage",
    "Corporate Credit",
    "CRE Delinquency",
    "CRE Refinancing Cliff",
    "CRE Structural Stress",
];

fn text(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl Spec {
    fn metadata(&self) -> FieldMetadata {
        FieldMetadata {
            label: self.label.to_string(),
            description: text(self.description),
            category: text(self.category),
            min: self.range.map(|(min, _)| min),
            max: self.range.map(|(_, max)| max),
            step: None,
            unit: text(self.unit),
            value_type: self.boolean.then(|| "boolean".to_string()),
            data_source: text(self.data_source),
            frequency: text(self.frequency),
            instructions: text(self.instructions),
            url: self.url.map(str::to_string),
        }
    }
}

/// Field schema, category groups and default values
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    metadata: BTreeMap<String, FieldMetadata>,
    groups: Vec<(String, Vec<String>)>,
    defaults: BTreeMap<String, f64>,
}

impl FieldCatalog {
    pub fn empty() -> Self {
        Self {
            metadata: BTreeMap::new(),
            groups: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        let metadata = FIELDS.iter().map(|f| (f.name.to_string(), f.metadata())).collect();
        let defaults = FIELDS.iter().map(|f| (f.name.to_string(), f.default)).collect();
        let groups = GROUPS
            .iter()
            .map(|group| {
                let names = FIELDS
                    .iter()
                    .filter(|f| f.category == *group)
                    .map(|f| f.name.to_string())
                    .collect();
                (group.to_string(), names)
            })
            .collect();

        Self { metadata, groups, defaults }
    }

    pub fn metadata(&self) -> &BTreeMap<String, FieldMetadata> {
        &self.metadata
    }

    /// Category groups in display order
    pub fn groups(&self) -> &[(String, Vec<String>)] {
        &self.groups
    }

    pub fn default_value(&self, name: &str) -> Option<f64> {
        self.defaults.get(name).copied()
    }

    /// Schema-only field carrying the default value
    pub fn field(&self, name: &str) -> Option<ManualInputField> {
        let metadata = self.metadata.get(name)?;
        let category = self
            .groups
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(group, _)| group.as_str())
            .or(metadata.category.as_deref())
            .unwrap_or("Uncategorized");
        let field = ManualInputField::from_metadata(name, metadata, category);
        let value = self.default_value(name).unwrap_or(field.value);
        Some(field.with_value(value, None))
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// State as the backend would report it before any edit
    pub fn default_state(&self) -> ManualInputsState {
        ManualInputsState {
            values: self.defaults.clone(),
            metadata: self.metadata.clone(),
            categories: self.groups.iter().cloned().collect(),
            version: "2.0".to_string(),
            ..Default::default()
        }
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
