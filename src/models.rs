use crate::routing::RoutingScheme;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{Error as DeError, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_CURRENCY: &str = "ARS";

/// Result type for calls that return no meaningful body. Any JSON value
/// (object, `true`, a status string, `null`) is accepted and discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Empty {}

impl<'de> Deserialize<'de> for Empty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Empty {})
    }
}

/// Amount paired with its ISO currency code.
///
/// Outgoing amounts are rounded half away from zero to two decimal places
/// and serialized as fixed-point strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyValue {
    pub currency: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: Decimal,
}

impl MoneyValue {
    pub fn new(currency: impl Into<String>, amount: Decimal) -> Self {
        Self {
            currency: currency.into(),
            amount,
        }
    }
}

impl fmt::Display for MoneyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, format_amount(self.amount))
    }
}

/// Render an amount with exactly two decimal places (`1000` → `"1000.00"`).
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

fn serialize_amount<S>(amount: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_amount(*amount))
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(*ts))
}

pub(crate) fn serialize_date<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&date.format("%Y-%m-%d"))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| D::Error::custom("invalid date value"))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(0..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRouting {
    pub scheme: RoutingScheme,
    pub address: String,
}

impl AccountRouting {
    /// Routing for a numeric address, scheme picked by
    /// [`crate::routing::detect_scheme`].
    pub fn detect(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            scheme: crate::routing::detect_scheme(&address),
            address,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub bank_id: String,
    #[serde(default)]
    pub account_routings: Vec<AccountRouting>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub id_owner: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountDetail {
    #[serde(flatten)]
    pub account: Account,
    pub number: String,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub product_code: String,
    pub balance: MoneyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BalanceType {
    Available,
    Current,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    #[serde(rename = "type")]
    pub balance_type: BalanceType,
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankAccountRef {
    pub bank_id: String,
    #[serde(alias = "id")]
    pub account_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Holder {
    pub name: String,
    #[serde(default)]
    pub is_alias: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankRouting {
    pub scheme: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Counterparty {
    pub holder: Holder,
    #[serde(default)]
    pub account_routings: Vec<AccountRouting>,
    #[serde(default)]
    pub bank_routing: Option<BankRouting>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDetails {
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub description: String,
    pub posted: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    pub value: MoneyValue,
    #[serde(default)]
    pub new_balance: Option<MoneyValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub this_account: BankAccountRef,
    pub other_account: Counterparty,
    pub details: TransactionDetails,
}

/// Paging and date filters for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            from_date: None,
            to_date: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub from_account_id: String,
    /// Destination CBU or CVU.
    pub to_address: String,
    pub amount: Decimal,
    pub description: String,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingTarget {
    pub account_routing: AccountRouting,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferResponse {
    pub transaction_id: String,
    pub status: String,
    pub from: BankAccountRef,
    pub to: RoutingTarget,
    pub value: MoneyValue,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebinRequest {
    pub account_id: String,
    /// Payer CBU or CVU.
    pub from_address: String,
    pub amount: Decimal,
    pub description: String,
    pub expiration: DateTime<Utc>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebinStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Debin {
    pub debin_id: String,
    pub status: DebinStatus,
    pub from: RoutingTarget,
    pub to: BankAccountRef,
    pub value: MoneyValue,
    #[serde(default)]
    pub description: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EcheqType {
    /// Payable on presentation.
    #[default]
    Comun,
    /// Post-dated.
    Diferido,
    Certificado,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EcheqRequest {
    pub account_id: String,
    pub beneficiary_cuit: String,
    pub beneficiary_name: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub echeq_type: Option<EcheqType>,
    pub concept: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub cuit: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Echeq {
    pub echeq_id: String,
    pub echeq_number: String,
    pub status: String,
    pub issuer: Party,
    pub beneficiary: Party,
    pub value: MoneyValue,
    #[serde(deserialize_with = "deserialize_date")]
    pub issue_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub payment_date: NaiveDate,
    #[serde(rename = "type")]
    pub echeq_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcheqRole {
    Issuer,
    Beneficiary,
}

impl fmt::Display for EcheqRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            EcheqRole::Issuer => "ISSUER",
            EcheqRole::Beneficiary => "BENEFICIARY",
        };
        f.write_str(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EcheqFilter {
    pub status: Option<String>,
    pub role: Option<EcheqRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountHolder {
    pub name: String,
    pub cuit: String,
    #[serde(default)]
    pub cuit_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankInfo {
    pub code: String,
    pub name: String,
}

/// Outcome of a CBU/CVU lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingValidation {
    pub valid: bool,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub holder: Option<AccountHolder>,
    #[serde(default)]
    pub bank: Option<BankInfo>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cvu {
    pub cvu: String,
    pub alias: String,
    pub holder_cuit: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
}
