//! Endpoint mapping for the banking operations. Every method shapes a
//! path and payload and hands it to [`Client::execute`].

use crate::client::Client;
use crate::error::BindError;
use crate::models::{
    self, Account, AccountDetail, AccountRouting, Balance, Cvu, DEFAULT_CURRENCY, Debin,
    DebinRequest, Echeq, EcheqFilter, EcheqRequest, EcheqType, Empty, MoneyValue, Party,
    RoutingValidation, Transaction, TransactionQuery, TransferRequest, TransferResponse,
};
use crate::routing::detect_scheme;
use crate::transport::{ApiCall, QueryParams, path_segment};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const BANK_ID: &str = "bind.322.ar";
pub const API_VERSION: &str = "v4.0.0";

const SANDBOX_CHALLENGE: &str = "SANDBOX_TAN";
const ONE_TIME_RECURRENCE: &str = "ONE_TIME";

fn api_path(rest: &str) -> String {
    format!("/obp/{API_VERSION}{rest}")
}

/// Read-only view of one of the user's accounts.
fn my_account_path(account_id: &str, rest: &str) -> Result<String, BindError> {
    let account_id = path_segment(account_id)?;
    Ok(api_path(&format!("/my/banks/{BANK_ID}/accounts/{account_id}{rest}")))
}

/// Operations performed on behalf of one of the user's accounts.
fn account_path(account_id: &str, rest: &str) -> Result<String, BindError> {
    let account_id = path_segment(account_id)?;
    Ok(api_path(&format!("/banks/{BANK_ID}/accounts/{account_id}{rest}")))
}

fn money(amount: rust_decimal::Decimal, currency: Option<&str>) -> MoneyValue {
    MoneyValue::new(currency.unwrap_or(DEFAULT_CURRENCY), amount)
}

#[derive(Deserialize)]
struct AccountsEnvelope {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct BalancesEnvelope {
    #[serde(default)]
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct TransactionsEnvelope {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct EcheqsEnvelope {
    #[serde(default)]
    echeqs: Vec<Echeq>,
}

#[derive(Deserialize)]
struct CvusEnvelope {
    #[serde(default)]
    cvus: Vec<Cvu>,
}

#[derive(Serialize)]
struct RoutedParty {
    account_routing: AccountRouting,
}

#[derive(Serialize)]
struct TransferPayload<'a> {
    to: RoutedParty,
    value: MoneyValue,
    description: &'a str,
    challenge_type: &'static str,
}

#[derive(Serialize)]
struct DebinPayload<'a> {
    from: RoutedParty,
    value: MoneyValue,
    description: &'a str,
    #[serde(serialize_with = "models::serialize_timestamp")]
    expiration: DateTime<Utc>,
    recurrence: &'static str,
}

#[derive(Serialize)]
struct EcheqPayload<'a> {
    beneficiary: Party,
    value: MoneyValue,
    #[serde(serialize_with = "models::serialize_date")]
    payment_date: NaiveDate,
    #[serde(rename = "type")]
    echeq_type: EcheqType,
    concept: &'a str,
}

#[derive(Serialize)]
struct DepositPayload<'a> {
    echeq_id: &'a str,
    endorsement: bool,
}

#[derive(Serialize)]
struct EndorsePayload {
    new_beneficiary: Party,
}

#[derive(Serialize)]
struct CvuPayload<'a> {
    alias: &'a str,
    holder_cuit: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
}

impl Client {
    /// List the user's accounts.
    pub async fn get_accounts(&self) -> Result<Vec<Account>, BindError> {
        debug!("Fetching accounts");
        let envelope: AccountsEnvelope = self
            .execute(ApiCall::get(api_path("/my/accounts")))
            .await?;
        Ok(envelope.accounts)
    }

    pub async fn get_account_detail(&self, account_id: &str) -> Result<AccountDetail, BindError> {
        debug!("Fetching detail of account {account_id}");
        self.execute(ApiCall::get(my_account_path(account_id, "/account")?))
            .await
    }

    pub async fn get_balance(&self, account_id: &str) -> Result<Vec<Balance>, BindError> {
        debug!("Fetching balances of account {account_id}");
        let envelope: BalancesEnvelope = self
            .execute(ApiCall::get(my_account_path(account_id, "/balances")?))
            .await?;
        Ok(envelope.balances)
    }

    /// List transactions, newest first as returned by the API.
    pub async fn get_transactions(
        &self,
        account_id: &str,
        query: TransactionQuery,
    ) -> Result<Vec<Transaction>, BindError> {
        let mut params = QueryParams::new()
            .with("limit", query.limit)
            .with("offset", query.offset);
        params.push_opt("from_date", query.from_date.map(models::format_timestamp));
        params.push_opt("to_date", query.to_date.map(models::format_timestamp));

        debug!(
            "Fetching transactions of account {account_id} (limit={}, offset={})",
            query.limit, query.offset
        );
        let envelope: TransactionsEnvelope = self
            .execute(ApiCall::get(my_account_path(account_id, "/transactions")?).query(params))
            .await?;
        Ok(envelope.transactions)
    }

    /// Transfer to a CBU or CVU.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferResponse, BindError> {
        let payload = TransferPayload {
            to: RoutedParty {
                account_routing: AccountRouting::detect(request.to_address.as_str()),
            },
            value: money(request.amount, request.currency.as_deref()),
            description: &request.description,
            challenge_type: SANDBOX_CHALLENGE,
        };
        info!(
            "Transferring {} from account {} to {} {}",
            payload.value,
            request.from_account_id,
            payload.to.account_routing.scheme,
            request.to_address
        );
        let call = ApiCall::post(account_path(&request.from_account_id, "/transfer-to-account")?)
            .json(&payload)?;
        self.execute(call).await
    }

    /// Create an instant-debit (DEBIN) request against the payer's account.
    pub async fn create_debin(&self, request: &DebinRequest) -> Result<Debin, BindError> {
        let payload = DebinPayload {
            from: RoutedParty {
                account_routing: AccountRouting::detect(request.from_address.as_str()),
            },
            value: money(request.amount, request.currency.as_deref()),
            description: &request.description,
            expiration: request.expiration,
            recurrence: ONE_TIME_RECURRENCE,
        };
        info!(
            "Requesting DEBIN of {} from {} into account {}",
            payload.value, request.from_address, request.account_id
        );
        let call = ApiCall::post(account_path(&request.account_id, "/debin")?).json(&payload)?;
        self.execute(call).await
    }

    pub async fn get_debin_status(&self, account_id: &str, debin_id: &str) -> Result<Debin, BindError> {
        debug!("Fetching DEBIN {debin_id} of account {account_id}");
        let path = account_path(account_id, &format!("/debin/{}", path_segment(debin_id)?))?;
        self.execute(ApiCall::get(path)).await
    }

    /// Cancel a pending DEBIN.
    pub async fn cancel_debin(&self, account_id: &str, debin_id: &str) -> Result<(), BindError> {
        info!("Cancelling DEBIN {debin_id} of account {account_id}");
        let path = account_path(account_id, &format!("/debin/{}", path_segment(debin_id)?))?;
        let _: Empty = self.execute(ApiCall::delete(path)).await?;
        Ok(())
    }

    /// Issue an electronic check.
    pub async fn issue_echeq(&self, request: &EcheqRequest) -> Result<Echeq, BindError> {
        let payload = EcheqPayload {
            beneficiary: Party {
                cuit: request.beneficiary_cuit.clone(),
                name: request.beneficiary_name.clone(),
            },
            value: money(request.amount, request.currency.as_deref()),
            payment_date: request.payment_date,
            echeq_type: request.echeq_type.unwrap_or_default(),
            concept: request.concept.as_deref().unwrap_or(""),
        };
        info!(
            "Issuing eCheq of {} to {} payable {}",
            payload.value, request.beneficiary_cuit, request.payment_date
        );
        let call = ApiCall::post(account_path(&request.account_id, "/echeq/issue")?).json(&payload)?;
        self.execute(call).await
    }

    /// Deposit a received electronic check.
    pub async fn deposit_echeq(
        &self,
        account_id: &str,
        echeq_id: &str,
        endorsement: bool,
    ) -> Result<Echeq, BindError> {
        info!("Depositing eCheq {echeq_id} into account {account_id}");
        let call = ApiCall::post(account_path(account_id, "/echeq/deposit")?).json(&DepositPayload {
            echeq_id,
            endorsement,
        })?;
        self.execute(call).await
    }

    /// Endorse an electronic check to a new beneficiary.
    pub async fn endorse_echeq(
        &self,
        account_id: &str,
        echeq_id: &str,
        new_beneficiary_cuit: &str,
        new_beneficiary_name: &str,
    ) -> Result<Echeq, BindError> {
        info!("Endorsing eCheq {echeq_id} to {new_beneficiary_cuit}");
        let payload = EndorsePayload {
            new_beneficiary: Party {
                cuit: new_beneficiary_cuit.to_string(),
                name: new_beneficiary_name.to_string(),
            },
        };
        let path = account_path(
            account_id,
            &format!("/echeq/{}/endorse", path_segment(echeq_id)?),
        )?;
        let call = ApiCall::post(path).json(&payload)?;
        self.execute(call).await
    }

    pub async fn get_echeqs(
        &self,
        account_id: &str,
        filter: &EcheqFilter,
    ) -> Result<Vec<Echeq>, BindError> {
        let mut params = QueryParams::new();
        params.push_opt("status", filter.status.as_deref());
        params.push_opt("role", filter.role);

        debug!("Fetching eCheqs of account {account_id}");
        let envelope: EcheqsEnvelope = self
            .execute(ApiCall::get(account_path(account_id, "/echeq")?).query(params))
            .await?;
        Ok(envelope.echeqs)
    }

    /// Look up a CBU or CVU and return holder and bank information.
    pub async fn validate_routing(&self, address: &str) -> Result<RoutingValidation, BindError> {
        let scheme = detect_scheme(address);
        debug!("Validating {scheme} {address}");
        let params = QueryParams::new()
            .with("scheme", scheme)
            .with("address", address);
        self.execute(ApiCall::get(api_path("/banks/validate-account-routing")).query(params))
            .await
    }

    /// Create a virtual account (CVU) linked to the account.
    pub async fn create_cvu(
        &self,
        account_id: &str,
        alias: &str,
        holder_cuit: &str,
        reference: Option<&str>,
    ) -> Result<Cvu, BindError> {
        info!("Creating CVU '{alias}' for account {account_id}");
        let call = ApiCall::post(account_path(account_id, "/cvu")?).json(&CvuPayload {
            alias,
            holder_cuit,
            reference,
        })?;
        self.execute(call).await
    }

    pub async fn get_cvus(&self, account_id: &str) -> Result<Vec<Cvu>, BindError> {
        debug!("Fetching CVUs of account {account_id}");
        let envelope: CvusEnvelope = self
            .execute(ApiCall::get(account_path(account_id, "/cvu")?))
            .await?;
        Ok(envelope.cvus)
    }

    pub async fn deactivate_cvu(&self, account_id: &str, cvu: &str) -> Result<(), BindError> {
        info!("Deactivating CVU {cvu} of account {account_id}");
        let path = account_path(account_id, &format!("/cvu/{}", path_segment(cvu)?))?;
        let _: Empty = self.execute(ApiCall::delete(path)).await?;
        Ok(())
    }
}
