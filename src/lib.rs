//! Async Rust client for the BIND Open Banking REST API.
//!
//! Every call goes through one pipeline: the session manager makes sure a
//! `DirectLogin` token is valid, the transport sends the request under a
//! per-call timeout, and any failure comes back as a single [`BindError`]
//! carrying the HTTP status, a machine code and the remote details.
//!
//! ```no_run
//! use bindapi::{Client, ClientConfig, Credentials, Environment};
//!
//! # async fn run() -> Result<(), bindapi::BindError> {
//! let config = ClientConfig::new(Credentials::new("user", "password", "consumer-key"))
//!     .with_environment(Environment::Sandbox);
//! let client = Client::new(config)?;
//! for account in client.get_accounts().await? {
//!     println!("{}: {}", account.label, account.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod operations;
pub mod routing;
pub mod session;
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, Credentials, Environment};
pub use error::{BindError, ErrorKind, codes};
pub use models::{
    Account, AccountDetail, AccountRouting, Balance, BalanceType, Cvu, Debin, DebinRequest,
    DebinStatus, Echeq, EcheqFilter, EcheqRequest, EcheqRole, EcheqType, Empty, MoneyValue,
    RoutingValidation, Transaction, TransactionQuery, TransferRequest, TransferResponse,
};
pub use routing::{RoutingScheme, detect_scheme};
pub use session::Session;
pub use transport::{ApiCall, QueryParams};
