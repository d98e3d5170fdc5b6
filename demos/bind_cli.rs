use bindapi::{
    BindError, Client, ClientConfig, Credentials, EcheqFilter, EcheqRole, Environment,
    TransactionQuery,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;

#[derive(Debug, Parser)]
#[command(name = "bind-cli", about = "CLI wrapper for the BIND Open Banking API")]
struct Cli {
    /// Username; falls back to BIND_USERNAME env var
    #[arg(long, env = "BIND_USERNAME")]
    username: String,

    /// Password; falls back to BIND_PASSWORD env var
    #[arg(long, env = "BIND_PASSWORD", hide_env_values = true)]
    password: String,

    /// Consumer key; falls back to BIND_CONSUMER_KEY env var
    #[arg(long, env = "BIND_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: String,

    #[arg(long, env = "BIND_ENVIRONMENT", value_enum, default_value = "sandbox")]
    environment: Env,

    /// Request timeout in milliseconds
    #[arg(long, env = "BIND_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List accounts
    Accounts,
    /// Show account detail
    Account {
        #[arg(long)]
        id: String,
    },
    /// Show account balances
    Balance {
        #[arg(long)]
        id: String,
    },
    /// List recent transactions
    Transactions {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Validate a CBU or CVU
    Validate {
        #[arg(long)]
        address: String,
    },
    /// List virtual accounts (CVU)
    Cvus {
        #[arg(long)]
        id: String,
    },
    /// List eCheqs
    Echeqs {
        #[arg(long)]
        id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    /// Show the status of a DEBIN request
    DebinStatus {
        #[arg(long)]
        id: String,
        #[arg(long)]
        debin: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Env {
    Sandbox,
    Production,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Issuer,
    Beneficiary,
}

impl From<Env> for Environment {
    fn from(value: Env) -> Self {
        match value {
            Env::Sandbox => Environment::Sandbox,
            Env::Production => Environment::Production,
        }
    }
}

impl From<Role> for EcheqRole {
    fn from(value: Role) -> Self {
        match value {
            Role::Issuer => EcheqRole::Issuer,
            Role::Beneficiary => EcheqRole::Beneficiary,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = ClientConfig::new(Credentials::new(
        cli.username,
        cli.password,
        cli.consumer_key,
    ))
    .with_environment(cli.environment.into())
    .with_timeout_ms(cli.timeout_ms);
    let client = Client::new(config)?;

    if let Err(err) = run(&client, cli.command).await {
        report(&err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(client: &Client, command: Commands) -> Result<(), BindError> {
    match command {
        Commands::Accounts => {
            for account in client.get_accounts().await? {
                println!("{} | {} | {}", account.id, account.label, account.bank_id);
            }
        }
        Commands::Account { id } => {
            let detail = client.get_account_detail(&id).await?;
            println!("{} ({})", detail.account.label, detail.number);
            println!("Balance: {}", detail.balance);
            for owner in &detail.owners {
                println!("Owner: {}", owner.display_name);
            }
        }
        Commands::Balance { id } => {
            for balance in client.get_balance(&id).await? {
                println!("{:?}: {} {}", balance.balance_type, balance.currency, balance.amount);
            }
        }
        Commands::Transactions { id, limit, offset } => {
            let query = TransactionQuery {
                limit,
                offset,
                ..TransactionQuery::default()
            };
            let transactions = client.get_transactions(&id, query).await?;
            println!("Fetched {} transactions:", transactions.len());
            for txn in &transactions {
                println!(
                    "{} | {} | {} | {}",
                    txn.id, txn.details.posted, txn.details.value, txn.details.description
                );
            }
        }
        Commands::Validate { address } => {
            let validation = client.validate_routing(&address).await?;
            if validation.valid {
                if let Some(holder) = &validation.holder {
                    println!("Holder: {} ({})", holder.name, holder.cuit);
                }
                if let Some(bank) = &validation.bank {
                    println!("Bank: {} ({})", bank.name, bank.code);
                }
            } else {
                println!(
                    "Invalid address: {}",
                    validation.error.as_deref().unwrap_or("no reason given")
                );
            }
        }
        Commands::Cvus { id } => {
            for cvu in client.get_cvus(&id).await? {
                println!("{} | {} | {}", cvu.cvu, cvu.alias, cvu.status);
            }
        }
        Commands::Echeqs { id, status, role } => {
            let filter = EcheqFilter {
                status,
                role: role.map(Into::into),
            };
            for echeq in client.get_echeqs(&id, &filter).await? {
                println!(
                    "{} | {} | {} | due {}",
                    echeq.echeq_number, echeq.status, echeq.value, echeq.payment_date
                );
            }
        }
        Commands::DebinStatus { id, debin } => {
            let debin = client.get_debin_status(&id, &debin).await?;
            println!("{} | {:?} | {}", debin.debin_id, debin.status, debin.value);
        }
    }
    Ok(())
}

fn report(err: &BindError) {
    eprintln!("API error: {}", err.message());
    eprintln!("  Kind: {}", err.kind());
    eprintln!("  Code: {}", err.code());
    eprintln!("  Status: {}", err.status_code());
    if !err.details().is_empty() {
        eprintln!("  Details: {}", serde_json::Value::Object(err.details().clone()));
    }
}
