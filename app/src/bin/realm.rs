use std::path::PathBuf;

use anyhow::Result;
use app::{config::load_config, parse_filter, parse_kind, Client};
use clap::{Parser, Subcommand};
use realm::{parse_amount, Action, Credentials};
use realm_core::ItemId;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "realm", about = "Command line client for the realm game backend")]
struct Cli {
    /// Config file; created with a generated secret when missing.
    #[arg(long, global = true, default_value = "realm.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stores tokens issued by the login flow.
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        user_id: String,
    },
    Logout,
    /// Shows the current player and balances.
    Player,
    /// Lists a collection, e.g. `inventory` or `buy-requests`.
    List {
        kind: String,
        #[arg(long, short, default_value = "")]
        query: String,
        /// Repeatable, e.g. `--filter value>=50`.
        #[arg(long = "filter", short)]
        filters: Vec<String>,
    },
    Wear { item_id: String },
    Unwear { item_id: String },
    Sell { item_id: String, amount: String },
    Throw { item_id: String, amount: String },
    /// Sells every inventory stack matching the query.
    SellMatching { query: String },
    Bid { lot_id: String, amount: String },
    Buyout { lot_id: String },
    Bids { lot_id: String },
    Rate,
    BirzhaBuy { amount: String },
    BirzhaSell { amount: String },
    SellToRequest { request_id: String, amount: String },
    CancelRequest { request_id: String },
    Collect { entry_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config).await?;
    info!(base_url = %cfg.client.http.base_url, "realm client starting");
    let client = Client::connect(cfg).await?;

    match cli.command {
        Command::Login {
            token,
            refresh_token,
            user_id,
        } => {
            client
                .login(Credentials {
                    access_token: token,
                    refresh_token,
                    user_id: Some(ItemId::from_key(&user_id)),
                })
                .await?;
            client.show_player().await
        }
        Command::Logout => {
            client.logout().await;
            Ok(())
        }
        Command::Player => client.show_player().await,
        Command::List {
            kind,
            query,
            filters,
        } => {
            let kind = parse_kind(&kind)?;
            let filters = filters
                .iter()
                .map(|f| parse_filter(f))
                .collect::<Result<Vec<_>>>()?;
            client.list(kind, &query, filters).await
        }
        Command::Wear { item_id } => {
            client
                .perform(Action::WearItem {
                    item_id: ItemId::from_key(&item_id),
                })
                .await
        }
        Command::Unwear { item_id } => {
            client
                .perform(Action::UnwearItem {
                    item_id: ItemId::from_key(&item_id),
                })
                .await
        }
        Command::Sell { item_id, amount } => {
            client
                .perform(Action::SellItem {
                    item_id: ItemId::from_key(&item_id),
                    amount: parse_amount("amount", &amount)?,
                })
                .await
        }
        Command::Throw { item_id, amount } => {
            client
                .perform(Action::ThrowItem {
                    item_id: ItemId::from_key(&item_id),
                    amount: parse_amount("amount", &amount)?,
                })
                .await
        }
        Command::SellMatching { query } => client.sell_matching(&query).await,
        Command::Bid { lot_id, amount } => {
            client
                .perform(Action::PlaceBid {
                    lot_id: ItemId::from_key(&lot_id),
                    amount: parse_amount("amount", &amount)?,
                })
                .await
        }
        Command::Buyout { lot_id } => {
            let action = client.buyout_action(ItemId::from_key(&lot_id)).await?;
            client.perform(action).await
        }
        Command::Bids { lot_id } => client.bid_history(&ItemId::from_key(&lot_id)).await,
        Command::Rate => client.rate().await,
        Command::BirzhaBuy { amount } => {
            let action = client
                .birzha_buy_action(parse_amount("amount", &amount)?)
                .await?;
            client.perform(action).await
        }
        Command::BirzhaSell { amount } => {
            client
                .perform(Action::BirzhaSell {
                    amount: parse_amount("amount", &amount)?,
                })
                .await
        }
        Command::SellToRequest { request_id, amount } => {
            let action = client
                .sell_to_request_action(
                    ItemId::from_key(&request_id),
                    parse_amount("amount", &amount)?,
                )
                .await?;
            client.perform(action).await
        }
        Command::CancelRequest { request_id } => {
            client
                .perform(Action::CancelBuyRequest {
                    request_id: ItemId::from_key(&request_id),
                })
                .await
        }
        Command::Collect { entry_id } => {
            client
                .perform(Action::CollectStorage {
                    entry_id: ItemId::from_key(&entry_id),
                })
                .await
        }
    }
}
