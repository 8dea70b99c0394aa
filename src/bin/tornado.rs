//! Command-line client for a single mixer instance.
//!
//! Run with:
//!   cargo run --bin tornado -- --config tornado.toml deposit
//!   cargo run --bin tornado -- --config tornado.toml withdraw --note <note> --recipient <address>
//!   cargo run --bin tornado -- inspect --note <note>

use std::{
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::{
    Address,
    U256,
    utils::parse_ether,
};
use anyhow::{
    Context,
    Result,
    bail,
};
use clap::{
    Parser,
    Subcommand,
};
use tracing::{
    debug,
    info,
};

use tornado_client::{
    adapters::{
        ethereum_rpc::EthereumRpc,
        snarkjs_prover::SnarkjsProver,
    },
    config::TornadoConfig,
    domain::{
        note::Note,
        witness::WithdrawParams,
    },
    withdrawal::{
        CancelSignal,
        Tornado,
        WithdrawalOutcome,
    },
};

#[derive(Parser)]
#[command(name = "tornado", about = "Deposit into and withdraw from a mixer instance")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./tornado.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deposit the configured denomination and print the note.
    Deposit,

    /// Withdraw a note to a recipient.
    Withdraw {
        #[arg(long)]
        note: String,
        #[arg(long)]
        recipient: Address,
        /// Native currency forwarded to the recipient (token instances only), in ether.
        #[arg(long)]
        refund: Option<String>,
        #[arg(long, requires = "fee")]
        relayer: Option<Address>,
        /// Relayer fee in units of the instance's asset (scaled by `instance.decimals`).
        #[arg(long, requires = "relayer")]
        fee: Option<String>,
    },

    /// Print a note's commitment and nullifier hash. Offline.
    Inspect {
        #[arg(long)]
        note: String,
    },

    /// Generate a note without depositing it. Offline.
    NewNote {
        #[arg(long, default_value = "eth")]
        currency: String,
        #[arg(long, default_value = "0.1")]
        amount: String,
        #[arg(long, default_value_t = 1)]
        network_id: u64,
    },
}

fn parse_refund(value: Option<&str>) -> Result<U256> {
    match value {
        Some(v) => parse_ether(v).with_context(|| format!("invalid refund `{v}`")),
        None => Ok(U256::ZERO),
    }
}

/// Connect to the instance and check its denomination against the config.
async fn client(config: &TornadoConfig) -> Result<Tornado<EthereumRpc, SnarkjsProver>> {
    let ledger = EthereumRpc::new(
        &config.network.rpc_url,
        config.network.private_key.as_deref(),
        config.instance.address,
    )?;
    let instance = config.instance_config()?;
    instance.verify_denomination(ledger.denomination().await?)?;

    let prover = SnarkjsProver::from_config(&config.prover);
    Ok(Tornado::new(ledger, prover, instance))
}

/// Pool and sender balances, logged around a deposit.
async fn log_balances(ledger: &EthereumRpc, when: &str) {
    let pool = ledger.instance_address();
    match ledger.balance(pool).await {
        Ok(balance) => debug!(%pool, %balance, when, "instance balance"),
        Err(err) => debug!(%pool, %err, when, "instance balance unavailable"),
    }
    if let Some(sender) = ledger.signer_address() {
        match ledger.balance(sender).await {
            Ok(balance) => debug!(%sender, %balance, when, "sender balance"),
            Err(err) => debug!(%sender, %err, when, "sender balance unavailable"),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Inspect { note } => {
            let note = Note::decode(&note)?;
            println!("currency:       {}", note.currency());
            println!("amount:         {}", note.amount());
            println!("network id:     {}", note.network_id());
            println!("commitment:     {}", note.commitment());
            println!("nullifier hash: {}", note.nullifier_hash());
        }

        Command::NewNote {
            currency,
            amount,
            network_id,
        } => {
            let note = Note::random(currency, amount, network_id)?;
            println!("{note}");
        }

        Command::Deposit => {
            let config = TornadoConfig::load(&args.config)?;
            let tornado = client(&config).await?;
            let instance = tornado.instance();
            let note = tornado.new_note(&instance.currency, &instance.amount)?;

            // Must be printed before the transaction is sent.
            println!("Your note: {note}");
            log_balances(tornado.ledger(), "before").await;
            let deposit = tornado.submit_deposit(note).await?;
            log_balances(tornado.ledger(), "after").await;

            info!(
                tx_hash = %deposit.receipt.tx_hash,
                leaf_index = ?deposit.leaf_index,
                "deposit mined"
            );
        }

        Command::Withdraw {
            note,
            recipient,
            refund,
            relayer,
            fee,
        } => {
            let config = TornadoConfig::load(&args.config)?;
            let tornado = client(&config).await?;

            let mut params =
                WithdrawParams::new(recipient).with_refund(parse_refund(refund.as_deref())?);
            if let (Some(relayer), Some(fee)) = (relayer, fee.as_deref()) {
                let fee = config
                    .parse_asset_amount(fee)
                    .with_context(|| format!("invalid fee `{fee}`"))?;
                params = params.with_relayer(relayer, fee);
            }

            let cancel = Arc::new(CancelSignal::new());
            let on_ctrl_c = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("cancellation requested");
                    on_ctrl_c.cancel();
                }
            });

            match tornado.withdraw(&note, params, &cancel).await {
                WithdrawalOutcome::Confirmed { receipt, .. } => {
                    println!("withdrawn in tx {:#x}", receipt.tx_hash);
                }
                WithdrawalOutcome::Rejected { failed_at, reason } => {
                    let stage = failed_at.map_or("parse".to_string(), |s| s.to_string());
                    bail!("withdrawal rejected after {stage}: {reason}");
                }
            }
        }
    }

    Ok(())
}
