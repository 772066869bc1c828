use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use super::{ClientCommand, Commands, ShellCommand, ShellLine, StakeArgs};
use crate::account::Account;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::host::LedgerHost;
use crate::ledger::{DistributionAmount, LedgerEngine, Recipients};
use crate::scheduler::SchedulerSummary;
use crate::session::EndReason;

pub async fn dispatch(
    command: Commands,
    engine: Arc<LedgerEngine>,
    config: &LedgerConfig,
    json: bool,
) -> Result<(), LedgerError> {
    match command {
        Commands::RunWorker { interval_ms } => run_worker(engine, config, interval_ms).await,
        Commands::Interactive => interactive(engine, config, json).await,
        Commands::Stake(args) => {
            let host = LedgerHost::start(engine, &config.scheduler).await?;
            let res = stake(&host, &args, json).await;
            report_stopped(host.shutdown().await);
            res
        }
        Commands::Client(command) => run_client(command, &engine, config, json),
    }
}

/// Runs one operation that needs no ticks of its own.
pub fn run_client(
    command: ClientCommand,
    engine: &LedgerEngine,
    config: &LedgerConfig,
    json: bool,
) -> Result<(), LedgerError> {
    match command {
        ClientCommand::CreateAccount {
            name,
            initial_seconds,
            admin,
        } => {
            let initial = initial_seconds.unwrap_or(config.accounts.default_initial_seconds);
            let account = engine.create_account(&name, initial, admin)?;
            emit(json, &account, || {
                println!("Created '{}' (id {}) with {}s", account.name, account.id, account.balance)
            });
            Ok(())
        }
        ClientCommand::Transfer { from, to, amount } => {
            let from = engine.account_by_name(&from)?;
            let to = engine.account_by_name(&to)?;
            let receipt = engine.transfer(from.id, to.id, amount)?;
            emit(json, &receipt, || {
                println!(
                    "Transferred {}s from {} to {}. Balances: {}={}s, {}={}s",
                    amount, from.name, to.name, from.name, receipt.from_balance, to.name, receipt.to_balance
                )
            });
            Ok(())
        }
        ClientCommand::Balance { name } => {
            let account = engine.account_by_name(&name)?;
            emit(json, &account, || print_accounts(std::slice::from_ref(&account)));
            Ok(())
        }
        ClientCommand::List => {
            let accounts = engine.accounts()?;
            emit(json, &accounts, || print_accounts(&accounts));
            Ok(())
        }
        ClientCommand::Leaderboard { limit } => {
            let top = engine.leaderboard(limit)?;
            emit(json, &top, || print_accounts(&top));
            Ok(())
        }
        ClientCommand::Stats => {
            let stats = engine.statistics()?;
            emit(json, &stats, || {
                println!("Total accounts:      {}", stats.total_accounts);
                println!("Active accounts:     {}", stats.active_accounts);
                println!("Deactivated:         {}", stats.deactivated_accounts);
                println!("Total balances:      {}s", stats.total_balance_seconds);
                println!("Reserve:             {}s", stats.reserve_seconds);
            });
            Ok(())
        }
        ClientCommand::Reserve => {
            let total = engine.reserve_total()?;
            emit(json, &total, || println!("Reserve: {}s", total));
            Ok(())
        }
        ClientCommand::ReserveTransfer { admin, to, amount } => {
            let admin = engine.account_by_name(&admin)?;
            let to = engine.account_by_name(&to)?;
            let receipt = engine.transfer_from_reserve(admin.id, to.id, amount)?;
            emit(json, &receipt, || {
                println!(
                    "Moved {}s from the reserve to {}. Balance: {}s. Reserve remaining: {}s",
                    amount, to.name, receipt.to_balance, receipt.reserve_remaining
                )
            });
            Ok(())
        }
        ClientCommand::Distribute { admin, amount, to } => {
            let admin = engine.account_by_name(&admin)?;
            let amount = amount.map_or(DistributionAmount::Full, DistributionAmount::Exact);
            let recipients = if to.is_empty() {
                Recipients::AllActive
            } else {
                let ids = to
                    .iter()
                    .map(|name| engine.account_by_name(name).map(|a| a.id))
                    .collect::<Result<Vec<_>, _>>()?;
                Recipients::Accounts(ids)
            };
            let receipt = engine.distribute_reserve(admin.id, amount, recipients)?;
            emit(json, &receipt, || {
                println!(
                    "Distributed {}s to {} accounts ({}s each). Reserve remaining: {}s",
                    receipt.total_distributed,
                    receipt.recipients.len(),
                    receipt.per_recipient,
                    receipt.reserve_remaining
                )
            });
            Ok(())
        }
    }
}

async fn run_worker(
    engine: Arc<LedgerEngine>,
    config: &LedgerConfig,
    interval_ms: Option<u64>,
) -> Result<(), LedgerError> {
    let mut sched_config = config.scheduler.clone();
    if let Some(ms) = interval_ms {
        sched_config.tick_interval_ms = ms;
    }

    let host = LedgerHost::start(engine, &sched_config).await?;
    println!("Tick worker started. Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, stopping");
    }
    report_stopped(host.shutdown().await);
    Ok(())
}

/// Ticks in the background while reading commands from stdin, one per line.
async fn interactive(engine: Arc<LedgerEngine>, config: &LedgerConfig, json: bool) -> Result<(), LedgerError> {
    let host = LedgerHost::start(engine, &config.scheduler).await?;
    println!("Ledger running, ticking every {}ms.", config.scheduler.tick_interval_ms);
    println!("Type 'help' for commands, 'quit' to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let parsed = match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        let res = match parsed.command {
            ShellCommand::Quit => break,
            ShellCommand::Stake(args) => stake(&host, &args, json).await,
            ShellCommand::Client(command) => run_client(command, host.engine(), config, json),
        };
        if let Err(e) = res {
            println!("Error: {}", e);
        }
    }

    report_stopped(host.shutdown().await);
    Ok(())
}

async fn stake(host: &LedgerHost, args: &StakeArgs, json: bool) -> Result<(), LedgerError> {
    let account = host.engine().account_by_name(&args.name)?;
    let handle = host.sessions().start(account.id, args.amount).await?;
    println!("Session started. Staked {}s. Exiting early forfeits the stake.", args.amount);

    let mut progress = handle.progress();
    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            changed = progress.changed() => {
                if changed.is_err() {
                    break false;
                }
                let remaining = *progress.borrow();
                if remaining == 0 {
                    break false;
                }
                if remaining % 60 == 0 {
                    println!("Remaining: {}s", remaining);
                }
            }
        }
    };

    let outcome = if interrupted {
        handle.cancel().await?
    } else {
        handle.wait().await?
    };
    emit(json, &outcome.receipt, || match outcome.reason {
        EndReason::Completed => println!(
            "Session complete. Rewarded {}s. Balance: {}s",
            outcome.receipt.credited,
            outcome.balance()
        ),
        EndReason::Cancelled => println!("Session interrupted. Stake forfeited. Balance: {}s", outcome.balance()),
        EndReason::AccountDeactivated => {
            println!("Account was deactivated. Stake forfeited. Balance: {}s", outcome.balance())
        }
    });
    Ok(())
}

fn report_stopped(summary: SchedulerSummary) {
    info!(?summary, "Ticking stopped");
    println!(
        "Stopped after {} ticks ({} failed, {} skipped, {}s collected).",
        summary.ticks_run, summary.ticks_failed, summary.ticks_skipped, summary.seconds_collected
    );
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) {
    if !json {
        text();
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!(error = %e, "Failed to encode JSON output"),
    }
}

fn print_accounts(accounts: &[Account]) {
    println!("{:<6} {:<32} {:>14}  {:<11} {}", "ID", "Name", "Balance (s)", "Status", "Admin");
    for account in accounts {
        println!(
            "{:<6} {:<32} {:>14}  {:<11} {}",
            account.id,
            account.name,
            account.balance,
            if account.active { "active" } else { "deactivated" },
            if account.is_admin { "yes" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn test_client_commands_resolve_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::default();
        let engine = LedgerEngine::open_at(dir.path().join("ledger"), &config, Arc::new(SystemClock)).unwrap();

        for name in ["alice", "bob"] {
            let create = ClientCommand::CreateAccount {
                name: name.to_string(),
                initial_seconds: None,
                admin: false,
            };
            run_client(create, &engine, &config, true).unwrap();
        }
        let transfer = ClientCommand::Transfer {
            from: "alice".into(),
            to: "bob".into(),
            amount: 400,
        };
        run_client(transfer, &engine, &config, false).unwrap();

        assert_eq!(engine.account_by_name("alice").unwrap().balance, 86_000);
        assert_eq!(engine.account_by_name("bob").unwrap().balance, 86_800);

        let missing = ClientCommand::Balance { name: "carol".into() };
        assert_eq!(
            run_client(missing, &engine, &config, false),
            Err(LedgerError::AccountNameNotFound("carol".into()))
        );
    }
}
