//! `leavectl`, operator tool for the leave ledger.
//!
//! Admin balance work (adjustments, carryover) and read-only views over a
//! local sled database. Output is JSON.
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use leave_ledger::accrual::calculate_accrual_reference;
use leave_ledger::config::Config;
use leave_ledger::directory::{Role, UserUpdate};
use leave_ledger::identity::Identity;
use leave_ledger::notify::{EmailApiSender, Notifier, SEND_TIMEOUT};
use leave_ledger::request::LeaveType;
use leave_ledger::service::{BalanceCorrection, LeaveService};
use leave_ledger::store::Store;
use leave_ledger::telemetry;

#[derive(Parser, Debug)]
#[command(name = "leavectl", about = "Leave ledger operator tool")]
struct Cli {
    /// Uid of the acting user. Admin commands check this account.
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Monthly accrual reference for an annual entitlement.
    Accrual {
        #[arg(long)]
        annual_minutes: i64,
        #[arg(long)]
        join_month: i64,
        #[arg(long)]
        current_month: i64,
    },

    /// Current balance of one ledger.
    Balance {
        user: String,
        #[arg(long, default_value = "annual")]
        leave_type: LeaveType,
        #[arg(long)]
        year: i32,
        /// Also re-derive the balance from its adjustments.
        #[arg(long)]
        verify: bool,
    },

    /// Adjustment history of one ledger.
    Adjustments {
        user: String,
        #[arg(long, default_value = "annual")]
        leave_type: LeaveType,
        #[arg(long)]
        year: i32,
    },

    /// Apply a signed balance correction (admin).
    Adjust {
        user: String,
        #[arg(long, default_value = "annual")]
        leave_type: LeaveType,
        #[arg(long)]
        year: i32,
        #[arg(long, allow_hyphen_values = true)]
        delta_minutes: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        reference: Option<String>,
    },

    /// Carry one user's balance into the next year (admin).
    Carryover {
        user: String,
        #[arg(long, default_value = "annual")]
        leave_type: LeaveType,
        #[arg(long)]
        from_year: i32,
        #[arg(long)]
        to_year: i32,
    },

    /// Carry every balance of a year into the next (admin).
    CarryoverAll {
        #[arg(long)]
        from_year: i32,
        #[arg(long)]
        to_year: i32,
    },

    /// Create or promote a whitelisted admin account. Writes the store
    /// directly, for setting up a fresh database.
    BootstrapAdmin {
        uid: String,
        #[arg(long)]
        email: String,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    if let Commands::Accrual {
        annual_minutes,
        join_month,
        current_month,
    } = cli.command
    {
        let reference = calculate_accrual_reference(annual_minutes, join_month, current_month);
        return print(json!({
            "monthly_rate_minutes": reference.monthly_rate_minutes,
            "months_since_join": reference.months_since_join,
            "entitlement_minutes": reference.entitlement_minutes,
            "is_valid": reference.is_valid,
        }));
    }

    let config = Config::from_env().context("invalid configuration")?;
    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let notifier = match config.email.clone() {
        Some(settings) => Notifier::new(Arc::new(EmailApiSender::new(settings)?)),
        None => Notifier::disabled(),
    };
    let service =
        LeaveService::new(store.clone(), notifier.clone()).with_accounting(config.accounting);

    let actor = || -> anyhow::Result<Identity> {
        let uid = cli.actor.as_deref().context("--actor is required for this command")?;
        Ok(Identity::new(uid, ""))
    };

    let outcome = match &cli.command {
        Commands::Accrual { .. } => Ok(()),

        Commands::Balance {
            user,
            leave_type,
            year,
            verify,
        } => {
            let balance = service.get_balance(user, *leave_type, *year)?;
            let mut out = json!({
                "user": user,
                "leave_type": leave_type.as_str(),
                "year": year,
                "balance_minutes": balance,
            });
            if *verify {
                let derived = service.recompute_balance(user, *leave_type, *year)?;
                out["derived_minutes"] = json!(derived);
                out["consistent"] = json!(derived == balance);
            }
            print(out)
        }

        Commands::Adjustments {
            user,
            leave_type,
            year,
        } => {
            let rows: Vec<_> = service
                .list_adjustments(user, *leave_type, *year)?
                .into_iter()
                .map(|a| {
                    json!({
                        "id": a.id,
                        "delta_minutes": a.delta_minutes,
                        "reason": a.reason,
                        "reference": a.reference,
                        "actor": a.actor_uid,
                        "source": format!("{:?}", a.source).to_uppercase(),
                        "created_at": a.created_at.to_datetime_utc().to_rfc3339(),
                    })
                })
                .collect();
            print(json!(rows))
        }

        Commands::Adjust {
            user,
            leave_type,
            year,
            delta_minutes,
            reason,
            reference,
        } => {
            let correction = BalanceCorrection {
                user_id: user.clone(),
                leave_type: *leave_type,
                year: *year,
                delta_minutes: *delta_minutes,
                reason: reason.clone(),
                reference: reference.clone(),
            };
            let balance = service.adjust_leave_balance(&actor()?, &correction)?;
            print(json!({ "balance_minutes": balance }))
        }

        Commands::Carryover {
            user,
            leave_type,
            from_year,
            to_year,
        } => {
            let outcome = service.carryover_leave_balance(
                &actor()?,
                user,
                *leave_type,
                *from_year,
                *to_year,
            )?;
            print(json!({
                "carried": outcome.carried,
                "amount_minutes": outcome.amount_minutes,
                "new_balance_minutes": outcome.new_balance_minutes,
            }))
        }

        Commands::CarryoverAll { from_year, to_year } => {
            let summary = service.carryover_all(&actor()?, *from_year, *to_year)?;
            print(json!({
                "carried": summary.carried,
                "skipped": summary.skipped,
                "failed": summary.failed,
            }))
        }

        Commands::BootstrapAdmin { uid, email } => {
            let mut profile = service.register_user(&Identity::new(uid.as_str(), email.as_str()))?;
            UserUpdate::new()
                .set_whitelisted(true)
                .set_role(Role::Admin)
                .apply_to(&mut profile)?;
            store.put_user(&profile)?;
            store.flush()?;
            tracing::info!(uid = %profile.uid, "admin bootstrapped");
            print(json!({ "uid": profile.uid, "role": profile.role.as_str() }))
        }
    };

    // sends run on detached threads; exiting now would cut them off
    notifier.drain(SEND_TIMEOUT);
    outcome
}

fn print(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
