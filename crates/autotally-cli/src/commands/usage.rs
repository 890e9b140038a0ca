//! Usage command - show the token ledger and run its administrative operations.

use clap::{Args, Subcommand};
use console::style;

use autotally_core::{Plan, QuotaLedger, UsageSnapshot};

use super::load_config;

/// Arguments for the usage command.
#[derive(Args)]
pub struct UsageArgs {
    #[command(subcommand)]
    command: UsageCommand,
}

#[derive(Subcommand)]
enum UsageCommand {
    /// Show usage for the current month
    Show {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the subscription plan
    SetPlan {
        /// bronze, gold or platinum
        plan: Plan,
    },

    /// Reset usage for the current month to zero
    Reset,
}

pub fn run(args: UsageArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let ledger = QuotaLedger::open(&config.quota);

    match args.command {
        UsageCommand::Show { json } => {
            let usage = ledger.snapshot()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&usage)?);
            } else {
                print_usage(&usage);
            }
        }
        UsageCommand::SetPlan { plan } => {
            let usage = ledger.set_plan(plan)?;
            println!("{} Plan set to {}", style("✓").green(), usage.plan);
            print_usage(&usage);
        }
        UsageCommand::Reset => {
            let usage = ledger.reset_usage()?;
            println!("{} Usage reset for {}", style("✓").green(), usage.period);
        }
    }

    Ok(())
}

fn print_usage(usage: &UsageSnapshot) {
    let percent = usage.percent_used();
    let used = format!("{} / {} tokens ({}%)", usage.used, usage.limit, percent);
    let used = match percent {
        100.. => style(used).red().bold(),
        75..=99 => style(used).red(),
        50..=74 => style(used).yellow(),
        _ => style(used).green(),
    };

    println!("Period:    {}", usage.period);
    println!("Plan:      {}", usage.plan);
    println!("Used:      {}", used);
    println!("Remaining: {}", usage.remaining);
}
