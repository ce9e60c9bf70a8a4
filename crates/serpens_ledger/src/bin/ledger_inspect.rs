//! # Ledger Inspector
//!
//! Command-line tool to print the contents of a ledger journal.
//!
//! The journal is only read unless `--compact` is given; a missing or
//! damaged file is reported, never created or repaired.

use serpens_ledger::{
    JournalReport, JournalStore, LedgerConfig, LedgerState, Money, Platform, StateStore,
    TransactionStatus,
};

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct InspectArgs {
    journal: String,
    config: Option<String>,
    compact: bool,
}

fn parse_args(args: &[String]) -> Result<InspectArgs, String> {
    let mut journal = None;
    let mut config = None;
    let mut compact = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--compact" => compact = true,
            "--config" => {
                let path = iter.next().ok_or("--config needs a file")?;
                config = Some(path.clone());
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            path => {
                if journal.replace(path.to_string()).is_some() {
                    return Err("only one journal path may be given".to_string());
                }
            }
        }
    }

    Ok(InspectArgs {
        journal: journal.ok_or("missing journal path")?,
        config,
        compact,
    })
}

fn print_usage() {
    println!("Usage: ledger_inspect <journal.sflg> [options]");
    println!();
    println!("Options:");
    println!("  --config <file.toml>  Use these fees when computing revenue");
    println!("  --compact             Rewrite the journal keeping only the latest snapshot");
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         SERPENS FORTUNA LEDGER INSPECTOR                         ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(e) => {
            println!("Error: {e}");
            println!();
            print_usage();
            return;
        }
    };

    let config = match &args.config {
        Some(path) => match LedgerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                println!("Error: {e}");
                return;
            }
        },
        None => LedgerConfig::default(),
    };

    println!("Loading journal: {}", args.journal);

    let mut report = match JournalStore::read_only(&args.journal) {
        Ok(report) => report,
        Err(e) => {
            println!("Error: Could not read journal: {e}");
            return;
        }
    };
    let state = report.state.take().unwrap_or_else(LedgerState::new);
    let platform = match Platform::from_state(state, config) {
        Ok(platform) => platform,
        Err(e) => {
            println!("Error: Could not load ledger: {e}");
            return;
        }
    };

    print_journal(&report, platform.state());
    print_ledger(&platform);

    if args.compact {
        compact(&args.journal);
    }
}

fn print_journal(report: &JournalReport, state: &LedgerState) {
    println!();
    println!("┌─ JOURNAL ──────────────────────────────────────────────────────┐");
    println!("│ Snapshots:           {}", report.snapshots);
    println!("│ Last sequence:       {}", report.last_sequence);
    if report.damaged_records > 0 || report.torn_bytes > 0 {
        println!("│ Damaged records:     {}", report.damaged_records);
        println!("│ Torn tail bytes:     {}", report.torn_bytes);
    }
    println!("│ Schema version:      {}", state.schema_version);
    println!("│ Id sequence:         {}", state.sequence);
    println!(
        "│ Active session:      {}",
        state.active_user_id.as_deref().unwrap_or("-")
    );
    println!("└────────────────────────────────────────────────────────────────┘");
}

fn print_ledger(platform: &Platform) {
    let summary = platform.dashboard();

    println!();
    println!("┌─ DASHBOARD ────────────────────────────────────────────────────┐");
    println!(
        "│ Users:               {} ({} suspended)",
        summary.total_users, summary.suspended_users
    );
    println!("│ Pending deposits:    {}", summary.pending_deposits);
    println!("│ Pending withdrawals: {}", summary.pending_withdrawals);
    println!("│ Revenue:             {}", summary.revenue);
    println!("└────────────────────────────────────────────────────────────────┘");

    println!();
    println!("┌─ USERS ────────────────────────────────────────────────────────┐");
    for user in platform.all_users() {
        println!(
            "│ {:<10} {:<16} {:>14} deposited {:>12} referrals {:>3} {:?}",
            user.id,
            user.username,
            user.wallet.balance.to_string(),
            user.wallet.total_deposits.to_string(),
            user.referrals.len(),
            user.status,
        );
    }
    println!("└────────────────────────────────────────────────────────────────┘");

    println!();
    println!("┌─ DEPOSITS ─────────────────────────────────────────────────────┐");
    for row in platform.all_deposits() {
        let d = &row.record.meta;
        println!(
            "│ {:<10} {:<16} {:>12} {:<9} {}",
            d.id,
            row.username.as_deref().unwrap_or("?"),
            d.amount.to_string(),
            d.status,
            d.submitted_at.format("%Y-%m-%d %H:%M"),
        );
    }
    println!("└────────────────────────────────────────────────────────────────┘");

    println!();
    println!("┌─ WITHDRAWALS ──────────────────────────────────────────────────┐");
    for row in platform.all_withdrawals() {
        let w = &row.record;
        println!(
            "│ {:<10} {:<16} {:>12} (reserved {:>12}) {:<9} {}",
            w.meta.id,
            row.username.as_deref().unwrap_or("?"),
            w.meta.amount.to_string(),
            w.reserved.to_string(),
            w.meta.status,
            w.address,
        );
    }
    println!("└────────────────────────────────────────────────────────────────┘");

    let pending_liability: Money = platform
        .state()
        .withdrawals
        .iter()
        .filter(|w| w.meta.status == TransactionStatus::Pending)
        .map(|w| w.reserved)
        .sum();
    println!();
    println!("Reserved for pending withdrawals: {pending_liability}");
}

/// Opens the journal for writing, which also cuts a torn tail, and rewrites it.
fn compact(journal: &str) {
    match JournalStore::open(journal).and_then(|store| store.compact()) {
        Ok(()) => println!("Journal compacted."),
        Err(e) => println!("Error: Compaction failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_path_may_follow_flags() {
        let parsed = parse_args(&args(&["--compact", "--config", "fees.toml", "ledger.sflg"]));
        assert_eq!(
            parsed,
            Ok(InspectArgs {
                journal: "ledger.sflg".to_string(),
                config: Some("fees.toml".to_string()),
                compact: true,
            })
        );
    }

    #[test]
    fn test_path_only() {
        let parsed = parse_args(&args(&["ledger.sflg"])).unwrap();
        assert_eq!(parsed.journal, "ledger.sflg");
        assert_eq!(parsed.config, None);
        assert!(!parsed.compact);
    }

    #[test]
    fn test_flags_are_never_paths() {
        assert!(parse_args(&args(&["--compact"])).is_err());
        assert!(parse_args(&args(&["--config", "fees.toml"])).is_err());
        assert!(parse_args(&args(&["ledger.sflg", "--config"])).is_err());
        assert!(parse_args(&args(&["ledger.sflg", "--verbose"])).is_err());
        assert!(parse_args(&args(&["a.sflg", "b.sflg"])).is_err());
        assert!(parse_args(&[]).is_err());
    }
}
