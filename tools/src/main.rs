//! etl-runner: daily batch runner for the cardwatch warehouse.
//!
//! Usage:
//!   etl-runner --db warehouse.db --data-dir ./data --archive-dir ./archive
//!   etl-runner --config etl.json --halt-on-error
//!   etl-runner --db demo.db --data-dir ./data --seed-demo --seed 12345

use anyhow::{bail, Context, Result};
use cardwatch_core::{
    batch::{BatchRunner, DayBatch, DaySummary},
    config::WarehouseConfig,
    extract::{self, ExtractKind},
    store::{AccountRow, CardRow, ClientRow, WarehouseStore},
};
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// One day's extract files, assembled during discovery.
#[derive(Default)]
struct DayFiles {
    terminals: Option<PathBuf>,
    passports: Option<PathBuf>,
    transactions: Option<PathBuf>,
}

impl DayFiles {
    fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.terminals.is_none() {
            out.push("terminals");
        }
        if self.passports.is_none() {
            out.push("passport_blacklist");
        }
        if self.transactions.is_none() {
            out.push("transactions");
        }
        out
    }

    fn all(&self) -> Vec<&Path> {
        [&self.terminals, &self.passports, &self.transactions]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match string_arg(&args, "--config") {
        Some(path) => WarehouseConfig::load(Path::new(&path))
            .with_context(|| format!("loading config {path}"))?,
        None => WarehouseConfig::default(),
    };
    if let Some(db) = string_arg(&args, "--db") {
        config.db_path = db;
    }
    if let Some(dir) = string_arg(&args, "--data-dir") {
        config.data_dir = dir;
    }
    if let Some(dir) = string_arg(&args, "--archive-dir") {
        config.archive_dir = dir;
    }
    let halt_on_error = args.iter().any(|a| a == "--halt-on-error");
    let seed_demo = args.iter().any(|a| a == "--seed-demo");
    let seed = parse_arg(&args, "--seed", 42u64);

    println!("cardwatch — etl-runner");
    println!("  db:          {}", config.db_path);
    println!("  data_dir:    {}", config.data_dir);
    println!("  archive_dir: {}", config.archive_dir);
    println!();

    let store = WarehouseStore::open(&config.db_path, config.staging.clone())?;
    store.migrate()?;

    if seed_demo {
        seed_demo_data(&store, &config.data_dir, seed)?;
    }

    let data_dir = Path::new(&config.data_dir);
    if !data_dir.is_dir() {
        bail!("data directory {} does not exist", config.data_dir);
    }

    let days = discover_days(data_dir)?;
    if days.is_empty() {
        println!("no extract files found in {}", config.data_dir);
        return Ok(());
    }

    let runner = BatchRunner::new(&store);
    let mut summaries: Vec<DaySummary> = Vec::new();
    // Oldest first: later days depend on the history earlier days build.
    for (date, files) in &days {
        let missing = files.missing();
        if !missing.is_empty() {
            bail!("incomplete extract set for {date}: missing {}", missing.join(", "));
        }
        let batch = read_day(*date, files)?;
        let summary = runner.process_day(&batch);
        let ok = summary.fully_ok();
        summaries.push(summary);
        if ok {
            archive_day(files, Path::new(&config.archive_dir))?;
        } else if halt_on_error {
            bail!("day {date} failed, halting (--halt-on-error)");
        }
    }

    print_summary(&store, &summaries)?;
    Ok(())
}

fn discover_days(data_dir: &Path) -> Result<BTreeMap<NaiveDate, DayFiles>> {
    let mut days: BTreeMap<NaiveDate, DayFiles> = BTreeMap::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let (kind, date) = match extract::classify_filename(name) {
            Some(hit) => hit,
            None => continue, // archives, backups, stray files
        };
        let slot = days.entry(date).or_default();
        match kind {
            ExtractKind::Terminals => slot.terminals = Some(path),
            ExtractKind::PassportBlacklist => slot.passports = Some(path),
            ExtractKind::Transactions => slot.transactions = Some(path),
        }
    }
    Ok(days)
}

fn read_day(date: NaiveDate, files: &DayFiles) -> Result<DayBatch> {
    // Discovery already rejected incomplete days.
    let terminals_path = files.terminals.as_ref().context("terminals file missing")?;
    let passports_path = files.passports.as_ref().context("passports file missing")?;
    let transactions_path = files
        .transactions
        .as_ref()
        .context("transactions file missing")?;

    let terminals = extract::parse_terminals(
        &fs::read_to_string(terminals_path)?,
        &terminals_path.display().to_string(),
    )?;
    let passports = extract::parse_passports(
        &fs::read_to_string(passports_path)?,
        &passports_path.display().to_string(),
    )?;
    let transactions = extract::parse_transactions(
        &fs::read_to_string(transactions_path)?,
        &transactions_path.display().to_string(),
    )?;

    Ok(DayBatch {
        date,
        terminals,
        passports,
        transactions,
    })
}

/// Move a fully processed day's files into the archive with a .backup
/// suffix, so a re-run never picks them up again.
fn archive_day(files: &DayFiles, archive_dir: &Path) -> Result<()> {
    fs::create_dir_all(archive_dir)?;
    for path in files.all() {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("extract path has no file name")?;
        let target = archive_dir.join(format!("{name}.backup"));
        fs::rename(path, &target)
            .with_context(|| format!("archiving {} to {}", path.display(), target.display()))?;
        log::info!("archived {name}");
    }
    Ok(())
}

fn print_summary(store: &WarehouseStore, summaries: &[DaySummary]) -> Result<()> {
    fn entity<T>(r: &cardwatch_core::error::EtlResult<T>) -> &'static str {
        if r.is_ok() {
            "ok"
        } else {
            "FAILED"
        }
    }

    println!("=== RUN SUMMARY ===");
    for s in summaries {
        let report = match &s.report {
            Some(Ok(n)) => format!("{n} new events"),
            Some(Err(_)) => "FAILED".to_string(),
            None => "skipped".to_string(),
        };
        println!(
            "  {} | terminals: {} | passports: {} | facts: {} | report: {}",
            s.date,
            entity(&s.terminals),
            entity(&s.passports),
            entity(&s.facts),
            report
        );
    }
    println!();
    println!("  facts total:       {}", store.transaction_count()?);
    println!("  fraud events:      {}", store.fraud_event_count()?);
    Ok(())
}

// ── Demo seeding ───────────────────────────────────────────────────────
//
// Seeds the reference dimensions and writes three days of synthetic
// extract files into the data directory, with a few planted fraud
// patterns so the report has something to find.

const DEMO_CITIES: [&str; 5] = ["Moscow", "Kazan", "Samara", "Tver", "Omsk"];

fn seed_demo_data(store: &WarehouseStore, data_dir: &str, seed: u64) -> Result<()> {
    if store.client_count()? > 0 {
        log::info!("demo seed skipped: clients already present");
        return Ok(());
    }
    let mut rng = Pcg64::seed_from_u64(seed);

    let mut first_passport = String::new();
    for i in 0..20 {
        let client_id = format!("C{:04}", i + 1);
        let passport = format!("45{:02} {:06}", rng.gen_range(10..99), rng.gen_range(100000..999999));
        if i == 0 {
            first_passport = passport.clone();
        }
        store.insert_client(&ClientRow {
            client_id: client_id.clone(),
            last_name: Some(format!("Client{:02}", i + 1)),
            first_name: Some("Demo".to_string()),
            patronymic: None,
            date_of_birth: Some("1980-01-01".to_string()),
            passport_num: Some(passport),
            // Two clients carry already expired passports.
            passport_valid_to: Some(if i < 2 { "2020-01-01" } else { "2030-01-01" }.to_string()),
            phone: None,
        })?;
        let account = format!("408178{:08}", rng.gen_range(10_000_000u64..99_999_999));
        store.insert_account(&AccountRow {
            account: account.clone(),
            // One expired contract in the mix.
            valid_to: Some(if i == 2 { "2021-01-01" } else { "2030-01-01" }.to_string()),
            client: client_id,
        })?;
        store.insert_card(&CardRow {
            card_num: format!("2200 77{:02} {:04} {:04}", i, rng.gen_range(1000..9999), rng.gen_range(1000..9999)),
            account,
        })?;
    }

    let cards = store.cards()?;
    let start = NaiveDate::from_ymd_opt(2021, 3, 1).expect("valid demo date");
    fs::create_dir_all(data_dir)?;

    for offset in 0..3 {
        let date = start + Duration::days(offset);
        let stamp = date.format("%d%m%Y").to_string();

        let mut terminals = String::from("terminal_id;terminal_type;terminal_city;terminal_address\n");
        for (i, city) in DEMO_CITIES.iter().enumerate() {
            terminals.push_str(&format!("T{:03};POS;{city};Main St {}\n", i + 1, i + 1));
        }
        fs::write(Path::new(data_dir).join(format!("terminals_{stamp}.csv")), terminals)?;

        // The first client's passport lands on the blacklist from day two.
        let mut blacklist = String::from("date;passport\n");
        if offset >= 1 {
            blacklist.push_str(&format!("{date};{first_passport}\n"));
        }
        fs::write(
            Path::new(data_dir).join(format!("passport_blacklist_{stamp}.csv")),
            blacklist,
        )?;

        let mut txns =
            String::from("transaction_id;transaction_date;card_num;oper_type;amount;oper_result;terminal\n");
        for hour in 9..18 {
            let card = &cards[rng.gen_range(0..cards.len())];
            let amount = rng.gen_range(100..10_000);
            txns.push_str(&format!(
                "{};{} {hour:02}:{:02}:00;{};PAYMENT;{amount},00;SUCCESS;T{:03}\n",
                uuid::Uuid::new_v4(),
                date,
                rng.gen_range(0..60),
                card.card_num,
                rng.gen_range(1..=DEMO_CITIES.len()),
            ));
        }
        // Planted impossible geography: two cities half an hour apart.
        let geo_card = &cards[0];
        txns.push_str(&format!(
            "{};{date} 10:00:00;{};PAYMENT;500,00;SUCCESS;T001\n",
            uuid::Uuid::new_v4(),
            geo_card.card_num
        ));
        txns.push_str(&format!(
            "{};{date} 10:30:00;{};PAYMENT;700,00;SUCCESS;T002\n",
            uuid::Uuid::new_v4(),
            geo_card.card_num
        ));
        // Planted probing: decreasing rejects then a small success.
        let probe_card = &cards[1];
        txns.push_str(&format!(
            "{};{date} 14:00:00;{};WITHDRAW;1000,00;REJECT;T003\n",
            uuid::Uuid::new_v4(),
            probe_card.card_num
        ));
        txns.push_str(&format!(
            "{};{date} 14:05:00;{};WITHDRAW;500,00;REJECT;T003\n",
            uuid::Uuid::new_v4(),
            probe_card.card_num
        ));
        txns.push_str(&format!(
            "{};{date} 14:10:00;{};WITHDRAW;100,00;SUCCESS;T003\n",
            uuid::Uuid::new_v4(),
            probe_card.card_num
        ));
        fs::write(Path::new(data_dir).join(format!("transactions_{stamp}.txt")), txns)?;

        log::info!("demo extracts written for {date}");
    }
    println!("demo data seeded into {data_dir} (seed {seed})");
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}
