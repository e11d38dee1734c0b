//! # Seed Data Generator
//!
//! Populates a development database with a small catalog of common ICs, a
//! few known counterfeits and a handful of queued unknowns.
//!
//! ## Usage
//! ```bash
//! # Seed ./icv_dev.db
//! cargo run -p icv-db --bin seed
//!
//! # Specify database path
//! cargo run -p icv-db --bin seed -- --db ./data/icv.db
//! ```
//!
//! ## Generated Data
//! - Catalog: through-hole and bottom-terminated parts from several vendors
//! - Fake registry: manual reports with a reason
//! - Sync queue: part numbers a sync run can pick up

use std::env;

use icv_core::{FakeReport, FakeSource, NewCatalogEntry, PartNumber, SOURCE_MANUAL};
use icv_db::{Database, DbConfig};

/// (part number, manufacturer, pins, package, description)
const CATALOG: &[(&str, &str, i64, &str, &str)] = &[
    ("LM358N", "Texas Instruments", 8, "PDIP-8", "Dual operational amplifier"),
    ("LM358DR", "Texas Instruments", 8, "SOIC-8", "Dual operational amplifier"),
    ("NE555P", "Texas Instruments", 8, "PDIP-8", "Precision timer"),
    ("LM7805CT", "onsemi", 3, "TO-220", "5 V linear regulator"),
    ("ATMEGA328P-PU", "Microchip", 28, "PDIP-28", "8-bit AVR microcontroller"),
    ("ATMEGA328P-MU", "Microchip", 32, "VQFN-32", "8-bit AVR microcontroller"),
    ("STM32F103C8T6", "STMicroelectronics", 48, "LQFP-48", "Arm Cortex-M3 MCU"),
    ("TPS62130RGTR", "Texas Instruments", 16, "VQFN-16", "3-17 V step-down converter"),
    ("ADS1115IDGSR", "Texas Instruments", 10, "VSSOP-10", "16-bit ADC"),
    ("AD620ANZ", "Analog Devices", 8, "PDIP-8", "Instrumentation amplifier"),
    ("MAX232CPE", "Analog Devices", 16, "PDIP-16", "RS-232 driver/receiver"),
    ("ESP32-D0WD-V3", "Espressif", 48, "QFN-48", "Wi-Fi + Bluetooth SoC"),
    ("NRF52832-QFAA", "Nordic Semiconductor", 48, "QFN-48", "Bluetooth LE SoC"),
];

/// (part number, reason)
const FAKES: &[(&str, &str)] = &[
    ("AD620AN-X", "Remarked die, wrong logo font"),
    ("LM317T-FAKE", "No such ordering code from any vendor"),
];

const QUEUED: &[&str] = &["LM555CN", "TL071CP", "MCP2515-I/P"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./icv_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("IC Verification Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./icv_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 IC Verification Seed Data Generator");
    println!("======================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().count().await?;
    if existing > 0 {
        println!("⚠ Catalog already has {} entries", existing);
        println!("  Skipping seed to avoid clobbering curated data.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding catalog...");
    for (part, maker, pins, package, description) in CATALOG {
        let mut entry = NewCatalogEntry::new(PartNumber::parse(part)?, SOURCE_MANUAL);
        entry.manufacturer = Some(maker.to_string());
        entry.pin_count = Some(*pins);
        entry.package_type = Some(package.to_string());
        entry.description = Some(description.to_string());

        if let Err(e) = db.catalog().upsert(&entry).await {
            eprintln!("Failed to insert {}: {}", part, e);
            continue;
        }
        println!("  {:<16} {:<22} {:>3} pins  {}", part, maker, pins, package);
    }

    println!();
    println!("Seeding fake registry...");
    for (part, reason) in FAKES {
        let report = FakeReport {
            part_number: PartNumber::parse(part)?,
            reason: reason.to_string(),
            source: FakeSource::Manual,
            reported_by: Some("seed".to_string()),
            scrape_attempts: 0,
            manufacturers_checked: Vec::new(),
        };
        if let Err(e) = db.fake_registry().register(&report).await {
            eprintln!("Failed to register {}: {}", part, e);
        }
    }

    println!("Seeding sync queue...");
    for part in QUEUED {
        db.sync_queue().upsert_scan(&PartNumber::parse(part)?).await?;
    }

    let stats = db.stats().await?;
    println!();
    println!("✓ Seed complete!");
    println!("  Catalog entries: {}", stats.catalog_entries);
    println!("  Fake registry:   {}", stats.fake_entries);
    println!("  Queue (pending): {}", stats.queue_pending);

    db.close().await;
    Ok(())
}
