//! # Seed Data Generator
//!
//! Fills a database with sample price records for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 records (default)
//! cargo run -p mandi-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p mandi-db --bin seed -- --count 1000
//!
//! # Specify database path, mark everything as already uploaded
//! cargo run -p mandi-db --bin seed -- --db ./data/mandi.db --synced
//! ```
//!
//! Records cycle through common crops and Maharashtra districts with modal
//! prices between ₹1,200 and ₹8,000 per quintal.

use std::env;

use mandi_db::{Database, DbConfig, DbError};

/// Crops with a base modal price in rupees per quintal.
const CROPS: &[(&str, i64)] = &[
    ("Wheat", 2400),
    ("Rice", 3100),
    ("Jowar", 3000),
    ("Bajra", 2300),
    ("Maize", 2000),
    ("Tur", 7000),
    ("Moong", 7800),
    ("Urad", 6900),
    ("Gram", 5400),
    ("Soybean", 4500),
    ("Groundnut", 6200),
    ("Cotton", 7000),
    ("Onion", 1500),
    ("Tomato", 1200),
    ("Potato", 1400),
    ("Sugarcane", 3150),
];

const DISTRICTS: &[&str] = &[
    "Pune", "Nashik", "Nagpur", "Latur", "Solapur", "Jalgaon", "Ahmednagar", "Kolhapur",
    "Satara", "Amravati", "Akola", "Beed", "Osmanabad", "Sangli", "Aurangabad", "Wardha",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./mandi_dev.db");
    let mut synced = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--synced" | "-s" => synced = true,
            "--help" | "-h" => {
                println!("Mandi Prices Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of records to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./mandi_dev.db)");
                println!("  -s, --synced       Mark generated records as already uploaded");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Mandi Prices Seed Data Generator");
    println!("===================================");
    println!("Database: {}", db_path);
    println!("Records:  {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let repo = db.price_records();

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = repo.count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} records", existing);
        println!("  Colliding samples will be reported as duplicates.");
    }

    println!();
    println!("Generating records...");

    let start = std::time::Instant::now();
    let mut ids = Vec::with_capacity(count);
    let mut duplicates = 0;

    for seed in 0..count {
        let (crop, district, price) = sample(seed);

        match repo.insert(crop, district, price).await {
            Ok(record) => ids.push(record.id),
            Err(DbError::DuplicatePrice { .. }) => duplicates += 1,
            Err(e) => {
                eprintln!("Failed to insert {} / {}: {}", crop, district, e);
                continue;
            }
        }

        if (seed + 1) % 100 == 0 {
            println!("  Generated {} records...", seed + 1);
        }
    }

    if synced {
        let marked = repo.mark_synced(&ids).await?;
        println!("✓ Marked {} records synced", marked);
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Inserted {} records in {:?}", ids.len(), elapsed);
    if duplicates > 0 {
        println!("  Skipped {} duplicates", duplicates);
    }
    println!("  Pending upload: {}", repo.count_unsynced().await?);

    db.close().await;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Deterministic sample for one seed value.
///
/// The price moves in ₹5 steps so each (crop, district) pair gets
/// distinct prices across rounds.
fn sample(seed: usize) -> (&'static str, &'static str, f64) {
    let (crop, base) = CROPS[seed % CROPS.len()];
    let district = DISTRICTS[(seed / CROPS.len() + seed) % DISTRICTS.len()];
    let round = (seed / (CROPS.len() * DISTRICTS.len())) as i64;
    let swing = ((seed * 37) % 400) as i64 - 200;

    let rupees = (base + swing + round * 5).max(1);
    (crop, district, rupees as f64)
}
