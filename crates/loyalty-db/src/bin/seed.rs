//! # Seed Data Generator
//!
//! Creates a demo loyalty program with three reward tiers for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./loyalty_dev.db for business "demo-business"
//! cargo run -p loyalty-db --bin seed
//!
//! # Specify database path and business
//! cargo run -p loyalty-db --bin seed -- --db ./data/loyalty.db --business cafe-42
//! ```
//!
//! ## Generated Data
//! - Program "Demo Rewards", 1 point per currency unit (USD, EUR), 100 JPY per point
//! - Tiers: Free Coffee (50, self-service), Pastry (120, self-service),
//!   10% Off Order (300, staff only)

use chrono::Utc;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use loyalty_core::points::{AccrualConfig, CurrencyRate};
use loyalty_core::{LoyaltyProgram, LoyaltyRewardTier, RewardType};
use loyalty_db::{Database, DbConfig};

/// (name, description, points, type, value, self-service)
const TIERS: &[(&str, &str, i64, RewardType, i64, bool)] = &[
    ("Free Coffee", "Any regular hot coffee", 50, RewardType::FreeItem, 0, true),
    ("Pastry", "One pastry from the counter", 120, RewardType::FreeItem, 0, true),
    ("10% Off Order", "Ten percent off the whole order", 300, RewardType::PercentDiscount, 1_000, false),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./loyalty_dev.db");
    let mut business_id = String::from("demo-business");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--business" | "-b" => {
                if i + 1 < args.len() {
                    business_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Loyalty Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./loyalty_dev.db)");
                println!("  -b, --business <ID>    Business id (default: demo-business)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(database = %db_path, business_id = %business_id, "Seeding demo program");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    if let Some(existing) = db.programs().active_program(&business_id).await? {
        warn!(program_id = %existing.id, "Business already has an active program, skipping");
        return Ok(());
    }

    let now = Utc::now();
    let program = LoyaltyProgram {
        id: Uuid::new_v4().to_string(),
        business_id: business_id.clone(),
        name: "Demo Rewards".to_string(),
        accrual: AccrualConfig::RateTable {
            rates: vec![
                CurrencyRate {
                    currency: "USD".to_string(),
                    rate_bps: 10_000,
                    exponent: None,
                },
                CurrencyRate {
                    currency: "EUR".to_string(),
                    rate_bps: 10_000,
                    exponent: None,
                },
                CurrencyRate {
                    currency: "JPY".to_string(),
                    rate_bps: 100,
                    exponent: Some(0),
                },
            ],
        },
        is_active: true,
    };
    db.programs().insert_program(&program, now).await?;

    for (name, description, points, reward_type, value, self_service) in TIERS {
        let tier = LoyaltyRewardTier {
            id: Uuid::new_v4().to_string(),
            program_id: program.id.clone(),
            business_id: business_id.clone(),
            name: name.to_string(),
            description: Some(description.to_string()),
            points_required: *points,
            reward_type: *reward_type,
            reward_value: *value,
            allow_self_redemption: *self_service,
            is_active: true,
        };
        db.programs().insert_tier(&tier).await?;
        info!(tier_id = %tier.id, name = %tier.name, points_required = tier.points_required, "Tier created");
    }

    info!(program_id = %program.id, "Seed complete");
    db.close().await;

    Ok(())
}
