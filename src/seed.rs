// src/seed.rs
//! Demo dataset loaded at start-up. Dates are relative to `today` so the
//! expiring and expired views always have something to show.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::auth::{Role, User};
use crate::models::{Batch, BatchCategory, BatchStatus};

struct SeedBatch {
    product_code: &'static str,
    product_name: &'static str,
    batch_number: &'static str,
    quantity: i64,
    original_quantity: i64,
    unit: &'static str,
    expires_in_days: i64,
    manufactured_days_ago: i64,
    location: &'static str,
    status: BatchStatus,
    category: BatchCategory,
}

const SEED_BATCHES: &[SeedBatch] = &[
    SeedBatch {
        product_code: "RM-PCM",
        product_name: "Paracetamol API",
        batch_number: "PCM-2401",
        quantity: 120,
        original_quantity: 500,
        unit: "kg",
        expires_in_days: 20,
        manufactured_days_ago: 700,
        location: "WH-A-01",
        status: BatchStatus::Available,
        category: BatchCategory::RawMaterial,
    },
    SeedBatch {
        product_code: "RM-PCM",
        product_name: "Paracetamol API",
        batch_number: "PCM-2407",
        quantity: 500,
        original_quantity: 500,
        unit: "kg",
        expires_in_days: 400,
        manufactured_days_ago: 300,
        location: "WH-A-02",
        status: BatchStatus::Available,
        category: BatchCategory::RawMaterial,
    },
    SeedBatch {
        product_code: "RM-MCC",
        product_name: "Microcrystalline cellulose",
        batch_number: "MCC-2403",
        quantity: 35,
        original_quantity: 800,
        unit: "kg",
        expires_in_days: 5,
        manufactured_days_ago: 900,
        location: "WH-A-03",
        status: BatchStatus::Available,
        category: BatchCategory::RawMaterial,
    },
    SeedBatch {
        product_code: "RM-MGS",
        product_name: "Magnesium stearate",
        batch_number: "MGS-2311",
        quantity: 40,
        original_quantity: 100,
        unit: "kg",
        expires_in_days: -12,
        manufactured_days_ago: 1000,
        location: "WH-A-04",
        status: BatchStatus::Available,
        category: BatchCategory::RawMaterial,
    },
    SeedBatch {
        product_code: "RM-STA",
        product_name: "Pregelatinised starch",
        batch_number: "STA-2405",
        quantity: 250,
        original_quantity: 250,
        unit: "kg",
        expires_in_days: 180,
        manufactured_days_ago: 200,
        location: "WH-A-05",
        status: BatchStatus::Reserved,
        category: BatchCategory::RawMaterial,
    },
    SeedBatch {
        product_code: "SF-PCMG",
        product_name: "Paracetamol granulate",
        batch_number: "GR-2409",
        quantity: 180,
        original_quantity: 300,
        unit: "kg",
        expires_in_days: 90,
        manufactured_days_ago: 30,
        location: "PROD-B-01",
        status: BatchStatus::Available,
        category: BatchCategory::SemiFinished,
    },
    SeedBatch {
        product_code: "SF-PCMT",
        product_name: "Paracetamol uncoated tablets",
        batch_number: "TB-2410",
        quantity: 90000,
        original_quantity: 120000,
        unit: "tablet",
        expires_in_days: 60,
        manufactured_days_ago: 14,
        location: "PROD-B-02",
        status: BatchStatus::Available,
        category: BatchCategory::SemiFinished,
    },
    SeedBatch {
        product_code: "FG-PCM500",
        product_name: "Paracetamol 500 mg tablets, 20 pcs",
        batch_number: "FG-2403",
        quantity: 800,
        original_quantity: 5000,
        unit: "box",
        expires_in_days: 25,
        manufactured_days_ago: 700,
        location: "WH-FG-01",
        status: BatchStatus::Available,
        category: BatchCategory::FinishedGoods,
    },
    SeedBatch {
        product_code: "FG-PCM500",
        product_name: "Paracetamol 500 mg tablets, 20 pcs",
        batch_number: "FG-2408",
        quantity: 4200,
        original_quantity: 5000,
        unit: "box",
        expires_in_days: 700,
        manufactured_days_ago: 60,
        location: "WH-FG-01",
        status: BatchStatus::Available,
        category: BatchCategory::FinishedGoods,
    },
    SeedBatch {
        product_code: "FG-IBU200",
        product_name: "Ibuprofen 200 mg tablets, 10 pcs",
        batch_number: "FG-2402",
        quantity: 300,
        original_quantity: 3000,
        unit: "box",
        expires_in_days: 200,
        manufactured_days_ago: 500,
        location: "WH-FG-02",
        status: BatchStatus::Recalled,
        category: BatchCategory::FinishedGoods,
    },
];

pub fn demo_batches(today: NaiveDate) -> Vec<Batch> {
    let now = Utc::now();
    SEED_BATCHES
        .iter()
        .map(|s| Batch {
            id: Uuid::new_v4().to_string(),
            product_code: s.product_code.to_string(),
            product_name: s.product_name.to_string(),
            batch_number: s.batch_number.to_string(),
            quantity: Decimal::from(s.quantity),
            original_quantity: Decimal::from(s.original_quantity),
            unit: s.unit.to_string(),
            expiry_date: today + Duration::days(s.expires_in_days),
            manufacturing_date: today - Duration::days(s.manufactured_days_ago),
            location: s.location.to_string(),
            status: s.status,
            category: s.category,
            notes: None,
            created_by: Some("seed".to_string()),
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// One demo account per role; the username is the role name.
pub fn demo_users() -> Vec<User> {
    Role::iter()
        .map(|role| User {
            id: format!("user-{}", role.as_ref()),
            username: role.as_ref().to_string(),
            full_name: format!("Demo {}", role.display_name()),
            department: role.display_name().to_string(),
            role,
        })
        .collect()
}
