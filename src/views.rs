//! Response views that decorate stored rows with related animal details
//!
//! Rows are flattened so the JSON keeps every column and gains the joined
//! fields alongside.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{Animal, HealthRecord, ProductionRecord, ReproductionRecord, Transaction};

// ============================================================================
// Animal summaries
// ============================================================================

/// Compact animal reference used in pedigrees
#[derive(Debug, Clone, Serialize)]
pub struct AnimalSummary {
    pub id: i64,
    pub tag_number: String,
    pub name: Option<String>,
    pub sex: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub status: String,
}

impl From<&Animal> for AnimalSummary {
    fn from(a: &Animal) -> Self {
        Self {
            id: a.id,
            tag_number: a.tag_number.clone(),
            name: a.name.clone(),
            sex: a.sex.clone(),
            breed: a.breed.clone(),
            birth_date: a.birth_date.clone(),
            status: a.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pedigree {
    pub animal: AnimalSummary,
    pub mother: Option<AnimalSummary>,
    pub father: Option<AnimalSummary>,
    pub maternal_grandmother: Option<AnimalSummary>,
    pub maternal_grandfather: Option<AnimalSummary>,
    pub paternal_grandmother: Option<AnimalSummary>,
    pub paternal_grandfather: Option<AnimalSummary>,
}

fn tag_and_name(animals: &HashMap<i64, Animal>, id: Option<i64>) -> (Option<String>, Option<String>) {
    match id.and_then(|id| animals.get(&id)) {
        Some(a) => (Some(a.tag_number.clone()), a.name.clone()),
        None => (None, None),
    }
}

// ============================================================================
// Record views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecordView {
    #[serde(flatten)]
    pub record: HealthRecord,
    pub animal_tag: Option<String>,
    pub animal_name: Option<String>,
}

impl HealthRecordView {
    pub fn new(record: HealthRecord, animals: &HashMap<i64, Animal>) -> Self {
        let (animal_tag, animal_name) = tag_and_name(animals, Some(record.animal_id));
        Self {
            record,
            animal_tag,
            animal_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReproductionRecordView {
    #[serde(flatten)]
    pub record: ReproductionRecord,
    pub animal_tag: Option<String>,
    pub animal_name: Option<String>,
    pub sire_tag: Option<String>,
    pub sire_name: Option<String>,
}

impl ReproductionRecordView {
    pub fn new(record: ReproductionRecord, animals: &HashMap<i64, Animal>) -> Self {
        let (animal_tag, animal_name) = tag_and_name(animals, Some(record.animal_id));
        let (sire_tag, sire_name) = tag_and_name(animals, record.sire_id);
        Self {
            record,
            animal_tag,
            animal_name,
            sire_tag,
            sire_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionRecordView {
    #[serde(flatten)]
    pub record: ProductionRecord,
    pub animal_tag: Option<String>,
    pub animal_name: Option<String>,
}

impl ProductionRecordView {
    pub fn new(record: ProductionRecord, animals: &HashMap<i64, Animal>) -> Self {
        let (animal_tag, animal_name) = tag_and_name(animals, Some(record.animal_id));
        Self {
            record,
            animal_tag,
            animal_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub animal_tag: Option<String>,
    pub animal_name: Option<String>,
}

impl TransactionView {
    pub fn new(transaction: Transaction, animals: &HashMap<i64, Animal>) -> Self {
        let (animal_tag, animal_name) = tag_and_name(animals, transaction.animal_id);
        Self {
            transaction,
            animal_tag,
            animal_name,
        }
    }
}
