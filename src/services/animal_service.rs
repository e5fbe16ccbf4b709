//! Animal registry: creation, partial updates with weight history, soft
//! delete and pedigree lookup

use diesel::SqliteConnection;
use serde_json::{Map, Value};
use tracing::info;

use crate::db::animals::{self, AnimalPage, AnimalQuery};
use crate::db::models::{current_timestamp, status, today, Animal, NewAnimal};
use crate::db::{Database, TenantContext};
use crate::error::AppError;
use crate::sync::{apply_patch, soft_delete, update_versioned, SyncRecord};
use crate::validation::Validate;
use crate::views::{AnimalSummary, Pedigree};

pub(crate) fn animal_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Animal {} not found", id))
}

/// Load an animal that has not been soft-deleted
pub(crate) fn live_animal(conn: &mut SqliteConnection, ctx: &TenantContext, id: i64) -> Result<Animal, AppError> {
    animals::get_animal(conn, ctx, id)?
        .filter(|a| !a.is_deleted())
        .ok_or_else(|| animal_not_found(id))
}

/// Insert a validated animal; shared with purchase transactions
pub(crate) fn insert_new_animal(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    mut input: NewAnimal,
) -> Result<Animal, AppError> {
    input.tenant_id = ctx.tenant_id;
    input.tag_number = input.tag_number.trim().to_string();
    input.validate()?;

    if animals::tag_exists(conn, ctx, &input.tag_number, None)? {
        return Err(AppError::InvalidInput(format!(
            "tag number '{}' is already registered",
            input.tag_number
        )));
    }
    if let Some(mother_id) = input.mother_id {
        animals::get_animal(conn, ctx, mother_id)?
            .ok_or_else(|| AppError::NotFound(format!("Mother {} not found", mother_id)))?;
    }
    if let Some(father_id) = input.father_id {
        animals::get_animal(conn, ctx, father_id)?
            .ok_or_else(|| AppError::NotFound(format!("Father {} not found", father_id)))?;
    }

    input.last_weighed_on = input.current_weight.map(|_| today().to_string());
    let now = current_timestamp();
    input.created_at = now.clone();
    input.updated_at = now;
    animals::create_animal(conn, &input)
}

/// Carry the old weight into `previous_weight` when a new one is recorded
fn track_weight(current: &Animal, next: &mut Animal) {
    if next.current_weight.is_some() && next.current_weight != current.current_weight {
        next.previous_weight = current.current_weight;
        next.last_weighed_on = Some(today().to_string());
    }
}

pub struct AnimalService {
    db: Database,
}

impl AnimalService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self, ctx: &TenantContext, query: &AnimalQuery) -> Result<AnimalPage, AppError> {
        self.db.with_conn(|conn| animals::list_animals(conn, ctx, query))
    }

    pub fn get(&self, ctx: &TenantContext, id: i64) -> Result<Animal, AppError> {
        self.db.with_conn(|conn| live_animal(conn, ctx, id))
    }

    pub fn create(&self, ctx: &TenantContext, input: NewAnimal) -> Result<Animal, AppError> {
        let animal = self.db.transaction(|conn| insert_new_animal(conn, ctx, input))?;
        info!(tenant = ctx.tenant_id, id = animal.id, tag = %animal.tag_number, "Animal registered");
        Ok(animal)
    }

    /// Partial update; only the supplied fields change
    pub fn update(&self, ctx: &TenantContext, id: i64, patch: &Map<String, Value>) -> Result<Animal, AppError> {
        self.db.transaction(|conn| {
            update_versioned(conn, ctx, id, |conn, current: &Animal| {
                if current.is_deleted() {
                    return Err(animal_not_found(id));
                }
                let mut next = apply_patch(current, patch)?;
                next.tag_number = next.tag_number.trim().to_string();
                if next.status == status::DELETED {
                    return Err(AppError::InvalidInput("use DELETE to remove an animal".into()));
                }
                track_weight(current, &mut next);
                next.validate()?;
                next.check_relations(conn, ctx)?;
                Ok(next)
            })
        })
    }

    pub fn delete(&self, ctx: &TenantContext, id: i64) -> Result<(), AppError> {
        self.db
            .transaction(|conn| soft_delete::<Animal>(conn, ctx, id))
            .map_err(|e| match e {
                AppError::NotFound(_) => animal_not_found(id),
                other => other,
            })?;
        info!(tenant = ctx.tenant_id, id, "Animal deleted");
        Ok(())
    }

    /// Animal with parents and grandparents; deleted ancestors still resolve
    pub fn pedigree(&self, ctx: &TenantContext, id: i64) -> Result<Pedigree, AppError> {
        self.db.with_conn(|conn| {
            let animal = live_animal(conn, ctx, id)?;
            let mut lookup = |id: Option<i64>| -> Result<Option<Animal>, AppError> {
                match id {
                    Some(id) => animals::get_animal(conn, ctx, id),
                    None => Ok(None),
                }
            };

            let mother = lookup(animal.mother_id)?;
            let father = lookup(animal.father_id)?;
            let maternal_grandmother = lookup(mother.as_ref().and_then(|m| m.mother_id))?;
            let maternal_grandfather = lookup(mother.as_ref().and_then(|m| m.father_id))?;
            let paternal_grandmother = lookup(father.as_ref().and_then(|f| f.mother_id))?;
            let paternal_grandfather = lookup(father.as_ref().and_then(|f| f.father_id))?;

            let summary = |a: &Option<Animal>| a.as_ref().map(AnimalSummary::from);
            Ok(Pedigree {
                animal: AnimalSummary::from(&animal),
                mother: summary(&mother),
                father: summary(&father),
                maternal_grandmother: summary(&maternal_grandmother),
                maternal_grandfather: summary(&maternal_grandfather),
                paternal_grandmother: summary(&paternal_grandmother),
                paternal_grandfather: summary(&paternal_grandfather),
            })
        })
    }

    /// Replace the photo URL, returning the previous one so its file can go
    pub fn set_photo_url(
        &self,
        ctx: &TenantContext,
        id: i64,
        photo_url: Option<String>,
    ) -> Result<(Animal, Option<String>), AppError> {
        self.db.transaction(|conn| {
            let mut previous = None;
            let animal = update_versioned(conn, ctx, id, |_, current: &Animal| {
                if current.is_deleted() {
                    return Err(animal_not_found(id));
                }
                previous = current.photo_url.clone();
                let mut next = current.clone();
                next.photo_url = photo_url.clone();
                Ok(next)
            })?;
            Ok((animal, previous))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::animals::fixtures::new_animal;
    use crate::db::test_support::db_with_tenant;
    use serde_json::json;

    #[test]
    fn test_create_rejects_duplicate_tag_and_missing_parent() {
        let (db, ctx) = db_with_tenant();
        let service = AnimalService::new(db);
        service.create(&ctx, new_animal(&ctx, "CO-1", "female")).unwrap();

        let dup = service.create(&ctx, new_animal(&ctx, "CO-1", "female"));
        assert!(matches!(dup, Err(AppError::InvalidInput(_))));

        let mut orphan = new_animal(&ctx, "CA-1", "male");
        orphan.mother_id = Some(4242);
        assert!(matches!(service.create(&ctx, orphan), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_weight_history() {
        let (db, ctx) = db_with_tenant();
        let service = AnimalService::new(db);
        let mut input = new_animal(&ctx, "NO-1", "female");
        input.current_weight = Some(320.0);
        let heifer = service.create(&ctx, input).unwrap();
        assert_eq!(heifer.last_weighed_on, Some(today().to_string()));

        let updated = service
            .update(&ctx, heifer.id, json!({"current_weight": 345.5}).as_object().unwrap())
            .unwrap();
        assert_eq!(updated.previous_weight, Some(320.0));
        assert_eq!(updated.current_weight, Some(345.5));
        assert_eq!(updated.sync_version, 2);

        let renamed = service
            .update(&ctx, heifer.id, json!({"name": "Canela"}).as_object().unwrap())
            .unwrap();
        assert_eq!(renamed.previous_weight, Some(320.0));
        assert_eq!(renamed.sync_version, 3);
    }

    #[test]
    fn test_delete_hides_animal_but_keeps_pedigree_links() {
        let (db, ctx) = db_with_tenant();
        let service = AnimalService::new(db);
        let grandma = service.create(&ctx, new_animal(&ctx, "AB-1", "female")).unwrap();
        let mut mother = new_animal(&ctx, "MA-1", "female");
        mother.mother_id = Some(grandma.id);
        let mother = service.create(&ctx, mother).unwrap();
        let mut calf = new_animal(&ctx, "CR-1", "male");
        calf.mother_id = Some(mother.id);
        let calf = service.create(&ctx, calf).unwrap();

        service.delete(&ctx, grandma.id).unwrap();
        assert!(matches!(service.get(&ctx, grandma.id), Err(AppError::NotFound(_))));
        assert!(matches!(service.delete(&ctx, grandma.id), Err(AppError::NotFound(_))));

        let pedigree = service.pedigree(&ctx, calf.id).unwrap();
        assert_eq!(pedigree.mother.unwrap().tag_number, "MA-1");
        let granny = pedigree.maternal_grandmother.unwrap();
        assert_eq!(granny.tag_number, "AB-1");
        assert_eq!(granny.status, status::DELETED);
        assert!(pedigree.father.is_none());

        let page = service.list(&ctx, &AnimalQuery { page: 1, page_size: 50, ..Default::default() }).unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_update_rejects_tag_collision() {
        let (db, ctx) = db_with_tenant();
        let service = AnimalService::new(db);
        service.create(&ctx, new_animal(&ctx, "A-1", "male")).unwrap();
        let b = service.create(&ctx, new_animal(&ctx, "A-2", "male")).unwrap();
        let err = service
            .update(&ctx, b.id, json!({"tag_number": "A-1"}).as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
