// ==========================================
// 车队排班导入系统 - 导入目标实体仓储
// ==========================================
// 职责: vehicle / shift 表的工作区内 CRUD
// 红线: 所有调用在引擎传入的连接/事务上执行，仓储自身不开事务
// 红线: update 为整行覆写（回滚依赖逐字段精确还原）
// ==========================================

use crate::domain::entity::{EntitySnapshot, ExistingByKey, Shift, Vehicle};
use crate::domain::schema::schema_for;
use crate::domain::types::{EntityType, ImportType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

// ==========================================
// EntityRepository Trait
// ==========================================
// 每种导入类型一个实现；引擎只依赖此 trait
pub trait EntityRepository: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// 工作区内全部实体（含已归档），按规范化自然键索引
    fn load_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
    ) -> RepositoryResult<ExistingByKey>;

    fn find_by_id(
        &self,
        conn: &Connection,
        workspace_id: &str,
        id: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>>;

    fn find_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
        natural_key: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>>;

    fn insert(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()>;

    /// 整行覆写；实体不存在时返回 NotFound
    fn update(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()>;

    /// 按 ID 删除
    ///
    /// # 返回
    /// - Ok(false): 实体已不存在
    fn delete(&self, conn: &Connection, workspace_id: &str, id: &str) -> RepositoryResult<bool>;
}

/// 按导入类型取仓储实现
pub fn repository_for(import_type: ImportType) -> &'static dyn EntityRepository {
    match import_type.entity_type() {
        EntityType::Vehicle => &VehicleRepository,
        EntityType::Shift => &ShiftRepository,
    }
}

fn wrong_variant(expected: EntityType, entity: &EntitySnapshot) -> RepositoryError {
    RepositoryError::EntityTypeMismatch {
        expected,
        actual: entity.entity_type(),
    }
}

/// 按规范化自然键分组（保持查询顺序）
fn keyed(import_type: ImportType, entities: Vec<EntitySnapshot>) -> ExistingByKey {
    let schema = schema_for(import_type);
    let mut grouped = ExistingByKey::new();
    for entity in entities {
        let key = schema
            .normalize_key(entity.natural_key())
            .unwrap_or_else(|| entity.natural_key().to_string());
        grouped.entry(key).or_default().push(entity);
    }
    grouped
}

// ==========================================
// VehicleRepository
// ==========================================
pub struct VehicleRepository;

const VEHICLE_COLUMNS: &str = r#"
    id, workspace_id, plate, make, model, year, mileage_km, fuel_type,
    archived, created_at, updated_at
"#;

impl VehicleRepository {
    fn map_row(row: &Row<'_>) -> rusqlite::Result<EntitySnapshot> {
        Ok(EntitySnapshot::Vehicle(Vehicle {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            plate: row.get(2)?,
            make: row.get(3)?,
            model: row.get(4)?,
            year: row.get(5)?,
            mileage_km: row.get(6)?,
            fuel_type: row.get(7)?,
            archived: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        }))
    }

    fn unwrap_vehicle(entity: &EntitySnapshot) -> RepositoryResult<&Vehicle> {
        match entity {
            EntitySnapshot::Vehicle(v) => Ok(v),
            other => Err(wrong_variant(EntityType::Vehicle, other)),
        }
    }
}

impl EntityRepository for VehicleRepository {
    fn entity_type(&self) -> EntityType {
        EntityType::Vehicle
    }

    fn load_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
    ) -> RepositoryResult<ExistingByKey> {
        let sql = format!(
            "SELECT {} FROM vehicle WHERE workspace_id = ?1 ORDER BY plate, id",
            VEHICLE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![workspace_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keyed(ImportType::Fleet, entities))
    }

    fn find_by_id(
        &self,
        conn: &Connection,
        workspace_id: &str,
        id: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let sql = format!(
            "SELECT {} FROM vehicle WHERE workspace_id = ?1 AND id = ?2",
            VEHICLE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![workspace_id, id], Self::map_row)
            .optional()?)
    }

    fn find_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
        natural_key: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let sql = format!(
            "SELECT {} FROM vehicle WHERE workspace_id = ?1 AND plate = ?2",
            VEHICLE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![workspace_id, natural_key], Self::map_row)
            .optional()?)
    }

    fn insert(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()> {
        let v = Self::unwrap_vehicle(entity)?;
        conn.execute(
            r#"
            INSERT INTO vehicle (
                id, workspace_id, plate, make, model, year, mileage_km, fuel_type,
                archived, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                v.id,
                v.workspace_id,
                v.plate,
                v.make,
                v.model,
                v.year,
                v.mileage_km,
                v.fuel_type,
                v.archived as i32,
                v.created_at,
                v.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()> {
        let v = Self::unwrap_vehicle(entity)?;
        let rows = conn.execute(
            r#"
            UPDATE vehicle
            SET plate = ?1, make = ?2, model = ?3, year = ?4, mileage_km = ?5,
                fuel_type = ?6, archived = ?7, created_at = ?8, updated_at = ?9
            WHERE workspace_id = ?10 AND id = ?11
            "#,
            params![
                v.plate,
                v.make,
                v.model,
                v.year,
                v.mileage_km,
                v.fuel_type,
                v.archived as i32,
                v.created_at,
                v.updated_at,
                v.workspace_id,
                v.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "vehicle".to_string(),
                id: v.id.clone(),
            });
        }
        Ok(())
    }

    fn delete(&self, conn: &Connection, workspace_id: &str, id: &str) -> RepositoryResult<bool> {
        let rows = conn.execute(
            "DELETE FROM vehicle WHERE workspace_id = ?1 AND id = ?2",
            params![workspace_id, id],
        )?;
        Ok(rows > 0)
    }
}

// ==========================================
// ShiftRepository
// ==========================================
pub struct ShiftRepository;

const SHIFT_COLUMNS: &str = r#"
    id, workspace_id, shift_ref, staff_name, role, location,
    starts_at, ends_at, break_minutes, created_at, updated_at
"#;

impl ShiftRepository {
    fn map_row(row: &Row<'_>) -> rusqlite::Result<EntitySnapshot> {
        Ok(EntitySnapshot::Shift(Shift {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            shift_ref: row.get(2)?,
            staff_name: row.get(3)?,
            role: row.get(4)?,
            location: row.get(5)?,
            starts_at: row.get(6)?,
            ends_at: row.get(7)?,
            break_minutes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        }))
    }

    fn unwrap_shift(entity: &EntitySnapshot) -> RepositoryResult<&Shift> {
        match entity {
            EntitySnapshot::Shift(s) => Ok(s),
            other => Err(wrong_variant(EntityType::Shift, other)),
        }
    }
}

impl EntityRepository for ShiftRepository {
    fn entity_type(&self) -> EntityType {
        EntityType::Shift
    }

    fn load_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
    ) -> RepositoryResult<ExistingByKey> {
        let sql = format!(
            "SELECT {} FROM shift WHERE workspace_id = ?1 ORDER BY shift_ref, id",
            SHIFT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![workspace_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keyed(ImportType::Shifts, entities))
    }

    fn find_by_id(
        &self,
        conn: &Connection,
        workspace_id: &str,
        id: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let sql = format!(
            "SELECT {} FROM shift WHERE workspace_id = ?1 AND id = ?2",
            SHIFT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![workspace_id, id], Self::map_row)
            .optional()?)
    }

    fn find_by_natural_key(
        &self,
        conn: &Connection,
        workspace_id: &str,
        natural_key: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let sql = format!(
            "SELECT {} FROM shift WHERE workspace_id = ?1 AND shift_ref = ?2",
            SHIFT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![workspace_id, natural_key], Self::map_row)
            .optional()?)
    }

    fn insert(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()> {
        let s = Self::unwrap_shift(entity)?;
        conn.execute(
            r#"
            INSERT INTO shift (
                id, workspace_id, shift_ref, staff_name, role, location,
                starts_at, ends_at, break_minutes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                s.id,
                s.workspace_id,
                s.shift_ref,
                s.staff_name,
                s.role,
                s.location,
                s.starts_at,
                s.ends_at,
                s.break_minutes,
                s.created_at,
                s.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, entity: &EntitySnapshot) -> RepositoryResult<()> {
        let s = Self::unwrap_shift(entity)?;
        let rows = conn.execute(
            r#"
            UPDATE shift
            SET shift_ref = ?1, staff_name = ?2, role = ?3, location = ?4,
                starts_at = ?5, ends_at = ?6, break_minutes = ?7,
                created_at = ?8, updated_at = ?9
            WHERE workspace_id = ?10 AND id = ?11
            "#,
            params![
                s.shift_ref,
                s.staff_name,
                s.role,
                s.location,
                s.starts_at,
                s.ends_at,
                s.break_minutes,
                s.created_at,
                s.updated_at,
                s.workspace_id,
                s.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "shift".to_string(),
                id: s.id.clone(),
            });
        }
        Ok(())
    }

    fn delete(&self, conn: &Connection, workspace_id: &str, id: &str) -> RepositoryResult<bool> {
        let rows = conn.execute(
            "DELETE FROM shift WHERE workspace_id = ?1 AND id = ?2",
            params![workspace_id, id],
        )?;
        Ok(rows > 0)
    }
}
