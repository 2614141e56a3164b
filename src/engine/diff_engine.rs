// ==========================================
// 车队排班导入系统 - 差异分类引擎
// ==========================================
// 职责: 映射后的行 × 现有实体 → create / update / skip / error (+ archive)
// 红线: 纯函数，无时钟、无随机 ID、无 IO；相同输入必得相同输出
// 红线: 同批次内重复自然键 → 第二次及以后出现记为 error，绝不覆盖
// ==========================================

use crate::domain::diff::{DiffRecord, DiffSummary, FieldChange};
use crate::domain::entity::{EntitySnapshot, ExistingByKey, FieldValue};
use crate::domain::schema::EntitySchema;
use crate::domain::types::{DiffAction, EntityType, ImportType};
use crate::importer::column_mapper::MappedRow;
use std::collections::BTreeMap;
use tracing::debug;

// ==========================================
// ArchivePolicy - 缺席实体处理策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePolicy {
    /// 全量同步: 上传中缺席的现有实体归档
    ArchiveMissing,
    /// 增量导入: 从不归档
    KeepMissing,
}

impl ArchivePolicy {
    pub fn for_import_type(import_type: ImportType) -> Self {
        if import_type.is_full_sync() {
            ArchivePolicy::ArchiveMissing
        } else {
            ArchivePolicy::KeepMissing
        }
    }
}

// ==========================================
// DiffEngine
// ==========================================
pub struct DiffEngine<'a> {
    schema: &'a EntitySchema,
    policy: ArchivePolicy,
}

impl<'a> DiffEngine<'a> {
    pub fn new(schema: &'a EntitySchema, policy: ArchivePolicy) -> Self {
        Self { schema, policy }
    }

    /// 按导入类型默认策略构造
    pub fn for_schema(schema: &'a EntitySchema) -> Self {
        Self::new(schema, ArchivePolicy::for_import_type(schema.import_type))
    }

    /// 分类全部行
    ///
    /// # 参数
    /// - rows: 映射后的行（顺序即源文件数据行顺序）
    /// - existing: 规范化自然键 → 现有实体（同键多实体时该键的行记为 error）
    pub fn classify(&self, rows: &[MappedRow], existing: &ExistingByKey) -> DiffSummary {
        let mut records = Vec::with_capacity(rows.len());
        // 自然键 → 首次出现行号
        let mut first_seen: BTreeMap<String, usize> = BTreeMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;

            let key = row
                .get(self.schema.natural_key)
                .and_then(|raw| self.schema.normalize_key(raw));
            let Some(key) = key else {
                records.push(DiffRecord::error(
                    row_number,
                    None,
                    format!("自然键 {} 为空", self.schema.natural_key),
                ));
                continue;
            };

            if let Some(first) = first_seen.get(&key) {
                records.push(DiffRecord::error(
                    row_number,
                    Some(key.clone()),
                    format!("同批次内重复自然键: {}（首次出现于第 {} 行）", key, first),
                ));
                continue;
            }
            first_seen.insert(key.clone(), row_number);

            let current = match existing.get(&key).map(Vec::as_slice) {
                None | Some([]) => None,
                Some([only]) => Some(only),
                Some(many) => {
                    let ids: Vec<&str> = many.iter().map(|e| e.id()).collect();
                    records.push(DiffRecord::error(
                        row_number,
                        Some(key.clone()),
                        format!(
                            "自然键 {} 对应 {} 个现有实体（{}），无法确定更新目标",
                            key,
                            many.len(),
                            ids.join(", ")
                        ),
                    ));
                    continue;
                }
            };

            let record = self.classify_row(row_number, &key, row, current);
            records.push(record);
        }

        if self.policy == ArchivePolicy::ArchiveMissing {
            let missing = existing
                .iter()
                .filter(|(key, _)| !first_seen.contains_key(*key))
                .flat_map(|(key, group)| group.iter().map(move |entity| (key, entity)))
                .filter(|(_, entity)| !entity.is_archived());

            for (key, entity) in missing {
                records.push(DiffRecord {
                    row_number: None,
                    action: DiffAction::Archive,
                    natural_key: Some(key.clone()),
                    entity_id: Some(entity.id().to_string()),
                    changes: vec![FieldChange {
                        field: "archived".to_string(),
                        before: FieldValue::Bool(false),
                        after: FieldValue::Bool(true),
                    }],
                    before: Some(entity.clone()),
                    values: BTreeMap::new(),
                    error: None,
                });
            }
        }

        let summary = DiffSummary::from_records(rows.len(), records);
        debug!(
            total = summary.total_rows,
            creates = summary.creates,
            updates = summary.updates,
            archives = summary.archives,
            skips = summary.skips,
            errors = summary.errors,
            "差异分类完成"
        );
        summary
    }

    /// 单行分类（自然键已确认非空且首次出现）
    fn classify_row(
        &self,
        row_number: usize,
        key: &str,
        row: &MappedRow,
        current: Option<&EntitySnapshot>,
    ) -> DiffRecord {
        let values = match self.coerce_row(key, row) {
            Ok(values) => values,
            Err(message) => return DiffRecord::error(row_number, Some(key.to_string()), message),
        };

        if let Err(message) = self.cross_field_check(&values, current) {
            return DiffRecord::error(row_number, Some(key.to_string()), message);
        }

        match current {
            None => {
                let missing: Vec<&str> = self
                    .schema
                    .required_fields()
                    .filter(|f| !values.contains_key(f.name))
                    .map(|f| f.name)
                    .collect();
                if !missing.is_empty() {
                    return DiffRecord::error(
                        row_number,
                        Some(key.to_string()),
                        format!("新建缺少必填字段: {}", missing.join(", ")),
                    );
                }

                DiffRecord {
                    row_number: Some(row_number),
                    action: DiffAction::Create,
                    natural_key: Some(key.to_string()),
                    entity_id: None,
                    changes: Vec::new(),
                    before: None,
                    values,
                    error: None,
                }
            }
            Some(entity) => {
                let mut changes: Vec<FieldChange> = values
                    .iter()
                    .filter_map(|(field, after)| {
                        let before = entity.field(field).unwrap_or(FieldValue::Null);
                        (before != *after).then(|| FieldChange {
                            field: field.clone(),
                            before,
                            after: after.clone(),
                        })
                    })
                    .collect();

                // 已归档车辆再次出现 → 重新启用
                if entity.is_archived() {
                    changes.push(FieldChange {
                        field: "archived".to_string(),
                        before: FieldValue::Bool(true),
                        after: FieldValue::Bool(false),
                    });
                }

                let action = if changes.is_empty() {
                    DiffAction::Skip
                } else {
                    DiffAction::Update
                };

                DiffRecord {
                    row_number: Some(row_number),
                    action,
                    natural_key: Some(key.to_string()),
                    entity_id: Some(entity.id().to_string()),
                    before: (action == DiffAction::Update).then(|| entity.clone()),
                    changes,
                    values: BTreeMap::new(),
                    error: None,
                }
            }
        }
    }

    /// 字符串 → 类型化字段值（汇总全部字段错误）
    fn coerce_row(&self, key: &str, row: &MappedRow) -> Result<BTreeMap<String, FieldValue>, String> {
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();

        for (field, raw) in row {
            if field == self.schema.natural_key {
                values.insert(field.clone(), FieldValue::Text(key.to_string()));
                continue;
            }
            let Some(spec) = self.schema.field(field) else {
                continue;
            };
            match spec.coerce(raw) {
                Ok(value) => {
                    values.insert(field.clone(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors.join("; "))
        }
    }

    /// 跨字段校验（班次: 结束时间晚于开始时间）
    fn cross_field_check(
        &self,
        values: &BTreeMap<String, FieldValue>,
        current: Option<&EntitySnapshot>,
    ) -> Result<(), String> {
        if self.schema.entity_type != EntityType::Shift {
            return Ok(());
        }

        let effective = |field: &str| {
            values
                .get(field)
                .cloned()
                .or_else(|| current.and_then(|c| c.field(field)))
        };

        // 规范化时间格式可直接按字符串比较
        if let (Some(FieldValue::Text(starts)), Some(FieldValue::Text(ends))) =
            (effective("starts_at"), effective("ends_at"))
        {
            if ends <= starts {
                return Err(format!("结束时间 {} 必须晚于开始时间 {}", ends, starts));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Shift, Vehicle};
    use crate::domain::schema::schema_for;
    use chrono::{NaiveDateTime, TimeZone, Utc};

    fn row(pairs: &[(&str, &str)]) -> MappedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn vehicle(id: &str, plate: &str, mileage: i64, archived: bool) -> EntitySnapshot {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        EntitySnapshot::Vehicle(Vehicle {
            id: id.to_string(),
            workspace_id: "ws".to_string(),
            plate: plate.to_string(),
            make: Some("Volvo".to_string()),
            model: None,
            year: None,
            mileage_km: Some(mileage),
            fuel_type: None,
            archived,
            created_at: ts,
            updated_at: ts,
        })
    }

    fn fleet_existing(entities: Vec<EntitySnapshot>) -> ExistingByKey {
        let schema = schema_for(ImportType::Fleet);
        let mut grouped = ExistingByKey::new();
        for e in entities {
            let key = schema.normalize_key(e.natural_key()).unwrap();
            grouped.entry(key).or_default().push(e);
        }
        grouped
    }

    #[test]
    fn test_scenario_a_counts() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::new(schema, ArchivePolicy::KeepMissing);
        let existing = fleet_existing(vec![vehicle("v1", "AB123CD", 100_000, false)]);
        let rows = vec![
            row(&[("plate", "AB123CD"), ("mileage_km", "120000")]),
            row(&[("plate", "NEW001"), ("mileage_km", "10")]),
            row(&[("plate", ""), ("mileage_km", "5")]),
        ];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.total_rows, 3);
        assert_eq!(diff.creates, 1);
        assert_eq!(diff.updates, 1);
        assert_eq!(diff.errors, 1);
        assert_eq!(diff.skips, 0);

        let update = &diff.records[0];
        assert_eq!(update.action, DiffAction::Update);
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].before, FieldValue::Int(100_000));
        assert_eq!(update.changes[0].after, FieldValue::Int(120_000));
        assert_eq!(diff.records[2].row_number, Some(3));
    }

    #[test]
    fn test_unchanged_row_is_skip_and_numeric_coercion_applies() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![vehicle("v1", "AB123CD", 100_000, false)]);
        let rows = vec![row(&[
            ("plate", " ab123cd "),
            ("mileage_km", "100000.0"),
            ("make", "Volvo"),
        ])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.skips, 1);
        assert_eq!(diff.archives, 0);
        assert_eq!(diff.records[0].entity_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_duplicate_key_second_occurrence_is_error() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let rows = vec![
            row(&[("plate", "AB1")]),
            row(&[("plate", "ab 1")]),
            row(&[("plate", "AB1")]),
        ];

        let diff = engine.classify(&rows, &ExistingByKey::new());

        assert_eq!(diff.creates, 1);
        assert_eq!(diff.errors, 2);
        assert!(diff.records[1].error.as_ref().unwrap().contains("第 1 行"));
    }

    #[test]
    fn test_full_sync_archives_absent_active_entities_only() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![
            vehicle("v1", "KEEP1", 1, false),
            vehicle("v2", "GONE2", 1, false),
            vehicle("v3", "OLD3", 1, true),
        ]);
        let rows = vec![row(&[("plate", "KEEP1"), ("mileage_km", "1")])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.skips, 1);
        assert_eq!(diff.archives, 1);
        let archive = diff.records.last().unwrap();
        assert_eq!(archive.action, DiffAction::Archive);
        assert_eq!(archive.entity_id.as_deref(), Some("v2"));
        assert_eq!(archive.row_number, None);
    }

    #[test]
    fn test_error_row_key_still_counts_as_present() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![vehicle("v1", "AB1", 1, false)]);
        let rows = vec![row(&[("plate", "AB1"), ("year", "not-a-year")])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.errors, 1);
        assert_eq!(diff.archives, 0);
    }

    #[test]
    fn test_archived_vehicle_reappearing_is_reactivated() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![vehicle("v1", "AB1", 5, true)]);
        let rows = vec![row(&[("plate", "AB1"), ("mileage_km", "5")])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.updates, 1);
        let change = &diff.records[0].changes[0];
        assert_eq!(change.field, "archived");
        assert_eq!(change.after, FieldValue::Bool(false));
    }

    #[test]
    fn test_incremental_never_archives() {
        let schema = schema_for(ImportType::Shifts);
        let engine = DiffEngine::for_schema(schema);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let at = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap();
        let existing: ExistingByKey = [(
            "S-OLD".to_string(),
            vec![EntitySnapshot::Shift(Shift {
                id: "s0".to_string(),
                workspace_id: "ws".to_string(),
                shift_ref: "S-OLD".to_string(),
                staff_name: "Kim".to_string(),
                role: None,
                location: None,
                starts_at: at("2025-03-01T08:00:00"),
                ends_at: at("2025-03-01T16:00:00"),
                break_minutes: None,
                created_at: ts,
                updated_at: ts,
            })],
        )]
        .into_iter()
        .collect();

        let rows = vec![
            row(&[
                ("shift_ref", "S-NEW"),
                ("staff_name", "Lee"),
                ("starts_at", "2025-03-02 08:00"),
                ("ends_at", "2025-03-02 16:00"),
            ]),
            // 仅改结束时间 → 与现有开始时间比较
            row(&[("shift_ref", "S-OLD"), ("ends_at", "2025-03-01 07:00")]),
        ];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.creates, 1);
        assert_eq!(diff.errors, 1);
        assert_eq!(diff.archives, 0);
        assert!(diff.records[1].error.as_ref().unwrap().contains("必须晚于"));
    }

    #[test]
    fn test_create_missing_required_fields_is_error() {
        let schema = schema_for(ImportType::Shifts);
        let engine = DiffEngine::for_schema(schema);
        let rows = vec![row(&[("shift_ref", "S-1"), ("staff_name", "Kim")])];

        let diff = engine.classify(&rows, &ExistingByKey::new());

        assert_eq!(diff.errors, 1);
        let msg = diff.records[0].error.as_ref().unwrap();
        assert!(msg.contains("starts_at") && msg.contains("ends_at"));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![
            vehicle("v1", "AB1", 1, false),
            vehicle("v2", "CD2", 2, false),
        ]);
        let rows = vec![
            row(&[("plate", "AB1"), ("mileage_km", "9")]),
            row(&[("plate", "EF3"), ("make", "Ford")]),
            row(&[("plate", "")]),
        ];

        let first = engine.classify(&rows, &existing);
        let second = engine.classify(&rows, &existing);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_partition_is_complete() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![
            vehicle("v1", "AB1", 1, false),
            vehicle("v2", "CD2", 2, false),
            vehicle("v3", "GH4", 2, false),
        ]);
        let rows = vec![
            row(&[("plate", "AB1"), ("mileage_km", "1")]),
            row(&[("plate", "CD2"), ("mileage_km", "3")]),
            row(&[("plate", "EF3")]),
            row(&[("plate", "EF3")]),
            row(&[("mileage_km", "3")]),
        ];

        let diff = engine.classify(&rows, &existing);

        let row_records = diff.records.iter().filter(|r| r.row_number.is_some()).count();
        assert_eq!(row_records, rows.len());
        assert_eq!(diff.creates + diff.updates + diff.skips + diff.errors, rows.len());
        assert_eq!(diff.archives, 1);
    }

    #[test]
    fn test_colliding_keys_are_all_archived_when_missing() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![
            vehicle("v1", "AB 1", 1, false),
            vehicle("v2", "ab1", 2, false),
        ]);
        let rows = vec![row(&[("plate", "ZZ9")])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.creates, 1);
        assert_eq!(diff.archives, 2);
        let archived: Vec<_> = diff
            .records
            .iter()
            .filter(|r| r.action == DiffAction::Archive)
            .map(|r| r.entity_id.clone().unwrap())
            .collect();
        assert_eq!(archived, vec!["v1", "v2"]);
    }

    #[test]
    fn test_row_matching_colliding_key_is_error() {
        let schema = schema_for(ImportType::Fleet);
        let engine = DiffEngine::for_schema(schema);
        let existing = fleet_existing(vec![
            vehicle("v1", "AB 1", 1, false),
            vehicle("v2", "ab1", 2, false),
        ]);
        let rows = vec![row(&[("plate", "Ab1"), ("mileage_km", "7")])];

        let diff = engine.classify(&rows, &existing);

        assert_eq!(diff.errors, 1);
        assert_eq!(diff.updates, 0);
        // 出现在上传中的键不归档
        assert_eq!(diff.archives, 0);
        let msg = diff.records[0].error.as_ref().unwrap();
        assert!(msg.contains("v1") && msg.contains("v2"));
    }
}
