// ==========================================
// 车队排班导入系统 - 列映射器实现
// ==========================================
// 职责: 源表头 → 标准字段
// 优先级: 显式映射 > 模板映射 > 同名直通
// 约束: 模板表为静态只读，启动后不可变
// ==========================================

use crate::domain::import_batch::ColumnMapping;
use crate::domain::schema::EntitySchema;
use crate::domain::types::ImportType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::RawRow;
use std::collections::BTreeMap;

/// 映射后的行（标准字段 → 原始字符串）
pub type MappedRow = BTreeMap<String, String>;

// ==========================================
// MappingTemplate - 命名映射模板
// ==========================================
#[derive(Debug)]
pub struct MappingTemplate {
    pub name: &'static str,
    pub import_type: ImportType,
    pub description: &'static str,
    /// (源表头别名, 标准字段)；表头比较忽略大小写
    pub columns: &'static [(&'static str, &'static str)],
}

impl MappingTemplate {
    fn lookup(&self, header: &str) -> Option<&'static str> {
        let wanted = header.trim().to_lowercase();
        self.columns
            .iter()
            .find(|(alias, _)| alias.to_lowercase() == wanted)
            .map(|(_, field)| *field)
    }
}

static TEMPLATES: [MappingTemplate; 3] = [
    MappingTemplate {
        name: "fleet_default",
        import_type: ImportType::Fleet,
        description: "车队台账通用导出",
        columns: &[
            ("Plate", "plate"),
            ("Plate Number", "plate"),
            ("Registration", "plate"),
            ("车牌号", "plate"),
            ("Make", "make"),
            ("品牌", "make"),
            ("Model", "model"),
            ("型号", "model"),
            ("Year", "year"),
            ("年份", "year"),
            ("Mileage", "mileage_km"),
            ("Mileage (km)", "mileage_km"),
            ("Odometer", "mileage_km"),
            ("里程", "mileage_km"),
            ("Fuel", "fuel_type"),
            ("Fuel Type", "fuel_type"),
            ("燃料类型", "fuel_type"),
        ],
    },
    MappingTemplate {
        name: "fleet_telematics",
        import_type: ImportType::Fleet,
        description: "车载终端平台导出",
        columns: &[
            ("vehicle_registration", "plate"),
            ("manufacturer", "make"),
            ("vehicle_model", "model"),
            ("model_year", "year"),
            ("odometer_km", "mileage_km"),
            ("energy_source", "fuel_type"),
        ],
    },
    MappingTemplate {
        name: "shifts_default",
        import_type: ImportType::Shifts,
        description: "排班表通用导出",
        columns: &[
            ("Shift ID", "shift_ref"),
            ("Shift Ref", "shift_ref"),
            ("班次编号", "shift_ref"),
            ("Employee", "staff_name"),
            ("Staff", "staff_name"),
            ("员工", "staff_name"),
            ("Role", "role"),
            ("岗位", "role"),
            ("Location", "location"),
            ("Site", "location"),
            ("地点", "location"),
            ("Start", "starts_at"),
            ("Start Time", "starts_at"),
            ("开始时间", "starts_at"),
            ("End", "ends_at"),
            ("End Time", "ends_at"),
            ("结束时间", "ends_at"),
            ("Break (min)", "break_minutes"),
            ("Break Minutes", "break_minutes"),
            ("休息分钟", "break_minutes"),
        ],
    },
];

/// 全部模板
pub fn templates() -> &'static [MappingTemplate] {
    &TEMPLATES
}

/// 按名称 + 导入类型查找模板
pub fn find_template(name: &str, import_type: ImportType) -> ImportResult<&'static MappingTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.name == name.trim() && t.import_type == import_type)
        .ok_or_else(|| ImportError::UnknownTemplate {
            name: name.to_string(),
            import_type: import_type.to_string(),
        })
}

// ==========================================
// MappingOutcome - 映射结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    pub rows: Vec<MappedRow>,
    /// 实际生效的 源表头 → 标准字段
    pub resolved: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

// ==========================================
// ColumnMapper
// ==========================================
pub struct ColumnMapper<'a> {
    schema: &'a EntitySchema,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    /// 解析每个表头的目标字段
    ///
    /// # 返回
    /// - resolved: 生效映射（重复目标时先出现的表头优先）
    /// - warnings: 被忽略的列
    pub fn resolve(
        &self,
        headers: &[String],
        mapping: &ColumnMapping,
    ) -> ImportResult<(BTreeMap<String, String>, Vec<String>)> {
        let template = match &mapping.template {
            Some(name) => Some(find_template(name, self.schema.import_type)?),
            None => None,
        };

        let mut resolved = BTreeMap::new();
        // 标准字段 → 首个占用它的表头
        let mut claimed: BTreeMap<String, String> = BTreeMap::new();
        let mut warnings = Vec::new();

        for header in headers {
            // 显式映射 > 模板 > 同名直通
            let target = match mapping.columns.get(header) {
                Some(explicit) => explicit.trim().to_string(),
                None => template
                    .and_then(|t| t.lookup(header))
                    .map(str::to_string)
                    .unwrap_or_else(|| header.trim().to_string()),
            };

            if target.is_empty() {
                continue; // 显式忽略
            }
            if !self.schema.is_known_field(&target) {
                warnings.push(format!(
                    "列 {} 未映射到 {} 字段，已忽略",
                    header, self.schema.entity_type
                ));
                continue;
            }
            if let Some(first) = claimed.get(&target) {
                warnings.push(format!(
                    "列 {} 与列 {} 映射到同一字段 {}，以 {} 为准",
                    header, first, target, first
                ));
                continue;
            }

            claimed.insert(target.clone(), header.clone());
            resolved.insert(header.clone(), target);
        }

        Ok((resolved, warnings))
    }

    /// 应用映射到全部行
    pub fn apply(
        &self,
        headers: &[String],
        rows: &[RawRow],
        mapping: &ColumnMapping,
    ) -> ImportResult<MappingOutcome> {
        let (resolved, warnings) = self.resolve(headers, mapping)?;

        let mapped_rows = rows
            .iter()
            .map(|row| {
                resolved
                    .iter()
                    .filter_map(|(source, target)| {
                        // 短行缺失的列视为未提供，而非空值
                        row.get(source).map(|value| (target.clone(), value.clone()))
                    })
                    .collect::<MappedRow>()
            })
            .collect();

        Ok(MappingOutcome {
            rows: mapped_rows,
            resolved,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::schema_for;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identity_passthrough() {
        let mapper = ColumnMapper::new(schema_for(ImportType::Fleet));
        let outcome = mapper
            .apply(
                &headers(&["plate", "mileage_km"]),
                &[row(&[("plate", "AB123CD"), ("mileage_km", "10")])],
                &ColumnMapping::default(),
            )
            .unwrap();

        assert_eq!(outcome.rows[0].get("plate"), Some(&"AB123CD".to_string()));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_template_is_case_insensitive() {
        let mapper = ColumnMapper::new(schema_for(ImportType::Fleet));
        let mapping = ColumnMapping {
            template: Some("fleet_default".to_string()),
            columns: BTreeMap::new(),
        };
        let (resolved, _) = mapper
            .resolve(&headers(&["REGISTRATION", "odometer"]), &mapping)
            .unwrap();

        assert_eq!(resolved.get("REGISTRATION"), Some(&"plate".to_string()));
        assert_eq!(resolved.get("odometer"), Some(&"mileage_km".to_string()));
    }

    #[test]
    fn test_explicit_mapping_overrides_template_and_can_drop() {
        let mapper = ColumnMapper::new(schema_for(ImportType::Fleet));
        let mut columns = BTreeMap::new();
        columns.insert("Plate".to_string(), "".to_string());
        columns.insert("Kennzeichen".to_string(), "plate".to_string());
        let mapping = ColumnMapping {
            template: Some("fleet_default".to_string()),
            columns,
        };

        let (resolved, warnings) = mapper
            .resolve(&headers(&["Plate", "Kennzeichen"]), &mapping)
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get("Kennzeichen"), Some(&"plate".to_string()));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_columns_and_collisions_warn() {
        let mapper = ColumnMapper::new(schema_for(ImportType::Fleet));
        let mapping = ColumnMapping {
            template: Some("fleet_default".to_string()),
            columns: BTreeMap::new(),
        };
        let (resolved, warnings) = mapper
            .resolve(&headers(&["Plate", "Registration", "Colour"]), &mapping)
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get("Plate"), Some(&"plate".to_string()));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_template_of_other_import_type_is_rejected() {
        let mapper = ColumnMapper::new(schema_for(ImportType::Shifts));
        let mapping = ColumnMapping {
            template: Some("fleet_default".to_string()),
            columns: BTreeMap::new(),
        };
        let err = mapper.resolve(&headers(&["Plate"]), &mapping).unwrap_err();
        assert!(matches!(err, ImportError::UnknownTemplate { .. }));
    }

    #[test]
    fn test_every_template_targets_known_fields() {
        for template in templates() {
            let schema = schema_for(template.import_type);
            for (_, field) in template.columns {
                assert!(schema.is_known_field(field), "{} → {}", template.name, field);
            }
        }
    }
}
