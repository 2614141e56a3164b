// ==========================================
// 车队排班导入系统 - 导入字段规范
// ==========================================
// 职责: 每种导入类型的标准字段、类型、必填、自然键
// 约束: 静态只读表，进程内不可变
// ==========================================

use crate::domain::entity::{FieldValue, CANONICAL_DATETIME_FORMAT};
use crate::domain::types::{EntityType, ImportType};
use chrono::NaiveDateTime;

// ==========================================
// FieldKind - 字段类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int { min: i64, max: i64 },
    DateTime,
}

// ==========================================
// FieldSpec - 单字段规范
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// 新建实体时必须提供
    pub required: bool,
}

impl FieldSpec {
    const fn text(name: &'static str, required: bool) -> Self {
        Self { name, kind: FieldKind::Text, required }
    }

    const fn int(name: &'static str, min: i64, max: i64) -> Self {
        Self { name, kind: FieldKind::Int { min, max }, required: false }
    }

    const fn datetime(name: &'static str, required: bool) -> Self {
        Self { name, kind: FieldKind::DateTime, required }
    }

    /// 字符串 → 类型化值（空串视为 null）
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            if self.required {
                return Err(format!("必填字段为空: {}", self.name));
            }
            return Ok(FieldValue::Null);
        }

        match self.kind {
            FieldKind::Text => Ok(FieldValue::Text(trimmed.to_string())),
            FieldKind::Int { min, max } => {
                let value = parse_int(trimmed)
                    .ok_or_else(|| format!("字段 {} 无法解析为整数: {}", self.name, trimmed))?;
                if value < min || value > max {
                    return Err(format!(
                        "字段 {} 值 {} 超出范围 [{}, {}]",
                        self.name, value, min, max
                    ));
                }
                Ok(FieldValue::Int(value))
            }
            FieldKind::DateTime => {
                let dt = parse_datetime(trimmed)
                    .ok_or_else(|| format!("字段 {} 时间格式错误: {}", self.name, trimmed))?;
                Ok(FieldValue::Text(dt.format(CANONICAL_DATETIME_FORMAT).to_string()))
            }
        }
    }
}

/// 整数解析，兼容电子表格导出的 "12000.0"
fn parse_int(value: &str) -> Option<i64> {
    let cleaned: String = value.chars().filter(|c| *c != '_' && *c != ' ').collect();
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    let f = cleaned.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// 时间解析（多格式兼容）
fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%Y%m%d%H%M%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

// ==========================================
// 自然键规范化
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNormalization {
    /// 车牌: 去空白 + 大写
    Plate,
    /// 仅去首尾空白
    Trim,
}

// ==========================================
// EntitySchema - 导入类型字段表
// ==========================================
#[derive(Debug)]
pub struct EntitySchema {
    pub import_type: ImportType,
    pub entity_type: EntityType,
    pub natural_key: &'static str,
    pub key_normalization: KeyNormalization,
    pub fields: &'static [FieldSpec],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_known_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// 规范化自然键（空值返回 None）
    pub fn normalize_key(&self, raw: &str) -> Option<String> {
        let key = match self.key_normalization {
            KeyNormalization::Plate => raw
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase(),
            KeyNormalization::Trim => raw.trim().to_string(),
        };
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}

static VEHICLE_FIELDS: [FieldSpec; 6] = [
    FieldSpec::text("plate", true),
    FieldSpec::text("make", false),
    FieldSpec::text("model", false),
    FieldSpec::int("year", 1900, 2100),
    FieldSpec::int("mileage_km", 0, 10_000_000),
    FieldSpec::text("fuel_type", false),
];

static SHIFT_FIELDS: [FieldSpec; 7] = [
    FieldSpec::text("shift_ref", true),
    FieldSpec::text("staff_name", true),
    FieldSpec::text("role", false),
    FieldSpec::text("location", false),
    FieldSpec::datetime("starts_at", true),
    FieldSpec::datetime("ends_at", true),
    FieldSpec::int("break_minutes", 0, 24 * 60),
];

static FLEET_SCHEMA: EntitySchema = EntitySchema {
    import_type: ImportType::Fleet,
    entity_type: EntityType::Vehicle,
    natural_key: "plate",
    key_normalization: KeyNormalization::Plate,
    fields: &VEHICLE_FIELDS,
};

static SHIFTS_SCHEMA: EntitySchema = EntitySchema {
    import_type: ImportType::Shifts,
    entity_type: EntityType::Shift,
    natural_key: "shift_ref",
    key_normalization: KeyNormalization::Trim,
    fields: &SHIFT_FIELDS,
};

/// 获取导入类型对应的字段表
pub fn schema_for(import_type: ImportType) -> &'static EntitySchema {
    match import_type {
        ImportType::Fleet => &FLEET_SCHEMA,
        ImportType::Shifts => &SHIFTS_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_normalization() {
        let schema = schema_for(ImportType::Fleet);
        assert_eq!(schema.normalize_key(" ab 123 cd "), Some("AB123CD".to_string()));
        assert_eq!(schema.normalize_key("   "), None);
    }

    #[test]
    fn test_int_coercion_accepts_spreadsheet_floats() {
        let spec = schema_for(ImportType::Fleet).field("mileage_km").unwrap();
        assert_eq!(spec.coerce("12000"), Ok(FieldValue::Int(12000)));
        assert_eq!(spec.coerce("12000.0"), Ok(FieldValue::Int(12000)));
        assert!(spec.coerce("12000.5").is_err());
        assert!(spec.coerce("-1").is_err());
        assert_eq!(spec.coerce(""), Ok(FieldValue::Null));
    }

    #[test]
    fn test_datetime_coercion_canonical_form() {
        let spec = schema_for(ImportType::Shifts).field("starts_at").unwrap();
        let expected = FieldValue::Text("2025-03-01T08:00:00".to_string());
        assert_eq!(spec.coerce("2025-03-01 08:00"), Ok(expected.clone()));
        assert_eq!(spec.coerce("20250301080000"), Ok(expected));
        assert!(spec.coerce("tomorrow").is_err());
        assert!(spec.coerce("").is_err());
    }
}
