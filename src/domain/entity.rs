// ==========================================
// 车队排班导入系统 - 导入目标实体
// ==========================================
// 职责: Vehicle / Shift 实体 + 快照联合类型
// 红线: 快照必须可逐字段精确还原（回滚依赖）
// ==========================================

use crate::domain::types::EntityType;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 规范化时间格式（DateTime 字段的字符串形态）
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 规范化自然键 → 现有实体
///
/// 同一规范化键下可能存在多个实体（如历史数据中的 "AB 1" 与 "ab1"）
pub type ExistingByKey = BTreeMap<String, Vec<EntitySnapshot>>;

// ==========================================
// FieldValue - 类型化字段值
// ==========================================
// 用途: 差异比较 / 差异持久化 / 实体赋值
// 序列化: untagged（null / bool / 整数 / 字符串）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FieldValue {
    fn from_opt_text(v: &Option<String>) -> Self {
        v.clone().map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }

    fn from_opt_int(v: Option<i64>) -> Self {
        v.map(FieldValue::Int).unwrap_or(FieldValue::Null)
    }

    fn from_datetime(v: &NaiveDateTime) -> Self {
        FieldValue::Text(v.format(CANONICAL_DATETIME_FORMAT).to_string())
    }

    fn as_opt_text(&self, field: &str) -> Result<Option<String>, String> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Text(s) => Ok(Some(s.clone())),
            other => Err(format!("字段 {} 期望文本，实际 {}", field, other)),
        }
    }

    fn as_opt_int(&self, field: &str) -> Result<Option<i64>, String> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Int(v) => Ok(Some(*v)),
            other => Err(format!("字段 {} 期望整数，实际 {}", field, other)),
        }
    }

    fn as_datetime(&self, field: &str) -> Result<NaiveDateTime, String> {
        match self {
            FieldValue::Text(s) => NaiveDateTime::parse_from_str(s, CANONICAL_DATETIME_FORMAT)
                .map_err(|_| format!("字段 {} 时间格式错误: {}", field, s)),
            other => Err(format!("字段 {} 期望时间，实际 {}", field, other)),
        }
    }

    fn as_text(&self, field: &str) -> Result<String, String> {
        self.as_opt_text(field)?
            .ok_or_else(|| format!("字段 {} 不能为空", field))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

// ==========================================
// Vehicle - 车辆（FLEET 导入目标）
// ==========================================
// 自然键: plate（规范化后工作区内唯一）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub workspace_id: String,
    pub plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub mileage_km: Option<i64>,
    pub fuel_type: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// 读取可导入字段的当前值（未知字段返回 None）
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "plate" => FieldValue::Text(self.plate.clone()),
            "make" => FieldValue::from_opt_text(&self.make),
            "model" => FieldValue::from_opt_text(&self.model),
            "year" => FieldValue::from_opt_int(self.year),
            "mileage_km" => FieldValue::from_opt_int(self.mileage_km),
            "fuel_type" => FieldValue::from_opt_text(&self.fuel_type),
            "archived" => FieldValue::Bool(self.archived),
            _ => return None,
        };
        Some(value)
    }

    pub fn set_field(&mut self, name: &str, value: &FieldValue) -> Result<(), String> {
        match name {
            "plate" => self.plate = value.as_text(name)?,
            "make" => self.make = value.as_opt_text(name)?,
            "model" => self.model = value.as_opt_text(name)?,
            "year" => self.year = value.as_opt_int(name)?,
            "mileage_km" => self.mileage_km = value.as_opt_int(name)?,
            "fuel_type" => self.fuel_type = value.as_opt_text(name)?,
            "archived" => match value {
                FieldValue::Bool(v) => self.archived = *v,
                other => return Err(format!("字段 archived 期望布尔，实际 {}", other)),
            },
            _ => return Err(format!("车辆不存在字段: {}", name)),
        }
        Ok(())
    }
}

// ==========================================
// Shift - 班次（SHIFTS 导入目标）
// ==========================================
// 自然键: shift_ref
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,
    pub workspace_id: String,
    pub shift_ref: String,
    pub staff_name: String,
    pub role: Option<String>,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub break_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "shift_ref" => FieldValue::Text(self.shift_ref.clone()),
            "staff_name" => FieldValue::Text(self.staff_name.clone()),
            "role" => FieldValue::from_opt_text(&self.role),
            "location" => FieldValue::from_opt_text(&self.location),
            "starts_at" => FieldValue::from_datetime(&self.starts_at),
            "ends_at" => FieldValue::from_datetime(&self.ends_at),
            "break_minutes" => FieldValue::from_opt_int(self.break_minutes),
            _ => return None,
        };
        Some(value)
    }

    pub fn set_field(&mut self, name: &str, value: &FieldValue) -> Result<(), String> {
        match name {
            "shift_ref" => self.shift_ref = value.as_text(name)?,
            "staff_name" => self.staff_name = value.as_text(name)?,
            "role" => self.role = value.as_opt_text(name)?,
            "location" => self.location = value.as_opt_text(name)?,
            "starts_at" => self.starts_at = value.as_datetime(name)?,
            "ends_at" => self.ends_at = value.as_datetime(name)?,
            "break_minutes" => self.break_minutes = value.as_opt_int(name)?,
            _ => return Err(format!("班次不存在字段: {}", name)),
        }
        Ok(())
    }
}

// ==========================================
// EntitySnapshot - 实体快照（联合类型）
// ==========================================
// 用途: before_json / after_json / 差异中的当前值
// 序列化: {"entityType": "vehicle", ...字段}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Vehicle(Vehicle),
    Shift(Shift),
}

impl EntitySnapshot {
    /// 按字段值构造新实体（创建行使用）
    ///
    /// # 参数
    /// - values: 已类型化的字段值（必须包含自然键及必填字段）
    pub fn build(
        entity_type: EntityType,
        id: String,
        workspace_id: String,
        values: &BTreeMap<String, FieldValue>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let mut snapshot = match entity_type {
            EntityType::Vehicle => EntitySnapshot::Vehicle(Vehicle {
                id,
                workspace_id,
                plate: String::new(),
                make: None,
                model: None,
                year: None,
                mileage_km: None,
                fuel_type: None,
                archived: false,
                created_at: now,
                updated_at: now,
            }),
            EntityType::Shift => EntitySnapshot::Shift(Shift {
                id,
                workspace_id,
                shift_ref: String::new(),
                staff_name: String::new(),
                role: None,
                location: None,
                starts_at: NaiveDateTime::default(),
                ends_at: NaiveDateTime::default(),
                break_minutes: None,
                created_at: now,
                updated_at: now,
            }),
        };

        for (field, value) in values {
            snapshot.set_field(field, value)?;
        }
        Ok(snapshot)
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EntitySnapshot::Vehicle(_) => EntityType::Vehicle,
            EntitySnapshot::Shift(_) => EntityType::Shift,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntitySnapshot::Vehicle(v) => &v.id,
            EntitySnapshot::Shift(s) => &s.id,
        }
    }

    pub fn workspace_id(&self) -> &str {
        match self {
            EntitySnapshot::Vehicle(v) => &v.workspace_id,
            EntitySnapshot::Shift(s) => &s.workspace_id,
        }
    }

    pub fn natural_key(&self) -> &str {
        match self {
            EntitySnapshot::Vehicle(v) => &v.plate,
            EntitySnapshot::Shift(s) => &s.shift_ref,
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            EntitySnapshot::Vehicle(v) => v.field(name),
            EntitySnapshot::Shift(s) => s.field(name),
        }
    }

    pub fn set_field(&mut self, name: &str, value: &FieldValue) -> Result<(), String> {
        match self {
            EntitySnapshot::Vehicle(v) => v.set_field(name, value),
            EntitySnapshot::Shift(s) => s.set_field(name, value),
        }
    }

    /// 是否已归档（班次无归档概念，恒为 false）
    pub fn is_archived(&self) -> bool {
        match self {
            EntitySnapshot::Vehicle(v) => v.archived,
            EntitySnapshot::Shift(_) => false,
        }
    }

    /// 标记归档
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        match self {
            EntitySnapshot::Vehicle(v) => {
                v.archived = true;
                v.updated_at = now;
                Ok(())
            }
            EntitySnapshot::Shift(s) => Err(format!("班次不支持归档: {}", s.shift_ref)),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        match self {
            EntitySnapshot::Vehicle(v) => v.updated_at = now,
            EntitySnapshot::Shift(s) => s.updated_at = now,
        }
    }

    /// 业务一致性校验（落库前）
    pub fn validate(&self) -> Result<(), String> {
        match self {
            EntitySnapshot::Vehicle(v) => {
                if v.plate.is_empty() {
                    return Err("车牌号为空".to_string());
                }
            }
            EntitySnapshot::Shift(s) => {
                if s.shift_ref.is_empty() {
                    return Err("班次编号为空".to_string());
                }
                if s.ends_at <= s.starts_at {
                    return Err(format!(
                        "班次结束时间必须晚于开始时间: {} ≤ {}",
                        s.ends_at, s.starts_at
                    ));
                }
            }
        }
        Ok(())
    }
}
