use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Numeric,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Greater,
    Less,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

impl Operator {
    fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Greater => lhs > rhs,
            Operator::Less => lhs < rhs,
            Operator::Equal => lhs == rhs,
            Operator::GreaterOrEqual => lhs >= rhs,
            Operator::LessOrEqual => lhs <= rhs,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Equal => "=",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "greater" | "gt" => Ok(Operator::Greater),
            "<" | "less" | "lt" => Ok(Operator::Less),
            "=" | "==" | "equal" | "eq" => Ok(Operator::Equal),
            ">=" | "greater_or_equal" | "gte" => Ok(Operator::GreaterOrEqual),
            "<=" | "less_or_equal" | "lte" => Ok(Operator::LessOrEqual),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

/// One structured filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default)]
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// An empty slot, the default state of every filter row.
    pub fn empty() -> Self {
        Self::new("", Operator::Equal, "")
    }

    pub fn is_inert(&self) -> bool {
        self.field.trim().is_empty() || self.value.trim().is_empty()
    }

    pub fn matches(&self, record: &Map<String, Value>, schema: &FilterSchema) -> bool {
        if self.is_inert() {
            return true;
        }
        let field_value = record.get(&self.field).unwrap_or(&Value::Null);
        match schema.field_type(&self.field) {
            FieldType::Boolean => stringify(field_value) == self.value.trim(),
            FieldType::Numeric => {
                let lhs = parse_number(field_value);
                let rhs = self.value.trim().parse::<f64>().unwrap_or(0.0);
                self.operator.compare(lhs, rhs)
            }
            FieldType::Select => stringify(field_value) == self.value,
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::empty()
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Declared field types of one collection kind. Unknown fields are treated as
/// select fields (exact match).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSchema {
    fields: HashMap<String, FieldType>,
}

impl FilterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, typ: FieldType) -> Self {
        self.fields.insert(field.to_string(), typ);
        self
    }

    pub fn field_type(&self, field: &str) -> FieldType {
        self.fields.get(field).copied().unwrap_or(FieldType::Select)
    }

    pub fn inventory() -> Self {
        Self::new()
            .with("type", FieldType::Select)
            .with("value", FieldType::Numeric)
            .with("weight", FieldType::Numeric)
            .with("count", FieldType::Numeric)
            .with("corrupted", FieldType::Boolean)
            .with("junk", FieldType::Boolean)
            .with("is_equippable", FieldType::Boolean)
    }

    pub fn buy_requests() -> Self {
        Self::new()
            .with("item_name", FieldType::Select)
            .with("buy_price", FieldType::Numeric)
            .with("buy_amount", FieldType::Numeric)
    }

    pub fn auction_lots() -> Self {
        Self::new()
            .with("item_name", FieldType::Select)
            .with("amount", FieldType::Numeric)
            .with("current_bid", FieldType::Numeric)
            .with("buyout_price", FieldType::Numeric)
    }
}

/// Returns true when every non-inert predicate accepts the record.
pub fn matches_all(record: &Map<String, Value>, filters: &[Predicate], schema: &FilterSchema) -> bool {
    filters.iter().all(|p| p.matches(record, schema))
}
