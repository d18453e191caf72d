use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::StorageLocation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterDataType {
    #[default]
    String,
    Number,
    Datetime,
}

impl FilterDataType {
    /// Operators a filter of this data type may use. The first is the default.
    pub fn operators(self) -> &'static [FilterOperator] {
        use FilterOperator as Op;
        match self {
            FilterDataType::String => &[Op::In, Op::NotIn, Op::Eq, Op::Ne],
            FilterDataType::Number => &[Op::Eq, Op::Ne, Op::Gt, Op::Lt, Op::Ge, Op::Le],
            FilterDataType::Datetime => &[Op::Eq, Op::Lt, Op::Le, Op::Gt, Op::Ge, Op::Between],
        }
    }

    pub fn default_operator(self) -> FilterOperator {
        self.operators()[0]
    }

    pub fn allows(self, op: FilterOperator) -> bool {
        self.operators().contains(&op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterDataType::String => "string",
            FilterDataType::Number => "number",
            FilterDataType::Datetime => "datetime",
        }
    }
}

impl fmt::Display for FilterDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
pub enum FilterOperator {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "between")]
    Between,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not in",
            FilterOperator::Eq => "==",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Ge => ">=",
            FilterOperator::Le => "<=",
            FilterOperator::Between => "between",
        }
    }

    fn is_list(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw form input for a filter. Only `between` takes a range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(String),
    Range { start: String, end: String },
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Scalar(String::new())
    }
}

impl FilterValue {
    fn empty_for(op: FilterOperator) -> FilterValue {
        if op == FilterOperator::Between {
            FilterValue::Range {
                start: String::new(),
                end: String::new(),
            }
        } else {
            FilterValue::default()
        }
    }

    pub fn is_filled(&self) -> bool {
        match self {
            FilterValue::Scalar(v) => !v.trim().is_empty(),
            FilterValue::Range { start, end } => !start.trim().is_empty() && !end.trim().is_empty(),
        }
    }

    fn is_range(&self) -> bool {
        matches!(self, FilterValue::Range { .. })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Operator \"{operator}\" is not available for {data_type} filters")]
    IllegalOperator {
        operator: FilterOperator,
        data_type: FilterDataType,
    },
    #[error("Operator \"{0}\" expects a start/end range")]
    ExpectedRange(FilterOperator),
    #[error("Operator \"{0}\" expects a single value")]
    ExpectedScalar(FilterOperator),
}

/// A property condition on the node a norm targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: FilterDataType,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: FilterValue,
    #[serde(default)]
    pub storage: StorageLocation,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_type: FilterDataType::String,
            operator: FilterDataType::String.default_operator(),
            value: FilterValue::default(),
            storage: StorageLocation::Property,
        }
    }
}

impl Filter {
    /// Switching data type resets the operator to that type's default and
    /// clears the value.
    pub fn set_data_type(&mut self, data_type: FilterDataType) {
        if self.data_type == data_type {
            return;
        }
        self.data_type = data_type;
        self.operator = data_type.default_operator();
        self.value = FilterValue::empty_for(self.operator);
    }

    pub fn set_operator(&mut self, operator: FilterOperator) -> Result<(), FilterError> {
        if !self.data_type.allows(operator) {
            return Err(FilterError::IllegalOperator {
                operator,
                data_type: self.data_type,
            });
        }
        if (operator == FilterOperator::Between) != self.value.is_range() {
            self.value = FilterValue::empty_for(operator);
        }
        self.operator = operator;
        Ok(())
    }

    pub fn set_value(&mut self, value: FilterValue) -> Result<(), FilterError> {
        match (self.operator == FilterOperator::Between, value.is_range()) {
            (true, false) => Err(FilterError::ExpectedRange(self.operator)),
            (false, true) => Err(FilterError::ExpectedScalar(self.operator)),
            _ => {
                self.value = value;
                Ok(())
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && self.value.is_filled()
    }

    /// True when a number filter's input is not a finite number.
    pub fn has_invalid_number(&self) -> bool {
        match (&self.data_type, &self.value) {
            (FilterDataType::Number, FilterValue::Scalar(raw)) => {
                raw.trim().parse::<f64>().map_or(true, |n| !n.is_finite())
            }
            _ => false,
        }
    }

    /// The value as the analysis service expects it for this data type and operator.
    pub fn coerced_value(&self) -> Value {
        match (&self.value, self.data_type) {
            (FilterValue::Range { start, end }, _) => {
                Value::Array(vec![Value::String(start.clone()), Value::String(end.clone())])
            }
            (FilterValue::Scalar(raw), FilterDataType::Number) => number_value(raw),
            (FilterValue::Scalar(raw), FilterDataType::String) if self.operator.is_list() => {
                Value::Array(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| Value::String(s.to_string()))
                        .collect(),
                )
            }
            (FilterValue::Scalar(raw), _) => Value::String(raw.clone()),
        }
    }

    /// Human-readable value, used in generated descriptions.
    pub fn display_value(&self) -> String {
        match &self.value {
            FilterValue::Scalar(v) => format!("\"{}\"", v.trim()),
            FilterValue::Range { start, end } => {
                format!("\"{}\" and \"{}\"", start.trim(), end.trim())
            }
        }
    }

    pub fn to_execution(&self) -> ExecutionFilter {
        ExecutionFilter {
            name: self.name.trim().to_string(),
            data_type: self.data_type,
            operator: self.operator,
            value: self.coerced_value(),
            storage: self.storage,
        }
    }
}

/// Integral inputs become JSON integers so "100" serializes as `100`.
fn number_value(raw: &str) -> Value {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(n as i64),
        Ok(n) => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Err(_) => Value::Null,
    }
}

/// A supplementary filter as carried by a created norm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionFilter {
    pub name: String,
    pub data_type: FilterDataType,
    pub operator: FilterOperator,
    pub value: Value,
    #[serde(default)]
    pub storage: StorageLocation,
}
