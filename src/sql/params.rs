//! Convert serde_json::Value and Rust scalars into values sqlx can bind for MySQL.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::mysql::{MySql, MySqlTypeInfo};
use sqlx::types::Json;
use sqlx::{Database, Type};

/// A value that can be bound to a MySQL query placeholder (`?`).
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Json(Value),
}

impl SqlParam {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlParam::I64(i)
                } else if let Some(u) = n.as_u64() {
                    SqlParam::U64(u)
                } else {
                    SqlParam::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqlParam::String(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlParam::Json(v.clone()),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::String(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::String(s)
    }
}

impl From<i64> for SqlParam {
    fn from(n: i64) -> Self {
        SqlParam::I64(n)
    }
}

impl From<i32> for SqlParam {
    fn from(n: i32) -> Self {
        SqlParam::I64(n.into())
    }
}

impl From<u64> for SqlParam {
    fn from(n: u64) -> Self {
        SqlParam::U64(n)
    }
}

impl From<f64> for SqlParam {
    fn from(n: f64) -> Self {
        SqlParam::F64(n)
    }
}

impl From<bool> for SqlParam {
    fn from(b: bool) -> Self {
        SqlParam::Bool(b)
    }
}

impl From<Value> for SqlParam {
    fn from(v: Value) -> Self {
        SqlParam::from_json(&v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

impl<'q> Encode<'q, MySql> for SqlParam {
    fn encode_by_ref(
        &self,
        buf: &mut <MySql as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            SqlParam::Null => <Option<String> as Encode<MySql>>::encode_by_ref(&None, buf)?,
            SqlParam::Bool(b) => <bool as Encode<MySql>>::encode_by_ref(b, buf)?,
            SqlParam::I64(n) => <i64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            SqlParam::U64(n) => <u64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            SqlParam::F64(n) => <f64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            SqlParam::String(s) => <String as Encode<MySql>>::encode_by_ref(s, buf)?,
            SqlParam::Json(v) => <Json<&Value> as Encode<MySql>>::encode_by_ref(&Json(v), buf)?,
        })
    }

    // The wire type differs per variant, so advertise it per value.
    fn produces(&self) -> Option<MySqlTypeInfo> {
        Some(match self {
            SqlParam::Null | SqlParam::String(_) => <String as Type<MySql>>::type_info(),
            SqlParam::Bool(_) => <bool as Type<MySql>>::type_info(),
            SqlParam::I64(_) => <i64 as Type<MySql>>::type_info(),
            SqlParam::U64(_) => <u64 as Type<MySql>>::type_info(),
            SqlParam::F64(_) => <f64 as Type<MySql>>::type_info(),
            SqlParam::Json(_) => <Json<Value> as Type<MySql>>::type_info(),
        })
    }
}

impl Type<MySql> for SqlParam {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<MySql>>::type_info()
    }

    fn compatible(_ty: &MySqlTypeInfo) -> bool {
        true
    }
}
