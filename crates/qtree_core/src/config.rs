use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use qtree_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

/// Value for a compile setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    UInt(u64),
    String(String),
}

impl SettingValue {
    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(DbError::new(format!("Expected a boolean value, got {other}"))),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        match self {
            Self::UInt(v) => Ok(*v as usize),
            other => Err(DbError::new(format!("Expected an integer value, got {other}"))),
        }
    }

    pub fn try_into_string(self) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(DbError::new(format!("Expected a string value, got {other}"))),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<usize> for SettingValue {
    fn from(value: usize) -> Self {
        SettingValue::UInt(value as u64)
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

/// Rewrite toggles and naming defaults for a single compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileConfig {
    pub enable_subquery_flattening: bool,
    pub enable_exists_join_flattening: bool,
    pub enable_subquery_materialization: bool,
    pub enable_predicate_pushdown: bool,
    pub enable_count_star_rewrite: bool,
    pub enable_in_to_expression_rewrite: bool,
    pub max_generated_name_length: usize,
    pub default_schema: String,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            enable_subquery_flattening: true,
            enable_exists_join_flattening: true,
            enable_subquery_materialization: true,
            enable_predicate_pushdown: true,
            enable_count_star_rewrite: true,
            enable_in_to_expression_rewrite: true,
            max_generated_name_length: DEFAULT_MAX_GENERATED_NAME_LENGTH,
            default_schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

impl CompileConfig {
    pub fn set_from_value(&mut self, name: &str, value: SettingValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_value(&self, name: &str) -> Result<SettingValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let value = (func.get)(&def_conf);
        (func.set)(value, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names of every known setting, sorted.
    pub fn setting_names() -> Vec<&'static str> {
        let mut names: Vec<_> = GET_SET_FUNCTIONS.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize compile config")
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("Failed to deserialize compile config")
    }
}

struct SettingFunctions {
    set: fn(value: SettingValue, conf: &mut CompileConfig) -> Result<()>,
    get: fn(conf: &CompileConfig) -> SettingValue,
}

impl SettingFunctions {
    const fn new<S: CompileSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_value as _,
            get: S::get_as_value as _,
        }
    }
}

fn insert_setting<S: CompileSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<EnableSubqueryFlattening>(&mut map);
    insert_setting::<EnableExistsJoinFlattening>(&mut map);
    insert_setting::<EnableSubqueryMaterialization>(&mut map);
    insert_setting::<EnablePredicatePushdown>(&mut map);
    insert_setting::<EnableCountStarRewrite>(&mut map);
    insert_setting::<EnableInToExpressionRewrite>(&mut map);
    insert_setting::<MaxGeneratedNameLength>(&mut map);
    insert_setting::<DefaultSchema>(&mut map);

    map
});

pub trait CompileSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_value(value: SettingValue, conf: &mut CompileConfig) -> Result<()>;
    fn get_as_value(conf: &CompileConfig) -> SettingValue;
}

macro_rules! bool_setting {
    ($setting:ident, $field:ident, $desc:expr) => {
        pub struct $setting;

        impl CompileSetting for $setting {
            const NAME: &'static str = stringify!($field);
            const DESCRIPTION: &'static str = $desc;

            fn set_from_value(value: SettingValue, conf: &mut CompileConfig) -> Result<()> {
                conf.$field = value.try_as_bool()?;
                Ok(())
            }

            fn get_as_value(conf: &CompileConfig) -> SettingValue {
                conf.$field.into()
            }
        }
    };
}

bool_setting!(
    EnableSubqueryFlattening,
    enable_subquery_flattening,
    "Allow flattening subqueries into joins in the outer query block"
);
bool_setting!(
    EnableExistsJoinFlattening,
    enable_exists_join_flattening,
    "Allow flattening non-unique subqueries into EXISTS or NOT EXISTS joins"
);
bool_setting!(
    EnableSubqueryMaterialization,
    enable_subquery_materialization,
    "Evaluate invariant uncorrelated expression subqueries once"
);
bool_setting!(
    EnablePredicatePushdown,
    enable_predicate_pushdown,
    "Push single-table predicates into the from-tables they reference"
);
bool_setting!(
    EnableCountStarRewrite,
    enable_count_star_rewrite,
    "Rewrite COUNT over a non-nullable column to COUNT(*)"
);
bool_setting!(
    EnableInToExpressionRewrite,
    enable_in_to_expression_rewrite,
    "Rewrite IN/ANY over a single-row uncorrelated subquery into a comparison"
);

pub const DEFAULT_MAX_GENERATED_NAME_LENGTH: usize = 128;

const MIN_GENERATED_NAME_LENGTH: usize = 8;

pub struct MaxGeneratedNameLength;

impl CompileSetting for MaxGeneratedNameLength {
    const NAME: &'static str = "max_generated_name_length";
    const DESCRIPTION: &'static str = "Maximum length of generated column names";

    fn set_from_value(value: SettingValue, conf: &mut CompileConfig) -> Result<()> {
        let val = value.try_as_usize()?;
        if val < MIN_GENERATED_NAME_LENGTH {
            return Err(DbError::new(format!(
                "Generated name length cannot be less than {MIN_GENERATED_NAME_LENGTH}"
            )));
        }
        conf.max_generated_name_length = val;
        Ok(())
    }

    fn get_as_value(conf: &CompileConfig) -> SettingValue {
        conf.max_generated_name_length.into()
    }
}

pub const DEFAULT_SCHEMA: &str = "APP";

pub struct DefaultSchema;

impl CompileSetting for DefaultSchema {
    const NAME: &'static str = "default_schema";
    const DESCRIPTION: &'static str = "Schema used for unqualified table and routine names";

    fn set_from_value(value: SettingValue, conf: &mut CompileConfig) -> Result<()> {
        let val = value.try_into_string()?;
        if val.is_empty() {
            return Err(DbError::new("Default schema cannot be empty"));
        }
        conf.default_schema = val;
        Ok(())
    }

    fn get_as_value(conf: &CompileConfig) -> SettingValue {
        conf.default_schema.clone().into()
    }
}
