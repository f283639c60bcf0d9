//! Rust types mirroring the persisted data-fusion graph.
//!
//! These types are the serde target for the canvas save format: every node's
//! `data.formula[].config` round-trips losslessly through them.

use serde::{Deserialize, Serialize};

// =============================================================================
// TOP-LEVEL GRAPH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FusionGraph {
    #[serde(default)]
    pub nodes: Vec<FusionNode>,
}

/// A named processing stage holding an ordered operator chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionNode {
    pub id: String,
    pub name: String,
    /// Upstream node ids, in connection order (join: left then right).
    #[serde(default)]
    pub src: Vec<String>,
    #[serde(default)]
    pub formula: Vec<Formula>,
    #[serde(default)]
    pub output_fields: Vec<Field>,
    #[serde(default)]
    pub executable: bool,
}

impl FusionNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        FusionNode {
            id: id.into(),
            name: name.into(),
            src: Vec::new(),
            formula: Vec::new(),
            output_fields: Vec::new(),
            executable: false,
        }
    }

    /// First operator error in chain order.
    pub fn error(&self) -> Option<FormulaError> {
        self.formula.iter().find_map(|f| f.error_msg)
    }

    pub fn formula_index(&self, formula_id: &str) -> Option<usize> {
        self.formula.iter().position(|f| f.id == formula_id)
    }

    /// Clears derived state ahead of a recomputation.
    pub fn reset(&mut self) {
        self.output_fields.clear();
        self.executable = false;
    }
}

// =============================================================================
// FIELDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "int", alias = "integer")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "char", alias = "character")]
    Char,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "datetime")]
    Datetime,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "bool", alias = "boolean")]
    Bool,
    #[serde(rename = "binary")]
    Binary,
    #[serde(rename = "time")]
    Time,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Decimal => "decimal",
            DataType::Number => "number",
            DataType::Char => "char",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Timestamp => "timestamp",
            DataType::Bool => "bool",
            DataType::Binary => "binary",
            DataType::Time => "time",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::Decimal | DataType::Number
        )
    }

    pub fn is_date_like(&self) -> bool {
        matches!(self, DataType::Date | DataType::Datetime | DataType::Timestamp)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, DataType::Binary)
    }

    /// Map a catalog / query-engine type name onto the semantic type set.
    /// Precision suffixes (`decimal(10,2)`, `varchar(64)`) are ignored.
    pub fn from_catalog_type(raw: &str) -> Option<DataType> {
        let lowered = raw.trim().to_ascii_lowercase();
        let base = lowered.split('(').next().unwrap_or("").trim();
        let ty = match base {
            "int" | "integer" | "tinyint" | "smallint" | "bigint" | "long" => DataType::Int,
            "float" | "double" | "real" => DataType::Float,
            "decimal" | "numeric" => DataType::Decimal,
            "number" => DataType::Number,
            "char" | "varchar" | "string" | "text" | "character" => DataType::Char,
            "date" => DataType::Date,
            "datetime" => DataType::Datetime,
            "timestamp" | "timestamp with time zone" | "timestamptz" => DataType::Timestamp,
            "bool" | "boolean" => DataType::Bool,
            "binary" | "varbinary" | "blob" | "bytea" => DataType::Binary,
            "time" => DataType::Time,
            _ => return None,
        };
        Some(ty)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a field instance; aliases are mutable, this is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub id: String,
    pub source_id: String,
}

impl FieldKey {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>) -> Self {
        FieldKey {
            id: id.into(),
            source_id: source_id.into(),
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.source_id)
    }
}

/// A column flowing through the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    #[serde(rename = "sourceId")]
    pub source_id: String,
    pub alias: String,
    /// Name the field had upstream when last reconciled.
    #[serde(rename = "originName")]
    pub origin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    pub data_type: DataType,
}

impl Field {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        alias: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        let alias = alias.into();
        Field {
            id: id.into(),
            source_id: source_id.into(),
            origin_name: alias.clone(),
            alias,
            name_en: None,
            data_type,
        }
    }

    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.id.as_str(), self.source_id.as_str())
    }

    pub fn is(&self, r: &FieldRef) -> bool {
        self.id == r.id && self.source_id == r.source_id
    }

    /// Saved-config form of this field.
    pub fn to_ref(&self) -> FieldRef {
        FieldRef {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            alias: Some(self.alias.clone()),
            original_name: Some(self.origin_name.clone()),
            name_en: self.name_en.clone(),
            data_type: Some(self.data_type),
        }
    }
}

/// A field reference stored inside an operator config. May be partially
/// populated while the user is still editing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldRef {
    pub id: String,
    #[serde(rename = "sourceId", default)]
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

impl FieldRef {
    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.id.as_str(), self.source_id.as_str())
    }

    /// Complete field when every required attribute is present.
    pub fn to_field(&self) -> Option<Field> {
        let alias = self.alias.clone()?;
        Some(Field {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            origin_name: self.original_name.clone().unwrap_or_else(|| alias.clone()),
            alias,
            name_en: self.name_en.clone(),
            data_type: self.data_type?,
        })
    }
}

// =============================================================================
// FORMULA (OPERATOR)
// =============================================================================

/// Validation state of one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaError {
    MissingLine,
    MoreLine,
    IndexError,
    MissingData,
    ConfigError,
    NodeChange,
}

impl FormulaError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaError::MissingLine => "MissingLine",
            FormulaError::MoreLine => "MoreLine",
            FormulaError::IndexError => "IndexError",
            FormulaError::MissingData => "MissingData",
            FormulaError::ConfigError => "ConfigError",
            FormulaError::NodeChange => "NodeChange",
        }
    }
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub id: String,
    #[serde(flatten)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub output_fields: Vec<Field>,
    #[serde(rename = "errorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<FormulaError>,
    /// User-facing message of an unclassified remote failure.
    #[serde(rename = "remoteError", default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

impl Formula {
    /// A freshly added operator with an empty configuration.
    pub fn new(id: impl Into<String>, kind: OperatorKind) -> Self {
        Formula {
            id: id.into(),
            operator: OperatorConfig::empty(kind),
            output_fields: Vec::new(),
            error_msg: None,
            remote_error: None,
        }
    }

    pub fn with_config(id: impl Into<String>, operator: OperatorConfig) -> Self {
        Formula {
            id: id.into(),
            operator,
            output_fields: Vec::new(),
            error_msg: None,
            remote_error: None,
        }
    }

    pub fn kind(&self) -> OperatorKind {
        self.operator.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Form,
    Join,
    Where,
    Select,
    Indicator,
    Merge,
    Distinct,
    OutputView,
    Sql,
}

impl OperatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::Form => "form",
            OperatorKind::Join => "join",
            OperatorKind::Where => "where",
            OperatorKind::Select => "select",
            OperatorKind::Indicator => "indicator",
            OperatorKind::Merge => "merge",
            OperatorKind::Distinct => "distinct",
            OperatorKind::OutputView => "output_view",
            OperatorKind::Sql => "sql",
        }
    }
}

/// Tagged union over the nine operator kinds, each with its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum OperatorConfig {
    Form(FormConfig),
    Join(JoinConfig),
    Where(WhereConfig),
    Select(FieldSelectionConfig),
    Indicator(IndicatorConfig),
    Merge(MergeConfig),
    Distinct(FieldSelectionConfig),
    OutputView(FieldSelectionConfig),
    Sql(SqlConfig),
}

impl OperatorConfig {
    pub fn empty(kind: OperatorKind) -> Self {
        match kind {
            OperatorKind::Form => OperatorConfig::Form(FormConfig::default()),
            OperatorKind::Join => OperatorConfig::Join(JoinConfig::default()),
            OperatorKind::Where => OperatorConfig::Where(WhereConfig::default()),
            OperatorKind::Select => OperatorConfig::Select(FieldSelectionConfig::default()),
            OperatorKind::Indicator => OperatorConfig::Indicator(IndicatorConfig::default()),
            OperatorKind::Merge => OperatorConfig::Merge(MergeConfig::default()),
            OperatorKind::Distinct => OperatorConfig::Distinct(FieldSelectionConfig::default()),
            OperatorKind::OutputView => {
                OperatorConfig::OutputView(FieldSelectionConfig::default())
            }
            OperatorKind::Sql => OperatorConfig::Sql(SqlConfig::default()),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            OperatorConfig::Form(_) => OperatorKind::Form,
            OperatorConfig::Join(_) => OperatorKind::Join,
            OperatorConfig::Where(_) => OperatorKind::Where,
            OperatorConfig::Select(_) => OperatorKind::Select,
            OperatorConfig::Indicator(_) => OperatorKind::Indicator,
            OperatorConfig::Merge(_) => OperatorKind::Merge,
            OperatorConfig::Distinct(_) => OperatorKind::Distinct,
            OperatorConfig::OutputView(_) => OperatorKind::OutputView,
            OperatorConfig::Sql(_) => OperatorKind::Sql,
        }
    }

    /// Every field reference held by the config, for backfilling.
    pub fn field_refs_mut(&mut self) -> Vec<&mut FieldRef> {
        match self {
            OperatorConfig::Form(c) => c.config_fields.iter_mut().collect(),
            OperatorConfig::Join(c) => c
                .relation_field
                .iter_mut()
                .chain(c.config_fields.iter_mut())
                .collect(),
            OperatorConfig::Where(c) => c
                .clauses
                .iter_mut()
                .flat_map(|g| g.member.iter_mut().map(|m| &mut m.field))
                .collect(),
            OperatorConfig::Select(c) | OperatorConfig::Distinct(c) | OperatorConfig::OutputView(c) => {
                c.config_fields.iter_mut().collect()
            }
            OperatorConfig::Indicator(c) => c
                .measure
                .iter_mut()
                .filter_map(|m| m.field.as_mut())
                .chain(c.group.iter_mut().map(|g| &mut g.field))
                .collect(),
            OperatorConfig::Merge(c) => c
                .merge
                .nodes
                .iter_mut()
                .flat_map(|n| n.fields.iter_mut())
                .collect(),
            OperatorConfig::Sql(c) => c.config_fields.iter_mut().collect(),
        }
    }
}

// =============================================================================
// OPERATOR CONFIGS
// =============================================================================

fn default_true() -> bool {
    true
}

/// Leaf operator reading a catalog table (form view).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub config_fields: Vec<FieldRef>,
    #[serde(rename = "isExist", default = "default_true")]
    pub is_exist: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig {
            form_id: String::new(),
            catalog: None,
            schema: None,
            table: None,
            config_fields: Vec::new(),
            is_exist: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default)]
    pub relation_type: JoinKind,
    /// `[left key, right key]`.
    #[serde(default)]
    pub relation_field: Vec<FieldRef>,
    #[serde(default)]
    pub config_fields: Vec<FieldRef>,
}

/// Select, distinct and output-view all persist a field selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSelectionConfig {
    #[serde(default)]
    pub config_fields: Vec<FieldRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "include")]
    Include,
    #[serde(rename = "not include")]
    NotInclude,
    #[serde(rename = "prefix")]
    Prefix,
    #[serde(rename = "not prefix")]
    NotPrefix,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "not null")]
    NotNull,
    #[serde(rename = "true")]
    IsTrue,
    #[serde(rename = "false")]
    IsFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: FieldRef,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WhereGroup {
    #[serde(default)]
    pub member: Vec<WhereClause>,
    #[serde(default)]
    pub relation: Relation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WhereConfig {
    #[serde(rename = "where", default)]
    pub clauses: Vec<WhereGroup>,
    #[serde(default)]
    pub where_relation: Relation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    #[default]
    Count,
    CountDistinct,
    Sum,
    Avg,
    Max,
    Min,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::CountDistinct => "count_distinct",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::Year => "year",
            DateFormat::Quarter => "quarter",
            DateFormat::Month => "month",
            DateFormat::Week => "week",
            DateFormat::Day => "day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub field: FieldRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DateFormat>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<MeasureConfig>,
    #[serde(default)]
    pub group: Vec<GroupConfig>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeSource {
    pub source_node_id: String,
    /// Columns taken from this source, aligned by position across sources.
    #[serde(default)]
    pub fields: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeSpec {
    #[serde(default)]
    pub nodes: Vec<MergeSource>,
    #[serde(default)]
    pub deduplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub merge: MergeSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlInfo {
    /// Template text as authored, with `{{node}}` / `{{node.alias}}` references.
    #[serde(default)]
    pub sql_str: String,
    /// Last successfully compiled statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_sql: Option<String>,
    /// Dependency signature the compiled statement was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlSpec {
    #[serde(default)]
    pub sql_info: SqlInfo,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default)]
    pub sql: SqlSpec,
    /// Output columns of the last successful describe.
    #[serde(default)]
    pub config_fields: Vec<FieldRef>,
}
