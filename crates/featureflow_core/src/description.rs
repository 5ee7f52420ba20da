//! Output descriptions.
//!
//! A [`TransformDescription`] says, without any data, which named and typed
//! values a node's output will contain. Values whose count is only known
//! after training are referenced through a [`ColumnIdGroup`]: every member
//! of the group is named `prefix-suffix` and shares the group's type.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Separator between a group prefix and the member suffix
pub const GROUP_SEPARATOR: &str = "-";

/// Type of the values stored under a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Boolean
    Bool,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Category label drawn from a finite set
    Categorical,
    /// Anything else, identified by name
    Custom(String),
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::String => write!(f, "string"),
            Self::Categorical => write!(f, "categorical"),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Rust types with a known [`ValueType`]
pub trait Typed {
    /// The value type for `Self`
    fn value_type() -> ValueType;
}

impl Typed for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }
}

impl Typed for i32 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
}

impl Typed for i64 {
    fn value_type() -> ValueType {
        ValueType::Long
    }
}

impl Typed for f32 {
    fn value_type() -> ValueType {
        ValueType::Float
    }
}

impl Typed for f64 {
    fn value_type() -> ValueType {
        ValueType::Double
    }
}

impl Typed for String {
    fn value_type() -> ValueType {
        ValueType::String
    }
}

/// A named, typed handle for one output value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    name: String,
    value_type: ValueType,
}

impl ColumnId {
    /// Create a column id
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    /// Create a column id whose type comes from `T`
    #[must_use]
    pub fn of<T: Typed>(name: impl Into<String>) -> Self {
        Self::new(name, T::value_type())
    }

    /// Column name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type
    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value_type)
    }
}

/// An open-ended family of same-typed columns sharing a prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "GroupParts")]
pub struct ColumnIdGroup {
    prefix: String,
    value_type: ValueType,
}

#[derive(Deserialize)]
struct GroupParts {
    prefix: String,
    value_type: ValueType,
}

impl TryFrom<GroupParts> for ColumnIdGroup {
    type Error = GraphError;

    fn try_from(parts: GroupParts) -> GraphResult<Self> {
        Self::new(parts.prefix, parts.value_type)
    }
}

impl ColumnIdGroup {
    /// Create a group
    ///
    /// # Errors
    ///
    /// Returns error if the prefix is empty or contains [`GROUP_SEPARATOR`]
    pub fn new(prefix: impl Into<String>, value_type: ValueType) -> GraphResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains(GROUP_SEPARATOR) {
            return Err(GraphError::InvalidGroupPrefix { prefix });
        }
        Ok(Self { prefix, value_type })
    }

    /// Create a group whose member type comes from `T`
    ///
    /// # Errors
    ///
    /// Returns error if the prefix is invalid
    pub fn of<T: Typed>(prefix: impl Into<String>) -> GraphResult<Self> {
        Self::new(prefix, T::value_type())
    }

    /// Group prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Type shared by every member
    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Column id of the member with the given suffix
    #[must_use]
    pub fn generate_id(&self, suffix: &str) -> ColumnId {
        ColumnId::new(
            format!("{}{}{}", self.prefix, GROUP_SEPARATOR, suffix),
            self.value_type.clone(),
        )
    }

    /// Whether a column name falls inside this group's namespace
    #[must_use]
    pub fn claims_name(&self, name: &str) -> bool {
        name == self.prefix
            || name
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with(GROUP_SEPARATOR))
    }

    /// Whether a column is a member of this group
    #[must_use]
    pub fn contains(&self, column: &ColumnId) -> bool {
        column.value_type == self.value_type
            && column.name != self.prefix
            && self.claims_name(&column.name)
    }
}

/// Describes the output of one node
///
/// `columns` are the values known before training; `column_groups` stand
/// for values whose number is only known once the producer is trained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DescriptionParts")]
pub struct TransformDescription {
    columns: Vec<ColumnId>,
    column_groups: Vec<ColumnIdGroup>,
}

#[derive(Deserialize)]
struct DescriptionParts {
    columns: Vec<ColumnId>,
    #[serde(default)]
    column_groups: Vec<ColumnIdGroup>,
}

impl TryFrom<DescriptionParts> for TransformDescription {
    type Error = GraphError;

    fn try_from(parts: DescriptionParts) -> GraphResult<Self> {
        Self::new(parts.columns, parts.column_groups)
    }
}

impl TransformDescription {
    /// Create a description
    ///
    /// # Errors
    ///
    /// Returns error if a column name or group prefix repeats, or if a
    /// column name falls inside a group's namespace
    pub fn new(columns: Vec<ColumnId>, column_groups: Vec<ColumnIdGroup>) -> GraphResult<Self> {
        let mut names = HashSet::new();
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(GraphError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
        }

        let mut prefixes = HashSet::new();
        for group in &column_groups {
            if !prefixes.insert(group.prefix.as_str()) {
                return Err(GraphError::DuplicateGroup {
                    prefix: group.prefix.clone(),
                });
            }
            if let Some(column) = columns.iter().find(|c| group.claims_name(&c.name)) {
                return Err(GraphError::GroupCollision {
                    prefix: group.prefix.clone(),
                    name: column.name.clone(),
                });
            }
        }

        Ok(Self {
            columns,
            column_groups,
        })
    }

    /// Create a description with columns only
    ///
    /// # Errors
    ///
    /// Returns error if a column name repeats
    pub fn from_columns(columns: Vec<ColumnId>) -> GraphResult<Self> {
        Self::new(columns, Vec::new())
    }

    /// Create an empty description
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Concatenate several descriptions, in order
    ///
    /// # Errors
    ///
    /// Returns error if the union repeats a name or prefix
    pub fn merged<'a>(
        parts: impl IntoIterator<Item = &'a TransformDescription>,
    ) -> GraphResult<Self> {
        let mut columns = Vec::new();
        let mut groups = Vec::new();
        for part in parts {
            columns.extend(part.columns.iter().cloned());
            groups.extend(part.column_groups.iter().cloned());
        }
        Self::new(columns, groups)
    }

    /// Columns known before training
    #[must_use]
    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// Groups whose members are known after training
    #[must_use]
    pub fn column_groups(&self) -> &[ColumnIdGroup] {
        &self.column_groups
    }

    /// Whether a column with this name is declared
    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Look up a column by name
    ///
    /// # Errors
    ///
    /// Returns error if no column has this name
    pub fn column(&self, name: &str) -> GraphResult<&ColumnId> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| GraphError::ColumnNotFound {
                name: name.to_string(),
            })
    }

    /// Look up a column by name and check its type
    ///
    /// # Errors
    ///
    /// Returns error if the column is missing or has another type
    pub fn typed_column<T: Typed>(&self, name: &str) -> GraphResult<&ColumnId> {
        let column = self.column(name)?;
        let expected = T::value_type();
        if column.value_type != expected {
            return Err(GraphError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: column.value_type.clone(),
            });
        }
        Ok(column)
    }

    /// Look up a group by prefix
    ///
    /// # Errors
    ///
    /// Returns error if no group has this prefix
    pub fn column_group(&self, prefix: &str) -> GraphResult<&ColumnIdGroup> {
        self.column_groups
            .iter()
            .find(|g| g.prefix == prefix)
            .ok_or_else(|| GraphError::GroupNotFound {
                prefix: prefix.to_string(),
            })
    }

    /// Look up a group by prefix and check its member type
    ///
    /// # Errors
    ///
    /// Returns error if the group is missing or has another type
    pub fn typed_column_group<T: Typed>(&self, prefix: &str) -> GraphResult<&ColumnIdGroup> {
        let group = self.column_group(prefix)?;
        let expected = T::value_type();
        if group.value_type != expected {
            return Err(GraphError::TypeMismatch {
                name: prefix.to_string(),
                expected,
                actual: group.value_type.clone(),
            });
        }
        Ok(group)
    }
}
