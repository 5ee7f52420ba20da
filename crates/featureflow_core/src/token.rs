//! Token groups resolved after training.
//!
//! A [`ColumnIdGroup`] in a description only names a family of columns.
//! The [`TokenGroup`] is what downstream nodes read once the producer has
//! been trained and knows the actual members.

use crate::description::{ColumnId, ColumnIdGroup};
use crate::error::{GraphError, GraphResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// The resolved members of a column group
pub trait TokenGroup: Send + Sync + std::fmt::Debug {
    /// Group this resolves
    fn id(&self) -> &ColumnIdGroup;

    /// Group prefix
    fn prefix(&self) -> &str {
        self.id().prefix()
    }

    /// Whether the members are known yet
    fn is_ready(&self) -> bool;

    /// The members, in producer order
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::TokensNotReady`] before training completes
    fn tokens(&self) -> GraphResult<&[ColumnId]>;

    /// Number of members
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::TokensNotReady`] before training completes
    fn num_tokens(&self) -> GraphResult<usize> {
        Ok(self.tokens()?.len())
    }
}

/// Token group whose members are handed over once by its producer
///
/// Only the holder of the matching [`TokenSetter`] can resolve it.
#[derive(Debug, Clone)]
pub struct ListTokenGroup {
    id: ColumnIdGroup,
    tokens: Arc<OnceCell<Vec<ColumnId>>>,
}

impl ListTokenGroup {
    /// Create an unresolved group and the setter that resolves it
    #[must_use]
    pub fn create(id: ColumnIdGroup) -> (Self, TokenSetter) {
        let tokens = Arc::new(OnceCell::new());
        let setter = TokenSetter {
            id: id.clone(),
            tokens: Arc::clone(&tokens),
        };
        (Self { id, tokens }, setter)
    }
}

impl TokenGroup for ListTokenGroup {
    fn id(&self) -> &ColumnIdGroup {
        &self.id
    }

    fn is_ready(&self) -> bool {
        self.tokens.get().is_some()
    }

    fn tokens(&self) -> GraphResult<&[ColumnId]> {
        self.tokens
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| GraphError::TokensNotReady {
                prefix: self.id.prefix().to_string(),
            })
    }
}

/// Write handle for a [`ListTokenGroup`]
#[derive(Debug)]
pub struct TokenSetter {
    id: ColumnIdGroup,
    tokens: Arc<OnceCell<Vec<ColumnId>>>,
}

impl TokenSetter {
    /// Resolve the group with explicit column ids
    ///
    /// # Errors
    ///
    /// Returns error if a column is not a member of the group or if the
    /// group was already resolved
    pub fn set_tokens(&self, tokens: Vec<ColumnId>) -> GraphResult<()> {
        if let Some(foreign) = tokens.iter().find(|t| !self.id.contains(t)) {
            return Err(GraphError::ForeignToken {
                prefix: self.id.prefix().to_string(),
                name: foreign.name().to_string(),
            });
        }
        self.tokens.set(tokens).map_err(|_| GraphError::TokensAlreadySet {
            prefix: self.id.prefix().to_string(),
        })
    }

    /// Resolve the group from member suffixes
    ///
    /// # Errors
    ///
    /// Returns error if the group was already resolved
    pub fn set_suffixes<S: AsRef<str>>(
        &self,
        suffixes: impl IntoIterator<Item = S>,
    ) -> GraphResult<()> {
        let tokens = suffixes
            .into_iter()
            .map(|s| self.id.generate_id(s.as_ref()))
            .collect();
        self.set_tokens(tokens)
    }
}

/// Token group built from other columns and groups of the same type
///
/// Members are the members of every source group, in order, followed by
/// the plain columns.
#[derive(Debug)]
pub struct AggregateTokenGroup {
    id: ColumnIdGroup,
    columns: Vec<ColumnId>,
    groups: Vec<Arc<dyn TokenGroup>>,
    resolved: OnceCell<Vec<ColumnId>>,
}

impl AggregateTokenGroup {
    /// Create an aggregate
    ///
    /// # Errors
    ///
    /// Returns error if a column or group has a different value type
    pub fn new(
        id: ColumnIdGroup,
        columns: Vec<ColumnId>,
        groups: Vec<Arc<dyn TokenGroup>>,
    ) -> GraphResult<Self> {
        for column in &columns {
            if column.value_type() != id.value_type() {
                return Err(GraphError::TypeMismatch {
                    name: column.name().to_string(),
                    expected: id.value_type().clone(),
                    actual: column.value_type().clone(),
                });
            }
        }
        for group in &groups {
            if group.id().value_type() != id.value_type() {
                return Err(GraphError::TypeMismatch {
                    name: group.prefix().to_string(),
                    expected: id.value_type().clone(),
                    actual: group.id().value_type().clone(),
                });
            }
        }
        Ok(Self {
            id,
            columns,
            groups,
            resolved: OnceCell::new(),
        })
    }
}

impl TokenGroup for AggregateTokenGroup {
    fn id(&self) -> &ColumnIdGroup {
        &self.id
    }

    fn is_ready(&self) -> bool {
        self.groups.iter().all(|g| g.is_ready())
    }

    fn tokens(&self) -> GraphResult<&[ColumnId]> {
        self.resolved
            .get_or_try_init(|| {
                let mut all = Vec::new();
                for group in &self.groups {
                    all.extend_from_slice(group.tokens()?);
                }
                all.extend(self.columns.iter().cloned());
                Ok(all)
            })
            .map(Vec::as_slice)
    }
}
