use std::fmt;

/// Catalog object whose change invalidates a compiled statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Table { schema: String, name: String },
    Routine { schema: String, name: String },
    CheckConstraint { table: String, name: String },
    Trigger { table: String, name: String },
    Index { table: String, name: String },
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { schema, name } => write!(f, "table {schema}.{name}"),
            Self::Routine { schema, name } => write!(f, "routine {schema}.{name}"),
            Self::CheckConstraint { table, name } => write!(f, "constraint {name} on {table}"),
            Self::Trigger { table, name } => write!(f, "trigger {name} on {table}"),
            Self::Index { table, name } => write!(f, "index {name} on {table}"),
        }
    }
}

/// The object that depends on a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependent {
    /// The statement being compiled.
    Statement,
    /// A check constraint being bound for a table modification.
    CheckConstraint { table: String, name: String },
    /// A generated column's generation clause.
    GeneratedColumn { table: String, column: String },
}

/// Write-only sink for compile-time dependencies.
pub trait DependencySink {
    fn register(&mut self, dependent: Dependent, provider: Provider);
}

/// Accumulates dependencies in registration order, dropping duplicates.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DependencyList {
    entries: Vec<(Dependent, Provider)>,
}

impl DependencyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Dependent, Provider)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn depends_on(&self, provider: &Provider) -> bool {
        self.entries.iter().any(|(_, p)| p == provider)
    }
}

impl DependencySink for DependencyList {
    fn register(&mut self, dependent: Dependent, provider: Provider) {
        if self
            .entries
            .iter()
            .any(|(d, p)| *d == dependent && *p == provider)
        {
            return;
        }
        tracing::trace!(%provider, "registered dependency");
        self.entries.push((dependent, provider));
    }
}
