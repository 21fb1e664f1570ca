use indexmap::IndexMap;
use qtree_error::{DbError, Result};

use super::{Catalog, RoutineDescriptor, RoutineNamespace, TableDescriptor};

/// In-memory catalog for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: IndexMap<(String, String), TableDescriptor>,
    routines: IndexMap<(String, String, RoutineNamespace), RoutineDescriptor>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, erroring if one with the same name already exists.
    pub fn create_table(&mut self, table: TableDescriptor) -> Result<()> {
        let key = (table.schema.clone(), table.name.clone());
        if self.tables.contains_key(&key) {
            return Err(DbError::new(format!(
                "Table '{}.{}' already exists",
                table.schema, table.name
            )));
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn create_routine(&mut self, routine: RoutineDescriptor) -> Result<()> {
        let key = (
            routine.schema.clone(),
            routine.name.clone(),
            routine.namespace,
        );
        if self.routines.contains_key(&key) {
            return Err(DbError::new(format!(
                "Routine '{}.{}' already exists",
                routine.schema, routine.name
            )));
        }
        self.routines.insert(key, routine);
        Ok(())
    }

    pub fn get_table_mut(&mut self, schema: &str, name: &str) -> Option<&mut TableDescriptor> {
        self.tables
            .get_mut(&(schema.to_string(), name.to_string()))
    }
}

impl Catalog for MemoryCatalog {
    fn get_table(&self, schema: &str, name: &str) -> Result<Option<&TableDescriptor>> {
        Ok(self.tables.get(&(schema.to_string(), name.to_string())))
    }

    fn get_routine(
        &self,
        schema: &str,
        name: &str,
        namespace: RoutineNamespace,
    ) -> Result<Option<&RoutineDescriptor>> {
        Ok(self.routines.get(&(
            schema.to_string(),
            name.to_string(),
            namespace,
        )))
    }

    fn list_table_names(&self, schema: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .keys()
            .filter(|(s, _)| s == schema)
            .map(|(_, n)| n.clone())
            .collect())
    }
}
