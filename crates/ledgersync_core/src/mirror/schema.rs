//! Registry of mirrored tables and their columns.
//!
//! Changes name their table and column as strings. The registry maps those
//! names to a [`Table`] and a field name once, at startup, and every lookup
//! after that fails closed.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{CoreError, CoreResult};

/// Dataset whose rows are preference keys rather than table rows.
pub const PREFS_DATASET: &str = "prefs";

/// `(wire column, field name)` pairs. Most columns keep their wire name.
pub type ColumnDefs = &'static [(&'static str, &'static str)];

macro_rules! tables {
    (@field $wire:literal) => { $wire };
    (@field $wire:literal, $field:literal) => { $field };
    ($( $variant:ident => $name:literal { $( $wire:literal $(=> $field:literal)? ),* $(,)? } )*) => {
        /// A mirrored table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Table {
            $(
                #[doc = concat!("The `", $name, "` table.")]
                $variant,
            )*
        }

        impl Table {
            /// Every known table.
            pub const ALL: &'static [Table] = &[$(Table::$variant),*];

            /// Table name as it appears in changes.
            pub fn name(self) -> &'static str {
                match self {
                    $(Table::$variant => $name,)*
                }
            }

            /// Column definitions for this table.
            pub fn columns(self) -> ColumnDefs {
                match self {
                    $(Table::$variant => &[$( ($wire, tables!(@field $wire $(, $field)?)) ),*],)*
                }
            }

            /// Looks up a table by name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Table::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

tables! {
    Accounts => "accounts" {
        "account_id", "name", "balance_current", "balance_available", "balance_limit",
        "mask", "official_name", "subtype", "bank" => "bank_id", "offbudget", "closed",
        "tombstone", "sort_order", "type", "account_sync_source",
    }
    Banks => "banks" { "bank_id", "name", "tombstone" }
    Categories => "categories" {
        "hidden", "name", "is_income", "cat_group", "sort_order", "tombstone", "goal_def",
    }
    CategoryGroups => "category_groups" { "hidden", "name", "is_income", "sort_order", "tombstone" }
    CategoryMapping => "category_mapping" { "transferId" => "transfer_id" }
    CustomReports => "custom_reports" {
        "name", "start_date", "end_date", "date_static", "date_range", "mode", "group_by",
        "balance_type", "show_empty", "show_offbudget", "show_hidden", "show_uncategorized",
        "selected_categories", "graph_type", "conditions", "conditions_op",
        "metadata" => "metadata_", "interval", "color_scheme", "tombstone", "include_current",
    }
    Dashboard => "dashboard" { "type", "width", "height", "x", "y", "meta", "tombstone" }
    Notes => "notes" { "note" }
    PayeeMapping => "payee_mapping" { "targetId" => "target_id" }
    Payees => "payees" { "name", "category", "tombstone", "transfer_acct", "favorite" }
    Preferences => "preferences" { "value" }
    ReflectBudgets => "reflect_budgets" {
        "month", "category", "amount", "carryover", "goal", "long_goal",
    }
    Rules => "rules" { "stage", "conditions", "actions", "tombstone", "conditions_op" }
    Schedules => "schedules" {
        "rule" => "rule_id", "active", "completed", "posts_transaction", "tombstone", "name",
    }
    SchedulesNextDate => "schedules_next_date" {
        "schedule_id", "local_next_date", "local_next_date_ts", "base_next_date",
        "base_next_date_ts", "tombstone",
    }
    TransactionFilters => "transaction_filters" {
        "name", "conditions", "conditions_op", "tombstone",
    }
    Transactions => "transactions" {
        "isParent" => "is_parent", "isChild" => "is_child", "acct", "category" => "category_id",
        "amount", "description" => "payee_id", "notes", "date", "financial_id", "type",
        "location", "error", "imported_description", "starting_balance_flag", "transferred_id",
        "sort_order", "tombstone", "cleared", "pending", "parent_id",
        "schedule" => "schedule_id", "reconciled",
    }
    ZeroBudgetMonths => "zero_budget_months" { "buffered" }
    ZeroBudgets => "zero_budgets" {
        "month", "category" => "category_id", "amount", "carryover", "goal", "long_goal",
    }
}

/// Where a dataset's changes land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A mirrored table.
    Table(Table),
    /// The preference metadata map.
    Prefs,
}

impl Target {
    /// Name as it appears in changes.
    pub fn name(self) -> &'static str {
        match self {
            Self::Table(table) => table.name(),
            Self::Prefs => PREFS_DATASET,
        }
    }

    /// Parses a dataset name without consulting a registry.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == PREFS_DATASET {
            Some(Self::Prefs)
        } else {
            Table::from_name(name).map(Self::Table)
        }
    }
}

#[derive(Debug)]
struct TableDef {
    table: Table,
    columns: HashMap<&'static str, &'static str>,
}

/// A validated set of mirrored tables.
#[derive(Debug)]
pub struct Schema {
    tables: HashMap<&'static str, TableDef>,
}

impl Schema {
    /// Registers every known table.
    ///
    /// # Errors
    ///
    /// See [`Schema::with_tables`].
    pub fn standard() -> CoreResult<Self> {
        Self::with_tables(Table::ALL)
    }

    /// Registers `tables`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] if a table is listed twice, a table
    /// is named like the prefs dataset, or a table maps two wire columns or
    /// two fields with the same name.
    pub fn with_tables(tables: &[Table]) -> CoreResult<Self> {
        let mut registered = HashMap::with_capacity(tables.len());
        for &table in tables {
            if table.name() == PREFS_DATASET {
                return Err(CoreError::invalid_schema(format!(
                    "table name {PREFS_DATASET:?} is reserved"
                )));
            }

            let mut columns = HashMap::new();
            let mut fields = HashSet::new();
            for &(wire, field) in table.columns() {
                if columns.insert(wire, field).is_some() {
                    return Err(CoreError::invalid_schema(format!(
                        "{}.{wire} is defined twice",
                        table.name()
                    )));
                }
                if !fields.insert(field) {
                    return Err(CoreError::invalid_schema(format!(
                        "{}: two columns map to field {field}",
                        table.name()
                    )));
                }
            }

            if registered
                .insert(table.name(), TableDef { table, columns })
                .is_some()
            {
                return Err(CoreError::invalid_schema(format!(
                    "table {} registered twice",
                    table.name()
                )));
            }
        }
        Ok(Self { tables: registered })
    }

    /// Resolves a dataset name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] for unregistered names.
    pub fn resolve(&self, dataset: &str) -> CoreResult<Target> {
        if dataset == PREFS_DATASET {
            return Ok(Target::Prefs);
        }
        self.tables
            .get(dataset)
            .map(|def| Target::Table(def.table))
            .ok_or_else(|| CoreError::table_not_found(dataset))
    }

    /// Resolves a wire column of `table` to its field name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] if the table is not registered and
    /// [`CoreError::ColumnNotFound`] if it has no such column.
    pub fn field(&self, table: Table, column: &str) -> CoreResult<&'static str> {
        let def = self
            .tables
            .get(table.name())
            .ok_or_else(|| CoreError::table_not_found(table.name()))?;
        def.columns
            .get(column)
            .copied()
            .ok_or_else(|| CoreError::column_not_found(table.name(), column))
    }

    /// Registered tables, ordered.
    pub fn tables(&self) -> Vec<Table> {
        let ordered: BTreeMap<Table, ()> = self.tables.values().map(|d| (d.table, ())).collect();
        ordered.into_keys().collect()
    }

    /// Returns true if `table` is registered.
    pub fn contains(&self, table: Table) -> bool {
        self.tables.contains_key(table.name())
    }
}
