//! The closed set of catalog object kinds and the schema-of-schema.
//!
//! Every node kind declares a fixed set of named fields and a fixed set of
//! named child collections. The tables here are the single source of truth:
//! both trees in a diff must agree with them, and the diff walk iterates
//! fields in declared order and collections in declared order.

use core::fmt;

/// Tag identifying the class of a catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogKind {
    /// The tree root. Exactly one per catalog, unnamed collections aside.
    Catalog,
    Cluster,
    Database,
    Table,
    Column,
    Index,
    ColumnRef,
    Constraint,
    ConstraintRef,
    MaterializedViewInfo,
    MaterializedViewHandlerInfo,
    TableRef,
    Procedure,
    Statement,
    PlanFragment,
    User,
    Group,
    GroupRef,
    Connector,
    ConnectorTableInfo,
    ConnectorProperty,
    SnapshotSchedule,
    Function,
}

/// Declared type of a scalar or reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Bool,
    String,
    /// A reference to another node, stored as its path string (or null).
    Ref,
}

/// A declared field of a kind.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    /// Runtime-only fields are never compared or serialized.
    pub runtime_only: bool,
}

/// A declared child collection of a kind.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub child: CatalogKind,
}

const fn int(name: &'static str) -> FieldSpec {
    FieldSpec { name, ty: FieldType::Int, runtime_only: false }
}

const fn boolean(name: &'static str) -> FieldSpec {
    FieldSpec { name, ty: FieldType::Bool, runtime_only: false }
}

const fn string(name: &'static str) -> FieldSpec {
    FieldSpec { name, ty: FieldType::String, runtime_only: false }
}

const fn reference(name: &'static str) -> FieldSpec {
    FieldSpec { name, ty: FieldType::Ref, runtime_only: false }
}

const fn runtime_int(name: &'static str) -> FieldSpec {
    FieldSpec { name, ty: FieldType::Int, runtime_only: true }
}

const fn coll(name: &'static str, child: CatalogKind) -> CollectionSpec {
    CollectionSpec { name, child }
}

use CatalogKind::*;

impl CatalogKind {
    /// Declared fields, in comparison/serialization order.
    ///
    /// Each arm is a `const` block: the spec arrays are built in const
    /// context so the returned slices are `'static`.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Catalog => &[],
            Cluster => const {
                &[
                    int("drProducerPort"),
                    string("drMasterHost"),
                    string("drRole"),
                    int("heartbeatTimeout"),
                    runtime_int("localepoch"),
                ]
            },
            Database => const {
                &[
                    string("schema"),
                    string("securityprovider"),
                    boolean("isActiveActiveDRed"),
                ]
            },
            Table => const {
                &[
                    boolean("isreplicated"),
                    reference("partitioncolumn"),
                    int("estimatedtuplecount"),
                    reference("materializer"),
                    string("signature"),
                    int("tuplelimit"),
                    int("tableType"),
                    boolean("isDRed"),
                ]
            },
            Column => const {
                &[
                    int("index"),
                    int("type"),
                    int("size"),
                    boolean("nullable"),
                    string("defaultvalue"),
                    int("defaulttype"),
                    boolean("inbytes"),
                ]
            },
            Index => const {
                &[
                    boolean("unique"),
                    boolean("assumeUnique"),
                    boolean("countable"),
                    int("type"),
                    string("expressionsjson"),
                    string("predicatejson"),
                ]
            },
            ColumnRef => const { &[int("index"), reference("column")] },
            Constraint => const { &[int("type"), reference("index")] },
            ConstraintRef => const { &[reference("constraint")] },
            MaterializedViewInfo => const {
                &[
                    reference("dest"),
                    string("predicate"),
                    boolean("issafewithnonemptysources"),
                ]
            },
            MaterializedViewHandlerInfo => const {
                &[
                    reference("destTable"),
                    boolean("issafewithnonemptysources"),
                ]
            },
            TableRef => const { &[reference("table")] },
            Procedure => const {
                &[
                    string("classname"),
                    boolean("readonly"),
                    boolean("singlepartition"),
                    reference("partitiontable"),
                    reference("partitioncolumn"),
                    int("partitionparameter"),
                ]
            },
            Statement => const {
                &[string("sqltext"), int("querytype"), boolean("readonly")]
            },
            PlanFragment => const {
                &[
                    boolean("hasdependencies"),
                    boolean("multipartition"),
                    boolean("nontransactional"),
                    string("plannodetree"),
                ]
            },
            User => const { &[string("shadowPassword")] },
            Group => const { &[boolean("admin"), boolean("defaultproc"), boolean("sql")] },
            GroupRef => const { &[reference("group")] },
            Connector => const { &[string("loaderclass"), boolean("enabled")] },
            ConnectorTableInfo => const { &[reference("table"), boolean("appendOnly")] },
            ConnectorProperty => const { &[string("value")] },
            SnapshotSchedule => const {
                &[
                    boolean("enabled"),
                    int("frequencyValue"),
                    string("frequencyUnit"),
                    int("retain"),
                    string("path"),
                    string("prefix"),
                ]
            },
            Function => const {
                &[string("classname"), string("methodname"), int("functionid")]
            },
        }
    }

    /// Declared child collections, in walk order.
    pub fn collections(self) -> &'static [CollectionSpec] {
        match self {
            Catalog => const { &[coll("clusters", Cluster)] },
            Cluster => const { &[coll("databases", Database)] },
            Database => const {
                &[
                    coll("tables", Table),
                    coll("procedures", Procedure),
                    coll("users", User),
                    coll("groups", Group),
                    coll("connectors", Connector),
                    coll("snapshotSchedule", SnapshotSchedule),
                    coll("functions", Function),
                ]
            },
            Table => const {
                &[
                    coll("columns", Column),
                    coll("indexes", Index),
                    coll("constraints", Constraint),
                    coll("views", MaterializedViewInfo),
                    coll("mvHandlerInfo", MaterializedViewHandlerInfo),
                ]
            },
            Index => const { &[coll("columns", ColumnRef)] },
            MaterializedViewInfo => const { &[coll("groupbycols", ColumnRef)] },
            MaterializedViewHandlerInfo => const { &[coll("sourceTables", TableRef)] },
            Procedure => const { &[coll("statements", Statement)] },
            Statement => const { &[coll("fragments", PlanFragment)] },
            User => const { &[coll("groups", GroupRef)] },
            Connector => const {
                &[
                    coll("tableInfo", ConnectorTableInfo),
                    coll("config", ConnectorProperty),
                ]
            },
            _ => &[],
        }
    }

    /// Look up a declared field by name (case-sensitive; field names are
    /// canonical in the command grammar).
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Look up a declared collection by name, case-insensitively.
    pub fn collection(self, name: &str) -> Option<&'static CollectionSpec> {
        self.collections()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Parse the kind token of an `add` command.
    pub fn parse(token: &str) -> Option<Self> {
        const ALL: &[CatalogKind] = &[
            Catalog,
            Cluster,
            Database,
            Table,
            Column,
            Index,
            ColumnRef,
            Constraint,
            ConstraintRef,
            MaterializedViewInfo,
            MaterializedViewHandlerInfo,
            TableRef,
            Procedure,
            Statement,
            PlanFragment,
            User,
            Group,
            GroupRef,
            Connector,
            ConnectorTableInfo,
            ConnectorProperty,
            SnapshotSchedule,
            Function,
        ];
        ALL.iter().copied().find(|k| k.as_str() == token)
    }

    /// Canonical name, as used in commands and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Catalog => "Catalog",
            Cluster => "Cluster",
            Database => "Database",
            Table => "Table",
            Column => "Column",
            Index => "Index",
            ColumnRef => "ColumnRef",
            Constraint => "Constraint",
            ConstraintRef => "ConstraintRef",
            MaterializedViewInfo => "MaterializedViewInfo",
            MaterializedViewHandlerInfo => "MaterializedViewHandlerInfo",
            TableRef => "TableRef",
            Procedure => "Procedure",
            Statement => "Statement",
            PlanFragment => "PlanFragment",
            User => "User",
            Group => "Group",
            GroupRef => "GroupRef",
            Connector => "Connector",
            ConnectorTableInfo => "ConnectorTableInfo",
            ConnectorProperty => "ConnectorProperty",
            SnapshotSchedule => "SnapshotSchedule",
            Function => "Function",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage class of a table, held in the `tableType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Persistent,
    Stream,
    ConnectorlessStream,
    ShadowStream,
}

impl TableType {
    pub fn from_field(value: i64) -> TableType {
        match value {
            1 => TableType::Stream,
            2 => TableType::ConnectorlessStream,
            3 => TableType::ShadowStream,
            _ => TableType::Persistent,
        }
    }

    pub fn as_field(self) -> i64 {
        match self {
            TableType::Persistent => 0,
            TableType::Stream => 1,
            TableType::ConnectorlessStream => 2,
            TableType::ShadowStream => 3,
        }
    }

    /// Streams hold no persisted rows, so row-dependent safety checks
    /// (NOT NULL column adds, unique index builds) do not apply to them.
    pub fn is_stream(self) -> bool {
        !matches!(self, TableType::Persistent)
    }
}
