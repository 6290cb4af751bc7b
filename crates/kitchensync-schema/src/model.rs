//! Canonical, engine-agnostic schema model (spec component C3).
//!
//! A [`Database`] owns its [`Table`]s exclusively, which own their
//! [`Column`]s and [`Key`]s exclusively — no shared ownership anywhere in
//! the chain. Each peer's `Database` is built once by an adapter's
//! introspection at session start and is immutable afterwards, except that
//! the `to` side may run [`Table::convert_unsupported_schema`]-style
//! normalization (adapter-specific, see `kitchensync-adapter`) on the
//! *peer's* schema before comparing it with [`crate::schema_match`].

/// Index of a column within its owning table's `columns` vector.
pub type ColumnIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Blob,
    Text,
    VarChar,
    FixedChar,
    Json,
    Uuid,
    Bool,
    SignedInt,
    UnsignedInt,
    Real,
    Decimal,
    Date,
    Time,
    DateTime,
    Spatial,
    Enum,
    /// Recognized but not further interpretable; the raw engine type
    /// string is preserved in `Column::db_type_def` for diagnostics.
    Unknown,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Blob => "blob",
            ColumnKind::Text => "text",
            ColumnKind::VarChar => "varchar",
            ColumnKind::FixedChar => "fixedchar",
            ColumnKind::Json => "json",
            ColumnKind::Uuid => "uuid",
            ColumnKind::Bool => "bool",
            ColumnKind::SignedInt => "signedint",
            ColumnKind::UnsignedInt => "unsignedint",
            ColumnKind::Real => "real",
            ColumnKind::Decimal => "decimal",
            ColumnKind::Date => "date",
            ColumnKind::Time => "time",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Spatial => "spatial",
            ColumnKind::Enum => "enum",
            ColumnKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "blob" => ColumnKind::Blob,
            "text" => ColumnKind::Text,
            "varchar" => ColumnKind::VarChar,
            "fixedchar" => ColumnKind::FixedChar,
            "json" => ColumnKind::Json,
            "uuid" => ColumnKind::Uuid,
            "bool" => ColumnKind::Bool,
            "signedint" => ColumnKind::SignedInt,
            "unsignedint" => ColumnKind::UnsignedInt,
            "real" => ColumnKind::Real,
            "decimal" => ColumnKind::Decimal,
            "date" => ColumnKind::Date,
            "time" => ColumnKind::Time,
            "datetime" => ColumnKind::DateTime,
            "spatial" => ColumnKind::Spatial,
            "enum" => ColumnKind::Enum,
            "unknown" => ColumnKind::Unknown,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultKind {
    NoDefault,
    /// Next value from an identity/serial sequence.
    Sequence,
    /// An already-unescaped literal value string.
    Literal,
    /// A portable SQL expression, e.g. `CURRENT_TIMESTAMP`, `NULL`.
    Expression,
}

impl DefaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultKind::NoDefault => "no_default",
            DefaultKind::Sequence => "sequence",
            DefaultKind::Literal => "literal",
            DefaultKind::Expression => "expression",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "no_default" => DefaultKind::NoDefault,
            "sequence" => DefaultKind::Sequence,
            "literal" => DefaultKind::Literal,
            "expression" => DefaultKind::Expression,
            _ => return None,
        })
    }
}

/// Bitset of column flags, serialized BY NAME (spec.md §3) so flags can be
/// added or renumbered across major protocol versions without breaking
/// older clients reading a newer peer's schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    bits: u32,
}

const MYSQL_TIMESTAMP: u32 = 1 << 0;
const MYSQL_ON_UPDATE_TIMESTAMP: u32 = 1 << 1;
const TIME_ZONE: u32 = 1 << 2;
const SIMPLE_GEOMETRY: u32 = 1 << 3;
const IDENTITY_GENERATED_ALWAYS: u32 = 1 << 4;

/// All flag (bit, name) pairs, the table both encoder and decoder consult.
/// Adding a flag means appending a row here; existing bit positions may be
/// freely renumbered since only the name ever crosses the wire.
const FLAG_NAMES: &[(u32, &str)] = &[
    (MYSQL_TIMESTAMP, "mysql_timestamp"),
    (MYSQL_ON_UPDATE_TIMESTAMP, "mysql_on_update_timestamp"),
    (TIME_ZONE, "time_zone"),
    (SIMPLE_GEOMETRY, "simple_geometry"),
    (IDENTITY_GENERATED_ALWAYS, "identity_generated_always"),
];

impl ColumnFlags {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    fn set(&mut self, bit: u32, value: bool) {
        if value {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
    }

    pub fn mysql_timestamp(self) -> bool {
        self.bits & MYSQL_TIMESTAMP != 0
    }
    pub fn set_mysql_timestamp(&mut self, v: bool) {
        self.set(MYSQL_TIMESTAMP, v);
    }

    pub fn mysql_on_update_timestamp(self) -> bool {
        self.bits & MYSQL_ON_UPDATE_TIMESTAMP != 0
    }
    pub fn set_mysql_on_update_timestamp(&mut self, v: bool) {
        self.set(MYSQL_ON_UPDATE_TIMESTAMP, v);
    }

    pub fn time_zone(self) -> bool {
        self.bits & TIME_ZONE != 0
    }
    pub fn set_time_zone(&mut self, v: bool) {
        self.set(TIME_ZONE, v);
    }

    pub fn simple_geometry(self) -> bool {
        self.bits & SIMPLE_GEOMETRY != 0
    }
    pub fn set_simple_geometry(&mut self, v: bool) {
        self.set(SIMPLE_GEOMETRY, v);
    }

    pub fn identity_generated_always(self) -> bool {
        self.bits & IDENTITY_GENERATED_ALWAYS != 0
    }
    pub fn set_identity_generated_always(&mut self, v: bool) {
        self.set(IDENTITY_GENERATED_ALWAYS, v);
    }

    /// Names of every flag currently set, in table order — what gets
    /// written to the wire.
    pub fn set_names(self) -> Vec<&'static str> {
        FLAG_NAMES.iter().filter(|(bit, _)| self.bits & bit != 0).map(|(_, name)| *name).collect()
    }

    /// Build flags from a set of names read off the wire. Unknown names
    /// are ignored with a logged warning rather than rejected outright
    /// (spec.md §9: forward compatibility with newer peers that know
    /// flags this build doesn't).
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = ColumnFlags::empty();
        for name in names {
            match FLAG_NAMES.iter().find(|(_, n)| *n == name) {
                Some((bit, _)) => flags.bits |= bit,
                None => tracing::warn!(flag = name, "ignoring unknown column flag read from peer"),
            }
        }
        flags
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub nullable: bool,
    pub kind: ColumnKind,
    /// Length/byte-width/precision, meaning depends on `kind`.
    pub size: i64,
    /// Decimal scale; meaningful only for `ColumnKind::Decimal`.
    pub scale: i64,
    pub default_kind: DefaultKind,
    pub default_value: Option<String>,
    pub flags: ColumnFlags,
    /// e.g. a spatial subtype such as "point".
    pub type_restriction: Option<String>,
    /// e.g. a spatial reference system identifier (SRID).
    pub reference_system: Option<String>,
    pub enumeration_values: Vec<String>,
    /// Opaque pass-through of the engine's raw type string for
    /// `ColumnKind::Unknown` columns. Diagnostics only; never interpreted.
    pub db_type_def: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            kind,
            size: 0,
            scale: 0,
            default_kind: DefaultKind::NoDefault,
            default_value: None,
            flags: ColumnFlags::empty(),
            type_restriction: None,
            reference_system: None,
            enumeration_values: Vec::new(),
            db_type_def: None,
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.nullable == other.nullable
            && self.kind == other.kind
            && self.size == other.size
            && self.scale == other.scale
            && self.default_kind == other.default_kind
            && self.default_value == other.default_value
            && self.flags == other.flags
            && self.type_restriction == other.type_restriction
            && self.reference_system == other.reference_system
            && self.enumeration_values == other.enumeration_values
            && self.db_type_def == other.db_type_def
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyKind {
    Unique,
    Standard,
    Spatial,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Unique => "unique",
            KeyKind::Standard => "standard",
            KeyKind::Spatial => "spatial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "unique" => KeyKind::Unique,
            "standard" => KeyKind::Standard,
            "spatial" => KeyKind::Spatial,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub kind: KeyKind,
    pub columns: Vec<ColumnIndex>,
}

impl Key {
    /// Sort ordering used both for display and for the lockstep schema-match
    /// walk (spec.md §4.3): by `(kind, name)`, kind first so all keys of a
    /// kind group together and the tie-break on name is deterministic.
    fn sort_key(&self) -> (KeyKind, &str) {
        (self.kind, self.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKeyKind {
    NoAvailableKey,
    ExplicitPrimaryKey,
    SuitableUniqueKey,
}

impl PrimaryKeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryKeyKind::NoAvailableKey => "no_available_key",
            PrimaryKeyKind::ExplicitPrimaryKey => "explicit_primary_key",
            PrimaryKeyKind::SuitableUniqueKey => "suitable_unique_key",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "no_available_key" => PrimaryKeyKind::NoAvailableKey,
            "explicit_primary_key" => PrimaryKeyKind::ExplicitPrimaryKey,
            "suitable_unique_key" => PrimaryKeyKind::SuitableUniqueKey,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    /// Column order is semantic: it is part of what schema-match compares
    /// (spec.md §4.7) and is preserved end to end from introspection.
    pub columns: Vec<Column>,
    pub primary_key_columns: Vec<ColumnIndex>,
    pub primary_key_kind: PrimaryKeyKind,
    pub keys: Vec<Key>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.columns == other.columns
            && self.primary_key_columns == other.primary_key_columns
            && self.primary_key_kind == other.primary_key_kind
            && self.keys == other.keys
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key_columns: Vec::new(),
            primary_key_kind: PrimaryKeyKind::NoAvailableKey,
            keys: Vec::new(),
        }
    }

    pub fn index_of_column(&self, name: &str) -> Option<ColumnIndex> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Keys sorted by `(kind, name)`, the stable cross-engine order
    /// spec.md §4.5 item 4 and §4.7 both rely on.
    pub fn keys_sorted(&self) -> Vec<&Key> {
        let mut keys: Vec<&Key> = self.keys.iter().collect();
        keys.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        keys
    }

    /// Checks the structural invariants spec.md §3 requires of every
    /// introspected table. Intended for use in adapter tests and debug
    /// assertions, not on the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen_names = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen_names.insert(column.name.as_str()) {
                return Err(format!("duplicate column name {} in table {}", column.name, self.name));
            }
        }
        for &idx in &self.primary_key_columns {
            if idx >= self.columns.len() {
                return Err(format!("primary key column index {idx} out of bounds in table {}", self.name));
            }
            if self.columns[idx].nullable {
                return Err(format!(
                    "explicit primary key in table {} covers nullable column {}",
                    self.name, self.columns[idx].name
                ));
            }
        }
        if self.primary_key_kind == PrimaryKeyKind::NoAvailableKey && !self.primary_key_columns.is_empty() {
            return Err(format!("table {} has NoAvailableKey but non-empty primary_key_columns", self.name));
        }
        for key in &self.keys {
            for &idx in &key.columns {
                if idx >= self.columns.len() {
                    return Err(format!(
                        "key {} column index {idx} out of bounds in table {}",
                        key.name, self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    pub tables: Vec<Table>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables sorted by name — the order both the wire payload's stable
    /// iteration and the schema-match walk use.
    pub fn tables_sorted(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.iter().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_flags_survive_a_bit_renumbering() {
        // The wire carries names, not bit positions, so renumbering the
        // constants must not change what gets serialized for an existing
        // value built through the accessor API.
        let mut flags = ColumnFlags::empty();
        flags.set_time_zone(true);
        flags.set_simple_geometry(true);
        let mut names = flags.set_names();
        names.sort_unstable();
        assert_eq!(names, vec!["simple_geometry", "time_zone"]);

        let roundtripped = ColumnFlags::from_names(names.iter().copied());
        assert!(roundtripped.time_zone());
        assert!(roundtripped.simple_geometry());
        assert!(!roundtripped.mysql_timestamp());
    }

    #[test]
    fn unknown_flag_name_is_ignored_not_rejected() {
        let flags = ColumnFlags::from_names(["time_zone", "some_future_flag"]);
        assert!(flags.time_zone());
    }

    #[test]
    fn keys_sorted_orders_by_kind_then_name() {
        let mut table = Table::new("widgets");
        table.columns.push(Column::new("a", ColumnKind::SignedInt));
        table.keys.push(Key { name: "z_idx".into(), kind: KeyKind::Standard, columns: vec![0] });
        table.keys.push(Key { name: "a_uniq".into(), kind: KeyKind::Unique, columns: vec![0] });
        table.keys.push(Key { name: "a_idx".into(), kind: KeyKind::Standard, columns: vec![0] });
        let sorted: Vec<&str> = table.keys_sorted().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(sorted, vec!["a_uniq", "a_idx", "z_idx"]);
    }

    #[test]
    fn check_invariants_rejects_out_of_bounds_primary_key_index() {
        let mut table = Table::new("widgets");
        table.columns.push(Column::new("a", ColumnKind::SignedInt));
        table.primary_key_columns.push(5);
        table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
        assert!(table.check_invariants().is_err());
    }

    #[test]
    fn check_invariants_rejects_nullable_explicit_primary_key_column() {
        let mut table = Table::new("widgets");
        let mut col = Column::new("a", ColumnKind::SignedInt);
        col.nullable = true;
        table.columns.push(col);
        table.primary_key_columns.push(0);
        table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
        assert!(table.check_invariants().is_err());
    }

    #[test]
    fn check_invariants_accepts_a_well_formed_table() {
        let mut table = Table::new("widgets");
        let mut col = Column::new("id", ColumnKind::SignedInt);
        col.nullable = false;
        table.columns.push(col);
        table.primary_key_columns.push(0);
        table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
        assert!(table.check_invariants().is_ok());
    }

    #[test]
    fn index_of_column_finds_by_name() {
        let mut table = Table::new("widgets");
        table.columns.push(Column::new("a", ColumnKind::Text));
        table.columns.push(Column::new("b", ColumnKind::Text));
        assert_eq!(table.index_of_column("b"), Some(1));
        assert_eq!(table.index_of_column("missing"), None);
    }
}
